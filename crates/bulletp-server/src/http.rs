//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use bulletp_core::{
    Bullet, BulletId, BulletSummary, BulletpError, ErrorKind, LoginOutcome, SubtreeNode,
    UserId, WeChatLogin, WeChatStart,
};

use crate::auth::{ClientIp, Scope};
use crate::AppState;

// ==================== Errors ====================

/// Error response rendered as `{"detail": message}`
#[derive(Debug)]
pub struct ApiError(pub BulletpError);

impl From<BulletpError> for ApiError {
    fn from(err: BulletpError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self.0.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            ErrorKind::InvalidArgument => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ErrorKind::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.0.to_string()),
            ErrorKind::Upstream => {
                tracing::warn!(error = %self.0, "upstream failure");
                (StatusCode::BAD_GATEWAY, self.0.to_string())
            }
            ErrorKind::Internal => {
                tracing::error!(error = %self.0, "request failed");
                let detail = match &self.0 {
                    BulletpError::Config(e) => e.to_string(),
                    _ => "internal error".to_string(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, detail)
            }
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `Json` body whose rejections render as `{"detail"}` with status 400
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(BulletpError::invalid(rejection.body_text()).into()),
        }
    }
}

/// `Query` counterpart of [`ApiJson`]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(BulletpError::invalid(rejection.body_text()).into()),
        }
    }
}

fn parse_id(raw: &str, what: &str) -> Result<BulletId, ApiError> {
    BulletId::parse(raw).map_err(|_| BulletpError::not_found(format!("{what} not found")).into())
}

// ==================== Views ====================

/// A node as returned by single-node endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeView {
    pub id: BulletId,
    pub parent_id: Option<BulletId>,
    pub text: String,
    pub order_index: u32,
    pub user_id: UserId,
}

impl From<Bullet> for NodeView {
    fn from(b: Bullet) -> Self {
        Self {
            id: b.id,
            parent_id: b.parent_id,
            text: b.text,
            order_index: b.order_index,
            user_id: b.user_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HomeView {
    pub id: BulletId,
    pub text: String,
    pub parent_id: Option<BulletId>,
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub name: &'static str,
    pub status: &'static str,
}

// ==================== Status ====================

pub async fn get_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        name: "BulletP Backend",
        status: "running",
    })
}

// ==================== Tree ====================

pub async fn get_home(State(state): State<Arc<AppState>>, Scope(user): Scope) -> ApiResult<HomeView> {
    let home = state.repo.ensure_root(&user)?;
    Ok(Json(HomeView {
        id: home.id,
        text: home.text,
        parent_id: home.parent_id,
        user_id: home.user_id,
    }))
}

/// Request to create a node
#[derive(Debug, Default, Deserialize)]
pub struct CreateNodeRequest {
    pub parent_id: Option<String>,
    #[serde(default)]
    pub text: String,
    pub after_id: Option<String>,
}

pub async fn create_node(
    State(state): State<Arc<AppState>>,
    Scope(user): Scope,
    ApiJson(request): ApiJson<CreateNodeRequest>,
) -> ApiResult<NodeView> {
    let parent_id = request
        .parent_id
        .as_deref()
        .map(|p| parse_id(p, "parent"))
        .transpose()?;
    let after_id = request
        .after_id
        .as_deref()
        .map(|a| parse_id(a, "after node"))
        .transpose()?;

    let node = state
        .repo
        .create_node(&user, parent_id, &request.text, after_id)?;
    Ok(Json(node.into()))
}

pub async fn get_children(
    State(state): State<Arc<AppState>>,
    Scope(user): Scope,
    Path(id): Path<String>,
) -> ApiResult<Vec<BulletSummary>> {
    let parent = parse_id(&id, "parent")?;
    Ok(Json(state.repo.children(&user, parent)?))
}

pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Scope(user): Scope,
    Path(id): Path<String>,
) -> ApiResult<NodeView> {
    let id = parse_id(&id, "node")?;
    Ok(Json(state.repo.node(&user, id)?.into()))
}

/// Request to replace a node's text
#[derive(Debug, Deserialize)]
pub struct UpdateNodeRequest {
    pub text: String,
}

pub async fn update_node(
    State(state): State<Arc<AppState>>,
    Scope(user): Scope,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateNodeRequest>,
) -> ApiResult<NodeView> {
    let id = parse_id(&id, "node")?;
    Ok(Json(state.repo.update_text(&user, id, &request.text)?.into()))
}

/// Delete always answers `{"ok": true}` for ids that are already gone
pub async fn delete_node(
    State(state): State<Arc<AppState>>,
    Scope(user): Scope,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    if let Ok(id) = BulletId::parse(&id) {
        state.repo.delete_node(&user, id)?;
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Request to move a node
#[derive(Debug, Deserialize)]
pub struct MoveNodeRequest {
    pub new_parent_id: String,
    pub new_order_index: i64,
}

pub async fn move_node(
    State(state): State<Arc<AppState>>,
    Scope(user): Scope,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<MoveNodeRequest>,
) -> ApiResult<NodeView> {
    let id = parse_id(&id, "node")?;
    let new_parent = parse_id(&request.new_parent_id, "new parent")?;
    let node = state
        .repo
        .move_node(&user, id, new_parent, request.new_order_index)?;
    Ok(Json(node.into()))
}

pub async fn indent_node(
    State(state): State<Arc<AppState>>,
    Scope(user): Scope,
    Path(id): Path<String>,
) -> ApiResult<NodeView> {
    let id = parse_id(&id, "node")?;
    Ok(Json(state.repo.indent_node(&user, id)?.into()))
}

pub async fn outdent_node(
    State(state): State<Arc<AppState>>,
    Scope(user): Scope,
    Path(id): Path<String>,
) -> ApiResult<NodeView> {
    let id = parse_id(&id, "node")?;
    Ok(Json(state.repo.outdent_node(&user, id)?.into()))
}

#[derive(Debug, Deserialize)]
pub struct SubtreeQuery {
    pub depth: Option<i64>,
}

pub async fn get_subtree(
    State(state): State<Arc<AppState>>,
    Scope(user): Scope,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<SubtreeQuery>,
) -> ApiResult<SubtreeNode> {
    let root_id = parse_id(&id, "root")?;
    state
        .repo
        .subtree(&user, root_id, query.depth)?
        .map(Json)
        .ok_or_else(|| BulletpError::not_found("root not found").into())
}

// ==================== Email login ====================

#[derive(Debug, Deserialize)]
pub struct EmailStartRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailStartResponse {
    pub ok: bool,
    pub expires_in: u32,
}

/// Issue a code and hand it to the sender in the background
pub async fn email_start(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ApiJson(request): ApiJson<EmailStartRequest>,
) -> ApiResult<EmailStartResponse> {
    let issued = state.repo.issue_code(&request.email, &ip)?;
    let expires_in = issued.expires_in;

    let sender = Arc::clone(&state.sender);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = sender.send(&issued.email, &issued.code) {
            tracing::warn!(email = %issued.email, error = %e, "code delivery failed");
        }
    });

    Ok(Json(EmailStartResponse {
        ok: true,
        expires_in,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EmailVerifyRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: LoginOutcomeView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginOutcomeView {
    pub user_id: UserId,
    pub home_id: BulletId,
}

impl From<LoginOutcome> for LoginOutcomeView {
    fn from(o: LoginOutcome) -> Self {
        Self {
            user_id: o.user_id,
            home_id: o.home_id,
        }
    }
}

pub async fn email_verify(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<EmailVerifyRequest>,
) -> ApiResult<LoginResponse> {
    let outcome = state
        .repo
        .login_with_email_code(&request.email, &request.code)?;
    Ok(Json(LoginResponse {
        ok: true,
        outcome: outcome.into(),
    }))
}

// ==================== WeChat login ====================

pub async fn wechat_qr_start(State(state): State<Arc<AppState>>) -> ApiResult<WeChatStart> {
    Ok(Json(state.repo.begin_wechat_login()?))
}

#[derive(Debug, Deserialize)]
pub struct WeChatCallbackQuery {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

pub async fn wechat_callback(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<WeChatCallbackQuery>,
) -> ApiResult<WeChatLogin> {
    let login = state
        .repo
        .complete_wechat_login(state.exchanger.as_ref(), &query.code, &query.state)?;
    Ok(Json(login))
}

// ==================== Development ====================

#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub subject: String,
}

pub async fn dev_bootstrap(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<BootstrapRequest>,
) -> ApiResult<LoginOutcomeView> {
    let outcome = state.repo.bootstrap(&request.provider, &request.subject)?;
    Ok(Json(outcome.into()))
}
