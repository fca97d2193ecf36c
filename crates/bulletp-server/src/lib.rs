//! BulletP Server - HTTP API for the outline backend
//!
//! Thin request layer over `bulletp-core`: path/body parsing, user scope
//! resolution and error-to-status mapping. All business rules live in the
//! core crate.

pub mod auth;
pub mod config;
pub mod http;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use bulletp_core::{
    CodeSender, DevSubjectExchanger, LogCodeSender, Repository, SubjectExchanger,
};

pub use config::{Environment, ServerConfig, ServerConfigError};

/// Shared application state
pub struct AppState {
    pub repo: Repository,
    pub sender: Arc<dyn CodeSender>,
    pub exchanger: Arc<dyn SubjectExchanger>,
    /// Scope used when a request names no user
    pub default_user: String,
    pub cors_origins: Vec<String>,
    pub dev_routes: bool,
}

impl AppState {
    /// State with development collaborators: codes go to the log and WeChat
    /// subjects are derived from the callback code.
    pub fn new(repo: Repository) -> Self {
        let sender = LogCodeSender::new(repo.config().otp.expire_seconds);
        let defaults = ServerConfig::default();
        Self {
            repo,
            sender: Arc::new(sender),
            exchanger: Arc::new(DevSubjectExchanger),
            default_user: defaults.default_user,
            cors_origins: defaults.cors_origins,
            dev_routes: true,
        }
    }

    /// Open the configured database and build state from `config`
    pub fn from_config(config: &ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let repo = Repository::open(config.database_path(), config.core.clone())?;
        tracing::info!(path = %config.database_path().display(), "opened database");
        Ok(Self {
            default_user: config.default_user.clone(),
            cors_origins: config.cors_origins.clone(),
            dev_routes: config.dev_routes_enabled(),
            ..Self::new(repo)
        })
    }

    pub fn with_sender(mut self, sender: Arc<dyn CodeSender>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_exchanger(mut self, exchanger: Arc<dyn SubjectExchanger>) -> Self {
        self.exchanger = exchanger;
        self
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Status
        .route("/", get(http::get_status))
        // Tree endpoints
        .route("/api/home", get(http::get_home))
        .route("/api/nodes", post(http::create_node))
        .route(
            "/api/nodes/{id}",
            get(http::get_node)
                .patch(http::update_node)
                .delete(http::delete_node),
        )
        .route("/api/nodes/{id}/children", get(http::get_children))
        .route("/api/nodes/{id}/move", post(http::move_node))
        .route("/api/nodes/{id}/indent", post(http::indent_node))
        .route("/api/nodes/{id}/outdent", post(http::outdent_node))
        .route("/api/nodes/{id}/subtree", get(http::get_subtree))
        // Login endpoints
        .route("/api/auth/email/start", post(http::email_start))
        .route("/api/auth/email/verify", post(http::email_verify))
        .route("/api/auth/wechat/qr/start", post(http::wechat_qr_start))
        .route("/api/auth/wechat/callback", get(http::wechat_callback));

    if state.dev_routes {
        router = router.route("/api/dev/bootstrap", post(http::dev_bootstrap));
    }

    router
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.cors_origins))
        .with_state(state)
}

/// Start the server
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("BulletP server listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
