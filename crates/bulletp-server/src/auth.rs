//! Caller identification: user scope and client address
//!
//! There is no authentication. The user scope is whatever the caller puts in
//! `?user_id=`, with a configured fallback for blank or missing values.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::Deserialize;

use bulletp_core::UserId;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
struct ScopeQuery {
    user_id: Option<String>,
}

/// The user a request acts for
#[derive(Debug, Clone, PartialEq)]
pub struct Scope(pub UserId);

impl FromRequestParts<Arc<AppState>> for Scope {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let query = Query::<ScopeQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        Ok(Scope(UserId::from_scope(
            query.user_id.as_deref(),
            &state.default_user,
        )))
    }
}

/// Best-effort client address used for rate limiting
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(client_ip(&parts.headers, peer)))
    }
}

/// First `X-Forwarded-For` entry, else the peer address, else `unknown`
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}
