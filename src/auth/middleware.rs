use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

use super::api_key::Authenticator;
use super::models::Caller;

pub const API_KEY_HEADER: &str = "x-api-key";

/// 认证中间件
///
/// Resolves the caller once and stores it in the request extensions. It never
/// rejects: callers without a role are answered by the dispatcher.
pub async fn authenticate(
    State(authenticator): State<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = authenticator.authenticate(extract_api_key(request.headers()).as_deref());
    debug!(
        caller = %caller.name,
        admin = caller.capabilities.admin,
        user = caller.capabilities.user,
        "Caller resolved"
    );

    request.extensions_mut().insert(caller);
    next.run(request).await
}

/// Key from `Authorization: Bearer <key>`, falling back to `X-Api-Key`.
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// 调用者提取器 - 缺少认证信息时视为匿名
#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Caller>()
            .cloned()
            .unwrap_or_else(Caller::anonymous))
    }
}
