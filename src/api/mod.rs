// HTTP glue - client key authentication and request-scoped key context

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::config::{mask_api_key, Settings};
use crate::proxy::context;

pub mod model_router;

pub use model_router::{ModelManager, ModelResolution, ModelTier};

const X_API_KEY: &str = "x-api-key";

/// Client key from `x-api-key`, falling back to `Authorization` (Bearer or raw).
pub fn extract_client_key(headers: &HeaderMap) -> Option<String> {
    let non_empty = |key: &str| {
        let key = key.trim();
        (!key.is_empty()).then(|| key.to_string())
    };

    let from_x_api_key = headers
        .get(X_API_KEY)
        .and_then(|v| v.to_str().ok())
        .and_then(non_empty);
    let from_authorization = || {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|auth| auth.strip_prefix("Bearer ").unwrap_or(auth))
            .and_then(non_empty)
    };

    from_x_api_key.or_else(from_authorization)
}

/// API key authentication middleware
///
/// Rejects unknown client keys and runs the rest of the request with the
/// key bound in [`context`], so model resolution picks the right profile.
pub async fn auth_middleware(
    State(settings): State<Arc<Settings>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let api_key = extract_client_key(request.headers());

    if !settings.validate_client_key(api_key.as_deref()) {
        tracing::warn!(
            "Rejected request to {} with invalid API key ({})",
            request.uri().path(),
            mask_api_key(api_key.as_deref())
        );
        return unauthorized();
    }

    context::scope(api_key, next.run(request)).await
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("Content-Type", "application/json")],
        r#"{"type":"error","error":{"type":"authentication_error","message":"Invalid API key. Please provide a valid Anthropic API key."}}"#,
    )
        .into_response()
}
