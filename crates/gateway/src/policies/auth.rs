//! Bearer-token authentication for protected routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use common::Context;

use crate::clients::AuthAuthority;
use crate::error::ApiError;

/// Extracts the token from an `Authorization` header value.
///
/// Accepts `Bearer <token>` or a bare token.
pub fn parse_authorization(value: &str) -> Result<&str, ApiError> {
    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] if !token.is_empty() => Ok(token),
        [token] if !token.is_empty() => Ok(token),
        _ => Err(ApiError::Unauthorized(
            "Invalid authorization header format".to_string(),
        )),
    }
}

/// Validates the caller's token and attaches their [`common::Identity`]
/// to the request extensions.
pub async fn require_auth(
    State(auth): State<Arc<dyn AuthAuthority>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Authorization header is required".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid authorization header format".to_string()))?;
    let token = parse_authorization(header)?.to_string();

    let validation = auth
        .validate_token(&Context::new(), &token)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "token validation failed");
            metrics::counter!("auth_failures_total", "reason" => "unavailable").increment(1);
            ApiError::AuthUnavailable
        })?;

    let Some(identity) = validation.identity() else {
        metrics::counter!("auth_failures_total", "reason" => "invalid_token").increment(1);
        return Err(ApiError::Unauthorized("Invalid token".to_string()));
    };

    tracing::debug!(user_id = %identity.user_id, role = identity.role.as_str(), "authenticated");
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Extension, Router};
    use common::{Identity, ServiceError};
    use tower::ServiceExt;

    use super::*;
    use crate::clients::{InMemoryAuthAuthority, InMemoryUserAuthority, TokenValidation};

    struct Unreachable;

    #[async_trait::async_trait]
    impl AuthAuthority for Unreachable {
        async fn validate_token(
            &self,
            _ctx: &Context,
            _token: &str,
        ) -> Result<TokenValidation, ServiceError> {
            Err(ServiceError::unavailable("auth service down"))
        }

        async fn login(
            &self,
            _ctx: &Context,
            _request: crate::clients::LoginRequest,
        ) -> Result<crate::clients::LoginResponse, ServiceError> {
            Err(ServiceError::unavailable("auth service down"))
        }
    }

    fn app(auth: Arc<dyn AuthAuthority>) -> Router {
        Router::new()
            .route(
                "/me",
                get(|Extension(identity): Extension<Identity>| async move {
                    identity.user_id.to_string()
                }),
            )
            .layer(axum::middleware::from_fn_with_state(auth, require_auth))
    }

    fn known_tokens() -> Arc<dyn AuthAuthority> {
        let auth = InMemoryAuthAuthority::new(Arc::new(InMemoryUserAuthority::new()));
        auth.issue("good-token", Identity::user(42), "u42@example.com");
        Arc::new(auth)
    }

    async fn call(app: Router, authorization: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri("/me");
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_parse_authorization_shapes() {
        assert_eq!(parse_authorization("Bearer abc").unwrap(), "abc");
        assert_eq!(parse_authorization("abc").unwrap(), "abc");
        assert!(parse_authorization("Basic abc").is_err());
        assert!(parse_authorization("Bearer a b").is_err());
        assert!(parse_authorization("").is_err());
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler_with_identity() {
        let (status, body) = call(app(known_tokens()), Some("Bearer good-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "42");

        let (status, _) = call(app(known_tokens()), Some("good-token")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let (status, body) = call(app(known_tokens()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Authorization header is required"));
    }

    #[tokio::test]
    async fn test_malformed_header_is_unauthorized() {
        let (status, body) = call(app(known_tokens()), Some("Token a b")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid authorization header format"));
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthorized() {
        let (status, body) = call(app(known_tokens()), Some("Bearer forged")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid token"));
    }

    #[tokio::test]
    async fn test_unreachable_authority_is_unavailable() {
        let (status, body) = call(app(Arc::new(Unreachable)), Some("Bearer good-token")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("Auth service unavailable"));
    }
}
