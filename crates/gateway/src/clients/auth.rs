//! Authentication authority: token validation and login.
//!
//! The production adapter talks to the auth service over HTTP; the
//! in-memory adapter issues opaque tokens against a [`UserAuthority`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Context, Identity, Role, ServiceError, UserId, transport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::users::UserAuthority;

/// Outcome of validating a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

impl TokenValidation {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            user_id: 0,
            email: String::new(),
            role: String::new(),
        }
    }

    /// The caller identity carried by a valid token.
    pub fn identity(&self) -> Option<Identity> {
        let user_id = UserId::new(self.user_id);
        (self.valid && user_id.is_valid()).then(|| Identity::new(user_id, Role::parse(&self.role)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
struct ValidateTokenRequest<'a> {
    token: &'a str,
}

/// The service that issues and validates access tokens.
#[async_trait]
pub trait AuthAuthority: Send + Sync {
    /// Validates a token. An unknown token is `Ok` with `valid == false`;
    /// errors mean the authority could not be consulted.
    async fn validate_token(&self, ctx: &Context, token: &str)
    -> Result<TokenValidation, ServiceError>;

    async fn login(&self, ctx: &Context, request: LoginRequest)
    -> Result<LoginResponse, ServiceError>;
}

/// Auth service client over HTTP (`/api/auth/validate`, `/api/auth/login`).
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAuthClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn post<B, T>(&self, ctx: &Context, path: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        ctx.run(async {
            let response = self
                .http
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| network_error("auth service", &e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(transport::from_http_status(status, &body));
            }
            response
                .json::<T>()
                .await
                .map_err(|e| ServiceError::internal(format!("failed to decode response: {e}")))
        })
        .await
    }
}

/// Maps a transport-level reqwest failure onto the taxonomy.
pub(crate) fn network_error(service: &str, err: &reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::timeout(format!("{service} request timed out: {err}"))
    } else {
        ServiceError::unavailable(format!("{service} request failed: {err}"))
    }
}

#[async_trait]
impl AuthAuthority for HttpAuthClient {
    #[tracing::instrument(skip(self, ctx, token))]
    async fn validate_token(
        &self,
        ctx: &Context,
        token: &str,
    ) -> Result<TokenValidation, ServiceError> {
        self.post(ctx, "/api/auth/validate", &ValidateTokenRequest { token })
            .await
    }

    #[tracing::instrument(skip(self, ctx, request), fields(email = %request.email))]
    async fn login(
        &self,
        ctx: &Context,
        request: LoginRequest,
    ) -> Result<LoginResponse, ServiceError> {
        self.post(ctx, "/api/auth/login", &request).await
    }
}

/// Issues opaque tokens for users of a [`UserAuthority`], kept in memory.
pub struct InMemoryAuthAuthority {
    users: Arc<dyn UserAuthority>,
    tokens: RwLock<HashMap<String, TokenValidation>>,
    issued: AtomicU64,
}

impl InMemoryAuthAuthority {
    pub fn new(users: Arc<dyn UserAuthority>) -> Self {
        Self {
            users,
            tokens: RwLock::new(HashMap::new()),
            issued: AtomicU64::new(0),
        }
    }

    /// Registers a token for an identity without a login round-trip.
    pub fn issue(&self, token: impl Into<String>, identity: Identity, email: &str) {
        self.tokens.write().unwrap().insert(
            token.into(),
            TokenValidation {
                valid: true,
                user_id: identity.user_id.get(),
                email: email.to_string(),
                role: identity.role.as_str().to_string(),
            },
        );
    }
}

#[async_trait]
impl AuthAuthority for InMemoryAuthAuthority {
    async fn validate_token(
        &self,
        _ctx: &Context,
        token: &str,
    ) -> Result<TokenValidation, ServiceError> {
        Ok(self
            .tokens
            .read()
            .unwrap()
            .get(token)
            .cloned()
            .unwrap_or_else(TokenValidation::invalid))
    }

    async fn login(
        &self,
        ctx: &Context,
        request: LoginRequest,
    ) -> Result<LoginResponse, ServiceError> {
        let user = self
            .users
            .validate_credentials(ctx, &request.email, &request.password)
            .await?;
        let serial = self.issued.fetch_add(1, Ordering::Relaxed);
        let token = hex::encode(Sha256::digest(
            format!("{}:{}:{serial}", user.id, user.email).as_bytes(),
        ));
        self.issue(token.clone(), Identity::new(user.id, user.role), &user.email);
        Ok(LoginResponse { token })
    }
}
