//! User authority port and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Context, Role, ServiceError, UserId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A user record as returned by the user authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// The remote service that owns user accounts.
#[async_trait]
pub trait UserAuthority: Send + Sync {
    /// Fetches one user; unknown ids are `NotFound`.
    async fn get_user(&self, ctx: &Context, id: UserId) -> Result<User, ServiceError>;

    /// Returns the user whose credentials match, or `Unauthenticated`.
    async fn validate_credentials(
        &self,
        ctx: &Context,
        email: &str,
        password: &str,
    ) -> Result<User, ServiceError>;

    /// Registers a user; a taken email is `AlreadyExists`.
    async fn create_user(&self, ctx: &Context, user: NewUser) -> Result<User, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryUserState {
    users: BTreeMap<UserId, (User, String)>,
    next_id: i64,
    fail_with: Option<ServiceError>,
    latency: Option<Duration>,
    get_calls: usize,
}

/// In-memory user authority for tests and local wiring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserAuthority {
    state: Arc<RwLock<InMemoryUserState>>,
}

fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

impl InMemoryUserAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user with the given id, replacing any previous record.
    pub fn insert(&self, user: User, password: &str) {
        let mut state = self.state.write().unwrap();
        state.next_id = state.next_id.max(user.id.get());
        state
            .users
            .insert(user.id, (user, password_digest(password)));
    }

    /// Makes every call fail with the given error.
    pub fn set_fail(&self, error: Option<ServiceError>) {
        self.state.write().unwrap().fail_with = error;
    }

    /// Delays every call, honouring the caller's context.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().unwrap().latency = latency;
    }

    /// Number of `get_user` calls that completed.
    pub fn get_calls(&self) -> usize {
        self.state.read().unwrap().get_calls
    }

    fn begin(&self) -> (Option<Duration>, Option<ServiceError>) {
        let state = self.state.read().unwrap();
        (state.latency, state.fail_with.clone())
    }
}

async fn simulate(
    latency: Option<Duration>,
    fail_with: Option<ServiceError>,
) -> Result<(), ServiceError> {
    if let Some(delay) = latency {
        tokio::time::sleep(delay).await;
    }
    match fail_with {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[async_trait]
impl UserAuthority for InMemoryUserAuthority {
    async fn get_user(&self, ctx: &Context, id: UserId) -> Result<User, ServiceError> {
        let (latency, fail_with) = self.begin();
        ctx.run(async {
            simulate(latency, fail_with).await?;
            let mut state = self.state.write().unwrap();
            state.get_calls += 1;
            state
                .users
                .get(&id)
                .map(|(user, _)| user.clone())
                .ok_or_else(|| ServiceError::not_found(format!("user {id} not found")))
        })
        .await
    }

    async fn validate_credentials(
        &self,
        ctx: &Context,
        email: &str,
        password: &str,
    ) -> Result<User, ServiceError> {
        let (latency, fail_with) = self.begin();
        ctx.run(async {
            simulate(latency, fail_with).await?;
            let digest = password_digest(password);
            let state = self.state.read().unwrap();
            state
                .users
                .values()
                .find(|(user, stored)| user.email == email && *stored == digest)
                .map(|(user, _)| user.clone())
                .ok_or_else(|| ServiceError::unauthenticated("invalid email or password"))
        })
        .await
    }

    async fn create_user(&self, ctx: &Context, new_user: NewUser) -> Result<User, ServiceError> {
        let (latency, fail_with) = self.begin();
        ctx.run(async {
            simulate(latency, fail_with).await?;
            if new_user.name.trim().is_empty()
                || !new_user.email.contains('@')
                || new_user.password.len() < 6
            {
                return Err(ServiceError::invalid_input(
                    "name, a valid email and a password of at least 6 characters are required",
                ));
            }
            let mut state = self.state.write().unwrap();
            if state.users.values().any(|(u, _)| u.email == new_user.email) {
                return Err(ServiceError::already_exists(format!(
                    "user with email {} already exists",
                    new_user.email
                )));
            }
            state.next_id += 1;
            let user = User {
                id: UserId::new(state.next_id),
                name: new_user.name,
                email: new_user.email,
                role: Role::User,
            };
            let digest = password_digest(&new_user.password);
            state.users.insert(user.id, (user.clone(), digest));
            Ok(user)
        })
        .await
    }
}
