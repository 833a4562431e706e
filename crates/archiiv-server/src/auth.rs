//! Authentication (who is calling) and authorization (may they do this).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;

use archiiv_crypto::TokenSecret;
use archiiv_store::{FileMeta, RecordStore};
use archiiv_types::{Capability, RecordId};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::users::UserStore;

/// An authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
}

impl Identity {
    pub fn user(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    /// Pull the session token out of the `Authorization` header. The
    /// `Bearer ` prefix is optional.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return Self::Anonymous;
        };
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        Self::Bearer(token.to_string())
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange a username and password for a session token.
    async fn login(&self, username: &str, password: &str) -> ServerResult<String>;

    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
}

/// Signed-token authentication backed by the user store.
pub struct TokenAuth {
    secret: TokenSecret,
    max_age: Duration,
    users: Arc<UserStore>,
}

impl TokenAuth {
    pub fn new(secret: TokenSecret, max_age: Duration, users: Arc<UserStore>) -> Self {
        Self {
            secret,
            max_age,
            users,
        }
    }
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn login(&self, username: &str, password: &str) -> ServerResult<String> {
        if !self.users.check_password(username, password) {
            tracing::info!(username, "failed login");
            return Err(ServerError::AuthFailed("wrong name or password".into()));
        }
        tracing::info!(username, "login");
        Ok(archiiv_crypto::sign(username, &self.secret)?)
    }

    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => {
                let username = archiiv_crypto::verify(token, &self.secret, self.max_age)?;
                // Tokens of deleted users stop working.
                if !self.users.contains(&username) {
                    return Err(ServerError::AuthFailed(format!("unknown user {username}")));
                }
                Ok(Identity::user(username))
            }
            Credentials::Anonymous => Err(ServerError::AuthFailed("missing token".into())),
        }
    }
}

/// Decides whether an identity holds a capability on a record.
///
/// Called once per operation, from a blocking thread, before the operation
/// touches the store.
pub trait Authorizer: Send + Sync {
    fn authorize(
        &self,
        store: &RecordStore,
        identity: &Identity,
        id: RecordId,
        capability: Capability,
    ) -> ServerResult<()>;
}

/// Checks the per-user capabilities in a record's `meta` section. Records
/// without one are open to every authenticated user.
pub struct MetaAuthorizer;

impl Authorizer for MetaAuthorizer {
    fn authorize(
        &self,
        store: &RecordStore,
        identity: &Identity,
        id: RecordId,
        capability: Capability,
    ) -> ServerResult<()> {
        match FileMeta::load(store, id)? {
            Some(meta) if !meta.allows(&identity.name, capability) => Err(ServerError::Forbidden {
                user: identity.name.clone(),
                capability,
                id,
            }),
            _ => Ok(()),
        }
    }
}

/// Grants everything to every authenticated user.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(
        &self,
        _store: &RecordStore,
        _identity: &Identity,
        _id: RecordId,
        _capability: Capability,
    ) -> ServerResult<()> {
        Ok(())
    }
}

/// Middleware guarding the `/fs` and `/auth/whoami` routes. Puts the
/// caller's [`Identity`] into the request extensions.
pub async fn require_login(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let credentials = Credentials::from_headers(request.headers());
    let identity = state.auth.authenticate(&credentials).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
