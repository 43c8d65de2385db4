use std::sync::Arc;

use anyhow::anyhow;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::error;

use vidfeed_db::{Database, Viewer};
use vidfeed_types::api::Claims;

use crate::error::ApiError;
use crate::media::MediaProvider;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub identity_webhook_secret: String,
    pub media_webhook_secret: String,
    pub media: Arc<dyn MediaProvider>,
}

/// Provider subject of a verified identity token, or none for anonymous
/// requests. Inserted into request extensions by the auth middleware.
#[derive(Debug, Clone, Default)]
pub struct Identity(Option<String>);

impl Identity {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Fails fast, before any store access, when no token was presented.
    pub fn require(&self) -> Result<&str, ApiError> {
        self.subject().ok_or(ApiError::Unauthenticated)
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self(Some(claims.sub))
    }
}

pub fn verify_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// The internal user id behind a resolved viewer. Anonymous viewers, including
/// signed-in identities that have not been synced yet, may not mutate.
pub(crate) fn require_user(viewer: &Viewer) -> Result<&str, ApiError> {
    viewer.id().ok_or(ApiError::Unauthenticated)
}

/// Run blocking store work off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow!("blocking task failed"))
        })?
}
