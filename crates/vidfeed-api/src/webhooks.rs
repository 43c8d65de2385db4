//! Identity and media provider callbacks.
//!
//! Both providers POST `{"type", "data"}` envelopes signed with HMAC-SHA256
//! over the raw body, hex encoded in [`SIGNATURE_HEADER`] (optionally
//! prefixed with `sha256=`). A request that fails verification or parsing is
//! answered with a 4xx and changes nothing; the provider owns retries.

use anyhow::anyhow;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{debug, info, warn};

use vidfeed_types::events::{EventError, IdentityEvent, IdentityUser, MediaEvent, WebhookEnvelope};

use crate::auth::{AppState, with_db};
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

const FALLBACK_NAME: &str = "Unnamed user";

fn mac(secret: &str) -> Result<HmacSha256, ApiError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::Internal(anyhow!("webhook secret rejected by HMAC")))
}

/// Hex signature a provider would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, ApiError> {
    let mut mac = mac(secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify_signature(source: &str, secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let rejected = |reason: &str| {
        warn!("Rejected {} webhook: {}", source, reason);
        ApiError::Unauthenticated
    };

    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| rejected("missing signature"))?;
    let hex_sig = header.strip_prefix("sha256=").unwrap_or(header);
    let signature = hex::decode(hex_sig.trim()).map_err(|_| rejected("signature is not hex"))?;

    let mut mac = mac(secret)?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| rejected("signature mismatch"))
}

fn rejected_payload(source: &str, e: EventError) -> ApiError {
    warn!("Rejected {} webhook: {}", source, e);
    ApiError::Validation(e.to_string())
}

fn acknowledged() -> Json<Value> {
    Json(json!({ "received": true }))
}

fn display_name(user: &IdentityUser) -> String {
    let name = user.display_name();
    if name.is_empty() { FALLBACK_NAME.to_string() } else { name }
}

/// Keeps the local user table in step with the identity provider.
pub async fn identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    verify_signature("identity", &state.identity_webhook_secret, &headers, &body)?;

    let envelope = WebhookEnvelope::parse(&body).map_err(|e| rejected_payload("identity", e))?;
    let Some(event) =
        IdentityEvent::from_envelope(&envelope).map_err(|e| rejected_payload("identity", e))?
    else {
        debug!("Ignoring identity event {}", envelope.event_type);
        return Ok(acknowledged());
    };

    with_db(&state, move |db| {
        match event {
            IdentityEvent::UserCreated(user) => {
                let id = db.upsert_identity_user(&user.id, &display_name(&user), user.image_url.as_deref())?;
                info!("Synced new user {} as {}", user.id, id);
            }
            IdentityEvent::UserUpdated(user) => {
                let name = display_name(&user);
                // An update for a user we never saw creates them.
                if !db.update_identity_user(&user.id, &name, user.image_url.as_deref())? {
                    db.upsert_identity_user(&user.id, &name, user.image_url.as_deref())?;
                    info!("Synced previously unknown user {}", user.id);
                }
            }
            IdentityEvent::UserDeleted { id } => {
                if db.delete_identity_user(&id)? {
                    info!("Deleted user {}", id);
                } else {
                    debug!("Delete for unknown user {}", id);
                }
            }
        }
        Ok(())
    })
    .await?;

    Ok(acknowledged())
}

/// Asset lifecycle callbacks from the media provider.
pub async fn media_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    verify_signature("media", &state.media_webhook_secret, &headers, &body)?;

    let envelope = WebhookEnvelope::parse(&body).map_err(|e| rejected_payload("media", e))?;
    let Some(event) =
        MediaEvent::from_envelope(&envelope).map_err(|e| rejected_payload("media", e))?
    else {
        debug!("Ignoring media event {}", envelope.event_type);
        return Ok(acknowledged());
    };

    let event_type = envelope.event_type;
    with_db(&state, move |db| {
        let matched = match &event {
            MediaEvent::AssetCreated { upload_id, asset_id } => db.link_asset(upload_id, asset_id)?,
            MediaEvent::AssetReady {
                asset_id,
                upload_id,
                playback_id,
                duration_ms,
            } => db.mark_asset_ready(asset_id, upload_id.as_deref(), playback_id, *duration_ms)?,
            MediaEvent::AssetErrored { asset_id, upload_id } => {
                db.mark_asset_errored(asset_id, upload_id.as_deref())?
            }
            MediaEvent::AssetDeleted { asset_id, upload_id } => {
                db.mark_asset_deleted(asset_id, upload_id.as_deref())?
            }
        };

        if matched {
            info!("Applied {}", event_type);
        } else {
            // Usually the video was deleted before processing finished.
            debug!("{} matched no video: {:?}", event_type, event);
        }
        Ok(())
    })
    .await?;

    Ok(acknowledged())
}
