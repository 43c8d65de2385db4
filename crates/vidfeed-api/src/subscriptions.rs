use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
};

use vidfeed_db::models::from_micros;
use vidfeed_types::api::{SubscriptionResponse, SubscriptionView};

use crate::auth::{AppState, Identity, require_user, with_db};
use crate::error::ApiError;
use crate::feed::parse_id;

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<SubscriptionView>>, ApiError> {
    let subject = identity.require()?.to_string();

    let rows = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(Some(&subject))?;
        Ok(db.list_subscriptions(require_user(&viewer)?)?)
    })
    .await?;

    let views = rows
        .into_iter()
        .map(|row| {
            Ok(SubscriptionView {
                creator_id: row.creator_id.parse().context("creator id")?,
                created_at: from_micros(row.created_at),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(views))
}

/// Follow a creator. Following twice is a no-op.
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(creator_id): Path<String>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subject = identity.require()?.to_string();
    let creator_id = parse_id(&creator_id, "creatorId")?.to_string();

    with_db(&state, move |db| {
        let viewer = db.resolve_viewer(Some(&subject))?;
        let viewer_id = require_user(&viewer)?;
        if viewer_id == creator_id {
            return Err(ApiError::validation("cannot subscribe to yourself"));
        }
        if db.get_user_by_id(&creator_id)?.is_none() {
            return Err(ApiError::NotFound("creator"));
        }
        db.subscribe(viewer_id, &creator_id)?;
        Ok(())
    })
    .await?;

    Ok(Json(SubscriptionResponse { subscribed: true }))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(creator_id): Path<String>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subject = identity.require()?.to_string();
    let creator_id = parse_id(&creator_id, "creatorId")?.to_string();

    with_db(&state, move |db| {
        let viewer = db.resolve_viewer(Some(&subject))?;
        db.unsubscribe(require_user(&viewer)?, &creator_id)?;
        Ok(())
    })
    .await?;

    Ok(Json(SubscriptionResponse { subscribed: false }))
}
