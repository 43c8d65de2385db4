use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
};

use vidfeed_db::models::from_micros;
use vidfeed_types::api::UserProfileView;

use crate::auth::{AppState, Identity, with_db};
use crate::error::ApiError;
use crate::feed::parse_id;

/// Channel page for one creator.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<UserProfileView>, ApiError> {
    let id = parse_id(&id, "userId")?.to_string();
    let subject = identity.subject().map(str::to_string);

    let profile = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(subject.as_deref())?;
        db.get_profile(&id, &viewer)?.ok_or(ApiError::NotFound("user"))
    })
    .await?;

    let user = profile.user;
    Ok(Json(UserProfileView {
        id: user.id.parse().context("user id")?,
        name: user.name,
        image_url: user.image_url,
        created_at: from_micros(user.created_at),
        subscriber_count: profile.subscriber_count,
        video_count: profile.video_count,
        viewer_subscribed: profile.viewer_subscribed,
    }))
}
