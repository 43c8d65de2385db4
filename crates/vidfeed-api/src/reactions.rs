use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};

use vidfeed_types::api::{ToggleReactionRequest, ToggleReactionResponse};
use vidfeed_types::models::TargetKind;

use crate::auth::{AppState, Identity, require_user, with_db};
use crate::error::ApiError;
use crate::videos::{find_visible, visible_to};

/// Like or dislike a video or comment. Repeating the current reaction clears it.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<ToggleReactionRequest>, JsonRejection>,
) -> Result<Json<ToggleReactionResponse>, ApiError> {
    let subject = identity.require()?.to_string();
    let Json(req) = body?;

    let reaction = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(Some(&subject))?;
        let user_id = require_user(&viewer)?;
        let target_id = req.target.id.to_string();

        match req.target.kind {
            TargetKind::Video => {
                find_visible(db, &target_id, &viewer)?;
            }
            TargetKind::Comment => {
                let comment = db.get_comment(&target_id)?.ok_or(ApiError::NotFound("comment"))?;
                // A comment is only reachable through its video.
                let video = db.get_video(&comment.video_id)?;
                if !video.is_some_and(|video| visible_to(&video, &viewer)) {
                    return Err(ApiError::NotFound("comment"));
                }
            }
        }

        Ok(db.toggle_reaction(user_id, &req.target, req.reaction_type)?)
    })
    .await?;

    Ok(Json(ToggleReactionResponse { state: reaction }))
}
