use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use vidfeed_db::models::{VideoRecord, VideoRow, from_micros};
use vidfeed_db::videos::VideoPatch;
use vidfeed_db::{Database, Viewer};
use vidfeed_types::api::{CreateVideoResponse, ItemView, OwnerView, UpdateVideoRequest};
use vidfeed_types::models::{ReactionType, Visibility};

use crate::auth::{AppState, Identity, require_user, with_db};
use crate::error::ApiError;
use crate::feed::parse_id;

const MAX_TITLE_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 5000;

pub(crate) fn item_view(row: VideoRow) -> anyhow::Result<ItemView> {
    let video = row.video;
    Ok(ItemView {
        id: video.id.parse().context("video id")?,
        title: video.title,
        description: video.description,
        category_id: video
            .category_id
            .map(|id| id.parse::<Uuid>())
            .transpose()
            .context("category id")?,
        visibility: video.visibility.parse()?,
        status: video.asset_status.parse()?,
        playback_id: video.playback_id,
        duration_ms: video.duration_ms,
        created_at: from_micros(video.created_at),
        updated_at: from_micros(video.updated_at),
        owner: OwnerView {
            id: video.user_id.parse().context("owner id")?,
            name: row.owner_name,
            image_url: row.owner_image_url,
            subscriber_count: row.owner_subscriber_count,
        },
        view_count: row.view_count,
        like_count: row.like_count,
        dislike_count: row.dislike_count,
        viewer_reaction: row
            .viewer_reaction
            .map(|ty| ty.parse::<ReactionType>())
            .transpose()?,
        viewer_subscribed: row.viewer_subscribed,
    })
}

/// Private videos exist only for their owner.
pub(crate) fn visible_to(video: &VideoRecord, viewer: &Viewer) -> bool {
    video.visibility != Visibility::Private.as_str() || viewer.id() == Some(video.user_id.as_str())
}

/// Load a video the viewer may see, or `NotFound`.
pub(crate) fn find_visible(db: &Database, id: &str, viewer: &Viewer) -> Result<VideoRecord, ApiError> {
    db.get_video(id)?
        .filter(|video| visible_to(video, viewer))
        .ok_or(ApiError::NotFound("video"))
}

/// Load a video the viewer owns. Someone else's video is `Forbidden`.
fn find_owned(db: &Database, id: &str, viewer: &Viewer) -> Result<VideoRecord, ApiError> {
    let user_id = require_user(viewer)?;
    let video = find_visible(db, id, viewer)?;
    if video.user_id != user_id {
        return Err(ApiError::Forbidden("only the owner may change this video"));
    }
    Ok(video)
}

fn load_view(db: &Database, id: &str, viewer: &Viewer) -> Result<ItemView, ApiError> {
    let row = db
        .get_video_view(id, viewer)?
        .filter(|row| visible_to(&row.video, viewer))
        .ok_or(ApiError::NotFound("video"))?;
    Ok(item_view(row)?)
}

fn validate_patch(req: UpdateVideoRequest) -> Result<VideoPatch, ApiError> {
    let title = match req.title {
        Some(title) => {
            let title = title.trim().to_string();
            if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
                return Err(ApiError::validation(format!(
                    "title must be 1-{} characters",
                    MAX_TITLE_LEN
                )));
            }
            Some(title)
        }
        None => None,
    };
    if let Some(Some(description)) = &req.description {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ApiError::validation(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
    }

    Ok(VideoPatch {
        title,
        description: req.description,
        category_id: req.category_id.map(|id| id.map(|id| id.to_string())),
        visibility: req.visibility,
    })
}

/// Reserve an upload slot with the media provider and create the draft.
pub async fn create_video(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let subject = identity.require()?.to_string();
    let user_id = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(Some(&subject))?;
        Ok(require_user(&viewer)?.to_string())
    })
    .await?;

    let slot = state.media.create_upload(&user_id).await.map_err(|e| {
        warn!("Media provider refused upload slot for {}: {:#}", user_id, e);
        ApiError::Upstream("media provider is unavailable".into())
    })?;

    let video_id = Uuid::new_v4();
    let upload_id = slot.upload_id.clone();
    with_db(&state, move |db| {
        db.create_video(&video_id.to_string(), &user_id, &upload_id)?;
        Ok(())
    })
    .await?;

    info!("Video {} created, upload {}", video_id, slot.upload_id);
    Ok((
        StatusCode::CREATED,
        Json(CreateVideoResponse {
            video_id,
            upload_url: slot.url,
        }),
    ))
}

pub async fn get_video(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<ItemView>, ApiError> {
    let id = parse_id(&id, "videoId")?.to_string();
    let subject = identity.subject().map(str::to_string);

    let view = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(subject.as_deref())?;
        load_view(db, &id, &viewer)
    })
    .await?;
    Ok(Json(view))
}

pub async fn update_video(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    body: Result<Json<UpdateVideoRequest>, JsonRejection>,
) -> Result<Json<ItemView>, ApiError> {
    let subject = identity.require()?.to_string();
    let id = parse_id(&id, "videoId")?.to_string();
    let Json(req) = body?;
    let patch = validate_patch(req)?;

    let view = with_db(&state, move |db| {
        if let Some(Some(category_id)) = &patch.category_id {
            if !db.category_exists(category_id)? {
                return Err(ApiError::validation("unknown categoryId"));
            }
        }
        let viewer = db.resolve_viewer(Some(&subject))?;
        find_owned(db, &id, &viewer)?;
        db.update_video(&id, &patch)?;
        load_view(db, &id, &viewer)
    })
    .await?;
    Ok(Json(view))
}

pub async fn delete_video(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let subject = identity.require()?.to_string();
    let id = parse_id(&id, "videoId")?.to_string();

    let video_id = id.clone();
    let asset_id = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(Some(&subject))?;
        let video = find_owned(db, &video_id, &viewer)?;
        db.delete_video(&video_id)?;
        Ok(video.asset_id)
    })
    .await?;

    // The row is gone either way; a stale provider asset is only logged.
    if let Some(asset_id) = asset_id {
        if let Err(e) = state.media.delete_asset(&asset_id).await {
            warn!("Failed to delete media asset {} of video {}: {:#}", asset_id, id, e);
        }
    }

    info!("Video {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_view(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "videoId")?.to_string();
    let subject = identity.subject().map(str::to_string);

    with_db(&state, move |db| {
        let viewer = db.resolve_viewer(subject.as_deref())?;
        find_visible(db, &id, &viewer)?;
        db.record_view(&id, viewer.id())?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
