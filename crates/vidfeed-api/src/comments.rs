use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use vidfeed_db::models::{CommentRow, from_micros};
use vidfeed_types::api::{CommentView, CreateCommentRequest, OwnerView};
use vidfeed_types::cursor::SortPolicy;
use vidfeed_types::models::ReactionType;
use vidfeed_types::page::PageResponse;

use crate::auth::{AppState, Identity, require_user, with_db};
use crate::error::ApiError;
use crate::feed::{PageQuery, page_response, parse_cursor, parse_id, parse_limit};
use crate::videos::find_visible;

const MAX_COMMENT_LEN: usize = 2000;

fn comment_view(row: CommentRow, viewer_reaction: Option<ReactionType>) -> anyhow::Result<CommentView> {
    Ok(CommentView {
        id: row.id.parse().context("comment id")?,
        video_id: row.video_id.parse().context("video id")?,
        author: OwnerView {
            id: row.user_id.parse().context("author id")?,
            name: row.author_name,
            image_url: row.author_image_url,
            subscriber_count: None,
        },
        value: row.value,
        created_at: from_micros(row.created_at),
        updated_at: from_micros(row.updated_at),
        like_count: row.like_count,
        dislike_count: row.dislike_count,
        viewer_reaction,
    })
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(video_id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PageResponse<CommentView>>, ApiError> {
    let Query(query) = query?;
    let video_id = parse_id(&video_id, "videoId")?.to_string();
    let limit = parse_limit(query.limit.as_deref())?;
    let cursor = parse_cursor(query.cursor.as_deref(), SortPolicy::Recency)?;
    let subject = identity.subject().map(str::to_string);

    let (page, mut reactions) = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(subject.as_deref())?;
        find_visible(db, &video_id, &viewer)?;

        let page = db.page_comments(&video_id, cursor.as_ref(), limit)?;
        let ids: Vec<String> = page.items.iter().map(|c| c.id.clone()).collect();
        // One lookup for the whole page.
        let reactions = db.reactions_by_target(&viewer, &ids)?;
        Ok((page, reactions))
    })
    .await?;

    let response = page_response(page, |row| {
        let reaction = reactions.remove(&row.id);
        comment_view(row, reaction)
    })?;
    Ok(Json(response))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(video_id): Path<String>,
    body: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let subject = identity.require()?.to_string();
    let video_id = parse_id(&video_id, "videoId")?.to_string();
    let Json(req) = body?;
    let value = req.value.trim().to_string();
    if value.is_empty() || value.chars().count() > MAX_COMMENT_LEN {
        return Err(ApiError::validation(format!(
            "comment must be 1-{} characters",
            MAX_COMMENT_LEN
        )));
    }

    let row = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(Some(&subject))?;
        let user_id = require_user(&viewer)?;
        find_visible(db, &video_id, &viewer)?;

        let id = db.create_comment(&video_id, user_id, &value)?;
        db.get_comment(&id)?.ok_or(ApiError::NotFound("comment"))
    })
    .await?;

    info!("Comment {} added to video {}", row.id, row.video_id);
    Ok((StatusCode::CREATED, Json(comment_view(row, None)?)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let subject = identity.require()?.to_string();
    let id = parse_id(&id, "commentId")?.to_string();

    with_db(&state, move |db| {
        let viewer = db.resolve_viewer(Some(&subject))?;
        let user_id = require_user(&viewer)?;
        let comment = db.get_comment(&id)?.ok_or(ApiError::NotFound("comment"))?;
        if comment.user_id != user_id {
            return Err(ApiError::Forbidden("only the author may delete this comment"));
        }
        db.delete_comment(&id)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
