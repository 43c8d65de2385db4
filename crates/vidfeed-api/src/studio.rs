//! The creator's own catalogue, drafts and private videos included.

use axum::{
    Extension, Json,
    extract::{Query, State, rejection::QueryRejection},
};
use tracing::debug;

use vidfeed_db::VideoFilter;
use vidfeed_types::api::ItemView;
use vidfeed_types::cursor::SortPolicy;
use vidfeed_types::page::PageResponse;

use crate::auth::{AppState, Identity, require_user, with_db};
use crate::error::ApiError;
use crate::feed::{PageQuery, page_response, parse_cursor, parse_limit};
use crate::videos::item_view;

pub async fn list_studio_videos(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PageResponse<ItemView>>, ApiError> {
    let subject = identity.require()?.to_string();
    let Query(query) = query?;
    let limit = parse_limit(query.limit.as_deref())?;
    let cursor = parse_cursor(query.cursor.as_deref(), SortPolicy::Recency)?;

    let page = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(Some(&subject))?;
        let filter = VideoFilter::default().owned_by(require_user(&viewer)?);
        Ok(db.page_videos(&filter, SortPolicy::Recency, cursor.as_ref(), limit, &viewer)?)
    })
    .await?;

    debug!("Studio: {} items, more={}", page.items.len(), page.next_cursor.is_some());
    page_response(page, item_view).map(Json)
}
