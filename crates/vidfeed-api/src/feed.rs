//! The three named feeds.
//!
//! Each feed is a sort policy plus a filter over the keyset pagination
//! engine. Discover and subscribed share the recency cursor shape; trending
//! uses the popularity shape, and a cursor from one is refused by the other.

use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use vidfeed_db::VideoFilter;
use vidfeed_types::api::ItemView;
use vidfeed_types::cursor::{SortKey, SortPolicy};
use vidfeed_types::page::{Limit, Page, PageResponse};

use crate::auth::{AppState, Identity, require_user, with_db};
use crate::error::ApiError;
use crate::videos::{find_visible, item_view};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Newest public videos, optionally in one category.
    Discover,
    /// Most viewed public videos.
    Trending,
    /// Newest public videos from creators the viewer follows.
    Subscribed,
}

impl Feed {
    pub fn policy(self) -> SortPolicy {
        match self {
            Self::Discover | Self::Subscribed => SortPolicy::Recency,
            Self::Trending => SortPolicy::Popularity,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Trending => "trending",
            Self::Subscribed => "subscribed",
        }
    }
}

/// Query string shared by paginated listings. Values stay strings so bad
/// input surfaces as our validation error instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub category_id: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

pub(crate) fn parse_limit(raw: Option<&str>) -> Result<Limit, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::validation("limit is required"))?;
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::validation(format!("limit must be an integer, got '{}'", raw)))?;
    Ok(Limit::new(value)?)
}

pub(crate) fn parse_cursor(raw: Option<&str>, policy: SortPolicy) -> Result<Option<SortKey>, ApiError> {
    Ok(raw.map(|token| SortKey::decode(token, policy)).transpose()?)
}

pub(crate) fn parse_id(raw: &str, field: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("{} is not a valid id", field)))
}

/// Shape store rows into a wire page, keeping the cursor.
pub(crate) fn page_response<T, U>(
    page: Page<T>,
    shape: impl FnMut(T) -> anyhow::Result<U>,
) -> Result<PageResponse<U>, ApiError> {
    let Page { items, next_cursor } = page;
    let items = items.into_iter().map(shape).collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Page { items, next_cursor }.into())
}

pub async fn discover(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PageResponse<ItemView>>, ApiError> {
    let Query(query) = query?;
    select(&state, &identity, Feed::Discover, query).await.map(Json)
}

pub async fn trending(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PageResponse<ItemView>>, ApiError> {
    let Query(query) = query?;
    select(&state, &identity, Feed::Trending, query).await.map(Json)
}

pub async fn subscribed(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PageResponse<ItemView>>, ApiError> {
    let Query(query) = query?;
    select(&state, &identity, Feed::Subscribed, query).await.map(Json)
}

pub async fn select(
    state: &AppState,
    identity: &Identity,
    feed: Feed,
    query: PageQuery,
) -> Result<PageResponse<ItemView>, ApiError> {
    // An anonymous caller gets a permission error here, never an empty page.
    if feed == Feed::Subscribed {
        identity.require()?;
    }

    let limit = parse_limit(query.limit.as_deref())?;
    let cursor = parse_cursor(query.cursor.as_deref(), feed.policy())?;
    // Trending has no category dimension; the parameter is ignored there.
    let category = match (feed, query.category_id.as_deref()) {
        (Feed::Discover, Some(raw)) => Some(parse_id(raw, "categoryId")?),
        _ => None,
    };

    let subject = identity.subject().map(str::to_string);
    let page = with_db(state, move |db| {
        let viewer = db.resolve_viewer(subject.as_deref())?;

        let mut filter = VideoFilter::public();
        if let Some(category) = category {
            filter = filter.in_category(category.to_string());
        }
        if feed == Feed::Subscribed {
            filter = filter.subscribed_by(require_user(&viewer)?);
        }

        Ok(db.page_videos(&filter, feed.policy(), cursor.as_ref(), limit, &viewer)?)
    })
    .await?;

    debug!(
        "Feed {}: {} items, more={}",
        feed.name(),
        page.items.len(),
        page.next_cursor.is_some()
    );
    page_response(page, item_view)
}

/// Newest public videos related to one video: its category when it has one,
/// never the video itself.
pub async fn suggestions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PageResponse<ItemView>>, ApiError> {
    let Query(query) = query?;
    let video_id = parse_id(&id, "videoId")?.to_string();
    let limit = parse_limit(query.limit.as_deref())?;
    let cursor = parse_cursor(query.cursor.as_deref(), SortPolicy::Recency)?;
    let subject = identity.subject().map(str::to_string);

    let page = with_db(&state, move |db| {
        let viewer = db.resolve_viewer(subject.as_deref())?;
        let source = find_visible(db, &video_id, &viewer)?;

        let mut filter = VideoFilter::public().excluding(video_id);
        if let Some(category_id) = source.category_id {
            filter = filter.in_category(category_id);
        }
        Ok(db.page_videos(&filter, SortPolicy::Recency, cursor.as_ref(), limit, &viewer)?)
    })
    .await?;

    debug!("Suggestions for {}: {} items", id, page.items.len());
    page_response(page, item_view).map(Json)
}
