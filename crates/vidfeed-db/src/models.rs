//! Database row types. These map directly to SQLite rows and stay distinct
//! from the vidfeed-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

pub struct UserRow {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A user with the counters shown on their channel page.
pub struct ProfileRow {
    pub user: UserRow,
    pub subscriber_count: i64,
    pub video_count: i64,
    pub viewer_subscribed: bool,
}

pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Columns of the `videos` table only.
#[derive(Debug, Clone)]
pub struct VideoRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub visibility: String,
    pub asset_status: String,
    pub upload_id: Option<String>,
    pub asset_id: Option<String>,
    pub playback_id: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A video joined with its owner, live counters and the viewer's state.
#[derive(Debug, Clone)]
pub struct VideoRow {
    pub video: VideoRecord,
    pub owner_name: String,
    pub owner_image_url: Option<String>,
    /// Only loaded for single-video lookups.
    pub owner_subscriber_count: Option<i64>,
    pub view_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub viewer_reaction: Option<String>,
    pub viewer_subscribed: bool,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub video_id: String,
    pub user_id: String,
    pub author_name: String,
    pub author_image_url: Option<String>,
    pub value: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub like_count: i64,
    pub dislike_count: i64,
}

pub struct SubscriptionRow {
    pub viewer_id: String,
    pub creator_id: String,
    pub created_at: i64,
}

pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Stored microseconds back to a timestamp. Out-of-range values collapse to
/// the epoch rather than failing a whole page.
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}
