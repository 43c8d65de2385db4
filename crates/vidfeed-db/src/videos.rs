use anyhow::Result;
use rusqlite::Row;
use vidfeed_types::models::{AssetStatus, Visibility};

use crate::Database;
use crate::aggregate::Counter;
use crate::models::{VideoRecord, VideoRow, now_micros};
use crate::pagination::SqlParams;
use crate::queries::OptionalExt;
use crate::viewer::{Viewer, reaction_join, subscription_join};

const VIDEO_COLUMNS: &str = "v.id, v.user_id, v.title, v.description, v.category_id, v.visibility, \
     v.asset_status, v.upload_id, v.asset_id, v.playback_id, v.duration_ms, v.created_at, v.updated_at";

/// Select list shared by feeds and single-video lookups. Expects `videos v`
/// joined to `users u` plus [`viewer_joins`].
pub(crate) fn video_select() -> String {
    format!(
        "SELECT {VIDEO_COLUMNS}, u.name AS owner_name, u.image_url AS owner_image_url, \
         {views} AS view_count, {likes} AS like_count, {dislikes} AS dislike_count, \
         vr.type AS viewer_reaction, vs.viewer_id IS NOT NULL AS viewer_subscribed",
        views = Counter::Views.subquery("v.id"),
        likes = Counter::Likes.subquery("v.id"),
        dislikes = Counter::Dislikes.subquery("v.id"),
    )
}

pub(crate) fn viewer_joins() -> String {
    format!(
        "{} {}",
        reaction_join("vr", "v.id"),
        subscription_join("vs", "v.user_id")
    )
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<VideoRecord> {
    Ok(VideoRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category_id: row.get(4)?,
        visibility: row.get(5)?,
        asset_status: row.get(6)?,
        upload_id: row.get(7)?,
        asset_id: row.get(8)?,
        playback_id: row.get(9)?,
        duration_ms: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

pub(crate) fn video_from_row(row: &Row<'_>) -> rusqlite::Result<VideoRow> {
    Ok(VideoRow {
        video: record_from_row(row)?,
        owner_name: row.get(13)?,
        owner_image_url: row.get(14)?,
        owner_subscriber_count: None,
        view_count: row.get(15)?,
        like_count: row.get(16)?,
        dislike_count: row.get(17)?,
        viewer_reaction: row.get(18)?,
        viewer_subscribed: row.get(19)?,
    })
}

/// Owner-editable fields. `None` leaves a field unchanged; for the nullable
/// ones `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct VideoPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category_id: Option<Option<String>>,
    pub visibility: Option<Visibility>,
}

impl Database {
    /// New draft: untitled, private, waiting on the media provider.
    pub fn create_video(&self, id: &str, user_id: &str, upload_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let now = now_micros();
            conn.execute(
                "INSERT INTO videos (id, user_id, title, visibility, asset_status, upload_id, created_at, updated_at)
                 VALUES (?1, ?2, 'Untitled', 'private', ?3, ?4, ?5, ?5)",
                rusqlite::params![id, user_id, AssetStatus::Waiting.as_str(), upload_id, now],
            )?;
            Ok(())
        })
    }

    pub fn get_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos v WHERE v.id = ?1");
            conn.query_row(&sql, [id], record_from_row).optional()
        })
    }

    /// Single video with counters, owner subscriber count and viewer state.
    pub fn get_video_view(&self, id: &str, viewer: &Viewer) -> Result<Option<VideoRow>> {
        let mut params = SqlParams::default();
        viewer.bind(&mut params);
        params.bind(":id", id.to_string());

        let sql = format!(
            "{select}, {subscribers} AS owner_subscriber_count
             FROM videos v JOIN users u ON u.id = v.user_id {joins}
             WHERE v.id = :id",
            select = video_select(),
            subscribers = Counter::Subscribers.subquery("v.user_id"),
            joins = viewer_joins(),
        );

        self.with_conn(|conn| {
            conn.query_row(&sql, params.as_named().as_slice(), |row| {
                let mut video = video_from_row(row)?;
                video.owner_subscriber_count = Some(row.get(20)?);
                Ok(video)
            })
            .optional()
        })
    }

    /// Applies `patch` and bumps `updated_at`. Returns false if the video is gone.
    pub fn update_video(&self, id: &str, patch: &VideoPatch) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE videos SET
                     title = COALESCE(?2, title),
                     description = CASE WHEN ?3 THEN ?4 ELSE description END,
                     category_id = CASE WHEN ?5 THEN ?6 ELSE category_id END,
                     visibility = COALESCE(?7, visibility),
                     updated_at = ?8
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    patch.title,
                    patch.description.is_some(),
                    patch.description.clone().flatten(),
                    patch.category_id.is_some(),
                    patch.category_id.clone().flatten(),
                    patch.visibility.map(Visibility::as_str),
                    now_micros(),
                ],
            )?;
            Ok(n > 0)
        })
    }

    /// Removes the video; views, comments and reactions go with it.
    pub fn delete_video(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM videos WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    pub fn record_view(&self, video_id: &str, viewer_id: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO video_views (video_id, viewer_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![video_id, viewer_id, now_micros()],
            )?;
            Ok(())
        })
    }

    // -- Media provider callbacks --
    //
    // Asset updates do not touch `updated_at`: processing finishing is not an
    // edit and must not reshuffle recency feeds.

    pub fn link_asset(&self, upload_id: &str, asset_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE videos SET asset_id = ?2, asset_status = ?3 WHERE upload_id = ?1",
                rusqlite::params![upload_id, asset_id, AssetStatus::Preparing.as_str()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn mark_asset_ready(
        &self,
        asset_id: &str,
        upload_id: Option<&str>,
        playback_id: &str,
        duration_ms: Option<i64>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE videos SET asset_id = ?1, asset_status = ?3, playback_id = ?4, duration_ms = ?5
                 WHERE asset_id = ?1 OR (?2 IS NOT NULL AND upload_id = ?2)",
                rusqlite::params![
                    asset_id,
                    upload_id,
                    AssetStatus::Ready.as_str(),
                    playback_id,
                    duration_ms
                ],
            )?;
            Ok(n > 0)
        })
    }

    pub fn mark_asset_errored(&self, asset_id: &str, upload_id: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE videos SET asset_id = ?1, asset_status = ?3
                 WHERE asset_id = ?1 OR (?2 IS NOT NULL AND upload_id = ?2)",
                rusqlite::params![asset_id, upload_id, AssetStatus::Errored.as_str()],
            )?;
            Ok(n > 0)
        })
    }

    /// Provider dropped the asset; the item stays but loses its playback refs.
    pub fn mark_asset_deleted(&self, asset_id: &str, upload_id: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE videos SET asset_id = NULL, playback_id = NULL, duration_ms = NULL, asset_status = ?3
                 WHERE asset_id = ?1 OR (?2 IS NOT NULL AND upload_id = ?2)",
                rusqlite::params![asset_id, upload_id, AssetStatus::Deleted.as_str()],
            )?;
            Ok(n > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use vidfeed_types::models::{ReactionTarget, ReactionType};

    #[test]
    fn new_video_is_a_private_draft() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let id = uuid_n(42);
        db.create_video(&id, &owner, "upload-1").unwrap();

        let video = db.get_video(&id).unwrap().unwrap();
        assert_eq!(video.title, "Untitled");
        assert_eq!(video.visibility, "private");
        assert_eq!(video.asset_status, "waiting");
        assert_eq!(video.upload_id.as_deref(), Some("upload-1"));
    }

    #[test]
    fn update_bumps_updated_at_and_keeps_unset_fields() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let id = seed_video(&db, uuid_n(1), &owner, 1, "private");

        let patch = VideoPatch {
            title: Some("Hello".into()),
            visibility: Some(Visibility::Public),
            ..VideoPatch::default()
        };
        assert!(db.update_video(&id, &patch).unwrap());
        assert!(!db.update_video(&uuid_n(2), &patch).unwrap());

        let video = db.get_video(&id).unwrap().unwrap();
        assert_eq!(video.title, "Hello");
        assert_eq!(video.visibility, "public");
        assert!(video.description.is_none());
        assert!(video.updated_at > 1);
    }

    #[test]
    fn explicit_null_clears_description_and_category() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let id = seed_video(&db, uuid_n(1), &owner, 1, "public");
        let category = db.list_categories().unwrap().remove(0).id;

        let set = VideoPatch {
            description: Some(Some("hello".into())),
            category_id: Some(Some(category.clone())),
            ..VideoPatch::default()
        };
        db.update_video(&id, &set).unwrap();

        // Absent fields survive an unrelated edit.
        let retitle = VideoPatch {
            title: Some("Renamed".into()),
            ..VideoPatch::default()
        };
        db.update_video(&id, &retitle).unwrap();
        let video = db.get_video(&id).unwrap().unwrap();
        assert_eq!(video.description.as_deref(), Some("hello"));
        assert_eq!(video.category_id.as_deref(), Some(category.as_str()));

        let clear = VideoPatch {
            description: Some(None),
            category_id: Some(None),
            ..VideoPatch::default()
        };
        db.update_video(&id, &clear).unwrap();
        let video = db.get_video(&id).unwrap().unwrap();
        assert_eq!(video.title, "Renamed");
        assert!(video.description.is_none());
        assert!(video.category_id.is_none());
    }

    #[test]
    fn delete_cascades_to_views_comments_and_reactions() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let fan = seed_user(&db, "fan");
        let id = seed_video(&db, uuid_n(1), &owner, 1, "public");
        db.record_view(&id, Some(&fan)).unwrap();
        let comment = db.create_comment(&id, &fan, "nice").unwrap();
        db.toggle_reaction(&fan, &ReactionTarget::video(id.parse().unwrap()), ReactionType::Like)
            .unwrap();
        db.toggle_reaction(&fan, &ReactionTarget::comment(comment.parse().unwrap()), ReactionType::Like)
            .unwrap();

        assert!(db.delete_video(&id).unwrap());
        assert!(db.get_video(&id).unwrap().is_none());
        assert_eq!(db.count(Counter::Views, &id).unwrap(), 0);
        assert_eq!(reaction_rows(&db, &fan), 0);
        assert!(db.get_comment(&comment).unwrap().is_none());
    }

    #[test]
    fn view_includes_subscriber_count() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let fan = seed_user(&db, "fan");
        let id = seed_video(&db, uuid_n(1), &owner, 1, "public");
        db.subscribe(&fan, &owner).unwrap();

        let row = db
            .get_video_view(&id, &Viewer::User { id: fan })
            .unwrap()
            .unwrap();
        assert_eq!(row.owner_subscriber_count, Some(1));
        assert!(row.viewer_subscribed);
        assert!(db.get_video_view(&uuid_n(9), &Viewer::Anonymous).unwrap().is_none());
    }

    #[test]
    fn asset_lifecycle_follows_callbacks() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let id = uuid_n(5);
        db.create_video(&id, &owner, "up-5").unwrap();
        let before = db.get_video(&id).unwrap().unwrap().updated_at;

        assert!(db.link_asset("up-5", "asset-5").unwrap());
        assert!(!db.link_asset("up-unknown", "asset-x").unwrap());
        assert_eq!(db.get_video(&id).unwrap().unwrap().asset_status, "preparing");

        assert!(db.mark_asset_ready("asset-5", None, "play-5", Some(1500)).unwrap());
        let video = db.get_video(&id).unwrap().unwrap();
        assert_eq!(video.asset_status, "ready");
        assert_eq!(video.playback_id.as_deref(), Some("play-5"));
        assert_eq!(video.duration_ms, Some(1500));
        assert_eq!(video.updated_at, before);

        assert!(db.mark_asset_deleted("asset-5", None).unwrap());
        let video = db.get_video(&id).unwrap().unwrap();
        assert_eq!(video.asset_status, "deleted");
        assert!(video.asset_id.is_none());
        assert!(video.playback_id.is_none());
    }

    #[test]
    fn errored_asset_matches_by_upload_id() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let id = uuid_n(6);
        db.create_video(&id, &owner, "up-6").unwrap();

        assert!(db.mark_asset_errored("asset-6", Some("up-6")).unwrap());
        let video = db.get_video(&id).unwrap().unwrap();
        assert_eq!(video.asset_status, "errored");
        assert_eq!(video.asset_id.as_deref(), Some("asset-6"));
    }
}
