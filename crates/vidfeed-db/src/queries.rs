use crate::Database;
use crate::aggregate::Counter;
use crate::models::{CategoryRow, ProfileRow, SubscriptionRow, UserRow, now_micros};
use crate::pagination::SqlParams;
use crate::viewer::{Viewer, subscription_join};
use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

impl Database {
    // -- Users --

    /// Insert or refresh the local projection of a provider user. Returns the
    /// internal id, which stays stable across repeated deliveries.
    pub fn upsert_identity_user(
        &self,
        external_id: &str,
        name: &str,
        image_url: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.with_conn_mut(|conn| {
            let id: String = conn.query_row(
                "INSERT INTO users (id, external_id, name, image_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(external_id) DO UPDATE SET
                     name = excluded.name,
                     image_url = excluded.image_url,
                     updated_at = excluded.updated_at
                 RETURNING id",
                rusqlite::params![id, external_id, name, image_url, now_micros()],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    /// Returns false when no user carries `external_id`.
    pub fn update_identity_user(
        &self,
        external_id: &str,
        name: &str,
        image_url: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET name = ?2, image_url = ?3, updated_at = ?4 WHERE external_id = ?1",
                rusqlite::params![external_id, name, image_url, now_micros()],
            )?;
            Ok(n > 0)
        })
    }

    /// Cascades to the user's videos, comments, reactions and subscriptions.
    pub fn delete_identity_user(&self, external_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM users WHERE external_id = ?1", [external_id])?;
            Ok(n > 0)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "external_id", external_id))
    }

    /// Channel page data: the user, their subscriber and public video counts,
    /// and whether the viewer follows them.
    pub fn get_profile(&self, id: &str, viewer: &Viewer) -> Result<Option<ProfileRow>> {
        let mut params = SqlParams::default();
        viewer.bind(&mut params);
        params.bind(":id", id.to_string());

        let sql = format!(
            "SELECT u.id, u.external_id, u.name, u.image_url, u.created_at, u.updated_at,
                    {subscribers}, {videos}, us.viewer_id IS NOT NULL
             FROM users u {joins}
             WHERE u.id = :id",
            subscribers = Counter::Subscribers.subquery("u.id"),
            videos = Counter::PublicVideos.subquery("u.id"),
            joins = subscription_join("us", "u.id"),
        );

        self.with_conn(|conn| {
            conn.query_row(&sql, params.as_named().as_slice(), |row| {
                Ok(ProfileRow {
                    user: user_from_row(row)?,
                    subscriber_count: row.get(6)?,
                    video_count: row.get(7)?,
                    viewer_subscribed: row.get(8)?,
                })
            })
            .optional()
        })
    }

    // -- Categories --

    pub fn list_categories(&self) -> Result<Vec<CategoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, description FROM categories ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CategoryRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn category_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM categories WHERE id = ?1", [id], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Subscriptions --

    /// Returns true when a new edge was created. Subscribing twice is a no-op.
    pub fn subscribe(&self, viewer_id: &str, creator_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "INSERT INTO subscriptions (viewer_id, creator_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(viewer_id, creator_id) DO NOTHING",
                rusqlite::params![viewer_id, creator_id, now_micros()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn unsubscribe(&self, viewer_id: &str, creator_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM subscriptions WHERE viewer_id = ?1 AND creator_id = ?2",
                [viewer_id, creator_id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn list_subscriptions(&self, viewer_id: &str) -> Result<Vec<SubscriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT viewer_id, creator_id, created_at FROM subscriptions
                 WHERE viewer_id = ?1
                 ORDER BY created_at DESC, creator_id DESC",
            )?;
            let rows = stmt
                .query_map([viewer_id], |row| {
                    Ok(SubscriptionRow {
                        viewer_id: row.get(0)?,
                        creator_id: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        image_url: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, external_id, name, image_url, created_at, updated_at FROM users WHERE {} = ?1",
        column
    );
    conn.query_row(&sql, [value], user_from_row).optional()
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use vidfeed_types::models::{ReactionTarget, ReactionType};

    #[test]
    fn identity_upsert_keeps_internal_id() {
        let db = Database::open_in_memory().unwrap();
        let first = db.upsert_identity_user("user_abc", "Ada", None).unwrap();
        let second = db
            .upsert_identity_user("user_abc", "Ada Lovelace", Some("https://img/a"))
            .unwrap();
        assert_eq!(first, second);

        let user = db.get_user_by_id(&first).unwrap().unwrap();
        assert_eq!(user.name, "Ada Lovelace");
        assert_eq!(user.image_url.as_deref(), Some("https://img/a"));
    }

    #[test]
    fn update_and_delete_report_missing_users() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.update_identity_user("ghost", "x", None).unwrap());
        assert!(!db.delete_identity_user("ghost").unwrap());

        db.upsert_identity_user("user_1", "One", None).unwrap();
        assert!(db.update_identity_user("user_1", "Uno", None).unwrap());
        assert_eq!(db.get_user_by_external_id("user_1").unwrap().unwrap().name, "Uno");
        assert!(db.delete_identity_user("user_1").unwrap());
        assert!(db.get_user_by_external_id("user_1").unwrap().is_none());
    }

    #[test]
    fn deleting_a_user_removes_everything_they_own() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let fan = seed_user(&db, "fan");
        let owned = seed_video(&db, uuid_n(1), &owner, 1, "public");
        let other = seed_video(&db, uuid_n(2), &fan, 2, "public");

        // The fan's activity on the owner's video.
        db.record_view(&owned, Some(&fan)).unwrap();
        let fan_comment = db.create_comment(&owned, &fan, "first").unwrap();
        db.toggle_reaction(&fan, &ReactionTarget::video(owned.parse().unwrap()), ReactionType::Like)
            .unwrap();
        // The owner's activity on the fan's video, and the fan's like on it.
        let owner_comment = db.create_comment(&other, &owner, "thanks").unwrap();
        db.toggle_reaction(&fan, &ReactionTarget::comment(owner_comment.parse().unwrap()), ReactionType::Like)
            .unwrap();
        db.toggle_reaction(&owner, &ReactionTarget::video(other.parse().unwrap()), ReactionType::Dislike)
            .unwrap();
        db.subscribe(&fan, &owner).unwrap();
        db.subscribe(&owner, &fan).unwrap();
        db.record_view(&other, Some(&owner)).unwrap();

        assert!(db.delete_identity_user("owner").unwrap());

        assert!(db.get_user_by_id(&owner).unwrap().is_none());
        assert!(db.get_video(&owned).unwrap().is_none());
        assert!(db.get_comment(&fan_comment).unwrap().is_none());
        assert!(db.get_comment(&owner_comment).unwrap().is_none());
        assert_eq!(reaction_rows(&db, &fan), 0);
        assert_eq!(reaction_rows(&db, &owner), 0);
        assert!(db.list_subscriptions(&fan).unwrap().is_empty());
        assert_eq!(db.count(Counter::Subscribers, &fan).unwrap(), 0);

        // The fan's own video survives; the owner's view stays, anonymised.
        assert!(db.get_video(&other).unwrap().is_some());
        assert_eq!(db.count(Counter::Views, &other).unwrap(), 1);
        assert_eq!(db.count(Counter::Dislikes, &other).unwrap(), 0);
    }

    #[test]
    fn profile_counts_public_videos_and_subscribers() {
        let db = Database::open_in_memory().unwrap();
        let creator = seed_user(&db, "creator");
        let fan = seed_user(&db, "fan");
        seed_video(&db, uuid_n(1), &creator, 1, "public");
        seed_video(&db, uuid_n(2), &creator, 2, "public");
        seed_video(&db, uuid_n(3), &creator, 3, "private");
        db.subscribe(&fan, &creator).unwrap();

        let as_fan = Viewer::User { id: fan.clone() };
        let profile = db.get_profile(&creator, &as_fan).unwrap().unwrap();
        assert_eq!(profile.user.name, "creator");
        assert_eq!(profile.subscriber_count, 1);
        assert_eq!(profile.video_count, 2);
        assert!(profile.viewer_subscribed);

        let anon = db.get_profile(&creator, &Viewer::Anonymous).unwrap().unwrap();
        assert!(!anon.viewer_subscribed);
        assert_eq!(anon.subscriber_count, 1);

        let own = db.get_profile(&fan, &as_fan).unwrap().unwrap();
        assert_eq!(own.subscriber_count, 0);
        assert!(!own.viewer_subscribed);

        assert!(db.get_profile(&uuid_n(99), &Viewer::Anonymous).unwrap().is_none());
    }

    #[test]
    fn subscriptions_are_unique_per_pair() {
        let db = Database::open_in_memory().unwrap();
        let viewer = db.upsert_identity_user("v", "Viewer", None).unwrap();
        let creator = db.upsert_identity_user("c", "Creator", None).unwrap();

        assert!(db.subscribe(&viewer, &creator).unwrap());
        assert!(!db.subscribe(&viewer, &creator).unwrap());
        assert_eq!(db.list_subscriptions(&viewer).unwrap().len(), 1);

        assert!(db.unsubscribe(&viewer, &creator).unwrap());
        assert!(!db.unsubscribe(&viewer, &creator).unwrap());
        assert!(db.list_subscriptions(&viewer).unwrap().is_empty());
    }

    #[test]
    fn seeded_categories_are_listed() {
        let db = Database::open_in_memory().unwrap();
        let categories = db.list_categories().unwrap();
        assert!(!categories.is_empty());
        assert!(db.category_exists(&categories[0].id).unwrap());
        assert!(!db.category_exists("missing").unwrap());
    }
}
