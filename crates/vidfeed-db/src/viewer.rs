//! Who is asking, and what is theirs.
//!
//! A viewer is resolved once per request from the identity provider's subject.
//! Personalization (own reaction, subscribed flag) is then expressed as LEFT
//! JOINs keyed on the `:viewer` parameter, which is NULL for anonymous
//! requests so the joins simply match nothing.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::debug;
use vidfeed_types::models::ReactionType;

use crate::Database;
use crate::pagination::SqlParams;
use crate::queries::OptionalExt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Viewer {
    #[default]
    Anonymous,
    User {
        id: String,
    },
}

impl Viewer {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User { id } => Some(id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    pub(crate) fn bind(&self, params: &mut SqlParams) {
        params.bind(":viewer", self.id().map(str::to_string));
    }
}

/// `LEFT JOIN` exposing the viewer's reaction on `target` as `{alias}.type`.
pub(crate) fn reaction_join(alias: &str, target: &str) -> String {
    format!(
        "LEFT JOIN reactions {alias} ON {alias}.target_id = {target} AND {alias}.user_id = :viewer"
    )
}

/// `LEFT JOIN` whose `{alias}.viewer_id` is non-NULL when the viewer follows `creator`.
pub(crate) fn subscription_join(alias: &str, creator: &str) -> String {
    format!(
        "LEFT JOIN subscriptions {alias} ON {alias}.creator_id = {creator} AND {alias}.viewer_id = :viewer"
    )
}

impl Database {
    /// Map a provider subject to a local viewer. Unknown or absent subjects
    /// are anonymous; this never creates a user.
    pub fn resolve_viewer(&self, external_id: Option<&str>) -> Result<Viewer> {
        let Some(external_id) = external_id else {
            return Ok(Viewer::Anonymous);
        };

        let id: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM users WHERE external_id = ?1",
                [external_id],
                |row| row.get(0),
            )
            .optional()
        })?;

        match id {
            Some(id) => Ok(Viewer::User { id }),
            None => {
                debug!("Identity {} has no local user yet, treating as anonymous", external_id);
                Ok(Viewer::Anonymous)
            }
        }
    }

    pub fn subscribed_creator_ids(&self, viewer: &Viewer) -> Result<HashSet<String>> {
        let Some(viewer_id) = viewer.id() else {
            return Ok(HashSet::new());
        };

        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT creator_id FROM subscriptions WHERE viewer_id = ?1")?;
            let ids = stmt
                .query_map([viewer_id], |row| row.get(0))?
                .collect::<std::result::Result<HashSet<String>, _>>()?;
            Ok(ids)
        })
    }

    /// Batch-fetch the viewer's reactions on a set of targets.
    pub fn reactions_by_target(
        &self,
        viewer: &Viewer,
        target_ids: &[String],
    ) -> Result<HashMap<String, ReactionType>> {
        let Some(viewer_id) = viewer.id() else {
            return Ok(HashMap::new());
        };
        if target_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=target_ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT target_id, type FROM reactions WHERE user_id = ?1 AND target_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(target_ids.len() + 1);
            params.push(&viewer_id);
            params.extend(target_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut map = HashMap::with_capacity(rows.len());
            for (target_id, ty) in rows {
                map.insert(target_id, ty.parse::<ReactionType>()?);
            }
            Ok(map)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use vidfeed_types::models::ReactionTarget;

    #[test]
    fn unknown_or_missing_identity_is_anonymous() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.resolve_viewer(None).unwrap(), Viewer::Anonymous);
        assert_eq!(db.resolve_viewer(Some("user_unsynced")).unwrap(), Viewer::Anonymous);
        // Resolution must not have created anything.
        assert!(db.get_user_by_external_id("user_unsynced").unwrap().is_none());
    }

    #[test]
    fn known_identity_maps_to_internal_id() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_user(&db, "alice");
        assert_eq!(db.resolve_viewer(Some("alice")).unwrap(), Viewer::User { id });
    }

    #[test]
    fn anonymous_scope_has_no_personal_state() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let video = seed_video(&db, uuid_n(1), &owner, 1, "public");

        assert!(db.subscribed_creator_ids(&Viewer::Anonymous).unwrap().is_empty());
        assert!(db
            .reactions_by_target(&Viewer::Anonymous, &[video])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn personal_state_is_scoped_to_the_viewer() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let v1 = seed_video(&db, uuid_n(1), &owner, 1, "public");
        let v2 = seed_video(&db, uuid_n(2), &owner, 2, "public");

        db.subscribe(&alice, &owner).unwrap();
        db.toggle_reaction(&alice, &ReactionTarget::video(v1.parse().unwrap()), ReactionType::Dislike)
            .unwrap();
        db.toggle_reaction(&bob, &ReactionTarget::video(v2.parse().unwrap()), ReactionType::Like)
            .unwrap();

        let alice_viewer = Viewer::User { id: alice };
        let subs = db.subscribed_creator_ids(&alice_viewer).unwrap();
        assert!(subs.contains(&owner));

        let reactions = db
            .reactions_by_target(&alice_viewer, &[v1.clone(), v2.clone()])
            .unwrap();
        assert_eq!(reactions.get(&v1), Some(&ReactionType::Dislike));
        assert_eq!(reactions.get(&v2), None);
    }
}
