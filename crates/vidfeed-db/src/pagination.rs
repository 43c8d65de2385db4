//! Keyset pagination.
//!
//! Listings are ordered by `(primary DESC, id DESC)`. A page is fetched as
//! `limit + 1` rows strictly after the cursor:
//!
//! ```text
//! primary < :cursor_key OR (primary = :cursor_key AND id < :cursor_id)
//! ```
//!
//! The extra row only signals that another page exists and is dropped before
//! returning. Ids are unique, so the order is total even when the primary
//! value repeats.
//!
//! Rows whose sort key changes while a client is paging (an edited video, a
//! fresh view) can move across the cursor and be skipped or repeated within
//! that session. Feeds are live, so this is accepted.

use anyhow::{Context, Result, ensure};
use rusqlite::types::{ToSql, Value};
use tracing::debug;
use uuid::Uuid;
use vidfeed_types::cursor::{SortKey, SortPolicy};
use vidfeed_types::models::Visibility;
use vidfeed_types::page::{Limit, Page};

use crate::Database;
use crate::aggregate::Counter;
use crate::comments::{comment_from_row, comment_select};
use crate::models::{CommentRow, VideoRow, from_micros};
use crate::videos::{video_from_row, video_select, viewer_joins};
use crate::viewer::Viewer;

/// Named parameters for dynamically assembled statements.
#[derive(Default)]
pub(crate) struct SqlParams {
    values: Vec<(&'static str, Value)>,
}

impl SqlParams {
    pub(crate) fn bind(&mut self, name: &'static str, value: impl Into<Value>) {
        self.values.push((name, value.into()));
    }

    pub(crate) fn as_named(&self) -> Vec<(&str, &dyn ToSql)> {
        self.values
            .iter()
            .map(|(name, value)| (*name, value as &dyn ToSql))
            .collect()
    }
}

/// The two ordering columns of a listing, as SQL expressions.
pub(crate) struct Keyset<'a> {
    pub primary: &'a str,
    pub id: &'a str,
}

impl Keyset<'_> {
    /// Strict "after the cursor" predicate. Never `<=`, or the boundary row
    /// would be served twice.
    pub(crate) fn after(&self, cursor: &SortKey, params: &mut SqlParams) -> String {
        params.bind(":cursor_key", primary_value(cursor));
        params.bind(":cursor_id", cursor.id().to_string());
        format!(
            "({p} < :cursor_key OR ({p} = :cursor_key AND {id} < :cursor_id))",
            p = self.primary,
            id = self.id
        )
    }

    pub(crate) fn order_by(&self) -> String {
        format!("ORDER BY {} DESC, {} DESC", self.primary, self.id)
    }
}

fn primary_value(key: &SortKey) -> i64 {
    match key {
        SortKey::Recency { updated_at, .. } => updated_at.timestamp_micros(),
        SortKey::Popularity { view_count, .. } => *view_count,
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("corrupt row id '{}'", raw))
}

/// Which videos a listing may show. The default matches every video of
/// every visibility.
#[derive(Debug, Clone, Default)]
pub struct VideoFilter {
    pub visibility: Option<Visibility>,
    pub category_id: Option<String>,
    /// Restrict to creators this user subscribes to.
    pub subscribed_by: Option<String>,
    /// Restrict to one creator's videos.
    pub owned_by: Option<String>,
    /// Leave this video out.
    pub excluding: Option<String>,
}

impl VideoFilter {
    pub fn public() -> Self {
        Self {
            visibility: Some(Visibility::Public),
            ..Self::default()
        }
    }

    pub fn in_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn subscribed_by(mut self, viewer_id: impl Into<String>) -> Self {
        self.subscribed_by = Some(viewer_id.into());
        self
    }

    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.owned_by = Some(user_id.into());
        self
    }

    pub fn excluding(mut self, video_id: impl Into<String>) -> Self {
        self.excluding = Some(video_id.into());
        self
    }

    fn apply(&self, wheres: &mut Vec<String>, params: &mut SqlParams) {
        if let Some(visibility) = self.visibility {
            wheres.push("v.visibility = :visibility".into());
            params.bind(":visibility", visibility.as_str().to_string());
        }
        if let Some(category_id) = &self.category_id {
            wheres.push("v.category_id = :category_id".into());
            params.bind(":category_id", category_id.clone());
        }
        if let Some(viewer_id) = &self.subscribed_by {
            wheres.push(
                "v.user_id IN (SELECT creator_id FROM subscriptions WHERE viewer_id = :subscriber)"
                    .into(),
            );
            params.bind(":subscriber", viewer_id.clone());
        }
        if let Some(owner_id) = &self.owned_by {
            wheres.push("v.user_id = :owner".into());
            params.bind(":owner", owner_id.clone());
        }
        if let Some(video_id) = &self.excluding {
            wheres.push("v.id <> :excluded".into());
            params.bind(":excluded", video_id.clone());
        }
    }
}

impl VideoRow {
    pub fn sort_key(&self, policy: SortPolicy) -> Result<SortKey> {
        let id = parse_id(&self.video.id)?;
        Ok(match policy {
            SortPolicy::Recency => SortKey::Recency {
                updated_at: from_micros(self.video.updated_at),
                id,
            },
            SortPolicy::Popularity => SortKey::Popularity {
                view_count: self.view_count,
                id,
            },
        })
    }
}

impl CommentRow {
    pub fn sort_key(&self) -> Result<SortKey> {
        Ok(SortKey::Recency {
            updated_at: from_micros(self.updated_at),
            id: parse_id(&self.id)?,
        })
    }
}

fn where_clause(wheres: &[String]) -> String {
    if wheres.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", wheres.join(" AND "))
    }
}

impl Database {
    /// One page of videos matching `filter`, ordered by `policy`, with live
    /// counters and the viewer's own state attached in the same statement.
    pub fn page_videos(
        &self,
        filter: &VideoFilter,
        policy: SortPolicy,
        cursor: Option<&SortKey>,
        limit: Limit,
        viewer: &Viewer,
    ) -> Result<Page<VideoRow>> {
        if let Some(cursor) = cursor {
            ensure!(
                cursor.policy() == policy,
                "{} cursor passed to a {} listing",
                cursor.policy(),
                policy
            );
        }

        let mut params = SqlParams::default();
        viewer.bind(&mut params);

        let mut inner_wheres = Vec::new();
        filter.apply(&mut inner_wheres, &mut params);

        let primary = match policy {
            SortPolicy::Recency => "v.updated_at".to_string(),
            SortPolicy::Popularity => Counter::Views.subquery("v.id"),
        };
        let inner = format!(
            "{select}, {primary} AS sort_value FROM videos v JOIN users u ON u.id = v.user_id {joins} {wheres}",
            select = video_select(),
            joins = viewer_joins(),
            wheres = where_clause(&inner_wheres),
        );

        // The derived table lets the popularity keyset compare against the
        // computed count like an ordinary column.
        let keyset = Keyset {
            primary: "feed.sort_value",
            id: "feed.id",
        };
        let mut outer_wheres = Vec::new();
        if let Some(cursor) = cursor {
            outer_wheres.push(keyset.after(cursor, &mut params));
        }
        params.bind(":probe", limit.probe());

        let sql = format!(
            "SELECT * FROM ({inner}) AS feed {wheres} {order} LIMIT :probe",
            wheres = where_clause(&outer_wheres),
            order = keyset.order_by(),
        );

        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_named().as_slice(), video_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        debug!(
            "Video page: policy={} fetched={} limit={} cursor={}",
            policy,
            rows.len(),
            limit.get(),
            cursor.is_some()
        );
        Page::from_probe(rows, limit, |row| row.sort_key(policy))
    }

    /// Comments on one video, newest first, with their like/dislike counts.
    pub fn page_comments(
        &self,
        video_id: &str,
        cursor: Option<&SortKey>,
        limit: Limit,
    ) -> Result<Page<CommentRow>> {
        if let Some(cursor) = cursor {
            ensure!(
                cursor.policy() == SortPolicy::Recency,
                "{} cursor passed to a comment listing",
                cursor.policy()
            );
        }

        let keyset = Keyset {
            primary: "c.updated_at",
            id: "c.id",
        };
        let mut params = SqlParams::default();
        let mut wheres = vec!["c.video_id = :video_id".to_string()];
        params.bind(":video_id", video_id.to_string());
        if let Some(cursor) = cursor {
            wheres.push(keyset.after(cursor, &mut params));
        }
        params.bind(":probe", limit.probe());

        let sql = format!(
            "{select} {wheres} {order} LIMIT :probe",
            select = comment_select(),
            wheres = where_clause(&wheres),
            order = keyset.order_by(),
        );

        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_named().as_slice(), comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Page::from_probe(rows, limit, CommentRow::sort_key)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::test_support::*;
    use vidfeed_types::models::{ReactionTarget, ReactionType};

    fn ids(page: &Page<VideoRow>) -> Vec<String> {
        page.items.iter().map(|r| r.video.id.clone()).collect()
    }

    fn limit(n: i64) -> Limit {
        Limit::new(n).unwrap()
    }

    /// Follow cursors until exhaustion, returning every id in order.
    fn drain(db: &Database, filter: &VideoFilter, policy: SortPolicy, page_size: i64) -> Vec<String> {
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = db
                .page_videos(filter, policy, cursor.as_ref(), limit(page_size), &Viewer::Anonymous)
                .unwrap();
            assert!(page.items.len() <= page_size as usize);
            seen.extend(ids(&page));
            match page.next_cursor {
                Some(next) => {
                    // The token a client would hold must decode back to the same key.
                    let token = next.encode();
                    cursor = Some(SortKey::decode(&token, policy).unwrap());
                }
                None => return seen,
            }
        }
    }

    #[test]
    fn ties_on_updated_at_break_by_descending_id() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let a = seed_video(&db, uuid_n(9), &owner, 5, "public");
        let b = seed_video(&db, uuid_n(3), &owner, 5, "public");
        let c = seed_video(&db, uuid_n(7), &owner, 2, "public");

        let first = db
            .page_videos(&VideoFilter::public(), SortPolicy::Recency, None, limit(2), &Viewer::Anonymous)
            .unwrap();
        assert_eq!(ids(&first), vec![a, b.clone()]);
        assert_eq!(
            first.next_cursor,
            Some(SortKey::Recency {
                updated_at: from_micros(5),
                id: b.parse().unwrap(),
            })
        );

        let second = db
            .page_videos(
                &VideoFilter::public(),
                SortPolicy::Recency,
                first.next_cursor.as_ref(),
                limit(2),
                &Viewer::Anonymous,
            )
            .unwrap();
        assert_eq!(ids(&second), vec![c]);
        assert!(second.next_cursor.is_none());
    }

    #[test]
    fn chained_pages_cover_everything_exactly_once() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let mut expected = Vec::new();
        // Many shared timestamps to stress the tie-break.
        for n in 1..=23u128 {
            expected.push((n as i64 % 4, seed_video(&db, uuid_n(n), &owner, n as i64 % 4, "public")));
        }
        expected.sort_by(|x, y| y.cmp(x));
        let expected: Vec<String> = expected.into_iter().map(|(_, id)| id).collect();

        for page_size in [1, 2, 5, 23, 100] {
            let seen = drain(&db, &VideoFilter::public(), SortPolicy::Recency, page_size);
            assert_eq!(seen, expected, "page size {}", page_size);
            let unique: HashSet<_> = seen.iter().collect();
            assert_eq!(unique.len(), seen.len());
        }
    }

    #[test]
    fn cursor_only_when_more_rows_exist() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        for n in 1..=4u128 {
            seed_video(&db, uuid_n(n), &owner, n as i64, "public");
        }

        let exact = db
            .page_videos(&VideoFilter::public(), SortPolicy::Recency, None, limit(4), &Viewer::Anonymous)
            .unwrap();
        assert_eq!(exact.items.len(), 4);
        assert!(exact.next_cursor.is_none());

        let short = db
            .page_videos(&VideoFilter::public(), SortPolicy::Recency, None, limit(3), &Viewer::Anonymous)
            .unwrap();
        assert_eq!(short.items.len(), 3);
        assert!(short.next_cursor.is_some());
    }

    #[test]
    fn trending_orders_by_view_count_then_id() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let low = seed_video(&db, uuid_n(1), &owner, 100, "public");
        let tie_hi = seed_video(&db, uuid_n(8), &owner, 1, "public");
        let tie_lo = seed_video(&db, uuid_n(4), &owner, 50, "public");
        let top = seed_video(&db, uuid_n(2), &owner, 10, "public");

        for _ in 0..5 {
            db.record_view(&top, None).unwrap();
        }
        for video in [&tie_hi, &tie_lo] {
            for _ in 0..2 {
                db.record_view(video, None).unwrap();
            }
        }

        let first = db
            .page_videos(&VideoFilter::public(), SortPolicy::Popularity, None, limit(2), &Viewer::Anonymous)
            .unwrap();
        assert_eq!(ids(&first), vec![top.clone(), tie_hi.clone()]);
        assert_eq!(first.items[0].view_count, 5);
        assert_eq!(
            first.next_cursor,
            Some(SortKey::Popularity {
                view_count: 2,
                id: tie_hi.parse().unwrap(),
            })
        );

        let all = drain(&db, &VideoFilter::public(), SortPolicy::Popularity, 1);
        assert_eq!(all, vec![top, tie_hi, tie_lo, low]);
    }

    #[test]
    fn filters_visibility_category_and_subscriptions() {
        let db = Database::open_in_memory().unwrap();
        let creator = seed_user(&db, "creator");
        let other = seed_user(&db, "other");
        let viewer = seed_user(&db, "viewer");
        let category = db.list_categories().unwrap().remove(0).id;

        let public = seed_video(&db, uuid_n(1), &creator, 1, "public");
        seed_video(&db, uuid_n(2), &creator, 2, "private");
        seed_video(&db, uuid_n(3), &creator, 3, "unlisted");
        let other_public = seed_video(&db, uuid_n(4), &other, 4, "public");
        db.with_conn_mut(|conn| {
            conn.execute("UPDATE videos SET category_id = ?1 WHERE id = ?2", [&category, &other_public])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(
            drain(&db, &VideoFilter::public(), SortPolicy::Recency, 10),
            vec![other_public.clone(), public.clone()]
        );
        assert_eq!(
            drain(&db, &VideoFilter::public().in_category(category), SortPolicy::Recency, 10),
            vec![other_public]
        );

        let subscribed = VideoFilter::public().subscribed_by(viewer.clone());
        assert!(drain(&db, &subscribed, SortPolicy::Recency, 10).is_empty());
        db.subscribe(&viewer, &creator).unwrap();
        assert_eq!(drain(&db, &subscribed, SortPolicy::Recency, 10), vec![public]);
    }

    #[test]
    fn owner_listing_spans_every_visibility() {
        let db = Database::open_in_memory().unwrap();
        let creator = seed_user(&db, "creator");
        let other = seed_user(&db, "other");
        let public = seed_video(&db, uuid_n(1), &creator, 1, "public");
        let private = seed_video(&db, uuid_n(2), &creator, 2, "private");
        let unlisted = seed_video(&db, uuid_n(3), &creator, 3, "unlisted");
        seed_video(&db, uuid_n(4), &other, 4, "public");

        let studio = VideoFilter::default().owned_by(creator.clone());
        assert_eq!(
            drain(&db, &studio, SortPolicy::Recency, 2),
            vec![unlisted, private, public.clone()]
        );
        assert_eq!(
            drain(&db, &VideoFilter::public().owned_by(creator), SortPolicy::Recency, 2),
            vec![public]
        );
    }

    #[test]
    fn excluded_video_is_left_out() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let category = db.list_categories().unwrap().remove(0).id;
        let current = seed_video(&db, uuid_n(1), &owner, 3, "public");
        let same = seed_video(&db, uuid_n(2), &owner, 2, "public");
        let elsewhere = seed_video(&db, uuid_n(3), &owner, 1, "public");
        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE videos SET category_id = ?1 WHERE id IN (?2, ?3)",
                [&category, &current, &same],
            )?;
            Ok(())
        })
        .unwrap();

        let related = VideoFilter::public().in_category(category).excluding(current.clone());
        assert_eq!(drain(&db, &related, SortPolicy::Recency, 1), vec![same.clone()]);
        let any = VideoFilter::public().excluding(current);
        assert_eq!(drain(&db, &any, SortPolicy::Recency, 1), vec![same, elsewhere]);
    }

    #[test]
    fn corrupt_boundary_id_fails_instead_of_skipping() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        seed_video(&db, "not-a-uuid".to_string(), &owner, 9, "public");
        seed_video(&db, uuid_n(1), &owner, 1, "public");

        // The corrupt row would become the cursor.
        assert!(
            db.page_videos(&VideoFilter::public(), SortPolicy::Recency, None, limit(1), &Viewer::Anonymous)
                .is_err()
        );
        // No cursor is derived when everything fits.
        let page = db
            .page_videos(&VideoFilter::public(), SortPolicy::Recency, None, limit(5), &Viewer::Anonymous)
            .unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn rows_carry_counts_and_viewer_state() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let alice = seed_user(&db, "alice");
        let video = seed_video(&db, uuid_n(1), &owner, 1, "public");
        db.record_view(&video, Some(&alice)).unwrap();
        db.toggle_reaction(&alice, &ReactionTarget::video(video.parse().unwrap()), ReactionType::Like)
            .unwrap();
        db.subscribe(&alice, &owner).unwrap();

        let as_alice = Viewer::User { id: alice };
        let page = db
            .page_videos(&VideoFilter::public(), SortPolicy::Recency, None, limit(10), &as_alice)
            .unwrap();
        let row = &page.items[0];
        assert_eq!(row.view_count, 1);
        assert_eq!(row.like_count, 1);
        assert_eq!(row.dislike_count, 0);
        assert_eq!(row.viewer_reaction.as_deref(), Some("like"));
        assert!(row.viewer_subscribed);
        assert_eq!(row.owner_name, "owner");

        let anon = db
            .page_videos(&VideoFilter::public(), SortPolicy::Recency, None, limit(10), &Viewer::Anonymous)
            .unwrap();
        assert_eq!(anon.items[0].like_count, 1);
        assert!(anon.items[0].viewer_reaction.is_none());
        assert!(!anon.items[0].viewer_subscribed);
    }

    #[test]
    fn mismatched_cursor_is_refused() {
        let db = Database::open_in_memory().unwrap();
        let cursor = SortKey::Popularity {
            view_count: 1,
            id: Uuid::nil(),
        };
        assert!(
            db.page_videos(
                &VideoFilter::public(),
                SortPolicy::Recency,
                Some(&cursor),
                limit(5),
                &Viewer::Anonymous
            )
            .is_err()
        );
    }
}
