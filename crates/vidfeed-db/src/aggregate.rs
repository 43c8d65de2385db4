//! Live counters derived from the event and edge tables.
//!
//! Nothing is stored: each counter is a correlated `COUNT(*)` that either runs
//! on its own ([`Database::count`]) or is spliced into a larger SELECT so a
//! whole page gets its counts in the same statement.

use anyhow::Result;

use crate::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// View events on a video.
    Views,
    /// `like` reactions on a video or comment.
    Likes,
    /// `dislike` reactions on a video or comment.
    Dislikes,
    /// Subscriptions pointing at a creator.
    Subscribers,
    /// A creator's public videos.
    PublicVideos,
}

impl Counter {
    /// Scalar subquery counting rows that reference `target`, which is either
    /// a column of the outer query or a bound parameter.
    pub(crate) fn subquery(self, target: &str) -> String {
        match self {
            Self::Views => format!(
                "(SELECT COUNT(*) FROM video_views cv WHERE cv.video_id = {target})"
            ),
            Self::Likes => format!(
                "(SELECT COUNT(*) FROM reactions cr WHERE cr.target_id = {target} AND cr.type = 'like')"
            ),
            Self::Dislikes => format!(
                "(SELECT COUNT(*) FROM reactions cr WHERE cr.target_id = {target} AND cr.type = 'dislike')"
            ),
            Self::Subscribers => format!(
                "(SELECT COUNT(*) FROM subscriptions cs WHERE cs.creator_id = {target})"
            ),
            Self::PublicVideos => format!(
                "(SELECT COUNT(*) FROM videos cvid WHERE cvid.user_id = {target} AND cvid.visibility = 'public')"
            ),
        }
    }
}

impl Database {
    /// Current value of one counter. Unknown targets count zero.
    pub fn count(&self, counter: Counter, target_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {}", counter.subquery("?1"));
            let n = conn.query_row(&sql, [target_id], |row| row.get(0))?;
            Ok(n)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use vidfeed_types::models::{ReactionTarget, ReactionType};

    #[test]
    fn missing_target_counts_zero() {
        let db = Database::open_in_memory().unwrap();
        for counter in [
            Counter::Views,
            Counter::Likes,
            Counter::Dislikes,
            Counter::Subscribers,
            Counter::PublicVideos,
        ] {
            assert_eq!(db.count(counter, "nope").unwrap(), 0);
        }
    }

    #[test]
    fn counts_follow_the_underlying_rows() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let video = seed_video(&db, uuid_n(1), &owner, 10, "public");
        seed_video(&db, uuid_n(2), &owner, 11, "private");
        seed_video(&db, uuid_n(3), &owner, 12, "unlisted");

        db.record_view(&video, Some(&alice)).unwrap();
        db.record_view(&video, None).unwrap();
        db.record_view(&video, Some(&alice)).unwrap();

        let target = ReactionTarget::video(video.parse().unwrap());
        db.toggle_reaction(&alice, &target, ReactionType::Like).unwrap();
        db.toggle_reaction(&bob, &target, ReactionType::Dislike).unwrap();
        db.subscribe(&alice, &owner).unwrap();

        assert_eq!(db.count(Counter::Views, &video).unwrap(), 3);
        assert_eq!(db.count(Counter::Likes, &video).unwrap(), 1);
        assert_eq!(db.count(Counter::Dislikes, &video).unwrap(), 1);
        assert_eq!(db.count(Counter::Subscribers, &owner).unwrap(), 1);
        assert_eq!(db.count(Counter::PublicVideos, &owner).unwrap(), 1);

        // Flipping a reaction moves it between counters.
        db.toggle_reaction(&bob, &target, ReactionType::Like).unwrap();
        assert_eq!(db.count(Counter::Likes, &video).unwrap(), 2);
        assert_eq!(db.count(Counter::Dislikes, &video).unwrap(), 0);
    }
}
