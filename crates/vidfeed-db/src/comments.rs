use anyhow::Result;
use rusqlite::Row;
use uuid::Uuid;

use crate::Database;
use crate::aggregate::Counter;
use crate::models::{CommentRow, now_micros};
use crate::queries::OptionalExt;

/// Comment columns with author and reaction counts. Alias `c` is the comment.
pub(crate) fn comment_select() -> String {
    format!(
        "SELECT c.id, c.video_id, c.user_id, u.name, u.image_url, c.value, c.created_at, c.updated_at, \
         {likes} AS like_count, {dislikes} AS dislike_count
         FROM comments c JOIN users u ON u.id = c.user_id",
        likes = Counter::Likes.subquery("c.id"),
        dislikes = Counter::Dislikes.subquery("c.id"),
    )
}

pub(crate) fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        video_id: row.get(1)?,
        user_id: row.get(2)?,
        author_name: row.get(3)?,
        author_image_url: row.get(4)?,
        value: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        like_count: row.get(8)?,
        dislike_count: row.get(9)?,
    })
}

impl Database {
    /// Returns the new comment's id.
    pub fn create_comment(&self, video_id: &str, user_id: &str, value: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.with_conn_mut(|conn| {
            let now = now_micros();
            conn.execute(
                "INSERT INTO comments (id, video_id, user_id, value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![id, video_id, user_id, value, now],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        let sql = format!("{} WHERE c.id = ?1", comment_select());
        self.with_conn(|conn| conn.query_row(&sql, [id], comment_from_row).optional())
    }

    /// Reactions on the comment are cleared by the `comments_drop_reactions` trigger.
    pub fn delete_comment(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }
}
