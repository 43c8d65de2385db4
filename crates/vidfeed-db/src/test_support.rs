//! Fixtures shared by the unit tests.

use uuid::Uuid;

use crate::Database;

/// Deterministic id whose string order follows `n`.
pub(crate) fn uuid_n(n: u128) -> String {
    Uuid::from_u128(n).to_string()
}

/// Synced user whose external id and display name are both `external`.
pub(crate) fn seed_user(db: &Database, external: &str) -> String {
    db.upsert_identity_user(external, external, None).unwrap()
}

pub(crate) fn seed_video(
    db: &Database,
    id: String,
    owner: &str,
    updated_at: i64,
    visibility: &str,
) -> String {
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO videos (id, user_id, title, visibility, created_at, updated_at)
             VALUES (?1, ?2, 'clip', ?3, ?4, ?4)",
            rusqlite::params![id, owner, visibility, updated_at],
        )?;
        Ok(())
    })
    .unwrap();
    id
}

pub(crate) fn reaction_rows(db: &Database, user_id: &str) -> i64 {
    db.with_conn(|conn| {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM reactions WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(n)
    })
    .unwrap()
}
