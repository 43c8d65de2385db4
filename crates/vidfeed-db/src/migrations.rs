use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            -- Local projection of identity provider users.
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                image_url   TEXT,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE categories (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                description TEXT
            );

            -- Timestamps are microseconds since the Unix epoch.
            CREATE TABLE videos (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title        TEXT NOT NULL,
                description  TEXT,
                category_id  TEXT REFERENCES categories(id) ON DELETE SET NULL,
                visibility   TEXT NOT NULL DEFAULT 'private'
                             CHECK (visibility IN ('public', 'unlisted', 'private')),
                asset_status TEXT NOT NULL DEFAULT 'waiting',
                upload_id    TEXT UNIQUE,
                asset_id     TEXT UNIQUE,
                playback_id  TEXT,
                duration_ms  INTEGER,
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );

            CREATE INDEX idx_videos_recency
                ON videos(visibility, updated_at DESC, id DESC);
            CREATE INDEX idx_videos_category
                ON videos(category_id, updated_at DESC, id DESC);
            CREATE INDEX idx_videos_owner
                ON videos(user_id, updated_at DESC, id DESC);

            -- Append-only.
            CREATE TABLE video_views (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                video_id    TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                viewer_id   TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_video_views_video ON video_views(video_id);

            CREATE TABLE subscriptions (
                viewer_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                creator_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (viewer_id, creator_id)
            );

            CREATE INDEX idx_subscriptions_creator ON subscriptions(creator_id);

            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                video_id    TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                value       TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_comments_video
                ON comments(video_id, updated_at DESC, id DESC);

            -- One row per (user, target) whatever the target kind.
            CREATE TABLE reactions (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                target_kind TEXT NOT NULL CHECK (target_kind IN ('video', 'comment')),
                target_id   TEXT NOT NULL,
                type        TEXT NOT NULL CHECK (type IN ('like', 'dislike')),
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL,
                PRIMARY KEY (user_id, target_id)
            );

            CREATE INDEX idx_reactions_target ON reactions(target_id, type);

            -- target_id has no foreign key, so removal of a target (directly
            -- or through a cascade) clears its reactions here.
            CREATE TRIGGER videos_drop_reactions AFTER DELETE ON videos
            BEGIN
                DELETE FROM reactions WHERE target_id = OLD.id;
            END;

            CREATE TRIGGER comments_drop_reactions AFTER DELETE ON comments
            BEGIN
                DELETE FROM reactions WHERE target_id = OLD.id;
            END;

            INSERT INTO categories (id, name, description) VALUES
                ('00000000-0000-0000-0000-000000000101', 'Music', NULL),
                ('00000000-0000-0000-0000-000000000102', 'Gaming', NULL),
                ('00000000-0000-0000-0000-000000000103', 'Education', NULL),
                ('00000000-0000-0000-0000-000000000104', 'Science and Technology', NULL),
                ('00000000-0000-0000-0000-000000000105', 'Travel', NULL);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
