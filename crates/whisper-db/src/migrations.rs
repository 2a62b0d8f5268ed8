use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS actors (
            id              INTEGER PRIMARY KEY,
            display_name    TEXT NOT NULL,
            nickname        TEXT NOT NULL DEFAULT '',
            bio             TEXT NOT NULL DEFAULT '',
            emoji           TEXT NOT NULL DEFAULT '',
            aura            INTEGER NOT NULL DEFAULT 0,
            streak_start    TEXT NOT NULL DEFAULT (datetime('now')),
            best_streak     INTEGER NOT NULL DEFAULT 0,
            last_active     TEXT NOT NULL DEFAULT (datetime('now')),
            banned          INTEGER NOT NULL DEFAULT 0,
            menu_message_id INTEGER,
            flow_state      TEXT
        );

        -- Dedup markers: one row per inbound update id, insert-once.
        CREATE TABLE IF NOT EXISTS updates (
            id          INTEGER PRIMARY KEY,
            received_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config (
            key     TEXT PRIMARY KEY,
            value   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS buttons (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            label   TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            links   TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS channels (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            name    TEXT NOT NULL UNIQUE,
            link    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS confessions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            author_id   INTEGER NOT NULL REFERENCES actors(id),
            author_name TEXT NOT NULL,
            body        TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            public_id   INTEGER UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_confessions_status
            ON confessions(status, created_at);

        CREATE TABLE IF NOT EXISTS confession_votes (
            confession_id INTEGER NOT NULL REFERENCES confessions(id) ON DELETE CASCADE,
            voter_id      INTEGER NOT NULL,
            direction     TEXT NOT NULL,
            PRIMARY KEY (confession_id, voter_id)
        );

        CREATE TABLE IF NOT EXISTS comments (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            confession_id INTEGER NOT NULL REFERENCES confessions(id) ON DELETE CASCADE,
            author_id     INTEGER NOT NULL,
            author_name   TEXT NOT NULL,
            body          TEXT NOT NULL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_comments_confession
            ON comments(confession_id, id);

        CREATE TABLE IF NOT EXISTS comment_votes (
            comment_id INTEGER NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
            voter_id   INTEGER NOT NULL,
            direction  TEXT NOT NULL,
            PRIMARY KEY (comment_id, voter_id)
        );

        -- One level deep only: a reply hangs off a comment, never off a reply.
        CREATE TABLE IF NOT EXISTS replies (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            comment_id  INTEGER NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
            author_name TEXT NOT NULL,
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
