use anyhow::Result;
use rusqlite::OptionalExtension;
use whisper_types::{Comment, Confession, ConfessionStatus, Reply, VoteDirection, VoteTally};

use crate::{Database, parse_ts};

impl Database {
    // -- Submission and moderation --

    /// Create a pending confession tagged with the author's display name at
    /// submission time. Returns the internal row id.
    pub fn insert_confession(&self, author_id: i64, author_name: &str, body: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO confessions (author_id, author_name, body) VALUES (?1, ?2, ?3)",
                rusqlite::params![author_id, author_name, body],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// One pending confession for the approval queue: whatever the store
    /// returns first, no ordering promise.
    pub fn first_pending(&self) -> Result<Option<Confession>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, author_id, author_name, body, status, public_id, created_at
                     FROM confessions WHERE status = 'pending' LIMIT 1",
                    [],
                    confession_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// `pending -> approved`: assigns the next sequential public id (one
    /// greater than the current maximum, floor 1000) and returns it with the
    /// author id. Returns `None` if the row is not pending anymore.
    ///
    /// Read-then-write without isolation; approvals are rare and admin-only,
    /// so best-effort monotonic is accepted.
    pub fn approve_confession(&self, id: i64) -> Result<Option<(i64, i64)>> {
        self.with_conn_mut(|conn| {
            let author: Option<i64> = conn
                .query_row(
                    "SELECT author_id FROM confessions WHERE id = ?1 AND status = 'pending'",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(author_id) = author else {
                return Ok(None);
            };

            let next: i64 = conn.query_row(
                "SELECT COALESCE(MAX(public_id), 999) + 1 FROM confessions",
                [],
                |row| row.get(0),
            )?;
            conn.execute(
                "UPDATE confessions SET status = 'approved', public_id = ?2 WHERE id = ?1",
                rusqlite::params![id, next],
            )?;
            Ok(Some((next, author_id)))
        })
    }

    /// `pending -> deleted`. A rejected confession never receives a public
    /// id; its comments and votes go with it.
    pub fn reject_confession(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM confessions WHERE id = ?1 AND status = 'pending'",
                [id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn get_confession(&self, id: i64) -> Result<Option<Confession>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, author_id, author_name, body, status, public_id, created_at
                     FROM confessions WHERE id = ?1",
                    [id],
                    confession_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Browsing --

    /// One page of approved confessions, newest first, plus the total count
    /// so the caller can decide whether previous/next controls exist.
    pub fn approved_page(&self, page: u32, page_size: u32) -> Result<(Vec<Confession>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM confessions WHERE status = 'approved'",
                [],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, author_id, author_name, body, status, public_id, created_at
                 FROM confessions
                 WHERE status = 'approved'
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![page_size, page as i64 * page_size as i64],
                    confession_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    // -- Voting --

    /// Cast or switch a vote as one conflict-upsert statement. The composite
    /// primary key keeps a voter in at most one direction per confession;
    /// repeating the same direction changes nothing.
    pub fn cast_vote(&self, confession_id: i64, voter_id: i64, dir: VoteDirection) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO confession_votes (confession_id, voter_id, direction)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(confession_id, voter_id) DO UPDATE SET direction = excluded.direction",
                rusqlite::params![confession_id, voter_id, dir.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn vote_tally(&self, confession_id: i64) -> Result<VoteTally> {
        self.with_conn(|conn| {
            let tally = conn.query_row(
                "SELECT COUNT(CASE WHEN direction = 'up' THEN 1 END),
                        COUNT(CASE WHEN direction = 'down' THEN 1 END)
                 FROM confession_votes WHERE confession_id = ?1",
                [confession_id],
                |row| {
                    Ok(VoteTally {
                        up: row.get(0)?,
                        down: row.get(1)?,
                    })
                },
            )?;
            Ok(tally)
        })
    }

    // -- Comments --

    pub fn insert_comment(
        &self,
        confession_id: i64,
        author_id: i64,
        author_name: &str,
        body: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (confession_id, author_id, author_name, body)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![confession_id, author_id, author_name, body],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn comment_count(&self, confession_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE confession_id = ?1",
                [confession_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    /// The `idx`-th comment of a confession in insertion order, for the
    /// one-per-page detail view.
    pub fn comment_at(&self, confession_id: i64, idx: u32) -> Result<Option<Comment>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, confession_id, author_id, author_name, body, created_at
                     FROM comments WHERE confession_id = ?1
                     ORDER BY id ASC LIMIT 1 OFFSET ?2",
                    rusqlite::params![confession_id, idx],
                    comment_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, confession_id, author_id, author_name, body, created_at
                     FROM comments WHERE id = ?1",
                    [id],
                    comment_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Position of a comment within its confession, in insertion order.
    pub fn comment_index(&self, comment: &Comment) -> Result<u32> {
        self.with_conn(|conn| {
            let idx: u32 = conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE confession_id = ?1 AND id < ?2",
                rusqlite::params![comment.confession_id, comment.id],
                |row| row.get(0),
            )?;
            Ok(idx)
        })
    }

    pub fn cast_comment_vote(&self, comment_id: i64, voter_id: i64, dir: VoteDirection) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comment_votes (comment_id, voter_id, direction)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(comment_id, voter_id) DO UPDATE SET direction = excluded.direction",
                rusqlite::params![comment_id, voter_id, dir.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn comment_tally(&self, comment_id: i64) -> Result<VoteTally> {
        self.with_conn(|conn| {
            let tally = conn.query_row(
                "SELECT COUNT(CASE WHEN direction = 'up' THEN 1 END),
                        COUNT(CASE WHEN direction = 'down' THEN 1 END)
                 FROM comment_votes WHERE comment_id = ?1",
                [comment_id],
                |row| {
                    Ok(VoteTally {
                        up: row.get(0)?,
                        down: row.get(1)?,
                    })
                },
            )?;
            Ok(tally)
        })
    }

    // -- Replies --

    pub fn insert_reply(&self, comment_id: i64, author_name: &str, body: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO replies (comment_id, author_name, body) VALUES (?1, ?2, ?3)",
                rusqlite::params![comment_id, author_name, body],
            )?;
            Ok(())
        })
    }

    /// All replies under a comment, rendered inline (not paginated).
    pub fn replies_for(&self, comment_id: i64) -> Result<Vec<Reply>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT author_name, body FROM replies WHERE comment_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([comment_id], |row| {
                    Ok(Reply {
                        author_name: row.get(0)?,
                        body: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn confession_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Confession> {
    let status: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(Confession {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_name: row.get(2)?,
        body: row.get(3)?,
        status: ConfessionStatus::from_str(&status).unwrap_or(ConfessionStatus::Pending),
        public_id: row.get(5)?,
        created_at: parse_ts(&created_at),
    })
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    let created_at: String = row.get(5)?;
    Ok(Comment {
        id: row.get(0)?,
        confession_id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        body: row.get(4)?,
        created_at: parse_ts(&created_at),
    })
}
