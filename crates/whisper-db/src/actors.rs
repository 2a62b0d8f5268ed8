use anyhow::{Result, anyhow};
use rusqlite::OptionalExtension;
use tracing::warn;
use whisper_types::{Actor, FlowStep};

use crate::{Database, InsertOutcome, is_unique_violation, parse_ts};

impl Database {
    /// Upsert on first contact: creates the actor with default profile
    /// fields and a fresh streak start, or refreshes the display name and
    /// last-active stamp of an existing one.
    pub fn ensure_actor(&self, id: i64, display_name: &str) -> Result<Actor> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO actors (id, display_name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                     display_name = excluded.display_name,
                     last_active  = datetime('now')",
                rusqlite::params![id, display_name],
            )?;
            Ok(())
        })?;

        self.get_actor(id)?
            .ok_or_else(|| anyhow!("actor {} missing after upsert", id))
    }

    pub fn get_actor(&self, id: i64) -> Result<Option<Actor>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, display_name, nickname, bio, emoji, aura, streak_start,
                            best_streak, last_active, banned, menu_message_id, flow_state
                     FROM actors WHERE id = ?1",
                    [id],
                    actor_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Persist the actor's conversation state. `None` clears it, which is
    /// the only way temp fields accumulated in a flow are dropped.
    pub fn set_flow(&self, actor_id: i64, flow: Option<&FlowStep>) -> Result<()> {
        let json = flow.map(serde_json::to_string).transpose()?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE actors SET flow_state = ?2 WHERE id = ?1",
                rusqlite::params![actor_id, json],
            )?;
            Ok(())
        })
    }

    pub fn set_menu_message(&self, actor_id: i64, message_id: Option<i64>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE actors SET menu_message_id = ?2 WHERE id = ?1",
                rusqlite::params![actor_id, message_id],
            )?;
            Ok(())
        })
    }

    pub fn set_nickname(&self, actor_id: i64, nickname: &str) -> Result<()> {
        self.set_profile_column(actor_id, "nickname", nickname)
    }

    pub fn set_bio(&self, actor_id: i64, bio: &str) -> Result<()> {
        self.set_profile_column(actor_id, "bio", bio)
    }

    pub fn set_emoji(&self, actor_id: i64, emoji: &str) -> Result<()> {
        self.set_profile_column(actor_id, "emoji", emoji)
    }

    fn set_profile_column(&self, actor_id: i64, column: &str, value: &str) -> Result<()> {
        // Column names come from the three setters above, never from input.
        let sql = format!("UPDATE actors SET {} = ?2 WHERE id = ?1", column);
        self.with_conn_mut(|conn| {
            conn.execute(&sql, rusqlite::params![actor_id, value])?;
            Ok(())
        })
    }

    pub fn add_aura(&self, actor_id: i64, delta: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE actors SET aura = aura + ?2 WHERE id = ?1",
                rusqlite::params![actor_id, delta],
            )?;
            Ok(())
        })
    }

    pub fn all_actor_ids(&self) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM actors WHERE banned = 0")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Dedup markers --

    /// Insert a dedup marker for an inbound update id. `Duplicate` means the
    /// update was already processed; any other failure propagates.
    pub fn record_update(&self, update_id: i64) -> Result<InsertOutcome> {
        let res = self.with_conn_mut(|conn| {
            conn.execute("INSERT INTO updates (id) VALUES (?1)", [update_id])?;
            Ok(())
        });

        match res {
            Ok(()) => Ok(InsertOutcome::Fresh),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    // -- Config entries --

    pub fn config_value(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )?;
            Ok(())
        })
    }

    // -- Streaks --

    /// Whole days since the actor's streak start.
    pub fn current_streak(&self, actor_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let days = conn.query_row(
                "SELECT CAST(julianday('now') - julianday(streak_start) AS INTEGER)
                 FROM actors WHERE id = ?1",
                [actor_id],
                |row| row.get(0),
            )?;
            Ok(days)
        })
    }

    /// Fold the running streak into `best_streak` (monotonic) and restart
    /// the counter.
    pub fn reset_streak(&self, actor_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE actors SET
                     best_streak  = MAX(best_streak,
                         CAST(julianday('now') - julianday(streak_start) AS INTEGER)),
                     streak_start = datetime('now')
                 WHERE id = ?1",
                [actor_id],
            )?;
            Ok(())
        })
    }

    /// Top actors by best streak, for the leaderboard.
    pub fn streak_leaderboard(&self, limit: u32) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT CASE WHEN nickname <> '' THEN nickname ELSE display_name END,
                        best_streak
                 FROM actors
                 WHERE banned = 0
                 ORDER BY best_streak DESC, id ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn actor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Actor> {
    let streak_start: String = row.get(6)?;
    let last_active: String = row.get(8)?;
    let flow_json: Option<String> = row.get(11)?;

    let flow = flow_json.and_then(|json| match serde_json::from_str::<FlowStep>(&json) {
        Ok(step) => Some(step),
        Err(e) => {
            warn!("Unreadable flow_state '{}', treating as no flow: {}", json, e);
            None
        }
    });

    Ok(Actor {
        id: row.get(0)?,
        display_name: row.get(1)?,
        nickname: row.get(2)?,
        bio: row.get(3)?,
        emoji: row.get(4)?,
        aura: row.get(5)?,
        streak_start: parse_ts(&streak_start),
        best_streak: row.get(7)?,
        last_active: parse_ts(&last_active),
        banned: row.get(9)?,
        menu_message_id: row.get(10)?,
        flow,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_contact_creates_actor_with_defaults() {
        let db = Database::open_in_memory().unwrap();

        let actor = db.ensure_actor(100, "alice").unwrap();
        assert_eq!(actor.display_name, "alice");
        assert_eq!(actor.aura, 0);
        assert_eq!(actor.best_streak, 0);
        assert!(actor.flow.is_none());
        assert!(!actor.banned);

        // Second contact updates the name, does not duplicate
        let actor = db.ensure_actor(100, "alice2").unwrap();
        assert_eq!(actor.display_name, "alice2");
        assert_eq!(db.all_actor_ids().unwrap(), vec![100]);
    }

    #[test]
    fn flow_state_roundtrips_through_persistence() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_actor(1, "a").unwrap();

        let step = FlowStep::AwaitComment { confession_id: 9 };
        db.set_flow(1, Some(&step)).unwrap();
        assert_eq!(db.get_actor(1).unwrap().unwrap().flow, Some(step));

        db.set_flow(1, None).unwrap();
        assert!(db.get_actor(1).unwrap().unwrap().flow.is_none());
    }

    #[test]
    fn duplicate_update_id_is_reported_not_fatal() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.record_update(555).unwrap(), InsertOutcome::Fresh);
        assert_eq!(db.record_update(555).unwrap(), InsertOutcome::Duplicate);
        assert_eq!(db.record_update(556).unwrap(), InsertOutcome::Fresh);
    }

    #[test]
    fn config_is_a_simple_upsert_store() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.config_value("menu_confess").unwrap(), None);
        db.set_config("menu_confess", "Confess").unwrap();
        db.set_config("menu_confess", "Tell us").unwrap();
        assert_eq!(db.config_value("menu_confess").unwrap().as_deref(), Some("Tell us"));
    }

    #[test]
    fn best_streak_only_grows() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_actor(1, "a").unwrap();

        // Backdate the streak start by ten days
        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE actors SET streak_start = datetime('now', '-10 days') WHERE id = 1",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.current_streak(1).unwrap(), 10);
        db.reset_streak(1).unwrap();

        let actor = db.get_actor(1).unwrap().unwrap();
        assert_eq!(actor.best_streak, 10);
        assert_eq!(db.current_streak(1).unwrap(), 0);

        // A shorter run does not shrink the best
        db.reset_streak(1).unwrap();
        assert_eq!(db.get_actor(1).unwrap().unwrap().best_streak, 10);
    }

    #[test]
    fn aura_accumulates() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_actor(1, "a").unwrap();

        db.add_aura(1, 10).unwrap();
        db.add_aura(1, 2).unwrap();
        assert_eq!(db.get_actor(1).unwrap().unwrap().aura, 12);
    }

    #[test]
    fn leaderboard_prefers_nickname_and_orders_by_best() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_actor(1, "plain").unwrap();
        db.ensure_actor(2, "named").unwrap();
        db.set_nickname(2, "ghost").unwrap();
        db.with_conn_mut(|conn| {
            conn.execute("UPDATE actors SET best_streak = 3 WHERE id = 1", [])?;
            conn.execute("UPDATE actors SET best_streak = 7 WHERE id = 2", [])?;
            Ok(())
        })
        .unwrap();

        let board = db.streak_leaderboard(10).unwrap();
        assert_eq!(board, vec![("ghost".to_string(), 7), ("plain".to_string(), 3)]);
    }
}
