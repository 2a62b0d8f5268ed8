use anyhow::Result;
use rusqlite::OptionalExtension;
use tracing::warn;
use whisper_types::{Channel, CustomButton, Link};

use crate::{Database, InsertOutcome, is_unique_violation};

impl Database {
    // -- Custom buttons --

    /// Register an admin-authored button. `Duplicate` means the label is
    /// already taken; callers report a named conflict to the actor.
    pub fn insert_button(&self, label: &str, content: &str, links: &[Link]) -> Result<InsertOutcome> {
        let links_json = serde_json::to_string(links)?;
        let res = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO buttons (label, content, links) VALUES (?1, ?2, ?3)",
                rusqlite::params![label, content, links_json],
            )?;
            Ok(())
        });

        match res {
            Ok(()) => Ok(InsertOutcome::Fresh),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    pub fn button_by_label(&self, label: &str) -> Result<Option<CustomButton>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, label, content, links FROM buttons WHERE label = ?1",
                    [label],
                    button_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_buttons(&self) -> Result<Vec<CustomButton>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, label, content, links FROM buttons ORDER BY id ASC")?;
            let rows = stmt
                .query_map([], button_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_button(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM buttons WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Channels --

    pub fn insert_channel(&self, name: &str, link: &str) -> Result<InsertOutcome> {
        let res = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO channels (name, link) VALUES (?1, ?2)",
                rusqlite::params![name, link],
            )?;
            Ok(())
        });

        match res {
            Ok(()) => Ok(InsertOutcome::Fresh),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, link FROM channels ORDER BY id ASC")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Channel {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        link: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_channel(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM channels WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }
}

fn button_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CustomButton> {
    let links_json: String = row.get(3)?;
    let links = serde_json::from_str(&links_json).unwrap_or_else(|e| {
        warn!("Unreadable links on button {}: {}", links_json, e);
        Vec::new()
    });
    Ok(CustomButton {
        id: row.get(0)?,
        label: row.get(1)?,
        content: row.get(2)?,
        links,
    })
}
