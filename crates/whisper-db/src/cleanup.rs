use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::Database;

/// Dedup markers only need to outlive the platform's redelivery horizon.
const DEDUP_RETENTION: &str = "-6 hours";

/// Confessions (and their comments, votes, and replies) age out after this.
const CONTENT_RETENTION: &str = "-30 days";

/// Background task that prunes expired records.
///
/// Runs on an interval, drops dedup markers past their retention window and
/// confessions past theirs. Comment/vote/reply rows go via cascade.
pub async fn run_cleanup_loop(db: Arc<Database>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match prune_expired(&db) {
            Ok((markers, confessions)) => {
                if markers > 0 || confessions > 0 {
                    info!(
                        "Cleanup: pruned {} dedup markers, {} confessions",
                        markers, confessions
                    );
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

pub fn prune_expired(db: &Database) -> anyhow::Result<(usize, usize)> {
    db.with_conn_mut(|conn| {
        let markers = conn.execute(
            &format!("DELETE FROM updates WHERE received_at < datetime('now', '{}')", DEDUP_RETENTION),
            [],
        )?;
        let confessions = conn.execute(
            &format!("DELETE FROM confessions WHERE created_at < datetime('now', '{}')", CONTENT_RETENTION),
            [],
        )?;
        Ok((markers, confessions))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prunes_only_past_the_retention_window() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_actor(1, "a").unwrap();

        db.record_update(1).unwrap();
        db.record_update(2).unwrap();
        let old_conf = db.insert_confession(1, "a", "ancient").unwrap();
        let new_conf = db.insert_confession(1, "a", "recent").unwrap();

        // Backdate one marker and one confession past their windows
        db.with_conn_mut(|conn| {
            conn.execute("UPDATE updates SET received_at = datetime('now', '-7 hours') WHERE id = 1", [])?;
            conn.execute(
                "UPDATE confessions SET created_at = datetime('now', '-31 days') WHERE id = ?1",
                [old_conf],
            )?;
            Ok(())
        })
        .unwrap();

        let (markers, confessions) = prune_expired(&db).unwrap();
        assert_eq!((markers, confessions), (1, 1));

        assert!(db.get_confession(old_conf).unwrap().is_none());
        assert!(db.get_confession(new_conf).unwrap().is_some());
        // The surviving marker still dedups
        assert!(db.record_update(2).unwrap().is_duplicate());
    }
}
