use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::db::{
    connection::Database,
    helpers::parse_optional_datetime,
};
use crate::models::Notification;
use crate::scheduler::PendingNotification;

impl Database {
    /// Durably records notifications still pending at shutdown. A later record
    /// for the same id replaces the earlier one.
    pub async fn store_pending(&self, items: Vec<PendingNotification>) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let recorded_at = Utc::now().to_rfc3339();
            for item in &items {
                let payload = serde_json::to_string(&item.notification)
                    .context("failed to serialize pending notification")?;
                tx.execute(
                    "INSERT OR REPLACE INTO pending_notifications (id, payload, release_at, batch_key, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        item.notification.id,
                        payload,
                        item.release_at.map(|dt| dt.to_rfc3339()),
                        item.batch_key,
                        recorded_at,
                    ],
                )
                .context("failed to insert pending notification")?;
            }
            tx.commit().context("failed to commit pending notifications")?;
            Ok(items.len())
        })
        .await
    }

    /// Removes and returns every recorded pending notification, oldest deadline first.
    pub async fn take_pending(&self) -> Result<Vec<PendingNotification>> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let items = {
                let mut stmt = tx.prepare(
                    "SELECT payload, release_at, batch_key
                     FROM pending_notifications
                     ORDER BY release_at IS NULL, release_at ASC, recorded_at ASC",
                )?;
                let mut rows = stmt.query([])?;
                let mut items = Vec::new();
                while let Some(row) = rows.next()? {
                    let payload: String = row.get(0)?;
                    let notification: Notification = serde_json::from_str(&payload)
                        .context("failed to parse pending notification payload")?;
                    items.push(PendingNotification {
                        notification,
                        release_at: parse_optional_datetime(row.get(1)?, "release_at")?,
                        batch_key: row.get(2)?,
                    });
                }
                items
            };
            tx.execute("DELETE FROM pending_notifications", [])
                .context("failed to clear pending notifications")?;
            tx.commit().context("failed to commit pending recovery")?;
            Ok(items)
        })
        .await
    }

    pub async fn pending_count(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM pending_notifications", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
