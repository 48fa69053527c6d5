use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_i64},
    models::StoredEvent,
};
use crate::report::{EngineEvent, EventSink, FeedbackOutcome, NotificationEvent};

fn row_to_event(row: &Row) -> Result<StoredEvent> {
    let ts: String = row.get("ts")?;
    let detail: String = row.get("detail")?;

    Ok(StoredEvent {
        id: row.get("id")?,
        ts: parse_datetime(&ts, "ts")?,
        kind: row.get("kind")?,
        notification_id: row.get("notification_id")?,
        detail: serde_json::from_str(&detail).context("failed to parse event detail")?,
    })
}

fn insert_event(
    conn: &Connection,
    ts: DateTime<Utc>,
    kind: &str,
    notification_id: Option<&str>,
    detail: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO events (ts, kind, notification_id, detail) VALUES (?1, ?2, ?3, ?4)",
        params![ts.to_rfc3339(), kind, notification_id, detail],
    )
    .context("failed to insert event")?;
    Ok(())
}

impl Database {
    pub async fn record_event(&self, event: &EngineEvent) -> Result<()> {
        let ts = event.timestamp();
        let kind = event.kind();
        let notification_id = event.notification_id().map(str::to_string);
        let detail = event.detail().to_string();
        self.execute(move |conn| insert_event(conn, ts, kind, notification_id.as_deref(), &detail))
            .await
    }

    /// Stores user feedback on a notification. Returns the seconds since it
    /// was last delivered, or `None` if no delivery was recorded.
    pub async fn record_feedback(
        &self,
        notification_id: &str,
        outcome: FeedbackOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let latency = self
            .last_delivery_at(notification_id)
            .await?
            .map(|delivered| (at - delivered).num_milliseconds() as f64 / 1000.0);
        let event = NotificationEvent::feedback(notification_id, outcome, latency, at);
        self.record_event(&EngineEvent::Notification(event)).await?;
        Ok(latency)
    }

    async fn last_delivery_at(&self, notification_id: &str) -> Result<Option<DateTime<Utc>>> {
        let notification_id = notification_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ts FROM events
                 WHERE notification_id = ?1 AND kind IN ('delivered', 'released')
                 ORDER BY id DESC
                 LIMIT 1",
            )?;
            let mut rows = stmt.query(params![notification_id])?;
            match rows.next()? {
                Some(row) => {
                    let ts: String = row.get(0)?;
                    Ok(Some(parse_datetime(&ts, "ts")?))
                }
                None => Ok(None),
            }
        })
        .await
    }

    /// Most recent events first.
    pub async fn recent_events(&self, limit: u64) -> Result<Vec<StoredEvent>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, ts, kind, notification_id, detail
                 FROM events
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![to_i64(limit)?])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(row_to_event(row)?);
            }
            Ok(events)
        })
        .await
    }

    /// Every event recorded for one notification, oldest first.
    pub async fn events_for_notification(&self, notification_id: &str) -> Result<Vec<StoredEvent>> {
        let notification_id = notification_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, ts, kind, notification_id, detail
                 FROM events
                 WHERE notification_id = ?1
                 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query(params![notification_id])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(row_to_event(row)?);
            }
            Ok(events)
        })
        .await
    }
}

/// Decision-log sink that appends to the `events` table. Writes are queued on
/// the database thread; the engine never waits for them.
pub struct SqliteSink {
    db: Database,
    include_snapshots: bool,
}

impl SqliteSink {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            include_snapshots: true,
        }
    }

    /// Snapshots arrive every tick; long-running hosts may not want them all.
    pub fn without_snapshots(mut self) -> Self {
        self.include_snapshots = false;
        self
    }
}

impl EventSink for SqliteSink {
    fn record(&self, event: &EngineEvent) {
        if !self.include_snapshots && matches!(event, EngineEvent::Snapshot(_)) {
            return;
        }
        let ts = event.timestamp();
        let kind = event.kind();
        let notification_id = event.notification_id().map(str::to_string);
        let detail = event.detail().to_string();
        self.db.enqueue("event insert", move |conn| {
            insert_event(conn, ts, kind, notification_id.as_deref(), &detail)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{DecisionLog, NotificationEventKind};
    use crate::test_support::at;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn sink_writes_are_visible_to_later_queries() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("events.db")).unwrap();
        let log = DecisionLog::new(vec![Arc::new(SqliteSink::new(db.clone()))]);

        log.notification("n1", NotificationEventKind::Received, json!({ "title": "hi" }));
        log.notification("n1", NotificationEventKind::Deferred, json!({}));
        log.notification("n2", NotificationEventKind::Received, json!({}));

        // Queued writes run before this query on the same worker thread.
        let events = db.events_for_notification("n1").await.unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["received", "deferred"]);
        assert_eq!(events[0].detail["title"], "hi");

        let recent = db.recent_events(1).await.unwrap();
        assert_eq!(recent[0].notification_id.as_deref(), Some("n2"));
    }

    #[tokio::test]
    async fn feedback_is_stored_after_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("events.db")).unwrap();
        assert_eq!(db.last_delivery_at("n1").await.unwrap(), None);

        db.record_event(&EngineEvent::Notification(NotificationEvent {
            id: "n1".into(),
            kind: NotificationEventKind::Delivered,
            detail: json!({}),
            at: at(0),
        }))
        .await
        .unwrap();
        assert_eq!(db.last_delivery_at("n1").await.unwrap(), Some(at(0)));

        let latency = db
            .record_feedback("n1", FeedbackOutcome::Opened, at(12))
            .await
            .unwrap();
        assert_eq!(latency, Some(12.0));
        assert_eq!(
            db.record_feedback("never-sent", FeedbackOutcome::Ignored, at(12))
                .await
                .unwrap(),
            None
        );

        let events = db.events_for_notification("n1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, "feedback");
        assert_eq!(events[1].ts, at(12));
        assert_eq!(events[1].detail["outcome"], "user_opened");
        assert_eq!(events[1].detail["latencySeconds"], 12.0);
    }
}
