// Buffered product-usage event tracker.

use chrono::Utc;
use tracing::debug;

use crate::db::Database;
use crate::models::TrackedEvent;

/// Collects usage events in memory and writes them to the database in
/// batches. Constructed explicitly and passed to whoever needs it.
#[derive(Debug, Default)]
pub struct EventTracker {
    enabled: bool,
    user_id: Option<String>,
    buffer: Vec<TrackedEvent>,
}

impl EventTracker {
    pub fn new(enabled: bool) -> Self {
        EventTracker {
            enabled,
            user_id: None,
            buffer: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Attach subsequent events to `user_id`.
    pub fn identify(&mut self, user_id: &str) {
        self.user_id = Some(user_id.to_string());
    }

    /// Buffer an event. Dropped silently when tracking is disabled.
    pub fn track(&mut self, name: &str, properties: serde_json::Value) {
        if !self.enabled {
            return;
        }
        self.buffer.push(TrackedEvent {
            name: name.to_string(),
            user_id: self.user_id.clone(),
            properties,
            created_at: Utc::now(),
        });
    }

    /// Number of events waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Write buffered events in one transaction. The buffer is kept intact
    /// if the write fails so the next flush can retry.
    pub fn flush(&mut self, db: &Database) -> anyhow::Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let written = db.insert_events(&self.buffer)?;
        self.buffer.clear();
        debug!(written, "flushed tracked events");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn disabled_tracker_drops_events() {
        let mut tracker = EventTracker::new(false);
        tracker.track("page_view", json!({}));
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn identify_tags_later_events() {
        let mut tracker = EventTracker::new(true);
        tracker.track("anonymous", json!({}));
        tracker.identify("u1");
        tracker.track("trade_added", json!({ "symbol": "AAPL" }));

        assert_eq!(tracker.buffer[0].user_id, None);
        assert_eq!(tracker.buffer[1].user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn flush_writes_and_clears() {
        let db = Database::open(":memory:").unwrap();
        let mut tracker = EventTracker::new(true);
        tracker.identify("u1");
        tracker.track("trade_added", json!({}));
        tracker.track("trade_added", json!({}));
        tracker.track("export_csv", json!({ "rows": 3 }));

        assert_eq!(tracker.flush(&db).unwrap(), 3);
        assert_eq!(tracker.pending(), 0);
        assert_eq!(db.count_events("trade_added").unwrap(), 2);
        assert_eq!(tracker.flush(&db).unwrap(), 0);
    }
}
