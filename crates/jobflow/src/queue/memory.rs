use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{Queue, QueueMessage};

#[derive(Debug, Clone)]
struct Entry {
    receipt: Uuid,
    body: String,
    visible_at: DateTime<Utc>,
    receive_count: i64,
}

/// In-process queue with visibility timeouts. Also records every body ever
/// sent and every visibility change, which tests inspect.
pub struct MemoryQueue {
    default_visibility_secs: i64,
    entries: Mutex<Vec<Entry>>,
    sent: Mutex<Vec<String>>,
    visibility_calls: Mutex<Vec<i64>>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(30)
    }
}

impl MemoryQueue {
    pub fn new(default_visibility_secs: i64) -> Self {
        Self {
            default_visibility_secs,
            entries: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            visibility_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn visibility_calls(&self) -> Vec<i64> {
        self.visibility_calls
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Messages not yet acked, visible or not.
    pub fn pending(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Makes every message visible right away, as if its timeout elapsed.
    pub fn expire_visibility(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            let now = Utc::now();
            for e in entries.iter_mut() {
                e.visible_at = now;
            }
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn send(&self, body: &str) -> anyhow::Result<()> {
        let entry = Entry {
            receipt: Uuid::new_v4(),
            body: body.to_string(),
            visible_at: Utc::now(),
            receive_count: 0,
        };
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory queue poisoned"))?
            .push(entry);
        self.sent
            .lock()
            .map_err(|_| anyhow!("memory queue poisoned"))?
            .push(body.to_string());
        Ok(())
    }

    async fn receive(&self) -> anyhow::Result<Option<QueueMessage>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory queue poisoned"))?;
        let now = Utc::now();

        let Some(entry) = entries.iter_mut().find(|e| e.visible_at <= now) else {
            return Ok(None);
        };
        entry.receive_count += 1;
        entry.visible_at = now + Duration::seconds(self.default_visibility_secs);

        Ok(Some(QueueMessage {
            receipt: entry.receipt,
            body: entry.body.clone(),
            receive_count: entry.receive_count,
        }))
    }

    async fn set_visibility_timeout(
        &self,
        message: &QueueMessage,
        seconds: i64,
    ) -> anyhow::Result<()> {
        let seconds = seconds.clamp(0, self.max_visibility_timeout());
        self.visibility_calls
            .lock()
            .map_err(|_| anyhow!("memory queue poisoned"))?
            .push(seconds);

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory queue poisoned"))?;
        if let Some(e) = entries.iter_mut().find(|e| e.receipt == message.receipt) {
            e.visible_at = Utc::now() + Duration::seconds(seconds);
        }
        Ok(())
    }

    async fn ack(&self, message: &QueueMessage) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory queue poisoned"))?
            .retain(|e| e.receipt != message.receipt);
        Ok(())
    }
}
