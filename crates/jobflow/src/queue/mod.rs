// crates/jobflow/src/queue/mod.rs
//
// Message transport for job steps. A received message stays invisible to
// other consumers for its visibility timeout; if it is not acked by then it
// is delivered again with a higher receive count.

use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryQueue;
pub use postgres::PgQueue;

/// Longest visibility timeout any transport accepts (12 hours).
pub const MAX_VISIBILITY_TIMEOUT_SECS: i64 = 43_200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Transport handle used for ack/visibility calls.
    pub receipt: Uuid,
    /// Always the id of the job the message belongs to.
    pub body: String,
    /// Times this message has been received, this delivery included.
    pub receive_count: i64,
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn send(&self, body: &str) -> anyhow::Result<()>;

    /// At most one visible message; it becomes invisible for the default
    /// visibility timeout.
    async fn receive(&self) -> anyhow::Result<Option<QueueMessage>>;

    async fn set_visibility_timeout(
        &self,
        message: &QueueMessage,
        seconds: i64,
    ) -> anyhow::Result<()>;

    /// Acknowledges (deletes) a processed message.
    async fn ack(&self, message: &QueueMessage) -> anyhow::Result<()>;

    fn max_visibility_timeout(&self) -> i64 {
        MAX_VISIBILITY_TIMEOUT_SECS
    }
}
