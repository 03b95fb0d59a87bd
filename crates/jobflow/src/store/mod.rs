// crates/jobflow/src/store/mod.rs
//
// Keyed record storage with optimistic version checks.
//
// Every record carries a `version`. `create` stores version 1 and fails with
// `Conflict` if the key is taken; `save` only writes when the stored version
// equals the record's version, then bumps both.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cron::CronTemplate;
use crate::jobs::Job;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCronStore, MemoryJobStore};
pub use postgres::{PgCronStore, PgJobStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Conflict,
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Consistent read.
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Job>>;

    async fn create(&self, job: &mut Job) -> anyhow::Result<SaveOutcome>;

    async fn save(&self, job: &mut Job) -> anyhow::Result<SaveOutcome>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Deletes jobs whose `destroy_at` is at or before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait CronStore: Send + Sync {
    /// Consistent read.
    async fn get(&self, id: &str) -> anyhow::Result<Option<CronTemplate>>;

    async fn create(&self, template: &mut CronTemplate) -> anyhow::Result<SaveOutcome>;

    async fn save(&self, template: &mut CronTemplate) -> anyhow::Result<SaveOutcome>;

    async fn delete(&self, id: &str) -> anyhow::Result<bool>;

    /// Every record, the table-lock sentinel included.
    async fn scan(&self) -> anyhow::Result<Vec<CronTemplate>>;
}
