// crates/jobflow/src/store/memory.rs
//
// In-process stores for tests and single-node development.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{CronStore, JobStore, SaveOutcome};
use crate::cron::CronTemplate;
use crate::jobs::Job;

trait Versioned: Clone {
    type Key: Ord + Clone;
    fn key(&self) -> Self::Key;
    fn version(&self) -> i64;
    fn set_version(&mut self, v: i64);
    fn touch(&mut self, now: DateTime<Utc>);
}

impl Versioned for Job {
    type Key = Uuid;
    fn key(&self) -> Uuid {
        self.id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn set_version(&mut self, v: i64) {
        self.version = v;
    }
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Versioned for CronTemplate {
    type Key = String;
    fn key(&self) -> String {
        self.id.clone()
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn set_version(&mut self, v: i64) {
        self.version = v;
    }
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

struct Table<R: Versioned> {
    rows: Mutex<BTreeMap<R::Key, R>>,
}

impl<R: Versioned> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<R: Versioned> Table<R> {
    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, BTreeMap<R::Key, R>>> {
        self.rows.lock().map_err(|_| anyhow!("memory store poisoned"))
    }

    fn get(&self, key: &R::Key) -> anyhow::Result<Option<R>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn create(&self, record: &mut R) -> anyhow::Result<SaveOutcome> {
        let mut rows = self.lock()?;
        let key = record.key();
        if rows.contains_key(&key) {
            return Ok(SaveOutcome::Conflict);
        }
        record.set_version(1);
        rows.insert(key, record.clone());
        Ok(SaveOutcome::Saved)
    }

    fn save(&self, record: &mut R) -> anyhow::Result<SaveOutcome> {
        let mut rows = self.lock()?;
        let key = record.key();
        match rows.get(&key) {
            Some(stored) if stored.version() == record.version() => {
                record.set_version(record.version() + 1);
                record.touch(Utc::now());
                rows.insert(key, record.clone());
                Ok(SaveOutcome::Saved)
            }
            _ => Ok(SaveOutcome::Conflict),
        }
    }

    fn delete(&self, key: &R::Key) -> anyhow::Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn all(&self) -> anyhow::Result<Vec<R>> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    table: Table<Job>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.all().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Job>> {
        self.table.get(&id)
    }

    async fn create(&self, job: &mut Job) -> anyhow::Result<SaveOutcome> {
        self.table.create(job)
    }

    async fn save(&self, job: &mut Job) -> anyhow::Result<SaveOutcome> {
        self.table.save(job)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        self.table.delete(&id)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut rows = self.table.lock()?;
        let before = rows.len();
        rows.retain(|_, job| !job.is_expired(now));
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryCronStore {
    table: Table<CronTemplate>,
}

impl MemoryCronStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CronStore for MemoryCronStore {
    async fn get(&self, id: &str) -> anyhow::Result<Option<CronTemplate>> {
        self.table.get(&id.to_string())
    }

    async fn create(&self, template: &mut CronTemplate) -> anyhow::Result<SaveOutcome> {
        self.table.create(template)
    }

    async fn save(&self, template: &mut CronTemplate) -> anyhow::Result<SaveOutcome> {
        self.table.save(template)
    }

    async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        self.table.delete(&id.to_string())
    }

    async fn scan(&self) -> anyhow::Result<Vec<CronTemplate>> {
        self.table.all()
    }
}
