// crates/jobflow/src/scheduler/lock.rs
//
// Cluster-wide mutual exclusion through one sentinel row in the cron store.
// There is no lease: a holder that dies without releasing wedges the lock
// until an operator clears it (`jobflowctl unlock`).

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::cron::{CronTemplate, TABLE_LOCK_RECORD_ID};
use crate::store::{CronStore, SaveOutcome};

#[derive(Clone)]
pub struct TableLock {
    store: Arc<dyn CronStore>,
}

impl TableLock {
    pub fn new(store: Arc<dyn CronStore>) -> Self {
        Self { store }
    }

    /// True when this caller now holds the lock.
    pub async fn acquire(&self) -> anyhow::Result<bool> {
        // 1) somebody already holds it
        if self.store.get(TABLE_LOCK_RECORD_ID).await?.is_some() {
            debug!("table lock already held");
            return Ok(false);
        }

        // 2) claim it
        let mut record = CronTemplate::lock_record(Utc::now());
        if self.store.create(&mut record).await? == SaveOutcome::Conflict {
            debug!("table lock lost on create");
            return Ok(false);
        }

        // 3) confirm under the version check; a concurrent claimant makes this conflict
        if self.store.save(&mut record).await? == SaveOutcome::Conflict {
            debug!("table lock lost on confirm");
            return Ok(false);
        }

        Ok(true)
    }

    /// Unconditional; also used to clear a wedged lock.
    pub async fn release(&self) -> anyhow::Result<()> {
        self.store.delete(TABLE_LOCK_RECORD_ID).await?;
        Ok(())
    }

    pub async fn is_held(&self) -> anyhow::Result<bool> {
        Ok(self.store.get(TABLE_LOCK_RECORD_ID).await?.is_some())
    }
}
