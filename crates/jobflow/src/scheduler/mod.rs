// crates/jobflow/src/scheduler/mod.rs
//
// Recurring-job templates: CRUD, firing, the serialized sweep and
// declarative reconciliation.

use std::sync::Arc;

use crate::jobs::JobRunner;
use crate::store::CronStore;

pub mod lock;
pub mod reconcile;
pub mod sweep;
pub mod templates;

pub use lock::TableLock;
pub use reconcile::{load_descriptions, ReconcileReport};
pub use sweep::{SweepCounts, SweepOutcome};

pub(crate) const KIND: &str = "CronJob";

#[derive(Clone)]
pub struct Scheduler {
    templates: Arc<dyn CronStore>,
    runner: JobRunner,
    lock: TableLock,
}

impl Scheduler {
    pub fn new(templates: Arc<dyn CronStore>, runner: JobRunner) -> Self {
        let lock = TableLock::new(templates.clone());
        Self {
            templates,
            runner,
            lock,
        }
    }

    pub fn lock(&self) -> &TableLock {
        &self.lock
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }
}
