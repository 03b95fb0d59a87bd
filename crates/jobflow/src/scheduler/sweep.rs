// crates/jobflow/src/scheduler/sweep.rs
use std::panic::AssertUnwindSafe;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Scheduler, KIND};
use crate::cron::CronTemplate;
use crate::error::JobflowError;
use crate::store::SaveOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepCounts {
    pub fired: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another process holds the table lock.
    Skipped,
    Completed(SweepCounts),
}

impl Scheduler {
    /// Fires every due template, once cluster-wide. The lock is released
    /// whatever happens inside, panics included.
    pub async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<SweepOutcome> {
        if !self.lock.acquire().await? {
            info!("sweep skipped: table lock held elsewhere");
            return Ok(SweepOutcome::Skipped);
        }

        let result = AssertUnwindSafe(self.fire_all(now)).catch_unwind().await;
        let released = self.lock.release().await;
        if let Err(e) = &released {
            error!(error = %e, "could not release table lock");
        }

        let counts = match result {
            Ok(counts) => counts?,
            Err(_) => return Err(anyhow!("sweep panicked")),
        };
        released?;

        info!(
            fired = counts.fired,
            skipped = counts.skipped,
            failed = counts.failed,
            "sweep finished"
        );
        Ok(SweepOutcome::Completed(counts))
    }

    async fn fire_all(&self, now: DateTime<Utc>) -> anyhow::Result<SweepCounts> {
        let mut counts = SweepCounts::default();

        for mut template in self.templates.scan().await? {
            if template.is_lock_record() {
                continue;
            }

            let fired = AssertUnwindSafe(self.fire(&mut template, now))
                .catch_unwind()
                .await;
            match fired {
                Ok(Ok(true)) => counts.fired += 1,
                Ok(Ok(false)) => counts.skipped += 1,
                Ok(Err(e)) => {
                    warn!(template_id = %template.id, error = %e, "template firing failed");
                    counts.failed += 1;
                }
                Err(_) => {
                    error!(template_id = %template.id, "template firing panicked");
                    counts.failed += 1;
                }
            }
        }

        Ok(counts)
    }

    /// Fires `template` if it is enabled, due at `now` and has not fired in
    /// this minute yet. Returns whether a job was created.
    pub async fn fire(
        &self,
        template: &mut CronTemplate,
        now: DateTime<Utc>,
    ) -> Result<bool, JobflowError> {
        if template.is_lock_record()
            || !template.enabled
            || !template.due(now)
            || template.fired_in_minute_of(now)
        {
            return Ok(false);
        }

        self.record_firing(template, now).await?;
        Ok(true)
    }

    /// Operator "run": fires regardless of schedule and `enabled`.
    pub async fn fire_now(&self, id: &str) -> Result<CronTemplate, JobflowError> {
        let mut template = self.show(id).await?;
        self.record_firing(&mut template, Utc::now()).await?;
        Ok(template)
    }

    /// Creates a job from the template and returns its id.
    pub async fn create_job(&self, template: &CronTemplate) -> Result<Uuid, JobflowError> {
        let job = self.runner.create(template.job_spec()).await?;
        Ok(job.id)
    }

    async fn record_firing(
        &self,
        template: &mut CronTemplate,
        now: DateTime<Utc>,
    ) -> Result<(), JobflowError> {
        let job_id = self.create_job(template).await?;
        template.last_fired_job_id = Some(job_id);
        template.last_run_at = Some(now);

        if self.templates.save(template).await? == SaveOutcome::Conflict {
            return Err(JobflowError::conflict(KIND, &template.id));
        }
        info!(template_id = %template.id, job_id = %job_id, "template fired");
        Ok(())
    }
}
