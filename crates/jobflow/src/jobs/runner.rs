// crates/jobflow/src/jobs/runner.rs
//
// Persisted job transitions. `Job` owns the in-memory state machine; the
// runner applies a transition, saves under the version check and talks to
// the queue and the mailer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::Mailer;
use crate::error::JobflowError;
use crate::jobs::model::{Job, JobSpec};
use crate::queue::Queue;
use crate::store::{JobStore, SaveOutcome};

const KIND: &str = "AsyncJob";

#[derive(Clone)]
pub struct JobRunner {
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn Queue>,
    mailer: Arc<dyn Mailer>,
}

impl JobRunner {
    pub fn new(jobs: Arc<dyn JobStore>, queue: Arc<dyn Queue>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            jobs,
            queue,
            mailer,
        }
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    // ----------------------------
    // Records
    // ----------------------------

    /// Stores a new job and enqueues it unless it finished at creation.
    pub async fn create(&self, spec: JobSpec) -> Result<Job, JobflowError> {
        let mut job = Job::new(spec, Utc::now());

        if self.jobs.create(&mut job).await? == SaveOutcome::Conflict {
            return Err(JobflowError::conflict(KIND, job.id));
        }
        info!(job_id = %job.id, steps = job.steps.len(), "job created");

        if !job.is_finished() {
            self.enqueue(&job).await?;
        }
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Job>> {
        self.jobs.get(id).await
    }

    pub async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        self.jobs.delete(id).await
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let n = self.jobs.delete_expired(now).await?;
        if n > 0 {
            info!(purged = n, "expired jobs purged");
        }
        Ok(n)
    }

    pub async fn save(&self, job: &mut Job) -> Result<(), JobflowError> {
        match self.jobs.save(job).await? {
            SaveOutcome::Saved => Ok(()),
            SaveOutcome::Conflict => Err(JobflowError::conflict(KIND, job.id)),
        }
    }

    pub async fn enqueue(&self, job: &Job) -> anyhow::Result<()> {
        self.queue.send(&job.id.to_string()).await
    }

    // ----------------------------
    // Transitions
    // ----------------------------

    /// Completes the current step. Finishing the last one succeeds the job
    /// unless it already failed. A no-op on a finished job.
    pub async fn step_done(&self, job: &mut Job) -> Result<(), JobflowError> {
        if job.advance(Utc::now()) {
            self.save(job).await?;
        }
        Ok(())
    }

    pub async fn succeed(&self, job: &mut Job) -> Result<(), JobflowError> {
        if job.finish_succeeded(Utc::now()) {
            self.save(job).await?;
        }
        Ok(())
    }

    /// Fails the job, recording `message` in the current step's log.
    pub async fn fail(&self, job: &mut Job, message: Option<&str>) -> Result<(), JobflowError> {
        if let Some(m) = message {
            job.push_log(m);
        }
        job.finish_failed(Utc::now());
        self.save(job).await?;
        warn!(job_id = %job.id, reason = message.unwrap_or(""), "job failed");
        Ok(())
    }

    pub async fn mark_poison(&self, job: &mut Job) -> Result<(), JobflowError> {
        if !job.finish_poison(Utc::now()) {
            return Ok(());
        }
        self.save(job).await?;
        warn!(job_id = %job.id, "job is poison");

        if let Some(to) = job.poison_email.clone() {
            self.notify_poison(job, &to).await;
        }
        Ok(())
    }

    pub async fn append_log(&self, job: &mut Job, message: &str) -> Result<String, JobflowError> {
        job.push_log(message);
        self.save(job).await?;
        Ok(message.to_string())
    }

    async fn notify_poison(&self, job: &Job, to: &str) {
        let subject = format!("{KIND} {} is poison", job.id);
        let html = match serde_json::to_string_pretty(&job.redacted()) {
            Ok(json) => format!("<h1>{subject}</h1>\n<pre>{}</pre>", escape_html(&json)),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "could not render poison notification");
                return;
            }
        };

        if let Err(e) = self.mailer.send(to, &subject, &html).await {
            warn!(job_id = %job.id, error = %e, "poison notification failed");
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::LogMailer;
    use crate::jobs::model::{Step, DEFAULT_POISON_LIMIT, DEFAULT_STEP_TIME};
    use crate::queue::MemoryQueue;
    use crate::store::MemoryJobStore;

    fn spec(n: usize) -> JobSpec {
        JobSpec {
            id: None,
            credentials: "bWFnbmV0bzp4YXZpZXI=".to_string(),
            token: None,
            steps: (0..n).map(|_| Step::default()).collect(),
            max_seconds_in_queue: 60,
            default_poison_limit: DEFAULT_POISON_LIMIT,
            default_step_time: DEFAULT_STEP_TIME,
            poison_email: None,
        }
    }

    fn runner() -> (JobRunner, Arc<MemoryQueue>) {
        let queue = Arc::new(MemoryQueue::default());
        let r = JobRunner::new(
            Arc::new(MemoryJobStore::new()),
            queue.clone(),
            Arc::new(LogMailer),
        );
        (r, queue)
    }

    #[tokio::test]
    async fn fail_logs_and_finishes() {
        let (r, _) = runner();
        let mut job = r.create(spec(2)).await.unwrap();
        r.fail(&mut job, Some("Failed: 403")).await.unwrap();

        let stored = r.get(job.id).await.unwrap().unwrap();
        assert!(stored.failed);
        assert!(stored.finished_at.is_some());
        assert_eq!(stored.steps[0].log, vec!["Failed: 403"]);
    }

    #[tokio::test]
    async fn stale_copy_cannot_overwrite() {
        let (r, _) = runner();
        let mut job = r.create(spec(2)).await.unwrap();
        let mut stale = job.clone();
        r.append_log(&mut job, "first").await.unwrap();

        let err = r.append_log(&mut stale, "second").await.unwrap_err();
        assert!(matches!(err, JobflowError::Conflict { .. }));
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let (r, _) = runner();
        let job = r.create(spec(1)).await.unwrap();
        assert_eq!(r.purge_expired(Utc::now()).await.unwrap(), 0);
        assert_eq!(
            r.purge_expired(job.destroy_at + chrono::Duration::seconds(1))
                .await
                .unwrap(),
            1
        );
        assert!(r.get(job.id).await.unwrap().is_none());
    }
}
