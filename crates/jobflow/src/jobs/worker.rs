// crates/jobflow/src/jobs/worker.rs
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::jobs::executor::StepExecutor;
use crate::queue::Queue;

/// Idle sleep between empty polls, before jitter.
pub const IDLE_SLEEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing visible on the queue.
    Idle,
    /// A step ran; the message was acked.
    Processed,
    /// The message was acked without running a step.
    Skipped,
    /// Processing failed; the message stays unacked and will reappear.
    Retrying,
}

/// One consumer of the step queue.
#[derive(Clone)]
pub struct StepWorker {
    id: String,
    queue: Arc<dyn Queue>,
    executor: StepExecutor,
}

impl StepWorker {
    pub fn new(id: impl Into<String>, queue: Arc<dyn Queue>, executor: StepExecutor) -> Self {
        Self {
            id: id.into(),
            queue,
            executor,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn poll_once(&self) -> anyhow::Result<PollOutcome> {
        let Some(msg) = self.queue.receive().await? else {
            return Ok(PollOutcome::Idle);
        };

        match self.executor.process(&msg).await {
            Ok(ran) => {
                self.queue.ack(&msg).await?;
                Ok(if ran {
                    PollOutcome::Processed
                } else {
                    PollOutcome::Skipped
                })
            }
            Err(e) if e.is_retryable() => Ok(PollOutcome::Retrying),
            Err(e) => {
                warn!(
                    worker_id = %self.id,
                    body = %msg.body,
                    receive_count = msg.receive_count,
                    error = %e,
                    "step processing failed"
                );
                Ok(PollOutcome::Retrying)
            }
        }
    }

    /// Polls forever. Queue errors are logged and retried after the idle sleep.
    pub async fn run(&self) {
        loop {
            match self.poll_once().await {
                Ok(PollOutcome::Idle) => tokio::time::sleep(jittered(IDLE_SLEEP)).await,
                Ok(_) => {}
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "queue poll failed");
                    tokio::time::sleep(jittered(IDLE_SLEEP)).await;
                }
            }
        }
    }
}

/// `base` +/- 20%.
fn jittered(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_twenty_percent() {
        for _ in 0..100 {
            let d = jittered(IDLE_SLEEP);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(300));
        }
    }
}
