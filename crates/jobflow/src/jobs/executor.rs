// crates/jobflow/src/jobs/executor.rs
//
// Executes one job step per queue message.
//
// Outcomes recorded on the job:
// - 2xx: step done, next step enqueued (or the job succeeds)
// - 4xx and other non-5xx: job failed
// - 5xx / transport errors: logged, message hidden for the backoff, and an
//   error returned so the message is not acked and the queue redelivers it
// - receive count above the poison limit: job poisoned, no request made

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::{Authenticator, HttpClient, HttpMethod, HttpRequest, HttpResponse, TransportError};
use crate::error::JobflowError;
use crate::jobs::model::{Job, Step};
use crate::jobs::retry::{backoff_seconds, RetryConfig};
use crate::jobs::runner::JobRunner;
use crate::queue::QueueMessage;

/// Token renewals allowed within a single step call.
pub const MAX_AUTH_RENEWALS: usize = 2;
pub const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("remote server error: {0}")]
    RemoteServer(u16),

    #[error(transparent)]
    Job(#[from] JobflowError),
}

impl From<anyhow::Error> for StepError {
    fn from(e: anyhow::Error) -> Self {
        StepError::Job(JobflowError::Internal(e))
    }
}

impl StepError {
    /// Retryable errors are redelivered by the queue after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Transport(_) | StepError::RemoteServer(_))
    }
}

/// How a step call ended when it did not raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallOutcome {
    Completed,
    /// The job was failed; nothing more to do for this message.
    Failed,
}

#[derive(Clone)]
pub struct StepExecutor {
    runner: JobRunner,
    http: Arc<dyn HttpClient>,
    auth: Arc<dyn Authenticator>,
}

impl StepExecutor {
    pub fn new(runner: JobRunner, http: Arc<dyn HttpClient>, auth: Arc<dyn Authenticator>) -> Self {
        Self { runner, http, auth }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Returns false when the message was skipped, true when a step ran.
    pub async fn process(&self, msg: &QueueMessage) -> Result<bool, StepError> {
        let Some(mut job) = self.load(&msg.body).await? else {
            debug!(body = %msg.body, "no job for message, skipping");
            return Ok(false);
        };

        if job.is_finished() {
            debug!(job_id = %job.id, "job already finished, skipping");
            return Ok(false);
        }

        // Checked before the step cursor so a runaway message is always stopped.
        if msg.receive_count > job.poison_limit() {
            warn!(
                job_id = %job.id,
                receive_count = msg.receive_count,
                poison_limit = job.poison_limit(),
                "receive count over poison limit"
            );
            self.runner.mark_poison(&mut job).await?;
            return Ok(false);
        }

        if job.done_all_steps() {
            warn!(job_id = %job.id, "all steps done but job unfinished, finishing");
            self.runner.succeed(&mut job).await?;
            return Ok(false);
        }

        self.execute_current_step(&mut job, msg).await?;
        Ok(true)
    }

    async fn load(&self, body: &str) -> anyhow::Result<Option<Job>> {
        match Uuid::parse_str(body.trim()) {
            Ok(id) => self.runner.get(id).await,
            Err(_) => Ok(None),
        }
    }

    async fn execute_current_step(&self, job: &mut Job, msg: &QueueMessage) -> Result<(), StepError> {
        // 1) mark started and record the delivery count on the step
        if job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        if let Some(step) = job.current_step_mut() {
            step.receive_count = Some(msg.receive_count);
        }
        self.runner.save(job).await?;

        // 2) keep the message hidden while the step runs
        self.runner
            .queue()
            .set_visibility_timeout(msg, job.step_time())
            .await?;

        info!(
            job_id = %job.id,
            step = job.current_step_index(),
            receive_count = msg.receive_count,
            "executing step"
        );

        // 3) do the work
        let has_url = job
            .current_step()
            .and_then(|s| s.url.as_deref())
            .is_some_and(|u| !u.trim().is_empty());

        if has_url {
            match self.perform_call(job).await {
                Ok(CallOutcome::Completed) => {}
                Ok(CallOutcome::Failed) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    self.retry_later(job, msg, &e).await?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        } else {
            self.runner.append_log(job, "Step has no URL. Skipped.").await?;
        }

        // 4) advance and hand the next step to the queue
        self.runner.step_done(job).await?;
        if !job.is_finished() {
            self.runner.enqueue(job).await?;
        }
        Ok(())
    }

    /// Logs a transport failure and hides the message for the backoff.
    async fn retry_later(
        &self,
        job: &mut Job,
        msg: &QueueMessage,
        err: &StepError,
    ) -> Result<(), StepError> {
        if let StepError::Transport(t) = err {
            self.runner.append_log(job, &t.to_string()).await?;
        }

        let queue = self.runner.queue();
        let cfg = RetryConfig::for_step(job.current_step());
        let delay = backoff_seconds(msg.receive_count, &cfg, queue.max_visibility_timeout());
        queue.set_visibility_timeout(msg, delay).await?;

        warn!(
            job_id = %job.id,
            receive_count = msg.receive_count,
            retry_in_secs = delay,
            error = %err,
            "step will be retried"
        );
        Ok(())
    }

    // ----------------------------
    // HTTP
    // ----------------------------

    async fn perform_call(&self, job: &mut Job) -> Result<CallOutcome, StepError> {
        let Some(step) = job.current_step().cloned() else {
            return Ok(CallOutcome::Completed);
        };

        let method_name = step.method.as_deref().unwrap_or("GET");
        let Some(method) = HttpMethod::parse(method_name) else {
            let message = format!("Unsupported HTTP method '{}'", method_name.trim().to_uppercase());
            self.runner.fail(job, Some(message.as_str())).await?;
            return Ok(CallOutcome::Failed);
        };

        if job.token.is_none() && !self.authenticate(job).await? {
            return Ok(CallOutcome::Failed);
        }

        let body = match &step.body {
            Some(v) => Some(serde_json::to_string(v).map_err(anyhow::Error::from)?),
            None => None,
        };

        let mut url = step.url.clone().unwrap_or_default();
        let mut renewals = 0;
        let mut hops = 0;

        let response = loop {
            let request = build_request(method, &url, &step, job.token.as_deref(), body.clone());
            let resp = self.http.send(request).await?;

            if matches!(resp.status, 400 | 419) && renewals < MAX_AUTH_RENEWALS {
                renewals += 1;
                if !self.authenticate(job).await? {
                    return Ok(CallOutcome::Failed);
                }
                continue;
            }

            if (300..400).contains(&resp.status) {
                let Some(location) = resp.header("Location").map(str::to_string) else {
                    let message = format!("Failed: {} without Location header", resp.status);
                    job.record_response(resp.status, resp.headers, resp.body);
                    self.runner.fail(job, Some(message.as_str())).await?;
                    return Ok(CallOutcome::Failed);
                };
                if hops >= MAX_REDIRECTS {
                    job.record_response(resp.status, resp.headers, resp.body);
                    self.runner.fail(job, Some("Failed: too many redirects")).await?;
                    return Ok(CallOutcome::Failed);
                }
                hops += 1;
                url = resolve_location(&url, &location);
                self.runner
                    .append_log(job, &format!("Redirect: {} to {}", resp.status, url))
                    .await?;
                continue;
            }

            break resp;
        };

        self.classify(job, response).await
    }

    /// Returns false when the credentials were rejected (the job is failed).
    async fn authenticate(&self, job: &mut Job) -> Result<bool, StepError> {
        match self.auth.authenticate(&job.credentials).await? {
            Some(token) => {
                job.token = Some(token);
                self.runner.append_log(job, "Authenticated").await?;
                Ok(true)
            }
            None => {
                self.runner.fail(job, Some("Failed to authenticate")).await?;
                Ok(false)
            }
        }
    }

    async fn classify(&self, job: &mut Job, resp: HttpResponse) -> Result<CallOutcome, StepError> {
        let status = resp.status;
        job.record_response(status, resp.headers, resp.body);

        match status {
            200..=299 => {
                self.runner
                    .append_log(job, &format!("Succeeded: {status}"))
                    .await?;
                Ok(CallOutcome::Completed)
            }
            500..=599 => {
                self.runner
                    .append_log(
                        job,
                        &format!("Remote server error: {status}. Retrying via exception."),
                    )
                    .await?;
                Err(StepError::RemoteServer(status))
            }
            _ => {
                let message = format!("Failed: {status}");
                self.runner.fail(job, Some(message.as_str())).await?;
                Ok(CallOutcome::Failed)
            }
        }
    }
}

fn build_request(
    method: HttpMethod,
    url: &str,
    step: &Step,
    token: Option<&str>,
    body: Option<String>,
) -> HttpRequest {
    let mut headers = BTreeMap::new();
    headers.insert("Accept".to_string(), "application/json".to_string());
    if body.is_some() {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }
    if let Some(token) = token {
        headers.insert("X-API-Token".to_string(), token.to_string());
    }

    // step headers win, whatever their case
    for (name, value) in &step.headers {
        headers.retain(|k: &String, _| !k.eq_ignore_ascii_case(name));
        headers.insert(name.clone(), value.clone());
    }

    HttpRequest {
        method,
        url: url.to_string(),
        headers,
        body,
    }
}

fn resolve_location(current: &str, location: &str) -> String {
    reqwest::Url::parse(current)
        .and_then(|base| base.join(location))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| location.to_string())
}
