use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_MAX_SECONDS_IN_QUEUE: i64 = 86_400;
pub const DEFAULT_POISON_LIMIT: i64 = 5;
pub const DEFAULT_STEP_TIME: i64 = 30;

pub const REDACTED: &str = "[REDACTED]";

/// One HTTP call in a job's step sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_base: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_exponent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poison_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_time: Option<i64>,

    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_count: Option<i64>,
}

impl Step {
    /// The step as a template for a new job: execution state cleared.
    pub fn fresh(&self) -> Self {
        Self {
            log: Vec::new(),
            receive_count: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Poison,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Poison => "poison",
        }
    }
}

/// Validated attributes for a job about to be created.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: Option<Uuid>,
    pub credentials: String,
    pub token: Option<String>,
    pub steps: Vec<Step>,
    pub max_seconds_in_queue: i64,
    pub default_poison_limit: i64,
    pub default_step_time: i64,
    pub poison_email: Option<String>,
}

/// An ordered sequence of steps executed one queue message at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub credentials: String,
    pub token: Option<String>,
    pub steps: Vec<Step>,
    pub last_completed_step: Option<usize>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub succeeded: bool,
    pub failed: bool,
    pub poison: bool,

    pub max_seconds_in_queue: i64,
    pub destroy_at: DateTime<Utc>,
    pub default_poison_limit: i64,
    pub default_step_time: i64,

    pub last_status: Option<u16>,
    pub last_headers: Option<BTreeMap<String, String>>,
    pub last_body: Option<String>,

    pub poison_email: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Job {
    pub fn new(spec: JobSpec, now: DateTime<Utc>) -> Self {
        let mut job = Self {
            id: spec.id.unwrap_or_else(Uuid::new_v4),
            credentials: spec.credentials,
            token: spec.token,
            steps: spec.steps,
            last_completed_step: None,
            started_at: None,
            finished_at: None,
            succeeded: false,
            failed: false,
            poison: false,
            max_seconds_in_queue: spec.max_seconds_in_queue,
            destroy_at: now + Duration::seconds(spec.max_seconds_in_queue),
            default_poison_limit: spec.default_poison_limit,
            default_step_time: spec.default_step_time,
            last_status: None,
            last_headers: None,
            last_body: None,
            poison_email: spec.poison_email,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        if job.steps.is_empty() {
            job.started_at = Some(now);
            job.finish_succeeded(now);
        }

        job
    }

    // ----------------------------
    // Step cursor
    // ----------------------------

    pub fn current_step_index(&self) -> usize {
        self.last_completed_step.map(|i| i + 1).unwrap_or(0)
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_step_index())
    }

    pub fn current_step_mut(&mut self) -> Option<&mut Step> {
        let idx = self.current_step_index();
        self.steps.get_mut(idx)
    }

    pub fn done_all_steps(&self) -> bool {
        self.current_step().is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn status(&self) -> JobStatus {
        if self.poison {
            JobStatus::Poison
        } else if self.failed {
            JobStatus::Failed
        } else if self.succeeded {
            JobStatus::Succeeded
        } else if self.started_at.is_some() {
            JobStatus::Running
        } else {
            JobStatus::Pending
        }
    }

    pub fn poison_limit(&self) -> i64 {
        self.current_step()
            .and_then(|s| s.poison_limit)
            .unwrap_or(self.default_poison_limit)
    }

    pub fn step_time(&self) -> i64 {
        self.current_step()
            .and_then(|s| s.step_time)
            .unwrap_or(self.default_step_time)
    }

    /// Appends to the current step's log, or to the last step once the cursor
    /// has run off the end. Returns false for a job without steps.
    pub fn push_log(&mut self, message: &str) -> bool {
        let idx = self.current_step_index().min(self.steps.len().saturating_sub(1));
        match self.steps.get_mut(idx) {
            Some(step) => {
                step.log.push(message.to_string());
                true
            }
            None => false,
        }
    }

    // ----------------------------
    // State transitions
    // ----------------------------

    /// Marks the current step complete. Returns false when nothing changed.
    pub fn advance(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_finished() {
            return false;
        }

        let idx = self.current_step_index();
        if idx < self.steps.len() {
            self.last_completed_step = Some(idx);
        }

        if self.done_all_steps() && !self.failed {
            self.finish_succeeded(now);
        }
        true
    }

    pub fn finish_succeeded(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_finished() {
            return false;
        }
        self.finished_at = Some(now);
        self.succeeded = true;
        self.failed = false;
        true
    }

    pub fn finish_failed(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_finished() {
            return false;
        }
        self.finished_at = Some(now);
        self.failed = true;
        self.succeeded = false;
        true
    }

    pub fn finish_poison(&mut self, now: DateTime<Utc>) -> bool {
        if !self.finish_failed(now) {
            return false;
        }
        self.poison = true;
        true
    }

    pub fn record_response(
        &mut self,
        status: u16,
        headers: BTreeMap<String, String>,
        body: Option<String>,
    ) {
        self.last_status = Some(status);
        self.last_headers = Some(headers);
        self.last_body = body;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.destroy_at <= now
    }

    /// Copy safe to hand to people: the secret is replaced.
    pub fn redacted(&self) -> Self {
        Self {
            credentials: REDACTED.to_string(),
            ..self.clone()
        }
    }
}
