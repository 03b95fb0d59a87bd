// crates/jobflow/src/api/models.rs
//
// Response bodies. Secrets (credentials, token) are never rendered.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cron::{CronExpression, CronTemplate};
use crate::jobs::{Job, JobStatus, Step};

#[derive(Debug, Clone, Serialize)]
pub struct AsyncJobView {
    pub id: Uuid,
    pub status: JobStatus,
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
    pub lock_version: i64,
}

impl From<&Job> for AsyncJobView {
    fn from(j: &Job) -> Self {
        Self {
            id: j.id,
            status: j.status(),
            steps: j.steps.clone(),
            last_completed_step: j.last_completed_step,
            started_at: j.started_at,
            finished_at: j.finished_at,
            succeeded: j.succeeded,
            failed: j.failed,
            poison: j.poison,
            max_seconds_in_queue: j.max_seconds_in_queue,
            destroy_at: j.destroy_at,
            default_poison_limit: j.default_poison_limit,
            default_step_time: j.default_step_time,
            last_status: j.last_status,
            last_headers: j.last_headers.clone(),
            last_body: j.last_body.clone(),
            poison_email: j.poison_email.clone(),
            created_at: j.created_at,
            updated_at: j.updated_at,
            lock_version: j.version,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CronJobView {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub cron: String,
    pub cron_structure: Option<CronExpression>,
    pub steps: Vec<Step>,
    pub max_seconds_in_queue: i64,
    pub default_poison_limit: i64,
    pub default_step_time: i64,
    pub poison_email: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_fired_job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lock_version: i64,
}

impl From<&CronTemplate> for CronJobView {
    fn from(t: &CronTemplate) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            description: t.description.clone(),
            enabled: t.enabled,
            cron: t.cron.clone(),
            cron_structure: t.cron_structure.clone(),
            steps: t.steps.clone(),
            max_seconds_in_queue: t.max_seconds_in_queue,
            default_poison_limit: t.default_poison_limit,
            default_step_time: t.default_step_time,
            poison_email: t.poison_email.clone(),
            last_run_at: t.last_run_at,
            last_fired_job_id: t.last_fired_job_id,
            created_at: t.created_at,
            updated_at: t.updated_at,
            lock_version: t.version,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AsyncJobBody {
    pub async_job: AsyncJobView,
}

#[derive(Debug, Serialize)]
pub struct CronJobBody {
    pub cron_job: CronJobView,
}

#[derive(Debug, Serialize)]
pub struct Collection<T> {
    pub resources: Vec<T>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CollectionBody<T> {
    #[serde(rename = "_collection")]
    pub collection: Collection<T>,
}

impl<T> CollectionBody<T> {
    pub fn new(resources: Vec<T>) -> Self {
        let count = resources.len();
        Self {
            collection: Collection { resources, count },
        }
    }
}
