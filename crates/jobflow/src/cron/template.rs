// crates/jobflow/src/cron/template.rs
//
// Recurring job templates. A template carries everything needed to build a
// Job plus the cron schedule that decides when the scheduler fires it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::expression::CronExpression;
use crate::error::{JobflowError, ValidationErrors};
use crate::jobs::model::{
    JobSpec, Step, DEFAULT_MAX_SECONDS_IN_QUEUE, DEFAULT_POISON_LIMIT, DEFAULT_STEP_TIME,
};
use crate::jobs::validation::{parse_steps, positive, validate_credentials, validate_email};

/// Id of the sentinel row used as the scheduler's table lock.
pub const TABLE_LOCK_RECORD_ID: &str = "_table_lock_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronTemplate {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: bool,

    /// As written, aliases included.
    pub cron: String,
    /// Always recomputed from `cron`; absent only on the lock sentinel.
    #[serde(default)]
    pub cron_structure: Option<CronExpression>,

    pub credentials: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    pub max_seconds_in_queue: i64,
    pub default_poison_limit: i64,
    pub default_step_time: i64,
    #[serde(default)]
    pub poison_email: Option<String>,

    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_fired_job_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl CronTemplate {
    /// The table-lock sentinel. It never matches any schedule.
    pub fn lock_record(now: DateTime<Utc>) -> Self {
        Self {
            id: TABLE_LOCK_RECORD_ID.to_string(),
            name: None,
            description: None,
            enabled: false,
            cron: String::new(),
            cron_structure: None,
            credentials: String::new(),
            token: None,
            steps: Vec::new(),
            max_seconds_in_queue: DEFAULT_MAX_SECONDS_IN_QUEUE,
            default_poison_limit: DEFAULT_POISON_LIMIT,
            default_step_time: DEFAULT_STEP_TIME,
            poison_email: None,
            last_run_at: None,
            last_fired_job_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_lock_record(&self) -> bool {
        self.id == TABLE_LOCK_RECORD_ID
    }

    /// Schedule match only; `enabled` is the caller's concern.
    pub fn due(&self, t: DateTime<Utc>) -> bool {
        self.cron_structure
            .as_ref()
            .is_some_and(|c| c.is_due(t))
    }

    /// True when the template already fired during the minute containing `t`.
    pub fn fired_in_minute_of(&self, t: DateTime<Utc>) -> bool {
        self.last_run_at
            .is_some_and(|last| last.timestamp().div_euclid(60) == t.timestamp().div_euclid(60))
    }

    /// Attributes for a new Job built from this template. Execution state in
    /// the steps (logs, receive counts) is not carried over.
    pub fn job_spec(&self) -> JobSpec {
        JobSpec {
            id: None,
            credentials: self.credentials.clone(),
            token: self.token.clone(),
            steps: self.steps.iter().map(Step::fresh).collect(),
            max_seconds_in_queue: self.max_seconds_in_queue,
            default_poison_limit: self.default_poison_limit,
            default_step_time: self.default_step_time,
            poison_email: self.poison_email.clone(),
        }
    }

    /// Applies an update. Attributes absent from `input` keep their stored
    /// values. Credentials are replaced only when supplied and are not
    /// re-validated.
    pub fn apply(&mut self, input: CronTemplateInput) -> Result<(), JobflowError> {
        let mut errs = ValidationErrors::new();
        let fields = input.checked_fields(&mut errs);
        errs.into_result()?;

        if let Some(name) = input.name {
            self.name = Some(name);
        }
        if let Some(description) = input.description {
            self.description = Some(description);
        }
        if let Some(enabled) = input.enabled {
            self.enabled = enabled;
        }
        if let Some(credentials) = input.credentials.filter(|c| !c.trim().is_empty()) {
            self.credentials = credentials;
        }
        if let Some(token) = input.token {
            self.token = Some(token).filter(|t| !t.is_empty());
        }
        fields.assign(self);
        Ok(())
    }

    /// Like `apply`, but described attributes absent from `input` return to
    /// their defaults. Credentials and token are kept unless supplied.
    pub fn replace(&mut self, input: CronTemplateInput) -> Result<(), JobflowError> {
        let mut fresh = Self {
            name: None,
            description: None,
            enabled: true,
            steps: Vec::new(),
            max_seconds_in_queue: DEFAULT_MAX_SECONDS_IN_QUEUE,
            default_poison_limit: DEFAULT_POISON_LIMIT,
            default_step_time: DEFAULT_STEP_TIME,
            poison_email: None,
            ..self.clone()
        };
        fresh.apply(input)?;
        *self = fresh;
        Ok(())
    }
}

/// Request body for creating or updating a template, and one entry of a
/// reconciliation file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CronTemplateInput {
    #[serde(default, alias = "uuid")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub cron: Value,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub steps: Value,
    #[serde(default)]
    pub max_seconds_in_queue: Option<i64>,
    #[serde(default, alias = "poison_limit")]
    pub default_poison_limit: Option<i64>,
    #[serde(default)]
    pub default_step_time: Option<i64>,
    #[serde(default)]
    pub poison_email: Option<String>,
    #[serde(default)]
    pub lock_version: Option<i64>,
}

/// Validated values shared by create and update. `None` means the attribute
/// was not supplied; `cron` is always required.
struct CheckedFields {
    cron: String,
    cron_structure: Option<CronExpression>,
    steps: Option<Vec<Step>>,
    max_seconds_in_queue: Option<i64>,
    default_poison_limit: Option<i64>,
    default_step_time: Option<i64>,
    /// `Some(None)` clears the address.
    poison_email: Option<Option<String>>,
}

impl CheckedFields {
    fn assign(self, t: &mut CronTemplate) {
        t.cron = self.cron;
        t.cron_structure = self.cron_structure;
        if let Some(steps) = self.steps {
            t.steps = steps;
        }
        if let Some(v) = self.max_seconds_in_queue {
            t.max_seconds_in_queue = v;
        }
        if let Some(v) = self.default_poison_limit {
            t.default_poison_limit = v;
        }
        if let Some(v) = self.default_step_time {
            t.default_step_time = v;
        }
        if let Some(email) = self.poison_email {
            t.poison_email = email;
        }
    }
}

impl CronTemplateInput {
    /// Validates a new template. Credentials are required here and only here.
    pub fn into_template(self, now: DateTime<Utc>) -> Result<CronTemplate, JobflowError> {
        let mut errs = ValidationErrors::new();

        validate_credentials(self.credentials.as_deref(), &mut errs);
        if self.id.as_deref() == Some(TABLE_LOCK_RECORD_ID) {
            errs.add("id", "is reserved");
        }
        let fields = self.checked_fields(&mut errs);
        errs.into_result()?;

        let mut template = CronTemplate {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name,
            description: self.description,
            enabled: self.enabled.unwrap_or(true),
            cron: String::new(),
            cron_structure: None,
            credentials: self.credentials.unwrap_or_default(),
            token: self.token.filter(|t| !t.is_empty()),
            steps: Vec::new(),
            max_seconds_in_queue: DEFAULT_MAX_SECONDS_IN_QUEUE,
            default_poison_limit: DEFAULT_POISON_LIMIT,
            default_step_time: DEFAULT_STEP_TIME,
            poison_email: None,
            last_run_at: None,
            last_fired_job_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        fields.assign(&mut template);
        Ok(template)
    }

    fn checked_fields(&self, errs: &mut ValidationErrors) -> CheckedFields {
        let (cron, cron_structure) = parse_cron(&self.cron, errs);
        let steps = (!self.steps.is_null()).then(|| parse_steps(&self.steps, errs));
        validate_email(self.poison_email.as_deref(), errs);

        CheckedFields {
            cron,
            cron_structure,
            steps,
            max_seconds_in_queue: self.max_seconds_in_queue.map(|v| {
                positive("max_seconds_in_queue", Some(v), DEFAULT_MAX_SECONDS_IN_QUEUE, errs)
            }),
            default_poison_limit: self.default_poison_limit.map(|v| {
                positive("default_poison_limit", Some(v), DEFAULT_POISON_LIMIT, errs)
            }),
            default_step_time: self.default_step_time.map(|v| {
                positive("default_step_time", Some(v), DEFAULT_STEP_TIME, errs)
            }),
            poison_email: self
                .poison_email
                .clone()
                .map(|e| Some(e).filter(|e| !e.trim().is_empty())),
        }
    }
}

fn parse_cron(value: &Value, errs: &mut ValidationErrors) -> (String, Option<CronExpression>) {
    let source = match value {
        Value::Null => {
            errs.add("cron", "must be specified");
            return (String::new(), None);
        }
        Value::String(s) => s.clone(),
        _ => {
            errs.add("cron", "must be a string");
            return (String::new(), None);
        }
    };

    match CronExpression::parse(&source) {
        Ok(expr) => (source, Some(expr)),
        Err(messages) => {
            errs.extend("cron", messages);
            (source, None)
        }
    }
}
