// crates/jobflow/src/jobs/validation.rs
//
// Input checks shared by jobs and cron templates.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{JobflowError, ValidationErrors};
use crate::jobs::model::{
    JobSpec, Step, DEFAULT_MAX_SECONDS_IN_QUEUE, DEFAULT_POISON_LIMIT, DEFAULT_STEP_TIME,
};

/// Request body for creating a job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewJob {
    #[serde(default, alias = "uuid")]
    pub id: Option<Uuid>,
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
}

impl NewJob {
    pub fn validate(self) -> Result<JobSpec, JobflowError> {
        let mut errs = ValidationErrors::new();

        validate_credentials(self.credentials.as_deref(), &mut errs);
        let steps = parse_steps(&self.steps, &mut errs);
        validate_email(self.poison_email.as_deref(), &mut errs);
        let max_seconds_in_queue = positive(
            "max_seconds_in_queue",
            self.max_seconds_in_queue,
            DEFAULT_MAX_SECONDS_IN_QUEUE,
            &mut errs,
        );
        let default_poison_limit = positive(
            "default_poison_limit",
            self.default_poison_limit,
            DEFAULT_POISON_LIMIT,
            &mut errs,
        );
        let default_step_time = positive(
            "default_step_time",
            self.default_step_time,
            DEFAULT_STEP_TIME,
            &mut errs,
        );

        errs.into_result()?;

        Ok(JobSpec {
            id: self.id,
            credentials: self.credentials.unwrap_or_default(),
            token: self.token.filter(|t| !t.is_empty()),
            steps,
            max_seconds_in_queue,
            default_poison_limit,
            default_step_time,
            poison_email: self.poison_email.filter(|e| !e.trim().is_empty()),
        })
    }
}

/// Splits base64 `username:password` credentials.
pub fn decode_credentials(encoded: &str) -> Option<(String, String)> {
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Credentials are only checked when a record is created.
pub fn validate_credentials(credentials: Option<&str>, errs: &mut ValidationErrors) {
    let Some(value) = credentials.filter(|c| !c.trim().is_empty()) else {
        errs.add("credentials", "must be specified");
        return;
    };

    match decode_credentials(value) {
        Some((user, pass)) if !user.trim().is_empty() && !pass.trim().is_empty() => {}
        _ => errs.add("credentials", "are malformed"),
    }
}

pub fn parse_steps(value: &Value, errs: &mut ValidationErrors) -> Vec<Step> {
    let items = match value {
        Value::Null => return Vec::new(),
        Value::Array(items) => items,
        _ => {
            errs.add("steps", "must be an Array");
            return Vec::new();
        }
    };

    let mut steps = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match serde_json::from_value::<Step>(item.clone()) {
            Ok(step) => steps.push(step),
            Err(e) => errs.add("steps", format!("element {i} is invalid: {e}")),
        }
    }
    steps
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap_or_else(|e| panic!("bad email regex: {e}"))
    })
}

pub fn validate_email(email: Option<&str>, errs: &mut ValidationErrors) {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return;
    };
    if !email_regex().is_match(email) {
        errs.add("poison_email", "is invalid");
    }
}

pub fn positive(
    field: &str,
    value: Option<i64>,
    default: i64,
    errs: &mut ValidationErrors,
) -> i64 {
    match value {
        None => default,
        Some(v) if v > 0 => v,
        Some(_) => {
            errs.add(field, "must be a positive integer");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_job(body: Value) -> NewJob {
        serde_json::from_value(body).unwrap()
    }

    fn field_errors(res: Result<JobSpec, JobflowError>, field: &str) -> Vec<String> {
        match res {
            Err(JobflowError::Validation(errs)) => errs.get(field).unwrap_or(&[]).to_vec(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn decodes_username_and_password() {
        assert_eq!(
            decode_credentials("bWFnbmV0bzp4YXZpZXI="),
            Some(("magneto".to_string(), "xavier".to_string()))
        );
        assert_eq!(decode_credentials("blahonga"), None);
    }

    #[test]
    fn credentials_are_required_and_well_formed() {
        let res = new_job(json!({ "steps": [] })).validate();
        assert_eq!(field_errors(res, "credentials"), vec!["must be specified"]);

        let res = new_job(json!({ "credentials": "blahonga" })).validate();
        assert_eq!(field_errors(res, "credentials"), vec!["are malformed"]);

        assert!(new_job(json!({ "credentials": "bWFnbmV0bzp4YXZpZXI=" }))
            .validate()
            .is_ok());
    }

    #[test]
    fn steps_must_be_an_array() {
        let res = new_job(json!({ "credentials": "bWFnbmV0bzp4YXZpZXI=", "steps": "nope" }))
            .validate();
        assert_eq!(field_errors(res, "steps"), vec!["must be an Array"]);

        let spec = new_job(json!({
            "credentials": "bWFnbmV0bzp4YXZpZXI=",
            "steps": [{ "name": "a", "url": "http://x", "poison_limit": 50 }, {}]
        }))
        .validate()
        .unwrap();
        assert_eq!(spec.steps.len(), 2);
        assert_eq!(spec.steps[0].poison_limit, Some(50));
    }

    #[test]
    fn poison_email_is_checked() {
        let res = new_job(json!({
            "credentials": "bWFnbmV0bzp4YXZpZXI=",
            "poison_email": "not an email"
        }))
        .validate();
        assert_eq!(field_errors(res, "poison_email"), vec!["is invalid"]);

        let spec = new_job(json!({
            "credentials": "bWFnbmV0bzp4YXZpZXI=",
            "poison_email": "ops@example.com"
        }))
        .validate()
        .unwrap();
        assert_eq!(spec.poison_email.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn defaults_apply() {
        let spec = new_job(json!({ "credentials": "bWFnbmV0bzp4YXZpZXI=" }))
            .validate()
            .unwrap();
        assert_eq!(spec.max_seconds_in_queue, DEFAULT_MAX_SECONDS_IN_QUEUE);
        assert_eq!(spec.default_poison_limit, DEFAULT_POISON_LIMIT);
        assert_eq!(spec.default_step_time, DEFAULT_STEP_TIME);
        assert!(spec.steps.is_empty());
    }
}
