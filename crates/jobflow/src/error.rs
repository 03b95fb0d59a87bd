// crates/jobflow/src/error.rs
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Field-scoped validation messages, keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn extend(&mut self, field: &str, messages: impl IntoIterator<Item = String>) {
        for m in messages {
            self.add(field, m);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(|v| v.as_slice())
    }

    /// Ok(()) when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), JobflowError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(JobflowError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for m in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field} {m}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Errors surfaced to callers of the job and template services.
#[derive(Debug, Error)]
pub enum JobflowError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{kind} {id} was modified concurrently")]
    Conflict { kind: &'static str, id: String },

    #[error("{kind} not found")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl JobflowError {
    pub fn conflict(kind: &'static str, id: impl ToString) -> Self {
        Self::Conflict {
            kind,
            id: id.to_string(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
