// crates/jobflow/src/scheduler/reconcile.rs
//
// Brings the stored templates in line with a declarative list keyed by name.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::{Scheduler, KIND};
use crate::cron::{CronTemplate, CronTemplateInput};
use crate::error::{JobflowError, ValidationErrors};
use crate::jobs::Step;
use crate::store::SaveOutcome;

/// Template names per action taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
}

/// Reads a JSON array of template descriptions.
pub fn load_descriptions(path: impl AsRef<Path>) -> anyhow::Result<Vec<CronTemplateInput>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading cron file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing cron file {}", path.display()))
}

/// The fields reconciliation compares.
#[derive(PartialEq)]
struct Tracked<'a> {
    name: Option<&'a str>,
    description: Option<&'a str>,
    credentials: &'a str,
    steps: &'a [Step],
    max_seconds_in_queue: i64,
    default_poison_limit: i64,
    default_step_time: i64,
    cron: &'a str,
    enabled: bool,
}

impl<'a> Tracked<'a> {
    fn of(t: &'a CronTemplate) -> Self {
        Self {
            name: t.name.as_deref(),
            description: t.description.as_deref(),
            credentials: &t.credentials,
            steps: &t.steps,
            max_seconds_in_queue: t.max_seconds_in_queue,
            default_poison_limit: t.default_poison_limit,
            default_step_time: t.default_step_time,
            cron: &t.cron,
            enabled: t.enabled,
        }
    }
}

impl Scheduler {
    /// Creates, updates and deletes templates so the store matches
    /// `descriptions`. Running it twice with the same input changes nothing.
    pub async fn reconcile(
        &self,
        descriptions: Vec<CronTemplateInput>,
    ) -> Result<ReconcileReport, JobflowError> {
        // 1) every description needs a unique name
        let mut errs = ValidationErrors::new();
        let mut seen = BTreeSet::new();
        for (i, d) in descriptions.iter().enumerate() {
            match d.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                None => errs.add("name", format!("entry {i} must be specified")),
                Some(n) if !seen.insert(n.to_string()) => {
                    errs.add("name", format!("'{n}' is not unique"))
                }
                Some(_) => {}
            }
        }
        errs.into_result()?;

        // 2) index what is stored
        let mut existing: BTreeMap<String, CronTemplate> = BTreeMap::new();
        let mut report = ReconcileReport::default();
        for t in self.list().await? {
            match t.name.clone() {
                Some(name) if !existing.contains_key(&name) => {
                    existing.insert(name, t);
                }
                _ => {
                    self.remove(&t, &mut report).await?;
                }
            }
        }

        // 3) create or update
        for d in descriptions {
            let name = d.name.clone().unwrap_or_default().trim().to_string();
            match existing.remove(&name) {
                None => {
                    self.create(d).await?;
                    report.created.push(name);
                }
                Some(stored) => {
                    let mut candidate = stored.clone();
                    candidate.replace(d)?;
                    if Tracked::of(&candidate) == Tracked::of(&stored) {
                        report.unchanged.push(name);
                        continue;
                    }
                    if self.templates.save(&mut candidate).await? == SaveOutcome::Conflict {
                        return Err(JobflowError::conflict(KIND, &candidate.id));
                    }
                    report.updated.push(name);
                }
            }
        }

        // 4) whatever is left is no longer described
        for t in existing.into_values() {
            self.remove(&t, &mut report).await?;
        }

        info!(
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            unchanged = report.unchanged.len(),
            "templates reconciled"
        );
        Ok(report)
    }

    async fn remove(
        &self,
        t: &CronTemplate,
        report: &mut ReconcileReport,
    ) -> Result<(), JobflowError> {
        self.templates.delete(&t.id).await?;
        report
            .deleted
            .push(t.name.clone().unwrap_or_else(|| t.id.clone()));
        Ok(())
    }
}
