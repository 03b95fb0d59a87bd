// crates/jobflow/src/scheduler/templates.rs
use chrono::Utc;
use tracing::info;

use super::{Scheduler, KIND};
use crate::cron::{CronTemplate, CronTemplateInput};
use crate::error::{JobflowError, ValidationErrors};
use crate::store::SaveOutcome;

impl Scheduler {
    pub async fn create(&self, input: CronTemplateInput) -> Result<CronTemplate, JobflowError> {
        let mut template = input.into_template(Utc::now())?;
        if self.templates.create(&mut template).await? == SaveOutcome::Conflict {
            return Err(JobflowError::conflict(KIND, &template.id));
        }
        info!(template_id = %template.id, cron = %template.cron, "template created");
        Ok(template)
    }

    /// The lock sentinel is never visible here.
    pub async fn show(&self, id: &str) -> Result<CronTemplate, JobflowError> {
        match self.templates.get(id).await? {
            Some(t) if !t.is_lock_record() => Ok(t),
            _ => Err(JobflowError::not_found(KIND, id)),
        }
    }

    /// `input.lock_version` must match the stored version and `input.steps`
    /// is required. Other attributes left out keep their stored values.
    pub async fn update(
        &self,
        id: &str,
        input: CronTemplateInput,
    ) -> Result<CronTemplate, JobflowError> {
        let mut template = self.show(id).await?;

        let mut errs = ValidationErrors::new();
        if input.lock_version.is_none() {
            errs.add("lock_version", "must be specified");
        }
        if input.steps.is_null() {
            errs.add("steps", "must be specified");
        }
        errs.into_result()?;
        if input.lock_version != Some(template.version) {
            return Err(JobflowError::conflict(KIND, id));
        }

        template.apply(input)?;
        if self.templates.save(&mut template).await? == SaveOutcome::Conflict {
            return Err(JobflowError::conflict(KIND, id));
        }
        info!(template_id = %template.id, "template updated");
        Ok(template)
    }

    pub async fn delete(&self, id: &str) -> Result<(), JobflowError> {
        self.show(id).await?;
        if !self.templates.delete(id).await? {
            return Err(JobflowError::not_found(KIND, id));
        }
        info!(template_id = %id, "template deleted");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<CronTemplate>, JobflowError> {
        let all = self.templates.scan().await?;
        Ok(all.into_iter().filter(|t| !t.is_lock_record()).collect())
    }
}
