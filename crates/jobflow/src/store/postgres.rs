// crates/jobflow/src/store/postgres.rs
//
// Records live as JSONB documents next to a `version` column; the version
// predicate in every UPDATE is the optimistic check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CronStore, JobStore, SaveOutcome};
use crate::cron::CronTemplate;
use crate::jobs::Job;

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query_as::<_, (Json<Job>, i64)>(
            "SELECT doc, version FROM async_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(mut job), version)| {
            job.version = version;
            job
        }))
    }

    async fn create(&self, job: &mut Job) -> anyhow::Result<SaveOutcome> {
        let mut next = job.clone();
        next.version = 1;

        let res = sqlx::query(
            r#"
            INSERT INTO async_jobs (id, doc, version, destroy_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(next.id)
        .bind(Json(&next))
        .bind(next.version)
        .bind(next.destroy_at)
        .bind(next.created_at)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(SaveOutcome::Conflict);
        }
        *job = next;
        Ok(SaveOutcome::Saved)
    }

    async fn save(&self, job: &mut Job) -> anyhow::Result<SaveOutcome> {
        let mut next = job.clone();
        next.version = job.version + 1;
        next.updated_at = Utc::now();

        let res = sqlx::query(
            r#"
            UPDATE async_jobs
            SET doc = $2,
                version = $3,
                destroy_at = $4,
                updated_at = $5
            WHERE id = $1
              AND version = $6
            "#,
        )
        .bind(next.id)
        .bind(Json(&next))
        .bind(next.version)
        .bind(next.destroy_at)
        .bind(next.updated_at)
        .bind(job.version)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(SaveOutcome::Conflict);
        }
        *job = next;
        Ok(SaveOutcome::Saved)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM async_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM async_jobs WHERE destroy_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgCronStore {
    pool: PgPool,
}

impl PgCronStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CronStore for PgCronStore {
    async fn get(&self, id: &str) -> anyhow::Result<Option<CronTemplate>> {
        let row = sqlx::query_as::<_, (Json<CronTemplate>, i64)>(
            "SELECT doc, version FROM cron_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(mut t), version)| {
            t.version = version;
            t
        }))
    }

    async fn create(&self, template: &mut CronTemplate) -> anyhow::Result<SaveOutcome> {
        let mut next = template.clone();
        next.version = 1;

        let res = sqlx::query(
            r#"
            INSERT INTO cron_jobs (id, name, doc, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&next.id)
        .bind(&next.name)
        .bind(Json(&next))
        .bind(next.version)
        .bind(next.created_at)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(SaveOutcome::Conflict);
        }
        *template = next;
        Ok(SaveOutcome::Saved)
    }

    async fn save(&self, template: &mut CronTemplate) -> anyhow::Result<SaveOutcome> {
        let mut next = template.clone();
        next.version = template.version + 1;
        next.updated_at = Utc::now();

        let res = sqlx::query(
            r#"
            UPDATE cron_jobs
            SET name = $2,
                doc = $3,
                version = $4,
                updated_at = $5
            WHERE id = $1
              AND version = $6
            "#,
        )
        .bind(&next.id)
        .bind(&next.name)
        .bind(Json(&next))
        .bind(next.version)
        .bind(next.updated_at)
        .bind(template.version)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(SaveOutcome::Conflict);
        }
        *template = next;
        Ok(SaveOutcome::Saved)
    }

    async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM cron_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn scan(&self) -> anyhow::Result<Vec<CronTemplate>> {
        let rows = sqlx::query_as::<_, (Json<CronTemplate>, i64)>(
            "SELECT doc, version FROM cron_jobs ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(Json(mut t), version)| {
                t.version = version;
                t
            })
            .collect())
    }
}
