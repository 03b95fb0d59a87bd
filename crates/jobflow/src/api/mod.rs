use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::api::models::{AsyncJobBody, CollectionBody, CronJobBody};
use crate::cron::CronTemplateInput;
use crate::error::{JobflowError, ValidationErrors};
use crate::jobs::{JobRunner, NewJob};
use crate::scheduler::Scheduler;

pub mod models;

#[derive(Clone)]
pub struct ApiState {
    pub runner: JobRunner,
    pub scheduler: Scheduler,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Jobs
        .route("/v1/async_jobs", post(create_job))
        .route("/v1/async_jobs/cleanup", put(cleanup_jobs))
        .route("/v1/async_jobs/:id", get(show_job).delete(delete_job))
        // Templates
        .route("/v1/cron_jobs", get(list_templates).post(create_template))
        .route(
            "/v1/cron_jobs/:id",
            get(show_template)
                .put(update_template)
                .delete(delete_template),
        )
        .route("/v1/cron_jobs/:id/run", put(run_template))
        .route("/v1/execute_cron_jobs", put(execute_templates))
        // Health
        .route("/alive", get(alive))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<ValidationErrors>,
}

/// `JobflowError` rendered as an HTTP response.
pub struct ApiError(JobflowError);

impl From<JobflowError> for ApiError {
    fn from(e: JobflowError) -> Self {
        Self(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(JobflowError::Internal(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            JobflowError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    error: "validation failed".into(),
                    fields: Some(fields),
                },
            ),
            e @ JobflowError::Conflict { .. } => (
                StatusCode::CONFLICT,
                ErrorBody {
                    error: e.to_string(),
                    fields: None,
                },
            ),
            e @ JobflowError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: e.to_string(),
                    fields: None,
                },
            ),
            JobflowError::Internal(e) => {
                error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: format!("internal error: {e}"),
                        fields: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError(JobflowError::not_found("AsyncJob", raw)))
}

// ----------------------------
// Jobs
// ----------------------------

pub async fn create_job(State(state): State<ApiState>, Json(body): Json<NewJob>) -> ApiResult {
    let spec = body.validate()?;
    let job = state.runner.create(spec).await?;
    Ok((
        StatusCode::CREATED,
        Json(AsyncJobBody {
            async_job: (&job).into(),
        }),
    )
        .into_response())
}

pub async fn show_job(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult {
    let id = job_id(&id)?;
    let job = state
        .runner
        .get(id)
        .await?
        .ok_or_else(|| JobflowError::not_found("AsyncJob", id))?;
    Ok(Json(AsyncJobBody {
        async_job: (&job).into(),
    })
    .into_response())
}

pub async fn delete_job(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult {
    let id = job_id(&id)?;
    if !state.runner.delete(id).await? {
        return Err(JobflowError::not_found("AsyncJob", id).into());
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn cleanup_jobs(State(state): State<ApiState>) -> ApiResult {
    state.runner.purge_expired(Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ----------------------------
// Templates
// ----------------------------

pub async fn list_templates(State(state): State<ApiState>) -> ApiResult {
    let templates = state.scheduler.list().await?;
    let bodies = templates
        .iter()
        .map(|t| CronJobBody { cron_job: t.into() })
        .collect();
    Ok(Json(CollectionBody::new(bodies)).into_response())
}

pub async fn create_template(
    State(state): State<ApiState>,
    Json(body): Json<CronTemplateInput>,
) -> ApiResult {
    let t = state.scheduler.create(body).await?;
    Ok((StatusCode::CREATED, Json(CronJobBody { cron_job: (&t).into() })).into_response())
}

pub async fn show_template(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult {
    let t = state.scheduler.show(&id).await?;
    Ok(Json(CronJobBody { cron_job: (&t).into() }).into_response())
}

pub async fn update_template(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<CronTemplateInput>,
) -> ApiResult {
    let t = state.scheduler.update(&id, body).await?;
    Ok(Json(CronJobBody { cron_job: (&t).into() }).into_response())
}

pub async fn delete_template(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult {
    state.scheduler.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn run_template(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult {
    state.scheduler.fire_now(&id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn execute_templates(State(state): State<ApiState>) -> ApiResult {
    state.scheduler.sweep(Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn alive() -> impl IntoResponse {
    (StatusCode::OK, "ALIVE")
}
