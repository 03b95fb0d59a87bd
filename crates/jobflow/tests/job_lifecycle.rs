mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use common::{job_spec, step, Harness, CREDENTIALS};
use jobflow::jobs::{JobStatus, NewJob};
use jobflow::JobflowError;

fn new_job(body: serde_json::Value) -> NewJob {
    serde_json::from_value(body).unwrap()
}

#[tokio::test]
async fn job_without_steps_finishes_at_creation() {
    let h = Harness::new();
    let job = h.runner.create(job_spec(vec![])).await.unwrap();

    assert!(job.succeeded);
    assert!(job.finished_at.is_some());
    assert_eq!(job.started_at, job.finished_at);
    assert_eq!(job.status(), JobStatus::Succeeded);
    assert!(h.queue.sent().is_empty());
}

#[tokio::test]
async fn job_with_steps_is_enqueued_once() {
    let h = Harness::new();
    let job = h
        .runner
        .create(job_spec(vec![step("a", "http://a"), step("b", "http://b")]))
        .await
        .unwrap();

    assert_eq!(h.queue.sent(), vec![job.id.to_string()]);
    assert_eq!(job.status(), JobStatus::Pending);
    assert_eq!(job.version, 1);
}

#[tokio::test]
async fn completing_every_step_succeeds_the_job() {
    let h = Harness::new();
    let mut job = h
        .runner
        .create(job_spec(vec![step("a", "http://a"), step("b", "http://b")]))
        .await
        .unwrap();

    h.runner.step_done(&mut job).await.unwrap();
    assert_eq!(job.last_completed_step, Some(0));
    assert!(job.finished_at.is_none());

    h.runner.step_done(&mut job).await.unwrap();
    assert_eq!(job.last_completed_step, Some(1));
    assert!(job.succeeded);

    let stored = h.runner.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored, job);
}

#[tokio::test]
async fn step_done_on_a_finished_job_changes_nothing() {
    let h = Harness::new();
    let mut job = h
        .runner
        .create(job_spec(vec![step("a", "http://a"), step("b", "http://b")]))
        .await
        .unwrap();
    h.runner.fail(&mut job, Some("Failed: 404")).await.unwrap();
    let version = job.version;

    h.runner.step_done(&mut job).await.unwrap();

    assert_eq!(job.version, version);
    assert_eq!(job.last_completed_step, None);
    assert!(job.failed);
    assert!(!job.succeeded);
}

#[tokio::test]
async fn stale_copies_cannot_overwrite_newer_state() {
    let h = Harness::new();
    let mut job = h
        .runner
        .create(job_spec(vec![step("a", "http://a"), step("b", "http://b")]))
        .await
        .unwrap();
    let mut stale = job.clone();

    h.runner.step_done(&mut job).await.unwrap();
    let err = h.runner.step_done(&mut stale).await.unwrap_err();

    assert!(matches!(err, JobflowError::Conflict { kind: "AsyncJob", .. }));
    let stored = h.runner.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.last_completed_step, Some(0));
}

#[tokio::test]
async fn append_log_returns_the_message() {
    let h = Harness::new();
    let mut job = h
        .runner
        .create(job_spec(vec![step("a", "http://a")]))
        .await
        .unwrap();

    let logged = h.runner.append_log(&mut job, "Log data").await.unwrap();
    assert_eq!(logged, "Log data");

    let stored = h.runner.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.steps[0].log, vec!["Log data"]);
}

#[tokio::test]
async fn poison_without_email_sends_nothing() {
    let h = Harness::new();
    let mut job = h
        .runner
        .create(job_spec(vec![step("a", "http://a")]))
        .await
        .unwrap();

    h.runner.mark_poison(&mut job).await.unwrap();
    assert_eq!(job.status(), JobStatus::Poison);
    assert!(h.mailer.sent().is_empty());

    // a second call is a no-op
    let version = job.version;
    h.runner.mark_poison(&mut job).await.unwrap();
    assert_eq!(job.version, version);
}

#[tokio::test]
async fn expired_jobs_are_purged() {
    let h = Harness::new();
    let keep = h
        .runner
        .create(job_spec(vec![step("a", "http://a")]))
        .await
        .unwrap();
    let mut short = job_spec(vec![step("a", "http://a")]);
    short.max_seconds_in_queue = 1;
    let gone = h.runner.create(short).await.unwrap();

    let purged = h
        .runner
        .purge_expired(Utc::now() + Duration::seconds(10))
        .await
        .unwrap();

    assert_eq!(purged, 1);
    assert!(h.runner.get(gone.id).await.unwrap().is_none());
    assert!(h.runner.get(keep.id).await.unwrap().is_some());
}

// ----------------------------
// Input validation
// ----------------------------

#[tokio::test]
async fn malformed_credentials_are_rejected() {
    let err = new_job(json!({ "credentials": "not base64!", "steps": [] }))
        .validate()
        .unwrap_err();
    let JobflowError::Validation(fields) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(fields.get("credentials"), Some(&["are malformed".to_string()][..]));
}

#[tokio::test]
async fn credentials_are_not_rechecked_after_creation() {
    let h = Harness::new();
    let spec = new_job(json!({
        "credentials": CREDENTIALS,
        "steps": [{ "name": "a", "url": "http://a" }],
    }))
    .validate()
    .unwrap();
    let mut job = h.runner.create(spec).await.unwrap();

    job.credentials = "garbage".to_string();
    h.runner.save(&mut job).await.unwrap();
    h.runner.step_done(&mut job).await.unwrap();

    assert!(job.succeeded);
}

#[tokio::test]
async fn validated_input_fills_defaults() {
    let spec = new_job(json!({
        "credentials": CREDENTIALS,
        "steps": [{ "name": "a", "url": "http://a", "method": "POST", "body": { "x": 1 } }],
        "poison_limit": 9,
    }))
    .validate()
    .unwrap();

    assert_eq!(spec.default_poison_limit, 9);
    assert_eq!(spec.default_step_time, 30);
    assert_eq!(spec.max_seconds_in_queue, 86_400);
    assert_eq!(spec.steps[0].body, Some(json!({ "x": 1 })));
    assert!(spec.token.is_none());
}
