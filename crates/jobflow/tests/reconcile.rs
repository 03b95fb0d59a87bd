mod common;

use std::io::Write;

use serde_json::{json, Value};

use common::{template_input, Harness, CREDENTIALS};
use jobflow::cron::CronTemplateInput;
use jobflow::scheduler::load_descriptions;
use jobflow::JobflowError;

fn descriptions(items: Value) -> Vec<CronTemplateInput> {
    serde_json::from_value(items).unwrap()
}

fn nightly(name: &str, cron: &str) -> Value {
    json!({
        "name": name,
        "description": format!("{name} job"),
        "cron": cron,
        "credentials": CREDENTIALS,
        "steps": [{ "name": "go", "url": format!("http://example.com/{name}") }],
    })
}

#[tokio::test]
async fn creates_missing_templates_and_is_idempotent() {
    let h = Harness::new();
    let input = json!([nightly("backup", "0 2 * * *"), nightly("report", "@daily")]);

    let first = h.scheduler.reconcile(descriptions(input.clone())).await.unwrap();
    assert_eq!(first.created, vec!["backup", "report"]);
    assert!(first.updated.is_empty());
    assert!(first.deleted.is_empty());

    let second = h.scheduler.reconcile(descriptions(input)).await.unwrap();
    assert!(second.created.is_empty());
    assert!(second.updated.is_empty());
    assert_eq!(second.unchanged, vec!["backup", "report"]);

    assert_eq!(h.scheduler.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn updates_changed_templates_in_place() {
    let h = Harness::new();
    h.scheduler
        .reconcile(descriptions(json!([nightly("backup", "0 2 * * *")])))
        .await
        .unwrap();
    let before = h.scheduler.list().await.unwrap().remove(0);

    let report = h
        .scheduler
        .reconcile(descriptions(json!([nightly("backup", "0 3 * * *")])))
        .await
        .unwrap();
    assert_eq!(report.updated, vec!["backup"]);

    let after = h.scheduler.show(&before.id).await.unwrap();
    assert_eq!(after.cron, "0 3 * * *");
    assert_eq!(after.version, before.version + 1);
    assert_eq!(after.created_at, before.created_at);
}

#[tokio::test]
async fn attributes_dropped_from_a_description_return_to_defaults() {
    let h = Harness::new();
    let mut paused = nightly("backup", "0 2 * * *");
    paused["enabled"] = json!(false);
    paused["default_step_time"] = json!(45);
    h.scheduler.reconcile(descriptions(json!([paused]))).await.unwrap();

    let report = h
        .scheduler
        .reconcile(descriptions(json!([nightly("backup", "0 2 * * *")])))
        .await
        .unwrap();
    assert_eq!(report.updated, vec!["backup"]);

    let t = h.scheduler.list().await.unwrap().remove(0);
    assert!(t.enabled);
    assert_eq!(t.default_step_time, 30);
}

#[tokio::test]
async fn deletes_templates_no_longer_described() {
    let h = Harness::new();
    h.scheduler
        .reconcile(descriptions(json!([
            nightly("backup", "0 2 * * *"),
            nightly("report", "@daily"),
        ])))
        .await
        .unwrap();
    // created by hand, without a name
    h.scheduler
        .create(template_input(json!({ "cron": "@hourly", "credentials": CREDENTIALS })))
        .await
        .unwrap();

    let report = h
        .scheduler
        .reconcile(descriptions(json!([nightly("report", "@daily")])))
        .await
        .unwrap();

    assert_eq!(report.deleted.len(), 2);
    assert!(report.deleted.contains(&"backup".to_string()));
    assert_eq!(report.unchanged, vec!["report"]);

    let names: Vec<_> = h
        .scheduler
        .list()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["report"]);
}

#[tokio::test]
async fn rejects_duplicate_or_missing_names_before_touching_anything() {
    let h = Harness::new();
    h.scheduler
        .reconcile(descriptions(json!([nightly("backup", "0 2 * * *")])))
        .await
        .unwrap();

    let err = h
        .scheduler
        .reconcile(descriptions(json!([
            nightly("dup", "@daily"),
            nightly("dup", "@hourly"),
            { "cron": "@daily", "credentials": CREDENTIALS },
        ])))
        .await
        .unwrap_err();

    let JobflowError::Validation(fields) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(fields.get("name").map(|m| m.len()), Some(2));

    let remaining = h.scheduler.list().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name.as_deref(), Some("backup"));
}

#[tokio::test]
async fn an_empty_list_removes_everything() {
    let h = Harness::new();
    h.scheduler
        .reconcile(descriptions(json!([nightly("backup", "0 2 * * *")])))
        .await
        .unwrap();

    let report = h.scheduler.reconcile(Vec::new()).await.unwrap();
    assert_eq!(report.deleted, vec!["backup"]);
    assert!(h.scheduler.list().await.unwrap().is_empty());
}

#[test]
fn descriptions_load_from_a_json_file() {
    let dir = std::env::temp_dir().join(format!("jobflow-cron-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("cron.json");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{}", json!([nightly("backup", "0 2 * * *")])).unwrap();

    let loaded = load_descriptions(&path).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name.as_deref(), Some("backup"));

    let missing = load_descriptions(dir.join("nope.json")).unwrap_err();
    assert!(missing.to_string().contains("reading cron file"));

    std::fs::remove_dir_all(&dir).unwrap();
}
