//! Row conversion of the `PostgreSQL` store.

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::support::{SeedTask, USER};
use crate::task::adapters::postgres::{TaskRow, decode_batch, new_row, row_to_task};
use crate::task::domain::{Platform, TaskStatus};
use crate::task::ports::TaskStoreError;

#[fixture]
fn row() -> TaskRow {
    TaskRow {
        id: 42,
        task_id: "job-1".to_owned(),
        platform: "custompass".to_owned(),
        action: "submit".to_owned(),
        user_id: USER.value(),
        channel_id: 3,
        token_id: 11,
        token_key: "tk-client".to_owned(),
        status: "IN_PROGRESS".to_owned(),
        progress: "30%".to_owned(),
        submit_time: 1_700_000_000,
        start_time: 1_700_000_005,
        finish_time: 0,
        fail_reason: String::new(),
        quota: 50_000,
        data: json!({"clips": []}),
        properties: json!({"model": "alpha/submit", "input": ""}),
    }
}

#[rstest]
fn rows_rebuild_tasks(row: TaskRow) {
    let task = row_to_task(row).expect("row converts");

    assert_eq!(task.id().value(), 42);
    assert_eq!(task.platform(), Platform::CustomPass);
    assert_eq!(task.status(), TaskStatus::InProgress);
    assert_eq!(task.properties().model, "alpha/submit");
    assert_eq!(task.quota(), 50_000);
    assert_eq!(task.data().as_value(), &json!({"clips": []}));
}

#[rstest]
fn null_properties_default_to_empty(mut row: TaskRow) {
    row.properties = Value::Null;

    let task = row_to_task(row).expect("row converts");

    assert!(task.properties().model.is_empty());
}

#[rstest]
#[case::platform("platform")]
#[case::status("status")]
fn unknown_codes_are_persistence_errors(mut row: TaskRow, #[case] column: &str) {
    if column == "platform" {
        "dalle".clone_into(&mut row.platform);
    } else {
        "DONE".clone_into(&mut row.status);
    }

    let result = row_to_task(row);

    assert!(matches!(result, Err(TaskStoreError::Persistence(_))));
}

#[rstest]
fn new_rows_use_storage_codes() {
    let task = SeedTask::new(Platform::Kling, "k-1")
        .status(TaskStatus::Queued)
        .model("kling-v1")
        .build();

    let inserted = new_row(&task).expect("row builds");

    assert_eq!(inserted.platform, "kling");
    assert_eq!(inserted.status, "QUEUED");
    assert_eq!(inserted.task_id, "k-1");
    assert_eq!(inserted.progress, "0%");
    assert_eq!(
        inserted.properties.get("model"),
        Some(&json!("kling-v1"))
    );
}

#[rstest]
fn batches_skip_rows_that_no_longer_decode(row: TaskRow) {
    let mut legacy = row.clone();
    legacy.id = 43;
    "legacy".clone_into(&mut legacy.platform);
    let mut garbled = row.clone();
    garbled.id = 44;
    "DONE".clone_into(&mut garbled.status);
    let mut later = row;
    later.id = 45;

    let tasks = decode_batch(vec![legacy, garbled, later]);

    let ids: Vec<i64> = tasks.iter().map(|task| task.id().value()).collect();
    assert_eq!(ids, vec![45]);
}
