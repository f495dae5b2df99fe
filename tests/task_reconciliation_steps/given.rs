//! Given steps for task reconciliation BDD scenarios.

use eyre::WrapErr;
use mockable::DefaultClock;
use rstest_bdd_macros::given;
use serde_json::{Value, json};
use taskrelay::task::domain::{
    ExternalTaskId, NewTask, Platform, Task, TaskPayload, TaskProperties, TokenId,
};
use taskrelay::task::ports::TaskStore;

use super::world::{CHANNEL, ReconciliationWorld, USER, run_async};

fn store_task(
    world: &ReconciliationWorld,
    platform: Platform,
    external_id: &str,
    model: &str,
    quota: i64,
) -> Result<Task, eyre::Report> {
    let mut task = Task::new(
        NewTask {
            platform,
            action: "submit".to_owned(),
            user_id: USER,
            channel_id: CHANNEL,
            token_id: TokenId::new(11),
            token_key: "tk-client".to_owned(),
            external_id: ExternalTaskId::new(external_id),
            quota,
            data: TaskPayload::new(Value::Null),
            properties: TaskProperties {
                model: model.to_owned(),
                input: String::new(),
            },
        },
        &DefaultClock,
    );
    let id = run_async(world.store.insert(&task)).wrap_err("insert scenario task")?;
    task.assign_id(id);
    Ok(task)
}

fn report_status(world: &mut ReconciliationWorld, item: &Value) {
    let body = json!({"code": 0, "msg": "", "data": [item]}).to_string();
    let mock = run_async(
        world
            .server
            .mock("POST", "/alpha/task/list-by-condition")
            .with_status(200)
            .with_body(body)
            .create_async(),
    );
    world.mocks.push(mock);
}

#[given("a user with a balance of {balance:i64}")]
fn user_with_balance(world: &mut ReconciliationWorld, balance: i64) -> Result<(), eyre::Report> {
    world
        .ledger
        .set_balance(USER, balance)
        .wrap_err("set scenario balance")
}

#[given(r#"a pass-through task "{task_id}" for model "{model}" charged {quota:i64}"#)]
fn pass_through_task(
    world: &mut ReconciliationWorld,
    task_id: String,
    model: String,
    quota: i64,
) -> Result<(), eyre::Report> {
    store_task(world, Platform::CustomPass, &task_id, &model, quota)?;
    Ok(())
}

#[given("a Suno task without an upstream id charged {quota:i64}")]
fn orphaned_suno_task(world: &mut ReconciliationWorld, quota: i64) -> Result<(), eyre::Report> {
    let task = store_task(world, Platform::Suno, "", "", quota)?;
    world.orphan = Some(task.id());
    Ok(())
}

#[given(r#"the upstream reports task "{task_id}" as "{status}""#)]
fn upstream_reports(world: &mut ReconciliationWorld, task_id: String, status: String) {
    report_status(world, &json!({"task_id": task_id, "status": status}));
}

#[given(r#"the upstream fails task "{task_id}" with status "{status}" and error "{error}""#)]
fn upstream_reports_error(
    world: &mut ReconciliationWorld,
    task_id: String,
    status: String,
    error: String,
) {
    report_status(
        world,
        &json!({"task_id": task_id, "status": status, "error": error}),
    );
}

#[given(r#"the Suno upstream accepts music submissions as "{task_id}""#)]
fn suno_accepts(world: &mut ReconciliationWorld, task_id: String) {
    let body = json!({"code": "success", "message": "", "data": task_id}).to_string();
    let mock = run_async(
        world
            .server
            .mock("POST", "/suno/submit/music")
            .with_status(200)
            .with_body(body)
            .create_async(),
    );
    world.mocks.push(mock);
}
