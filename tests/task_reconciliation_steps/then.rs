//! Then steps for task reconciliation BDD scenarios.

use rstest_bdd_macros::then;
use taskrelay::task::domain::TaskStatus;

use super::world::{ReconciliationWorld, USER};

fn expected_status(raw: &str) -> Result<TaskStatus, eyre::Report> {
    TaskStatus::try_from(raw).map_err(|err| eyre::eyre!("invalid expected status: {err}"))
}

#[then(r#"the task "{task_id}" has status "{status}""#)]
fn task_has_status(
    world: &ReconciliationWorld,
    task_id: String,
    status: String,
) -> Result<(), eyre::Report> {
    let expected = expected_status(&status)?;
    let task = world.task(&task_id)?;
    if task.status() != expected {
        return Err(eyre::eyre!(
            "expected status {}, found {}",
            expected.as_str(),
            task.status().as_str()
        ));
    }
    Ok(())
}

#[then(r#"the task "{task_id}" has progress "{progress}""#)]
fn task_has_progress(
    world: &ReconciliationWorld,
    task_id: String,
    progress: String,
) -> Result<(), eyre::Report> {
    let task = world.task(&task_id)?;
    if task.progress() != progress {
        return Err(eyre::eyre!(
            "expected progress {progress}, found {}",
            task.progress()
        ));
    }
    Ok(())
}

#[then(r#"the task "{task_id}" failed with reason "{reason}""#)]
fn task_failed_with_reason(
    world: &ReconciliationWorld,
    task_id: String,
    reason: String,
) -> Result<(), eyre::Report> {
    let task = world.task(&task_id)?;
    if task.fail_reason() != reason {
        return Err(eyre::eyre!(
            "expected fail reason {reason}, found {}",
            task.fail_reason()
        ));
    }
    Ok(())
}

#[then(r#"the orphaned task has status "{status}""#)]
fn orphan_has_status(world: &ReconciliationWorld, status: String) -> Result<(), eyre::Report> {
    let expected = expected_status(&status)?;
    let id = world
        .orphan
        .ok_or_else(|| eyre::eyre!("missing orphaned task in scenario world"))?;
    let task = world
        .store
        .snapshot(id)?
        .ok_or_else(|| eyre::eyre!("orphaned task not stored"))?;
    if task.status() != expected {
        return Err(eyre::eyre!(
            "expected status {}, found {}",
            expected.as_str(),
            task.status().as_str()
        ));
    }
    Ok(())
}

#[then("the user balance is {balance:i64}")]
fn user_balance_is(world: &ReconciliationWorld, balance: i64) -> Result<(), eyre::Report> {
    let actual = world.ledger.balance_of(USER)?.unwrap_or_default();
    if actual != balance {
        return Err(eyre::eyre!("expected balance {balance}, found {actual}"));
    }
    Ok(())
}

#[then("{count:usize} refund logs were recorded")]
fn refund_logs_recorded(world: &ReconciliationWorld, count: usize) -> Result<(), eyre::Report> {
    let logs = world.ledger.system_logs()?;
    if logs.len() != count {
        return Err(eyre::eyre!(
            "expected {count} refund logs, found {}: {logs:?}",
            logs.len()
        ));
    }
    Ok(())
}
