//! In-memory integration tests for the task lifecycle.

use mockito::Matcher;
use serde_json::json;
use taskrelay::relay::InboundRequest;
use taskrelay::task::{
    domain::{ExternalTaskId, Platform, TaskErrorKind},
    ports::TaskQuery,
};

use super::helpers::{Gateway, STARTING_BALANCE, USER, prices};

#[tokio::test(flavor = "multi_thread")]
async fn pass_through_task_failure_is_refunded_and_visible() -> Result<(), eyre::Report> {
    let mut gateway = Gateway::start(prices(&[("alpha/submit", 0.1)])).await?;
    let _submit = gateway
        .server
        .mock("POST", "/alpha/submit")
        .match_header("x-client-token", "tk-integration")
        .match_body(Matcher::Json(json!({"prompt": "render"})))
        .with_status(200)
        .with_body(json!({"code": 0, "msg": "", "data": {"task_id": "job-1"}}).to_string())
        .create_async()
        .await;
    let poll = gateway
        .server
        .mock("POST", "/alpha/task/list-by-condition")
        .match_header("x-client-token", "tk-integration")
        .match_body(Matcher::Json(json!({"task_ids": ["job-1"]})))
        .with_status(200)
        .with_body(
            json!({
                "code": 0,
                "msg": "",
                "data": [{"task_id": "job-1", "status": "failed", "error": "gpu lost"}]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let receipt = gateway
        .submitter
        .submit(
            gateway.context(Platform::CustomPass, "alpha/submit", "submit"),
            InboundRequest::post_json(&json!({"prompt": "render"})),
        )
        .await
        .map_err(|err| eyre::eyre!("submission rejected: {err}"))?;
    eyre::ensure!(receipt.task_quota == 50_000, "unexpected quota {}", receipt.task_quota);
    eyre::ensure!(gateway.balance()? == STARTING_BALANCE - 50_000, "charge not posted");

    let report = gateway.reconciler.run_cycle().await?;
    poll.assert_async().await;
    eyre::ensure!(report.refunds == 1, "expected one refund, got {report:?}");
    eyre::ensure!(gateway.balance()? == STARTING_BALANCE, "refund not paid");

    let view = gateway
        .queries
        .fetch_by_id(USER, &ExternalTaskId::new("job-1"))
        .await
        .map_err(|err| eyre::eyre!("lookup failed: {err}"))?;
    eyre::ensure!(view.status == "FAILURE", "unexpected status {}", view.status);
    eyre::ensure!(view.fail_reason == "gpu lost", "unexpected reason {}", view.fail_reason);
    eyre::ensure!(view.progress == "100%", "unexpected progress {}", view.progress);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn kling_task_success_appears_in_listings() -> Result<(), eyre::Report> {
    let mut gateway = Gateway::start(prices(&[("kling-v1", 0.04)])).await?;
    let _submit = gateway
        .server
        .mock("POST", "/v1/videos/text2video")
        .match_header("authorization", "Bearer sk-integration")
        .with_status(200)
        .with_body(
            json!({"code": 0, "message": "", "data": {"task_id": "k-9", "task_status": "submitted"}})
                .to_string(),
        )
        .create_async()
        .await;
    let _poll = gateway
        .server
        .mock("GET", "/v1/videos/text2video/k-9")
        .with_status(200)
        .with_body(
            json!({
                "code": 0,
                "message": "",
                "data": {
                    "task_id": "k-9",
                    "task_status": "succeed",
                    "created_at": 1_700_000_000_000_i64,
                    "updated_at": 1_700_000_120_000_i64
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    gateway
        .submitter
        .submit(
            gateway.context(Platform::Kling, "", ""),
            InboundRequest::post_json(&json!({"prompt": "a red kite"})),
        )
        .await
        .map_err(|err| eyre::eyre!("submission rejected: {err}"))?;
    gateway.reconciler.run_cycle().await?;

    let page = gateway
        .queries
        .list_for_user(USER, 1, 0, &TaskQuery::default())
        .await?;
    let task = page
        .items
        .first()
        .ok_or_else(|| eyre::eyre!("task missing from listing"))?;
    eyre::ensure!(page.total == 1, "expected one task, found {}", page.total);
    eyre::ensure!(task.external_id().as_str() == "k-9", "unexpected task listed");
    eyre::ensure!(task.action() == "textGenerate", "unexpected action {}", task.action());
    eyre::ensure!(task.finish_time() == 1_700_000_120, "finish time not converted");
    eyre::ensure!(gateway.balance()? == STARTING_BALANCE - 20_000, "charge not posted");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn suno_progress_is_tracked_across_cycles() -> Result<(), eyre::Report> {
    let mut gateway = Gateway::start(prices(&[("suno_music", 0.2)])).await?;
    let _submit = gateway
        .server
        .mock("POST", "/suno/submit/music")
        .with_status(200)
        .with_body(json!({"code": "success", "message": "", "data": "s-7"}).to_string())
        .create_async()
        .await;
    let running = gateway
        .server
        .mock("POST", "/suno/fetch")
        .with_status(200)
        .with_body(
            json!({
                "code": "success",
                "message": "",
                "data": [{"task_id": "s-7", "status": "IN_PROGRESS", "progress": "40%"}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    gateway
        .submitter
        .submit(
            gateway.context(Platform::Suno, "", "music"),
            InboundRequest::post_json(&json!({"gpt_description_prompt": "sea shanty"})),
        )
        .await
        .map_err(|err| eyre::eyre!("submission rejected: {err}"))?;
    gateway.reconciler.run_cycle().await?;
    let halfway = gateway
        .queries
        .fetch_by_id(USER, &ExternalTaskId::new("s-7"))
        .await
        .map_err(|err| eyre::eyre!("lookup failed: {err}"))?;
    eyre::ensure!(halfway.status == "IN_PROGRESS", "unexpected status {}", halfway.status);
    eyre::ensure!(halfway.progress == "40%", "unexpected progress {}", halfway.progress);

    drop(running);
    let _done = gateway
        .server
        .mock("POST", "/suno/fetch")
        .with_status(200)
        .with_body(
            json!({
                "code": "success",
                "message": "",
                "data": [{"task_id": "s-7", "status": "SUCCESS", "data": [{"audio_url": "https://cdn.example/s-7.mp3"}]}]
            })
            .to_string(),
        )
        .create_async()
        .await;
    gateway.reconciler.run_cycle().await?;

    let finished = gateway
        .queries
        .fetch_by_id(USER, &ExternalTaskId::new("s-7"))
        .await
        .map_err(|err| eyre::eyre!("lookup failed: {err}"))?;
    eyre::ensure!(finished.status == "SUCCESS", "unexpected status {}", finished.status);
    eyre::ensure!(finished.progress == "100%", "unexpected progress {}", finished.progress);
    eyre::ensure!(
        finished.data == json!([{"audio_url": "https://cdn.example/s-7.mp3"}]),
        "result payload not stored"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_tasks_are_reported_missing() -> Result<(), eyre::Report> {
    let gateway = Gateway::start(prices(&[])).await?;

    let result = gateway
        .queries
        .fetch_by_id(USER, &ExternalTaskId::new("ghost"))
        .await;

    match result {
        Err(err) if err.kind() == TaskErrorKind::TaskNotExist => Ok(()),
        other => Err(eyre::eyre!("expected task_not_exist, got {other:?}")),
    }
}
