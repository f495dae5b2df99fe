//! In-memory integration tests for charges, refunds and usage counters.

use rstest::rstest;
use serde_json::json;
use taskrelay::relay::InboundRequest;
use taskrelay::task::{domain::Platform, ports::TaskQuery};

use super::helpers::{CHANNEL, Gateway, STARTING_BALANCE, TOKEN, USER, prices};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn accepted_submissions_update_every_counter() -> Result<(), eyre::Report> {
    let mut gateway = Gateway::start(prices(&[("suno_music", 0.2)])).await?;
    let _submit = gateway
        .server
        .mock("POST", "/suno/submit/music")
        .with_status(200)
        .with_body(json!({"code": "success", "message": "", "data": "s-1"}).to_string())
        .create_async()
        .await;

    gateway
        .submitter
        .submit(
            gateway.context(Platform::Suno, "", "music"),
            InboundRequest::post_json(&json!({"prompt": "lofi beats"})),
        )
        .await
        .map_err(|err| eyre::eyre!("submission rejected: {err}"))?;

    let usage = gateway.ledger.user_usage(USER)?;
    eyre::ensure!(usage.used_quota == 100_000, "user usage {}", usage.used_quota);
    eyre::ensure!(usage.request_count == 1, "request count {}", usage.request_count);
    eyre::ensure!(gateway.ledger.channel_usage(CHANNEL)? == 100_000, "channel usage");
    eyre::ensure!(gateway.ledger.token_usage(TOKEN)? == 100_000, "token usage");
    let charges = gateway.ledger.posted_charges()?;
    let charge = charges
        .first()
        .ok_or_else(|| eyre::eyre!("no charge posted"))?;
    eyre::ensure!(charge.amount == 100_000, "charged {}", charge.amount);
    eyre::ensure!(charge.pre_charged == 100_000, "pre-charged {}", charge.pre_charged);
    let logs = gateway.ledger.consume_logs()?;
    let log = logs
        .first()
        .ok_or_else(|| eyre::eyre!("no consume log"))?;
    eyre::ensure!(log.model_name == "suno_music", "logged model {}", log.model_name);
    eyre::ensure!(log.balance_before == STARTING_BALANCE, "balance before {}", log.balance_before);
    Ok(())
}

#[rstest]
#[case::server_error(500)]
#[case::unavailable(503)]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_submissions_charge_nothing(#[case] status: usize) -> Result<(), eyre::Report> {
    let mut gateway = Gateway::start(prices(&[("suno_music", 0.2)])).await?;
    let _submit = gateway
        .server
        .mock("POST", "/suno/submit/music")
        .with_status(status)
        .with_body("upstream trouble")
        .create_async()
        .await;

    let result = gateway
        .submitter
        .submit(
            gateway.context(Platform::Suno, "", "music"),
            InboundRequest::post_json(&json!({"prompt": "lofi beats"})),
        )
        .await;

    let err = match result {
        Err(err) => err,
        Ok(receipt) => return Err(eyre::eyre!("submission accepted: {receipt:?}")),
    };
    eyre::ensure!(
        usize::from(err.status_code()) == status,
        "status {}",
        err.status_code()
    );
    eyre::ensure!(gateway.balance()? == STARTING_BALANCE, "balance changed");
    eyre::ensure!(gateway.ledger.posted_charges()?.is_empty(), "charge posted");
    let stored = gateway.queries.list_all(1, 10, &TaskQuery::default()).await?;
    eyre::ensure!(stored.total == 0, "task stored for a rejected submission");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn kling_failures_are_refunded_once() -> Result<(), eyre::Report> {
    let mut gateway = Gateway::start(prices(&[("kling-v1", 0.04)])).await?;
    let _submit = gateway
        .server
        .mock("POST", "/v1/videos/text2video")
        .with_status(200)
        .with_body(json!({"code": 0, "message": "", "data": {"task_id": "k-1"}}).to_string())
        .create_async()
        .await;
    let poll = gateway
        .server
        .mock("GET", "/v1/videos/text2video/k-1")
        .with_status(200)
        .with_body(
            json!({
                "code": 0,
                "message": "",
                "data": {"task_id": "k-1", "task_status": "failed", "task_status_msg": "nsfw"}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    gateway
        .submitter
        .submit(
            gateway.context(Platform::Kling, "", ""),
            InboundRequest::post_json(&json!({"prompt": "storm"})),
        )
        .await
        .map_err(|err| eyre::eyre!("submission rejected: {err}"))?;
    let first = gateway.reconciler.run_cycle().await?;
    let second = gateway.reconciler.run_cycle().await?;

    poll.assert_async().await;
    eyre::ensure!(first.refunds == 1, "first cycle {first:?}");
    eyre::ensure!(second.loaded == 0, "second cycle {second:?}");
    eyre::ensure!(gateway.balance()? == STARTING_BALANCE, "refund not paid");
    let refunds = gateway.ledger.system_logs()?;
    eyre::ensure!(
        refunds == vec![(USER, "async task failed k-1, refund 20000".to_owned())],
        "unexpected refund logs {refunds:?}"
    );
    Ok(())
}
