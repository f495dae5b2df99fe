//! When steps for task reconciliation BDD scenarios.

use eyre::WrapErr;
use rstest_bdd_macros::when;
use serde_json::json;
use taskrelay::relay::InboundRequest;
use taskrelay::task::domain::Platform;

use super::world::{ReconciliationWorld, run_async};

#[when("a reconciliation cycle runs")]
fn reconciliation_cycle(world: &mut ReconciliationWorld) -> Result<(), eyre::Report> {
    run_async(world.reconciler.run_cycle()).wrap_err("run reconciliation cycle")?;
    Ok(())
}

#[when(r#"the user submits the Suno music prompt "{prompt}""#)]
fn submit_suno_prompt(world: &mut ReconciliationWorld, prompt: String) -> Result<(), eyre::Report> {
    let context = world.context(Platform::Suno, "", "music");
    let request = InboundRequest::post_json(&json!({"prompt": prompt}));
    run_async(world.submitter().submit(context, request))
        .map_err(|err| eyre::eyre!("submission rejected: {err}"))?;
    Ok(())
}
