//! Inspect and flush the local pending-action queue.
//!
//! Usage: `crinz-sync [status|pending|flush|clear]`

use std::sync::Arc;

use anyhow::Context;
use crinz_core::UserId;
use crinz_sync::{
    Credentials, FlushOutcome, SessionCredentials, SyncConfig, SyncEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crinz_observability::init_pretty();

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());

    let config = SyncConfig::from_env().context("invalid CRINZ_* configuration")?;
    let credentials = Arc::new(session_from_env()?);

    let engine = SyncEngine::builder(config, credentials)
        .without_worker()
        .init()
        .await?;

    let result = run(&engine, &command).await;
    engine.dispose().await;
    result
}

async fn run(engine: &SyncEngine, command: &str) -> anyhow::Result<()> {
    match command {
        "status" => {
            let state = engine.state();
            println!("status:  {}", state.status);
            println!("pending: {}", state.pending_count);
        }
        "pending" => {
            let actions = engine.pending_actions();
            println!("{}", serde_json::to_string_pretty(&actions)?);
        }
        "flush" => match engine.sync_now().await? {
            FlushOutcome::Flushed(report) => println!(
                "flushed {} actions ({} profile, {} content)",
                report.total(),
                report.profile_actions,
                report.content_actions
            ),
            FlushOutcome::Skipped(reason) => println!("nothing flushed: {reason:?}"),
        },
        "clear" => {
            let removed = engine.clear_queue().await?;
            println!("discarded {removed} pending actions");
        }
        other => anyhow::bail!("unknown command {other:?}; expected status, pending, flush or clear"),
    }
    Ok(())
}

/// `CRINZ_USER_ID` and `CRINZ_AUTH_TOKEN`; either missing means signed out.
fn session_from_env() -> anyhow::Result<SessionCredentials> {
    let (Ok(user), Ok(token)) = (std::env::var("CRINZ_USER_ID"), std::env::var("CRINZ_AUTH_TOKEN")) else {
        tracing::warn!("CRINZ_USER_ID or CRINZ_AUTH_TOKEN not set; flushing will fail");
        return Ok(SessionCredentials::new());
    };
    let user_id = UserId::parse(user).context("CRINZ_USER_ID")?;
    Ok(SessionCredentials::signed_in(Credentials::new(user_id, token)))
}
