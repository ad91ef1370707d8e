//! Pelagic - persisting, resumable HTTP requester
//!
//! Usage: `pelagic [resume|sign-in|sign-out]` (defaults to `resume`).

use anyhow::{bail, Context};
use pelagic_lib::utils::{init_tracing, log_resume_report};
use pelagic_lib::EngineContext;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before tracing so RUST_LOG from the file applies
    let dotenv = dotenvy::dotenv();
    init_tracing();
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => warn!(error = %err, "could not load .env file"),
    }

    let command = std::env::args().nth(1).unwrap_or_else(|| "resume".to_owned());

    let config = pelagic_infra::config::load().context("failed to load configuration")?;
    let ctx = EngineContext::new(config).await.context("failed to start engine")?;
    info!(redirect_uri = ctx.redirect_uri(), "pelagic starting");

    let outcome = run(&ctx, &command).await;
    ctx.shutdown().await.context("failed to shut down engine")?;
    outcome
}

async fn run(ctx: &EngineContext, command: &str) -> anyhow::Result<()> {
    match command {
        "resume" => {
            let report = ctx.resume().await.context("failed to read pending requests")?;
            log_resume_report(&report);
        }
        "sign-in" => {
            let actor = ctx.authenticator.authenticate().await.context("sign-in failed")?;
            match actor.as_authenticated() {
                Some(credentials) => info!(account_id = credentials.id(), "signed in"),
                None => bail!("sign-in did not produce an account"),
            }
            let report = ctx.resume().await.context("failed to read pending requests")?;
            log_resume_report(&report);
        }
        "sign-out" => {
            ctx.authenticator.logout().await.context("sign-out failed")?;
            info!("signed out");
        }
        other => bail!("unknown command `{other}`, expected resume, sign-in or sign-out"),
    }
    Ok(())
}
