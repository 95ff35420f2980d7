mod args;
mod edit;
mod output;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tokio_stream::StreamExt;

use vigil_apply::{
    ApplyError, ApplyOrchestrator, ApplyState, DraftReconciler, PollOptions, StrategyPreviewer,
    TokioClock,
};
use vigil_common::GpuDevice;
use vigil_repo::{ConfigRepository, HttpConfigRepository};

use crate::args::{Args, Command, EditArgs};
use crate::edit::apply_edits;
use crate::output::{
    print_config, print_gpus, print_outcome, print_preview, print_services, print_statuses,
    print_warnings,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let otel = vigil_common::telemetry::init_tracing(
        "vigil-cli",
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
    );

    tracing::debug!(api_url = %args.api_url, "using backend");
    let repo = HttpConfigRepository::new(args.api_url.as_str(), args.token.clone())?;
    let res = run(args.command, repo).await;

    vigil_common::telemetry::shutdown_tracing(otel);
    res
}

async fn run(command: Command, repo: HttpConfigRepository) -> Result<()> {
    match command {
        Command::Gpus => print_gpus(&repo.get_gpus().await?),
        Command::Services => print_services(&repo.get_services().await?),
        Command::Config => print_config(&repo.get_config().await?),
        Command::Status => {
            println!();
            print_statuses(&repo.get_service_health().await?);
            println!();
        }
        Command::Detect => {
            let gpus = repo.detect_gpus().await?;
            print_gpus(&gpus);
            let draft = DraftReconciler::new(repo.get_config().await?);
            warn_stale(&draft, &gpus);
        }
        Command::Preview { strategy } => {
            let cfg = repo.get_config().await?;
            let mut draft = DraftReconciler::new(cfg.clone());
            draft.set_strategy(strategy);
            let mut previewer = StrategyPreviewer::new(repo);
            if strategy.is_manual() {
                eprintln!("manual keeps the pinned assignments as they are");
            }
            let preview = previewer.preview(strategy, &draft).await?;
            print_preview(preview, &cfg.assignments);
        }
        Command::Save { edits } => save(repo, &edits).await?,
        Command::Apply {
            edits,
            poll_interval_ms,
            timeout_secs,
            no_fail_fast,
        } => {
            let options = PollOptions {
                interval: Duration::from_millis(poll_interval_ms.max(1)),
                timeout: Duration::from_secs(timeout_secs),
                fail_fast: !no_fail_fast,
            };
            apply(repo, &edits, options).await?;
        }
    }
    Ok(())
}

fn warn_stale(draft: &DraftReconciler, gpus: &[GpuDevice]) {
    for a in draft.stale_assignments(gpus) {
        if let Some(idx) = a.gpu_index {
            eprintln!("! {} is assigned to GPU {idx}, which was not detected", a.service);
        }
    }
}

async fn load_draft(repo: &HttpConfigRepository, edits: &EditArgs) -> Result<DraftReconciler> {
    let mut draft = DraftReconciler::new(repo.get_config().await?);
    apply_edits(&mut draft, edits)?;
    let gpus = repo.get_gpus().await?;
    warn_stale(&draft, &gpus);
    Ok(draft)
}

async fn save(repo: HttpConfigRepository, edits: &EditArgs) -> Result<()> {
    let mut draft = load_draft(&repo, edits).await?;
    if !draft.has_changes() {
        println!("No changes to save.");
        return Ok(());
    }

    let orch = ApplyOrchestrator::new(repo, TokioClock::new(), PollOptions::default());
    match orch.save(&mut draft).await {
        Ok(res) => {
            print_warnings(&res.warnings);
            println!("✓ Configuration saved (services not restarted)");
            print_config(draft.base());
            Ok(())
        }
        Err(e @ ApplyError::StaleConfig) => {
            print_config(draft.base());
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn apply(repo: HttpConfigRepository, edits: &EditArgs, options: PollOptions) -> Result<()> {
    let mut draft = load_draft(&repo, edits).await?;
    let orch = Arc::new(ApplyOrchestrator::new(repo, TokioClock::new(), options));

    let mut states = orch.state_stream();
    tokio::spawn(async move {
        while let Some(state) = states.next().await {
            match state {
                ApplyState::Saving => eprintln!("… saving configuration"),
                ApplyState::Applying => eprintln!("… restarting services"),
                ApplyState::Polling { tick } if tick > 0 => {
                    eprintln!("… waiting for services (poll {tick})")
                }
                _ => {}
            }
        }
    });

    let watcher = orch.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    match orch.apply(&mut draft).await {
        Ok(outcome) => {
            print_warnings(&outcome.report().result.warnings);
            print_outcome(&outcome);
            if !outcome.is_converged() {
                bail!("apply did not converge");
            }
            Ok(())
        }
        Err(e @ ApplyError::StaleConfig) => {
            print_config(draft.base());
            Err(e.into())
        }
        Err(ApplyError::Cancelled) => {
            eprintln!("✗ Apply cancelled");
            Ok(())
        }
        Err(e) => {
            if e.preserves_draft() {
                eprintln!("Edits were not saved.");
            }
            Err(e.into())
        }
    }
}
