use super::{exit_codes, Ctx};
use crate::cli::args::{CompareArgs, ModeArg, TypeArg};
use calibra_core::engine::{CancelHandle, RunOrchestrator};
use calibra_core::errors::CalibraError;
use calibra_core::events::ComparisonEvent;
use calibra_core::model::{
    ArticleFilters, ComparisonMode, ComparisonRequest, ComparisonStatus, ComparisonType,
    ModelConfig, TrialStatus,
};
use calibra_core::providers::build_router;
use calibra_core::report::{console, json};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

fn parse_config(flag: &str, value: &str) -> anyhow::Result<ModelConfig> {
    ModelConfig::parse(value).ok_or_else(|| {
        CalibraError::InvalidConfiguration(format!(
            "{} must look like provider/model, got '{}'",
            flag, value
        ))
        .into()
    })
}

pub async fn cmd_compare(ctx: &Ctx, args: CompareArgs) -> anyhow::Result<i32> {
    let scorer = calibra_metrics::scorer_by_name(&args.scorer).ok_or_else(|| {
        CalibraError::InvalidConfiguration(format!("unknown scorer '{}'", args.scorer))
    })?;

    let (mode, count) = match args.mode {
        ModeArg::Dataset => (ComparisonMode::Dataset, args.iterations),
        ModeArg::Calibration => (ComparisonMode::Calibration, args.count),
    };
    let req = ComparisonRequest {
        mode,
        kind: match args.kind {
            TypeArg::Schema => ComparisonType::Schema,
            TypeArg::Pipeline => ComparisonType::Pipeline,
        },
        config_a: parse_config("--config-a", &args.config_a)?,
        config_b: parse_config("--config-b", &args.config_b)?,
        dataset_id: args.dataset,
        filters: ArticleFilters {
            source: args.source.clone(),
            category: args.category.clone(),
        },
        count,
    };

    let orch = RunOrchestrator::new(
        ctx.store.clone(),
        Arc::new(build_router(&ctx.cfg)?),
        scorer,
        ctx.cfg.registry(),
        ctx.cfg.run_settings(),
    );
    let comparison = orch.create(&req)?;
    eprintln!(
        "Comparison #{}: {} vs {} ({} trials)",
        comparison.id, comparison.config_a, comparison.config_b, comparison.total_iterations
    );

    let printer = (!args.quiet).then(|| tokio::spawn(print_progress(orch.events.subscribe())));

    let cancel = CancelHandle::new();
    let on_ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!(
                    event = "calibra.compare.cancel_requested",
                    "stopping after in-flight trials"
                );
                cancel.cancel();
            }
        })
    };

    let done = orch.execute(comparison.id, &cancel).await;
    on_ctrl_c.abort();
    if let Some(p) = printer {
        if done.is_ok() {
            let _ = p.await;
        } else {
            p.abort();
        }
    }
    let done = done?;

    console::print_summary(&done);

    if let Some(out) = &args.out {
        let trials = ctx.store.list_trials(done.id)?;
        let articles = ctx.store.list_articles(done.id)?;
        json::write_json(
            &json::ComparisonReport {
                comparison: &done,
                trials: &trials,
                articles: &articles,
            },
            out,
        )?;
        eprintln!("wrote file: {}", out.display());
    }

    println!(
        "{}",
        serde_json::json!({
            "comparison_id": done.id,
            "status": done.status,
            "progress": done.progress,
            "total_iterations": done.total_iterations,
        })
    );

    Ok(match done.status {
        ComparisonStatus::Completed => exit_codes::OK,
        _ => exit_codes::TEST_FAILED,
    })
}

async fn print_progress(mut rx: tokio::sync::broadcast::Receiver<ComparisonEvent>) {
    let mut last_trial = String::new();
    loop {
        match rx.recv().await {
            Ok(ComparisonEvent::TrialRecorded {
                config,
                trial_ref,
                status,
                error,
                ..
            }) => {
                last_trial = match status {
                    TrialStatus::Completed => format!("✅ {} {}", config, trial_ref.key()),
                    TrialStatus::Failed => format!(
                        "❌ {} {} {}",
                        config,
                        trial_ref.key(),
                        error.unwrap_or_default()
                    ),
                };
            }
            Ok(ComparisonEvent::Progress {
                progress, total, ..
            }) => {
                eprintln!("  [{}/{}] {}", progress, total, last_trial);
            }
            Ok(ComparisonEvent::StatusChanged { status, .. }) => {
                eprintln!("  status: {}", status);
            }
            Ok(ComparisonEvent::Finished { .. }) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(n)) => {
                eprintln!("  ({} progress events skipped)", n);
            }
        }
    }
}
