use super::{exit_codes, Ctx};
use crate::cli::args::{DiffArgs, TrialsArgs, WatchArgs};
use calibra_core::diff::{diff_documents, DiffOptions, DiffSummary};
use calibra_core::errors::CalibraError;
use calibra_core::model::{Comparison, ComparisonMode, ComparisonStatus, ConfigSlot};
use calibra_core::report::console;
use serde_json::Value;
use std::time::Duration;

fn comparison(ctx: &Ctx, id: i64) -> anyhow::Result<Comparison> {
    Ok(ctx
        .store
        .get_comparison(id)?
        .ok_or_else(|| CalibraError::NotFound(format!("comparison {}", id)))?)
}

pub fn cmd_list(ctx: &Ctx) -> anyhow::Result<i32> {
    for c in ctx.store.list_comparisons()? {
        println!(
            "{}\t{}\t{}\t{}/{}\t{} vs {}",
            c.id,
            c.mode.as_str(),
            c.status,
            c.progress,
            c.total_iterations,
            c.config_a,
            c.config_b
        );
    }
    Ok(exit_codes::OK)
}

pub fn cmd_status(ctx: &Ctx, id: i64) -> anyhow::Result<i32> {
    let c = comparison(ctx, id)?;
    println!("{}", serde_json::to_string_pretty(&c)?);
    Ok(exit_codes::OK)
}

/// Polling fallback for clients without the event stream.
pub async fn cmd_watch(ctx: &Ctx, args: WatchArgs) -> anyhow::Result<i32> {
    let interval = Duration::from_secs(
        args.interval
            .unwrap_or_else(|| ctx.cfg.poll_interval_seconds())
            .max(1),
    );
    let mut last_progress = None;
    loop {
        let c = comparison(ctx, args.comparison)?;
        if last_progress != Some(c.progress) {
            eprintln!(
                "  {} [{}/{}] {}",
                c.status, c.progress, c.total_iterations, c.message
            );
            last_progress = Some(c.progress);
        }
        if c.status.is_terminal() {
            console::print_summary(&c);
            return Ok(match c.status {
                ComparisonStatus::Completed => exit_codes::OK,
                _ => exit_codes::TEST_FAILED,
            });
        }
        tokio::time::sleep(interval).await;
    }
}

pub fn cmd_trials(ctx: &Ctx, args: TrialsArgs) -> anyhow::Result<i32> {
    let c = comparison(ctx, args.comparison)?;
    let json = args.format == "json";
    match c.mode {
        ComparisonMode::Dataset => {
            let trials = ctx.store.list_trials(c.id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&trials)?);
            } else {
                console::print_trials(&trials);
            }
        }
        ComparisonMode::Calibration => {
            let articles = ctx.store.list_articles(c.id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&articles)?);
            } else {
                console::print_articles(&articles);
                eprintln!(
                    "\nReviewed {}/{}",
                    c.reviewed_count, c.total_reviewable
                );
            }
        }
    }
    Ok(exit_codes::OK)
}

pub fn cmd_diff(ctx: &Ctx, args: DiffArgs) -> anyhow::Result<i32> {
    let article = ctx
        .store
        .get_article(args.comparison, args.document)?
        .ok_or_else(|| {
            CalibraError::NotFound(format!(
                "document {} in comparison {}",
                args.document, args.comparison
            ))
        })?;

    let doc = |slot: ConfigSlot| article.extraction(slot).cloned().unwrap_or(Value::Null);
    let rows = diff_documents(
        &doc(ConfigSlot::A),
        &doc(ConfigSlot::B),
        &DiffOptions {
            priority: args.priority,
            exclude: args.exclude,
        },
    );

    if args.format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "document_id": article.document_id,
                "rows": rows,
                "summary": DiffSummary::from_rows(&rows),
            }))?
        );
    } else {
        console::print_diff(&rows);
    }
    Ok(exit_codes::OK)
}
