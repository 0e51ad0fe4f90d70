use super::{exit_codes, slot, Ctx};
use crate::cli::args::{ExportArgs, ReviewArgs};
use anyhow::Context;
use calibra_core::errors::CalibraError;
use calibra_core::merge::parse_preferences;
use calibra_core::review::ReviewWorkflow;

pub fn cmd_review(ctx: &Ctx, args: ReviewArgs) -> anyhow::Result<i32> {
    let wf = ReviewWorkflow::new(ctx.store.clone());

    let receipt = if !args.prefer.is_empty() {
        let prefs = parse_preferences(args.prefer.iter().map(String::as_str))
            .map_err(|e| CalibraError::InvalidConfiguration(e.to_string()))?;
        wf.review_merged(
            args.comparison,
            args.document,
            &prefs,
            slot(args.default),
            args.notes,
        )?
    } else {
        let golden = match &args.golden {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let v: serde_json::Value = serde_json::from_str(&raw)
                    .with_context(|| format!("{} is not valid JSON", path.display()))?;
                Some(v)
            }
            None => None,
        };
        wf.review(
            args.comparison,
            args.document,
            args.choose.map(slot),
            golden,
            args.notes,
        )?
    };

    eprintln!(
        "✅ document {} {} ({}/{} reviewed)",
        receipt.document_id,
        receipt.decision.review_status.as_str(),
        receipt.reviewed_count,
        receipt.total_reviewable
    );
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(exit_codes::OK)
}

pub fn cmd_export(ctx: &Ctx, args: ExportArgs) -> anyhow::Result<i32> {
    let wf = ReviewWorkflow::new(ctx.store.clone());
    let ds = wf.export_dataset(args.comparison, &args.name, &args.description)?;
    eprintln!(
        "✅ Exported {} cases to dataset #{} ({})",
        ds.case_count, ds.id, ds.name
    );
    println!("{}", serde_json::to_string_pretty(&ds)?);
    Ok(exit_codes::OK)
}
