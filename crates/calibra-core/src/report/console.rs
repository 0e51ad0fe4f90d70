use crate::calibration::model::ConfigSummary;
use crate::diff::{display_value, DiffStatus, DiffSummary, FieldDiff};
use crate::model::{
    CalibrationArticle, Comparison, ComparisonStatus, ConfigSlot, ReviewStatus, TrialRecord,
    TrialStatus,
};

pub fn print_summary(c: &Comparison) {
    eprintln!("\nComparison #{} ({}, {})", c.id, c.mode.as_str(), c.kind.as_str());
    eprintln!("  A: {}", c.config_a);
    eprintln!("  B: {}", c.config_b);

    let icon = match c.status {
        ComparisonStatus::Pending => "⏳",
        ComparisonStatus::Running => "🔄",
        ComparisonStatus::Completed => "✅",
        ComparisonStatus::Failed => "❌",
    };
    eprintln!(
        "{} {}  {}/{} trials  {}",
        icon, c.status, c.progress, c.total_iterations, c.message
    );
    if let Some(err) = &c.error {
        eprintln!("    Error: {}", err);
    }

    if let Some(s) = &c.summary {
        eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!(
            "{:<4} {:>8} {:>8} {:>8} {:>10} {:>8} {:>9}",
            "", "f1", "prec", "recall", "ms", "pass", "tokens"
        );
        for slot in ConfigSlot::BOTH {
            eprintln!("{}", summary_row(slot, s.config(slot)));
        }
        let significance = if s.statistically_significant {
            "significant"
        } else {
            "not significant"
        };
        eprintln!(
            "\nWinner: {} ({}) by {:.3} F1, {}",
            s.winner,
            c.config(s.winner),
            s.f1_delta,
            significance
        );
    } else if c.status == ComparisonStatus::Completed && c.total_reviewable > 0 {
        eprintln!(
            "Reviewed: {}/{} articles",
            c.reviewed_count, c.total_reviewable
        );
    }
    if let Some(ds) = c.output_dataset_id {
        eprintln!("Exported to dataset #{}", ds);
    }
}

fn summary_row(slot: ConfigSlot, s: &ConfigSummary) -> String {
    format!(
        "{:<4} {:>8} {:>8.3} {:>8.3} {:>10.0} {:>7.0}% {:>9}",
        slot.as_str(),
        format!("{:.3}±{:.2}", s.f1.mean, s.f1.std),
        s.precision.mean,
        s.recall.mean,
        s.duration_ms.mean,
        s.pass_rate * 100.0,
        s.total_tokens
    )
}

pub fn print_trials(trials: &[TrialRecord]) {
    let mut failed = 0;
    for t in trials {
        let key = t.trial_ref.key();
        match t.status {
            TrialStatus::Completed => {
                let score = t
                    .scores
                    .map(|s| format!("f1={:.2}", s.f1))
                    .unwrap_or_default();
                eprintln!(
                    "✅ {} {:<14} {:<10} ({}ms, {} tok)",
                    t.config,
                    key,
                    score,
                    t.latency_ms,
                    t.tokens_in + t.tokens_out
                );
            }
            TrialStatus::Failed => {
                failed += 1;
                eprintln!(
                    "❌ {} {:<14} {}",
                    t.config,
                    key,
                    t.error.as_deref().unwrap_or("failed")
                );
            }
        }
    }
    eprintln!("\n{} trials, {} failed", trials.len(), failed);
}

pub fn print_articles(articles: &[CalibrationArticle]) {
    for a in articles {
        let icon = match a.review.review_status {
            ReviewStatus::Pending => "⏳",
            ReviewStatus::Reviewed => "✅",
            ReviewStatus::Skipped => "⏭️ ",
        };
        let state = |slot: ConfigSlot| match a.trial(slot) {
            Some(t) if t.status == TrialStatus::Completed => "ok",
            Some(_) => "failed",
            None => "-",
        };
        let preview: String = a.input_text.chars().take(48).collect();
        eprintln!(
            "{} doc {:<6} A:{:<6} B:{:<6} {}",
            icon,
            a.document_id,
            state(ConfigSlot::A),
            state(ConfigSlot::B),
            preview.replace('\n', " ")
        );
    }
}

pub fn print_diff(rows: &[FieldDiff]) {
    eprint!("{}", format_diff(rows));
}

pub fn format_diff(rows: &[FieldDiff]) -> String {
    let mut out = String::new();
    for r in rows {
        let mark = match r.status {
            DiffStatus::Match => "=",
            DiffStatus::Mismatch => "≠",
            DiffStatus::MissingA => "<",
            DiffStatus::MissingB => ">",
            DiffStatus::BothAbsent => "·",
        };
        out.push_str(&format!(
            "{} {:<20} {:<28} {:<28}\n",
            mark,
            r.field,
            with_confidence(&r.value_a, r.confidence_a),
            with_confidence(&r.value_b, r.confidence_b)
        ));
    }
    let s = DiffSummary::from_rows(rows);
    out.push_str(&format!(
        "\n{} match, {} mismatch, {} missing in A, {} missing in B, {} absent in both\n",
        s.matches, s.mismatches, s.missing_a, s.missing_b, s.both_absent
    ));
    out
}

fn with_confidence(v: &serde_json::Value, confidence: Option<u32>) -> String {
    let mut text = display_value(v);
    if text.chars().count() > 24 {
        text = format!("{}…", text.chars().take(23).collect::<String>());
    }
    match confidence {
        Some(pct) => format!("{} ({}%)", text, pct),
        None => text,
    }
}
