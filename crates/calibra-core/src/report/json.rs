use crate::model::{CalibrationArticle, Comparison, TrialRecord};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
pub struct ComparisonReport<'a> {
    pub comparison: &'a Comparison,
    pub trials: &'a [TrialRecord],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub articles: &'a [CalibrationArticle],
}

pub fn write_json(report: &ComparisonReport<'_>, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(out, serde_json::to_string_pretty(report)?)?;
    Ok(())
}
