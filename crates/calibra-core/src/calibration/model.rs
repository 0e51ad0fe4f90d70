use crate::model::ConfigSlot;
use serde::{Deserialize, Serialize};

/// Population statistics over one metric.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Stat {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigSummary {
    /// completed trials
    pub samples: u32,
    /// all trials, completed or failed
    pub trials: u32,
    pub precision: Stat,
    pub recall: Stat,
    pub f1: Stat,
    pub duration_ms: Stat,
    pub pass_rate: f64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonSummary {
    pub config_a: ConfigSummary,
    pub config_b: ConfigSummary,
    pub winner: ConfigSlot,
    pub f1_delta: f64,
    pub statistically_significant: bool,
    pub generated_at: String,
}

impl ComparisonSummary {
    pub fn config(&self, slot: ConfigSlot) -> &ConfigSummary {
        match slot {
            ConfigSlot::A => &self.config_a,
            ConfigSlot::B => &self.config_b,
        }
    }
}

/// Either a populated summary or an explicit reason why none can be computed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SummaryOutcome {
    Summary(ComparisonSummary),
    NoSummary { reason: String },
}

impl SummaryOutcome {
    pub fn into_summary(self) -> Option<ComparisonSummary> {
        match self {
            SummaryOutcome::Summary(s) => Some(s),
            SummaryOutcome::NoSummary { .. } => None,
        }
    }
}
