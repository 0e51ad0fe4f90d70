use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigSlot {
    A,
    B,
}

impl ConfigSlot {
    pub const BOTH: [ConfigSlot; 2] = [ConfigSlot::A, ConfigSlot::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSlot::A => "A",
            ConfigSlot::B => "B",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "A" | "a" => Some(ConfigSlot::A),
            "B" | "b" => Some(ConfigSlot::B),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider/model pair under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parses `provider/model`. The model part may itself contain slashes.
    pub fn parse(s: &str) -> Option<Self> {
        let (provider, model) = s.trim().split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model))
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    Dataset,
    Calibration,
}

impl ComparisonMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonMode::Dataset => "dataset",
            ComparisonMode::Calibration => "calibration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dataset" => Some(ComparisonMode::Dataset),
            "calibration" => Some(ComparisonMode::Calibration),
            _ => None,
        }
    }
}

/// Whether the extraction is a single schema call or a multi-stage pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    #[default]
    Schema,
    Pipeline,
}

impl ComparisonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonType::Schema => "schema",
            ComparisonType::Pipeline => "pipeline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "schema" => Some(ComparisonType::Schema),
            "pipeline" => Some(ComparisonType::Pipeline),
            _ => None,
        }
    }
}

/// Comparison lifecycle. Transitions are checked through [`ComparisonStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ComparisonStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            ComparisonStatus::Pending | ComparisonStatus::Running => false,
            ComparisonStatus::Completed | ComparisonStatus::Failed => true,
        }
    }

    pub fn can_transition_to(&self, next: ComparisonStatus) -> bool {
        use ComparisonStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            // validation or systemic failure before the first dispatch
            (Pending, Failed) => true,
            (Running, Completed) => true,
            (Running, Failed) => true,
            (Pending, Pending) | (Pending, Completed) => false,
            (Running, Pending) | (Running, Running) => false,
            (Completed, _) | (Failed, _) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonStatus::Pending => "pending",
            ComparisonStatus::Running => "running",
            ComparisonStatus::Completed => "completed",
            ComparisonStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ComparisonStatus::Pending),
            "running" => Some(ComparisonStatus::Running),
            "completed" => Some(ComparisonStatus::Completed),
            "failed" => Some(ComparisonStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// What a comparison runs against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ComparisonTarget {
    Dataset {
        dataset_id: i64,
        iterations: u32,
        /// Cases the dataset held at creation; later additions are not run.
        #[serde(default)]
        case_ids: Vec<i64>,
    },
    Articles {
        #[serde(flatten)]
        filters: ArticleFilters,
        count: u32,
    },
}

/// Input to comparison creation, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub mode: ComparisonMode,
    #[serde(default)]
    pub kind: ComparisonType,
    pub config_a: ModelConfig,
    pub config_b: ModelConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<i64>,
    #[serde(default)]
    pub filters: ArticleFilters,
    /// Iterations (dataset mode) or sample size (calibration mode).
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub id: i64,
    pub mode: ComparisonMode,
    pub kind: ComparisonType,
    pub config_a: ModelConfig,
    pub config_b: ModelConfig,
    pub target: ComparisonTarget,
    pub status: ComparisonStatus,
    pub progress: u32,
    pub total_iterations: u32,
    pub message: String,
    pub error: Option<String>,
    pub summary: Option<crate::calibration::model::ComparisonSummary>,
    pub reviewed_count: u32,
    pub total_reviewable: u32,
    pub output_dataset_id: Option<i64>,
    pub created_at: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

impl Comparison {
    pub fn config(&self, slot: ConfigSlot) -> &ModelConfig {
        match slot {
            ConfigSlot::A => &self.config_a,
            ConfigSlot::B => &self.config_b,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestDataset {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub case_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_comparison_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    pub id: i64,
    pub dataset_id: i64,
    pub input_text: String,
    pub expected_extraction: serde_json::Value,
    pub importance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTestCase {
    pub input_text: String,
    pub expected_extraction: serde_json::Value,
    #[serde(default = "default_importance")]
    pub importance: i64,
}

fn default_importance() -> i64 {
    1
}

/// A live, unlabeled input sampled by calibration comparisons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: i64,
    pub source: String,
    #[serde(default)]
    pub category: Option<String>,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub source: String,
    #[serde(default)]
    pub category: Option<String>,
    pub text: String,
}

/// Identifies what a trial ran against. Stored as `case:<id>#<iteration>` or `doc:<id>`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TrialRef {
    Case { case_id: i64, iteration: u32 },
    Document { document_id: i64 },
}

impl TrialRef {
    pub fn key(&self) -> String {
        match self {
            TrialRef::Case { case_id, iteration } => format!("case:{}#{}", case_id, iteration),
            TrialRef::Document { document_id } => format!("doc:{}", document_id),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if let Some(rest) = s.strip_prefix("case:") {
            let (case_id, iteration) = rest.split_once('#')?;
            return Some(TrialRef::Case {
                case_id: case_id.parse().ok()?,
                iteration: iteration.parse().ok()?,
            });
        }
        let document_id = s.strip_prefix("doc:")?.parse().ok()?;
        Some(TrialRef::Document { document_id })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    Failed,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Completed => "completed",
            TrialStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => TrialStatus::Completed,
            _ => TrialStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// One execution of one configuration against one case or document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: i64,
    pub comparison_id: i64,
    pub config: ConfigSlot,
    pub trial_ref: TrialRef,
    pub extraction: Option<serde_json::Value>,
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_outputs: Option<serde_json::Value>,
    pub scores: Option<Scores>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
    pub status: TrialStatus,
    pub error: Option<String>,
    pub created_at: String,
}

/// Trial content produced by a worker, before it is persisted.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub config: ConfigSlot,
    pub trial_ref: TrialRef,
    pub extraction: Option<serde_json::Value>,
    pub confidence: Option<f64>,
    pub stage_outputs: Option<serde_json::Value>,
    pub scores: Option<Scores>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
    pub status: TrialStatus,
    pub error: Option<String>,
}

impl TrialOutcome {
    pub fn failed(config: ConfigSlot, trial_ref: TrialRef, error: impl Into<String>) -> Self {
        Self {
            config,
            trial_ref,
            extraction: None,
            confidence: None,
            stage_outputs: None,
            scores: None,
            tokens_in: 0,
            tokens_out: 0,
            latency_ms: 0,
            status: TrialStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Result of one extraction call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub extraction: serde_json::Value,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub stage_outputs: Option<serde_json::Value>,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Reviewed,
    Skipped,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Reviewed => "reviewed",
            ReviewStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "reviewed" => ReviewStatus::Reviewed,
            "skipped" => ReviewStatus::Skipped,
            _ => ReviewStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReviewDecision {
    pub review_status: ReviewStatus,
    pub chosen_config: Option<ConfigSlot>,
    pub golden_extraction: Option<serde_json::Value>,
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
}

/// Review unit in calibration mode: one sampled document with both trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationArticle {
    pub comparison_id: i64,
    pub document_id: i64,
    pub input_text: String,
    pub trial_a: Option<TrialRecord>,
    pub trial_b: Option<TrialRecord>,
    pub review: ReviewDecision,
}

impl CalibrationArticle {
    pub fn trial(&self, slot: ConfigSlot) -> Option<&TrialRecord> {
        match slot {
            ConfigSlot::A => self.trial_a.as_ref(),
            ConfigSlot::B => self.trial_b.as_ref(),
        }
    }

    pub fn extraction(&self, slot: ConfigSlot) -> Option<&serde_json::Value> {
        self.trial(slot).and_then(|t| t.extraction.as_ref())
    }
}
