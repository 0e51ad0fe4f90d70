use crate::errors::CalibraError;
use crate::merge::{build_merged, FieldPreferences};
use crate::model::{
    CalibrationArticle, Comparison, ComparisonMode, ComparisonStatus, ConfigSlot, ReviewDecision,
    ReviewStatus, TestDataset,
};
use crate::storage::store::Store;
use serde::Serialize;
use serde_json::Value;

/// What the caller gets back after a review is stored.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReceipt {
    pub comparison_id: i64,
    pub document_id: i64,
    pub decision: ReviewDecision,
    pub reviewed_count: u32,
    pub total_reviewable: u32,
}

/// Human review of calibration articles and export of the results as a dataset.
pub struct ReviewWorkflow {
    pub store: Store,
}

impl ReviewWorkflow {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Records a decision for one article.
    ///
    /// The article counts as `reviewed` when a configuration was chosen or a golden
    /// document supplied, otherwise as `skipped`. Choosing a configuration without a
    /// golden document takes that configuration's extraction wholesale. A JSON `null`
    /// golden document counts as not supplied.
    pub fn review(
        &self,
        comparison_id: i64,
        document_id: i64,
        chosen_config: Option<ConfigSlot>,
        golden_extraction: Option<Value>,
        notes: Option<String>,
    ) -> anyhow::Result<ReviewReceipt> {
        let comparison = self.reviewable(comparison_id)?;
        let article = self.article(comparison_id, document_id)?;

        let golden_extraction = golden_extraction.filter(|g| !g.is_null());
        let review_status = if chosen_config.is_some() || golden_extraction.is_some() {
            ReviewStatus::Reviewed
        } else {
            ReviewStatus::Skipped
        };
        let golden_extraction = golden_extraction.or_else(|| {
            let slot = chosen_config?;
            article.extraction(slot)?;
            Some(merge_article(&article, &FieldPreferences::new(), slot))
        });

        let decision = ReviewDecision {
            review_status,
            chosen_config,
            golden_extraction,
            notes,
            reviewed_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        let reviewed_count = self
            .store
            .save_review(comparison_id, document_id, &decision)?;

        tracing::info!(
            event = "calibra.review.saved",
            comparison_id,
            document_id,
            status = decision.review_status.as_str(),
            chosen = decision.chosen_config.map(|c| c.as_str()).unwrap_or("-"),
            has_golden = decision.golden_extraction.is_some(),
            reviewed_count,
        );

        Ok(ReviewReceipt {
            comparison_id,
            document_id,
            decision,
            reviewed_count,
            total_reviewable: comparison.total_reviewable,
        })
    }

    /// Builds the golden document field by field and records it as a review
    /// with `default` as the chosen configuration.
    pub fn review_merged(
        &self,
        comparison_id: i64,
        document_id: i64,
        preferences: &FieldPreferences,
        default: ConfigSlot,
        notes: Option<String>,
    ) -> anyhow::Result<ReviewReceipt> {
        self.reviewable(comparison_id)?;
        let article = self.article(comparison_id, document_id)?;
        if article.extraction(ConfigSlot::A).is_none() && article.extraction(ConfigSlot::B).is_none()
        {
            return Err(CalibraError::InvalidState(format!(
                "document {} has no extraction from either config to merge",
                document_id
            ))
            .into());
        }
        let golden = merge_article(&article, preferences, default);
        self.review(comparison_id, document_id, Some(default), Some(golden), notes)
    }

    /// Turns every reviewed article with a golden document into a test case of a new
    /// dataset. One-shot per comparison.
    pub fn export_dataset(
        &self,
        comparison_id: i64,
        name: &str,
        description: &str,
    ) -> anyhow::Result<TestDataset> {
        if name.trim().is_empty() {
            return Err(
                CalibraError::InvalidConfiguration("dataset name must not be empty".into()).into(),
            );
        }
        let ds = self
            .store
            .export_reviewed(comparison_id, name.trim(), description)?;
        tracing::info!(
            event = "calibra.export.created",
            comparison_id,
            dataset_id = ds.id,
            cases = ds.case_count,
        );
        Ok(ds)
    }

    fn reviewable(&self, comparison_id: i64) -> anyhow::Result<Comparison> {
        let comparison = self
            .store
            .get_comparison(comparison_id)?
            .ok_or_else(|| CalibraError::NotFound(format!("comparison {}", comparison_id)))?;
        if comparison.mode != ComparisonMode::Calibration {
            return Err(CalibraError::InvalidState(format!(
                "comparison {} is a dataset comparison; only calibration comparisons are reviewed",
                comparison_id
            ))
            .into());
        }
        if comparison.status != ComparisonStatus::Completed {
            return Err(CalibraError::InvalidState(format!(
                "comparison {} is {}; reviews open once it completes",
                comparison_id, comparison.status
            ))
            .into());
        }
        Ok(comparison)
    }

    fn article(&self, comparison_id: i64, document_id: i64) -> anyhow::Result<CalibrationArticle> {
        self.store
            .get_article(comparison_id, document_id)?
            .ok_or_else(|| {
                CalibraError::NotFound(format!(
                    "document {} in comparison {}",
                    document_id, comparison_id
                ))
                .into()
            })
    }
}

fn merge_article(
    article: &CalibrationArticle,
    preferences: &FieldPreferences,
    default: ConfigSlot,
) -> Value {
    let empty = Value::Object(Default::default());
    build_merged(
        article.extraction(ConfigSlot::A).unwrap_or(&empty),
        article.extraction(ConfigSlot::B).unwrap_or(&empty),
        preferences,
        default,
    )
}
