use crate::model::Scores;
use async_trait::async_trait;

/// Dataset-mode quality scorer: compares one extraction against the expected document.
#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn score(
        &self,
        extraction: &serde_json::Value,
        expected: &serde_json::Value,
    ) -> anyhow::Result<Scores>;
}
