use crate::field_f1::field_counts;
use async_trait::async_trait;
use calibra_core::model::Scores;
use calibra_core::scorer_api::Scorer;
use serde_json::Value;

/// All-or-nothing: 1.0 when every field agrees, else 0.0.
pub struct ExactMatchScorer;

#[async_trait]
impl Scorer for ExactMatchScorer {
    fn name(&self) -> &'static str {
        "exact_match"
    }

    async fn score(&self, extraction: &Value, expected: &Value) -> anyhow::Result<Scores> {
        let c = field_counts(extraction, expected);
        let v = if c.false_pos == 0 && c.false_neg == 0 {
            1.0
        } else {
            0.0
        };
        Ok(Scores {
            precision: v,
            recall: v,
            f1: v,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_all_or_nothing() -> anyhow::Result<()> {
        let hit = ExactMatchScorer
            .score(&json!({"a": "X ", "a_confidence": 0.2}), &json!({"a": "x"}))
            .await?;
        assert_eq!(hit.f1, 1.0);
        let miss = ExactMatchScorer
            .score(&json!({"a": "x", "b": "y"}), &json!({"a": "x"}))
            .await?;
        assert_eq!(miss.f1, 0.0);
        Ok(())
    }
}
