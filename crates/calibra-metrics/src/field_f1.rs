use async_trait::async_trait;
use calibra_core::diff::{diff_status, is_derived, DiffStatus};
use calibra_core::model::Scores;
use calibra_core::scorer_api::Scorer;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Field-level precision/recall/F1. Values are compared the way the diff view
/// compares them (case, whitespace and array order do not matter).
pub struct FieldF1Scorer;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FieldCounts {
    pub true_pos: u32,
    pub false_pos: u32,
    pub false_neg: u32,
}

impl FieldCounts {
    pub fn scores(&self) -> Scores {
        let (tp, fp, fneg) = (
            self.true_pos as f64,
            self.false_pos as f64,
            self.false_neg as f64,
        );
        // empty vs empty is a perfect extraction
        let precision = if tp + fp == 0.0 {
            if fneg == 0.0 { 1.0 } else { 0.0 }
        } else {
            tp / (tp + fp)
        };
        let recall = if tp + fneg == 0.0 {
            if fp == 0.0 { 1.0 } else { 0.0 }
        } else {
            tp / (tp + fneg)
        };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Scores {
            precision,
            recall,
            f1,
        }
    }
}

pub fn field_counts(extraction: &Value, expected: &Value) -> FieldCounts {
    let empty = Map::new();
    let got = extraction.as_object().unwrap_or(&empty);
    let want = expected.as_object().unwrap_or(&empty);

    let keys: BTreeSet<&String> = got
        .keys()
        .chain(want.keys())
        .filter(|k| !is_derived(k))
        .collect();

    let mut c = FieldCounts::default();
    for k in keys {
        match diff_status(got.get(k.as_str()), want.get(k.as_str())) {
            DiffStatus::Match => c.true_pos += 1,
            DiffStatus::Mismatch => {
                c.false_pos += 1;
                c.false_neg += 1;
            }
            // extracted something the reference does not have
            DiffStatus::MissingB => c.false_pos += 1,
            DiffStatus::MissingA => c.false_neg += 1,
            DiffStatus::BothAbsent => {}
        }
    }
    c
}

#[async_trait]
impl Scorer for FieldF1Scorer {
    fn name(&self) -> &'static str {
        "field_f1"
    }

    async fn score(&self, extraction: &Value, expected: &Value) -> anyhow::Result<Scores> {
        if !expected.is_object() {
            anyhow::bail!("expected extraction must be a JSON object");
        }
        let counts = field_counts(extraction, expected);
        tracing::trace!(
            scorer = self.name(),
            tp = counts.true_pos,
            fp = counts.false_pos,
            fn_ = counts.false_neg,
        );
        Ok(counts.scores())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_partial_extraction() -> anyhow::Result<()> {
        let s = FieldF1Scorer
            .score(
                &json!({"title": "hello ", "city": "Paris", "extra": "x", "title_confidence": 0.4}),
                &json!({"title": "Hello", "city": "Lyon", "date": "2024"}),
            )
            .await?;
        // tp=title, fp=city+extra, fn=city+date
        assert!((s.precision - 1.0 / 3.0).abs() < 1e-9);
        assert!((s.recall - 1.0 / 3.0).abs() < 1e-9);
        assert!((s.f1 - 1.0 / 3.0).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_edges() -> anyhow::Result<()> {
        let perfect = FieldF1Scorer.score(&json!({}), &json!({})).await?;
        assert_eq!(perfect.f1, 1.0);

        let nothing = FieldF1Scorer
            .score(&json!({"a": null}), &json!({"a": "x"}))
            .await?;
        assert_eq!(nothing.precision, 0.0);
        assert_eq!(nothing.recall, 0.0);
        assert_eq!(nothing.f1, 0.0);

        assert!(FieldF1Scorer.score(&json!({}), &json!([1])).await.is_err());
        Ok(())
    }

    #[test]
    fn test_array_order_ignored() {
        let c = field_counts(&json!({"tags": ["b", "A"]}), &json!({"tags": ["a", "B"]}));
        assert_eq!(
            c,
            FieldCounts {
                true_pos: 1,
                false_pos: 0,
                false_neg: 0
            }
        );
    }
}
