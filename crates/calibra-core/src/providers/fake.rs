use super::Extractor;
use crate::errors::ProviderUnavailable;
use crate::model::{ComparisonType, Extraction, ModelConfig};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Deterministic offline extractor. Reads `key: value` lines from the input.
///
/// Models: `echo` keeps every field, `lossy` drops every second field, `upper`
/// uppercases values. Inputs containing `[fail]` fail the trial; `[unavailable]`
/// simulates a provider outage.
pub struct FakeExtractor;

pub fn parse_fields(input: &str) -> Vec<(String, String)> {
    input
        .lines()
        .filter_map(|line| {
            let (k, v) = line.split_once(':')?;
            let key = k.trim().to_lowercase().replace(' ', "_");
            if key.is_empty() {
                return None;
            }
            Some((key, v.trim().to_string()))
        })
        .collect()
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(
        &self,
        config: &ModelConfig,
        kind: ComparisonType,
        input: &str,
    ) -> anyhow::Result<Extraction> {
        if input.contains("[unavailable]") {
            return Err(ProviderUnavailable("fake provider offline".into()).into());
        }
        if input.contains("[fail]") {
            anyhow::bail!("simulated extraction failure");
        }

        let start = std::time::Instant::now();
        let fields = parse_fields(input);

        let mut out = Map::new();
        for (i, (k, v)) in fields.iter().enumerate() {
            let value = match config.model.as_str() {
                "lossy" if i % 2 == 1 => continue,
                "upper" => v.to_uppercase(),
                _ => v.clone(),
            };
            out.insert(k.clone(), Value::String(value));
        }

        let stage_outputs = match kind {
            ComparisonType::Schema => None,
            ComparisonType::Pipeline => Some(json!({
                "segment": { "lines": input.lines().count() },
                "fields": fields.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            })),
        };

        let tokens_out = out
            .values()
            .filter_map(|v| v.as_str())
            .map(|s| s.split_whitespace().count() as u64)
            .sum();

        Ok(Extraction {
            extraction: Value::Object(out),
            confidence: Some(0.9),
            stage_outputs,
            tokens_in: input.split_whitespace().count() as u64,
            tokens_out,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_models_shape_output() -> anyhow::Result<()> {
        let input = "Title: Hello world\nCity: Amsterdam\nDate: 2024-01-01\nno colon here";
        let echo = FakeExtractor
            .extract(&ModelConfig::new("fake", "echo"), ComparisonType::Schema, input)
            .await?;
        assert_eq!(echo.extraction.as_object().unwrap().len(), 3);
        assert_eq!(echo.extraction["city"], "Amsterdam");
        assert_eq!(echo.tokens_in, 10);
        assert!(echo.stage_outputs.is_none());

        let lossy = FakeExtractor
            .extract(&ModelConfig::new("fake", "lossy"), ComparisonType::Pipeline, input)
            .await?;
        assert!(lossy.extraction.get("city").is_none());
        assert_eq!(lossy.extraction["date"], "2024-01-01");
        assert!(lossy.stage_outputs.is_some());

        let upper = FakeExtractor
            .extract(&ModelConfig::new("fake", "upper"), ComparisonType::Schema, input)
            .await?;
        assert_eq!(upper.extraction["title"], "HELLO WORLD");
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_markers() {
        let cfg = ModelConfig::new("fake", "echo");
        let err = FakeExtractor
            .extract(&cfg, ComparisonType::Schema, "a: b [fail]")
            .await
            .unwrap_err();
        assert!(!crate::errors::is_systemic(&err));

        let err = FakeExtractor
            .extract(&cfg, ComparisonType::Schema, "[unavailable]")
            .await
            .unwrap_err();
        assert!(crate::errors::is_systemic(&err));
    }
}
