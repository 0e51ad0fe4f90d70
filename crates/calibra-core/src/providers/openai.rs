use super::Extractor;
use crate::errors::ProviderUnavailable;
use crate::model::{ComparisonType, Extraction, ModelConfig};
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_INSTRUCTIONS: &str = "Extract the structured facts from the user's text. \
Reply with a single flat JSON object whose keys are snake_case field names. \
Use null for facts that are not present. For each field you may add \
`<field>_confidence` with a number between 0 and 1.";

/// OpenAI-compatible chat completions in JSON mode.
pub struct OpenAiExtractor {
    pub base_url: String,
    pub api_key: Option<String>,
    pub instructions: String,
    pub temperature: f32,
    pub client: reqwest::Client,
}

impl OpenAiExtractor {
    pub fn new(base_url: Option<String>, api_key: Option<String>, instructions: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            instructions: instructions.unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
            temperature: 0.0,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(base_url: Option<String>, instructions: Option<String>) -> Self {
        Self::new(base_url, std::env::var("OPENAI_API_KEY").ok(), instructions)
    }

    fn system_prompt(&self, kind: ComparisonType) -> String {
        match kind {
            ComparisonType::Schema => self.instructions.clone(),
            ComparisonType::Pipeline => format!(
                "{}\nWork in two passes: first list candidate facts, then reconcile them. \
                 Put the reconciled object under \"result\" and the candidate list under \"candidates\".",
                self.instructions
            ),
        }
    }
}

/// Splits a pipeline reply into the final object and its intermediate stages.
fn split_pipeline(content: serde_json::Value) -> (serde_json::Value, Option<serde_json::Value>) {
    match content {
        serde_json::Value::Object(mut obj) if obj.contains_key("result") => {
            let result = obj.remove("result").unwrap_or_default();
            (result, Some(serde_json::Value::Object(obj)))
        }
        other => (other, None),
    }
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    async fn extract(
        &self,
        config: &ModelConfig,
        kind: ComparisonType,
        input: &str,
    ) -> anyhow::Result<Extraction> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderUnavailable("OPENAI_API_KEY is not set".into()))?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": config.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": self.system_prompt(kind) },
                { "role": "user", "content": input },
            ],
        });

        let start = std::time::Instant::now();
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| -> anyhow::Error {
                if e.is_connect() {
                    ProviderUnavailable(format!("cannot reach {}: {}", self.base_url, e)).into()
                } else {
                    e.into()
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
                || status == reqwest::StatusCode::UNAUTHORIZED
            {
                return Err(ProviderUnavailable(format!("{}: {}", status, error_text)).into());
            }
            anyhow::bail!("OpenAI chat API error ({}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("OpenAI API response missing content"))?;
        let content: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| anyhow::anyhow!("malformed extraction: {}", e))?;

        let (extraction, stage_outputs) = match kind {
            ComparisonType::Schema => (content, None),
            ComparisonType::Pipeline => split_pipeline(content),
        };

        let usage = |k: &str| json.pointer(&format!("/usage/{}", k)).and_then(|v| v.as_u64());

        Ok(Extraction {
            extraction,
            confidence: None,
            stage_outputs,
            tokens_in: usage("prompt_tokens").unwrap_or(0),
            tokens_out: usage("completion_tokens").unwrap_or(0),
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_systemic() {
        let client = OpenAiExtractor::new(None, None, None);
        let err = client
            .extract(&ModelConfig::new("openai", "gpt-4o"), ComparisonType::Schema, "x")
            .await
            .unwrap_err();
        assert!(crate::errors::is_systemic(&err));
    }

    #[test]
    fn test_split_pipeline() {
        let (result, stages) = split_pipeline(json!({"result": {"a": 1}, "candidates": ["a"]}));
        assert_eq!(result, json!({"a": 1}));
        assert_eq!(stages, Some(json!({"candidates": ["a"]})));

        let (result, stages) = split_pipeline(json!({"a": 1}));
        assert_eq!(result, json!({"a": 1}));
        assert!(stages.is_none());
    }

    #[test]
    fn test_base_url_normalized() {
        let c = OpenAiExtractor::new(Some("http://localhost:8080/v1/".into()), None, None);
        assert_eq!(c.base_url, "http://localhost:8080/v1");
    }
}
