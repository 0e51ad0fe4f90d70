use super::Extractor;
use crate::fingerprint::{extraction_key, sha256_hex};
use crate::model::{ComparisonType, Extraction, ModelConfig};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

/// One recorded extraction. Either `input` or `input_sha256` identifies the source text.
#[derive(Debug, Deserialize)]
struct ReplayEntry {
    provider: String,
    model: String,
    #[serde(default, rename = "type")]
    kind: ComparisonType,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    input_sha256: Option<String>,
    #[serde(flatten)]
    result: Extraction,
}

/// Serves extractions recorded in a JSONL file instead of calling a provider.
#[derive(Clone)]
pub struct ReplayExtractor {
    entries: Arc<HashMap<String, Extraction>>,
}

fn entry_key(provider: &str, model: &str, kind: ComparisonType, input_sha: &str) -> String {
    format!("{}/{}/{}/{}", provider, model, kind.as_str(), input_sha)
}

impl ReplayExtractor {
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "failed to open replay file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;
        let reader = std::io::BufReader::new(file);

        let mut entries = HashMap::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: ReplayEntry = serde_json::from_str(&line)
                .map_err(|e| anyhow::anyhow!("line {}: parse error: {}", i + 1, e))?;

            let input_sha = match (&entry.input, &entry.input_sha256) {
                (Some(text), _) => sha256_hex(text),
                (None, Some(sha)) => sha.to_lowercase(),
                (None, None) => {
                    anyhow::bail!("line {}: entry needs 'input' or 'input_sha256'", i + 1)
                }
            };
            if !entry.result.extraction.is_object() {
                anyhow::bail!("line {}: 'extraction' must be a JSON object", i + 1);
            }

            let key = entry_key(&entry.provider, &entry.model, entry.kind, &input_sha);
            if entries.contains_key(&key) {
                anyhow::bail!(
                    "line {}: duplicate entry for {}/{} and the same input",
                    i + 1,
                    entry.provider,
                    entry.model
                );
            }
            entries.insert(key, entry.result);
        }

        Ok(Self {
            entries: Arc::new(entries),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl Extractor for ReplayExtractor {
    async fn extract(
        &self,
        config: &ModelConfig,
        kind: ComparisonType,
        input: &str,
    ) -> anyhow::Result<Extraction> {
        let key = entry_key(&config.provider, &config.model, kind, &sha256_hex(input));
        self.entries.get(&key).cloned().ok_or_else(|| {
            anyhow::anyhow!(
                "replay miss: no recorded extraction for {} (key {})",
                config,
                &extraction_key(config, kind, input).hex[..12]
            )
        })
    }
}
