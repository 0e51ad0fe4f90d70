use crate::model::{ComparisonType, ModelConfig};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub hex: String,
    pub components: Vec<String>,
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Identifies one extraction call: provider, model, extraction type and exact input text.
///
/// Recorded extractions are keyed by this value, so replaying a file against the same
/// inputs reproduces a comparison without calling a provider.
pub fn extraction_key(cfg: &ModelConfig, kind: ComparisonType, input: &str) -> Fingerprint {
    let parts = vec![
        format!("provider={}", cfg.provider),
        format!("model={}", cfg.model),
        format!("type={}", kind.as_str()),
        format!("input_sha256={}", sha256_hex(input)),
    ];
    let hex = sha256_hex(&parts.join("\n"));
    Fingerprint {
        hex,
        components: parts,
    }
}
