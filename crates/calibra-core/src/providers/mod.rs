use crate::errors::ProviderUnavailable;
use crate::model::{ComparisonType, Extraction, ModelConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub mod fake;
pub mod openai;
pub mod replay;

/// The extraction invoker. Implementations turn source text into a JSON document for
/// one provider/model pair.
///
/// Errors fail the current trial only, unless they wrap [`ProviderUnavailable`].
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        config: &ModelConfig,
        kind: ComparisonType,
        input: &str,
    ) -> anyhow::Result<Extraction>;
}

/// Dispatches each call to the extractor registered for `config.provider`.
#[derive(Clone, Default)]
pub struct ProviderRouter {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl Into<String>, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.insert(provider.into(), extractor);
        self
    }

    pub fn register(&mut self, provider: impl Into<String>, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(provider.into(), extractor);
    }
}

#[async_trait]
impl Extractor for ProviderRouter {
    async fn extract(
        &self,
        config: &ModelConfig,
        kind: ComparisonType,
        input: &str,
    ) -> anyhow::Result<Extraction> {
        let Some(extractor) = self.extractors.get(&config.provider) else {
            return Err(ProviderUnavailable(format!(
                "no extractor registered for provider '{}'",
                config.provider
            ))
            .into());
        };
        extractor.extract(config, kind, input).await
    }
}

/// Wires up the built-in extractors for every provider the config declares.
///
/// Providers without a built-in adapter are served from the replay file when one is
/// configured.
pub fn build_router(cfg: &crate::config::CalibraConfig) -> anyhow::Result<ProviderRouter> {
    let replay = match &cfg.settings.replay_file {
        Some(path) => Some(Arc::new(replay::ReplayExtractor::from_path(path)?)),
        None => None,
    };

    let mut router = ProviderRouter::new();
    for provider in cfg.providers.keys() {
        let extractor: Option<Arc<dyn Extractor>> = match (provider.as_str(), &replay) {
            (_, Some(r)) => Some(r.clone()),
            ("fake", None) => Some(Arc::new(fake::FakeExtractor)),
            ("openai", None) => {
                let client = openai::OpenAiExtractor::from_env(
                    cfg.settings.openai_base_url.clone(),
                    cfg.settings.extraction_instructions.clone(),
                );
                Some(Arc::new(client))
            }
            (_, None) => None,
        };
        match extractor {
            Some(e) => router.register(provider.clone(), e),
            None => tracing::warn!(
                event = "calibra.providers.unserved",
                provider = %provider,
                "provider has no built-in extractor and no replay file; its trials will fail"
            ),
        }
    }
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_router_missing_provider_is_systemic() {
        let router = ProviderRouter::new().with("fake", Arc::new(fake::FakeExtractor));
        let err = router
            .extract(&ModelConfig::new("nope", "m"), ComparisonType::Schema, "a: b")
            .await
            .unwrap_err();
        assert!(crate::errors::is_systemic(&err));

        let ok = router
            .extract(&ModelConfig::new("fake", "echo"), ComparisonType::Schema, "a: b")
            .await
            .unwrap();
        assert_eq!(ok.extraction["a"], "b");
    }
}
