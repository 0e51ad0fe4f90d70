use crate::errors::CalibraError;
use crate::model::ModelConfig;
use std::collections::BTreeMap;

/// Known provider -> models table. Built from `calibra.yaml` and passed explicitly
/// into the runner at comparison creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Vec<String>>,
}

impl ProviderRegistry {
    pub fn new(providers: BTreeMap<String, Vec<String>>) -> Self {
        Self { providers }
    }

    pub fn from_pairs<I, P, M>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, Vec<M>)>,
        P: Into<String>,
        M: Into<String>,
    {
        let providers = pairs
            .into_iter()
            .map(|(p, ms)| (p.into(), ms.into_iter().map(Into::into).collect()))
            .collect();
        Self { providers }
    }

    pub fn resolve(&self, cfg: &ModelConfig) -> Result<(), CalibraError> {
        let models = self.providers.get(&cfg.provider).ok_or_else(|| {
            CalibraError::InvalidConfiguration(format!(
                "unknown provider '{}' (known: {})",
                cfg.provider,
                self.providers.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
        if !models.iter().any(|m| m == &cfg.model) {
            return Err(CalibraError::InvalidConfiguration(format!(
                "unknown model '{}' for provider '{}'",
                cfg.model, cfg.provider
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let reg = ProviderRegistry::from_pairs([("p1", vec!["m1", "m2"])]);
        assert!(reg.resolve(&ModelConfig::new("p1", "m2")).is_ok());

        let err = reg.resolve(&ModelConfig::new("p2", "m1")).unwrap_err();
        assert!(matches!(err, CalibraError::InvalidConfiguration(ref m) if m.contains("unknown provider")));

        let err = reg.resolve(&ModelConfig::new("p1", "m9")).unwrap_err();
        assert!(err.to_string().contains("unknown model 'm9'"));
    }
}
