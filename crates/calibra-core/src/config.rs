use crate::errors::ConfigError;
use crate::registry::ProviderRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibraConfig {
    #[serde(default, rename = "configVersion", alias = "version")]
    pub version: u32,
    #[serde(default = "default_db")]
    pub db: String,
    /// provider -> models accepted for comparisons
    #[serde(default)]
    pub providers: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "is_default_settings")]
    pub settings: Settings,
    /// Directory of the config file; relative paths resolve against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_db() -> String {
    ".calibra/calibra.db".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_instructions: Option<String>,
}

fn is_default_settings(s: &Settings) -> bool {
    s == &Settings::default()
}

/// Execution knobs handed to the runner for one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub parallel: usize,
    pub timeout_seconds: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            parallel: 4,
            timeout_seconds: 60,
        }
    }
}

impl CalibraConfig {
    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::new(self.providers.clone())
    }

    pub fn run_settings(&self) -> RunSettings {
        let d = RunSettings::default();
        RunSettings {
            parallel: self.settings.parallel.unwrap_or(d.parallel).max(1),
            timeout_seconds: self
                .settings
                .timeout_seconds
                .unwrap_or(d.timeout_seconds)
                .max(1),
        }
    }

    pub fn poll_interval_seconds(&self) -> u64 {
        self.settings.poll_interval_seconds.unwrap_or(5).max(1)
    }

    /// Applies `CALIBRA_*` overrides. `lookup` is usually `std::env::var(..).ok()`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CALIBRA_PARALLEL") {
            if let Ok(n) = v.parse() {
                self.settings.parallel = Some(n);
            }
        }
        if let Some(v) = lookup("CALIBRA_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse() {
                self.settings.timeout_seconds = Some(n);
            }
        }
        if let Some(v) = lookup("CALIBRA_DB") {
            if !v.trim().is_empty() {
                self.db = resolve_path(&self.base_dir, &v);
            }
        }
    }
}

pub fn load_config(path: &Path, strict: bool) -> Result<CalibraConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw, path, strict)
}

pub fn parse_config(raw: &str, path: &Path, strict: bool) -> Result<CalibraConfig, ConfigError> {
    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let mut cfg: CalibraConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    let meaningful_unknowns: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();

    if !meaningful_unknowns.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "Unknown fields detected in strict mode: {:?} (file: {})",
                meaningful_unknowns,
                path.display()
            )));
        }
        tracing::warn!(
            event = "calibra.config.unknown_fields",
            fields = ?meaningful_unknowns,
            file = %path.display(),
            "ignored unknown config fields"
        );
    }

    if cfg.version != 0 && cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: 0, {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }

    if cfg.providers.is_empty() {
        return Err(ConfigError("config declares no providers".into()));
    }
    if let Some((provider, _)) = cfg.providers.iter().find(|(_, models)| models.is_empty()) {
        return Err(ConfigError(format!(
            "provider '{}' declares no models",
            provider
        )));
    }

    cfg.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    cfg.db = resolve_path(&cfg.base_dir, &cfg.db);
    if let Some(replay) = cfg.settings.replay_file.take() {
        cfg.settings.replay_file = Some(resolve_path(&cfg.base_dir, &replay));
    }

    Ok(cfg)
}

/// Joins a relative path onto `base`. Absolute paths and sqlite names such as
/// `:memory:` pass through.
fn resolve_path(base: &Path, value: &str) -> String {
    let p = Path::new(value);
    if value.starts_with(':') || p.is_absolute() || base.as_os_str().is_empty() {
        return value.to_string();
    }
    let mut out = base.to_path_buf();
    for part in p.components() {
        match part {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out.to_string_lossy().into_owned()
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(
        path,
        r#"version: 1
db: .calibra/calibra.db
providers:
  fake: [echo, lossy, upper]
  openai: [gpt-4o-mini, gpt-4o]
settings:
  parallel: 4
  timeout_seconds: 60
  poll_interval_seconds: 5
"#,
    )
    .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: 1
db: data/calibra.db
providers:
  fake: [echo, lossy]
settings:
  parallel: 2
"#;

    #[test]
    fn test_parse_resolves_paths_and_registry() {
        let cfg = parse_config(SAMPLE, Path::new("/proj/calibra.yaml"), true).unwrap();
        assert_eq!(cfg.db, "/proj/data/calibra.db");
        assert!(cfg
            .registry()
            .resolve(&crate::model::ModelConfig::new("fake", "lossy"))
            .is_ok());
        assert_eq!(cfg.run_settings().parallel, 2);
        assert_eq!(cfg.run_settings().timeout_seconds, 60);
        assert_eq!(cfg.poll_interval_seconds(), 5);
    }

    #[test]
    fn test_strict_rejects_unknown_fields() {
        let raw = format!("{}\nbogus: 1\n", SAMPLE);
        let err = parse_config(&raw, Path::new("c.yaml"), true).unwrap_err();
        assert!(err.0.contains("bogus"));

        // lenient mode keeps going
        assert!(parse_config(&raw, Path::new("c.yaml"), false).is_ok());
    }

    #[test]
    fn test_rejects_unsupported_version_and_empty_providers() {
        let err = parse_config("version: 7\nproviders: {fake: [echo]}\n", Path::new("c.yaml"), false)
            .unwrap_err();
        assert!(err.0.contains("unsupported config version 7"));

        let err = parse_config("version: 1\n", Path::new("c.yaml"), false).unwrap_err();
        assert!(err.0.contains("no providers"));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = parse_config(SAMPLE, Path::new("c.yaml"), false).unwrap();
        cfg.apply_overrides(|k| match k {
            "CALIBRA_PARALLEL" => Some("9".into()),
            "CALIBRA_TIMEOUT_SECONDS" => Some("not-a-number".into()),
            "CALIBRA_DB" => Some(":memory:".into()),
            _ => None,
        });
        assert_eq!(cfg.run_settings().parallel, 9);
        assert_eq!(cfg.run_settings().timeout_seconds, 60);
        assert_eq!(cfg.db, ":memory:");
    }

    #[test]
    fn test_paths_resolve_against_config_dir() {
        let raw = format!("{}  replay_file: ./traces/../rec.jsonl\n", SAMPLE);
        let mut cfg = parse_config(&raw, Path::new("/work/proj/calibra.yaml"), false).unwrap();
        assert_eq!(cfg.db, "/work/proj/data/calibra.db");
        assert_eq!(cfg.settings.replay_file.as_deref(), Some("/work/proj/rec.jsonl"));

        cfg.apply_overrides(|k| (k == "CALIBRA_DB").then(|| "other/x.db".to_string()));
        assert_eq!(cfg.db, "/work/proj/other/x.db");

        cfg.apply_overrides(|k| (k == "CALIBRA_DB").then(|| "/abs/x.db".to_string()));
        assert_eq!(cfg.db, "/abs/x.db");
    }
}
