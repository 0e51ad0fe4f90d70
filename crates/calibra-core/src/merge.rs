use crate::model::ConfigSlot;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Sparse per-field choice of which configuration's value to keep.
pub type FieldPreferences = BTreeMap<String, ConfigSlot>;

/// Builds one document over the union of both key sets. Each key takes its value from
/// the preferred side (explicit override, else `default`); a key missing on that side
/// becomes `null`. Non-object inputs count as empty objects.
pub fn build_merged(
    doc_a: &Value,
    doc_b: &Value,
    preferences: &FieldPreferences,
    default: ConfigSlot,
) -> Value {
    let empty = Map::new();
    let a = doc_a.as_object().unwrap_or(&empty);
    let b = doc_b.as_object().unwrap_or(&empty);

    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();

    let mut out = Map::new();
    for key in keys {
        let side = preferences.get(key.as_str()).copied().unwrap_or(default);
        let src = match side {
            ConfigSlot::A => a,
            ConfigSlot::B => b,
        };
        out.insert(key.clone(), src.get(key.as_str()).cloned().unwrap_or(Value::Null));
    }
    Value::Object(out)
}

/// Parses `field=a` / `field=b` pairs as given on the command line.
pub fn parse_preferences<'a, I>(pairs: I) -> anyhow::Result<FieldPreferences>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut prefs = FieldPreferences::new();
    for raw in pairs {
        let (field, side) = raw
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected field=a|b, got '{}'", raw))?;
        let slot = ConfigSlot::parse(side)
            .ok_or_else(|| anyhow::anyhow!("unknown side '{}' for field '{}'", side, field))?;
        prefs.insert(field.trim().to_string(), slot);
    }
    Ok(prefs)
}
