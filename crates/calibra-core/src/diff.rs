//! Field-by-field comparison of two extraction documents.
//!
//! Nothing here fails: malformed or missing input degrades to the `missing_*` and
//! `mismatch` classifications so a reviewer always gets a renderable table.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const CONFIDENCE_SUFFIX: &str = "_confidence";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Match,
    Mismatch,
    MissingA,
    MissingB,
    BothAbsent,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffStatus::Match => "match",
            DiffStatus::Mismatch => "mismatch",
            DiffStatus::MissingA => "missing_a",
            DiffStatus::MissingB => "missing_b",
            DiffStatus::BothAbsent => "both_absent",
        }
    }
}

/// Null, undefined (passed as `None`) or a blank string.
pub fn is_absent(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        // 3.0 and 3 are the same number to a reviewer
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.is_finite() => f.to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Comparison key: arrays become a sorted, lowercased, comma-joined list; everything
/// else is stringified, trimmed and lowercased.
pub fn normalize(v: &Value) -> String {
    match v {
        Value::Array(items) => {
            let mut parts: Vec<String> = items
                .iter()
                .map(|i| stringify(i).trim().to_lowercase())
                .collect();
            parts.sort();
            parts.join(",")
        }
        other => stringify(other).trim().to_lowercase(),
    }
}

pub fn diff_status(a: Option<&Value>, b: Option<&Value>) -> DiffStatus {
    match (is_absent(a), is_absent(b)) {
        (true, true) => DiffStatus::BothAbsent,
        (true, false) => DiffStatus::MissingA,
        (false, true) => DiffStatus::MissingB,
        (false, false) => {
            // both present, so both are Some
            let (Some(a), Some(b)) = (a, b) else {
                return DiffStatus::Mismatch;
            };
            if normalize(a) == normalize(b) {
                DiffStatus::Match
            } else {
                DiffStatus::Mismatch
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Rendered first, in this order, even when absent on both sides.
    pub priority: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDiff {
    pub field: String,
    pub status: DiffStatus,
    pub value_a: Value,
    pub value_b: Value,
    /// Percentages taken from `<field>_confidence`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_a: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_b: Option<u32>,
}

fn as_object(v: &Value) -> Option<&Map<String, Value>> {
    v.as_object()
}

/// `<field>_confidence` keys are shown next to their field, never as rows.
pub fn is_derived(key: &str) -> bool {
    key.len() > CONFIDENCE_SUFFIX.len() && key.ends_with(CONFIDENCE_SUFFIX)
}

/// Ordered row keys: priority fields, then the lexicographic union of both documents.
pub fn field_order(a: &Value, b: &Value, opts: &DiffOptions) -> Vec<String> {
    let skip = |k: &str| is_derived(k) || opts.exclude.iter().any(|e| e == k);

    let mut out: Vec<String> = Vec::new();
    for p in &opts.priority {
        if !skip(p) && !out.contains(p) {
            out.push(p.clone());
        }
    }

    let mut rest = BTreeSet::new();
    for doc in [a, b] {
        if let Some(obj) = as_object(doc) {
            for k in obj.keys() {
                if !skip(k) && !out.contains(k) {
                    rest.insert(k.clone());
                }
            }
        }
    }
    out.extend(rest);
    out
}

pub fn confidence_percent(v: Option<&Value>) -> Option<u32> {
    let x = match v? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !x.is_finite() || x < 0.0 {
        return None;
    }
    if x <= 1.0 {
        Some((x * 100.0).round() as u32)
    } else if x <= 100.0 {
        Some(x.round() as u32)
    } else {
        None
    }
}

pub fn diff_documents(a: &Value, b: &Value, opts: &DiffOptions) -> Vec<FieldDiff> {
    let get = |doc: &Value, k: &str| as_object(doc).and_then(|o| o.get(k)).cloned();

    field_order(a, b, opts)
        .into_iter()
        .map(|field| {
            let va = get(a, &field);
            let vb = get(b, &field);
            let conf_key = format!("{}{}", field, CONFIDENCE_SUFFIX);
            FieldDiff {
                status: diff_status(va.as_ref(), vb.as_ref()),
                confidence_a: confidence_percent(get(a, &conf_key).as_ref()),
                confidence_b: confidence_percent(get(b, &conf_key).as_ref()),
                value_a: va.unwrap_or(Value::Null),
                value_b: vb.unwrap_or(Value::Null),
                field,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffSummary {
    pub matches: u32,
    pub mismatches: u32,
    pub missing_a: u32,
    pub missing_b: u32,
    pub both_absent: u32,
}

impl DiffSummary {
    pub fn from_rows(rows: &[FieldDiff]) -> Self {
        let mut s = Self::default();
        for r in rows {
            match r.status {
                DiffStatus::Match => s.matches += 1,
                DiffStatus::Mismatch => s.mismatches += 1,
                DiffStatus::MissingA => s.missing_a += 1,
                DiffStatus::MissingB => s.missing_b += 1,
                DiffStatus::BothAbsent => s.both_absent += 1,
            }
        }
        s
    }
}

/// Compact text for a table cell. Absent values render as `-`.
pub fn display_value(v: &Value) -> String {
    if is_absent(Some(v)) {
        return "-".to_string();
    }
    match v {
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(", "),
        other => stringify(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn st(a: Value, b: Value) -> DiffStatus {
        diff_status(Some(&a), Some(&b))
    }

    #[test]
    fn test_string_and_array_normalization() {
        assert_eq!(st(json!(["A", "b"]), json!(["B", "a"])), DiffStatus::Match);
        assert_eq!(st(json!("  Amsterdam "), json!("amsterdam")), DiffStatus::Match);
        assert_eq!(st(json!("Amsterdam"), json!("Rotterdam")), DiffStatus::Mismatch);
        assert_eq!(st(json!(true), json!("TRUE")), DiffStatus::Match);
        assert_eq!(st(json!(3), json!("3")), DiffStatus::Match);
        assert_eq!(st(json!([1, 2]), json!([2, 1])), DiffStatus::Match);
        assert_eq!(st(json!(["a"]), json!(["a", "b"])), DiffStatus::Mismatch);
    }

    #[test]
    fn test_float_and_integer_forms_match() {
        let float: Value = serde_json::from_str("3.0").unwrap();
        assert_eq!(diff_status(Some(&float), Some(&json!(3))), DiffStatus::Match);
        assert_eq!(st(json!(2.50), json!("2.5")), DiffStatus::Match);
        assert_eq!(st(json!([1.0, 2]), json!([2, 1])), DiffStatus::Match);
        assert_eq!(st(json!(3.5), json!(3)), DiffStatus::Mismatch);
    }

    #[test]
    fn test_absence_never_mismatch() {
        assert_eq!(diff_status(None, None), DiffStatus::BothAbsent);
        assert_eq!(st(json!(null), json!("   ")), DiffStatus::BothAbsent);
        assert_eq!(st(json!(""), json!("x")), DiffStatus::MissingA);
        assert_eq!(diff_status(Some(&json!("x")), None), DiffStatus::MissingB);
        // empty arrays are values, not absence
        assert_eq!(st(json!([]), json!(null)), DiffStatus::MissingB);
    }

    #[test]
    fn test_field_order_and_confidence_rows() {
        let a = json!({"title": "T", "zeta": 1, "amount": 5, "amount_confidence": 0.87});
        let b = json!({"beta": "x", "title": "t", "amount": "5", "amount_confidence": "0.5"});
        let opts = DiffOptions {
            priority: vec!["title".into(), "date".into()],
            exclude: vec!["zeta".into()],
        };

        let rows = diff_documents(&a, &b, &opts);
        let fields: Vec<_> = rows.iter().map(|r| r.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "date", "amount", "beta"]);

        assert_eq!(rows[0].status, DiffStatus::Match);
        assert_eq!(rows[1].status, DiffStatus::BothAbsent);
        assert_eq!(rows[2].status, DiffStatus::Match);
        assert_eq!(rows[2].confidence_a, Some(87));
        assert_eq!(rows[2].confidence_b, Some(50));
        assert_eq!(rows[3].status, DiffStatus::MissingA);

        let summary = DiffSummary::from_rows(&rows);
        assert_eq!(summary.matches, 2);
        assert_eq!(summary.both_absent, 1);
        assert_eq!(summary.missing_a, 1);
    }

    #[test]
    fn test_non_object_documents_degrade() {
        let rows = diff_documents(&json!("garbage"), &json!({"a": 1}), &DiffOptions::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, DiffStatus::MissingA);
        assert!(diff_documents(&Value::Null, &Value::Null, &DiffOptions::default()).is_empty());
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!(null)), "-");
        assert_eq!(display_value(&json!(["a", 2])), "a, 2");
        assert_eq!(display_value(&json!({"k": 1})), "{\"k\":1}");
    }
}
