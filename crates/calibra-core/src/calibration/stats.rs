use super::model::{ComparisonSummary, ConfigSummary, Stat, SummaryOutcome};
use crate::model::{ConfigSlot, TrialRecord, TrialStatus};
use std::collections::BTreeMap;

/// Minimum completed trials per side before a difference can count as significant.
pub const MIN_SIGNIFICANT_SAMPLES: u32 = 3;

#[derive(Default)]
struct Samples {
    precision: Vec<f64>,
    recall: Vec<f64>,
    f1: Vec<f64>,
    duration_ms: Vec<f64>,
    completed: u32,
    total: u32,
    tokens: u64,
}

pub struct Aggregator {
    per_config: BTreeMap<ConfigSlot, Samples>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        let mut per_config = BTreeMap::new();
        for slot in ConfigSlot::BOTH {
            per_config.insert(slot, Samples::default());
        }
        Self { per_config }
    }

    pub fn push(&mut self, trial: &TrialRecord) {
        let s = self.per_config.entry(trial.config).or_default();
        s.total += 1;
        s.tokens += trial.tokens_in + trial.tokens_out;

        if trial.status != TrialStatus::Completed {
            return;
        }
        s.completed += 1;
        s.duration_ms.push(trial.latency_ms as f64);
        if let Some(scores) = trial.scores {
            s.precision.push(scores.precision);
            s.recall.push(scores.recall);
            s.f1.push(scores.f1);
        }
    }

    pub fn finish(self) -> SummaryOutcome {
        let mut per_config = self.per_config;
        let a = per_config.remove(&ConfigSlot::A).unwrap_or_default();
        let b = per_config.remove(&ConfigSlot::B).unwrap_or_default();

        for (slot, s) in [(ConfigSlot::A, &a), (ConfigSlot::B, &b)] {
            if s.completed == 0 || s.f1.is_empty() {
                return SummaryOutcome::NoSummary {
                    reason: format!("config {} has no completed, scored trials", slot),
                };
            }
        }

        let config_a = config_summary(&a);
        let config_b = config_summary(&b);

        let (winner, f1_delta) = if config_b.f1.mean > config_a.f1.mean {
            (ConfigSlot::B, config_b.f1.mean - config_a.f1.mean)
        } else {
            (ConfigSlot::A, config_a.f1.mean - config_b.f1.mean)
        };

        let statistically_significant = separated(
            &config_a.f1,
            config_a.samples,
            &config_b.f1,
            config_b.samples,
        );

        SummaryOutcome::Summary(ComparisonSummary {
            config_a,
            config_b,
            winner,
            f1_delta,
            statistically_significant,
            generated_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

pub fn summarize(trials: &[TrialRecord]) -> SummaryOutcome {
    let mut agg = Aggregator::new();
    for t in trials {
        agg.push(t);
    }
    agg.finish()
}

fn config_summary(s: &Samples) -> ConfigSummary {
    ConfigSummary {
        samples: s.completed,
        trials: s.total,
        precision: describe(&s.precision),
        recall: describe(&s.recall),
        f1: describe(&s.f1),
        duration_ms: describe(&s.duration_ms),
        pass_rate: if s.total == 0 {
            0.0
        } else {
            s.completed as f64 / s.total as f64
        },
        total_tokens: s.tokens,
    }
}

/// Mean, population standard deviation, min and max. Empty input yields zeros.
pub fn describe(values: &[f64]) -> Stat {
    if values.is_empty() {
        return Stat::default();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Stat {
        mean,
        std: variance.sqrt(),
        min,
        max,
    }
}

/// Means differ by more than the combined standard deviation `sqrt(std_a² + std_b²)`
/// and both sides have at least [`MIN_SIGNIFICANT_SAMPLES`] samples.
pub fn separated(a: &Stat, n_a: u32, b: &Stat, n_b: u32) -> bool {
    if n_a < MIN_SIGNIFICANT_SAMPLES || n_b < MIN_SIGNIFICANT_SAMPLES {
        return false;
    }
    let combined = (a.std.powi(2) + b.std.powi(2)).sqrt();
    (a.mean - b.mean).abs() > combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Scores, TrialRef};

    fn trial(config: ConfigSlot, f1: Option<f64>, latency_ms: u64) -> TrialRecord {
        TrialRecord {
            id: 0,
            comparison_id: 1,
            config,
            trial_ref: TrialRef::Case {
                case_id: 1,
                iteration: 0,
            },
            extraction: None,
            confidence: None,
            stage_outputs: None,
            scores: f1.map(|f1| Scores {
                precision: f1,
                recall: f1,
                f1,
            }),
            tokens_in: 10,
            tokens_out: 5,
            latency_ms,
            status: if f1.is_some() {
                TrialStatus::Completed
            } else {
                TrialStatus::Failed
            },
            error: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_single_sample_has_zero_std_and_winner() {
        let out = summarize(&[
            trial(ConfigSlot::A, Some(0.5), 100),
            trial(ConfigSlot::B, Some(0.8), 300),
        ]);
        let s = out.into_summary().expect("summary");
        assert_eq!(s.config_a.f1.std, 0.0);
        assert_eq!(s.config_b.f1.std, 0.0);
        assert_eq!(s.winner, ConfigSlot::B);
        assert!((s.f1_delta - 0.3).abs() < 1e-9);
        assert!(!s.statistically_significant);
        assert_eq!(s.config_a.total_tokens, 15);
    }

    #[test]
    fn test_no_completed_trials_is_no_summary() {
        let out = summarize(&[
            trial(ConfigSlot::A, Some(0.5), 100),
            trial(ConfigSlot::B, None, 0),
        ]);
        assert!(matches!(out, SummaryOutcome::NoSummary { .. }));
        assert!(matches!(summarize(&[]), SummaryOutcome::NoSummary { .. }));
    }

    #[test]
    fn test_pass_rate_and_tokens_include_failures() {
        let out = summarize(&[
            trial(ConfigSlot::A, Some(1.0), 10),
            trial(ConfigSlot::A, None, 0),
            trial(ConfigSlot::B, Some(1.0), 10),
        ]);
        let s = out.into_summary().unwrap();
        assert_eq!(s.config_a.pass_rate, 0.5);
        assert_eq!(s.config_a.samples, 1);
        assert_eq!(s.config_a.trials, 2);
        assert_eq!(s.config_a.total_tokens, 30);
        assert_eq!(s.config_b.pass_rate, 1.0);
    }

    #[test]
    fn test_describe() {
        let st = describe(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(st.mean, 5.0);
        assert_eq!(st.std, 2.0);
        assert_eq!(st.min, 2.0);
        assert_eq!(st.max, 9.0);
    }

    #[test]
    fn test_significance_rule() {
        let a = describe(&[0.9, 0.92, 0.91]);
        let b = describe(&[0.5, 0.52, 0.51]);
        assert!(separated(&a, 3, &b, 3));
        // too few samples
        assert!(!separated(&a, 2, &b, 3));

        let noisy = describe(&[0.1, 0.9, 0.5]);
        assert!(!separated(&noisy, 3, &describe(&[0.4, 0.6, 0.5]), 3));
    }

    #[test]
    fn test_tie_goes_to_a_and_is_not_significant() {
        let trials: Vec<_> = (0..3)
            .flat_map(|_| {
                [
                    trial(ConfigSlot::A, Some(0.7), 1),
                    trial(ConfigSlot::B, Some(0.7), 1),
                ]
            })
            .collect();
        let s = summarize(&trials).into_summary().unwrap();
        assert_eq!(s.winner, ConfigSlot::A);
        assert_eq!(s.f1_delta, 0.0);
        assert!(!s.statistically_significant);
    }
}
