use crate::calibration::stats::summarize;
use crate::config::RunSettings;
use crate::errors::{is_systemic, CalibraError};
use crate::events::{ComparisonEvent, EventBus};
use crate::model::{
    Comparison, ComparisonMode, ComparisonRequest, ComparisonStatus, ComparisonTarget,
    ComparisonType, ConfigSlot, ModelConfig, TrialOutcome, TrialRef, TrialStatus,
};
use crate::providers::Extractor;
use crate::registry::ProviderRegistry;
use crate::scorer_api::Scorer;
use crate::storage::store::{NewComparison, Store};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{timeout, Duration};

pub const MAX_ITERATIONS: u32 = 10;
pub const MAX_SAMPLE: u32 = 100;

/// Cooperative stop flag, checked between trial dispatches.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One trial waiting to be dispatched.
#[derive(Clone)]
struct WorkItem {
    slot: ConfigSlot,
    trial_ref: TrialRef,
    input: Arc<str>,
    expected: Option<Arc<serde_json::Value>>,
    /// Set when the trial cannot run; recorded as failed with this error.
    not_run: Option<String>,
}

pub struct RunOrchestrator {
    pub store: Store,
    pub extractor: Arc<dyn Extractor>,
    pub scorer: Arc<dyn Scorer>,
    pub registry: ProviderRegistry,
    pub settings: RunSettings,
    pub events: EventBus,
}

impl RunOrchestrator {
    pub fn new(
        store: Store,
        extractor: Arc<dyn Extractor>,
        scorer: Arc<dyn Scorer>,
        registry: ProviderRegistry,
        settings: RunSettings,
    ) -> Self {
        Self {
            store,
            extractor,
            scorer,
            registry,
            settings,
            events: EventBus::default(),
        }
    }

    /// Validates a request and stores it as a `pending` comparison.
    ///
    /// Nothing is written when validation fails.
    pub fn create(&self, req: &ComparisonRequest) -> anyhow::Result<Comparison> {
        self.registry.resolve(&req.config_a)?;
        self.registry.resolve(&req.config_b)?;

        let (target, total_iterations, documents, message) = match req.mode {
            ComparisonMode::Dataset => {
                if !(1..=MAX_ITERATIONS).contains(&req.count) {
                    return Err(invalid(format!(
                        "iterations must be between 1 and {}, got {}",
                        MAX_ITERATIONS, req.count
                    )));
                }
                let dataset_id = req
                    .dataset_id
                    .ok_or_else(|| invalid("dataset mode requires a dataset id".to_string()))?;
                let ds = self
                    .store
                    .get_dataset(dataset_id)?
                    .ok_or_else(|| invalid(format!("dataset {} not found", dataset_id)))?;
                let case_ids: Vec<i64> = self
                    .store
                    .list_test_cases(dataset_id)?
                    .iter()
                    .map(|c| c.id)
                    .collect();
                if case_ids.is_empty() {
                    return Err(invalid(format!(
                        "dataset {} ('{}') has no test cases",
                        ds.id, ds.name
                    )));
                }
                let total = 2 * case_ids.len() as u32 * req.count;
                let message = format!(
                    "queued {} trials: {} cases x {} iterations x 2 configs",
                    total,
                    case_ids.len(),
                    req.count
                );
                (
                    ComparisonTarget::Dataset {
                        dataset_id,
                        iterations: req.count,
                        case_ids,
                    },
                    total,
                    Vec::new(),
                    message,
                )
            }
            ComparisonMode::Calibration => {
                if !(1..=MAX_SAMPLE).contains(&req.count) {
                    return Err(invalid(format!(
                        "sample count must be between 1 and {}, got {}",
                        MAX_SAMPLE, req.count
                    )));
                }
                let docs = self.store.sample_documents(&req.filters, req.count)?;
                if docs.is_empty() {
                    return Err(invalid(format!(
                        "no documents match filters (source={}, category={})",
                        req.filters.source.as_deref().unwrap_or("*"),
                        req.filters.category.as_deref().unwrap_or("*")
                    )));
                }
                let message = if (docs.len() as u32) < req.count {
                    format!(
                        "only {} of {} requested documents match the filters",
                        docs.len(),
                        req.count
                    )
                } else {
                    format!("queued {} documents x 2 configs", docs.len())
                };
                (
                    ComparisonTarget::Articles {
                        filters: req.filters.clone(),
                        count: req.count,
                    },
                    2 * docs.len() as u32,
                    docs.iter().map(|d| d.id).collect(),
                    message,
                )
            }
        };

        let comparison = self.store.create_comparison(NewComparison {
            mode: req.mode,
            kind: req.kind,
            config_a: &req.config_a,
            config_b: &req.config_b,
            target: &target,
            total_iterations,
            message: &message,
            documents: &documents,
        })?;

        tracing::info!(
            event = "calibra.comparison.created",
            comparison_id = comparison.id,
            mode = comparison.mode.as_str(),
            config_a = %comparison.config_a,
            config_b = %comparison.config_b,
            total = comparison.total_iterations,
        );
        Ok(comparison)
    }

    /// Runs every trial of a pending comparison and drives it to a terminal state.
    pub async fn execute(
        &self,
        comparison_id: i64,
        cancel: &CancelHandle,
    ) -> anyhow::Result<Comparison> {
        let comparison = self
            .store
            .get_comparison(comparison_id)?
            .ok_or_else(|| CalibraError::NotFound(format!("comparison {}", comparison_id)))?;
        if comparison.status != ComparisonStatus::Pending {
            return Err(CalibraError::InvalidState(format!(
                "comparison {} is {}, only pending comparisons can run",
                comparison_id, comparison.status
            ))
            .into());
        }

        let items = self.plan(&comparison)?;

        let running = self.store.transition(
            comparison_id,
            ComparisonStatus::Running,
            &format!("running {} trials", items.len()),
            None,
        )?;
        self.events.publish(ComparisonEvent::StatusChanged {
            comparison_id,
            status: running.status,
            message: running.message.clone(),
        });
        tracing::info!(
            event = "calibra.comparison.running",
            comparison_id,
            parallel = self.settings.parallel,
            total = items.len(),
        );

        let systemic: Arc<OnceLock<String>> = Arc::new(OnceLock::new());
        let (tx, rx) = mpsc::channel::<TrialOutcome>(self.settings.parallel.max(1) * 2);

        let (dispatched, write_error) = tokio::join!(
            self.dispatch(&comparison, items, tx, cancel, systemic.clone()),
            self.write_trials(comparison_id, comparison.total_iterations, rx),
        );

        let (status, error) = if let Err(e) = dispatched {
            (ComparisonStatus::Failed, Some(format!("dispatch error: {}", e)))
        } else if let Some(e) = write_error {
            (ComparisonStatus::Failed, Some(format!("trial write failed: {}", e)))
        } else if cancel.is_cancelled() {
            (ComparisonStatus::Failed, Some("cancelled by operator".to_string()))
        } else if let Some(reason) = systemic.get() {
            (ComparisonStatus::Failed, Some(reason.clone()))
        } else {
            (ComparisonStatus::Completed, None)
        };

        if status == ComparisonStatus::Completed && comparison.mode == ComparisonMode::Dataset {
            let trials = self.store.list_trials(comparison_id)?;
            let summary = summarize(&trials).into_summary();
            if summary.is_none() {
                tracing::warn!(
                    event = "calibra.summary.unavailable",
                    comparison_id,
                    "a configuration has no completed, scored trials"
                );
            }
            self.store.set_summary(comparison_id, summary.as_ref())?;
        }

        let message = match status {
            ComparisonStatus::Completed => "completed",
            _ => "failed",
        };
        self.finish(comparison_id, status, message, error.as_deref())
    }

    fn finish(
        &self,
        comparison_id: i64,
        status: ComparisonStatus,
        message: &str,
        error: Option<&str>,
    ) -> anyhow::Result<Comparison> {
        let done = self
            .store
            .transition(comparison_id, status, message, error)?;
        match &done.error {
            Some(err) => tracing::warn!(
                event = "calibra.comparison.finished",
                comparison_id,
                status = done.status.as_str(),
                progress = done.progress,
                error = %err,
            ),
            None => tracing::info!(
                event = "calibra.comparison.finished",
                comparison_id,
                status = done.status.as_str(),
                progress = done.progress,
            ),
        }
        self.events.publish(ComparisonEvent::StatusChanged {
            comparison_id,
            status: done.status,
            message: done.message.clone(),
        });
        self.events.publish(ComparisonEvent::Finished {
            comparison_id,
            status: done.status,
        });
        Ok(done)
    }

    /// Expands the comparison target into trials, A and B interleaved per case.
    ///
    /// Dataset trials come from the case ids captured at creation, so the plan always
    /// has `total_iterations` items.
    fn plan(&self, comparison: &Comparison) -> anyhow::Result<Vec<WorkItem>> {
        let mut items = Vec::new();
        match &comparison.target {
            ComparisonTarget::Dataset {
                dataset_id,
                iterations,
                case_ids,
            } => {
                let mut by_id: HashMap<i64, (Arc<str>, Arc<serde_json::Value>)> = self
                    .store
                    .list_test_cases(*dataset_id)?
                    .into_iter()
                    .map(|c| {
                        (
                            c.id,
                            (Arc::from(c.input_text), Arc::new(c.expected_extraction)),
                        )
                    })
                    .collect();
                let cases: Vec<_> = case_ids
                    .iter()
                    .map(|id| (*id, by_id.remove(id)))
                    .collect();
                for iteration in 0..*iterations {
                    for (case_id, case) in &cases {
                        for slot in ConfigSlot::BOTH {
                            let trial_ref = TrialRef::Case {
                                case_id: *case_id,
                                iteration,
                            };
                            items.push(match case {
                                Some((input, expected)) => WorkItem {
                                    slot,
                                    trial_ref,
                                    input: input.clone(),
                                    expected: Some(expected.clone()),
                                    not_run: None,
                                },
                                None => WorkItem {
                                    slot,
                                    trial_ref,
                                    input: Arc::from(""),
                                    expected: None,
                                    not_run: Some(format!(
                                        "not run: test case {} no longer exists",
                                        case_id
                                    )),
                                },
                            });
                        }
                    }
                }
            }
            ComparisonTarget::Articles { .. } => {
                for article in self.store.list_articles(comparison.id)? {
                    let input: Arc<str> = Arc::from(article.input_text);
                    for slot in ConfigSlot::BOTH {
                        items.push(WorkItem {
                            slot,
                            trial_ref: TrialRef::Document {
                                document_id: article.document_id,
                            },
                            input: input.clone(),
                            expected: None,
                            not_run: None,
                        });
                    }
                }
            }
        }
        Ok(items)
    }

    /// Spawns one task per trial under the semaphore. Once cancelled or after a
    /// systemic provider failure, the remaining trials are sent as failed without
    /// running.
    async fn dispatch(
        &self,
        comparison: &Comparison,
        items: Vec<WorkItem>,
        tx: mpsc::Sender<TrialOutcome>,
        cancel: &CancelHandle,
        systemic: Arc<OnceLock<String>>,
    ) -> anyhow::Result<()> {
        let sem = Arc::new(Semaphore::new(self.settings.parallel.max(1)));
        let mut handles = Vec::new();
        let mut pending = items.into_iter();
        let mut halted: Option<String> = None;

        for mut item in pending.by_ref() {
            if let Some(reason) = item.not_run.take() {
                send(&tx, TrialOutcome::failed(item.slot, item.trial_ref, reason)).await?;
                continue;
            }
            let permit = sem.clone().acquire_owned().await?;

            let stop = if cancel.is_cancelled() {
                Some("cancelled".to_string())
            } else {
                systemic.get().map(|reason| format!("not run: {}", reason))
            };
            if let Some(reason) = stop {
                drop(permit);
                send(&tx, TrialOutcome::failed(item.slot, item.trial_ref, reason.clone())).await?;
                halted = Some(reason);
                break;
            }

            let extractor = self.extractor.clone();
            let scorer = self.scorer.clone();
            let config = comparison.config(item.slot).clone();
            let kind = comparison.kind;
            let limit = Duration::from_secs(self.settings.timeout_seconds);
            let systemic = systemic.clone();
            let tx = tx.clone();
            let (slot, trial_ref) = (item.slot, item.trial_ref);

            let h = tokio::spawn(async move {
                let _permit = permit;
                let outcome =
                    run_trial(extractor, scorer, &config, kind, item, limit, &systemic).await;
                let _ = tx.send(outcome).await;
            });
            handles.push((slot, trial_ref, h));
        }

        if let Some(reason) = halted {
            let remaining: Vec<_> = pending.collect();
            tracing::warn!(
                event = "calibra.dispatch.halted",
                comparison_id = comparison.id,
                reason = %reason,
                skipped = remaining.len() + 1,
            );
            for item in remaining {
                send(&tx, TrialOutcome::failed(item.slot, item.trial_ref, reason.clone())).await?;
            }
        }

        for (slot, trial_ref, h) in handles {
            if let Err(e) = h.await {
                send(
                    &tx,
                    TrialOutcome::failed(slot, trial_ref, format!("trial task panicked: {}", e)),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// The single writer: persists outcomes in arrival order and advances progress.
    async fn write_trials(
        &self,
        comparison_id: i64,
        total: u32,
        mut rx: mpsc::Receiver<TrialOutcome>,
    ) -> Option<anyhow::Error> {
        let mut first_error = None;
        while let Some(outcome) = rx.recv().await {
            let key = outcome.trial_ref.key();
            let message = format!(
                "config {} {} {}",
                outcome.config,
                key,
                outcome.status.as_str()
            );
            match self.store.record_trial(comparison_id, &outcome, &message) {
                Ok((trial_id, progress)) => {
                    tracing::debug!(
                        event = "calibra.trial.recorded",
                        comparison_id,
                        trial_id,
                        config = outcome.config.as_str(),
                        trial_ref = %key,
                        status = outcome.status.as_str(),
                        error = outcome.error.as_deref().unwrap_or(""),
                    );
                    self.events.publish(ComparisonEvent::TrialRecorded {
                        comparison_id,
                        config: outcome.config,
                        trial_ref: outcome.trial_ref,
                        status: outcome.status,
                        error: outcome.error.clone(),
                    });
                    self.events.publish(ComparisonEvent::Progress {
                        comparison_id,
                        progress,
                        total,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        event = "calibra.trial.write_failed",
                        comparison_id,
                        trial_ref = %key,
                        error = %e,
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error
    }
}

fn invalid(msg: String) -> anyhow::Error {
    CalibraError::InvalidConfiguration(msg).into()
}

async fn send(tx: &mpsc::Sender<TrialOutcome>, outcome: TrialOutcome) -> anyhow::Result<()> {
    tx.send(outcome)
        .await
        .map_err(|_| anyhow::anyhow!("trial writer closed"))
}

/// Extracts, validates and (with an expected document) scores one trial. Never fails:
/// every problem becomes a failed outcome.
async fn run_trial(
    extractor: Arc<dyn Extractor>,
    scorer: Arc<dyn Scorer>,
    config: &ModelConfig,
    kind: ComparisonType,
    item: WorkItem,
    limit: Duration,
    systemic: &OnceLock<String>,
) -> TrialOutcome {
    let start = std::time::Instant::now();
    let extracted = match timeout(limit, extractor.extract(config, kind, &item.input)).await {
        Err(_) => {
            return TrialOutcome::failed(
                item.slot,
                item.trial_ref,
                format!("timeout after {}s", limit.as_secs()),
            )
        }
        Ok(Err(e)) => {
            if is_systemic(&e) {
                let _ = systemic.set(e.to_string());
            }
            return TrialOutcome::failed(item.slot, item.trial_ref, e.to_string());
        }
        Ok(Ok(x)) => x,
    };

    if !extracted.extraction.is_object() {
        return TrialOutcome::failed(
            item.slot,
            item.trial_ref,
            "malformed extraction: expected a JSON object",
        );
    }

    let latency_ms = if extracted.latency_ms > 0 {
        extracted.latency_ms
    } else {
        start.elapsed().as_millis() as u64
    };

    let mut outcome = TrialOutcome {
        config: item.slot,
        trial_ref: item.trial_ref,
        extraction: None,
        confidence: extracted.confidence,
        stage_outputs: extracted.stage_outputs,
        scores: None,
        tokens_in: extracted.tokens_in,
        tokens_out: extracted.tokens_out,
        latency_ms,
        status: TrialStatus::Completed,
        error: None,
    };

    if let Some(expected) = &item.expected {
        match scorer.score(&extracted.extraction, expected).await {
            Ok(scores) => outcome.scores = Some(scores),
            Err(e) => {
                outcome.status = TrialStatus::Failed;
                outcome.error = Some(format!("scorer error: {}", e));
            }
        }
    }
    outcome.extraction = Some(extracted.extraction);
    outcome
}
