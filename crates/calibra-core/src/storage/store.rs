use crate::calibration::model::ComparisonSummary;
use crate::errors::CalibraError;
use crate::model::{
    ArticleFilters, CalibrationArticle, Comparison, ComparisonMode, ComparisonStatus,
    ComparisonTarget, ComparisonType, ConfigSlot, Document, ModelConfig, NewDocument,
    NewTestCase, ReviewDecision, ReviewStatus, Scores, TestCase, TestDataset, TrialOutcome,
    TrialRecord, TrialRef, TrialStatus,
};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

/// Fields fixed when a comparison row is created.
pub struct NewComparison<'a> {
    pub mode: ComparisonMode,
    pub kind: ComparisonType,
    pub config_a: &'a ModelConfig,
    pub config_b: &'a ModelConfig,
    pub target: &'a ComparisonTarget,
    pub total_iterations: u32,
    pub message: &'a str,
    /// Sampled documents (calibration mode); one review article is created per id.
    pub documents: &'a [i64],
}

const COMPARISON_COLUMNS: &str = "id, mode, kind, provider_a, model_a, provider_b, model_b, \
    target_json, status, progress, total_iterations, message, error, summary_json, \
    reviewed_count, total_reviewable, output_dataset_id, created_at, started_at, finished_at";

const TRIAL_COLUMNS: &str = "id, comparison_id, config, trial_ref, extraction_json, confidence, \
    precision, recall, f1, tokens_in, tokens_out, latency_ms, status, error, created_at, \
    stage_outputs_json";

struct ComparisonRow {
    id: i64,
    mode: String,
    kind: String,
    provider_a: String,
    model_a: String,
    provider_b: String,
    model_b: String,
    target_json: String,
    status: String,
    progress: i64,
    total_iterations: i64,
    message: String,
    error: Option<String>,
    summary_json: Option<String>,
    reviewed_count: i64,
    total_reviewable: i64,
    output_dataset_id: Option<i64>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl ComparisonRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            mode: row.get(1)?,
            kind: row.get(2)?,
            provider_a: row.get(3)?,
            model_a: row.get(4)?,
            provider_b: row.get(5)?,
            model_b: row.get(6)?,
            target_json: row.get(7)?,
            status: row.get(8)?,
            progress: row.get(9)?,
            total_iterations: row.get(10)?,
            message: row.get(11)?,
            error: row.get(12)?,
            summary_json: row.get(13)?,
            reviewed_count: row.get(14)?,
            total_reviewable: row.get(15)?,
            output_dataset_id: row.get(16)?,
            created_at: row.get(17)?,
            started_at: row.get(18)?,
            finished_at: row.get(19)?,
        })
    }

    fn into_comparison(self) -> anyhow::Result<Comparison> {
        let summary: Option<ComparisonSummary> = match self.summary_json {
            Some(s) if !s.trim().is_empty() => Some(serde_json::from_str(&s)?),
            _ => None,
        };
        Ok(Comparison {
            id: self.id,
            mode: ComparisonMode::parse(&self.mode)
                .with_context(|| format!("unknown comparison mode '{}'", self.mode))?,
            kind: ComparisonType::parse(&self.kind)
                .with_context(|| format!("unknown comparison type '{}'", self.kind))?,
            config_a: ModelConfig::new(self.provider_a, self.model_a),
            config_b: ModelConfig::new(self.provider_b, self.model_b),
            target: serde_json::from_str(&self.target_json).context("corrupt target_json")?,
            status: ComparisonStatus::parse(&self.status)
                .with_context(|| format!("unknown comparison status '{}'", self.status))?,
            progress: self.progress as u32,
            total_iterations: self.total_iterations as u32,
            message: self.message,
            error: self.error,
            summary,
            reviewed_count: self.reviewed_count as u32,
            total_reviewable: self.total_reviewable as u32,
            output_dataset_id: self.output_dataset_id,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

struct TrialRow {
    id: i64,
    comparison_id: i64,
    config: String,
    trial_ref: String,
    extraction_json: Option<String>,
    confidence: Option<f64>,
    precision: Option<f64>,
    recall: Option<f64>,
    f1: Option<f64>,
    tokens_in: i64,
    tokens_out: i64,
    latency_ms: i64,
    status: String,
    error: Option<String>,
    created_at: String,
    stage_outputs_json: Option<String>,
}

impl TrialRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            comparison_id: row.get(1)?,
            config: row.get(2)?,
            trial_ref: row.get(3)?,
            extraction_json: row.get(4)?,
            confidence: row.get(5)?,
            precision: row.get(6)?,
            recall: row.get(7)?,
            f1: row.get(8)?,
            tokens_in: row.get(9)?,
            tokens_out: row.get(10)?,
            latency_ms: row.get(11)?,
            status: row.get(12)?,
            error: row.get(13)?,
            created_at: row.get(14)?,
            stage_outputs_json: row.get(15)?,
        })
    }

    fn into_trial(self) -> anyhow::Result<TrialRecord> {
        let scores = match (self.precision, self.recall, self.f1) {
            (Some(precision), Some(recall), Some(f1)) => Some(Scores {
                precision,
                recall,
                f1,
            }),
            _ => None,
        };
        Ok(TrialRecord {
            id: self.id,
            comparison_id: self.comparison_id,
            config: ConfigSlot::parse(&self.config)
                .with_context(|| format!("unknown config slot '{}'", self.config))?,
            trial_ref: TrialRef::parse(&self.trial_ref)
                .with_context(|| format!("unknown trial ref '{}'", self.trial_ref))?,
            extraction: parse_json_opt(self.extraction_json)?,
            confidence: self.confidence,
            stage_outputs: parse_json_opt(self.stage_outputs_json)?,
            scores,
            tokens_in: self.tokens_in as u64,
            tokens_out: self.tokens_out as u64,
            latency_ms: self.latency_ms as u64,
            status: TrialStatus::parse(&self.status),
            error: self.error,
            created_at: self.created_at,
        })
    }
}

fn parse_json_opt(s: Option<String>) -> anyhow::Result<Option<serde_json::Value>> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(serde_json::from_str(&s)?)),
        _ => Ok(None),
    }
}

/// JSON `null` is stored as SQL NULL.
fn to_json_opt(v: Option<&serde_json::Value>) -> anyhow::Result<Option<String>> {
    v.filter(|v| !v.is_null())
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("store connection mutex poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trials_comparison ON trials(comparison_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source, category)",
            [],
        )?;
        Ok(())
    }

    // --- datasets ---

    pub fn create_dataset(
        &self,
        name: &str,
        description: &str,
        source_comparison_id: Option<i64>,
    ) -> anyhow::Result<TestDataset> {
        let conn = self.lock()?;
        let created_at = now_rfc3339();
        conn.execute(
            "INSERT INTO datasets(name, description, source_comparison_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, description, source_comparison_id, created_at],
        )?;
        Ok(TestDataset {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            description: description.to_string(),
            case_count: 0,
            source_comparison_id,
            created_at,
        })
    }

    pub fn get_dataset(&self, id: i64) -> anyhow::Result<Option<TestDataset>> {
        let conn = self.lock()?;
        let ds = conn
            .query_row(
                "SELECT d.id, d.name, d.description, d.source_comparison_id, d.created_at,
                        (SELECT COUNT(*) FROM test_cases c WHERE c.dataset_id = d.id)
                 FROM datasets d WHERE d.id = ?1",
                params![id],
                dataset_from_row,
            )
            .optional()?;
        Ok(ds)
    }

    pub fn list_datasets(&self) -> anyhow::Result<Vec<TestDataset>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT d.id, d.name, d.description, d.source_comparison_id, d.created_at,
                    (SELECT COUNT(*) FROM test_cases c WHERE c.dataset_id = d.id)
             FROM datasets d ORDER BY d.id",
        )?;
        let rows = stmt
            .query_map([], dataset_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn add_test_cases(&self, dataset_id: i64, cases: &[NewTestCase]) -> anyhow::Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM datasets WHERE id = ?1",
                params![dataset_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(CalibraError::NotFound(format!("dataset {}", dataset_id)).into());
        }
        insert_cases(&tx, dataset_id, cases)?;
        tx.commit()?;
        Ok(cases.len())
    }

    pub fn list_test_cases(&self, dataset_id: i64) -> anyhow::Result<Vec<TestCase>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, dataset_id, input_text, expected_json, importance
             FROM test_cases WHERE dataset_id = ?1 ORDER BY id",
        )?;
        let raw = stmt
            .query_map(params![dataset_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, dataset_id, input_text, expected, importance)| {
                Ok(TestCase {
                    id,
                    dataset_id,
                    input_text,
                    expected_extraction: serde_json::from_str(&expected)
                        .with_context(|| format!("corrupt expected_json on case {}", id))?,
                    importance,
                })
            })
            .collect()
    }

    // --- documents ---

    pub fn insert_documents(&self, docs: &[NewDocument]) -> anyhow::Result<Vec<i64>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let created_at = now_rfc3339();
        let mut ids = Vec::with_capacity(docs.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO documents(source, category, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for d in docs {
                stmt.execute(params![d.source, d.category, d.text, created_at])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    /// The `count` most recent documents matching every given filter.
    pub fn sample_documents(
        &self,
        filters: &ArticleFilters,
        count: u32,
    ) -> anyhow::Result<Vec<Document>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, category, text, created_at FROM documents
             WHERE (?1 IS NULL OR source = ?1) AND (?2 IS NULL OR category = ?2)
             ORDER BY id DESC LIMIT ?3",
        )?;
        let docs = stmt
            .query_map(params![filters.source, filters.category, count], |row| {
                Ok(Document {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    category: row.get(2)?,
                    text: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    // --- comparisons ---

    pub fn create_comparison(&self, new: NewComparison<'_>) -> anyhow::Result<Comparison> {
        let id = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO comparisons(mode, kind, provider_a, model_a, provider_b, model_b,
                        target_json, status, progress, total_iterations, message,
                        total_reviewable, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '{}', 0, ?8, ?9, ?10, ?11)",
                    ComparisonStatus::Pending.as_str()
                ),
                params![
                    new.mode.as_str(),
                    new.kind.as_str(),
                    new.config_a.provider,
                    new.config_a.model,
                    new.config_b.provider,
                    new.config_b.model,
                    serde_json::to_string(new.target)?,
                    new.total_iterations,
                    new.message,
                    new.documents.len() as i64,
                    now_rfc3339(),
                ],
            )?;
            let id = tx.last_insert_rowid();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO calibration_articles(comparison_id, document_id) VALUES (?1, ?2)",
                )?;
                for doc_id in new.documents {
                    stmt.execute(params![id, doc_id])?;
                }
            }
            tx.commit()?;
            id
        };
        self.get_comparison(id)?
            .with_context(|| format!("comparison {} vanished after insert", id))
    }

    pub fn get_comparison(&self, id: i64) -> anyhow::Result<Option<Comparison>> {
        let conn = self.lock()?;
        get_comparison_locked(&conn, id)
    }

    pub fn list_comparisons(&self) -> anyhow::Result<Vec<Comparison>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM comparisons ORDER BY id DESC",
            COMPARISON_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], ComparisonRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ComparisonRow::into_comparison).collect()
    }

    /// Moves a comparison to `to`, rejecting transitions the state machine forbids.
    pub fn transition(
        &self,
        id: i64,
        to: ComparisonStatus,
        message: &str,
        error: Option<&str>,
    ) -> anyhow::Result<Comparison> {
        let conn = self.lock()?;
        let current = get_comparison_locked(&conn, id)?
            .ok_or_else(|| CalibraError::NotFound(format!("comparison {}", id)))?;
        if !current.status.can_transition_to(to) {
            return Err(CalibraError::InvalidState(format!(
                "comparison {} cannot move from {} to {}",
                id, current.status, to
            ))
            .into());
        }

        let now = now_rfc3339();
        let started_at = match to {
            ComparisonStatus::Running => Some(now.clone()),
            _ => current.started_at.clone(),
        };
        let finished_at = if to.is_terminal() { Some(now) } else { None };

        conn.execute(
            "UPDATE comparisons SET status = ?1, message = ?2, error = ?3,
                started_at = ?4, finished_at = ?5
             WHERE id = ?6",
            params![to.as_str(), message, error, started_at, finished_at, id],
        )?;
        get_comparison_locked(&conn, id)?
            .with_context(|| format!("comparison {} vanished during transition", id))
    }

    /// Writes one trial and advances progress in a single transaction.
    ///
    /// Only a running comparison accepts trials, and progress never passes
    /// `total_iterations`. Returns the new trial id and progress.
    pub fn record_trial(
        &self,
        comparison_id: i64,
        outcome: &TrialOutcome,
        message: &str,
    ) -> anyhow::Result<(i64, u32)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let (status, progress, total): (String, i64, i64) = tx
            .query_row(
                "SELECT status, progress, total_iterations FROM comparisons WHERE id = ?1",
                params![comparison_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| CalibraError::NotFound(format!("comparison {}", comparison_id)))?;

        if status != ComparisonStatus::Running.as_str() {
            return Err(CalibraError::InvalidState(format!(
                "comparison {} is {}, trial writes are closed",
                comparison_id, status
            ))
            .into());
        }
        if progress >= total {
            return Err(CalibraError::InvalidState(format!(
                "comparison {} already recorded {} of {} trials",
                comparison_id, progress, total
            ))
            .into());
        }

        tx.execute(
            "INSERT INTO trials(comparison_id, config, trial_ref, extraction_json, confidence,
                precision, recall, f1, tokens_in, tokens_out, latency_ms, status, error,
                created_at, stage_outputs_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                comparison_id,
                outcome.config.as_str(),
                outcome.trial_ref.key(),
                to_json_opt(outcome.extraction.as_ref())?,
                outcome.confidence,
                outcome.scores.map(|s| s.precision),
                outcome.scores.map(|s| s.recall),
                outcome.scores.map(|s| s.f1),
                outcome.tokens_in as i64,
                outcome.tokens_out as i64,
                outcome.latency_ms as i64,
                outcome.status.as_str(),
                outcome.error,
                now_rfc3339(),
                to_json_opt(outcome.stage_outputs.as_ref())?,
            ],
        )
        .with_context(|| {
            format!(
                "insert trial {} {} for comparison {}",
                outcome.config,
                outcome.trial_ref.key(),
                comparison_id
            )
        })?;
        let trial_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE comparisons SET progress = progress + 1, message = ?1 WHERE id = ?2",
            params![message, comparison_id],
        )?;
        tx.commit()?;

        Ok((trial_id, (progress + 1) as u32))
    }

    pub fn set_summary(
        &self,
        comparison_id: i64,
        summary: Option<&ComparisonSummary>,
    ) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let json = summary.map(serde_json::to_string).transpose()?;
        conn.execute(
            "UPDATE comparisons SET summary_json = ?1 WHERE id = ?2",
            params![json, comparison_id],
        )?;
        Ok(())
    }

    pub fn list_trials(&self, comparison_id: i64) -> anyhow::Result<Vec<TrialRecord>> {
        let conn = self.lock()?;
        list_trials_locked(&conn, comparison_id)
    }

    // --- calibration articles & review ---

    pub fn list_articles(&self, comparison_id: i64) -> anyhow::Result<Vec<CalibrationArticle>> {
        let conn = self.lock()?;
        list_articles_locked(&conn, comparison_id, None)
    }

    pub fn get_article(
        &self,
        comparison_id: i64,
        document_id: i64,
    ) -> anyhow::Result<Option<CalibrationArticle>> {
        let conn = self.lock()?;
        Ok(list_articles_locked(&conn, comparison_id, Some(document_id))?
            .into_iter()
            .next())
    }

    /// Stores a review decision and recomputes `reviewed_count` from the article rows.
    pub fn save_review(
        &self,
        comparison_id: i64,
        document_id: i64,
        decision: &ReviewDecision,
    ) -> anyhow::Result<u32> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE calibration_articles
             SET review_status = ?1, chosen_config = ?2, golden_json = ?3, notes = ?4,
                 reviewed_at = ?5
             WHERE comparison_id = ?6 AND document_id = ?7",
            params![
                decision.review_status.as_str(),
                decision.chosen_config.map(|c| c.as_str()),
                to_json_opt(decision.golden_extraction.as_ref())?,
                decision.notes,
                decision.reviewed_at,
                comparison_id,
                document_id,
            ],
        )?;
        if updated == 0 {
            return Err(CalibraError::NotFound(format!(
                "document {} in comparison {}",
                document_id, comparison_id
            ))
            .into());
        }

        let reviewed = count_reviewed(&tx, comparison_id)?;
        tx.execute(
            "UPDATE comparisons SET reviewed_count = ?1 WHERE id = ?2",
            params![reviewed, comparison_id],
        )?;
        tx.commit()?;
        Ok(reviewed)
    }

    /// Creates a dataset from every reviewed article with a golden extraction and binds it
    /// to the comparison. Runs as one transaction; the final conditional update is the
    /// check-and-set that makes export one-shot.
    pub fn export_reviewed(
        &self,
        comparison_id: i64,
        name: &str,
        description: &str,
    ) -> anyhow::Result<TestDataset> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let (output_dataset_id, reviewed_count): (Option<i64>, i64) = tx
            .query_row(
                "SELECT output_dataset_id, reviewed_count FROM comparisons WHERE id = ?1",
                params![comparison_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| CalibraError::NotFound(format!("comparison {}", comparison_id)))?;

        if output_dataset_id.is_some() {
            return Err(CalibraError::AlreadyExported(comparison_id).into());
        }
        if reviewed_count == 0 {
            return Err(CalibraError::NothingToExport(comparison_id).into());
        }

        let created_at = now_rfc3339();
        tx.execute(
            "INSERT INTO datasets(name, description, source_comparison_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, description, comparison_id, created_at],
        )?;
        let dataset_id = tx.last_insert_rowid();

        let golden: Vec<(String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT d.text, a.golden_json
                 FROM calibration_articles a JOIN documents d ON d.id = a.document_id
                 WHERE a.comparison_id = ?1 AND a.review_status = ?2
                   AND a.golden_json IS NOT NULL AND a.golden_json <> 'null'
                 ORDER BY a.document_id",
            )?;
            let rows = stmt
                .query_map(
                    params![comparison_id, ReviewStatus::Reviewed.as_str()],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let cases = golden
            .into_iter()
            .map(|(input_text, golden_json)| {
                Ok(NewTestCase {
                    input_text,
                    expected_extraction: serde_json::from_str(&golden_json)?,
                    importance: 1,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        insert_cases(&tx, dataset_id, &cases)?;

        let bound = tx.execute(
            "UPDATE comparisons SET output_dataset_id = ?1
             WHERE id = ?2 AND output_dataset_id IS NULL",
            params![dataset_id, comparison_id],
        )?;
        if bound != 1 {
            // dropping the transaction rolls back the dataset insert
            return Err(CalibraError::AlreadyExported(comparison_id).into());
        }
        tx.commit()?;

        Ok(TestDataset {
            id: dataset_id,
            name: name.to_string(),
            description: description.to_string(),
            case_count: cases.len() as u32,
            source_comparison_id: Some(comparison_id),
            created_at,
        })
    }

    pub fn count_rows(&self, table: &str) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        if ![
            "datasets",
            "test_cases",
            "documents",
            "comparisons",
            "trials",
            "calibration_articles",
        ]
        .contains(&table)
        {
            anyhow::bail!("Invalid table name for count_rows: {}", table);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n)
    }
}

fn dataset_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TestDataset> {
    Ok(TestDataset {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        source_comparison_id: row.get(3)?,
        created_at: row.get(4)?,
        case_count: row.get::<_, i64>(5)? as u32,
    })
}

fn insert_cases(conn: &Connection, dataset_id: i64, cases: &[NewTestCase]) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO test_cases(dataset_id, input_text, expected_json, importance)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for c in cases {
        stmt.execute(params![
            dataset_id,
            c.input_text,
            serde_json::to_string(&c.expected_extraction)?,
            c.importance
        ])?;
    }
    Ok(())
}

fn count_reviewed(conn: &Connection, comparison_id: i64) -> anyhow::Result<u32> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM calibration_articles
         WHERE comparison_id = ?1 AND review_status IN (?2, ?3)",
        params![
            comparison_id,
            ReviewStatus::Reviewed.as_str(),
            ReviewStatus::Skipped.as_str()
        ],
        |r| r.get(0),
    )?;
    Ok(n as u32)
}

fn get_comparison_locked(conn: &Connection, id: i64) -> anyhow::Result<Option<Comparison>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM comparisons WHERE id = ?1", COMPARISON_COLUMNS),
            params![id],
            ComparisonRow::from_row,
        )
        .optional()?;
    row.map(ComparisonRow::into_comparison).transpose()
}

fn list_trials_locked(conn: &Connection, comparison_id: i64) -> anyhow::Result<Vec<TrialRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM trials WHERE comparison_id = ?1 ORDER BY id",
        TRIAL_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![comparison_id], TrialRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(TrialRow::into_trial).collect()
}

fn list_articles_locked(
    conn: &Connection,
    comparison_id: i64,
    only_document: Option<i64>,
) -> anyhow::Result<Vec<CalibrationArticle>> {
    type ArticleRaw = (
        i64,
        String,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    );

    let raw: Vec<ArticleRaw> = {
        let mut stmt = conn.prepare(
            "SELECT a.document_id, d.text, a.review_status, a.chosen_config, a.golden_json,
                    a.notes, a.reviewed_at
             FROM calibration_articles a JOIN documents d ON d.id = a.document_id
             WHERE a.comparison_id = ?1 AND (?2 IS NULL OR a.document_id = ?2)
             ORDER BY a.document_id",
        )?;
        let rows = stmt
            .query_map(params![comparison_id, only_document], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut trials: HashMap<(i64, ConfigSlot), TrialRecord> = HashMap::new();
    for t in list_trials_locked(conn, comparison_id)? {
        if let TrialRef::Document { document_id } = t.trial_ref {
            trials.insert((document_id, t.config), t);
        }
    }

    raw.into_iter()
        .map(
            |(document_id, text, status, chosen, golden, notes, reviewed_at)| {
                Ok(CalibrationArticle {
                    comparison_id,
                    document_id,
                    input_text: text,
                    trial_a: trials.remove(&(document_id, ConfigSlot::A)),
                    trial_b: trials.remove(&(document_id, ConfigSlot::B)),
                    review: ReviewDecision {
                        review_status: ReviewStatus::parse(&status),
                        chosen_config: chosen.as_deref().and_then(ConfigSlot::parse),
                        golden_extraction: parse_json_opt(golden)?,
                        notes,
                        reviewed_at,
                    },
                })
            },
        )
        .collect()
}
