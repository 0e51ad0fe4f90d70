use async_trait::async_trait;
use calibra_core::config::RunSettings;
use calibra_core::engine::{CancelHandle, RunOrchestrator};
use calibra_core::errors::{as_calibra_error, CalibraError};
use calibra_core::merge::FieldPreferences;
use calibra_core::model::{
    ArticleFilters, Comparison, ComparisonMode, ComparisonRequest, ComparisonStatus,
    ComparisonType, ConfigSlot, ModelConfig, NewDocument, ReviewStatus, Scores,
};
use calibra_core::providers::fake::FakeExtractor;
use calibra_core::providers::ProviderRouter;
use calibra_core::registry::ProviderRegistry;
use calibra_core::review::ReviewWorkflow;
use calibra_core::scorer_api::Scorer;
use calibra_core::storage::Store;
use serde_json::{json, Value};
use std::sync::Arc;

struct NeverCalled;

#[async_trait]
impl Scorer for NeverCalled {
    fn name(&self) -> &'static str {
        "never"
    }

    async fn score(&self, _extraction: &Value, _expected: &Value) -> anyhow::Result<Scores> {
        anyhow::bail!("calibration trials are not scored")
    }
}

fn seeded_store(docs: usize) -> anyhow::Result<Store> {
    let store = Store::memory()?;
    store.init_schema()?;
    let docs: Vec<NewDocument> = (1..=docs)
        .map(|i| NewDocument {
            source: "wire".into(),
            category: Some(if i % 2 == 0 { "sport" } else { "politics" }.into()),
            text: format!("title: Story {}\ncity: Paris\nauthor: desk {}", i, i),
        })
        .collect();
    store.insert_documents(&docs)?;
    Ok(store)
}

fn orchestrator(store: &Store) -> RunOrchestrator {
    RunOrchestrator::new(
        store.clone(),
        Arc::new(ProviderRouter::new().with("fake", Arc::new(FakeExtractor))),
        Arc::new(NeverCalled),
        ProviderRegistry::from_pairs([("fake", vec!["echo", "upper", "lossy"])]),
        RunSettings::default(),
    )
}

fn calibration_request(count: u32, filters: ArticleFilters) -> ComparisonRequest {
    ComparisonRequest {
        mode: ComparisonMode::Calibration,
        kind: ComparisonType::Schema,
        config_a: ModelConfig::new("fake", "echo"),
        config_b: ModelConfig::new("fake", "upper"),
        dataset_id: None,
        filters,
        count,
    }
}

async fn completed_calibration(store: &Store, count: u32) -> anyhow::Result<Comparison> {
    let orch = orchestrator(store);
    let c = orch.create(&calibration_request(count, ArticleFilters::default()))?;
    let done = orch.execute(c.id, &CancelHandle::new()).await?;
    assert_eq!(done.status, ComparisonStatus::Completed);
    Ok(done)
}

fn domain_error(err: &anyhow::Error) -> Option<&CalibraError> {
    as_calibra_error(err)
}

#[tokio::test]
async fn test_review_three_of_five_then_export_two() -> anyhow::Result<()> {
    let store = seeded_store(5)?;
    let c = completed_calibration(&store, 5).await?;
    assert_eq!(c.total_iterations, 10);
    assert_eq!(c.progress, 10);
    assert_eq!(c.total_reviewable, 5);
    assert!(c.summary.is_none());

    let articles = store.list_articles(c.id)?;
    assert_eq!(articles.len(), 5);
    assert!(articles
        .iter()
        .all(|a| a.trial_a.is_some() && a.trial_b.is_some()));

    let wf = ReviewWorkflow::new(store.clone());
    let docs: Vec<i64> = articles.iter().map(|a| a.document_id).collect();

    // wholesale pick of config A derives the golden document from A's extraction
    let r1 = wf.review(c.id, docs[0], Some(ConfigSlot::A), None, None)?;
    assert_eq!(r1.decision.review_status, ReviewStatus::Reviewed);
    assert_eq!(
        r1.decision.golden_extraction.as_ref(),
        articles[0].extraction(ConfigSlot::A)
    );

    let golden = json!({"title": "Story 2", "city": "Paris", "author": "Desk 2"});
    let r2 = wf.review(
        c.id,
        docs[1],
        None,
        Some(golden.clone()),
        Some("fixed author casing".into()),
    )?;
    assert_eq!(r2.decision.review_status, ReviewStatus::Reviewed);
    assert_eq!(r2.reviewed_count, 2);

    let r3 = wf.review(c.id, docs[2], None, None, Some("duplicate".into()))?;
    assert_eq!(r3.decision.review_status, ReviewStatus::Skipped);
    assert!(r3.decision.golden_extraction.is_none());
    assert_eq!(r3.reviewed_count, 3);

    // repeating a review recomputes rather than increments
    let again = wf.review(c.id, docs[2], None, None, None)?;
    assert_eq!(again.reviewed_count, 3);
    let c = store.get_comparison(c.id)?.expect("comparison");
    assert_eq!(c.reviewed_count, 3);

    let ds = wf.export_dataset(c.id, "calibrated-news", "from calibration")?;
    assert_eq!(ds.case_count, 2);
    assert_eq!(ds.source_comparison_id, Some(c.id));

    let cases = store.list_test_cases(ds.id)?;
    assert_eq!(cases.len(), 2);
    assert!(cases.iter().all(|tc| tc.importance == 1));
    assert_eq!(cases[1].expected_extraction, golden);
    assert_eq!(cases[1].input_text, articles[1].input_text);

    let c = store.get_comparison(c.id)?.expect("comparison");
    assert_eq!(c.output_dataset_id, Some(ds.id));

    let err = wf.export_dataset(c.id, "again", "").unwrap_err();
    assert_eq!(
        domain_error(&err),
        Some(&CalibraError::AlreadyExported(c.id))
    );
    assert_eq!(store.list_datasets()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_merged_review_layers_overrides_on_default() -> anyhow::Result<()> {
    let store = seeded_store(1)?;
    let c = completed_calibration(&store, 1).await?;
    let wf = ReviewWorkflow::new(store.clone());
    let doc = store.list_articles(c.id)?[0].document_id;

    let mut prefs = FieldPreferences::new();
    prefs.insert("city".into(), ConfigSlot::B);
    let r = wf.review_merged(c.id, doc, &prefs, ConfigSlot::A, None)?;

    assert_eq!(r.decision.chosen_config, Some(ConfigSlot::A));
    assert_eq!(
        r.decision.golden_extraction,
        Some(json!({"author": "desk 1", "city": "PARIS", "title": "Story 1"}))
    );
    Ok(())
}

#[tokio::test]
async fn test_export_without_reviews_is_rejected() -> anyhow::Result<()> {
    let store = seeded_store(2)?;
    let c = completed_calibration(&store, 2).await?;
    let wf = ReviewWorkflow::new(store.clone());

    let err = wf.export_dataset(c.id, "empty", "").unwrap_err();
    assert_eq!(
        domain_error(&err),
        Some(&CalibraError::NothingToExport(c.id))
    );
    assert!(store.list_datasets()?.is_empty());

    // skipped-only reviews count as acted on but produce no cases
    let doc = store.list_articles(c.id)?[0].document_id;
    wf.review(c.id, doc, None, None, None)?;
    let ds = wf.export_dataset(c.id, "skips", "")?;
    assert_eq!(ds.case_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_null_golden_is_not_a_golden_document() -> anyhow::Result<()> {
    let store = seeded_store(2)?;
    let c = completed_calibration(&store, 2).await?;
    let wf = ReviewWorkflow::new(store.clone());
    let docs: Vec<i64> = store
        .list_articles(c.id)?
        .iter()
        .map(|a| a.document_id)
        .collect();

    let r = wf.review(c.id, docs[0], None, Some(Value::Null), None)?;
    assert_eq!(r.decision.review_status, ReviewStatus::Skipped);
    assert!(r.decision.golden_extraction.is_none());

    // with a chosen config the null is replaced by that config's extraction
    let r = wf.review(c.id, docs[1], Some(ConfigSlot::B), Some(Value::Null), None)?;
    assert_eq!(r.decision.review_status, ReviewStatus::Reviewed);
    assert!(r.decision.golden_extraction.as_ref().is_some_and(Value::is_object));

    let ds = wf.export_dataset(c.id, "no-nulls", "")?;
    assert_eq!(ds.case_count, 1);
    let cases = store.list_test_cases(ds.id)?;
    assert!(cases.iter().all(|tc| tc.expected_extraction.is_object()));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_export_succeeds_once() -> anyhow::Result<()> {
    let store = seeded_store(3)?;
    let c = completed_calibration(&store, 3).await?;
    let wf = ReviewWorkflow::new(store.clone());
    for a in store.list_articles(c.id)? {
        wf.review(c.id, a.document_id, Some(ConfigSlot::B), None, None)?;
    }

    let results: Vec<anyhow::Result<_>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let wf = ReviewWorkflow::new(store.clone());
                let id = c.id;
                s.spawn(move || wf.export_dataset(id, &format!("export-{}", i), ""))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("export thread panicked"))
            .collect()
    });

    let ok: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].case_count, 3);
    for r in results.iter().filter(|r| r.is_err()) {
        let err = r.as_ref().unwrap_err();
        assert_eq!(
            domain_error(err),
            Some(&CalibraError::AlreadyExported(c.id))
        );
    }
    assert_eq!(store.list_datasets()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_reviews_require_completed_calibration() -> anyhow::Result<()> {
    let store = seeded_store(2)?;
    let orch = orchestrator(&store);
    let pending = orch.create(&calibration_request(2, ArticleFilters::default()))?;
    let wf = ReviewWorkflow::new(store.clone());

    let doc = store.list_articles(pending.id)?[0].document_id;
    let err = wf
        .review(pending.id, doc, Some(ConfigSlot::A), None, None)
        .unwrap_err();
    assert!(matches!(
        domain_error(&err),
        Some(CalibraError::InvalidState(_))
    ));

    let done = completed_calibration(&store, 2).await?;
    let err = wf
        .review(done.id, 9_999, Some(ConfigSlot::A), None, None)
        .unwrap_err();
    assert!(matches!(domain_error(&err), Some(CalibraError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_sampling_honors_filters_and_reports_shortfall() -> anyhow::Result<()> {
    let store = seeded_store(5)?;
    let orch = orchestrator(&store);

    let c = orch.create(&calibration_request(
        10,
        ArticleFilters {
            source: Some("wire".into()),
            category: Some("sport".into()),
        },
    ))?;
    assert_eq!(c.total_reviewable, 2);
    assert_eq!(c.total_iterations, 4);
    assert!(c.message.contains("only 2 of 10"));

    let texts: Vec<String> = store
        .list_articles(c.id)?
        .into_iter()
        .map(|a| a.input_text)
        .collect();
    assert!(texts.iter().all(|t| t.contains("Story 2") || t.contains("Story 4")));
    Ok(())
}
