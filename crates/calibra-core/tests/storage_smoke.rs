use calibra_core::errors::{as_calibra_error, CalibraError};
use calibra_core::model::{
    ArticleFilters, ComparisonMode, ComparisonStatus, ComparisonTarget, ComparisonType,
    ConfigSlot, ModelConfig, NewDocument, TrialOutcome, TrialRef,
};
use calibra_core::storage::store::NewComparison;
use calibra_core::storage::Store;

fn new_comparison<'a>(
    a: &'a ModelConfig,
    b: &'a ModelConfig,
    target: &'a ComparisonTarget,
    total: u32,
) -> NewComparison<'a> {
    NewComparison {
        mode: ComparisonMode::Dataset,
        kind: ComparisonType::Schema,
        config_a: a,
        config_b: b,
        target,
        total_iterations: total,
        message: "queued",
        documents: &[],
    }
}

#[test]
fn test_storage_smoke() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let db_path = tmp.path().join("calibra.db");

    let store = Store::open(&db_path)?;
    store.init_schema()?;
    // idempotent, including migrations
    store.init_schema()?;

    let ds = store.create_dataset("smoke", "", None)?;
    assert_eq!(store.count_rows("datasets")?, 1);
    assert_eq!(store.get_dataset(ds.id)?.map(|d| d.case_count), Some(0));
    assert!(store.count_rows("users").is_err());

    let reopened = Store::open(&db_path)?;
    reopened.init_schema()?;
    assert_eq!(reopened.list_datasets()?.len(), 1);
    Ok(())
}

#[test]
fn test_trial_writes_follow_status_and_progress() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let (a, b) = (ModelConfig::new("p1", "m1"), ModelConfig::new("p1", "m2"));
    let target = ComparisonTarget::Dataset {
        dataset_id: 1,
        iterations: 1,
        case_ids: vec![1],
    };
    let c = store.create_comparison(new_comparison(&a, &b, &target, 2))?;
    let r = TrialRef::Case {
        case_id: 1,
        iteration: 0,
    };

    // pending comparisons do not accept trials
    let err = store
        .record_trial(c.id, &TrialOutcome::failed(ConfigSlot::A, r, "x"), "m")
        .unwrap_err();
    assert!(matches!(
        as_calibra_error(&err),
        Some(CalibraError::InvalidState(_))
    ));

    store.transition(c.id, ComparisonStatus::Running, "running", None)?;
    let (_, p1) = store.record_trial(c.id, &TrialOutcome::failed(ConfigSlot::A, r, "x"), "m")?;
    assert_eq!(p1, 1);

    // unique per (comparison, config, ref)
    assert!(store
        .record_trial(c.id, &TrialOutcome::failed(ConfigSlot::A, r, "x"), "m")
        .is_err());
    assert_eq!(store.get_comparison(c.id)?.map(|c| c.progress), Some(1));

    let (_, p2) = store.record_trial(c.id, &TrialOutcome::failed(ConfigSlot::B, r, "y"), "m")?;
    assert_eq!(p2, 2);

    // progress is capped at total_iterations
    let extra = TrialRef::Case {
        case_id: 2,
        iteration: 0,
    };
    assert!(store
        .record_trial(c.id, &TrialOutcome::failed(ConfigSlot::A, extra, "z"), "m")
        .is_err());

    let done = store.transition(c.id, ComparisonStatus::Completed, "completed", None)?;
    assert_eq!(done.progress, done.total_iterations);
    assert!(done.started_at.is_some() && done.finished_at.is_some());

    let err = store
        .transition(c.id, ComparisonStatus::Running, "again", None)
        .unwrap_err();
    assert!(matches!(
        as_calibra_error(&err),
        Some(CalibraError::InvalidState(_))
    ));
    Ok(())
}

#[test]
fn test_sample_documents_newest_first() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let docs: Vec<NewDocument> = ["a", "b", "c"]
        .iter()
        .map(|t| NewDocument {
            source: "feed".into(),
            category: None,
            text: format!("title: {}", t),
        })
        .collect();
    let ids = store.insert_documents(&docs)?;
    assert_eq!(ids.len(), 3);

    let picked = store.sample_documents(&ArticleFilters::default(), 2)?;
    let texts: Vec<_> = picked.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, vec!["title: c", "title: b"]);

    let none = store.sample_documents(
        &ArticleFilters {
            source: Some("other".into()),
            category: None,
        },
        5,
    )?;
    assert!(none.is_empty());
    Ok(())
}
