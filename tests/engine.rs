use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use vizcheck_lib::{
    comparison::{
        CompareOptions, ComparisonEngine, DiffCollaborator, DiffOutcome, DiffRequest,
        ExactBytesDiff, ReportedStatus, Screenshot,
    },
    db::{ChangeHub, ComparisonStatus, Database, DiffDiagnostics},
    error::{EngineError, ValidationError},
    settings::Settings,
};

struct Harness {
    _dir: tempfile::TempDir,
    db: Database,
    engine: ComparisonEngine,
}

fn harness(differ: Arc<dyn DiffCollaborator>) -> Result<Harness> {
    let dir = tempfile::tempdir()?;
    let db = Database::open(dir.path(), ChangeHub::new())?;
    let engine = ComparisonEngine::new(db.clone(), differ, &Settings::default());
    Ok(Harness {
        _dir: dir,
        db,
        engine,
    })
}

fn shot(name: &str, image: &[u8], properties: Value) -> Screenshot {
    Screenshot {
        name: name.to_string(),
        image: image.to_vec(),
        properties,
    }
}

/// Always reports a mismatch with heavy diagnostics.
struct ClusterDiff;

#[async_trait]
impl DiffCollaborator for ClusterDiff {
    async fn compare(&self, request: DiffRequest<'_>) -> Result<DiffOutcome> {
        tokio::fs::write(request.diff_path, b"diff").await?;
        Ok(DiffOutcome {
            matched: false,
            diff_written: true,
            diff_percentage: Some(12.5),
            diff_count: Some(125),
            total_pixels: Some(1000),
            reason: Some("pixel-diff".into()),
            diagnostics: DiffDiagnostics {
                diff_clusters: Some(vec![json!({"x": 3, "y": 4})]),
                ..DiffDiagnostics::default()
            },
            ..DiffOutcome::default()
        })
    }
}

struct BrokenDiff;

#[async_trait]
impl DiffCollaborator for BrokenDiff {
    async fn compare(&self, _request: DiffRequest<'_>) -> Result<DiffOutcome> {
        Err(anyhow!("decoder exploded"))
    }
}

#[tokio::test]
async fn first_capture_becomes_baseline_then_passes() -> Result<()> {
    let h = harness(Arc::new(ExactBytesDiff))?;
    let mut events = h.engine.subscribe_events();
    let props = json!({"browser": "chrome", "viewport": {"width": 1280, "height": 720}});

    let first = h
        .engine
        .handle_screenshot(shot("home", b"v1", props.clone()), CompareOptions::default())
        .await?;
    assert_eq!(first.status, ComparisonStatus::New);
    assert_eq!(first.signature, "home|1280x720|chrome|");
    assert_eq!(first.threshold, 2.0);
    let baseline = first.baseline.clone().expect("baseline path");
    assert_eq!(tokio::fs::read(&baseline).await?, b"v1");

    let event = events.recv().await?;
    assert_eq!(event.status, ReportedStatus::New);
    assert_eq!(event.id, first.id);

    let second = h
        .engine
        .handle_screenshot(shot("home", b"v1", props), CompareOptions::default())
        .await?;
    assert_eq!(second.status, ComparisonStatus::Passed);
    assert_eq!(second.id, first.id);
    assert_eq!(second.initial_status, ComparisonStatus::New);
    assert_eq!(h.db.list_comparisons().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn failure_surfaces_as_diff_and_keeps_details_apart() -> Result<()> {
    let h = harness(Arc::new(ClusterDiff))?;
    h.engine
        .handle_screenshot(shot("cart", b"v1", Value::Null), CompareOptions::default())
        .await?;

    let mut events = h.engine.subscribe_events();
    let failed = h
        .engine
        .handle_screenshot(shot("cart", b"v2", Value::Null), CompareOptions::default())
        .await?;

    assert_eq!(failed.status, ComparisonStatus::Failed);
    assert_eq!(failed.diff_percentage, Some(12.5));
    assert!(failed.has_diff_clusters);
    assert!(!failed.has_confirmed_regions);
    assert!(failed.diff.is_some());
    assert_eq!(events.recv().await?.status, ReportedStatus::Diff);

    let details = h.db.get_comparison_details(&failed.id).await?.expect("details stored");
    assert_eq!(details.diff_clusters.len(), 1);
    Ok(())
}

#[tokio::test]
async fn differ_failure_is_persisted_as_error() -> Result<()> {
    let h = harness(Arc::new(BrokenDiff))?;
    h.engine
        .handle_screenshot(shot("menu", b"v1", Value::Null), CompareOptions::default())
        .await?;

    let errored = h
        .engine
        .handle_screenshot(shot("menu", b"v2", Value::Null), CompareOptions::default())
        .await?;
    assert_eq!(errored.status, ComparisonStatus::Error);
    assert!(errored.error.as_deref().unwrap_or_default().contains("decoder exploded"));

    let stored = h.db.get_comparison(&errored.id).await?.expect("persisted");
    assert_eq!(stored.status, ComparisonStatus::Error);

    let accept = h.engine.accept(&errored.id).await;
    assert!(matches!(
        accept,
        Err(EngineError::Validation(ValidationError::InvalidTransition { .. }))
    ));
    Ok(())
}

#[tokio::test]
async fn invalid_input_touches_nothing() -> Result<()> {
    let h = harness(Arc::new(ExactBytesDiff))?;

    let bad_name = h
        .engine
        .handle_screenshot(shot("../escape", b"x", Value::Null), CompareOptions::default())
        .await;
    assert!(matches!(bad_name, Err(ref err) if err.is_client_fault()));

    let bad_props = h
        .engine
        .handle_screenshot(shot("home", b"x", json!([1, 2])), CompareOptions::default())
        .await;
    assert!(matches!(
        bad_props,
        Err(EngineError::Validation(ValidationError::InvalidProperties(_)))
    ));

    let bad_threshold = h
        .engine
        .handle_screenshot(
            shot("home", b"x", Value::Null),
            CompareOptions {
                threshold: Some(-1.0),
                ..CompareOptions::default()
            },
        )
        .await;
    assert!(bad_threshold.is_err());

    assert!(h.db.read_report_data().await?.is_none());
    for dir in h.engine.layout().dirs() {
        assert!(!dir.exists(), "{} created", dir.display());
    }
    Ok(())
}

#[tokio::test]
async fn reject_keeps_metrics_and_accept_promotes_current() -> Result<()> {
    let h = harness(Arc::new(ExactBytesDiff))?;
    h.engine
        .handle_screenshot(shot("hero", b"old", Value::Null), CompareOptions::default())
        .await?;
    let failed = h
        .engine
        .handle_screenshot(shot("hero", b"new", Value::Null), CompareOptions::default())
        .await?;
    assert_eq!(failed.status, ComparisonStatus::Failed);

    let rejected = h.engine.reject(&failed.signature).await?;
    assert_eq!(rejected.status, ComparisonStatus::Rejected);
    assert_eq!(rejected.diff_percentage, failed.diff_percentage);
    assert_eq!(rejected.reason, failed.reason);

    let accepted = h.engine.accept("hero").await?;
    assert_eq!(accepted.status, ComparisonStatus::Accepted);
    let baseline = accepted.baseline.expect("baseline path");
    assert_eq!(tokio::fs::read(&baseline).await?, b"new");

    let passed = h
        .engine
        .handle_screenshot(shot("hero", b"new", Value::Null), CompareOptions::default())
        .await?;
    assert_eq!(passed.status, ComparisonStatus::Passed);
    Ok(())
}

#[tokio::test]
async fn passed_comparisons_cannot_be_rejected() -> Result<()> {
    let h = harness(Arc::new(ExactBytesDiff))?;
    h.engine
        .handle_screenshot(shot("nav", b"x", Value::Null), CompareOptions::default())
        .await?;
    h.engine
        .handle_screenshot(shot("nav", b"x", Value::Null), CompareOptions::default())
        .await?;

    assert!(matches!(
        h.engine.reject("nav").await,
        Err(EngineError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn unknown_targets_are_not_found() -> Result<()> {
    let h = harness(Arc::new(ExactBytesDiff))?;
    for result in [
        h.engine.accept("missing").await,
        h.engine.reject("missing").await,
        h.engine.delete("missing").await,
    ] {
        assert!(matches!(result, Err(EngineError::NotFound(ref target)) if target == "missing"));
    }
    Ok(())
}

#[tokio::test]
async fn set_baseline_mode_skips_the_differ() -> Result<()> {
    let h = harness(Arc::new(BrokenDiff))?;
    h.engine
        .handle_screenshot(shot("logo", b"v1", Value::Null), CompareOptions::default())
        .await?;

    let updated = h
        .engine
        .handle_screenshot(
            shot("logo", b"v2", Value::Null),
            CompareOptions {
                set_baseline: true,
                threshold: Some(0.5),
            },
        )
        .await?;
    assert_eq!(updated.status, ComparisonStatus::BaselineUpdated);
    assert_eq!(updated.threshold, 0.5);
    let baseline = updated.baseline.expect("baseline path");
    assert_eq!(tokio::fs::read(&baseline).await?, b"v2");
    Ok(())
}

#[tokio::test]
async fn delete_removes_row_details_and_images() -> Result<()> {
    let h = harness(Arc::new(ClusterDiff))?;
    h.engine
        .handle_screenshot(shot("card", b"v1", Value::Null), CompareOptions::default())
        .await?;
    let failed = h
        .engine
        .handle_screenshot(shot("card", b"v2", Value::Null), CompareOptions::default())
        .await?;

    let deleted = h.engine.delete(&failed.id).await?;
    assert_eq!(deleted.id, failed.id);
    assert!(h.db.get_comparison(&failed.id).await?.is_none());
    assert!(h.db.get_comparison_details(&failed.id).await?.is_none());
    for image in [&failed.current, &failed.diff].into_iter().flatten() {
        assert!(!std::path::Path::new(image).exists(), "{image} left behind");
    }
    Ok(())
}

#[tokio::test]
async fn accept_all_then_reset() -> Result<()> {
    let h = harness(Arc::new(ExactBytesDiff))?;
    for name in ["a", "b"] {
        h.engine
            .handle_screenshot(shot(name, b"v1", Value::Null), CompareOptions::default())
            .await?;
    }
    h.engine
        .handle_screenshot(shot("b", b"v2", Value::Null), CompareOptions::default())
        .await?;

    assert_eq!(h.engine.accept_all().await?, 2);
    let statuses: Vec<ComparisonStatus> = h
        .db
        .list_comparisons()
        .await?
        .into_iter()
        .map(|c| c.status)
        .collect();
    assert_eq!(statuses, vec![ComparisonStatus::Accepted; 2]);

    h.engine.reset().await?;
    let state = h.db.read_report_data().await?.expect("initialized");
    assert!(state.comparisons.is_empty());
    for dir in h.engine.layout().dirs() {
        assert!(!dir.exists());
    }
    Ok(())
}

#[tokio::test]
async fn names_that_sanitize_alike_get_their_own_baselines() -> Result<()> {
    let h = harness(Arc::new(ExactBytesDiff))?;
    let first = h
        .engine
        .handle_screenshot(shot("login form", b"AAA", Value::Null), CompareOptions::default())
        .await?;
    let second = h
        .engine
        .handle_screenshot(shot("login_form", b"BBB", Value::Null), CompareOptions::default())
        .await?;

    assert_eq!(first.status, ComparisonStatus::New);
    assert_eq!(second.status, ComparisonStatus::New);
    assert_ne!(first.baseline, second.baseline);
    assert_ne!(first.current, second.current);

    let first_current = first.current.expect("current path");
    assert_eq!(tokio::fs::read(&first_current).await?, b"AAA");
    let first_baseline = first.baseline.expect("baseline path");
    assert_eq!(tokio::fs::read(&first_baseline).await?, b"AAA");
    Ok(())
}

#[tokio::test]
async fn accept_without_a_current_image_leaves_status_alone() -> Result<()> {
    let h = harness(Arc::new(ExactBytesDiff))?;
    h.engine
        .handle_screenshot(shot("footer", b"old", Value::Null), CompareOptions::default())
        .await?;
    let failed = h
        .engine
        .handle_screenshot(shot("footer", b"new", Value::Null), CompareOptions::default())
        .await?;
    let current = failed.current.clone().expect("current path");
    tokio::fs::remove_file(&current).await?;

    assert!(matches!(
        h.engine.accept(&failed.id).await,
        Err(EngineError::MissingImage { ref id, .. }) if id == &failed.id
    ));
    let stored = h.db.get_comparison(&failed.id).await?.expect("still stored");
    assert_eq!(stored.status, ComparisonStatus::Failed);
    let baseline = stored.baseline.expect("baseline path");
    assert_eq!(tokio::fs::read(&baseline).await?, b"old");
    Ok(())
}
