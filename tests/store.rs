use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::Result;
use serde_json::json;
use vizcheck_lib::db::{
    latest_version, ChangeHub, Comparison, ComparisonDetails, ComparisonStatus, Database,
    MetadataBundle, MetadataKey, LEGACY_DETAILS_FILE, LEGACY_REPORT_FILE,
};

fn open(dir: &tempfile::TempDir) -> Result<Database> {
    Database::open(dir.path(), ChangeHub::new())
}

fn comparison(id: &str, name: &str, status: ComparisonStatus, timestamp: i64) -> Comparison {
    Comparison::new(id, name, status, format!("{name}|sig"), timestamp)
}

fn details_with_clusters() -> ComparisonDetails {
    ComparisonDetails {
        diff_clusters: vec![json!({"x": 1, "y": 2, "size": 40})],
        ..ComparisonDetails::default()
    }
}

#[tokio::test]
async fn fresh_store_reads_as_uninitialized() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open(&dir)?;

    assert!(db.read_report_data().await?.is_none());

    db.reset_report_data().await?;
    let state = db.read_report_data().await?.expect("initialized after a write");
    assert!(state.comparisons.is_empty());
    assert_eq!(state.summary.total, 0);
    Ok(())
}

#[tokio::test]
async fn upsert_keeps_first_initial_status() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open(&dir)?;

    db.upsert_comparison(&comparison("a", "home", ComparisonStatus::Failed, 1))
        .await?;
    let mut update = comparison("a", "home", ComparisonStatus::Accepted, 1);
    update.initial_status = ComparisonStatus::Accepted;
    let stored = db.upsert_comparison(&update).await?;

    assert_eq!(stored.status, ComparisonStatus::Accepted);
    assert_eq!(stored.initial_status, ComparisonStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn replace_then_read_round_trips() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open(&dir)?;
    db.upsert_comparison(&comparison("old", "gone", ComparisonStatus::Passed, 0))
        .await?;

    let records = vec![
        comparison("a", "home", ComparisonStatus::Passed, 1),
        comparison("b", "cart", ComparisonStatus::Failed, 2),
        comparison("c", "menu", ComparisonStatus::Error, 3),
    ];
    let mut details = HashMap::new();
    details.insert("b".to_string(), details_with_clusters());
    details.insert("orphan".to_string(), details_with_clusters());
    db.replace_report_data(records, details).await?;

    let state = db.read_report_data().await?.expect("initialized");
    let ids: Vec<&str> = state.comparisons.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(state.summary.total, 3);
    assert_eq!(state.summary.passed, 1);
    assert_eq!(state.summary.failed, 1);
    assert_eq!(state.summary.errors, 1);

    assert_eq!(db.get_comparison_details("b").await?, Some(details_with_clusters()));
    assert_eq!(db.get_comparison_details("a").await?, None);
    assert_eq!(db.get_comparison_details("orphan").await?, None);
    assert!(db.get_comparison("old").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn lookup_by_id_signature_or_name() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open(&dir)?;
    let stored = db
        .upsert_comparison(&comparison("id-1", "checkout", ComparisonStatus::Passed, 1))
        .await?;

    for value in ["id-1", "checkout|sig", "checkout"] {
        let found = db.get_comparison_by_id_or_signature_or_name(value).await?;
        assert_eq!(found.as_ref().map(|c| c.id.as_str()), Some("id-1"), "{value}");
    }
    assert_eq!(db.get_comparison_by_signature("checkout|sig").await?, Some(stored));
    assert!(db.get_comparison_by_id_or_signature_or_name("nope").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn delete_removes_details_too() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open(&dir)?;
    db.record_comparison(
        &comparison("a", "home", ComparisonStatus::Failed, 1),
        Some(details_with_clusters()),
    )
    .await?;
    assert!(db.get_comparison_details("a").await?.is_some());

    assert!(db.delete_comparison("a").await?);
    assert!(db.get_comparison("a").await?.is_none());
    assert!(db.get_comparison_details("a").await?.is_none());
    assert!(!db.delete_comparison("a").await?);
    Ok(())
}

#[tokio::test]
async fn details_have_their_own_lifecycle() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open(&dir)?;

    db.upsert_comparison_details("a", &details_with_clusters()).await?;
    assert!(db.get_comparison_details("a").await?.is_some());
    assert!(db.remove_comparison_details("a").await?);
    assert!(!db.remove_comparison_details("a").await?);
    Ok(())
}

#[tokio::test]
async fn metadata_bundles_are_independent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open(&dir)?;
    let bundle = MetadataBundle::new(None, json!({"count": 2}), json!({"hotspots": [1, 2]}));

    db.set_metadata(MetadataKey::Hotspot, &bundle).await?;
    assert_eq!(db.get_metadata(MetadataKey::Hotspot).await?, Some(bundle));
    assert_eq!(db.get_metadata(MetadataKey::Region).await?, None);

    assert!(db.remove_metadata(MetadataKey::Hotspot).await?);
    assert_eq!(db.get_metadata(MetadataKey::Hotspot).await?, None);
    Ok(())
}

#[tokio::test]
async fn reopening_runs_no_migrations() -> Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let db = open(&dir)?;
        assert_eq!(db.migrations_applied_on_open(), &[1, 2]);
        db.close();
    }

    let db = open(&dir)?;
    assert!(db.migrations_applied_on_open().is_empty());
    assert_eq!(db.get_schema_version().await?, 2);
    assert_eq!(latest_version(), 2);
    Ok(())
}

#[tokio::test]
async fn legacy_report_is_imported_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let report = json!({
        "timestamp": 1000,
        "comparisons": [
            {
                "id": "legacy-a",
                "name": "home",
                "status": "failed",
                "properties": {"properties": {"browser": "chrome", "viewport_width": 1280, "viewport_height": 720}},
                "diffPercentage": 4.5,
                "diffClusters": [{"x": 0, "y": 0}]
            },
            {"id": "legacy-b", "name": "cart", "status": "passed"},
            {"name": 42}
        ]
    });
    std::fs::write(dir.path().join(LEGACY_REPORT_FILE), report.to_string())?;
    std::fs::write(
        dir.path().join(LEGACY_DETAILS_FILE),
        json!({"legacy-b": {"confirmedRegions": [{"label": "header"}]}}).to_string(),
    )?;

    {
        let db = open(&dir)?;
        let state = db.read_report_data().await?.expect("imported");
        assert_eq!(state.comparisons.len(), 2);

        let home = db.get_comparison("legacy-a").await?.expect("home imported");
        assert_eq!(home.properties.browser.as_deref(), Some("chrome"));
        assert_eq!(home.properties.viewport_label().as_deref(), Some("1280x720"));
        assert!(home.has_diff_clusters);

        let cart = db.get_comparison("legacy-b").await?.expect("cart imported");
        assert!(cart.has_confirmed_regions);
        assert!(db.get_comparison_details("legacy-b").await?.is_some());

        db.delete_comparison("legacy-b").await?;
        db.close();
    }

    // Legacy files still present: the marker keeps them from coming back.
    let db = open(&dir)?;
    assert!(db.get_comparison("legacy-b").await?.is_none());
    assert!(db.get_comparison("legacy-a").await?.is_some());

    // Files gone: data stays.
    db.close();
    std::fs::remove_file(dir.path().join(LEGACY_REPORT_FILE))?;
    let db = open(&dir)?;
    assert_eq!(db.list_comparisons().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unparsable_legacy_files_do_not_block_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join(LEGACY_REPORT_FILE), "{ not json")?;
    std::fs::write(dir.path().join("hotspots.json"), "[1, 2")?;

    let db = open(&dir)?;
    assert!(db.read_report_data().await?.is_none());
    assert!(db.get_metadata(MetadataKey::Hotspot).await?.is_none());
    db.close();

    // A now-valid file is still not read: the attempt was recorded.
    std::fs::write(
        dir.path().join(LEGACY_REPORT_FILE),
        json!({"comparisons": [{"name": "home", "status": "passed"}]}).to_string(),
    )?;
    let db = open(&dir)?;
    assert!(db.read_report_data().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn legacy_rows_the_store_cannot_hold_do_not_block_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let report = r#"{"comparisons": [
        {"id": "ok", "name": "home", "status": "passed"},
        {"id": "huge", "name": "cart", "status": "failed", "diffCount": 18446744073709551615}
    ]}"#;
    std::fs::write(dir.path().join(LEGACY_REPORT_FILE), report)?;

    let db = open(&dir)?;
    assert!(db.read_report_data().await?.is_none());
    assert!(db.get_comparison("ok").await?.is_none());

    db.upsert_comparison(&comparison("a", "home", ComparisonStatus::Passed, 1))
        .await?;
    db.close();

    // The attempt was recorded, so the next open neither retries nor fails.
    let db = open(&dir)?;
    let ids: Vec<String> = db.list_comparisons().await?.into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec!["a".to_string()]);
    Ok(())
}

#[tokio::test]
async fn legacy_metadata_imports_per_bundle() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("regions.json"),
        json!({"downloadedAt": "2024-05-01T10:00:00Z", "summary": {"total": 1}, "regions": {"home": []}})
            .to_string(),
    )?;

    let db = open(&dir)?;
    let region = db.get_metadata(MetadataKey::Region).await?.expect("region imported");
    assert_eq!(region.summary, json!({"total": 1}));
    assert_eq!(region.payload, json!({"home": []}));
    assert!(region.downloaded_at.is_some());
    assert!(db.get_metadata(MetadataKey::Baseline).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn subscribers_hear_committed_writes_until_unsubscribed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open(&dir)?;
    let calls = Arc::new(AtomicUsize::new(0));

    let subscription = {
        let calls = Arc::clone(&calls);
        db.subscribe(move || {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    };

    db.upsert_comparison(&comparison("a", "home", ComparisonStatus::Passed, 1))
        .await?;
    db.read_report_data().await?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    db.reset_report_data().await?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn removing_nothing_wakes_no_subscriber() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open(&dir)?;
    let calls = Arc::new(AtomicUsize::new(0));
    let _subscription = {
        let calls = Arc::clone(&calls);
        db.subscribe(move || {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    };

    assert!(!db.remove_metadata(MetadataKey::Region).await?);
    assert!(!db.remove_comparison_details("missing").await?);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    db.upsert_comparison_details("a", &details_with_clusters()).await?;
    assert!(db.remove_comparison_details("a").await?);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn second_handle_reads_while_first_writes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let writer = open(&dir)?;
    let reader = open(&dir)?;
    assert!(reader.migrations_applied_on_open().is_empty());

    let writes = async {
        for i in 0..50 {
            let (id, name) = (format!("c{i}"), format!("page{i}"));
            writer
                .upsert_comparison(&comparison(&id, &name, ComparisonStatus::Passed, i))
                .await?;
        }
        Ok::<_, anyhow::Error>(())
    };
    let reads = async {
        let mut seen = 0;
        for _ in 0..50 {
            if let Some(state) = reader.read_report_data().await? {
                assert!(state.comparisons.len() >= seen, "reads went backwards");
                seen = state.comparisons.len();
            }
        }
        Ok::<_, anyhow::Error>(())
    };
    let (written, read) = tokio::join!(writes, reads);
    written?;
    read?;

    let state = reader.read_report_data().await?.expect("initialized by the writer");
    assert_eq!(state.comparisons.len(), 50);
    writer.close();
    reader.close();
    Ok(())
}

#[tokio::test]
async fn close_releases_subscribers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = ChangeHub::new();
    let db = Database::open(dir.path(), hub.clone())?;
    let _subscription = db.subscribe(|| {});
    assert_eq!(hub.listener_count(), 1);

    db.close();
    assert!(hub.is_closed());
    assert_eq!(hub.listener_count(), 0);
    assert!(db.list_comparisons().await.is_err());
    Ok(())
}
