mod common;

use common::{FakeCluster, item, record};
use dmt::context::Context;
use dmt::error::AppError;
use dmt::migration::{MigrationSettings, START_QUEUE_NAME};
use dmt::models::RunOutcome;
use dmt::repository::{MigrationRunRepository, establish_connection};
use dmt::services::MigrationService;
use dmt::stage::{RecordingRenderer, RenderEvent};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    runs: MigrationRunRepository,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("runs.db").display());
        let runs = MigrationRunRepository::new(establish_connection(&url).await.unwrap());
        Self { dir, runs }
    }

    fn service(&self, cluster: Arc<FakeCluster>) -> MigrationService {
        let settings = MigrationSettings {
            poll_interval: Duration::from_millis(10),
            start_timeout: Duration::from_secs(2),
            finalize_timeout: Duration::from_secs(5),
        };
        MigrationService::with_settings(cluster, self.runs.clone(), settings)
    }

    fn config_dir(&self) -> std::path::PathBuf {
        let dir = self.dir.path().join("conf");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("migration.yaml"), "source: a\ntarget: b\n").unwrap();
        dir
    }
}

fn finished_cluster() -> FakeCluster {
    FakeCluster::any_migration().with_script(vec![
        None,
        Some(record("IN_PROGRESS", vec![item("m0", "IMAP", "IN_PROGRESS")])),
        Some(record("IN_PROGRESS", vec![item("m0", "IMAP", "IN_PROGRESS")])),
        Some(record("COMPLETE", vec![item("m0", "IMAP", "COMPLETE")])),
    ])
}

#[tokio::test]
async fn start_sends_the_bundle_and_records_completion() {
    let harness = Harness::new().await;
    let cluster = Arc::new(finished_cluster());
    let renderer = RecordingRenderer::new();
    let config_dir = harness.config_dir();

    let outcome = harness
        .service(cluster.clone())
        .start(&Context::new(), &config_dir, harness.dir.path(), &renderer)
        .await
        .unwrap();
    let migration_id = outcome.migration_id.clone();
    outcome.into_result().unwrap();

    let offers = cluster.offers();
    assert_eq!(offers.len(), 1);
    let (queue, bundle) = &offers[0];
    assert_eq!(queue, START_QUEUE_NAME);
    assert_eq!(bundle["migrationId"], migration_id.as_str());
    assert_eq!(bundle["config"]["migration.yaml"], "source: a\ntarget: b\n");

    let events = renderer.events();
    assert!(events.contains(&RenderEvent::Succeeded(
        3,
        "Started the migration".to_string()
    )));
    assert!(events.contains(&RenderEvent::Succeeded(1, "Migrated IMAP: m0".to_string())));

    let run = harness.runs.get(&migration_id).await.unwrap();
    assert_eq!(run.outcome, Some(RunOutcome::Completed));
    assert_eq!(
        run.config_path.as_deref(),
        Some(config_dir.to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn start_with_empty_configuration_fails_before_sending() {
    let harness = Harness::new().await;
    let cluster = Arc::new(finished_cluster());
    let empty = harness.dir.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();

    let err = harness
        .service(cluster.clone())
        .start(&Context::new(), &empty, harness.dir.path(), &RecordingRenderer::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)), "{err}");
    assert!(cluster.offers().is_empty());
    assert!(harness.runs.latest_unfinished().await.unwrap().is_none());
}

#[tokio::test]
async fn status_watches_the_latest_unfinished_run() {
    let harness = Harness::new().await;
    harness.runs.create("older", None).await.unwrap();
    harness.runs.finish("older", RunOutcome::Failed).await.unwrap();
    harness.runs.create("mid", None).await.unwrap();
    let cluster = Arc::new(FakeCluster::new("mid").with_script(vec![
        Some(record("IN_PROGRESS", vec![item("m0", "IMAP", "IN_PROGRESS")])),
        Some(record("COMPLETE", vec![item("m0", "IMAP", "COMPLETE")])),
    ]));
    let renderer = RecordingRenderer::new();

    let outcome = harness
        .service(cluster.clone())
        .status(&Context::new(), None, harness.dir.path(), &renderer)
        .await
        .unwrap();

    assert_eq!(outcome.migration_id, "mid");
    outcome.into_result().unwrap();
    assert!(renderer.events().contains(&RenderEvent::Succeeded(
        2,
        "Found the migration in progress".to_string()
    )));
    let run = harness.runs.get("mid").await.unwrap();
    assert_eq!(run.outcome, Some(RunOutcome::Completed));
}

#[tokio::test]
async fn status_without_any_run_reports_nothing_in_progress() {
    let harness = Harness::new().await;
    let cluster = Arc::new(FakeCluster::new("mid"));

    let err = harness
        .service(cluster)
        .status(&Context::new(), None, harness.dir.path(), &RecordingRenderer::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NoMigrationInProgress), "{err}");
}

#[tokio::test]
async fn status_records_a_failed_migration_given_by_id() {
    let harness = Harness::new().await;
    let failed = common::with_field(
        record("FAILED", vec![item("m0", "IMAP", "FAILED")]),
        "errors",
        serde_json::json!(["source unreachable"]),
    );
    let cluster = Arc::new(FakeCluster::new("remote").with_record(failed));

    let outcome = harness
        .service(cluster)
        .status(
            &Context::new(),
            Some("remote".to_string()),
            harness.dir.path(),
            &RecordingRenderer::new(),
        )
        .await
        .unwrap();

    let err = outcome.into_result().unwrap_err();
    assert_eq!(err.to_string(), "* source unreachable");
    let run = harness.runs.get("remote").await.unwrap();
    assert_eq!(run.outcome, Some(RunOutcome::Failed));
}
