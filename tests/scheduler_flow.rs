//! Scheduler behaviour against a mock release registry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zio::UpdateScheduler;
use zio::update::{ReleaseClient, UpdateManager};

const RELEASES_PATH: &str = "/repos/zio-labs/zio-booster/releases";

fn manager(dir: &tempfile::TempDir, server: &MockServer, interval_hours: f64) -> Arc<UpdateManager> {
    let install = dir.path().join("zio");
    std::fs::create_dir_all(&install).unwrap();
    let manager = UpdateManager::open(
        dir.path().join("version.json"),
        install,
        "zio-labs/zio-booster",
    )
    .unwrap()
    .with_release_client(ReleaseClient::with_api_base(server.uri()).unwrap());
    manager.set_check_interval_hours(interval_hours).unwrap();
    Arc::new(manager)
}

async fn registry_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == RELEASES_PATH)
        .count()
}

#[tokio::test]
async fn scheduler_checks_on_its_own_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = UpdateScheduler::new(manager(&dir, &server, 0.0))
        .with_interval(Duration::from_millis(100))
        .with_tick(Duration::from_millis(10));

    scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;
    scheduler.stop().await;

    let checks = registry_requests(&server).await;
    assert!((2..=6).contains(&checks), "unexpected check count {checks}");

    // Nothing runs after stop.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(registry_requests(&server).await, checks);
}

#[tokio::test]
async fn scheduler_survives_registry_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = UpdateScheduler::new(manager(&dir, &server, 0.0))
        .with_interval(Duration::ZERO)
        .with_tick(Duration::from_millis(10));

    scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(scheduler.is_running());
    scheduler.stop().await;

    assert!(registry_requests(&server).await >= 2);
}

#[tokio::test]
async fn manager_due_gate_still_applies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    // Fresh config is due once; afterwards the 24h interval holds.
    let mut scheduler = UpdateScheduler::new(manager(&dir, &server, 24.0))
        .with_interval(Duration::ZERO)
        .with_tick(Duration::from_millis(10));

    scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.stop().await;

    assert_eq!(registry_requests(&server).await, 1);
}

#[tokio::test]
async fn default_interval_runs_a_check_every_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    // 300ms, shared by the scheduler timer and the manager's due gate.
    let manager = manager(&dir, &server, 0.3 / 3600.0);
    let mut scheduler = UpdateScheduler::new(manager).with_tick(Duration::from_millis(10));

    scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(1700)).await;
    scheduler.stop().await;

    // Roughly one check per 310ms; skipping every other due check gives 3.
    let checks = registry_requests(&server).await;
    assert!(checks >= 5, "only {checks} registry checks in 1.7s");
}
