use super::common::*;
use camera_fleet::probe::ProbeScheme;
use camera_fleet::CameraRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::test]
async fn test_add_then_remove_camera() {
    super::init_test_environment();
    let fixture = TestFixture::new();

    for id in ["c1", "c2", "c3"] {
        fixture
            .registry
            .add_camera(new_camera(id, "http://x/y"))
            .await
            .expect("Failed to add camera");
    }
    assert_eq!(fixture.registry.stats().await.total, 3);

    assert!(fixture.registry.remove_camera("c2").await);
    assert!(!fixture.registry.has_camera("c2").await);
    assert_eq!(fixture.registry.stats().await.total, 2);

    assert!(!fixture.registry.remove_camera("c2").await);
    assert_eq!(fixture.registry.stats().await.total, 2);

    let ids: Vec<String> = fixture
        .registry
        .list_cameras()
        .await
        .iter()
        .map(|c| c.id().to_string())
        .collect();
    assert_eq!(ids, vec!["c1", "c3"]);
}

#[tokio::test]
async fn test_http_probe_marks_camera_reachable() {
    super::init_test_environment();
    let fixture = TestFixture::new();

    fixture
        .registry
        .add_camera(new_camera("c1", "http://x/y"))
        .await
        .unwrap();

    let outcome = fixture.registry.probe_camera("c1", None).await.unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.scheme, ProbeScheme::Http);
    assert_eq!(outcome.extra["status_code"], 200);

    let camera = fixture.registry.get_camera("c1").await.unwrap();
    assert!(camera.reachable());
    assert_eq!(camera.last_status_code(), 200);
    assert_eq!(camera.last_probe(), Some(&outcome));
}

#[tokio::test]
async fn test_server_error_marks_camera_unreachable() {
    super::init_test_environment();
    let fixture = TestFixture::with_http(ScriptedHttp::new(503), 5);

    fixture
        .registry
        .add_camera(new_camera("c1", "http://x/y"))
        .await
        .unwrap();

    let outcome = fixture.registry.probe_camera("c1", None).await.unwrap();
    assert!(!outcome.ok);

    let camera = fixture.registry.get_camera("c1").await.unwrap();
    assert!(!camera.reachable());
    assert_eq!(camera.last_status_code(), 503);
}

#[tokio::test]
async fn test_probe_all_respects_concurrency_limit() {
    super::init_test_environment();
    let http = ScriptedHttp::new(200).with_delay(Duration::from_millis(40));
    let fixture = TestFixture::with_http(http, 3);

    for i in 0..12 {
        fixture
            .registry
            .add_camera(new_camera(&format!("cam-{}", i), &format!("http://10.0.0.{}/", i)))
            .await
            .unwrap();
    }

    let report = fixture.registry.probe_all(None).await;
    info!("Peak concurrent probes: {}", fixture.http.peak());

    assert_eq!(report.total, 12);
    assert_eq!(report.results.len(), 12);
    assert!(fixture.http.peak() <= 3);
    assert!(fixture.http.peak() >= 2);
    assert_eq!(report.online(), 12);
}

#[tokio::test]
async fn test_crashing_capability_yields_one_failure() {
    super::init_test_environment();
    let http = ScriptedHttp::new(200).crashing_on("http://bad/");
    let fixture = TestFixture::with_http(http, 2);

    for (id, uri) in [("good-1", "http://a/"), ("bad", "http://bad/"), ("good-2", "http://b/")] {
        fixture.registry.add_camera(new_camera(id, uri)).await.unwrap();
    }

    let report = fixture.registry.probe_all(None).await;
    assert_eq!(report.results.len(), 3);

    let by_id = report.by_camera_id();
    let bad = by_id["bad"];
    assert!(!bad.online);
    assert_eq!(bad.status_code, -1);
    assert!(bad.outcome.as_ref().unwrap().detail.starts_with("Panic"));

    assert!(by_id["good-1"].online);
    assert!(by_id["good-2"].online);
}

#[tokio::test]
async fn test_crash_in_single_probe_is_recorded() {
    super::init_test_environment();
    let http = ScriptedHttp::new(200).crashing_on("http://bad/");
    let fixture = TestFixture::with_http(http, 2);
    fixture
        .registry
        .add_camera(new_camera("bad", "http://bad/"))
        .await
        .unwrap();

    let outcome = fixture.registry.probe_camera("bad", None).await.unwrap();
    assert!(!outcome.ok);
    assert!(outcome.detail.starts_with("Panic: http backend crashed"));

    let camera = fixture.registry.get_camera("bad").await.unwrap();
    assert!(!camera.reachable());
    assert_eq!(camera.last_status_code(), -1);
    assert_eq!(camera.last_probe(), Some(&outcome));
}

#[tokio::test]
async fn test_save_then_load_round_trip() {
    super::init_test_environment();
    let fixture = TestFixture::new();

    fixture
        .registry
        .add_camera(new_camera("c1", "http://x/y"))
        .await
        .unwrap();
    let mut never_probed = new_camera("c2", "rtsp://127.0.0.1:8554/live/c2");
    never_probed.publish_uri = Some("rtsp://127.0.0.1:8554/live/c2".to_string());
    fixture.registry.add_camera(never_probed).await.unwrap();
    fixture.registry.probe_camera("c1", None).await.unwrap();

    fixture.registry.save().await.unwrap();
    let before = fixture.registry.list_cameras().await;

    let reloaded = CameraRegistry::with_capabilities(
        &fixture.config(),
        Arc::new(ScriptedHttp::new(200)),
        Arc::new(AlwaysReady),
        Arc::new(FakeSpawner::default()),
    );
    assert_eq!(reloaded.load().await.unwrap(), 2);
    assert_eq!(reloaded.list_cameras().await, before);

    let first: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(reloaded.cameras_path()).unwrap()).unwrap();
    reloaded.save().await.unwrap();
    let second: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(reloaded.cameras_path()).unwrap()).unwrap();
    assert_eq!(first["cameras"], second["cameras"]);
}

#[tokio::test]
async fn test_corrupt_database_keeps_cameras() {
    super::init_test_environment();
    let fixture = TestFixture::new();

    fixture
        .registry
        .add_camera(new_camera("c1", "http://x/y"))
        .await
        .unwrap();
    std::fs::write(fixture.registry.cameras_path(), "{ not json").unwrap();

    assert!(fixture.registry.load().await.is_err());
    assert!(fixture.registry.has_camera("c1").await);
}
