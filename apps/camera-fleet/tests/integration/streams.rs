use super::common::*;
use camera_fleet::FleetError;

#[tokio::test]
async fn test_missing_source_is_rejected() {
    super::init_test_environment();
    let fixture = TestFixture::new();
    let missing = fixture.dir.path().join("missing.mp4");

    let result = fixture.registry.start_stream("s1", &missing, None, None).await;
    assert!(matches!(result, Err(FleetError::SourceNotFound(_))));
    assert!(fixture.registry.list_streams().await.is_empty());
    assert_eq!(fixture.spawner.spawn_count(), 0);
    assert!(!fixture.dir.path().join("streams.json").exists());
}

#[tokio::test]
async fn test_duplicate_start_then_stop() {
    super::init_test_environment();
    let fixture = TestFixture::new();

    let uri = fixture
        .registry
        .start_stream("s1", &fixture.video, None, None)
        .await
        .expect("Failed to start stream");
    assert!(uri.starts_with("rtsp://127.0.0.1:"));
    assert!(uri.ends_with("/live/s1"));

    let again = fixture.registry.start_stream("s1", &fixture.video, None, None).await;
    assert!(matches!(again, Err(FleetError::AlreadyRunning(_))));
    assert_eq!(fixture.spawner.spawn_count(), 1);

    let outcome = fixture.registry.stop_stream("s1").await.unwrap();
    assert!(!outcome.forced);
    assert!(fixture
        .registry
        .list_streams()
        .await
        .iter()
        .all(|s| s.name != "s1"));

    let stopped_again = fixture.registry.stop_stream("s1").await;
    assert!(matches!(stopped_again, Err(FleetError::NotRunning(_))));
}

#[tokio::test]
async fn test_exited_stream_is_pruned() {
    super::init_test_environment();
    let fixture = TestFixture::new();

    fixture
        .registry
        .start_stream("s1", &fixture.video, None, None)
        .await
        .unwrap();
    fixture
        .registry
        .start_stream("s2", &fixture.video, None, None)
        .await
        .unwrap();
    assert_eq!(fixture.registry.list_streams().await.len(), 2);

    fixture.spawner.exit_of(0).trigger();

    let streams = fixture.registry.list_streams().await;
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].name, "s2");

    let table = std::fs::read_to_string(fixture.dir.path().join("streams.json")).unwrap();
    assert!(!table.contains("\"s1\""));
    assert!(table.contains("\"s2\""));
}

#[tokio::test]
async fn test_unreachable_engine() {
    super::init_test_environment();
    let fixture = TestFixture::new();

    // Port 1 on loopback has no listener
    let result = fixture
        .registry
        .start_stream("s1", &fixture.video, Some("127.0.0.1"), Some(1))
        .await;
    assert!(matches!(result, Err(FleetError::EngineUnavailable(_))));
    assert_eq!(fixture.spawner.spawn_count(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_streams_and_saves() {
    super::init_test_environment();
    let fixture = TestFixture::new();

    fixture
        .registry
        .add_camera(new_camera("c1", "http://x/y"))
        .await
        .unwrap();
    fixture
        .registry
        .start_camera_stream("c1", &fixture.video, None, None)
        .await
        .unwrap();

    fixture.registry.shutdown().await.unwrap();

    assert!(fixture.registry.list_streams().await.is_empty());
    assert!(fixture.registry.cameras_path().exists());
}
