use async_trait::async_trait;
use camera_fleet::probe::{HttpProbe, HttpProbeResponse, ProbeError, StreamProbe};
use camera_fleet::supervisor::{ProcessExit, ProcessHandle, ProcessSpawner};
use camera_fleet::{CameraRegistry, Config, NewCamera};
use parking_lot::Mutex;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// HTTP capability answering every request with a fixed status after `delay`,
/// recording the peak number of concurrent calls
pub struct ScriptedHttp {
    status: u16,
    delay: Duration,
    failing_urls: Vec<String>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl ScriptedHttp {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
            failing_urls: Vec::new(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls for `url` panic inside the capability
    pub fn crashing_on(mut self, url: &str) -> Self {
        self.failing_urls.push(url.to_string());
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpProbe for ScriptedHttp {
    async fn probe_http(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> Result<HttpProbeResponse, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_urls.iter().any(|u| u == url) {
            panic!("http backend crashed on {}", url);
        }

        Ok(HttpProbeResponse {
            ok: (200..400).contains(&self.status),
            status_code: self.status,
            elapsed: self.delay,
        })
    }
}

pub struct AlwaysReady;

#[async_trait]
impl StreamProbe for AlwaysReady {
    async fn probe_stream(&self, _key: &str, _timeout: Duration) -> Result<bool, ProbeError> {
        Ok(true)
    }
}

/// Exit switch of a fake encoder process
#[derive(Default)]
pub struct FakeExit(AtomicBool);

impl FakeExit {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn exited(&self) -> Option<ProcessExit> {
        self.0
            .load(Ordering::SeqCst)
            .then_some(ProcessExit { code: Some(0) })
    }
}

struct FakeEncoder {
    pid: u32,
    exit: Arc<FakeExit>,
}

#[async_trait]
impl ProcessHandle for FakeEncoder {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn poll(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.exit.exited())
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.exit.trigger();
        Ok(())
    }

    async fn wait_timeout(&mut self, _timeout: Duration) -> io::Result<Option<ProcessExit>> {
        Ok(self.exit.exited())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.exit.trigger();
        Ok(())
    }
}

/// Spawner handing out fake encoders whose exit the test controls
#[derive(Default)]
pub struct FakeSpawner {
    exits: Mutex<Vec<Arc<FakeExit>>>,
}

impl FakeSpawner {
    pub fn exit_of(&self, index: usize) -> Arc<FakeExit> {
        self.exits.lock()[index].clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.exits.lock().len()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, _program: &str, _args: &[String]) -> io::Result<Box<dyn ProcessHandle>> {
        let exit = Arc::new(FakeExit::default());
        let mut exits = self.exits.lock();
        exits.push(exit.clone());
        Ok(Box::new(FakeEncoder {
            pid: 4000 + exits.len() as u32,
            exit,
        }))
    }
}

/// Registry wired to scripted capabilities inside a scratch directory
pub struct TestFixture {
    pub dir: TempDir,
    pub video: PathBuf,
    pub http: Arc<ScriptedHttp>,
    pub spawner: Arc<FakeSpawner>,
    pub registry: CameraRegistry,
    _engine: std::net::TcpListener,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_http(ScriptedHttp::new(200), 5)
    }

    pub fn with_http(http: ScriptedHttp, max_concurrent_probes: usize) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let video = dir.path().join("video.mp4");
        std::fs::write(&video, b"not really media").expect("write video");

        let engine = std::net::TcpListener::bind("127.0.0.1:0").expect("bind engine");
        let port = engine.local_addr().expect("engine addr").port();

        let config = create_test_config(&dir, port, max_concurrent_probes);
        let http = Arc::new(http);
        let spawner = Arc::new(FakeSpawner::default());
        let registry = CameraRegistry::with_capabilities(
            &config,
            http.clone(),
            Arc::new(AlwaysReady),
            spawner.clone(),
        );

        Self {
            dir,
            video,
            http,
            spawner,
            registry,
            _engine: engine,
        }
    }

    pub fn config(&self) -> Config {
        let port = self._engine.local_addr().expect("engine addr").port();
        create_test_config(&self.dir, port, 5)
    }
}

pub fn create_test_config(dir: &TempDir, engine_port: u16, max_concurrent_probes: usize) -> Config {
    let mut config = Config::default();
    config.api.host = "127.0.0.1".to_string();
    config.api.port = 0;
    config.storage.cameras_path = dir.path().join("cameras.json");
    config.storage.streams_path = dir.path().join("streams.json");
    config.streaming.default_port = engine_port;
    config.streaming.stop_grace_period_seconds = 1;
    config.health.max_concurrent_probes = max_concurrent_probes;
    config.health.timeout_seconds = 2;
    config
}

pub fn new_camera(id: &str, source_uri: &str) -> NewCamera {
    NewCamera {
        id: id.to_string(),
        name: format!("Camera {}", id),
        network_address: "192.168.1.10".to_string(),
        geo_location: (48.85, 2.35),
        source_uri: Some(source_uri.to_string()),
        publish_uri: None,
        local_media_path: None,
    }
}
