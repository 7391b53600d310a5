//! Mock capabilities shared by the unit tests.

use crate::camera::Camera;
use crate::probe::{HttpProbe, HttpProbeResponse, ProbeError, ProbeOutcome, ProbeScheme, StreamProbe};
use crate::supervisor::{ProcessExit, ProcessHandle, ProcessSpawner};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn camera(id: &str, source_uri: &str) -> Camera {
    Camera::new(id, format!("Camera {}", id)).with_source_uri(source_uri)
}

pub fn ok_outcome(target: &str) -> ProbeOutcome {
    let mut extra = BTreeMap::new();
    extra.insert("status_code".to_string(), 200_u16.into());
    ProbeOutcome {
        ok: true,
        scheme: ProbeScheme::Http,
        target: target.to_string(),
        checked_at: chrono::Utc::now(),
        elapsed_ms: 3,
        detail: "status_code=200".to_string(),
        extra,
    }
}

/// A listener standing in for the streaming engine, and its port
pub fn engine_listener() -> (std::net::TcpListener, u16) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Tracks how many probes are in flight at once
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyTracker {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a ConcurrencyTracker);

impl<'a> InFlight<'a> {
    fn new(tracker: &'a ConcurrencyTracker) -> Self {
        tracker.enter();
        Self(tracker)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.exit();
    }
}

pub struct MockHttpProbe {
    result: Result<u16, ProbeError>,
    delay: Duration,
    pub calls: Arc<AtomicUsize>,
    pub timeouts: Arc<Mutex<Vec<Duration>>>,
    pub tracker: Arc<ConcurrencyTracker>,
}

impl MockHttpProbe {
    pub fn status(code: u16) -> Self {
        Self {
            result: Ok(code),
            delay: Duration::ZERO,
            calls: Arc::default(),
            timeouts: Arc::default(),
            tracker: Arc::default(),
        }
    }

    pub fn failing(error: ProbeError) -> Self {
        Self {
            result: Err(error),
            ..Self::status(0)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl HttpProbe for MockHttpProbe {
    async fn probe_http(
        &self,
        _url: &str,
        timeout: Duration,
    ) -> Result<HttpProbeResponse, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().push(timeout);
        let _in_flight = InFlight::new(&self.tracker);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let code = self.result.clone()?;
        Ok(HttpProbeResponse {
            ok: (200..400).contains(&code),
            status_code: code,
            elapsed: self.delay,
        })
    }
}

pub struct MockStreamProbe {
    ready: bool,
    failing_keys: Vec<String>,
    panicking_keys: Vec<String>,
    pub keys: Arc<Mutex<Vec<String>>>,
}

impl MockStreamProbe {
    pub fn ready(ready: bool) -> Self {
        Self {
            ready,
            failing_keys: Vec::new(),
            panicking_keys: Vec::new(),
            keys: Arc::default(),
        }
    }

    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing_keys.push(key.to_string());
        self
    }

    pub fn panicking_on(mut self, key: &str) -> Self {
        self.panicking_keys.push(key.to_string());
        self
    }
}

#[async_trait]
impl StreamProbe for MockStreamProbe {
    async fn probe_stream(&self, stream_key: &str, _timeout: Duration) -> Result<bool, ProbeError> {
        self.keys.lock().push(stream_key.to_string());
        tokio::task::yield_now().await;

        if self.panicking_keys.iter().any(|k| k == stream_key) {
            panic!("readiness backend crashed on {}", stream_key);
        }
        if self.failing_keys.iter().any(|k| k == stream_key) {
            return Err(ProbeError::Transport("connection refused".to_string()));
        }
        Ok(self.ready)
    }
}

/// Shared state of one mock child process
#[derive(Debug, Default)]
pub struct MockProcessControl {
    exited: AtomicBool,
    terminated: AtomicBool,
    killed: AtomicBool,
}

impl MockProcessControl {
    /// Simulate the process exiting on its own
    pub fn exit(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

struct MockProcess {
    pid: u32,
    ignores_sigterm: bool,
    control: Arc<MockProcessControl>,
}

impl MockProcess {
    fn exit_status(&self) -> Option<ProcessExit> {
        self.control
            .exited
            .load(Ordering::SeqCst)
            .then_some(ProcessExit { code: Some(0) })
    }
}

#[async_trait]
impl ProcessHandle for MockProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn poll(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.exit_status())
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.control.terminated.store(true, Ordering::SeqCst);
        if !self.ignores_sigterm {
            self.control.exit();
        }
        Ok(())
    }

    async fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ProcessExit>> {
        if let Some(exit) = self.exit_status() {
            return Ok(Some(exit));
        }
        tokio::time::sleep(timeout).await;
        Ok(self.exit_status())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.control.killed.store(true, Ordering::SeqCst);
        self.control.exit();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockSpawner {
    fail: bool,
    ignores_sigterm: bool,
    spawned: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    controls: Arc<Mutex<Vec<Arc<MockProcessControl>>>>,
}

impl MockSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn ignoring_sigterm(mut self) -> Self {
        self.ignores_sigterm = true;
        self
    }

    pub fn spawned(&self) -> Vec<(String, Vec<String>)> {
        self.spawned.lock().clone()
    }

    pub fn control(&self, index: usize) -> Arc<MockProcessControl> {
        self.controls.lock()[index].clone()
    }
}

impl ProcessSpawner for MockSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Box<dyn ProcessHandle>> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such binary"));
        }

        self.spawned.lock().push((program.to_string(), args.to_vec()));
        let control = Arc::new(MockProcessControl::default());
        let mut controls = self.controls.lock();
        controls.push(control.clone());

        Ok(Box::new(MockProcess {
            pid: 1000 + controls.len() as u32,
            ignores_sigterm: self.ignores_sigterm,
            control,
        }))
    }
}
