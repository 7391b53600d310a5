use async_trait::async_trait;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Handle to a supervised child process
#[async_trait]
pub trait ProcessHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check
    fn poll(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Ask the process to exit gracefully
    fn terminate(&mut self) -> io::Result<()>;

    /// Wait for exit for at most `timeout`. `None` means still running.
    async fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ProcessExit>>;

    async fn kill(&mut self) -> io::Result<()>;
}

/// Creates detached child processes
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Box<dyn ProcessHandle>>;
}

/// Spawns real processes through tokio.
///
/// The child's stdio is connected to the null device. Output pipes that are
/// never read fill up and stall the encoder.
#[derive(Debug, Default, Clone)]
pub struct TokioProcessSpawner;

impl ProcessSpawner for TokioProcessSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Box<dyn ProcessHandle>> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        debug!("Spawned {} (pid {:?})", program, child.id());
        Ok(Box::new(TokioProcess { child }))
    }
}

#[derive(Debug)]
pub struct TokioProcess {
    child: Child,
}

#[async_trait]
impl ProcessHandle for TokioProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn poll(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.child.try_wait()?.map(ProcessExit::from))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // Already reaped
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ProcessExit>> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => Ok(Some(status?.into())),
            Err(_) => Ok(None),
        }
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}
