use crate::core::{CountError, Result, worker_port};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::info;

/// A launched worker process.
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id, if the process is still running.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit; returns its exit code when it has one.
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Kill the process and reap it.
    async fn stop(&mut self) -> Result<()>;
}

/// Launches worker processes for addresses named in the config.
#[async_trait]
pub trait WorkerProcessSupervisor: Send + Sync {
    async fn start(&self, address: &str, log_dir: &Path) -> Result<Box<dyn WorkerProcess>>;
}

/// Runs workers as local child processes.
///
/// The command is `<program> <args..> --port <port>`, with stdout written to
/// `<log_dir>/<port>`. Only the port of the address is used, so workers always bind locally.
#[derive(Debug, Clone)]
pub struct LocalProcessSupervisor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl LocalProcessSupervisor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Relaunch the running binary in worker mode against the same config file.
    pub fn current_exe(config_path: &Path) -> Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program)
            .arg("--config")
            .arg(config_path)
            .arg("worker"))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl WorkerProcessSupervisor for LocalProcessSupervisor {
    async fn start(&self, address: &str, log_dir: &Path) -> Result<Box<dyn WorkerProcess>> {
        let port = worker_port(address)?;
        let spawn_error = |e: std::io::Error| {
            CountError::Spawn(format!("{} (port {}): {}", self.program.display(), port, e))
        };

        tokio::fs::create_dir_all(log_dir).await.map_err(spawn_error)?;
        let log_path = log_dir.join(port.to_string());
        let log = tokio::fs::File::create(&log_path)
            .await
            .map_err(spawn_error)?
            .into_std()
            .await;

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .spawn()
            .map_err(spawn_error)?;

        info!(
            port,
            pid = child.id(),
            log = %log_path.display(),
            "worker process started"
        );
        Ok(Box::new(LocalWorkerProcess { child }))
    }
}

struct LocalWorkerProcess {
    child: Child,
}

#[async_trait]
impl WorkerProcess for LocalWorkerProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    async fn stop(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_worker_stdout_goes_to_port_log() {
        let dir = TempDir::new().unwrap();
        let supervisor = LocalProcessSupervisor::new("sh")
            .arg("-c")
            .arg("echo \"$@\"")
            .arg("countd");

        let mut process = supervisor
            .start("http://localhost:5107", &dir.path().join("logs"))
            .await
            .unwrap();
        assert_eq!(process.wait().await.unwrap(), Some(0));

        let log = std::fs::read_to_string(dir.path().join("logs").join("5107")).unwrap();
        assert_eq!(log.trim(), "--port 5107");
    }

    #[tokio::test]
    async fn test_stop_kills_running_worker() {
        let dir = TempDir::new().unwrap();
        // sh swallows the trailing --port argument
        let supervisor = LocalProcessSupervisor::new("sh")
            .arg("-c")
            .arg("sleep 30")
            .arg("countd");
        assert_eq!(supervisor.program(), Path::new("sh"));

        let mut process = supervisor
            .start("http://localhost:5108", dir.path())
            .await
            .unwrap();
        assert!(process.id().is_some());
        process.stop().await.unwrap();
        assert_eq!(process.wait().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let supervisor = LocalProcessSupervisor::new(dir.path().join("no-such-binary"));
        let err = supervisor
            .start("http://localhost:5109", dir.path())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CountError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_address_without_port_is_rejected() {
        let dir = TempDir::new().unwrap();
        let supervisor = LocalProcessSupervisor::new("true");
        let err = supervisor.start("not a url", dir.path()).await.err().unwrap();
        assert!(matches!(err, CountError::InvalidAddress(_)));
    }
}
