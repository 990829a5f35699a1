use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

/// Worker program started on demand when a browser finds no free worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("a renderer launch is already in flight")]
    Busy,
    #[error("failed to spawn renderer {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Proof of ownership for the running renderer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererLease(Uuid);

struct Running {
    lease: RendererLease,
    kill: oneshot::Sender<()>,
}

/// Starts at most one renderer process at a time.
pub struct RendererLauncher {
    config: RendererConfig,
    running: Arc<Mutex<Option<Running>>>,
}

impl RendererLauncher {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            running: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn the renderer unless one is already running.
    ///
    /// The in-flight guard clears when the process exits or its lease is
    /// released. Must be called from within a Tokio runtime.
    pub fn acquire(&self) -> Result<RendererLease, LaunchError> {
        let mut running = self.running.lock();
        if running.is_some() {
            counter!("beach_pier_renderer_launches_total", 1, "result" => "busy");
            return Err(LaunchError::Busy);
        }

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| {
            counter!("beach_pier_renderer_launches_total", 1, "result" => "failed");
            LaunchError::Spawn {
                program: self.config.program.display().to_string(),
                source,
            }
        })?;

        let lease = RendererLease(Uuid::new_v4());
        let (kill_tx, kill_rx) = oneshot::channel();
        *running = Some(Running {
            lease,
            kill: kill_tx,
        });

        let pid = child.id();
        let slot = Arc::clone(&self.running);
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => info!(?pid, %status, "renderer exited"),
                    Err(err) => warn!(?pid, error = %err, "failed to wait on renderer"),
                },
                _ = kill_rx => match child.kill().await {
                    Ok(()) => info!(?pid, "renderer stopped"),
                    Err(err) => warn!(?pid, error = %err, "failed to stop renderer"),
                },
            }

            let mut running = slot.lock();
            if running.as_ref().is_some_and(|current| current.lease == lease) {
                *running = None;
            }
        });

        counter!("beach_pier_renderer_launches_total", 1, "result" => "spawned");
        info!(?pid, program = %self.config.program.display(), "renderer launched");
        Ok(lease)
    }

    /// Stop the renderer held by `lease`. Stale leases are ignored.
    pub fn release(&self, lease: RendererLease) {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|current| current.lease == lease) {
            if let Some(current) = running.take() {
                let _ = current.kill.send(());
            }
        }
    }
}
