//! Child-process supervision for the local binding.
//!
//! Each run is one child process. Its stdout and stderr are read line by
//! line on their own tasks and published to the run's route; when the child
//! exits (or is cancelled) both readers are drained and a single
//! `Complete` event closes the route.

use super::bus::{BusEvent, EventBus};
use super::command::build_command;
use super::{LaunchRequest, StreamEvent};
use crate::model::{RouteId, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Time a child gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Upper bound on waiting for output readers after the child is gone.
/// Grandchildren can keep the pipes open.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// ===== ProcessRegistry =====

/// Running processes by route.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    running: Mutex<HashMap<RouteId, CancellationToken>>,
}

impl ProcessRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, route: &RouteId) -> CancellationToken {
        let token = CancellationToken::new();
        self.running.lock().insert(route.clone(), token.clone());
        token
    }

    /// Signal the process on `route` to stop. Returns `false` when no such
    /// process is running.
    pub fn cancel(&self, route: &RouteId) -> bool {
        match self.running.lock().get(route) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn remove(&self, route: &RouteId) {
        self.running.lock().remove(route);
    }

    /// Whether a process is running on `route`.
    pub fn contains(&self, route: &RouteId) -> bool {
        self.running.lock().contains_key(route)
    }

    /// Number of running processes.
    pub fn len(&self) -> usize {
        self.running.lock().len()
    }

    /// True when nothing is running.
    pub fn is_empty(&self) -> bool {
        self.running.lock().is_empty()
    }
}

// ===== Spawning =====

/// Spawn `program` for `request` and supervise it on a background task.
///
/// The caller must already be subscribed to `route` on `bus`.
pub fn spawn_run(
    program: &Path,
    request: &LaunchRequest,
    route: RouteId,
    bus: Arc<EventBus>,
    registry: Arc<ProcessRegistry>,
) -> Result<(), TransportError> {
    let mut command = build_command(program, request);

    // Own process group, so cancel reaches anything the CLI spawned.
    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|err| TransportError::Spawn {
        program: program.to_path_buf(),
        reason: err.to_string(),
    })?;
    info!(
        route = %route,
        pid = ?child.id(),
        program = %program.display(),
        "Spawned CLI process"
    );

    let token = registry.register(&route);
    tokio::spawn(supervise(child, route, bus, registry, token));
    Ok(())
}

async fn supervise(
    mut child: Child,
    route: RouteId,
    bus: Arc<EventBus>,
    registry: Arc<ProcessRegistry>,
    token: CancellationToken,
) {
    let readers: Vec<JoinHandle<()>> = [
        child
            .stdout
            .take()
            .map(|out| spawn_reader(out, route.clone(), Arc::clone(&bus), StreamEvent::Output)),
        child
            .stderr
            .take()
            .map(|err| spawn_reader(err, route.clone(), Arc::clone(&bus), StreamEvent::Error)),
    ]
    .into_iter()
    .flatten()
    .collect();

    let success = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                debug!(route = %route, ?status, "CLI process exited");
                status.success()
            }
            Err(err) => {
                warn!(route = %route, error = %err, "Waiting on CLI process failed");
                false
            }
        },
        _ = token.cancelled() => {
            info!(route = %route, "Cancelling CLI process");
            terminate(&mut child).await;
            false
        }
    };

    for mut reader in readers {
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut reader).await.is_err() {
            warn!(route = %route, "Output reader did not finish, aborting it");
            reader.abort();
        }
    }

    registry.remove(&route);
    bus.publish(BusEvent::Chat {
        route,
        event: StreamEvent::Complete { success },
    });
}

fn spawn_reader<R>(
    reader: R,
    route: RouteId,
    bus: Arc<EventBus>,
    wrap: fn(String) -> StreamEvent,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    bus.publish(BusEvent::Chat {
                        route: route.clone(),
                        event: wrap(line),
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(route = %route, error = %err, "Reading CLI output failed");
                    break;
                }
            }
        }
    })
}

/// SIGTERM the process group, then SIGKILL after the grace period.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // Negative pid addresses the whole group.
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGTERM);
            }
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
                return;
            }
            debug!(pid, "CLI ignored SIGTERM, killing");
        }
    }
    if let Err(err) = child.kill().await {
        warn!(error = %err, "Killing CLI process failed");
    }
}
