//! One worker process slot.
//!
//! A slot keeps the OS child, the rendezvous socket path the child connects
//! back on, the connection state, and a generation counter that increments
//! every time the slot is respawned. Events from a connection belonging to an
//! older generation are stale and must be ignored.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::info;

use super::channel::Channel;

// ============================================================================
// Worker identity
// ============================================================================

/// Index of a worker slot, stable across respawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Lifecycle of a slot. `Ready` is reached only when the child makes its
/// rendezvous connection; a child that exits or corrupts its stream becomes
/// `Terminated` and stays out of rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Spawned,
    Ready,
    Terminated,
}

// ============================================================================
// Worker slot
// ============================================================================

pub(crate) struct Worker {
    pub id: WorkerId,
    pub state: WorkerState,
    pub generation: u32,
    pub socket_path: PathBuf,
    pub child: Option<Child>,
    pub channel: Option<Channel>,
}

/// Launches the interpreter on the worker script. The rendezvous socket path
/// is the script's single argument; stdin and stdout are unused and closed,
/// stderr stays attached so interpreter errors are visible.
fn launch(python: &Path, script: &Path, socket: &Path) -> io::Result<Child> {
    Command::new(python)
        .arg(script)
        .arg(socket)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
}

impl Worker {
    pub(crate) fn spawn(
        id: WorkerId,
        python: &Path,
        script: &Path,
        socket: PathBuf,
    ) -> io::Result<Worker> {
        let child = launch(python, script, &socket)?;
        info!(worker = %id, pid = child.id(), "spawned worker process");
        Ok(Worker {
            id,
            state: WorkerState::Spawned,
            generation: 0,
            socket_path: socket,
            child: Some(child),
            channel: None,
        })
    }

    /// Replaces a terminated slot with a fresh child pointed at the slot's
    /// own rendezvous socket. The generation bump invalidates any events
    /// still in flight from the old connection.
    pub(crate) fn respawn(&mut self, python: &Path, script: &Path) -> io::Result<()> {
        self.terminate();
        let child = launch(python, script, &self.socket_path)?;
        info!(worker = %self.id, pid = child.id(), "respawned worker process");
        self.child = Some(child);
        self.channel = None;
        self.state = WorkerState::Spawned;
        self.generation += 1;
        Ok(())
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state == WorkerState::Ready && self.channel.is_some()
    }

    /// Attaches a freshly accepted connection and moves the slot to `Ready`.
    pub(crate) fn attach(&mut self, channel: Channel) {
        self.channel = Some(channel);
        self.state = WorkerState::Ready;
    }

    /// Drops the connection and marks the slot dead. The child, if it is
    /// somehow still running, is killed so a corrupt stream cannot linger.
    pub(crate) fn terminate(&mut self) {
        self.state = WorkerState::Terminated;
        self.channel = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Non-blocking check whether the child has exited.
    pub(crate) fn poll_exit(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(status) => status,
            Err(_) => None,
        }
    }
}
