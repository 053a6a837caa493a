//! Worker process supervision.
//!
//! The supervisor owns the worker slots and their rendezvous sockets, one
//! socket per slot. It writes the embedded worker script to a scratch
//! directory, binds a listener for every slot, and launches the configured
//! number of interpreters, each with its own socket path on its command
//! line. A connection accepted on a slot's socket belongs to that slot and
//! no other. Shutdown is two-phase: a terminate signal, a grace period, then
//! a kill for anything still running.

use std::fs;
use std::path::PathBuf;
use std::process::Child;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::config::PyscoutConfig;
use crate::error::{PyscoutError, PyscoutResult};

use super::channel::{Channel, ChannelEvent};
use super::worker::{Worker, WorkerId, WorkerState};

const SCRIPT_FILE: &str = "pyscout_worker.py";

// ============================================================================
// Supervisor
// ============================================================================

pub(crate) struct Supervisor {
    workers: Vec<Worker>,
    python: PathBuf,
    script_path: PathBuf,
    grace: Duration,
    respawn_crashed: bool,
    /// Holds the scratch directory (sockets + script) until the pool is gone.
    _scratch: tempfile::TempDir,
}

impl Supervisor {
    /// Writes `script_source` into a scratch directory, binds one rendezvous
    /// socket per slot, and launches `config.worker_count` children, each
    /// given its own socket path. The listeners are handed back to the
    /// dispatch loop, index-aligned with the slots; a worker becomes `Ready`
    /// only once its child connects to its own socket.
    pub(crate) async fn start(
        config: &PyscoutConfig,
        python: PathBuf,
        script_source: &str,
    ) -> PyscoutResult<(Supervisor, Vec<UnixListener>)> {
        let scratch = match &config.socket_dir {
            Some(dir) => tempfile::Builder::new().prefix("pyscout-").tempdir_in(dir),
            None => tempfile::Builder::new().prefix("pyscout-").tempdir(),
        }
        .map_err(|source| PyscoutError::io("worker scratch directory", source))?;

        let script_path = scratch.path().join(SCRIPT_FILE);
        fs::write(&script_path, script_source)
            .map_err(|source| PyscoutError::io(script_path.display().to_string(), source))?;

        info!(
            scratch = %scratch.path().display(),
            workers = config.worker_count,
            python = %python.display(),
            "starting worker pool"
        );

        let mut workers = Vec::with_capacity(config.worker_count);
        let mut listeners = Vec::with_capacity(config.worker_count);
        for index in 0..config.worker_count {
            let socket_path = scratch.path().join(format!("worker-{index}.sock"));
            let listener = UnixListener::bind(&socket_path)
                .map_err(|source| PyscoutError::io(socket_path.display().to_string(), source))?;
            let worker = Worker::spawn(WorkerId(index as u32), &python, &script_path, socket_path)
                .map_err(|source| PyscoutError::io(python.display().to_string(), source))?;
            workers.push(worker);
            listeners.push(listener);
        }

        Ok((
            Supervisor {
                workers,
                python,
                script_path,
                grace: config.shutdown_grace(),
                respawn_crashed: config.respawn_crashed,
                _scratch: scratch,
            },
            listeners,
        ))
    }

    /// Attaches a connection accepted on a slot's own socket. A slot takes
    /// exactly one connection per spawn; anything beyond that is dropped.
    pub(crate) fn adopt(
        &mut self,
        id: WorkerId,
        stream: UnixStream,
        events: &mpsc::UnboundedSender<ChannelEvent>,
    ) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            warn!(worker = %id, "dropping rendezvous connection for an unknown slot");
            return false;
        };
        if slot.state != WorkerState::Spawned || slot.channel.is_some() {
            warn!(worker = %id, "dropping rendezvous connection; slot is not waiting for one");
            return false;
        }
        let channel = Channel::start(stream, slot.id, slot.generation, events.clone());
        slot.attach(channel);
        true
    }

    #[allow(dead_code)]
    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn ready_count(&self) -> usize {
        self.workers.iter().filter(|worker| worker.is_ready()).count()
    }

    pub(crate) fn ready_flags(&self) -> Vec<bool> {
        self.workers.iter().map(Worker::is_ready).collect()
    }

    pub(crate) fn worker_id_at(&self, index: usize) -> Option<WorkerId> {
        self.workers.get(index).map(|worker| worker.id)
    }

    pub(crate) fn channel_for(&self, id: WorkerId) -> Option<&Channel> {
        self.slot(id).and_then(|worker| worker.channel.as_ref())
    }

    pub(crate) fn state_of(&self, id: WorkerId) -> Option<WorkerState> {
        self.slot(id).map(|worker| worker.state)
    }

    pub(crate) fn generation_of(&self, id: WorkerId) -> Option<u32> {
        self.slot(id).map(|worker| worker.generation)
    }

    pub(crate) fn respawn_enabled(&self) -> bool {
        self.respawn_crashed
    }

    /// Takes a worker out of rotation and reaps its child if needed.
    pub(crate) fn mark_crashed(&mut self, id: WorkerId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.terminate();
        }
    }

    /// Launches a fresh child into a terminated slot. The new child rejoins
    /// the pool by connecting to the slot's own rendezvous socket.
    pub(crate) fn respawn(&mut self, id: WorkerId) -> std::io::Result<()> {
        let python = self.python.clone();
        let script = self.script_path.clone();
        match self.slot_mut(id) {
            Some(slot) => slot.respawn(&python, &script),
            None => Ok(()),
        }
    }

    /// Polls every live slot for an exited child. Returns the slots that died
    /// since the last sweep; the caller decides what to do about them.
    pub(crate) fn sweep(&mut self) -> Vec<(WorkerId, std::process::ExitStatus)> {
        let mut exited = Vec::new();
        for worker in &mut self.workers {
            if worker.state == WorkerState::Terminated {
                continue;
            }
            if let Some(status) = worker.poll_exit() {
                exited.push((worker.id, status));
            }
        }
        exited
    }

    /// Two-phase stop of every remaining child: terminate signal, then after
    /// the grace period a kill. Waits for all of them to be reaped.
    pub(crate) async fn shutdown(&mut self) {
        let grace = self.grace;
        let mut waits = Vec::new();
        for worker in &mut self.workers {
            worker.state = WorkerState::Terminated;
            worker.channel = None;
            if let Some(child) = worker.child.take() {
                let id = worker.id;
                send_terminate(&child);
                waits.push(tokio::task::spawn_blocking(move || reap(id, child, grace)));
            }
        }
        for wait in waits {
            let _ = wait.await;
        }
    }

    fn slot(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(id.0 as usize)
    }

    fn slot_mut(&mut self, id: WorkerId) -> Option<&mut Worker> {
        self.workers.get_mut(id.0 as usize)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            if let Some(mut child) = worker.child.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

fn send_terminate(child: &Child) {
    // SAFETY: kill(2) with a pid we own; no memory is involved.
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

fn reap(id: WorkerId, mut child: Child, grace: Duration) {
    match child.wait_timeout(grace) {
        Ok(Some(status)) => debug!(worker = %id, %status, "worker exited"),
        Ok(None) => {
            warn!(worker = %id, "worker ignored terminate signal; killing");
            let _ = child.kill();
            let _ = child.wait();
        }
        Err(error) => warn!(worker = %id, %error, "failed to wait for worker"),
    }
}

// ============================================================================
// Tests
// ============================================================================
