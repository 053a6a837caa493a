//! The dispatch loop.
//!
//! One task owns all pool state: the supervisor, the request queue, the
//! pending-reply table and the round-robin cursor. Everything else talks to
//! it over channels, so there is no locking anywhere in the pool.
//!
//! Requests are stamped with a monotonically increasing id when they arrive
//! without one, queued while no worker is ready, and routed otherwise.
//! Stateless parsing spreads round-robin over the ready workers. Everything
//! that reads or builds worker-held project state is pinned to the first
//! slot, so the index a query sees is the index that was built for it.
//! Responses are matched back to their reply by id; responses that match
//! nothing are logged and dropped.

use std::collections::{HashMap, VecDeque};
use std::future::poll_fn;
use std::io;
use std::task::Poll;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use pyscout_core::message::{RequestPayload, WireRequest, WireResponse};

use super::channel::ChannelEvent;
use super::supervisor::Supervisor;
use super::worker::{WorkerId, WorkerState};

const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// The slot project-scoped requests are pinned to.
const PINNED_SLOT: usize = 0;

// ============================================================================
// Commands
// ============================================================================

pub(crate) enum PoolCommand {
    Send {
        request: WireRequest,
        reply: oneshot::Sender<WireResponse>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

struct Queued {
    request: WireRequest,
    reply: oneshot::Sender<WireResponse>,
}

struct PendingReply {
    worker: WorkerId,
    reply: oneshot::Sender<WireResponse>,
}

// ============================================================================
// Dispatcher
// ============================================================================

pub(crate) struct Dispatcher {
    supervisor: Supervisor,
    next_id: u64,
    cursor: usize,
    queue: VecDeque<Queued>,
    pending: HashMap<u64, PendingReply>,
}

impl Dispatcher {
    pub(crate) fn new(supervisor: Supervisor) -> Dispatcher {
        Dispatcher {
            supervisor,
            next_id: 1,
            cursor: 0,
            queue: VecDeque::new(),
            pending: HashMap::new(),
        }
    }

    /// Runs until a shutdown command arrives or every pool handle is dropped.
    /// `listeners` holds one rendezvous socket per worker slot, index-aligned
    /// with the supervisor's slots.
    pub(crate) async fn run(
        mut self,
        listeners: Vec<UnixListener>,
        mut commands: mpsc::UnboundedReceiver<PoolCommand>,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
        events_tx: mpsc::UnboundedSender<ChannelEvent>,
    ) {
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PoolCommand::Send { request, reply }) => self.dispatch(request, reply),
                    Some(PoolCommand::Shutdown { done }) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        debug!("all pool handles dropped; shutting down");
                        self.shutdown().await;
                        return;
                    }
                },
                (slot, accepted) = accept_any(&listeners) => match accepted {
                    Ok(stream) => {
                        let worker = WorkerId(slot as u32);
                        if self.supervisor.adopt(worker, stream, &events_tx) {
                            info!(%worker, "worker ready");
                            self.drain_queue();
                        }
                    }
                    Err(error) => warn!(%error, "rendezvous accept failed"),
                },
                Some(event) = events.recv() => self.handle_event(event),
                _ = sweep.tick() => self.sweep_children(),
            }
        }
    }

    /// Stamps the request with a fresh id if it has none, then routes it or
    /// queues it until some worker is ready.
    fn dispatch(&mut self, mut request: WireRequest, reply: oneshot::Sender<WireResponse>) {
        if request.id.is_none() {
            request.id = Some(self.next_id);
            self.next_id += 1;
        }
        if self.supervisor.ready_count() == 0 {
            debug!(
                id = request.id,
                kind = request.payload.kind(),
                queued = self.queue.len() + 1,
                "no worker ready; queueing request"
            );
            self.queue.push_back(Queued { request, reply });
            return;
        }
        self.route(request, reply);
    }

    fn route(&mut self, request: WireRequest, reply: oneshot::Sender<WireResponse>) {
        let Some(id) = request.id else {
            warn!("dropping request without an id");
            return;
        };
        let pinned = needs_project_state(&request);
        let picked = if pinned {
            self.pinned_slot()
        } else {
            pick_ready(self.cursor, &self.supervisor.ready_flags())
        };
        let Some(slot) = picked else {
            if pinned && self.pinned_slot_lost() {
                debug!(id, "index worker is gone for good; dropping reply");
                return;
            }
            self.queue.push_back(Queued { request, reply });
            return;
        };
        if !pinned {
            self.cursor = slot;
        }
        let Some(worker) = self.supervisor.worker_id_at(slot) else {
            self.queue.push_back(Queued { request, reply });
            return;
        };

        let sent = match self.supervisor.channel_for(worker) {
            Some(channel) => {
                trace!(%worker, id, kind = request.payload.kind(), "dispatching request");
                self.pending.insert(id, PendingReply { worker, reply });
                channel.send(request)
            }
            None => {
                self.queue.push_back(Queued { request, reply });
                return;
            }
        };
        if !sent {
            // The writer task is gone. The request cannot be recovered, so
            // its reply resolves as lost along with the rest of the slot's.
            warn!(%worker, id, "channel refused request");
            self.worker_lost(worker, "channel writer stopped");
        }
    }

    /// Feeds queued requests, oldest first, to whatever workers can take
    /// them. Requests whose worker is not ready go back to the queue in
    /// their original order.
    fn drain_queue(&mut self) {
        let queued: Vec<Queued> = self.queue.drain(..).collect();
        for item in queued {
            self.route(item.request, item.reply);
        }
    }

    /// The pinned slot, when its worker is ready.
    fn pinned_slot(&self) -> Option<usize> {
        let ready = self.supervisor.ready_flags();
        (ready.get(PINNED_SLOT) == Some(&true)).then_some(PINNED_SLOT)
    }

    /// True when the pinned slot's worker is terminated and will not come
    /// back, so waiting on it would hang forever.
    fn pinned_slot_lost(&self) -> bool {
        if self.supervisor.respawn_enabled() {
            return false;
        }
        match self.supervisor.worker_id_at(PINNED_SLOT) {
            Some(worker) => self.supervisor.state_of(worker) == Some(WorkerState::Terminated),
            None => true,
        }
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Inbound {
                worker,
                generation,
                message,
            } => {
                if self.is_stale(worker, generation) {
                    debug!(%worker, generation, "ignoring message from replaced connection");
                    return;
                }
                self.handle_inbound(worker, message);
            }
            ChannelEvent::Closed { worker, generation } => {
                if self.is_stale(worker, generation) {
                    return;
                }
                self.worker_lost(worker, "connection closed");
            }
            ChannelEvent::Corrupt {
                worker,
                generation,
                detail,
            } => {
                if self.is_stale(worker, generation) {
                    return;
                }
                warn!(%worker, %detail, "worker stream is corrupt");
                self.worker_lost(worker, "corrupt stream");
            }
        }
    }

    fn handle_inbound(&mut self, worker: WorkerId, message: WireResponse) {
        let Some(id) = message.id else {
            warn!(%worker, kind = message.payload.kind(), "discarding response without an id");
            return;
        };
        match self.pending.remove(&id) {
            Some(pending) => {
                trace!(%worker, id, kind = message.payload.kind(), "response delivered");
                let _ = pending.reply.send(message);
            }
            None => {
                warn!(%worker, id, "discarding stray response");
            }
        }
    }

    /// Takes a worker out of rotation: its in-flight replies resolve as lost,
    /// the child is reaped, and the slot is optionally respawned.
    fn worker_lost(&mut self, worker: WorkerId, reason: &str) {
        if self.supervisor.state_of(worker) == Some(WorkerState::Terminated) {
            return;
        }
        warn!(%worker, reason, "worker lost");

        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.worker != worker);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            warn!(%worker, dropped, "in-flight requests lost with the worker");
        }

        self.supervisor.mark_crashed(worker);
        if self.supervisor.respawn_enabled() {
            match self.supervisor.respawn(worker) {
                Ok(()) => info!(%worker, "respawning crashed worker"),
                Err(error) => warn!(%worker, %error, "failed to respawn worker"),
            }
        }
    }

    fn sweep_children(&mut self) {
        for (worker, status) in self.supervisor.sweep() {
            warn!(%worker, %status, "worker process exited unexpectedly");
            self.worker_lost(worker, "process exited");
        }
    }

    fn is_stale(&self, worker: WorkerId, generation: u32) -> bool {
        self.supervisor.generation_of(worker) != Some(generation)
    }

    async fn shutdown(&mut self) {
        if !self.queue.is_empty() || !self.pending.is_empty() {
            debug!(
                queued = self.queue.len(),
                pending = self.pending.len(),
                "abandoning outstanding requests at shutdown"
            );
        }
        self.queue.clear();
        self.pending.clear();
        self.supervisor.shutdown().await;
    }
}

// ============================================================================
// Rendezvous
// ============================================================================

/// Waits for a connection attempt on any of the per-worker rendezvous
/// sockets. The returned index names the slot whose listener fired.
async fn accept_any(listeners: &[UnixListener]) -> (usize, io::Result<UnixStream>) {
    poll_fn(|cx| {
        for (index, listener) in listeners.iter().enumerate() {
            if let Poll::Ready(result) = listener.poll_accept(cx) {
                return Poll::Ready((index, result.map(|(stream, _)| stream)));
            }
        }
        Poll::Pending
    })
    .await
}

// ============================================================================
// Worker selection
// ============================================================================

/// True for requests that read or mutate a worker's project and index state.
/// Workers keep that state in-process, so these must all land on the same
/// worker; only plain file parsing is free to go anywhere.
fn needs_project_state(request: &WireRequest) -> bool {
    !matches!(request.payload, RequestPayload::ParseFile { .. })
}

/// Advances the cursor one slot, then walks forward to the first ready
/// worker. Returns the new cursor position, which is also the chosen worker,
/// or None when nothing is ready.
fn pick_ready(mut cursor: usize, ready: &[bool]) -> Option<usize> {
    let count = ready.len();
    if count == 0 {
        return None;
    }
    for _ in 0..count {
        cursor = (cursor + 1) % count;
        if ready[cursor] {
            return Some(cursor);
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod pick_ready_tests {
        use super::*;

        #[test]
        fn rotates_over_all_ready_workers() {
            let ready = [true, true, true];
            let mut cursor = 0;
            let mut order = Vec::new();
            for _ in 0..6 {
                cursor = pick_ready(cursor, &ready).unwrap();
                order.push(cursor);
            }
            assert_eq!(order, vec![1, 2, 0, 1, 2, 0]);
        }

        #[test]
        fn skips_workers_that_are_not_ready() {
            let ready = [true, false, true];
            let mut cursor = 0;
            let mut order = Vec::new();
            for _ in 0..4 {
                cursor = pick_ready(cursor, &ready).unwrap();
                order.push(cursor);
            }
            assert_eq!(order, vec![2, 0, 2, 0]);
        }

        #[test]
        fn single_worker_is_always_chosen() {
            assert_eq!(pick_ready(0, &[true]), Some(0));
            assert_eq!(pick_ready(0, &[true]), Some(0));
        }

        #[test]
        fn nothing_ready_returns_none() {
            assert_eq!(pick_ready(0, &[false, false]), None);
            assert_eq!(pick_ready(1, &[]), None);
        }

        #[test]
        fn cursor_wraps_around_the_end() {
            assert_eq!(pick_ready(2, &[true, true, true]), Some(0));
        }
    }

    mod affinity_tests {
        use super::*;

        #[test]
        fn only_plain_parsing_escapes_the_pinned_slot() {
            let parse = WireRequest::new(RequestPayload::ParseFile {
                file_path: "/src/m.py".to_string(),
                module_name: None,
            });
            assert!(!needs_project_state(&parse));

            let pinned = [
                RequestPayload::CreateProject {
                    project_root: "/p".to_string(),
                },
                RequestPayload::RebuildSymbolIndex {
                    project_root: "/p".to_string(),
                },
                RequestPayload::UpdateSymbolIndex {
                    file_path: "/p/m.py".to_string(),
                },
                RequestPayload::Search {
                    query: "foo".to_string(),
                    file_path: None,
                    symbol_kind: None,
                },
            ];
            for payload in pinned {
                assert!(needs_project_state(&WireRequest::new(payload)));
            }
        }
    }
}
