//! The duplex message channel for one worker connection.
//!
//! A [`Channel`] owns both halves of a worker's Unix socket. The writer half
//! drains an unbounded queue of requests and turns each into a length-prefixed
//! frame; the reader half reassembles inbound frames and forwards every decoded
//! response to the pool's single event subscriber. A malformed frame or payload
//! is fatal to the channel: the reader reports it once and stops, and the
//! dispatcher takes the worker out of rotation.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use pyscout_core::frame::Framer;
use pyscout_core::message::{WireRequest, WireResponse};

use super::worker::WorkerId;

const READ_CHUNK_LEN: usize = 8 * 1024;

// ============================================================================
// Channel events
// ============================================================================

/// What a channel reports back to the dispatch loop.
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    /// A complete response arrived from the worker.
    Inbound {
        worker: WorkerId,
        generation: u32,
        message: WireResponse,
    },
    /// The worker closed its end of the socket.
    Closed { worker: WorkerId, generation: u32 },
    /// The byte stream can no longer be trusted; the channel has stopped.
    Corrupt {
        worker: WorkerId,
        generation: u32,
        detail: String,
    },
}

// ============================================================================
// Channel
// ============================================================================

pub(crate) struct Channel {
    tx: mpsc::UnboundedSender<WireRequest>,
}

impl Channel {
    /// Splits `stream` and spawns the reader and writer tasks. Events for this
    /// connection carry `worker` and `generation` so the dispatcher can ignore
    /// reports from a connection that has since been replaced.
    pub(crate) fn start(
        stream: UnixStream,
        worker: WorkerId,
        generation: u32,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Channel {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(write_half, rx, worker));
        tokio::spawn(read_loop(read_half, worker, generation, events));

        Channel { tx }
    }

    /// Queues a request for the writer task. Returns false once the writer has
    /// stopped, which means the connection is gone.
    pub(crate) fn send(&self, request: WireRequest) -> bool {
        self.tx.send(request).is_ok()
    }
}

async fn write_loop(
    mut write_half: tokio::net::unix::OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WireRequest>,
    worker: WorkerId,
) {
    while let Some(request) = rx.recv().await {
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%worker, %error, "failed to serialize request");
                continue;
            }
        };
        let frame = match Framer::encode(&payload) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%worker, %error, "request does not fit in a frame");
                continue;
            }
        };
        if let Err(error) = write_half.write_all(&frame).await {
            debug!(%worker, %error, "write failed; stopping writer");
            return;
        }
    }
}

async fn read_loop(
    mut read_half: tokio::net::unix::OwnedReadHalf,
    worker: WorkerId,
    generation: u32,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut framer = Framer::new();
    let mut chunk = vec![0u8; READ_CHUNK_LEN];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) => {
                let _ = events.send(ChannelEvent::Closed { worker, generation });
                return;
            }
            Ok(read) => {
                framer.push(&chunk[..read]);
                loop {
                    match framer.next_frame() {
                        Ok(Some(frame)) => match serde_json::from_slice::<WireResponse>(&frame) {
                            Ok(message) => {
                                trace!(%worker, kind = message.payload.kind(), "inbound message");
                                let _ = events.send(ChannelEvent::Inbound {
                                    worker,
                                    generation,
                                    message,
                                });
                            }
                            Err(error) => {
                                let _ = events.send(ChannelEvent::Corrupt {
                                    worker,
                                    generation,
                                    detail: format!("malformed payload: {error}"),
                                });
                                return;
                            }
                        },
                        Ok(None) => break,
                        Err(error) => {
                            let _ = events.send(ChannelEvent::Corrupt {
                                worker,
                                generation,
                                detail: error.to_string(),
                            });
                            return;
                        }
                    }
                }
            }
            Err(error) => {
                debug!(%worker, %error, "read failed");
                let _ = events.send(ChannelEvent::Closed { worker, generation });
                return;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pyscout_core::message::{RequestPayload, ResponsePayload};

    fn encode_response(response: &WireResponse) -> Vec<u8> {
        let payload = serde_json::to_vec(response).unwrap();
        Framer::encode(&payload).unwrap()
    }

    mod writer_tests {
        use super::*;

        #[tokio::test]
        async fn requests_arrive_as_length_prefixed_frames() {
            let (ours, theirs) = UnixStream::pair().unwrap();
            let (events, _events_rx) = mpsc::unbounded_channel();
            let channel = Channel::start(ours, WorkerId(0), 0, events);

            assert!(channel.send(WireRequest {
                id: Some(9),
                payload: RequestPayload::RebuildSymbolIndex {
                    project_root: "/project".to_string(),
                },
            }));

            let mut peer = theirs;
            let mut prefix = [0u8; 4];
            peer.read_exact(&mut prefix).await.unwrap();
            let length = u32::from_be_bytes(prefix) as usize;
            let mut payload = vec![0u8; length];
            peer.read_exact(&mut payload).await.unwrap();

            let decoded: WireRequest = serde_json::from_slice(&payload).unwrap();
            assert_eq!(decoded.id, Some(9));
            assert!(matches!(
                decoded.payload,
                RequestPayload::RebuildSymbolIndex { .. }
            ));
        }
    }

    mod reader_tests {
        use super::*;

        #[tokio::test]
        async fn responses_are_reassembled_across_chunks() {
            let (ours, mut theirs) = UnixStream::pair().unwrap();
            let (events, mut events_rx) = mpsc::unbounded_channel();
            let _channel = Channel::start(ours, WorkerId(3), 1, events);

            let frame = encode_response(&WireResponse {
                id: Some(12),
                payload: ResponsePayload::UpdateSymbolIndexResponse,
            });
            let (head, tail) = frame.split_at(3);
            theirs.write_all(head).await.unwrap();
            theirs.flush().await.unwrap();
            theirs.write_all(tail).await.unwrap();

            match events_rx.recv().await.unwrap() {
                ChannelEvent::Inbound {
                    worker,
                    generation,
                    message,
                } => {
                    assert_eq!(worker, WorkerId(3));
                    assert_eq!(generation, 1);
                    assert_eq!(message.id, Some(12));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        #[tokio::test]
        async fn peer_hangup_reports_closed() {
            let (ours, theirs) = UnixStream::pair().unwrap();
            let (events, mut events_rx) = mpsc::unbounded_channel();
            let _channel = Channel::start(ours, WorkerId(1), 0, events);

            drop(theirs);
            assert!(matches!(
                events_rx.recv().await.unwrap(),
                ChannelEvent::Closed {
                    worker: WorkerId(1),
                    ..
                }
            ));
        }

        #[tokio::test]
        async fn malformed_payload_reports_corrupt_and_stops() {
            let (ours, mut theirs) = UnixStream::pair().unwrap();
            let (events, mut events_rx) = mpsc::unbounded_channel();
            let _channel = Channel::start(ours, WorkerId(2), 0, events);

            let frame = Framer::encode(b"not json").unwrap();
            theirs.write_all(&frame).await.unwrap();

            match events_rx.recv().await.unwrap() {
                ChannelEvent::Corrupt { worker, detail, .. } => {
                    assert_eq!(worker, WorkerId(2));
                    assert!(detail.contains("malformed payload"));
                }
                other => panic!("unexpected event: {other:?}"),
            }

            // The reader stopped; later frames must not produce events.
            let frame = encode_response(&WireResponse {
                id: Some(1),
                payload: ResponsePayload::CreateProjectResponse,
            });
            theirs.write_all(&frame).await.unwrap();
            assert!(events_rx.try_recv().is_err());
        }

        #[tokio::test]
        async fn oversized_declared_length_reports_corrupt() {
            let (ours, mut theirs) = UnixStream::pair().unwrap();
            let (events, mut events_rx) = mpsc::unbounded_channel();
            let _channel = Channel::start(ours, WorkerId(4), 0, events);

            theirs.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
            assert!(matches!(
                events_rx.recv().await.unwrap(),
                ChannelEvent::Corrupt { .. }
            ));
        }

        #[tokio::test]
        async fn several_responses_in_one_chunk_arrive_in_order() {
            let (ours, mut theirs) = UnixStream::pair().unwrap();
            let (events, mut events_rx) = mpsc::unbounded_channel();
            let _channel = Channel::start(ours, WorkerId(5), 0, events);

            let mut bytes = Vec::new();
            for id in [1u64, 2, 3] {
                bytes.extend_from_slice(&encode_response(&WireResponse {
                    id: Some(id),
                    payload: ResponsePayload::ParseFileResponse {
                        file: pyscout_core::descriptor::FileDescriptor {
                            file_path: "/m.py".to_string(),
                            module_name: "m".to_string(),
                            scope: pyscout_core::descriptor::ScopeDescriptor::new(
                                "m",
                                pyscout_core::descriptor::ScopeKind::Module,
                            ),
                        },
                    },
                }));
            }
            theirs.write_all(&bytes).await.unwrap();

            for expected in [1u64, 2, 3] {
                match events_rx.recv().await.unwrap() {
                    ChannelEvent::Inbound { message, .. } => {
                        assert_eq!(message.id, Some(expected));
                    }
                    other => panic!("unexpected event: {other:?}"),
                }
            }
        }
    }
}
