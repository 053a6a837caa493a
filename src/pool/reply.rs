//! Pending responses.
//!
//! Every dispatched request hands back a [`Reply`]: a single-use handle that
//! resolves exactly once, either with the worker's response or with
//! [`PyscoutError::ReplyLost`] when the response can no longer arrive (the
//! worker crashed, or the pool shut down first). There is deliberately no
//! timeout here; callers that want one wrap [`Reply::wait`] themselves.

use tokio::sync::oneshot;

use pyscout_core::message::WireResponse;

use crate::error::{PyscoutError, PyscoutResult};

// ============================================================================
// Reply
// ============================================================================

#[derive(Debug)]
pub struct Reply {
    rx: oneshot::Receiver<WireResponse>,
}

impl Reply {
    /// Creates a pending reply and the sender that resolves it.
    pub(crate) fn channel() -> (oneshot::Sender<WireResponse>, Reply) {
        let (tx, rx) = oneshot::channel();
        (tx, Reply { rx })
    }

    /// Waits for the response. Consumes the handle: a reply resolves once.
    pub async fn wait(self) -> PyscoutResult<WireResponse> {
        self.rx.await.map_err(|_| PyscoutError::ReplyLost)
    }

    /// Like [`Reply::wait`], but converts a worker `error` payload into
    /// [`PyscoutError::Worker`].
    pub async fn expect_success(self) -> PyscoutResult<WireResponse> {
        let response = self.wait().await?;
        match response.error_message() {
            Some(message) => Err(PyscoutError::worker(message)),
            None => Ok(response),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
