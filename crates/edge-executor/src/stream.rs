//! Body stream handed to the transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use edge_core::{AbortReason, SessionPhase, StreamError};
use edge_streaming::Chunk;
use futures::stream::Stream;

use crate::tracker::DisconnectGuard;

pub(crate) type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk, StreamError>> + Send>>;

/// Chunks of one session, in flush order.
///
/// Nothing is produced until the stream is polled; each poll pulls at most
/// one chunk through the pipeline. Dropping the stream before it ends is a
/// client disconnect: the session is aborted and its source cancelled.
pub struct SessionStream {
    inner: ChunkStream,
    guard: DisconnectGuard,
    done: bool,
}

impl SessionStream {
    pub(crate) fn new(inner: ChunkStream, guard: DisconnectGuard) -> Self {
        Self {
            inner,
            guard,
            done: false,
        }
    }

    /// Get the current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.guard.0.phase()
    }
}

impl Stream for SessionStream {
    type Item = Result<Chunk, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let tracker = &this.guard.0;
        if this.done {
            return Poll::Ready(None);
        }
        // Aborted through a handle: end with an error so the transport
        // closes instead of terminating the body cleanly.
        if tracker.is_terminal() {
            this.done = true;
            return Poll::Ready(Some(Err(StreamError::Cancelled)));
        }

        tracker.begin();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                tracker.record_chunk(chunk.len(), chunk.fragments());
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.done = true;
                tracker.finish(
                    SessionPhase::Aborted(AbortReason::from(&err)),
                    Some(err.clone()),
                );
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.done = true;
                tracker.finish(SessionPhase::Completed, None);
                Poll::Ready(None)
            }
        }
    }
}
