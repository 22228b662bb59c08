//! Chunk buffering - groups fragments into transport writes.
//!
//! Buffering only decides where chunk boundaries fall. It never reorders or
//! alters content: the concatenation of all chunks is the concatenation of
//! all fragments in generation order.

use std::pin::Pin;

use edge_core::{FlushThreshold, StreamError};
use futures::stream::{self, Stream, StreamExt};

use crate::render::Fragment;

/// One transport write: one or more fragments, concatenated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    bytes: Vec<u8>,
    fragments: usize,
}

impl Chunk {
    /// Borrow the bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of fragments grouped in this chunk.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Take the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Accumulates fragments until the flush threshold is reached.
#[derive(Debug)]
pub struct ChunkBuffer {
    threshold: FlushThreshold,
    pending: String,
    pending_fragments: usize,
}

impl ChunkBuffer {
    /// Create a buffer with the given threshold.
    pub fn new(threshold: FlushThreshold) -> Self {
        Self {
            threshold,
            pending: String::new(),
            pending_fragments: 0,
        }
    }

    /// Add a fragment, returning a chunk if the threshold is now reached.
    pub fn push(&mut self, fragment: Fragment) -> Option<Chunk> {
        self.pending.push_str(fragment.as_str());
        self.pending_fragments += 1;
        if self.should_flush() {
            self.take()
        } else {
            None
        }
    }

    /// Flush whatever is pending at the end of the fragment sequence.
    pub fn finish(&mut self) -> Option<Chunk> {
        self.take()
    }

    /// Check if a flush is due.
    pub fn should_flush(&self) -> bool {
        self.threshold
            .is_reached(self.pending_fragments, self.pending.len())
    }

    /// Bytes waiting for a flush.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Fragments waiting for a flush.
    pub fn pending_fragments(&self) -> usize {
        self.pending_fragments
    }

    /// Get current threshold.
    pub fn threshold(&self) -> FlushThreshold {
        self.threshold
    }

    // Empty chunks are dropped; a zero-length write means end-of-body to
    // some transports.
    fn take(&mut self) -> Option<Chunk> {
        let fragments = std::mem::take(&mut self.pending_fragments);
        let text = std::mem::take(&mut self.pending);
        if text.is_empty() {
            return None;
        }
        Some(Chunk {
            bytes: text.into_bytes(),
            fragments,
        })
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new(FlushThreshold::default())
    }
}

type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, StreamError>> + Send>>;

struct Chunking {
    fragments: Option<FragmentStream>,
    buffer: ChunkBuffer,
    deferred: Option<StreamError>,
}

/// Group a fragment stream into chunks.
///
/// Fragments are pulled only when a chunk is requested. On error the pending
/// fragments are flushed first and the error follows as the final item.
pub fn chunked<St>(
    fragments: St,
    threshold: FlushThreshold,
) -> impl Stream<Item = Result<Chunk, StreamError>> + Send
where
    St: Stream<Item = Result<Fragment, StreamError>> + Send + 'static,
{
    let state = Chunking {
        fragments: Some(Box::pin(fragments)),
        buffer: ChunkBuffer::new(threshold),
        deferred: None,
    };

    stream::unfold(state, |mut state| async move {
        if let Some(err) = state.deferred.take() {
            return Some((Err(err), state));
        }
        loop {
            let next = match state.fragments.as_mut() {
                Some(fragments) => fragments.next().await,
                None => return None,
            };
            match next {
                Some(Ok(fragment)) => {
                    if let Some(chunk) = state.buffer.push(fragment) {
                        return Some((Ok(chunk), state));
                    }
                }
                Some(Err(err)) => {
                    state.fragments = None;
                    return match state.buffer.finish() {
                        Some(chunk) => {
                            state.deferred = Some(err);
                            Some((Ok(chunk), state))
                        }
                        None => Some((Err(err), state)),
                    };
                }
                None => {
                    state.fragments = None;
                    return state.buffer.finish().map(|chunk| (Ok(chunk), state));
                }
            }
        }
    })
}

/// Blocking counterpart of [`chunked`].
pub struct ChunkIter<I> {
    fragments: Option<I>,
    buffer: ChunkBuffer,
    deferred: Option<StreamError>,
}

impl<I> ChunkIter<I>
where
    I: Iterator<Item = Result<Fragment, StreamError>>,
{
    /// Group `fragments` into chunks.
    pub fn new(fragments: I, threshold: FlushThreshold) -> Self {
        Self {
            fragments: Some(fragments),
            buffer: ChunkBuffer::new(threshold),
            deferred: None,
        }
    }
}

impl<I> Iterator for ChunkIter<I>
where
    I: Iterator<Item = Result<Fragment, StreamError>>,
{
    type Item = Result<Chunk, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.deferred.take() {
            return Some(Err(err));
        }
        loop {
            match self.fragments.as_mut()?.next() {
                Some(Ok(fragment)) => {
                    if let Some(chunk) = self.buffer.push(fragment) {
                        return Some(Ok(chunk));
                    }
                }
                Some(Err(err)) => {
                    self.fragments = None;
                    return match self.buffer.finish() {
                        Some(chunk) => {
                            self.deferred = Some(err);
                            Some(Ok(chunk))
                        }
                        None => Some(Err(err)),
                    };
                }
                None => {
                    self.fragments = None;
                    return self.buffer.finish().map(Ok);
                }
            }
        }
    }
}
