//! Transport-facing sinks.
//!
//! A sink writes one chunk and only then lets the caller pull the next.
//! When the transport is slow, the write does not complete, the next pull
//! is not issued, and the renderer and source stall with it.

use std::error::Error as StdError;
use std::io::{self, Write};

use edge_core::{AbortReason, SessionPhase, SessionState, StreamError, TimingContext};
use futures::channel::mpsc;
use futures::{Sink, SinkExt};

use crate::flush::Chunk;

/// Counters and timing shared by both sink flavours.
#[derive(Debug)]
struct SinkProgress {
    state: SessionState,
    timing: TimingContext,
    chunks_sent: usize,
    bytes_sent: usize,
}

impl SinkProgress {
    fn new(timing: TimingContext) -> Self {
        Self {
            state: SessionState::new(),
            timing,
            chunks_sent: 0,
            bytes_sent: 0,
        }
    }

    fn begin_write(&mut self) -> Result<(), StreamError> {
        self.state
            .transition(SessionPhase::Rendering)
            .map_err(|e| StreamError::TransportFailure(e.to_string()))
    }

    fn record_write(&mut self, len: usize) {
        self.chunks_sent += 1;
        self.bytes_sent += len;
        self.timing.mark_once("first_chunk");
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.state.phase().is_terminal() {
            return Err(StreamError::TransportFailure(
                "Sink already closed".to_string(),
            ));
        }
        Ok(())
    }

    /// A session with no output still passes through Rendering.
    fn enter_rendering(&mut self) {
        if self.state.phase() == SessionPhase::Initialized {
            let _ = self.state.transition(SessionPhase::Rendering);
        }
    }

    fn fail(&mut self, err: &StreamError) {
        self.finish(SessionPhase::Aborted(AbortReason::from(err)));
    }

    fn finish(&mut self, phase: SessionPhase) {
        let _ = self.state.transition(phase);
    }
}

/// Streaming sink over any `Sink<Vec<u8>>`.
///
/// Generic over the underlying sink so it works with a channel, a framed
/// socket or an HTTP body sender. Sink errors are classified like the
/// blocking writer's: a hung-up peer is [`StreamError::Disconnected`].
pub struct StreamingSink<S, E>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: StdError + 'static,
{
    inner: S,
    progress: SinkProgress,
}

impl<S, E> StreamingSink<S, E>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: StdError + 'static,
{
    /// Create a new streaming sink.
    pub fn new(sink: S, timing: TimingContext) -> Self {
        Self {
            inner: sink,
            progress: SinkProgress::new(timing),
        }
    }

    /// Write one chunk, waiting until the transport accepts it.
    pub async fn send_chunk(&mut self, chunk: Chunk) -> Result<(), StreamError> {
        self.progress.begin_write()?;

        let len = chunk.len();
        if let Err(e) = self.inner.send(chunk.into_bytes()).await {
            let err = transport_error(&e);
            self.progress.fail(&err);
            return Err(err);
        }
        self.progress.record_write(len);

        Ok(())
    }

    /// Close the transport after the last chunk.
    pub async fn complete(&mut self) -> Result<(), StreamError> {
        self.progress.ensure_open()?;
        self.progress.enter_rendering();
        match self.inner.close().await {
            Ok(()) => {
                self.progress.finish(SessionPhase::Completed);
                Ok(())
            }
            Err(e) => {
                let err = transport_error(&e);
                self.progress.fail(&err);
                Err(err)
            }
        }
    }

    /// Close the transport early.
    pub async fn abort(&mut self, reason: AbortReason) {
        let _ = self.inner.close().await;
        self.progress.finish(SessionPhase::Aborted(reason));
    }

    /// Get the current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.progress.state.phase()
    }

    /// Number of chunks written.
    pub fn chunks_sent(&self) -> usize {
        self.progress.chunks_sent
    }

    /// Number of bytes written.
    pub fn bytes_sent(&self) -> usize {
        self.progress.bytes_sent
    }

    /// Get timing context reference.
    pub fn timing(&self) -> &TimingContext {
        &self.progress.timing
    }

    /// Consume the sink and return the inner value.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Blocking sink over any `std::io::Write`.
///
/// Each chunk is written and flushed before returning. Broken pipes and
/// connection resets are reported as [`StreamError::Disconnected`].
pub struct BlockingSink<W: Write> {
    inner: W,
    progress: SinkProgress,
}

impl<W: Write> BlockingSink<W> {
    /// Create a new blocking sink.
    pub fn new(writer: W, timing: TimingContext) -> Self {
        Self {
            inner: writer,
            progress: SinkProgress::new(timing),
        }
    }

    /// Write and flush one chunk.
    pub fn send_chunk(&mut self, chunk: &Chunk) -> Result<(), StreamError> {
        self.progress.begin_write()?;

        let written = self
            .inner
            .write_all(chunk.as_bytes())
            .and_then(|()| self.inner.flush());
        if let Err(e) = written {
            let err = io_error(&e);
            self.progress.fail(&err);
            return Err(err);
        }
        self.progress.record_write(chunk.len());

        Ok(())
    }

    /// Mark the response complete.
    pub fn complete(&mut self) -> Result<(), StreamError> {
        self.progress.ensure_open()?;
        self.progress.enter_rendering();
        if let Err(e) = self.inner.flush() {
            let err = io_error(&e);
            self.progress.fail(&err);
            return Err(err);
        }
        self.progress.finish(SessionPhase::Completed);
        Ok(())
    }

    /// Mark the response aborted.
    pub fn abort(&mut self, reason: AbortReason) {
        let _ = self.inner.flush();
        self.progress.finish(SessionPhase::Aborted(reason));
    }

    /// Get the current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.progress.state.phase()
    }

    /// Number of chunks written.
    pub fn chunks_sent(&self) -> usize {
        self.progress.chunks_sent
    }

    /// Number of bytes written.
    pub fn bytes_sent(&self) -> usize {
        self.progress.bytes_sent
    }

    /// Get timing context reference.
    pub fn timing(&self) -> &TimingContext {
        &self.progress.timing
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Classify a sink error by walking its source chain for an I/O error or
/// a disconnected channel.
fn transport_error<E: StdError + 'static>(e: &E) -> StreamError {
    let mut current: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            return io_error(io);
        }
        if let Some(send) = err.downcast_ref::<mpsc::SendError>() {
            if send.is_disconnected() {
                return StreamError::Disconnected;
            }
        }
        current = err.source();
    }
    StreamError::TransportFailure(e.to_string())
}

fn io_error(e: &io::Error) -> StreamError {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => StreamError::Disconnected,
        _ => StreamError::TransportFailure(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use futures::{sink, StreamExt};

    use super::*;
    use crate::flush::ChunkBuffer;
    use crate::render::Fragment;

    fn chunk(text: &str) -> Chunk {
        ChunkBuffer::default()
            .push(Fragment::new(text))
            .unwrap()
    }

    #[tokio::test]
    async fn test_sends_chunks_in_order() {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(4);
        let mut sink = StreamingSink::new(tx, TimingContext::new());
        assert_eq!(sink.phase(), SessionPhase::Initialized);

        sink.send_chunk(chunk("<p>a</p>")).await.unwrap();
        sink.send_chunk(chunk("<p>b</p>")).await.unwrap();
        assert_eq!(sink.phase(), SessionPhase::Rendering);
        sink.complete().await.unwrap();

        assert_eq!(sink.phase(), SessionPhase::Completed);
        assert_eq!(sink.chunks_sent(), 2);
        assert_eq!(sink.bytes_sent(), 16);
        assert!(sink.timing().time_to_first_chunk().is_some());

        let received: Vec<Vec<u8>> = rx.collect().await;
        assert_eq!(received.concat(), b"<p>a</p><p>b</p>".to_vec());
    }

    #[tokio::test]
    async fn test_closed_receiver_is_disconnect() {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(1);
        drop(rx);
        let mut sink = StreamingSink::new(tx, TimingContext::new());

        let err = sink.send_chunk(chunk("x")).await.unwrap_err();
        assert_eq!(err, StreamError::Disconnected);
        assert!(err.is_client_termination());
        assert_eq!(
            sink.phase(),
            SessionPhase::Aborted(AbortReason::Disconnected)
        );
        assert!(sink.send_chunk(chunk("y")).await.is_err());
    }

    fn failing_sink(
        kind: io::ErrorKind,
    ) -> impl Sink<Vec<u8>, Error = io::Error> + Unpin {
        Box::pin(sink::unfold((), move |(), _bytes: Vec<u8>| async move {
            Err::<(), _>(io::Error::new(kind, "write failed"))
        }))
    }

    #[tokio::test]
    async fn test_broken_pipe_sink_is_disconnect() {
        let mut sink = StreamingSink::new(
            failing_sink(io::ErrorKind::BrokenPipe),
            TimingContext::new(),
        );
        assert_eq!(
            sink.send_chunk(chunk("x")).await,
            Err(StreamError::Disconnected)
        );
        assert_eq!(
            sink.phase(),
            SessionPhase::Aborted(AbortReason::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_other_sink_errors_are_transport_failures() {
        let mut sink = StreamingSink::new(
            failing_sink(io::ErrorKind::PermissionDenied),
            TimingContext::new(),
        );
        let err = sink.send_chunk(chunk("x")).await.unwrap_err();
        assert!(matches!(err, StreamError::TransportFailure(_)));
        assert_eq!(
            sink.phase(),
            SessionPhase::Aborted(AbortReason::TransportFailure)
        );
    }

    #[test]
    fn test_blocking_sink_writes_and_flushes() {
        let mut sink = BlockingSink::new(Vec::new(), TimingContext::new());
        sink.send_chunk(&chunk("one ")).unwrap();
        sink.send_chunk(&chunk("two")).unwrap();
        sink.complete().unwrap();

        assert_eq!(sink.phase(), SessionPhase::Completed);
        assert_eq!(sink.into_inner(), b"one two".to_vec());
    }

    struct HungUp;

    impl Write for HungUp {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FlushFails;

    impl Write for FlushFails {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_failed_final_flush_aborts() {
        let mut sink = BlockingSink::new(FlushFails, TimingContext::new());
        let err = sink.complete().unwrap_err();
        assert!(matches!(err, StreamError::TransportFailure(_)));
        assert_eq!(
            sink.phase(),
            SessionPhase::Aborted(AbortReason::TransportFailure)
        );
        assert!(sink.complete().is_err());
    }

    #[test]
    fn test_broken_pipe_is_disconnect() {
        let mut sink = BlockingSink::new(HungUp, TimingContext::new());
        assert_eq!(sink.send_chunk(&chunk("x")), Err(StreamError::Disconnected));
        assert_eq!(
            sink.phase(),
            SessionPhase::Aborted(AbortReason::Disconnected)
        );
    }
}
