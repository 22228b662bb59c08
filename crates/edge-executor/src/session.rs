//! Stream sessions: one source, one render, one transport.

use std::error::Error as StdError;
use std::io::Write;
use std::sync::Arc;

use edge_core::{
    AbortReason, ExecutionModel, LifecycleObserver, RequestId, SessionPhase, StreamConfig,
    StreamError, TimingContext,
};
use edge_data::{
    BlockingDelayedRange, BlockingItemSource, DelayedRange, ItemSource, SourceStats,
};
use edge_observability::{LogFormat, LogLevel, MetricsCollector, StructuredLogger};
use edge_streaming::{
    chunked, AutoEscape, BlockingRenderer, BlockingSink, ChunkIter, IncrementalRenderer,
    RenderContext, RendererConfig, StreamingSink, Template,
};
use futures::stream::{self, StreamExt};
use futures::Sink;
use tokio::sync::mpsc;

use crate::stream::{ChunkStream, SessionStream};
use crate::tracker::{DisconnectGuard, SessionHandle, SessionReport, Tracker};

/// Name the delayed range is bound to in the render context.
pub const ITEMS_BINDING: &str = "delayed_range";

/// Builder for [`StreamSession`].
pub struct SessionBuilder {
    template: Arc<Template>,
    config: StreamConfig,
    execution: ExecutionModel,
    autoescape: Option<AutoEscape>,
    request_id: Option<RequestId>,
    workload: Option<String>,
    route: Option<String>,
    observer: Option<Arc<dyn LifecycleObserver>>,
    log_format: LogFormat,
    log_level: LogLevel,
    texts: Vec<(String, String)>,
}

impl SessionBuilder {
    /// Bind a text value the template can interpolate.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.texts.push((name.into(), value.into()));
        self
    }

    /// Select the execution model.
    pub fn execution(mut self, execution: ExecutionModel) -> Self {
        self.execution = execution;
        self
    }

    /// Override the escaping derived from the template name.
    pub fn autoescape(mut self, autoescape: AutoEscape) -> Self {
        self.autoescape = Some(autoescape);
        self
    }

    /// Use an existing request id instead of generating one.
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Tag logs and metrics with a workload name.
    pub fn workload(mut self, name: impl Into<String>) -> Self {
        self.workload = Some(name.into());
        self
    }

    /// Tag logs with the route being served.
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Report lifecycle events to `observer`.
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set the session log format.
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Set the session log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Validate the configuration and create the session.
    pub fn build(self) -> Result<StreamSession, StreamError> {
        self.config.validate()?;

        let id = self.request_id.unwrap_or_else(RequestId::generate);
        let mut logger = StructuredLogger::new(id.clone())
            .with_format(self.log_format)
            .with_min_level(self.log_level);
        let mut metrics = MetricsCollector::new(id.clone());
        metrics.set_execution(self.execution);
        if let Some(workload) = &self.workload {
            logger = logger.with_workload(workload.clone());
            metrics.set_workload(workload.clone());
        }
        if let Some(route) = self.route {
            logger = logger.with_route(route);
        }

        let mut renderer = RendererConfig::for_template(&self.template).with_execution(self.execution);
        if let Some(autoescape) = self.autoescape {
            renderer = renderer.with_autoescape(autoescape);
        }

        logger
            .info_builder("session started")
            .field("template", self.template.name())
            .field("execution", self.execution.to_string())
            .field("flush", self.config.flush_threshold.to_string())
            .field_u64("items", self.config.items as u64)
            .field("delay", format!("{:?}", self.config.delay))
            .field_u64("expected_ms", self.config.minimum_duration().as_millis() as u64)
            .emit();

        let tracker = Arc::new(Tracker::new(
            metrics,
            SourceStats::new(),
            self.observer,
            logger,
        ));

        Ok(StreamSession {
            id,
            template: self.template,
            config: self.config,
            renderer,
            texts: self.texts,
            tracker,
        })
    }
}

/// One client request served incrementally.
///
/// A session is driven exactly once, through one of the `into_*` or `run*`
/// methods. It owns its source, render context and chunk buffer; nothing is
/// shared with other sessions.
pub struct StreamSession {
    id: RequestId,
    template: Arc<Template>,
    config: StreamConfig,
    renderer: RendererConfig,
    texts: Vec<(String, String)>,
    tracker: Arc<Tracker>,
}

impl StreamSession {
    /// Start building a session for `template` with `config`.
    pub fn builder(template: Arc<Template>, config: StreamConfig) -> SessionBuilder {
        SessionBuilder {
            template,
            config,
            execution: ExecutionModel::default(),
            autoescape: None,
            request_id: None,
            workload: None,
            route: None,
            observer: None,
            log_format: LogFormat::default(),
            log_level: LogLevel::Info,
            texts: Vec::new(),
        }
    }

    /// Create a cooperative session with default settings.
    pub fn new(template: Arc<Template>, config: StreamConfig) -> Result<Self, StreamError> {
        Self::builder(template, config).build()
    }

    /// Get the request id.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Get the stream configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Get the execution model.
    pub fn execution(&self) -> ExecutionModel {
        self.renderer.execution
    }

    /// Get a handle for observing or aborting the session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.id.clone(), self.tracker.clone())
    }

    fn cooperative_context(&self) -> RenderContext<DelayedRange> {
        let source = DelayedRange::from_config(&self.config)
            .with_cancel(self.tracker.cancel_token().clone())
            .with_stats(self.tracker.stats().clone());
        self.bind_texts(RenderContext::new().with_items(ITEMS_BINDING, source))
    }

    fn blocking_context(&self) -> RenderContext<BlockingDelayedRange> {
        let source = BlockingDelayedRange::from_config(&self.config)
            .with_cancel(self.tracker.cancel_token().clone())
            .with_stats(self.tracker.stats().clone());
        self.bind_texts(RenderContext::new().with_items(ITEMS_BINDING, source))
    }

    fn bind_texts<S>(&self, context: RenderContext<S>) -> RenderContext<S> {
        self.texts
            .iter()
            .fold(context, |ctx, (name, value)| ctx.with_text(name.clone(), value.clone()))
    }

    fn cooperative_chunks<S>(&self, context: RenderContext<S>) -> ChunkStream
    where
        S: ItemSource + 'static,
    {
        let renderer = IncrementalRenderer::new(self.template.clone(), context, &self.renderer);
        Box::pin(chunked(renderer.into_stream(), self.config.flush_threshold))
    }

    /// Body stream in whichever execution model the session was built with.
    pub fn into_body(self) -> Result<(SessionHandle, SessionStream), StreamError> {
        match self.execution() {
            ExecutionModel::Cooperative => Ok(self.into_stream()),
            ExecutionModel::Blocking => self.into_blocking_stream(),
        }
    }

    /// Cooperative body stream over the session's delayed range.
    pub fn into_stream(self) -> (SessionHandle, SessionStream) {
        let context = self.cooperative_context();
        self.into_stream_with(context)
    }

    /// Cooperative body stream over a caller-supplied context.
    ///
    /// Text bound on the builder is not added; the context is used as given.
    pub fn into_stream_with<S>(self, context: RenderContext<S>) -> (SessionHandle, SessionStream)
    where
        S: ItemSource + 'static,
    {
        let chunks = self.cooperative_chunks(context);
        let handle = self.handle();
        (handle, SessionStream::new(chunks, DisconnectGuard(self.tracker)))
    }

    /// Body stream fed by a dedicated render thread.
    ///
    /// The thread blocks on each item wait and hands chunks over a channel
    /// of capacity one, so it runs at most one chunk ahead of the transport.
    pub fn into_blocking_stream(self) -> Result<(SessionHandle, SessionStream), StreamError> {
        let context = self.blocking_context();
        self.into_blocking_stream_with(context)
    }

    /// Blocking body stream over a caller-supplied context.
    pub fn into_blocking_stream_with<S>(
        self,
        context: RenderContext<S>,
    ) -> Result<(SessionHandle, SessionStream), StreamError>
    where
        S: BlockingItemSource + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let template = self.template.clone();
        let renderer = self.renderer;
        let threshold = self.config.flush_threshold;
        let cancel = self.tracker.cancel_token().clone();

        std::thread::Builder::new()
            .name(format!("edge-session-{}", self.id))
            .spawn(move || {
                let fragments = BlockingRenderer::new(template, context, &renderer);
                for chunk in ChunkIter::new(fragments, threshold) {
                    // Receiver gone means the transport side went away.
                    if tx.blocking_send(chunk).is_err() {
                        cancel.cancel();
                        break;
                    }
                }
            })
            .map_err(|e| StreamError::RenderFailure(format!("could not start render thread: {}", e)))?;

        let chunks: ChunkStream = Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));
        let handle = self.handle();
        Ok((handle, SessionStream::new(chunks, DisconnectGuard(self.tracker))))
    }

    /// Drive the session cooperatively into `sink`.
    pub async fn run<K, E>(self, sink: K) -> SessionReport
    where
        K: Sink<Vec<u8>, Error = E> + Unpin,
        E: StdError + 'static,
    {
        let context = self.cooperative_context();
        self.run_with(context, sink).await
    }

    /// Drive the session cooperatively over a caller-supplied context.
    pub async fn run_with<S, K, E>(self, context: RenderContext<S>, sink: K) -> SessionReport
    where
        S: ItemSource + 'static,
        K: Sink<Vec<u8>, Error = E> + Unpin,
        E: StdError + 'static,
    {
        let mut chunks = self.cooperative_chunks(context);
        let guard = DisconnectGuard(self.tracker);
        let tracker = &guard.0;
        let mut sink = StreamingSink::new(sink, TimingContext::new());

        loop {
            tracker.begin();
            let next = chunks.next().await;
            if tracker.is_terminal() {
                sink.abort(AbortReason::Cancelled).await;
                break;
            }
            match next {
                Some(Ok(chunk)) => {
                    let (bytes, fragments) = (chunk.len(), chunk.fragments());
                    if let Err(err) = sink.send_chunk(chunk).await {
                        tracker.finish(SessionPhase::Aborted(AbortReason::from(&err)), Some(err));
                        break;
                    }
                    tracker.record_chunk(bytes, fragments);
                }
                Some(Err(err)) => {
                    let reason = AbortReason::from(&err);
                    sink.abort(reason).await;
                    tracker.finish(SessionPhase::Aborted(reason), Some(err));
                    break;
                }
                None => {
                    match sink.complete().await {
                        Ok(()) => tracker.finish(SessionPhase::Completed, None),
                        Err(err) => tracker
                            .finish(SessionPhase::Aborted(AbortReason::from(&err)), Some(err)),
                    }
                    break;
                }
            }
        }

        tracker.report()
    }

    /// Drive the session on the calling thread into `writer`.
    pub fn run_blocking<W: Write>(self, writer: W) -> SessionReport {
        let context = self.blocking_context();
        self.run_blocking_with(context, writer)
    }

    /// Drive the session on the calling thread over a caller-supplied context.
    pub fn run_blocking_with<S, W>(self, context: RenderContext<S>, writer: W) -> SessionReport
    where
        S: BlockingItemSource,
        W: Write,
    {
        let fragments = BlockingRenderer::new(self.template.clone(), context, &self.renderer);
        let mut chunks = ChunkIter::new(fragments, self.config.flush_threshold);
        let guard = DisconnectGuard(self.tracker);
        let tracker = &guard.0;
        let mut sink = BlockingSink::new(writer, TimingContext::new());

        loop {
            tracker.begin();
            let next = chunks.next();
            if tracker.is_terminal() {
                sink.abort(AbortReason::Cancelled);
                break;
            }
            match next {
                Some(Ok(chunk)) => {
                    if let Err(err) = sink.send_chunk(&chunk) {
                        tracker.finish(SessionPhase::Aborted(AbortReason::from(&err)), Some(err));
                        break;
                    }
                    tracker.record_chunk(chunk.len(), chunk.fragments());
                }
                Some(Err(err)) => {
                    let reason = AbortReason::from(&err);
                    sink.abort(reason);
                    tracker.finish(SessionPhase::Aborted(reason), Some(err));
                    break;
                }
                None => {
                    match sink.complete() {
                        Ok(()) => tracker.finish(SessionPhase::Completed, None),
                        Err(err) => tracker
                            .finish(SessionPhase::Aborted(AbortReason::from(&err)), Some(err)),
                    }
                    break;
                }
            }
        }

        tracker.report()
    }
}
