//! Incremental renderer.
//!
//! Walks a compiled template and produces fragments on demand. Static
//! regions come out without waiting; each loop iteration pulls exactly one
//! item, renders the body and hands the fragment back before the next pull.
//! Nothing is fetched ahead of what has been rendered.

use std::fmt;
use std::sync::Arc;

use edge_core::{ExecutionModel, StreamError};
use edge_data::{BlockingItemSource, Item, ItemSource};
use futures::stream::{self, Stream};

use crate::context::RenderContext;
use crate::escape::AutoEscape;
use crate::template::{Node, Segment, Template};

/// Rendered text produced between two consecutive pulls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment(String);

impl Fragment {
    /// Wrap rendered text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renderer configuration, passed explicitly at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererConfig {
    /// Escaping for interpolated values.
    pub autoescape: AutoEscape,
    /// How pulls from bound sources wait.
    pub execution: ExecutionModel,
}

impl RendererConfig {
    /// Derive escaping from the template name, cooperative execution.
    pub fn for_template(template: &Template) -> Self {
        Self {
            autoescape: AutoEscape::for_template_name(template.name()),
            execution: ExecutionModel::Cooperative,
        }
    }

    /// Override escaping.
    pub fn with_autoescape(mut self, autoescape: AutoEscape) -> Self {
        self.autoescape = autoescape;
        self
    }

    /// Select the execution model.
    pub fn with_execution(mut self, execution: ExecutionModel) -> Self {
        self.execution = execution;
        self
    }
}

enum Step {
    Emit(Fragment),
    Pull,
    Done,
}

struct ActiveLoop<S> {
    source: S,
    iterations: usize,
}

/// Resumable render position shared by both renderers.
struct RenderState<S> {
    template: Arc<Template>,
    context: Option<RenderContext<S>>,
    escape: AutoEscape,
    position: usize,
    active: Option<ActiveLoop<S>>,
    finished: bool,
    emitted: usize,
}

impl<S> RenderState<S> {
    fn new(template: Arc<Template>, context: RenderContext<S>, config: &RendererConfig) -> Self {
        Self {
            template,
            context: Some(context),
            escape: config.autoescape,
            position: 0,
            active: None,
            finished: false,
            emitted: 0,
        }
    }

    /// Run static nodes until a fragment is ready, a pull is needed, or the
    /// template ends.
    fn advance(&mut self) -> Result<Step, StreamError> {
        if self.active.is_some() {
            return Ok(Step::Pull);
        }
        let template = Arc::clone(&self.template);
        let mut text = String::new();

        while let Some(node) = template.nodes().get(self.position) {
            match node {
                Node::Text(literal) => text.push_str(literal),
                Node::Var(name) => {
                    let value = self.context()?.text(name)?;
                    self.escape.push(&mut text, value);
                }
                Node::Loop(block) => {
                    // Static output before a loop goes out before its first wait.
                    if !text.is_empty() {
                        return Ok(Step::Emit(self.emit(text)));
                    }
                    let source = self.context_mut()?.take_items(&block.binding)?;
                    self.active = Some(ActiveLoop {
                        source,
                        iterations: 0,
                    });
                    return Ok(Step::Pull);
                }
            }
            self.position += 1;
        }

        if text.is_empty() {
            Ok(Step::Done)
        } else {
            Ok(Step::Emit(self.emit(text)))
        }
    }

    /// Render the loop body for a pulled item, or close the loop on `None`.
    fn on_item(&mut self, item: Option<Item>) -> Option<Fragment> {
        let template = Arc::clone(&self.template);
        let Some(Node::Loop(block)) = template.nodes().get(self.position) else {
            return None;
        };

        match item {
            Some(item) => {
                if let Some(active) = self.active.as_mut() {
                    active.iterations += 1;
                }
                let mut text = String::new();
                for segment in &block.body {
                    match segment {
                        Segment::Text(literal) => text.push_str(literal),
                        Segment::Item => self.escape.push(&mut text, &item.to_string()),
                    }
                }
                Some(self.emit(text))
            }
            None => {
                // Dropping the loop releases the exhausted source.
                let iterations = self.active.take().map_or(0, |active| active.iterations);
                self.position += 1;
                match &block.empty {
                    Some(text) if iterations == 0 && !text.is_empty() => {
                        Some(self.emit(text.clone()))
                    }
                    _ => None,
                }
            }
        }
    }

    fn source_mut(&mut self) -> Option<&mut S> {
        self.active.as_mut().map(|active| &mut active.source)
    }

    fn emit(&mut self, text: String) -> Fragment {
        self.emitted += 1;
        Fragment(text)
    }

    fn context(&self) -> Result<&RenderContext<S>, StreamError> {
        self.context
            .as_ref()
            .ok_or_else(|| StreamError::RenderFailure("render context released".to_string()))
    }

    fn context_mut(&mut self) -> Result<&mut RenderContext<S>, StreamError> {
        self.context
            .as_mut()
            .ok_or_else(|| StreamError::RenderFailure("render context released".to_string()))
    }

    /// Enter the terminal state and release the context and any source.
    fn release(&mut self) {
        self.finished = true;
        self.active = None;
        self.context = None;
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        self.release();
        err
    }
}

/// Cooperative renderer: pulls suspend on the bound [`ItemSource`].
///
/// Finite and not restartable. After an error the sequence ends; fragments
/// already returned stay returned.
pub struct IncrementalRenderer<S> {
    state: RenderState<S>,
}

impl<S: ItemSource> IncrementalRenderer<S> {
    /// Create a renderer over `template` with `context` as its environment.
    pub fn new(template: Arc<Template>, context: RenderContext<S>, config: &RendererConfig) -> Self {
        Self {
            state: RenderState::new(template, context, config),
        }
    }

    /// Produce the next fragment, waiting on the bound source if needed.
    pub async fn next_fragment(&mut self) -> Option<Result<Fragment, StreamError>> {
        loop {
            if self.state.finished {
                return None;
            }
            let pulled = match self.state.advance() {
                Ok(Step::Emit(fragment)) => return Some(Ok(fragment)),
                Ok(Step::Done) => {
                    self.state.release();
                    return None;
                }
                Ok(Step::Pull) => match self.state.source_mut() {
                    Some(source) => source.next_item().await,
                    None => Ok(None),
                },
                Err(e) => return Some(Err(self.state.fail(e))),
            };
            match pulled {
                Ok(item) => {
                    if let Some(fragment) = self.state.on_item(item) {
                        return Some(Ok(fragment));
                    }
                }
                Err(e) => return Some(Err(self.state.fail(e))),
            }
        }
    }

    /// Number of fragments produced so far.
    pub fn fragments_emitted(&self) -> usize {
        self.state.emitted
    }

    /// Check if the renderer reached its end or failed.
    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    /// Convert into a fragment stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<Fragment, StreamError>> + Send
    where
        S: 'static,
    {
        stream::unfold(self, |mut renderer| async move {
            renderer
                .next_fragment()
                .await
                .map(|fragment| (fragment, renderer))
        })
    }
}

/// Blocking renderer: pulls park the calling thread on the bound
/// [`BlockingItemSource`].
pub struct BlockingRenderer<S> {
    state: RenderState<S>,
}

impl<S: BlockingItemSource> BlockingRenderer<S> {
    /// Create a renderer over `template` with `context` as its environment.
    pub fn new(template: Arc<Template>, context: RenderContext<S>, config: &RendererConfig) -> Self {
        Self {
            state: RenderState::new(template, context, config),
        }
    }

    /// Number of fragments produced so far.
    pub fn fragments_emitted(&self) -> usize {
        self.state.emitted
    }

    /// Check if the renderer reached its end or failed.
    pub fn is_finished(&self) -> bool {
        self.state.finished
    }
}

impl<S: BlockingItemSource> Iterator for BlockingRenderer<S> {
    type Item = Result<Fragment, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state.finished {
                return None;
            }
            let pulled = match self.state.advance() {
                Ok(Step::Emit(fragment)) => return Some(Ok(fragment)),
                Ok(Step::Done) => {
                    self.state.release();
                    return None;
                }
                Ok(Step::Pull) => match self.state.source_mut() {
                    Some(source) => source.next_item(),
                    None => Ok(None),
                },
                Err(e) => return Some(Err(self.state.fail(e))),
            };
            match pulled {
                Ok(item) => {
                    if let Some(fragment) = self.state.on_item(item) {
                        return Some(Ok(fragment));
                    }
                }
                Err(e) => return Some(Err(self.state.fail(e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use edge_data::{BlockingDelayedRange, DelayedRange, Permutation};
    use futures::StreamExt;
    use tokio::time::Instant;

    use super::*;

    fn list_template() -> Arc<Template> {
        Arc::new(
            Template::builder("list.html")
                .text("<h1>")
                .var("title")
                .text("</h1><ul>")
                .for_each("delayed_range", |body| {
                    body.text("<li>").item().text("</li>").empty("<li>empty</li>")
                })
                .text("</ul>")
                .build(),
        )
    }

    fn config() -> RendererConfig {
        RendererConfig::for_template(&list_template())
    }

    /// Source that records every pull and fails on a chosen one.
    struct ScriptedSource {
        items: Vec<usize>,
        fail_at: Option<usize>,
        pulls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ItemSource for ScriptedSource {
        async fn next_item(&mut self) -> Result<Option<Item>, StreamError> {
            let pull = self.pulls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(pull) {
                return Err(StreamError::SourceFailure("backend unavailable".into()));
            }
            Ok(self.items.get(pull).copied().map(Item))
        }
    }

    #[tokio::test]
    async fn test_output_follows_yield_order() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            items: vec![2, 0, 1],
            fail_at: None,
            pulls: pulls.clone(),
        };
        let ctx = RenderContext::new()
            .with_text("title", "Items")
            .with_items("delayed_range", source);

        let fragments: Vec<String> = IncrementalRenderer::new(list_template(), ctx, &config())
            .into_stream()
            .map(|f| f.unwrap().into_string())
            .collect()
            .await;

        assert_eq!(
            fragments,
            vec![
                "<h1>Items</h1><ul>",
                "<li>2</li>",
                "<li>0</li>",
                "<li>1</li>",
                "</ul>",
            ]
        );
        // Three items plus the end-of-sequence pull.
        assert_eq!(pulls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_no_read_ahead() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            items: vec![0, 1, 2, 3],
            fail_at: None,
            pulls: pulls.clone(),
        };
        let ctx = RenderContext::new()
            .with_text("title", "t")
            .with_items("delayed_range", source);
        let mut renderer = IncrementalRenderer::new(list_template(), ctx, &config());

        renderer.next_fragment().await.unwrap().unwrap();
        assert_eq!(pulls.load(Ordering::SeqCst), 0);

        renderer.next_fragment().await.unwrap().unwrap();
        assert_eq!(pulls.load(Ordering::SeqCst), 1);

        renderer.next_fragment().await.unwrap().unwrap();
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_head_is_not_delayed() {
        let ctx = RenderContext::new()
            .with_text("title", "t")
            .with_items("delayed_range", DelayedRange::new(3, Duration::from_secs(1)));
        let mut renderer = IncrementalRenderer::new(list_template(), ctx, &config());

        let start = Instant::now();
        let head = renderer.next_fragment().await.unwrap().unwrap();
        assert_eq!(head.as_str(), "<h1>t</h1><ul>");
        assert_eq!(start.elapsed(), Duration::ZERO);

        renderer.next_fragment().await.unwrap().unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_empty_source_renders_static_and_empty_branch() {
        let ctx = RenderContext::new()
            .with_text("title", "Nothing")
            .with_items("delayed_range", DelayedRange::new(0, Duration::from_secs(5)));

        let fragments: Vec<String> = IncrementalRenderer::new(list_template(), ctx, &config())
            .into_stream()
            .map(|f| f.unwrap().into_string())
            .collect()
            .await;

        assert_eq!(
            fragments.concat(),
            "<h1>Nothing</h1><ul><li>empty</li></ul>"
        );
    }

    #[tokio::test]
    async fn test_source_failure_keeps_emitted_prefix() {
        let source = ScriptedSource {
            items: vec![4, 5, 6],
            fail_at: Some(2),
            pulls: Arc::new(AtomicUsize::new(0)),
        };
        let ctx = RenderContext::new()
            .with_text("title", "t")
            .with_items("delayed_range", source);
        let mut renderer = IncrementalRenderer::new(list_template(), ctx, &config());

        let mut ok = Vec::new();
        let mut error = None;
        while let Some(next) = renderer.next_fragment().await {
            match next {
                Ok(fragment) => ok.push(fragment.into_string()),
                Err(e) => error = Some(e),
            }
        }

        assert_eq!(ok, vec!["<h1>t</h1><ul>", "<li>4</li>", "<li>5</li>"]);
        assert!(matches!(error, Some(StreamError::SourceFailure(_))));
        assert!(renderer.is_finished());
        assert!(renderer.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn test_unbound_variable_is_render_failure() {
        let ctx = RenderContext::new()
            .with_items("delayed_range", DelayedRange::new(1, Duration::ZERO));
        let mut renderer = IncrementalRenderer::new(list_template(), ctx, &config());

        let first = renderer.next_fragment().await.unwrap();
        assert!(matches!(first, Err(StreamError::RenderFailure(_))));
        assert!(renderer.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn test_second_loop_over_same_source_fails() {
        let template = Arc::new(
            Template::builder("twice.txt")
                .for_each("range", |b| b.item())
                .for_each("range", |b| b.item())
                .build(),
        );
        let ctx = RenderContext::new().with_items("range", DelayedRange::seeded(2, Duration::ZERO, 3));
        let results: Vec<_> =
            IncrementalRenderer::new(template.clone(), ctx, &RendererConfig::for_template(&template))
                .into_stream()
                .collect()
                .await;

        assert_eq!(results.len(), 3);
        assert!(results[..2].iter().all(|r| r.is_ok()));
        assert!(matches!(&results[2], Err(StreamError::RenderFailure(msg)) if msg.contains("already")));
    }

    #[tokio::test]
    async fn test_autoescape_applies_to_values() {
        let template = Arc::new(Template::builder("page.html").var("title").build());
        let ctx: RenderContext<DelayedRange> =
            RenderContext::new().with_text("title", "<script>");
        let mut renderer =
            IncrementalRenderer::new(template.clone(), ctx, &RendererConfig::for_template(&template));
        assert_eq!(
            renderer.next_fragment().await.unwrap().unwrap().as_str(),
            "&lt;script&gt;"
        );

        let ctx: RenderContext<DelayedRange> =
            RenderContext::new().with_text("title", "<script>");
        let config = RendererConfig::for_template(&template).with_autoescape(AutoEscape::Disabled);
        let mut renderer = IncrementalRenderer::new(template, ctx, &config);
        assert_eq!(
            renderer.next_fragment().await.unwrap().unwrap().as_str(),
            "<script>"
        );
    }

    #[test]
    fn test_blocking_matches_cooperative() {
        let delay = Duration::from_millis(1);
        let order = Permutation::seeded(8, 11);

        let ctx = RenderContext::new()
            .with_text("title", "same")
            .with_items(
                "delayed_range",
                BlockingDelayedRange::from_permutation(order.clone(), delay),
            );
        let blocking: Vec<String> = BlockingRenderer::new(list_template(), ctx, &config())
            .map(|f| f.unwrap().into_string())
            .collect();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let ctx = RenderContext::new()
            .with_text("title", "same")
            .with_items("delayed_range", DelayedRange::from_permutation(order, delay));
        let cooperative: Vec<String> = runtime.block_on(
            IncrementalRenderer::new(list_template(), ctx, &config())
                .into_stream()
                .map(|f| f.unwrap().into_string())
                .collect(),
        );

        assert_eq!(blocking, cooperative);
        assert_eq!(blocking.len(), 10);
    }
}
