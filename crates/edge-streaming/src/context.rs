//! Render context: the names a template can see.

use std::collections::HashMap;

use edge_core::StreamError;

enum Binding<S> {
    Text(String),
    Items(S),
    Consumed,
}

/// Maps template-visible names to text values and single-pass sources.
///
/// The mapping is fixed once rendering starts. A bound source is handed to
/// the renderer at most once; a second loop over the same name fails with a
/// render error.
pub struct RenderContext<S> {
    bindings: HashMap<String, Binding<S>>,
}

impl<S> RenderContext<S> {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Bind a source under `name`.
    pub fn with_items(mut self, name: impl Into<String>, source: S) -> Self {
        self.bindings.insert(name.into(), Binding::Items(source));
        self
    }

    /// Bind a text value under `name`.
    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(name.into(), Binding::Text(value.into()));
        self
    }

    /// Check if `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Look up a text value.
    pub fn text(&self, name: &str) -> Result<&str, StreamError> {
        match self.bindings.get(name) {
            Some(Binding::Text(value)) => Ok(value),
            Some(_) => Err(StreamError::RenderFailure(format!(
                "`{}` is a source, not a value",
                name
            ))),
            None => Err(StreamError::RenderFailure(format!(
                "unbound variable `{}`",
                name
            ))),
        }
    }

    /// Hand the source bound as `name` to the renderer.
    pub fn take_items(&mut self, name: &str) -> Result<S, StreamError> {
        let Some(binding) = self.bindings.get_mut(name) else {
            return Err(StreamError::RenderFailure(format!(
                "no source bound to `{}`",
                name
            )));
        };
        match std::mem::replace(binding, Binding::Consumed) {
            Binding::Items(source) => Ok(source),
            Binding::Consumed => Err(StreamError::RenderFailure(format!(
                "source `{}` was already iterated",
                name
            ))),
            text @ Binding::Text(_) => {
                *binding = text;
                Err(StreamError::RenderFailure(format!(
                    "`{}` is not iterable",
                    name
                )))
            }
        }
    }
}

impl<S> Default for RenderContext<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_items_is_single_pass() {
        let mut ctx = RenderContext::new().with_items("range", vec![1, 2, 3]);
        assert_eq!(ctx.take_items("range").unwrap(), vec![1, 2, 3]);

        let err = ctx.take_items("range").unwrap_err();
        assert!(matches!(err, StreamError::RenderFailure(msg) if msg.contains("already")));
        assert!(ctx.contains("range"));
    }

    #[test]
    fn test_text_lookup() {
        let ctx: RenderContext<()> = RenderContext::new().with_text("title", "Streaming");
        assert_eq!(ctx.text("title").unwrap(), "Streaming");
        assert!(ctx.text("missing").is_err());
    }

    #[test]
    fn test_text_is_not_iterable() {
        let mut ctx: RenderContext<()> = RenderContext::new().with_text("title", "x");
        assert!(ctx.take_items("title").is_err());
        // Value survives the failed take.
        assert_eq!(ctx.text("title").unwrap(), "x");
    }

    #[test]
    fn test_source_is_not_a_value() {
        let mut ctx = RenderContext::new().with_items("range", ());
        assert!(ctx.text("range").is_err());
        assert!(ctx.take_items("nope").is_err());
    }
}
