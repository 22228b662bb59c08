//! The pull capability a render context binds.

use async_trait::async_trait;
use edge_core::StreamError;
use futures::stream::{self, Stream};

use crate::item::Item;

/// Produces the next item or an end-of-sequence signal, possibly
/// suspending in between.
///
/// Single-pass: once `Ok(None)` or an error has been returned the source is
/// spent. Implementations hand out at most one item per call and never
/// prefetch.
#[async_trait]
pub trait ItemSource: Send {
    /// Wait for and return the next item, `None` once exhausted.
    async fn next_item(&mut self) -> Result<Option<Item>, StreamError>;
}

#[async_trait]
impl<T: ItemSource + ?Sized> ItemSource for Box<T> {
    async fn next_item(&mut self) -> Result<Option<Item>, StreamError> {
        (**self).next_item().await
    }
}

/// Blocking counterpart of [`ItemSource`]: each call may park the calling
/// thread.
pub trait BlockingItemSource: Send {
    /// Block until the next item is available, `None` once exhausted.
    fn next_item(&mut self) -> Result<Option<Item>, StreamError>;
}

impl<T: BlockingItemSource + ?Sized> BlockingItemSource for Box<T> {
    fn next_item(&mut self) -> Result<Option<Item>, StreamError> {
        (**self).next_item()
    }
}

/// Adapt a cooperative source into a `Stream`, ending after the first error.
pub fn into_stream<S>(source: S) -> impl Stream<Item = Result<Item, StreamError>> + Send
where
    S: ItemSource + 'static,
{
    stream::unfold(Some(source), |state| async move {
        let Some(mut source) = state else {
            return None;
        };
        match source.next_item().await {
            Ok(Some(item)) => Some((Ok(item), Some(source))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Iterator over a blocking source, ending after the first error.
pub struct BlockingIter<S> {
    source: Option<S>,
}

impl<S: BlockingItemSource> BlockingIter<S> {
    /// Wrap a blocking source.
    pub fn new(source: S) -> Self {
        Self {
            source: Some(source),
        }
    }
}

impl<S: BlockingItemSource> Iterator for BlockingIter<S> {
    type Item = Result<Item, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.source.as_mut()?;
        match source.next_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.source = None;
                None
            }
            Err(e) => {
                self.source = None;
                Some(Err(e))
            }
        }
    }
}
