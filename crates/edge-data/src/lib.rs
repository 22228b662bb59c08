//! Lazy item sources for incremental streaming.
//!
//! This crate produces the data a stream session waits on:
//! - `ItemSource` / `BlockingItemSource` - The pull capability the renderer binds
//! - `Permutation` - Shuffled `[0, n)` order with a cursor
//! - `DelayedRange` - Cooperative source, waits on the async timer
//! - `BlockingDelayedRange` - Blocking source, parks the calling thread

mod blocking;
mod delayed;
mod item;
mod permutation;
mod source;

pub use blocking::*;
pub use delayed::*;
pub use item::*;
pub use permutation::*;
pub use source::*;
