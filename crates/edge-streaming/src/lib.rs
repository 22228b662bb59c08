//! Incremental rendering primitives.
//!
//! This crate turns a lazy item source into transport writes:
//! - `Template` - Compiled template with static text, variables and loops
//! - `RenderContext` - Binds named single-pass sources for the renderer
//! - `IncrementalRenderer` / `BlockingRenderer` - Pull-driven fragment producers
//! - `ChunkBuffer` - Groups fragments into chunks by `FlushThreshold`
//! - `StreamingSink` / `BlockingSink` - Transport-facing chunk writers

mod context;
mod escape;
mod flush;
mod render;
mod sink;
mod template;

pub use context::*;
pub use escape::*;
pub use flush::*;
pub use render::*;
pub use sink::*;
pub use template::*;
