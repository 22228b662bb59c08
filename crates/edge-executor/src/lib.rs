//! Stream session execution.
//!
//! Binds a delayed item source, an incremental renderer, a chunk buffer and
//! a transport into one session, in either execution model:
//! - `StreamSession::into_stream` / `run` - cooperative, timer-driven waits
//! - `StreamSession::into_blocking_stream` / `run_blocking` - dedicated thread
//! - `SessionHandle` - phase inspection and explicit abort

mod session;
mod stream;
mod tracker;

pub use session::*;
pub use stream::SessionStream;
pub use tracker::{SessionHandle, SessionReport};
