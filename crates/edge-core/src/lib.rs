//! Core abstractions for incremental document streaming.
//!
//! This crate provides the fundamental types shared by every stage:
//! - `StreamConfig` - Item count, per-item delay and flush threshold
//! - `StreamError` - Failure taxonomy for a stream session
//! - `SessionPhase` - Session lifecycle tracking
//! - `CancelToken` - Cancellation shared by both execution models
//! - `RequestId` - Session identifier for logs and headers

mod cancel;
mod config;
mod error;
mod id;
mod lifecycle;

pub use cancel::*;
pub use config::*;
pub use error::*;
pub use id::*;
pub use lifecycle::*;
