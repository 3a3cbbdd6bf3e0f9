//! # lib_rx
//!
//! A single-threaded, push-based reactive stream engine. Streams are nodes of a
//! dataflow graph with an explicit lifecycle: they are created by a producer or
//! derived from other streams, connect to their sources lazily, and end with
//! exactly one done signal.
//!
//! Everything runs on a tokio current-thread runtime inside a
//! `tokio::task::LocalSet`: pumped sources, operator timers and the feed channel
//! are `spawn_local` tasks.

// Declare the modules to re-export
pub mod combinators;
pub mod configs;
pub mod core;
pub mod ops;
pub mod sources;

// Re-export everything
pub use crate::combinators::*;
pub use crate::configs::*;
pub use crate::core::*;
pub use crate::ops::*;
pub use crate::sources::{push_source, resolve_source, Pusher, ResolveOptions, Source};
