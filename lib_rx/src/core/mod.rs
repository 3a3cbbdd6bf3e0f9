//! # Core Engine Module
//!
//! The primitives every operator and combinator is built from.
//!
//! ## Core Components:
//!
//! - **`message`**: the `Passed` envelope carried by every notification (value,
//!   done or warning).
//!
//! - **`stream`**: the stream node itself. Ordered subscribers, monotonic disposal,
//!   last-value cache, lifecycle hooks and the optional ping capability.
//!
//! - **`upstream`**: binds a derived stream to its sources and implements the three
//!   laziness modes (`never`, `initial`, `very`).
//!
//! - **`registry`**: an opt-in, caller-owned debug registry of live streams.
//!
//! - **`trigger`**: literal-or-producer configuration values.
//!
//! - **`error`**: the `RxError` type shared by the whole crate.

#![forbid(unsafe_code)]

/// The message envelope.
pub mod message;
/// Error type of the engine.
pub mod error;
/// Literal-or-producer configuration values.
pub mod trigger;
/// Debug registry of live streams.
pub mod registry;
/// The stream node and its handles.
pub mod stream;
/// Upstream binding and laziness.
pub mod upstream;

// --- Public API Re-exports ---
pub use error::RxError;
pub use message::Passed;
pub use registry::{RegistryEntry, StreamRegistry};
pub use stream::{
    init_stream, init_stream_with, DisposedPolicy, Emitter, Hook, Stream, StreamOptions, Teardown, Unsubscribe,
    WritableStream,
};
pub use trigger::Trigger;
pub use upstream::{init_upstream, Lazy, UpstreamHandler, UpstreamOptions};
