//! # Single-Source Operators
//!
//! Every operator takes one source and returns a new derived stream built on the
//! upstream binding layer. Misconfiguration is reported when the operator is
//! built, never while values flow.

pub mod collect;
pub mod compute_with_previous;
pub mod debounce;
pub mod field;
pub mod filter;
pub mod pipe;
pub mod split;
pub mod tap;
pub mod throttle;
pub mod timeout;
pub mod transform;

pub use collect::{to_array, ToArrayOptions};
pub use compute_with_previous::{compute_with_previous, compute_with_previous_with};
pub use debounce::{debounce, DebounceOptions};
pub use field::{field, FieldOptions};
pub use filter::{drop_if, filter};
pub use pipe::pipe;
pub use split::{split, split_labelled, SplitOptions};
pub use tap::{tap_ops, tap_process, tap_stream};
pub use throttle::{throttle, ThrottleOptions};
pub use timeout::{timeout_ping, timeout_value, TimeoutPingOptions, TimeoutValueOptions};
pub use transform::{annotate, transform, transform_with, try_transform, TransformErrorPolicy, TryTransformOptions};
