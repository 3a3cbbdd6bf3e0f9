//! Observation forks. The tapped output always mirrors the source; whatever the
//! side pipeline does with its copy never changes what is published.

use crate::core::error::RxError;
use crate::core::stream::{init_stream, Emitter, Stream, WritableStream};
use crate::core::upstream::{init_upstream, UpstreamHandler, UpstreamOptions};
use crate::sources::Source;

/// Calls `process` with every value before forwarding it.
pub fn tap_process<V, F>(source: impl Into<Source<V>>, process: F) -> Result<Stream<V>, RxError>
where
    V: Clone + 'static,
    F: Fn(&V) + 'static,
{
    init_upstream(source, UpstreamOptions::default(), move |out: &Emitter<V>, v: V| {
        process(&v);
        out.set(v);
    })
}

struct Fork<V> {
    side: WritableStream<V>,
    /// Dispose the side stream along with the output.
    owned: bool,
}

impl<V: Clone + 'static> UpstreamHandler<V, V> for Fork<V> {
    fn on_value(&mut self, out: &Emitter<V>, value: V) {
        if let Err(e) = self.side.set(value.clone()) {
            log::debug!("Tap side stream rejected a value: {}", e);
        }
        out.set(value);
    }

    fn on_dispose(&mut self, reason: &str) {
        if self.owned {
            self.side.dispose(reason);
        }
    }
}

/// Copies every value into `target` before forwarding it. `target` is left
/// alone when the output is disposed.
pub fn tap_stream<V: Clone + 'static>(
    source: impl Into<Source<V>>,
    target: &WritableStream<V>,
) -> Result<Stream<V>, RxError> {
    let fork = Fork {
        side: target.clone(),
        owned: false,
    };
    init_upstream(source, UpstreamOptions::default(), fork)
}

/// Feeds a copy of every value into a side chain built by `build`.
///
/// Returns the tapped output and the end of the side chain. The side chain is
/// disposed together with the output.
pub fn tap_ops<V, W, F>(source: impl Into<Source<V>>, build: F) -> Result<(Stream<V>, Stream<W>), RxError>
where
    V: Clone + 'static,
    W: Clone + 'static,
    F: FnOnce(Stream<V>) -> Result<Stream<W>, RxError>,
{
    let side = init_stream::<V>();
    let side_out = build(side.as_stream())?;
    let fork = Fork { side, owned: true };
    let out = init_upstream(source, UpstreamOptions::default(), fork)?;
    Ok((out, side_out))
}
