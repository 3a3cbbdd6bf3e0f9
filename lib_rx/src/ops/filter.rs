use crate::core::error::RxError;
use crate::core::stream::{Emitter, Stream};
use crate::core::upstream::{init_upstream, UpstreamOptions};
use crate::sources::Source;

/// Forwards only the values for which `predicate` holds.
pub fn filter<V, P>(source: impl Into<Source<V>>, predicate: P) -> Result<Stream<V>, RxError>
where
    V: Clone + 'static,
    P: Fn(&V) -> bool + 'static,
{
    init_upstream(source, UpstreamOptions::default(), move |out: &Emitter<V>, v: V| {
        if predicate(&v) {
            out.set(v);
        }
    })
}

/// Forwards every value except those for which `predicate` holds.
pub fn drop_if<V, P>(source: impl Into<Source<V>>, predicate: P) -> Result<Stream<V>, RxError>
where
    V: Clone + 'static,
    P: Fn(&V) -> bool + 'static,
{
    filter(source, move |v| !predicate(v))
}
