//! Pull-side producers: everything the engine can ask for "the next value".

use futures_util::stream::LocalBoxStream;
use futures_util::StreamExt;

pub(crate) enum Producer<V> {
    Iter(Box<dyn Iterator<Item = V>>),
    Func(Box<dyn FnMut() -> Option<V>>),
    Async(LocalBoxStream<'static, V>),
}

impl<V> Producer<V> {
    /// Next element, or `None` once the producer is exhausted.
    pub(crate) async fn pull(&mut self) -> Option<V> {
        match self {
            Producer::Iter(it) => it.next(),
            Producer::Func(f) => f(),
            Producer::Async(s) => s.next().await,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Producer::Iter(_) => "sequence",
            Producer::Func(_) => "function",
            Producer::Async(_) => "async sequence",
        }
    }
}
