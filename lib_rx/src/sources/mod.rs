//! # Source Resolution
//!
//! Normalizes everything that can feed a stream into a [`Stream`]. Streams pass
//! through untouched. Sequences, functions and async sequences are pumped: one
//! element is pulled, handed to the feed channel, then the pump waits the pacing
//! interval before pulling again. Exhaustion ends the stream with
//! `Done("source exhausted")`.
//!
//! Pumped streams are lazy like any derived stream. With `Lazy::Very` the pump
//! pauses when the last subscriber leaves and resumes from where it stopped when
//! the next one arrives.

pub mod channel;
mod producer;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use futures_util::stream::LocalBoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::error::RxError;
use crate::core::stream::{init_stream_with, Hook, Stream, StreamOptions, WritableStream};
use crate::core::trigger::Trigger;
use crate::core::upstream::Lazy;

pub use channel::Pusher;
use channel::Feed;
use producer::Producer;

pub const DEFAULT_PACING: Duration = Duration::from_millis(5);
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const EXHAUSTED: &str = "source exhausted";

/// Anything a stream can be built from.
pub enum Source<V> {
    Stream(Stream<V>),
    Array(Vec<V>),
    /// Called once per pull; `None` means no more values.
    Function(Box<dyn FnMut() -> Option<V>>),
    Iterator(Box<dyn Iterator<Item = V>>),
    Async(LocalBoxStream<'static, V>),
}

impl<V> Source<V> {
    pub fn function(f: impl FnMut() -> Option<V> + 'static) -> Self {
        Source::Function(Box::new(f))
    }

    pub fn iter(it: impl IntoIterator<Item = V> + 'static) -> Self
    where
        V: 'static,
    {
        Source::Iterator(Box::new(it.into_iter()))
    }

    pub fn from_async(s: impl futures_util::Stream<Item = V> + 'static) -> Self {
        Source::Async(Box::pin(s))
    }
}

impl Source<serde_json::Value> {
    /// Accepts a JSON array as an ordered sequence. Anything else is rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self, RxError> {
        match value {
            serde_json::Value::Array(items) => Ok(Source::Array(items)),
            other => {
                let kind = match other {
                    serde_json::Value::Null => "null",
                    serde_json::Value::Bool(_) => "boolean",
                    serde_json::Value::Number(_) => "number",
                    serde_json::Value::String(_) => "string",
                    _ => "object",
                };
                Err(RxError::UnresolvableSource(format!("expected an array, got {}", kind)))
            }
        }
    }
}

impl<V> fmt::Debug for Source<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stream(s) => f.debug_tuple("Stream").field(s).finish(),
            Source::Array(items) => write!(f, "Array(len={})", items.len()),
            Source::Function(_) => f.write_str("Function(..)"),
            Source::Iterator(_) => f.write_str("Iterator(..)"),
            Source::Async(_) => f.write_str("Async(..)"),
        }
    }
}

impl<V> From<Stream<V>> for Source<V> {
    fn from(s: Stream<V>) -> Self {
        Source::Stream(s)
    }
}

impl<V> From<&Stream<V>> for Source<V> {
    fn from(s: &Stream<V>) -> Self {
        Source::Stream(s.clone())
    }
}

impl<V> From<WritableStream<V>> for Source<V> {
    fn from(s: WritableStream<V>) -> Self {
        Source::Stream(s.into())
    }
}

impl<V> From<&WritableStream<V>> for Source<V> {
    fn from(s: &WritableStream<V>) -> Self {
        Source::Stream(Stream::clone(s))
    }
}

impl<V> From<Vec<V>> for Source<V> {
    fn from(items: Vec<V>) -> Self {
        Source::Array(items)
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Pause between two pulls.
    pub interval: Trigger<Duration>,
    pub lazy: Lazy,
    /// Bound of the feed queue between producer and stream.
    pub capacity: usize,
    pub label: Option<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            interval: Trigger::Literal(DEFAULT_PACING),
            lazy: Lazy::Initial,
            capacity: DEFAULT_QUEUE_CAPACITY,
            label: None,
        }
    }
}

/// Turns `source` into a stream.
///
/// Pumped sources spawn local tasks, so this must run inside a
/// `tokio::task::LocalSet`.
pub fn resolve_source<V: Clone + 'static>(
    source: impl Into<Source<V>>,
    options: &ResolveOptions,
) -> Result<Stream<V>, RxError> {
    let producer = match source.into() {
        Source::Stream(s) => return Ok(s),
        Source::Array(items) => Producer::Iter(Box::new(items.into_iter())),
        Source::Function(f) => Producer::Func(f),
        Source::Iterator(it) => Producer::Iter(it),
        Source::Async(s) => Producer::Async(s),
    };
    Ok(pump(producer, options))
}

/// Creates a stream fed by callbacks through a bounded queue.
///
/// The stream ends when [`Pusher::end`] is called or every `Pusher` is dropped.
pub fn push_source<V: Clone + 'static>(options: &ResolveOptions) -> (Pusher<V>, Stream<V>) {
    let label = options.label.clone().unwrap_or_else(|| "push source".to_string());
    let out = init_stream_with::<V>(StreamOptions {
        label: Some(label.clone()),
        ..Default::default()
    });
    let tx = channel::open(&label, out.emitter(), options.capacity);
    (Pusher::new(label, tx), out.into_stream())
}

struct Link<V> {
    tx: mpsc::Sender<Feed<V>>,
    lifetime: CancellationToken,
}

impl<V> Clone for Link<V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            lifetime: self.lifetime.clone(),
        }
    }
}

struct Pump<V> {
    label: String,
    interval: Trigger<Duration>,
    /// Parked producer; taken by the running task.
    producer: RefCell<Option<Producer<V>>>,
    link: RefCell<Option<Link<V>>>,
    want: Cell<bool>,
    task_live: Cell<bool>,
}

impl<V: Clone + 'static> Pump<V> {
    fn resume(self: &Rc<Self>) {
        self.want.set(true);
        if self.task_live.get() {
            return;
        }
        let link = match self.link.borrow().clone() {
            Some(link) => link,
            None => return,
        };
        let producer = match self.producer.borrow_mut().take() {
            Some(p) => p,
            None => return,
        };
        log::trace!("Pump for '{}' starts pulling from a {}", self.label, producer.kind());

        self.task_live.set(true);
        let pump = Rc::clone(self);
        tokio::task::spawn_local(async move {
            pump.run(producer, link).await;
        });
    }

    fn pause(&self) {
        self.want.set(false);
    }

    async fn run(self: Rc<Self>, mut producer: Producer<V>, link: Link<V>) {
        loop {
            if !self.want.get() {
                log::trace!("Pump for '{}' paused", self.label);
                *self.producer.borrow_mut() = Some(producer);
                break;
            }

            let next = tokio::select! {
                _ = link.lifetime.cancelled() => break,
                next = producer.pull() => next,
            };
            match next {
                Some(v) => {
                    if link.tx.send(Feed::Value(v)).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = link.tx.send(Feed::End(EXHAUSTED.to_string())).await;
                    break;
                }
            }

            let pause = self.interval.resolve();
            tokio::select! {
                _ = link.lifetime.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        self.task_live.set(false);
    }
}

fn pump<V: Clone + 'static>(producer: Producer<V>, options: &ResolveOptions) -> Stream<V> {
    let state = Rc::new(Pump {
        label: options.label.clone().unwrap_or_else(|| "resolved source".to_string()),
        interval: options.interval.clone(),
        producer: RefCell::new(Some(producer)),
        link: RefCell::new(None),
        want: Cell::new(false),
        task_live: Cell::new(false),
    });

    let on_first: Hook = {
        let p = Rc::clone(&state);
        Rc::new(move || p.resume())
    };
    let on_none: Option<Hook> = match options.lazy {
        Lazy::Very => {
            let p = Rc::clone(&state);
            Some(Rc::new(move || p.pause()))
        }
        _ => None,
    };

    let out = init_stream_with::<V>(StreamOptions {
        label: Some(state.label.clone()),
        on_first_subscribe: Some(on_first),
        on_no_subscribers: on_none,
        ..Default::default()
    });
    let lifetime = out.lifetime();
    let tx = channel::open(&state.label, out.emitter(), options.capacity);
    *state.link.borrow_mut() = Some(Link { tx, lifetime });

    if options.lazy == Lazy::Never {
        state.resume();
    }
    out.into_stream()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_rejects_non_arrays() {
        assert!(Source::from_json(json!([1, 2])).is_ok());
        let err = Source::from_json(json!({"a": 1})).unwrap_err();
        assert_eq!(err, RxError::UnresolvableSource("expected an array, got object".to_string()));
    }

    #[test]
    fn test_stream_resolves_to_itself() {
        let s = crate::core::stream::init_stream::<i32>();
        let resolved = resolve_source(&s, &ResolveOptions::default()).unwrap();
        assert!(resolved.ptr_eq(&s));
    }
}
