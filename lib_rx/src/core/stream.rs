//! # Core Stream Primitive
//!
//! A `Stream` is a node of the dataflow graph: an ordered registry of subscriber
//! callbacks plus a monotonic disposed flag. Publishing walks a snapshot of the
//! registry, in registration order, before control returns to the publisher.
//! Taking the snapshot first is what lets a handler subscribe, unsubscribe, publish
//! or dispose from inside a notification without corrupting the delivery in flight.
//!
//! ## Handles
//!
//! - **`Stream<V>`**: read side. Cloning it clones an `Rc`, so every clone sees the
//!   same node.
//! - **`WritableStream<V>`**: adds `set` and `signal_warning`. Dereferences to
//!   `Stream<V>`.
//! - **`Emitter<V>`**: a weak writer used by operators. It never keeps the node alive,
//!   so operator state can hold it without forming reference cycles.
//!
//! Every node also owns a lifetime `CancellationToken`. It is cancelled on disposal,
//! and every timer task spawned on behalf of the node selects on it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::error::RxError;
use crate::core::message::Passed;
use crate::core::registry::{Inspect, StreamRegistry};

type Handler<V> = Rc<dyn Fn(&Passed<V>)>;

/// Lifecycle hook invoked on subscriber-count transitions.
pub type Hook = Rc<dyn Fn()>;

/// Teardown hook invoked once, with the disposal reason.
pub type Teardown = Box<dyn FnOnce(&str)>;

/// What `set` does once the stream has been disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisposedPolicy {
    /// Drop the value silently.
    #[default]
    Ignore,
    /// Return `RxError::StreamDisposed`.
    Error,
}

/// Construction options for [`init_stream_with`].
pub struct StreamOptions<V> {
    /// Name used in logs and in the debug registry.
    pub label: Option<String>,
    /// Seeds the last-value cache.
    pub initial: Option<V>,
    pub disposed_policy: DisposedPolicy,
    /// Registry the stream is tracked in for its whole life.
    pub registry: Option<StreamRegistry>,
    /// Fired when the subscriber count goes from zero to one.
    pub on_first_subscribe: Option<Hook>,
    /// Fired when the subscriber count returns to zero. Disposal does not fire it.
    pub on_no_subscribers: Option<Hook>,
    /// Fired once, after the terminal done signal has been delivered.
    pub on_dispose: Option<Teardown>,
}

impl<V> Default for StreamOptions<V> {
    fn default() -> Self {
        Self {
            label: None,
            initial: None,
            disposed_policy: DisposedPolicy::default(),
            registry: None,
            on_first_subscribe: None,
            on_no_subscribers: None,
            on_dispose: None,
        }
    }
}

pub(crate) struct StreamInner<V> {
    label: String,
    subscribers: RefCell<Vec<(u64, Handler<V>)>>,
    next_id: Cell<u64>,
    disposed: Cell<bool>,
    last: RefCell<Option<V>>,
    policy: DisposedPolicy,
    lifetime: CancellationToken,
    ping: RefCell<Option<Hook>>,
    on_first_subscribe: Option<Hook>,
    on_no_subscribers: Option<Hook>,
    on_dispose: RefCell<Option<Teardown>>,
}

impl<V> Inspect for StreamInner<V> {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

/// Removes one registration when called.
///
/// Dropping an `Unsubscribe` without calling it leaves the registration in place.
pub struct Unsubscribe {
    f: Option<Box<dyn FnOnce()>>,
}

impl Unsubscribe {
    pub(crate) fn new(f: impl FnOnce() + 'static) -> Self {
        Self { f: Some(Box::new(f)) }
    }

    pub(crate) fn noop() -> Self {
        Self { f: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").field("armed", &self.f.is_some()).finish()
    }
}

/// Read handle onto a stream node.
pub struct Stream<V> {
    inner: Rc<StreamInner<V>>,
}

impl<V> Clone for Stream<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Stream<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("label", &self.inner.label)
            .field("disposed", &self.inner.disposed.get())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

impl<V: Clone + 'static> Stream<V> {
    /// Registers `handler` for every future message.
    ///
    /// Subscribing to a disposed stream registers nothing: its done signal was
    /// already delivered to the subscribers it had at the time.
    pub fn on(&self, handler: impl Fn(&Passed<V>) + 'static) -> Unsubscribe {
        if self.inner.disposed.get() {
            log::trace!("Subscription to disposed stream '{}' ignored", self.inner.label);
            return Unsubscribe::noop();
        }

        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let first = {
            let handler: Handler<V> = Rc::new(handler);
            let mut subs = self.inner.subscribers.borrow_mut();
            subs.push((id, handler));
            subs.len() == 1
        };

        if first {
            if let Some(hook) = self.inner.on_first_subscribe.clone() {
                hook();
            }
        }

        let weak = Rc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                Stream { inner }.remove(id);
            }
        })
    }

    /// Like [`Stream::on`], reacting to value messages only.
    pub fn on_value(&self, handler: impl Fn(&V) + 'static) -> Unsubscribe {
        self.on(move |msg| {
            if let Passed::Value(v) = msg {
                handler(v);
            }
        })
    }

    /// Disposes the stream. Only the first call has an effect.
    ///
    /// The current subscribers receive exactly one `Done(reason)`, the registry is
    /// cleared, timer tasks bound to the stream are cancelled and the teardown
    /// hook runs.
    pub fn dispose(&self, reason: &str) {
        if self.inner.disposed.replace(true) {
            return;
        }
        log::debug!("Disposing stream '{}': {}", self.inner.label, reason);

        let snapshot: Vec<Handler<V>> = self
            .inner
            .subscribers
            .borrow_mut()
            .drain(..)
            .map(|(_, h)| h)
            .collect();

        let done = Passed::Done(reason.to_string());
        for handler in snapshot {
            handler(&done);
        }

        self.inner.lifetime.cancel();
        self.inner.ping.borrow_mut().take();

        let teardown = self.inner.on_dispose.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown(reason);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Last value published (or the initial value), if any.
    pub fn last(&self) -> Option<V> {
        self.inner.last.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether this stream exposes the ping capability.
    pub fn can_ping(&self) -> bool {
        self.inner.ping.borrow().is_some()
    }

    /// Requests an out-of-band value. Returns `false` when the stream has no ping
    /// capability.
    pub fn ping(&self) -> bool {
        let ping = self.inner.ping.borrow().clone();
        match ping {
            Some(ping) => {
                ping();
                true
            }
            None => false,
        }
    }

    /// Whether both handles point at the same node.
    pub fn ptr_eq(&self, other: &Stream<V>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn track_in(&self, registry: &StreamRegistry, name: &str) {
        let weak: Weak<dyn Inspect> = Rc::downgrade(&self.inner) as Weak<dyn Inspect>;
        registry.track_inspect(name, weak);
    }

    pub(crate) fn lifetime(&self) -> CancellationToken {
        self.inner.lifetime.clone()
    }

    pub(crate) fn emitter(&self) -> Emitter<V> {
        Emitter {
            inner: Rc::downgrade(&self.inner),
            lifetime: self.inner.lifetime.clone(),
        }
    }

    pub(crate) fn install_ping(&self, ping: impl Fn() + 'static) {
        if !self.inner.disposed.get() {
            let ping: Hook = Rc::new(ping);
            *self.inner.ping.borrow_mut() = Some(ping);
        }
    }

    /// Publishes without consulting the disposed policy. Returns whether the value
    /// was delivered.
    pub(crate) fn emit(&self, value: V) -> bool {
        if self.inner.disposed.get() {
            return false;
        }
        *self.inner.last.borrow_mut() = Some(value.clone());
        self.deliver(&Passed::Value(value));
        true
    }

    pub(crate) fn warn(&self, reason: &str) {
        if !self.inner.disposed.get() {
            self.deliver(&Passed::Warning(reason.to_string()));
        }
    }

    fn deliver(&self, msg: &Passed<V>) {
        let snapshot: Vec<Handler<V>> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();

        for handler in snapshot {
            // A handler may dispose the stream; the done signal it sent is final.
            if self.inner.disposed.get() {
                break;
            }
            handler(msg);
        }
    }

    fn remove(&self, id: u64) {
        let now_empty = {
            let mut subs = self.inner.subscribers.borrow_mut();
            let before = subs.len();
            subs.retain(|(sid, _)| *sid != id);
            before != subs.len() && subs.is_empty()
        };

        if now_empty && !self.inner.disposed.get() {
            if let Some(hook) = self.inner.on_no_subscribers.clone() {
                hook();
            }
        }
    }
}

/// Writable handle onto a stream node.
pub struct WritableStream<V> {
    stream: Stream<V>,
}

impl<V> Clone for WritableStream<V> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
        }
    }
}

impl<V> fmt::Debug for WritableStream<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WritableStream").field(&self.stream).finish()
    }
}

impl<V> Deref for WritableStream<V> {
    type Target = Stream<V>;

    fn deref(&self) -> &Stream<V> {
        &self.stream
    }
}

impl<V: Clone + 'static> WritableStream<V> {
    /// Publishes `value` to the current subscribers, synchronously.
    pub fn set(&self, value: V) -> Result<(), RxError> {
        if self.stream.emit(value) {
            return Ok(());
        }
        match self.stream.inner.policy {
            DisposedPolicy::Ignore => {
                log::debug!("Value set on disposed stream '{}' ignored", self.stream.label());
                Ok(())
            }
            DisposedPolicy::Error => Err(RxError::StreamDisposed(self.stream.label().to_string())),
        }
    }

    /// Publishes an advisory warning. No-op once disposed.
    pub fn signal_warning(&self, reason: &str) {
        self.stream.warn(reason);
    }

    pub fn as_stream(&self) -> Stream<V> {
        self.stream.clone()
    }

    pub fn into_stream(self) -> Stream<V> {
        self.stream
    }
}

impl<V> From<WritableStream<V>> for Stream<V> {
    fn from(w: WritableStream<V>) -> Self {
        w.stream
    }
}

/// Weak writer over a stream node.
///
/// Operators keep an `Emitter` in their state and timers; once the node has been
/// dropped or disposed every call is a no-op.
pub struct Emitter<V> {
    inner: Weak<StreamInner<V>>,
    lifetime: CancellationToken,
}

impl<V> Clone for Emitter<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
            lifetime: self.lifetime.clone(),
        }
    }
}

impl<V: Clone + 'static> Emitter<V> {
    pub fn stream(&self) -> Option<Stream<V>> {
        self.inner.upgrade().map(|inner| Stream { inner })
    }

    /// Publishes `value`. Returns whether it was delivered.
    pub fn set(&self, value: V) -> bool {
        match self.stream() {
            Some(s) => s.emit(value),
            None => false,
        }
    }

    pub fn warn(&self, reason: &str) {
        if let Some(s) = self.stream() {
            s.warn(reason);
        }
    }

    pub fn dispose(&self, reason: &str) {
        if let Some(s) = self.stream() {
            s.dispose(reason);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.lifetime.is_cancelled() || self.inner.strong_count() == 0
    }

    /// Token cancelled when the node is disposed.
    pub fn lifetime(&self) -> CancellationToken {
        self.lifetime.clone()
    }
}

/// Creates a writable stream with default options.
pub fn init_stream<V: Clone + 'static>() -> WritableStream<V> {
    init_stream_with(StreamOptions::default())
}

/// Creates a writable stream.
pub fn init_stream_with<V: Clone + 'static>(options: StreamOptions<V>) -> WritableStream<V> {
    let inner = Rc::new(StreamInner {
        label: options.label.unwrap_or_else(|| "stream".to_string()),
        subscribers: RefCell::new(Vec::new()),
        next_id: Cell::new(0),
        disposed: Cell::new(false),
        last: RefCell::new(options.initial),
        policy: options.disposed_policy,
        lifetime: CancellationToken::new(),
        ping: RefCell::new(None),
        on_first_subscribe: options.on_first_subscribe,
        on_no_subscribers: options.on_no_subscribers,
        on_dispose: RefCell::new(options.on_dispose),
    });

    if let Some(registry) = &options.registry {
        let weak: Weak<dyn Inspect> = Rc::downgrade(&inner) as Weak<dyn Inspect>;
        registry.track_inspect(&inner.label, weak);
    }

    WritableStream {
        stream: Stream { inner },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<V: Clone + 'static>(stream: &Stream<V>) -> (Rc<RefCell<Vec<Passed<V>>>>, Unsubscribe) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let unsub = stream.on(move |msg| sink.borrow_mut().push(msg.clone()));
        (seen, unsub)
    }

    #[test]
    fn test_set_reaches_subscribers_in_order() {
        let s = init_stream::<i32>();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            s.on_value(move |v| order.borrow_mut().push(format!("{tag}{v}")));
        }
        s.set(1).unwrap();
        assert_eq!(*order.borrow(), vec!["a1", "b1", "c1"]);
        assert_eq!(s.last(), Some(1));
    }

    #[test]
    fn test_unsubscribe_removes_only_that_registration() {
        let s = init_stream::<i32>();
        let (first, unsub) = recorder(&s);
        let (second, _keep) = recorder(&s);
        s.set(1).unwrap();
        unsub.unsubscribe();
        s.set(2).unwrap();
        assert_eq!(*first.borrow(), vec![Passed::Value(1)]);
        assert_eq!(*second.borrow(), vec![Passed::Value(1), Passed::Value(2)]);
    }

    #[test]
    fn test_dispose_delivers_single_done_and_is_idempotent() {
        let s = init_stream::<i32>();
        let (seen, _u) = recorder(&s);
        s.dispose("first");
        s.dispose("second");
        assert!(s.is_disposed());
        assert_eq!(*seen.borrow(), vec![Passed::Done("first".to_string())]);
        assert_eq!(s.subscriber_count(), 0);
    }

    #[test]
    fn test_set_after_dispose_follows_policy() {
        let ignoring = init_stream::<i32>();
        let (seen, _u) = recorder(&ignoring);
        ignoring.dispose("gone");
        assert_eq!(ignoring.set(5), Ok(()));
        assert_eq!(seen.borrow().len(), 1);

        let strict = init_stream_with::<i32>(StreamOptions {
            label: Some("strict".to_string()),
            disposed_policy: DisposedPolicy::Error,
            ..Default::default()
        });
        strict.dispose("gone");
        assert_eq!(strict.set(5), Err(RxError::StreamDisposed("strict".to_string())));
    }

    #[test]
    fn test_subscribing_after_dispose_yields_nothing() {
        let s = init_stream::<i32>();
        s.dispose("early");
        let (seen, _u) = recorder(&s);
        let _ = s.set(1);
        assert!(seen.borrow().is_empty());
        assert_eq!(s.subscriber_count(), 0);
    }

    #[test]
    fn test_hooks_fire_on_count_transitions() {
        let firsts = Rc::new(Cell::new(0));
        let nones = Rc::new(Cell::new(0));
        let torn = Rc::new(RefCell::new(None::<String>));
        let (f, n, t) = (Rc::clone(&firsts), Rc::clone(&nones), Rc::clone(&torn));
        let s = init_stream_with::<i32>(StreamOptions {
            on_first_subscribe: Some(Rc::new(move || f.set(f.get() + 1))),
            on_no_subscribers: Some(Rc::new(move || n.set(n.get() + 1))),
            on_dispose: Some(Box::new(move |r: &str| *t.borrow_mut() = Some(r.to_string()))),
            ..Default::default()
        });

        let a = s.on(|_| {});
        let b = s.on(|_| {});
        assert_eq!(firsts.get(), 1);
        a.unsubscribe();
        assert_eq!(nones.get(), 0);
        b.unsubscribe();
        assert_eq!(nones.get(), 1);
        let _c = s.on(|_| {});
        assert_eq!(firsts.get(), 2);

        s.dispose("bye");
        assert_eq!(nones.get(), 1);
        assert_eq!(torn.borrow().as_deref(), Some("bye"));
    }

    #[test]
    fn test_reentrant_unsubscribe_and_dispose_during_delivery() {
        let s = init_stream::<i32>();
        let slot: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));
        let slot_in = Rc::clone(&slot);
        let writer = s.clone();
        let first = s.on_value(move |v| {
            if let Some(u) = slot_in.borrow_mut().take() {
                u.unsubscribe();
            }
            if *v == 2 {
                writer.dispose("stop at two");
            }
        });
        let (seen, unsub_second) = recorder(&s);
        *slot.borrow_mut() = Some(unsub_second);

        // Snapshot taken before delivery: the second handler still sees 1.
        s.set(1).unwrap();
        s.set(2).unwrap();
        assert_eq!(*seen.borrow(), vec![Passed::Value(1)]);
        assert!(s.is_disposed());
        first.unsubscribe();
    }

    #[test]
    fn test_dispose_from_handler_stops_value_delivery() {
        let s = init_stream::<i32>();
        let writer = s.clone();
        let _a = s.on_value(move |_| writer.dispose("first handler"));
        let (seen, _b) = recorder(&s);
        s.set(1).unwrap();
        assert_eq!(*seen.borrow(), vec![Passed::Done("first handler".to_string())]);
    }

    #[test]
    fn test_ping_capability_is_explicit() {
        let s = init_stream::<i32>();
        assert!(!s.can_ping());
        assert!(!s.ping());

        let writer = s.clone();
        s.install_ping(move || {
            let _ = writer.set(42);
        });
        let (seen, _u) = recorder(&s);
        assert!(s.ping());
        assert_eq!(*seen.borrow(), vec![Passed::Value(42)]);

        s.dispose("done");
        assert!(!s.can_ping());
    }

    #[test]
    fn test_emitter_is_weak() {
        let s = init_stream::<i32>();
        let emitter = s.emitter();
        assert!(!emitter.is_disposed());
        assert!(emitter.set(1));
        drop(s);
        assert!(emitter.is_disposed());
        assert!(!emitter.set(2));
    }
}
