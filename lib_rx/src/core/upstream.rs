//! # Upstream Binding & Laziness
//!
//! A derived stream is driven by one or more sources. The binding decides *when*
//! it is connected to them, following a reference-counting scheme on the derived
//! stream's own subscribers:
//!
//! - **`Lazy::Never`**: connected at construction and stays connected.
//! - **`Lazy::Initial`**: connected on the first subscriber, then stays connected
//!   even if every subscriber leaves.
//! - **`Lazy::Very`**: connected only while at least one subscriber exists. The
//!   count returning to zero detaches from the sources; the next subscriber
//!   reattaches.
//!
//! Disposal of the derived stream always detaches, and is terminal.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::error::RxError;
use crate::core::message::Passed;
use crate::core::registry::StreamRegistry;
use crate::core::stream::{init_stream_with, Emitter, Hook, Stream, StreamOptions, Teardown, Unsubscribe};
use crate::sources::{resolve_source, ResolveOptions, Source};

/// When a derived stream connects to its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lazy {
    Never,
    #[default]
    Initial,
    Very,
}

#[derive(Debug, Clone)]
pub struct UpstreamOptions {
    pub lazy: Lazy,
    /// A done signal from the source disposes the derived stream. Otherwise the
    /// derived stream stays alive but silent.
    pub dispose_if_source_done: bool,
    /// Cancelling this token disposes the derived stream.
    pub abort: Option<CancellationToken>,
    pub label: Option<String>,
    pub registry: Option<StreamRegistry>,
}

impl Default for UpstreamOptions {
    fn default() -> Self {
        Self {
            lazy: Lazy::Initial,
            dispose_if_source_done: true,
            abort: None,
            label: None,
            registry: None,
        }
    }
}

impl UpstreamOptions {
    pub fn with_lazy(lazy: Lazy) -> Self {
        Self {
            lazy,
            ..Default::default()
        }
    }
}

/// Per-message logic of a single-source derived stream.
///
/// Closures `FnMut(&Emitter<Out>, In)` implement it with the default signal
/// handling: source done disposes the output when configured to, warnings are
/// forwarded.
pub trait UpstreamHandler<In, Out: Clone + 'static> {
    fn on_value(&mut self, out: &Emitter<Out>, value: In);

    /// Returns whether the output should be disposed now.
    fn on_source_done(&mut self, _out: &Emitter<Out>, _reason: &str, dispose_if_source_done: bool) -> bool {
        dispose_if_source_done
    }

    fn on_warning(&mut self, out: &Emitter<Out>, reason: &str) {
        out.warn(reason);
    }

    /// Called once when the output is disposed.
    fn on_dispose(&mut self, _reason: &str) {}
}

impl<In, Out, F> UpstreamHandler<In, Out> for F
where
    Out: Clone + 'static,
    F: FnMut(&Emitter<Out>, In),
{
    fn on_value(&mut self, out: &Emitter<Out>, value: In) {
        self(out, value)
    }
}

type Connect<Out> = Box<dyn FnMut(&Emitter<Out>) -> Vec<Unsubscribe>>;

struct Binding<Out> {
    mode: Lazy,
    emitter: RefCell<Option<Emitter<Out>>>,
    connect: RefCell<Connect<Out>>,
    subscriptions: RefCell<Vec<Unsubscribe>>,
    active: Cell<bool>,
}

impl<Out: Clone + 'static> Binding<Out> {
    fn start(&self) {
        let emitter = match self.emitter.borrow().clone() {
            Some(e) => e,
            None => return,
        };
        if emitter.is_disposed() || self.active.replace(true) {
            return;
        }

        let subs = (self.connect.borrow_mut())(&emitter);

        if emitter.is_disposed() {
            // Connecting saw a finished source and disposed us already.
            for sub in subs {
                sub.unsubscribe();
            }
            return;
        }
        self.subscriptions.borrow_mut().extend(subs);
    }

    fn stop(&self) {
        if !self.active.replace(false) {
            return;
        }
        let subs: Vec<Unsubscribe> = self.subscriptions.borrow_mut().drain(..).collect();
        for sub in subs {
            sub.unsubscribe();
        }
    }
}

/// Builds a derived stream whose connection to its sources is made by `connect`.
///
/// `connect` runs on every activation and returns the registrations released
/// when the binding goes idle or is disposed.
pub(crate) fn bind<Out, C>(options: &UpstreamOptions, on_dispose: Option<Teardown>, connect: C) -> Stream<Out>
where
    Out: Clone + 'static,
    C: FnMut(&Emitter<Out>) -> Vec<Unsubscribe> + 'static,
{
    let binding = Rc::new(Binding {
        mode: options.lazy,
        emitter: RefCell::new(None),
        connect: RefCell::new(Box::new(connect)),
        subscriptions: RefCell::new(Vec::new()),
        active: Cell::new(false),
    });

    let on_first: Hook = {
        let b = Rc::clone(&binding);
        Rc::new(move || b.start())
    };
    let on_none: Hook = {
        let b = Rc::clone(&binding);
        Rc::new(move || {
            if b.mode == Lazy::Very {
                b.stop();
            }
        })
    };
    let teardown: Teardown = {
        let b = Rc::clone(&binding);
        Box::new(move |reason: &str| {
            b.stop();
            if let Some(f) = on_dispose {
                f(reason);
            }
        })
    };

    let out = init_stream_with::<Out>(StreamOptions {
        label: options.label.clone(),
        registry: options.registry.clone(),
        on_first_subscribe: Some(on_first),
        on_no_subscribers: Some(on_none),
        on_dispose: Some(teardown),
        ..Default::default()
    });
    let emitter = out.emitter();
    *binding.emitter.borrow_mut() = Some(emitter.clone());

    if let Some(abort) = options.abort.clone() {
        watch_abort(abort, emitter);
    }
    if binding.mode == Lazy::Never {
        binding.start();
    }
    out.into_stream()
}

/// Disposes the stream behind `out` once `abort` fires.
pub(crate) fn watch_abort<Out: Clone + 'static>(abort: CancellationToken, out: Emitter<Out>) {
    let reason = RxError::AbortedExternally("abort signal fired".to_string()).to_string();
    if abort.is_cancelled() {
        out.dispose(&reason);
        return;
    }
    let lifetime = out.lifetime();
    tokio::task::spawn_local(async move {
        tokio::select! {
            _ = abort.cancelled() => {
                log::debug!("Abort received, disposing derived stream");
                out.dispose(&reason);
            }
            _ = lifetime.cancelled() => {}
        }
    });
}

/// Derives a stream from one source, re-emitting whatever `handler` decides.
///
/// The source is resolved with default [`ResolveOptions`].
pub fn init_upstream<In, Out, H>(
    source: impl Into<Source<In>>,
    options: UpstreamOptions,
    handler: H,
) -> Result<Stream<Out>, RxError>
where
    In: Clone + 'static,
    Out: Clone + 'static,
    H: UpstreamHandler<In, Out> + 'static,
{
    let source = resolve_source(source, &ResolveOptions::default())?;
    Ok(bind_source(source, options, handler))
}

pub(crate) fn bind_source<In, Out, H>(source: Stream<In>, options: UpstreamOptions, handler: H) -> Stream<Out>
where
    In: Clone + 'static,
    Out: Clone + 'static,
    H: UpstreamHandler<In, Out> + 'static,
{
    let handler = Rc::new(RefCell::new(handler));
    // Disposal can be triggered from inside a handler call; the teardown then
    // runs once that call has returned.
    let deferred: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let dispose_if_done = options.dispose_if_source_done;

    let teardown: Teardown = {
        let h = Rc::clone(&handler);
        let deferred = Rc::clone(&deferred);
        Box::new(move |reason: &str| match h.try_borrow_mut() {
            Ok(mut h) => h.on_dispose(reason),
            Err(_) => *deferred.borrow_mut() = Some(reason.to_string()),
        })
    };

    bind(&options, Some(teardown), move |out: &Emitter<Out>| {
        if source.is_disposed() {
            let dispose = handler
                .borrow_mut()
                .on_source_done(out, "source already disposed", dispose_if_done);
            if dispose {
                out.dispose("source already disposed");
            }
            return Vec::new();
        }

        let h = Rc::clone(&handler);
        let deferred = Rc::clone(&deferred);
        let out = out.clone();
        // Messages arriving while the handler runs (a downstream subscriber
        // setting the source again) wait here and are handled in order afterwards.
        let queue: RefCell<VecDeque<Passed<In>>> = RefCell::new(VecDeque::new());
        let draining = Cell::new(false);
        let sub = source.on(move |msg| {
            queue.borrow_mut().push_back(msg.clone());
            if draining.replace(true) {
                return;
            }
            loop {
                let next = queue.borrow_mut().pop_front();
                let Some(msg) = next else { break };
                if out.is_disposed() {
                    queue.borrow_mut().clear();
                    break;
                }
                match msg {
                    Passed::Value(v) => h.borrow_mut().on_value(&out, v),
                    Passed::Warning(reason) => h.borrow_mut().on_warning(&out, &reason),
                    Passed::Done(reason) => {
                        let dispose = h.borrow_mut().on_source_done(&out, &reason, dispose_if_done);
                        if dispose {
                            out.dispose(&reason);
                        }
                    }
                }
                let pending = deferred.borrow_mut().take();
                if let Some(reason) = pending {
                    h.borrow_mut().on_dispose(&reason);
                }
            }
            draining.set(false);
        });
        vec![sub]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::init_stream;

    fn passthrough<V: Clone + 'static>(source: &Stream<V>, options: UpstreamOptions) -> Stream<V> {
        bind_source(source.clone(), options, |out: &Emitter<V>, v: V| {
            out.set(v);
        })
    }

    #[test]
    fn test_lazy_initial_connects_on_first_subscriber_and_stays() {
        let source = init_stream::<i32>();
        let derived = passthrough(&source, UpstreamOptions::default());
        assert_eq!(source.subscriber_count(), 0);

        let sub = derived.on(|_| {});
        assert_eq!(source.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(source.subscriber_count(), 1);
    }

    #[test]
    fn test_lazy_never_connects_at_construction() {
        let source = init_stream::<i32>();
        let derived = passthrough(&source, UpstreamOptions::with_lazy(Lazy::Never));
        assert_eq!(source.subscriber_count(), 1);
        source.set(4).unwrap();
        assert_eq!(derived.last(), Some(4));
    }

    #[test]
    fn test_lazy_very_detaches_and_reattaches() {
        let source = init_stream::<i32>();
        let derived = passthrough(&source, UpstreamOptions::with_lazy(Lazy::Very));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let sub = derived.on_value(move |v| s.borrow_mut().push(*v));
        source.set(1).unwrap();
        sub.unsubscribe();
        assert_eq!(source.subscriber_count(), 0);
        source.set(2).unwrap();

        let s = Rc::clone(&seen);
        let _sub = derived.on_value(move |v| s.borrow_mut().push(*v));
        assert_eq!(source.subscriber_count(), 1);
        source.set(3).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 3]);
    }

    #[test]
    fn test_source_done_disposes_when_configured() {
        let source = init_stream::<i32>();
        let derived = passthrough(&source, UpstreamOptions::default());
        let done = Rc::new(RefCell::new(Vec::new()));
        let d = Rc::clone(&done);
        let _sub = derived.on(move |m| d.borrow_mut().push(m.clone()));
        source.dispose("upstream finished");
        assert!(derived.is_disposed());
        assert_eq!(*done.borrow(), vec![Passed::Done("upstream finished".to_string())]);

        let source = init_stream::<i32>();
        let survivor = passthrough(
            &source,
            UpstreamOptions {
                dispose_if_source_done: false,
                ..Default::default()
            },
        );
        let _sub = survivor.on(|_| {});
        source.dispose("upstream finished");
        assert!(!survivor.is_disposed());
    }

    #[test]
    fn test_dispose_detaches_from_source() {
        let source = init_stream::<i32>();
        let derived = passthrough(&source, UpstreamOptions::default());
        let _sub = derived.on(|_| {});
        assert_eq!(source.subscriber_count(), 1);
        derived.dispose("done here");
        assert_eq!(source.subscriber_count(), 0);
        assert!(!source.is_disposed());
    }

    #[test]
    fn test_already_disposed_source_counts_as_done() {
        let source = init_stream::<i32>();
        source.dispose("gone");
        let derived = passthrough(&source, UpstreamOptions::default());
        let _sub = derived.on(|_| {});
        assert!(derived.is_disposed());
    }

    #[test]
    fn test_warnings_are_forwarded() {
        let source = init_stream::<i32>();
        let derived = passthrough(&source, UpstreamOptions::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = derived.on(move |m| s.borrow_mut().push(m.clone()));
        source.signal_warning("jitter");
        assert_eq!(*seen.borrow(), vec![Passed::Warning("jitter".to_string())]);
    }

    #[test]
    fn test_handler_disposing_output_runs_teardown_once() {
        struct Counting {
            disposals: Rc<Cell<u32>>,
        }
        impl UpstreamHandler<i32, i32> for Counting {
            fn on_value(&mut self, out: &Emitter<i32>, value: i32) {
                if value < 0 {
                    out.dispose("negative");
                } else {
                    out.set(value);
                }
            }
            fn on_dispose(&mut self, _reason: &str) {
                self.disposals.set(self.disposals.get() + 1);
            }
        }

        let disposals = Rc::new(Cell::new(0));
        let source = init_stream::<i32>();
        let derived = bind_source(
            source.as_stream(),
            UpstreamOptions::default(),
            Counting {
                disposals: Rc::clone(&disposals),
            },
        );
        let _sub = derived.on(|_| {});
        source.set(1).unwrap();
        source.set(-1).unwrap();
        assert!(derived.is_disposed());
        assert_eq!(disposals.get(), 1);
    }

    #[test]
    fn test_feedback_set_through_transform_is_handled_in_order() {
        let source = init_stream::<i32>();
        let doubled = crate::ops::transform(&source, |v: i32| v * 2).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (sink, feedback) = (Rc::clone(&seen), source.clone());
        let _sub = doubled.on_value(move |v| {
            sink.borrow_mut().push(*v);
            if *v < 8 {
                feedback.set(*v).unwrap();
            }
        });

        source.set(1).unwrap();
        assert_eq!(*seen.borrow(), vec![2, 4, 8]);
        assert_eq!(source.last(), Some(4));
    }
}
