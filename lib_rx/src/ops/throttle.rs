//! # Throttle
//!
//! Rate-limits a stream to one value per window. The first value after a quiet
//! window is forwarded at once. Values arriving inside the window overwrite a
//! single pending slot, and whatever sits in the slot when the window reopens is
//! forwarded. A mid-burst value is therefore never published late: the newest one
//! wins.
//!
//! A source done signal arriving while a value is pending does not cut the window
//! short. The pending value still waits for the window to reopen, and the output
//! is disposed right after it.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::error::RxError;
use crate::core::stream::{Emitter, Stream};
use crate::core::trigger::Trigger;
use crate::core::upstream::{init_upstream, UpstreamHandler, UpstreamOptions};
use crate::sources::Source;

#[derive(Debug, Clone)]
pub struct ThrottleOptions {
    /// Minimum gap between two forwarded values.
    pub elapsed: Trigger<Duration>,
    pub upstream: UpstreamOptions,
}

impl ThrottleOptions {
    pub fn new(elapsed: impl Into<Trigger<Duration>>) -> Self {
        Self {
            elapsed: elapsed.into(),
            upstream: UpstreamOptions::default(),
        }
    }
}

struct Window<V> {
    last_fire: Option<Instant>,
    pending: Option<V>,
    armed: bool,
    closing: Option<String>,
}

struct Throttle<V> {
    elapsed: Trigger<Duration>,
    window: Rc<RefCell<Window<V>>>,
}

impl<V: Clone + 'static> Throttle<V> {
    fn arm(&self, out: &Emitter<V>, at: Instant) {
        let window = Rc::clone(&self.window);
        let out = out.clone();
        let lifetime = out.lifetime();
        tokio::task::spawn_local(async move {
            tokio::select! {
                _ = lifetime.cancelled() => return,
                _ = tokio::time::sleep_until(at) => {}
            }
            let (due, closing) = {
                let mut w = window.borrow_mut();
                w.armed = false;
                let due = w.pending.take();
                if due.is_some() {
                    w.last_fire = Some(Instant::now());
                }
                (due, w.closing.take())
            };
            if let Some(v) = due {
                out.set(v);
            }
            if let Some(reason) = closing {
                out.dispose(&reason);
            }
        });
    }
}

impl<V: Clone + 'static> UpstreamHandler<V, V> for Throttle<V> {
    fn on_value(&mut self, out: &Emitter<V>, value: V) {
        let elapsed = self.elapsed.resolve();
        let now = Instant::now();

        let mut w = self.window.borrow_mut();
        let inside = matches!(w.last_fire, Some(last) if now.duration_since(last) < elapsed);
        if !inside {
            w.last_fire = Some(now);
            w.pending = None;
            drop(w);
            out.set(value);
            return;
        }

        w.pending = Some(value);
        if w.armed {
            return;
        }
        w.armed = true;
        let reopen = w.last_fire.map_or(now, |last| last + elapsed);
        drop(w);
        self.arm(out, reopen);
    }

    fn on_source_done(&mut self, _out: &Emitter<V>, reason: &str, dispose_if_source_done: bool) -> bool {
        let mut w = self.window.borrow_mut();
        if !(w.armed && w.pending.is_some()) {
            return dispose_if_source_done;
        }
        // The timer publishes the pending value and disposes after it.
        if dispose_if_source_done {
            w.closing = Some(reason.to_string());
        }
        false
    }
}

/// Forwards at most one value per `elapsed` window, newest value wins.
pub fn throttle<V: Clone + 'static>(source: impl Into<Source<V>>, options: ThrottleOptions) -> Result<Stream<V>, RxError> {
    let handler = Throttle {
        elapsed: options.elapsed,
        window: Rc::new(RefCell::new(Window {
            last_fire: None,
            pending: None,
            armed: false,
            closing: None,
        })),
    };
    init_upstream(source, options.upstream, handler)
}
