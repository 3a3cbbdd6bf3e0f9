use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::error::RxError;
use crate::core::stream::{Emitter, Stream};
use crate::core::trigger::Trigger;
use crate::core::upstream::{init_upstream, UpstreamHandler, UpstreamOptions};
use crate::sources::Source;

#[derive(Debug, Clone)]
pub struct DebounceOptions {
    /// Silence required before the last value is forwarded.
    pub elapsed: Trigger<Duration>,
    pub upstream: UpstreamOptions,
}

impl DebounceOptions {
    pub fn new(elapsed: impl Into<Trigger<Duration>>) -> Self {
        Self {
            elapsed: elapsed.into(),
            upstream: UpstreamOptions::default(),
        }
    }
}

struct Quiet<V> {
    pending: Option<V>,
    timer: Option<CancellationToken>,
    /// Set when the source finished with a value still waiting for its quiet period.
    closing: Option<String>,
}

struct Debounce<V> {
    elapsed: Trigger<Duration>,
    quiet: Rc<RefCell<Quiet<V>>>,
}

impl<V: Clone + 'static> UpstreamHandler<V, V> for Debounce<V> {
    fn on_value(&mut self, out: &Emitter<V>, value: V) {
        let timer = out.lifetime().child_token();
        {
            let mut q = self.quiet.borrow_mut();
            q.pending = Some(value);
            if let Some(previous) = q.timer.replace(timer.clone()) {
                previous.cancel();
            }
        }

        let delay = self.elapsed.resolve();
        let quiet = Rc::clone(&self.quiet);
        let out = out.clone();
        tokio::task::spawn_local(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let (due, closing) = {
                        let mut q = quiet.borrow_mut();
                        q.timer = None;
                        (q.pending.take(), q.closing.take())
                    };
                    if let Some(v) = due {
                        out.set(v);
                    }
                    if let Some(reason) = closing {
                        out.dispose(&reason);
                    }
                }
            }
        });
    }

    fn on_source_done(&mut self, _out: &Emitter<V>, reason: &str, dispose_if_source_done: bool) -> bool {
        let mut q = self.quiet.borrow_mut();
        if q.pending.is_none() || q.timer.is_none() {
            return dispose_if_source_done;
        }
        if dispose_if_source_done {
            q.closing = Some(reason.to_string());
        }
        false
    }
}

/// Forwards the last value of every burst once `elapsed` passes without input.
pub fn debounce<V: Clone + 'static>(source: impl Into<Source<V>>, options: DebounceOptions) -> Result<Stream<V>, RxError> {
    let handler = Debounce {
        elapsed: options.elapsed,
        quiet: Rc::new(RefCell::new(Quiet {
            pending: None,
            timer: None,
            closing: None,
        })),
    };
    init_upstream(source, options.upstream, handler)
}
