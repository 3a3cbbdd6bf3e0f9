//! # Silence Watchdogs
//!
//! Both operators pass the source through unchanged and watch for silence. Every
//! value or done signal from the source re-arms the watchdog. When `interval`
//! passes without one, `timeout_ping` asks the source for a value through its
//! ping capability, and `timeout_value` publishes a fallback value itself.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::error::RxError;
use crate::core::message::Passed;
use crate::core::stream::{Emitter, Stream, Unsubscribe};
use crate::core::trigger::Trigger;
use crate::core::upstream::{bind, UpstreamOptions};
use crate::sources::{resolve_source, ResolveOptions, Source};

#[derive(Debug, Clone)]
pub struct TimeoutPingOptions {
    pub interval: Trigger<Duration>,
    /// Cancelling this token disposes the output and stops the watchdog.
    pub abort: Option<CancellationToken>,
    pub upstream: UpstreamOptions,
}

impl TimeoutPingOptions {
    pub fn new(interval: impl Into<Trigger<Duration>>) -> Self {
        Self {
            interval: interval.into(),
            abort: None,
            upstream: UpstreamOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutValueOptions<V> {
    pub interval: Trigger<Duration>,
    /// Published on silence. Producers are re-invoked every time.
    pub value: Trigger<V>,
    /// Publish the fallback as soon as the output connects.
    pub immediate: bool,
    /// Keep publishing every `interval` while the source stays silent.
    pub repeat: bool,
    pub upstream: UpstreamOptions,
}

impl<V> TimeoutValueOptions<V> {
    pub fn new(interval: impl Into<Trigger<Duration>>, value: impl Into<Trigger<V>>) -> Self {
        Self {
            interval: interval.into(),
            value: value.into(),
            immediate: false,
            repeat: false,
            upstream: UpstreamOptions::default(),
        }
    }
}

/// Returns whether the watchdog should keep running.
type OnSilence<V> = Rc<dyn Fn(&Emitter<V>) -> bool>;

struct Watchdog<V> {
    out: Emitter<V>,
    interval: Trigger<Duration>,
    repeat: bool,
    on_silence: OnSilence<V>,
    timer: RefCell<Option<CancellationToken>>,
}

impl<V: Clone + 'static> Watchdog<V> {
    fn rearm(&self) {
        let token = self.out.lifetime().child_token();
        if let Some(previous) = self.timer.borrow_mut().replace(token.clone()) {
            previous.cancel();
        }

        let out = self.out.clone();
        let interval = self.interval.clone();
        let repeat = self.repeat;
        let on_silence = Rc::clone(&self.on_silence);
        tokio::task::spawn_local(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval.resolve()) => {}
                }
                if !on_silence(&out) || !repeat {
                    break;
                }
            }
        });
    }

    fn stop(&self) {
        if let Some(timer) = self.timer.borrow_mut().take() {
            timer.cancel();
        }
    }
}

/// Passthrough bound to a watchdog. With `immediate`, `on_silence` also fires
/// once at connection time.
fn watch<V: Clone + 'static>(
    source: Stream<V>,
    upstream: &UpstreamOptions,
    interval: Trigger<Duration>,
    repeat: bool,
    immediate: bool,
    on_silence: OnSilence<V>,
) -> Stream<V> {
    let dispose_if_done = upstream.dispose_if_source_done;

    bind(upstream, None, move |out: &Emitter<V>| {
        if source.is_disposed() {
            if dispose_if_done {
                out.dispose("source already disposed");
            }
            return Vec::new();
        }

        let dog = Rc::new(Watchdog {
            out: out.clone(),
            interval: interval.clone(),
            repeat,
            on_silence: Rc::clone(&on_silence),
            timer: RefCell::new(None),
        });

        let sub = {
            let dog = Rc::clone(&dog);
            let out = out.clone();
            source.on(move |msg| match msg {
                Passed::Value(v) => {
                    dog.rearm();
                    out.set(v.clone());
                }
                Passed::Warning(reason) => out.warn(reason),
                Passed::Done(reason) => {
                    dog.stop();
                    if dispose_if_done {
                        out.dispose(reason);
                    }
                }
            })
        };

        if immediate {
            on_silence(out);
        }
        dog.rearm();

        vec![sub, Unsubscribe::new(move || dog.stop())]
    })
}

/// Pings `source` whenever it stays silent for `interval`.
///
/// Sources without the ping capability are passed through and never pinged.
pub fn timeout_ping<V: Clone + 'static>(
    source: impl Into<Source<V>>,
    options: TimeoutPingOptions,
) -> Result<Stream<V>, RxError> {
    let source = resolve_source(source, &ResolveOptions::default())?;
    let mut upstream = options.upstream;
    if options.abort.is_some() {
        upstream.abort = options.abort;
    }

    let target = source.clone();
    let on_silence: OnSilence<V> = Rc::new(move |_out: &Emitter<V>| {
        if target.is_disposed() {
            return false;
        }
        let pinged = target.ping();
        if !pinged {
            log::trace!("Source '{}' is silent but cannot be pinged", target.label());
        }
        pinged
    });
    Ok(watch(source, &upstream, options.interval, true, false, on_silence))
}

/// Publishes a fallback value whenever `source` stays silent for `interval`.
pub fn timeout_value<V: Clone + 'static>(
    source: impl Into<Source<V>>,
    options: TimeoutValueOptions<V>,
) -> Result<Stream<V>, RxError> {
    let source = resolve_source(source, &ResolveOptions::default())?;
    let value = options.value;
    let on_silence: OnSilence<V> = Rc::new(move |out: &Emitter<V>| out.set(value.resolve()));
    Ok(watch(
        source,
        &options.upstream,
        options.interval,
        options.repeat,
        options.immediate,
        on_silence,
    ))
}
