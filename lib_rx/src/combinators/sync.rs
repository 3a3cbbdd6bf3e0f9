//! # Sync
//!
//! A barrier over several sources. A round is released only once every live
//! source has produced a new value since the previous release; a source that
//! publishes twice within one round only contributes its newest value. With
//! `maximum_wait`, a round that started but never completed is released partially
//! once the wait runs out, with `None` in the slots that did not report.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::combinators::{resolve_all, resolve_named, OnSourceDone};
use crate::core::error::RxError;
use crate::core::message::Passed;
use crate::core::stream::{Emitter, Stream, Unsubscribe};
use crate::core::upstream::{bind, UpstreamOptions};
use crate::sources::Source;

/// Slot content for a source that is done, in rounds released after it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalValue {
    #[default]
    Undefined,
    Last,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub on_source_done: OnSourceDone,
    pub final_value: FinalValue,
    pub maximum_wait: Option<Duration>,
    pub upstream: UpstreamOptions,
}

struct Round<V> {
    latest: Vec<Option<V>>,
    fresh: Vec<bool>,
    done: Vec<bool>,
    timer: Option<CancellationToken>,
}

impl<V: Clone> Round<V> {
    /// Every live source reported and at least one did.
    fn complete(&self) -> bool {
        let mut any = false;
        for (fresh, done) in self.fresh.iter().zip(&self.done) {
            if *fresh {
                any = true;
            } else if !done {
                return false;
            }
        }
        any
    }

    fn release(&mut self, final_value: FinalValue) -> Vec<Option<V>> {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        let out = (0..self.latest.len())
            .map(|i| {
                if self.fresh[i] || (self.done[i] && final_value == FinalValue::Last) {
                    self.latest[i].clone()
                } else {
                    None
                }
            })
            .collect();
        self.fresh.iter_mut().for_each(|f| *f = false);
        out
    }
}

struct Barrier<V, Out> {
    round: RefCell<Round<V>>,
    final_value: FinalValue,
    policy: OnSourceDone,
    maximum_wait: Option<Duration>,
    build: Box<dyn Fn(Vec<Option<V>>) -> Out>,
}

impl<V: Clone + 'static, Out: Clone + 'static> Barrier<V, Out> {
    fn on_value(self: &Rc<Self>, out: &Emitter<Out>, i: usize, v: V) {
        let (released, start_timer) = {
            let mut r = self.round.borrow_mut();
            let starts_round = !r.fresh.iter().any(|f| *f);
            r.latest[i] = Some(v);
            r.fresh[i] = true;
            if r.complete() {
                (Some(r.release(self.final_value)), false)
            } else {
                (None, starts_round && self.maximum_wait.is_some())
            }
        };

        if let Some(values) = released {
            out.set((self.build)(values));
        } else if start_timer {
            self.arm(out);
        }
    }

    fn arm(self: &Rc<Self>, out: &Emitter<Out>) {
        let wait = match self.maximum_wait {
            Some(wait) => wait,
            None => return,
        };
        let token = out.lifetime().child_token();
        if let Some(previous) = self.round.borrow_mut().timer.replace(token.clone()) {
            previous.cancel();
        }
        let barrier = Rc::clone(self);
        let out = out.clone();
        tokio::task::spawn_local(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(wait) => {
                    let partial = {
                        let mut r = barrier.round.borrow_mut();
                        r.timer = None;
                        r.fresh.iter().any(|f| *f).then(|| r.release(barrier.final_value))
                    };
                    if let Some(values) = partial {
                        log::trace!("Sync round released partially after {:?}", wait);
                        out.set((barrier.build)(values));
                    }
                }
            }
        });
    }

    fn on_done(&self, out: &Emitter<Out>, i: usize, reason: &str) {
        if self.policy == OnSourceDone::Break {
            out.dispose(reason);
            return;
        }

        let (released, all_done) = {
            let mut r = self.round.borrow_mut();
            r.done[i] = true;
            let all_done = r.done.iter().all(|d| *d);
            let released = (r.complete() || (all_done && r.fresh.iter().any(|f| *f)))
                .then(|| r.release(self.final_value));
            (released, all_done)
        };
        if let Some(values) = released {
            out.set((self.build)(values));
        }
        if all_done {
            out.dispose(reason);
        }
    }

    fn stop_timer(&self) {
        if let Some(timer) = self.round.borrow_mut().timer.take() {
            timer.cancel();
        }
    }
}

fn sync_with<V, Out>(streams: Vec<Stream<V>>, options: SyncOptions, build: Box<dyn Fn(Vec<Option<V>>) -> Out>) -> Stream<Out>
where
    V: Clone + 'static,
    Out: Clone + 'static,
{
    let n = streams.len();
    let barrier = Rc::new(Barrier {
        round: RefCell::new(Round {
            latest: vec![None; n],
            fresh: vec![false; n],
            done: vec![false; n],
            timer: None,
        }),
        final_value: options.final_value,
        policy: options.on_source_done,
        maximum_wait: options.maximum_wait,
        build,
    });

    bind(&options.upstream, None, move |out: &Emitter<Out>| {
        let mut subs: Vec<Unsubscribe> = Vec::with_capacity(n + 1);
        for (i, source) in streams.iter().enumerate() {
            if source.is_disposed() {
                barrier.on_done(out, i, "source already disposed");
                if out.is_disposed() {
                    break;
                }
                continue;
            }
            let barrier = Rc::clone(&barrier);
            let out = out.clone();
            subs.push(source.on(move |msg| match msg {
                Passed::Value(v) => barrier.on_value(&out, i, v.clone()),
                Passed::Warning(reason) => out.warn(reason),
                Passed::Done(reason) => barrier.on_done(&out, i, reason),
            }));
        }
        let b = Rc::clone(&barrier);
        subs.push(Unsubscribe::new(move || b.stop_timer()));
        subs
    })
}

/// Releases one array per round, once every live source produced a new value.
pub fn sync_to_array<V, S>(sources: impl IntoIterator<Item = S>, options: SyncOptions) -> Result<Stream<Vec<Option<V>>>, RxError>
where
    V: Clone + 'static,
    S: Into<Source<V>>,
{
    let streams = resolve_all(sources)?;
    Ok(sync_with(streams, options, Box::new(|values: Vec<Option<V>>| values)))
}

/// Like [`sync_to_array`], keyed by source name.
pub fn sync_to_object<V, K, S>(
    sources: impl IntoIterator<Item = (K, S)>,
    options: SyncOptions,
) -> Result<Stream<BTreeMap<String, Option<V>>>, RxError>
where
    V: Clone + 'static,
    K: Into<String>,
    S: Into<Source<V>>,
{
    let (names, streams) = resolve_named(sources)?;
    Ok(sync_with(
        streams,
        options,
        Box::new(move |values: Vec<Option<V>>| names.iter().cloned().zip(values).collect()),
    ))
}
