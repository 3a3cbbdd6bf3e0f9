use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::combinators::{resolve_all, resolve_named, OnSourceDone};
use crate::core::error::RxError;
use crate::core::message::Passed;
use crate::core::stream::{Emitter, Stream, Unsubscribe};
use crate::core::upstream::{bind, UpstreamOptions};
use crate::sources::Source;

#[derive(Debug, Clone, Default)]
pub struct CombineLatestOptions {
    pub on_source_done: OnSourceDone,
    pub upstream: UpstreamOptions,
}

struct Slots<V> {
    values: Vec<Option<V>>,
    done: Vec<bool>,
}

/// Marks source `i` done. Returns whether the output was disposed.
fn mark_done<V, Out: Clone + 'static>(
    slots: &RefCell<Slots<V>>,
    i: usize,
    policy: OnSourceDone,
    out: &Emitter<Out>,
    reason: &str,
) -> bool {
    let finished = match policy {
        OnSourceDone::Break => true,
        OnSourceDone::Allow => {
            let mut s = slots.borrow_mut();
            s.done[i] = true;
            s.done.iter().all(|d| *d)
        }
    };
    if finished {
        out.dispose(reason);
    }
    finished
}

/// Publishes `build(slots)` every time any source publishes.
pub(crate) fn combine_latest_with<V, Out, F>(streams: Vec<Stream<V>>, options: CombineLatestOptions, build: F) -> Stream<Out>
where
    V: Clone + 'static,
    Out: Clone + 'static,
    F: Fn(&[Option<V>]) -> Out + 'static,
{
    let slots = Rc::new(RefCell::new(Slots {
        values: vec![None; streams.len()],
        done: vec![false; streams.len()],
    }));
    let build = Rc::new(build);
    let policy = options.on_source_done;

    bind(&options.upstream, None, move |out: &Emitter<Out>| {
        let mut subs: Vec<Unsubscribe> = Vec::with_capacity(streams.len());
        for (i, source) in streams.iter().enumerate() {
            if source.is_disposed() {
                if mark_done(&slots, i, policy, out, "source already disposed") {
                    break;
                }
                continue;
            }

            let slots = Rc::clone(&slots);
            let build = Rc::clone(&build);
            let out = out.clone();
            subs.push(source.on(move |msg| match msg {
                Passed::Value(v) => {
                    let snapshot = {
                        let mut s = slots.borrow_mut();
                        s.values[i] = Some(v.clone());
                        build(&s.values)
                    };
                    out.set(snapshot);
                }
                Passed::Warning(reason) => out.warn(reason),
                Passed::Done(reason) => {
                    mark_done(&slots, i, policy, &out, reason);
                }
            }));
        }
        subs
    })
}

/// Publishes the latest value of every source, in source order, whenever any
/// source publishes.
pub fn combine_latest_to_array<V, S>(
    sources: impl IntoIterator<Item = S>,
    options: CombineLatestOptions,
) -> Result<Stream<Vec<Option<V>>>, RxError>
where
    V: Clone + 'static,
    S: Into<Source<V>>,
{
    let streams = resolve_all(sources)?;
    Ok(combine_latest_with(streams, options, |slots: &[Option<V>]| slots.to_vec()))
}

/// Like [`combine_latest_to_array`], keyed by source name.
pub fn combine_latest_to_object<V, K, S>(
    sources: impl IntoIterator<Item = (K, S)>,
    options: CombineLatestOptions,
) -> Result<Stream<BTreeMap<String, Option<V>>>, RxError>
where
    V: Clone + 'static,
    K: Into<String>,
    S: Into<Source<V>>,
{
    let (names, streams) = resolve_named(sources)?;
    Ok(combine_latest_with(streams, options, move |slots: &[Option<V>]| {
        names.iter().cloned().zip(slots.iter().cloned()).collect()
    }))
}
