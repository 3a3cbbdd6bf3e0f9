//! # Merge
//!
//! Interleaves the values of every source into one stream. Arrivals are queued in
//! a buffer that a drain task empties in arrival order. While the buffer stays
//! empty the task backs off, doubling its idle wait from `idle_min` up to
//! `idle_max`, and drops back to `idle_min` as soon as it drains something. The
//! output is done once every source is done and the buffer is empty.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::combinators::resolve_all;
use crate::core::error::RxError;
use crate::core::message::Passed;
use crate::core::stream::{Emitter, Stream, Unsubscribe};
use crate::core::upstream::{bind, UpstreamOptions};
use crate::sources::Source;

pub const DEFAULT_IDLE_MIN: Duration = Duration::from_millis(5);
pub const DEFAULT_IDLE_MAX: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct MergeFlatOptions {
    pub idle_min: Duration,
    pub idle_max: Duration,
    pub upstream: UpstreamOptions,
}

impl Default for MergeFlatOptions {
    fn default() -> Self {
        Self {
            idle_min: DEFAULT_IDLE_MIN,
            idle_max: DEFAULT_IDLE_MAX,
            upstream: UpstreamOptions::default(),
        }
    }
}

struct Buffer<V> {
    queue: VecDeque<V>,
    live: usize,
}

async fn drain<V: Clone + 'static>(
    buffer: Rc<RefCell<Buffer<V>>>,
    out: Emitter<V>,
    stop: tokio_util::sync::CancellationToken,
    idle_min: Duration,
    idle_max: Duration,
) {
    let mut idle = idle_min;
    loop {
        let mut drained = false;
        loop {
            let next = buffer.borrow_mut().queue.pop_front();
            match next {
                Some(v) => {
                    drained = true;
                    out.set(v);
                }
                None => break,
            }
        }

        if buffer.borrow().live == 0 {
            out.dispose("all sources done");
            return;
        }

        idle = if drained { idle_min } else { (idle * 2).min(idle_max) };
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(idle) => {}
        }
    }
}

/// Merges every source into one stream, finishing once all of them are done.
pub fn merge_flat<V, S>(sources: impl IntoIterator<Item = S>, options: MergeFlatOptions) -> Result<Stream<V>, RxError>
where
    V: Clone + 'static,
    S: Into<Source<V>>,
{
    let streams = resolve_all(sources)?;
    if options.idle_min.is_zero() || options.idle_max < options.idle_min {
        return Err(RxError::MissingConfiguration(format!(
            "merge idle range {:?}..{:?} is invalid",
            options.idle_min, options.idle_max
        )));
    }

    let buffer = Rc::new(RefCell::new(Buffer {
        queue: VecDeque::new(),
        live: streams.len(),
    }));
    let (idle_min, idle_max) = (options.idle_min, options.idle_max);

    Ok(bind(&options.upstream, None, move |out: &Emitter<V>| {
        let mut subs: Vec<Unsubscribe> = Vec::with_capacity(streams.len() + 1);
        {
            let mut b = buffer.borrow_mut();
            b.live = streams.iter().filter(|s| !s.is_disposed()).count();
        }

        for source in streams.iter().filter(|s| !s.is_disposed()) {
            let buffer = Rc::clone(&buffer);
            let out = out.clone();
            subs.push(source.on(move |msg| match msg {
                Passed::Value(v) => buffer.borrow_mut().queue.push_back(v.clone()),
                Passed::Warning(reason) => out.warn(reason),
                Passed::Done(_) => {
                    let mut b = buffer.borrow_mut();
                    b.live = b.live.saturating_sub(1);
                }
            }));
        }

        let stop = out.lifetime().child_token();
        tokio::task::spawn_local(drain(Rc::clone(&buffer), out.clone(), stop.clone(), idle_min, idle_max));
        subs.push(Unsubscribe::new(move || stop.cancel()));
        subs
    }))
}
