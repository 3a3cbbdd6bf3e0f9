use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::combinators::combine_latest::{combine_latest_with, CombineLatestOptions};
use crate::combinators::{resolve_named, OnSourceDone};
use crate::core::error::RxError;
use crate::core::stream::{Emitter, Stream};
use crate::core::upstream::{bind_source, UpstreamHandler, UpstreamOptions};
use crate::sources::Source;

/// Equality used to suppress repeated results.
pub type Equality<R> = Rc<dyn Fn(&R, &R) -> bool>;

pub struct DerivedOptions<R> {
    /// Skip a result equal to the previously published one.
    pub ignore_identical: bool,
    /// Overrides `PartialEq` when deciding whether two results are identical.
    pub eq: Option<Equality<R>>,
    pub upstream: UpstreamOptions,
}

impl<R> Default for DerivedOptions<R> {
    fn default() -> Self {
        Self {
            ignore_identical: true,
            eq: None,
            upstream: UpstreamOptions::default(),
        }
    }
}

impl<R> Clone for DerivedOptions<R> {
    fn clone(&self) -> Self {
        Self {
            ignore_identical: self.ignore_identical,
            eq: self.eq.clone(),
            upstream: self.upstream.clone(),
        }
    }
}

impl<R> fmt::Debug for DerivedOptions<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedOptions")
            .field("ignore_identical", &self.ignore_identical)
            .field("eq", &self.eq.as_ref().map(|_| ".."))
            .field("upstream", &self.upstream)
            .finish()
    }
}

struct Derive<V, R, F> {
    f: F,
    ignore_identical: bool,
    eq: Equality<R>,
    last: Option<R>,
    combined: Emitter<BTreeMap<String, Option<V>>>,
}

impl<V, R, F> UpstreamHandler<BTreeMap<String, Option<V>>, R> for Derive<V, R, F>
where
    V: Clone + 'static,
    R: Clone + 'static,
    F: Fn(&BTreeMap<String, Option<V>>) -> R,
{
    fn on_value(&mut self, out: &Emitter<R>, snapshot: BTreeMap<String, Option<V>>) {
        let result = (self.f)(&snapshot);
        if self.ignore_identical {
            if let Some(last) = &self.last {
                if (self.eq)(last, &result) {
                    return;
                }
            }
        }
        self.last = Some(result.clone());
        out.set(result);
    }

    fn on_dispose(&mut self, reason: &str) {
        self.combined.dispose(reason);
    }
}

/// Publishes `f(snapshot)` whenever any named source publishes.
///
/// The snapshot holds the latest value of every source. Results equal to the
/// previous one are suppressed unless `ignore_identical` is off. A finished
/// source keeps its last value; the output is done once every source is.
pub fn derived<V, R, K, S, F>(
    f: F,
    sources: impl IntoIterator<Item = (K, S)>,
    options: DerivedOptions<R>,
) -> Result<Stream<R>, RxError>
where
    V: Clone + 'static,
    R: Clone + PartialEq + 'static,
    K: Into<String>,
    S: Into<Source<V>>,
    F: Fn(&BTreeMap<String, Option<V>>) -> R + 'static,
{
    let (names, streams) = resolve_named(sources)?;
    let combined = combine_latest_with(
        streams,
        CombineLatestOptions {
            on_source_done: OnSourceDone::Allow,
            upstream: UpstreamOptions {
                lazy: options.upstream.lazy,
                ..Default::default()
            },
        },
        move |slots: &[Option<V>]| -> BTreeMap<String, Option<V>> {
            names.iter().cloned().zip(slots.iter().cloned()).collect()
        },
    );

    let eq: Equality<R> = options.eq.unwrap_or_else(|| Rc::new(|a: &R, b: &R| a == b));
    let handler = Derive {
        f,
        ignore_identical: options.ignore_identical,
        eq,
        last: None,
        combined: combined.emitter(),
    };
    Ok(bind_source(combined, options.upstream, handler))
}
