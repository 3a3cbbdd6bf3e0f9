//! # Multi-Source Combinators
//!
//! Combinators consume several sources and publish one derived stream. Relative
//! arrival order across independently timed sources is arbitrary; every combinator
//! only relies on per-source order.
//!
//! Array variants publish `Vec<Option<V>>` indexed like the sources. Object
//! variants publish `BTreeMap<String, Option<V>>` keyed by source name. A slot is
//! `None` until its source produced a value.

pub mod combine_latest;
pub mod derived;
pub mod merge_flat;
pub mod sync;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::error::RxError;
use crate::core::stream::Stream;
use crate::sources::{resolve_source, ResolveOptions, Source};

pub use combine_latest::{combine_latest_to_array, combine_latest_to_object, CombineLatestOptions};
pub use derived::{derived, DerivedOptions};
pub use merge_flat::{merge_flat, MergeFlatOptions};
pub use sync::{sync_to_array, sync_to_object, FinalValue, SyncOptions};

/// What a combinator does when one of its sources is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnSourceDone {
    /// Dispose the combinator at once.
    #[default]
    Break,
    /// Freeze that source's slot and carry on with the others.
    Allow,
}

pub(crate) fn resolve_all<V, S>(sources: impl IntoIterator<Item = S>) -> Result<Vec<Stream<V>>, RxError>
where
    V: Clone + 'static,
    S: Into<Source<V>>,
{
    let streams = sources
        .into_iter()
        .map(|s| resolve_source(s, &ResolveOptions::default()))
        .collect::<Result<Vec<_>, _>>()?;
    if streams.is_empty() {
        return Err(RxError::MissingConfiguration("combinator needs at least one source".to_string()));
    }
    Ok(streams)
}

pub(crate) fn resolve_named<V, K, S>(
    sources: impl IntoIterator<Item = (K, S)>,
) -> Result<(Vec<String>, Vec<Stream<V>>), RxError>
where
    V: Clone + 'static,
    K: Into<String>,
    S: Into<Source<V>>,
{
    let (names, sources): (Vec<String>, Vec<S>) = sources.into_iter().map(|(k, s)| (k.into(), s)).unzip();
    let mut seen = BTreeSet::new();
    if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
        return Err(RxError::MissingConfiguration(format!("source name '{}' is used twice", dup)));
    }
    let streams = resolve_all(sources)?;
    Ok((names, streams))
}
