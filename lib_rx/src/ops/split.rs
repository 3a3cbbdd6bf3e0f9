use std::collections::HashMap;

use crate::core::error::RxError;
use crate::core::stream::{Emitter, Stream};
use crate::core::upstream::{bind_source, Lazy, UpstreamOptions};
use crate::sources::{resolve_source, ResolveOptions, Source};

#[derive(Debug, Clone, Copy)]
pub struct SplitOptions {
    pub quantity: usize,
    pub lazy: Lazy,
}

impl SplitOptions {
    pub fn new(quantity: usize) -> Self {
        Self {
            quantity,
            lazy: Lazy::Initial,
        }
    }
}

fn mirror<V: Clone + 'static>(source: &Stream<V>, lazy: Lazy, label: String) -> Stream<V> {
    let options = UpstreamOptions {
        lazy,
        dispose_if_source_done: true,
        label: Some(label),
        ..Default::default()
    };
    bind_source(source.clone(), options, |out: &Emitter<V>, v: V| {
        out.set(v);
    })
}

/// Creates `quantity` independent mirrors of `source`.
///
/// Each output binds to the source on its own, so disposing one leaves the
/// others and the source untouched. A source done disposes them all.
pub fn split<V: Clone + 'static>(source: impl Into<Source<V>>, options: SplitOptions) -> Result<Vec<Stream<V>>, RxError> {
    if options.quantity == 0 {
        return Err(RxError::MissingConfiguration("split quantity must be at least 1".to_string()));
    }
    let source = resolve_source(source, &ResolveOptions::default())?;
    Ok((0..options.quantity)
        .map(|i| mirror(&source, options.lazy, format!("{}[{}]", source.label(), i)))
        .collect())
}

/// Like [`split`], keyed by label.
pub fn split_labelled<V: Clone + 'static>(
    source: impl Into<Source<V>>,
    labels: &[&str],
    lazy: Lazy,
) -> Result<HashMap<String, Stream<V>>, RxError> {
    if labels.is_empty() {
        return Err(RxError::MissingConfiguration("split needs at least one label".to_string()));
    }
    let source = resolve_source(source, &ResolveOptions::default())?;
    Ok(labels
        .iter()
        .map(|label| (label.to_string(), mirror(&source, lazy, label.to_string())))
        .collect())
}
