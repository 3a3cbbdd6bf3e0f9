//! Value mapping operators.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::core::error::RxError;
use crate::core::stream::{Emitter, Stream};
use crate::core::upstream::{init_upstream, UpstreamOptions};
use crate::sources::Source;

/// Emits `f(v)` for every source value `v`.
///
/// A panic inside `f` unwinds out of the publishing call.
pub fn transform<In, Out, F>(source: impl Into<Source<In>>, f: F) -> Result<Stream<Out>, RxError>
where
    In: Clone + 'static,
    Out: Clone + 'static,
    F: Fn(In) -> Out + 'static,
{
    transform_with(source, UpstreamOptions::default(), f)
}

pub fn transform_with<In, Out, F>(
    source: impl Into<Source<In>>,
    options: UpstreamOptions,
    f: F,
) -> Result<Stream<Out>, RxError>
where
    In: Clone + 'static,
    Out: Clone + 'static,
    F: Fn(In) -> Out + 'static,
{
    init_upstream(source, options, move |out: &Emitter<Out>, v: In| {
        out.set(f(v));
    })
}

/// What a failing fallible transform does to the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformErrorPolicy {
    /// Publish the failure as a warning and keep going.
    #[default]
    Warn,
    /// Dispose the output with the failure as reason.
    Dispose,
}

#[derive(Debug, Clone, Default)]
pub struct TryTransformOptions {
    pub upstream: UpstreamOptions,
    pub on_error: TransformErrorPolicy,
}

/// Like [`transform`], for closures that can fail.
pub fn try_transform<In, Out, E, F>(
    source: impl Into<Source<In>>,
    options: TryTransformOptions,
    f: F,
) -> Result<Stream<Out>, RxError>
where
    In: Clone + 'static,
    Out: Clone + 'static,
    E: Display,
    F: Fn(In) -> Result<Out, E> + 'static,
{
    let policy = options.on_error;
    init_upstream(source, options.upstream, move |out: &Emitter<Out>, v: In| match f(v) {
        Ok(result) => {
            out.set(result);
        }
        Err(e) => {
            let failure = RxError::TransformFailure(e.to_string()).to_string();
            log::warn!("{}", failure);
            match policy {
                TransformErrorPolicy::Warn => out.warn(&failure),
                TransformErrorPolicy::Dispose => out.dispose(&failure),
            }
        }
    })
}

/// Emits every value paired with `f(&value)`.
pub fn annotate<In, A, F>(source: impl Into<Source<In>>, f: F) -> Result<Stream<(In, A)>, RxError>
where
    In: Clone + 'static,
    A: Clone + 'static,
    F: Fn(&In) -> A + 'static,
{
    init_upstream(source, UpstreamOptions::default(), move |out: &Emitter<(In, A)>, v: In| {
        let note = f(&v);
        out.set((v, note));
    })
}
