//! Field extraction over dynamic JSON values.

use serde_json::Value;

use crate::core::error::RxError;
use crate::core::stream::{Emitter, Stream};
use crate::core::upstream::{init_upstream, UpstreamOptions};
use crate::sources::Source;

#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    /// Emitted when neither the value nor `fallback_object` carries the field.
    pub fallback_field_value: Option<Value>,
    /// Consulted when the incoming value lacks the field.
    pub fallback_object: Option<Value>,
    pub upstream: UpstreamOptions,
}

/// Emits `v[name]` for every incoming object `v`.
///
/// Lookup order is the value itself, then `fallback_object`, then
/// `fallback_field_value`. A tick where none of them resolves emits nothing.
pub fn field(source: impl Into<Source<Value>>, name: &str, options: FieldOptions) -> Result<Stream<Value>, RxError> {
    if name.is_empty() {
        return Err(RxError::MissingConfiguration("field name is empty".to_string()));
    }

    let name = name.to_string();
    let FieldOptions {
        fallback_field_value,
        fallback_object,
        upstream,
    } = options;

    init_upstream(source, upstream, move |out: &Emitter<Value>, v: Value| {
        let resolved = v
            .get(&name)
            .or_else(|| fallback_object.as_ref().and_then(|o| o.get(&name)))
            .or(fallback_field_value.as_ref());

        match resolved {
            Some(found) => {
                out.set(found.clone());
            }
            None => log::trace!("Field '{}' unresolved, tick dropped", name),
        }
    })
}
