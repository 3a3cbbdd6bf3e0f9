use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::core::error::RxError;
use crate::core::message::Passed;
use crate::sources::{resolve_source, ResolveOptions, Source};

#[derive(Debug, Clone)]
pub struct ToArrayOptions {
    /// Stop after this many values.
    pub limit: Option<usize>,
    /// Stop once this much time has passed, keeping what was collected.
    pub max_wait: Option<Duration>,
}

impl Default for ToArrayOptions {
    fn default() -> Self {
        Self {
            limit: None,
            max_wait: Some(Duration::from_secs(10)),
        }
    }
}

/// Collects values from `source` until it is done, `limit` values arrived, or
/// `max_wait` elapsed.
///
/// Warnings are skipped. The collector detaches from the source when it returns.
pub async fn to_array<V: Clone + 'static>(
    source: impl Into<Source<V>>,
    options: ToArrayOptions,
) -> Result<Vec<V>, RxError> {
    let source = resolve_source(source, &ResolveOptions::default())?;
    let mut collected = Vec::new();
    if options.limit == Some(0) {
        return Ok(collected);
    }
    if source.is_disposed() {
        return Ok(collected);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Passed<V>>();
    let sub = source.on(move |msg| {
        let _ = tx.send(msg.clone());
    });

    let deadline = options.max_wait.map(|wait| Instant::now() + wait);
    loop {
        let next = match deadline {
            Some(deadline) => tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    log::debug!("to_array on '{}' gave up after waiting", source.label());
                    break;
                }
                msg = rx.recv() => msg,
            },
            None => rx.recv().await,
        };
        match next {
            Some(Passed::Value(v)) => {
                collected.push(v);
                if options.limit.is_some_and(|limit| collected.len() >= limit) {
                    break;
                }
            }
            Some(Passed::Warning(_)) => {}
            Some(Passed::Done(_)) | None => break,
        }
    }
    sub.unsubscribe();
    Ok(collected)
}
