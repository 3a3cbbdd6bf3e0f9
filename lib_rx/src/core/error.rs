use thiserror::Error;

/// Errors raised by the stream engine.
///
/// Configuration problems are reported at construction time. Per-value failures
/// (`TransformFailure`) surface as warnings or disposal depending on the operator
/// policy, and `AbortedExternally` only ever travels as a done reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RxError {
    #[error("Source cannot be resolved to a stream: {0}")]
    UnresolvableSource(String),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Stream '{0}' is disposed")]
    StreamDisposed(String),

    #[error("Transform failed: {0}")]
    TransformFailure(String),

    #[error("Aborted externally: {0}")]
    AbortedExternally(String),

    #[error("Queue of '{0}' is full")]
    QueueFull(String),
}
