//! # Passed Messages
//!
//! Every stream speaks the same closed protocol: a value, a terminal done signal,
//! or a non-terminal warning. Nothing else ever flows through a subscriber.

/// A message delivered to stream subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum Passed<V> {
    /// A value published by the stream.
    Value(V),
    /// Terminal signal carrying the disposal reason. It is the last message a
    /// stream ever emits, and it is emitted exactly once.
    Done(String),
    /// Advisory signal. The stream keeps running.
    Warning(String),
}

impl<V> Passed<V> {
    /// Returns the carried value, if this is a value message.
    pub fn value(&self) -> Option<&V> {
        match self {
            Passed::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Consumes the message and returns the carried value, if any.
    pub fn into_value(self) -> Option<V> {
        match self {
            Passed::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Reason string of a done or warning signal.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Passed::Done(r) | Passed::Warning(r) => Some(r.as_str()),
            Passed::Value(_) => None,
        }
    }

    /// Whether this carries a value.
    pub fn is_value(&self) -> bool {
        matches!(self, Passed::Value(_))
    }

    /// Whether this is the final done signal.
    pub fn is_done(&self) -> bool {
        matches!(self, Passed::Done(_))
    }

    /// Whether this is an advisory warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Passed::Warning(_))
    }

    /// Maps the value of a value message, keeping signals as they are.
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Passed<U> {
        match self {
            Passed::Value(v) => Passed::Value(f(v)),
            Passed::Done(r) => Passed::Done(r),
            Passed::Warning(r) => Passed::Warning(r),
        }
    }
}
