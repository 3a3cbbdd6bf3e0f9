use std::fmt;
use std::rc::Rc;

/// A configuration value given either literally or as a zero-argument producer.
///
/// Call sites always go through [`Trigger::resolve`], so both shapes behave the
/// same. Producers are re-invoked at every resolution.
pub enum Trigger<T> {
    Literal(T),
    Producer(Rc<dyn Fn() -> T>),
}

impl<T: Clone> Trigger<T> {
    pub fn producer(f: impl Fn() -> T + 'static) -> Self {
        Trigger::Producer(Rc::new(f))
    }

    pub fn resolve(&self) -> T {
        match self {
            Trigger::Literal(v) => v.clone(),
            Trigger::Producer(f) => f(),
        }
    }
}

impl<T> From<T> for Trigger<T> {
    fn from(value: T) -> Self {
        Trigger::Literal(value)
    }
}

impl<T: Clone> Clone for Trigger<T> {
    fn clone(&self) -> Self {
        match self {
            Trigger::Literal(v) => Trigger::Literal(v.clone()),
            Trigger::Producer(f) => Trigger::Producer(Rc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Trigger<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Trigger::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}
