//! Running fold over a stream, with an out-of-band `ping`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::error::RxError;
use crate::core::stream::{Emitter, Stream};
use crate::core::upstream::{bind_source, Lazy, UpstreamOptions};
use crate::sources::{resolve_source, ResolveOptions, Source};

struct Fold<V> {
    previous: Option<V>,
    current: Option<V>,
}

impl<V: Clone> Fold<V> {
    fn step(&mut self, current: V, f: &dyn Fn(&V, &V) -> V) -> V {
        let next = match &self.previous {
            Some(previous) => f(previous, &current),
            None => current.clone(),
        };
        self.current = Some(current);
        self.previous = Some(next.clone());
        next
    }
}

/// Emits `f(previous, current)` where `previous` is the last emitted result.
///
/// The first value passes through unchanged. The output can be pinged to re-run
/// the fold on the latest source value. Connects lazily with `Lazy::Very`.
pub fn compute_with_previous<V, F>(source: impl Into<Source<V>>, f: F) -> Result<Stream<V>, RxError>
where
    V: Clone + 'static,
    F: Fn(&V, &V) -> V + 'static,
{
    compute_with_previous_with(source, UpstreamOptions::with_lazy(Lazy::Very), f)
}

pub fn compute_with_previous_with<V, F>(
    source: impl Into<Source<V>>,
    options: UpstreamOptions,
    f: F,
) -> Result<Stream<V>, RxError>
where
    V: Clone + 'static,
    F: Fn(&V, &V) -> V + 'static,
{
    let source = resolve_source(source, &ResolveOptions::default())?;
    let f: Rc<dyn Fn(&V, &V) -> V> = Rc::new(f);
    let fold = Rc::new(RefCell::new(Fold {
        previous: None,
        current: None,
    }));

    let out = {
        let fold = Rc::clone(&fold);
        let f = Rc::clone(&f);
        bind_source(source.clone(), options, move |out: &Emitter<V>, v: V| {
            let next = fold.borrow_mut().step(v, f.as_ref());
            out.set(next);
        })
    };

    let emitter = out.emitter();
    out.install_ping(move || {
        let current = fold.borrow().current.clone().or_else(|| source.last());
        match current {
            Some(current) => {
                let next = fold.borrow_mut().step(current, f.as_ref());
                emitter.set(next);
            }
            None => log::trace!("Ping ignored, no value to fold yet"),
        }
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::init_stream;

    #[test]
    fn test_running_fold_and_ping() {
        let source = init_stream::<i32>();
        let sums = compute_with_previous(&source, |prev, cur| prev + cur).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _u = sums.on_value(move |v| sink.borrow_mut().push(*v));

        source.set(1).unwrap();
        source.set(2).unwrap();
        source.set(3).unwrap();
        assert!(sums.can_ping());
        assert!(sums.ping());
        // 1, 1+2, 3+3, then the ping folds the current 3 again.
        assert_eq!(*seen.borrow(), vec![1, 3, 6, 9]);
    }

    #[test]
    fn test_first_ping_passes_through_source_last() {
        let source = init_stream::<i32>();
        source.set(7).unwrap();
        let folded = compute_with_previous(&source, |prev, cur| prev * cur).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _u = folded.on_value(move |v| sink.borrow_mut().push(*v));
        folded.ping();
        source.set(2).unwrap();
        assert_eq!(*seen.borrow(), vec![7, 14]);
    }
}
