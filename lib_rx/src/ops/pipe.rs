//! # Pipe
//!
//! Chains existing writable streams: a value on link `i` is set on link `i + 1`
//! right away, and a fresh terminal stream mirrors the last link. The chain is
//! only as strong as its weakest link. A done signal anywhere (or disposal of the
//! terminal) detaches every listener and disposes every link plus the terminal.
//!
//! Every link listener owns the chain, so the cascade keeps working after the
//! terminal is dropped. The chain reaches the links through weak emitters only.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::error::RxError;
use crate::core::message::Passed;
use crate::core::stream::{init_stream_with, Emitter, Stream, StreamOptions, Teardown, Unsubscribe, WritableStream};

struct Chain<V> {
    links: Vec<Emitter<V>>,
    listeners: RefCell<Vec<Unsubscribe>>,
    terminal: RefCell<Option<Emitter<V>>>,
    closed: Cell<bool>,
}

impl<V: Clone + 'static> Chain<V> {
    fn close(&self, reason: &str) {
        if self.closed.replace(true) {
            return;
        }
        log::debug!("Pipe of {} links closing: {}", self.links.len(), reason);

        let listeners: Vec<Unsubscribe> = self.listeners.borrow_mut().drain(..).collect();
        for listener in listeners {
            listener.unsubscribe();
        }
        for link in &self.links {
            link.dispose(reason);
        }
        let terminal = self.terminal.borrow_mut().take();
        if let Some(terminal) = terminal {
            terminal.dispose(reason);
        }
    }
}

fn relay<V: Clone + 'static>(chain: &Chain<V>, msg: &Passed<V>, forward: impl Fn(V), warn: impl Fn(&str)) {
    match msg {
        Passed::Value(v) => forward(v.clone()),
        Passed::Warning(reason) => warn(reason),
        Passed::Done(reason) => chain.close(reason),
    }
}

/// Chains `links` and returns the terminal stream.
pub fn pipe<V: Clone + 'static>(links: &[WritableStream<V>]) -> Result<Stream<V>, RxError> {
    if links.is_empty() {
        return Err(RxError::MissingConfiguration("pipe needs at least one stream".to_string()));
    }

    let chain = Rc::new(Chain {
        links: links.iter().map(|l| l.emitter()).collect(),
        listeners: RefCell::new(Vec::new()),
        terminal: RefCell::new(None),
        closed: Cell::new(false),
    });

    let teardown: Teardown = {
        let chain = Rc::clone(&chain);
        Box::new(move |reason: &str| chain.close(reason))
    };
    let terminal = init_stream_with::<V>(StreamOptions {
        label: Some("pipe".to_string()),
        on_dispose: Some(teardown),
        ..Default::default()
    });
    *chain.terminal.borrow_mut() = Some(terminal.emitter());

    let mut listeners = Vec::with_capacity(links.len());
    for pair in links.windows(2) {
        let next = pair[1].clone();
        let warn_next = pair[1].clone();
        let chain = Rc::clone(&chain);
        listeners.push(pair[0].on(move |msg| {
            relay(
                &*chain,
                msg,
                |v| {
                    let _ = next.set(v);
                },
                |r| warn_next.signal_warning(r),
            )
        }));
    }

    let out = terminal.emitter();
    let last = &links[links.len() - 1];
    let owner = Rc::clone(&chain);
    listeners.push(last.on(move |msg| {
        relay(
            &*owner,
            msg,
            |v| {
                out.set(v);
            },
            |r| out.warn(r),
        )
    }));
    chain.listeners.borrow_mut().extend(listeners);

    // A link that was already disposed breaks the chain from the start.
    if let Some(dead) = links.iter().find(|l| l.is_disposed()) {
        let reason = format!("pipe link '{}' already disposed", dead.label());
        chain.close(&reason);
    }

    Ok(terminal.into_stream())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::init_stream;

    #[test]
    fn test_values_flow_through_every_link() {
        let a = init_stream::<i32>();
        let b = init_stream::<i32>();
        let c = init_stream::<i32>();
        let end = pipe(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _u = end.on_value(move |v| sink.borrow_mut().push(*v));

        a.set(1).unwrap();
        b.set(2).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(c.last(), Some(2));
    }

    #[test]
    fn test_middle_link_disposal_cascades() {
        let a = init_stream::<i32>();
        let b = init_stream::<i32>();
        let c = init_stream::<i32>();
        let end = pipe(&[a.clone(), b.clone(), c.clone()]).unwrap();

        b.dispose("broken");
        assert!(a.is_disposed());
        assert!(c.is_disposed());
        assert!(end.is_disposed());
    }

    #[test]
    fn test_terminal_disposal_closes_chain() {
        let a = init_stream::<i32>();
        let end = pipe(&[a.clone()]).unwrap();
        end.dispose("consumer gone");
        assert!(a.is_disposed());
    }

    #[test]
    fn test_cascade_survives_dropped_terminal() {
        let a = init_stream::<i32>();
        let b = init_stream::<i32>();
        let c = init_stream::<i32>();
        drop(pipe(&[a.clone(), b.clone(), c.clone()]).unwrap());

        a.set(5).unwrap();
        assert_eq!(c.last(), Some(5));

        b.dispose("broken");
        assert!(a.is_disposed());
        assert!(c.is_disposed());
    }

    #[test]
    fn test_empty_pipe_is_missing_configuration() {
        assert!(matches!(pipe::<i32>(&[]), Err(RxError::MissingConfiguration(_))));
    }
}
