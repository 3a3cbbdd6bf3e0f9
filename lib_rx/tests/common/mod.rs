#![allow(dead_code)]

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use lib_rx::{Passed, Stream};
use tokio::task::LocalSet;
use tokio::time::Instant;

pub type Log<V> = Rc<RefCell<Vec<Passed<V>>>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Runs `f` on a `LocalSet`, which every spawned engine task needs.
pub async fn local<F: Future>(f: F) -> F::Output {
    LocalSet::new().run_until(f).await
}

/// Records every message `stream` delivers from now on.
pub fn record<V: Clone + 'static>(stream: &Stream<V>) -> Log<V> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    stream.on(move |msg| sink.borrow_mut().push(msg.clone()));
    log
}

/// Records values together with the time they arrived.
pub fn record_timed<V: Clone + 'static>(stream: &Stream<V>) -> Rc<RefCell<Vec<(Instant, V)>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    stream.on_value(move |v| sink.borrow_mut().push((Instant::now(), v.clone())));
    log
}

pub fn values<V: Clone>(log: &Log<V>) -> Vec<V> {
    log.borrow().iter().filter_map(|m| m.value().cloned()).collect()
}

pub fn done_reason<V>(log: &Log<V>) -> Option<String> {
    log.borrow().iter().find_map(|m| match m {
        Passed::Done(reason) => Some(reason.clone()),
        _ => None,
    })
}
