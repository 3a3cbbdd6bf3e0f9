//! # Stream Registry
//!
//! A caller-owned context for inspecting live streams while debugging. Nothing in
//! the engine reaches for a registry on its own: a registry is handed to a stream
//! at construction (through `StreamOptions` or `UpstreamOptions`) or a stream is
//! tracked explicitly. Entries hold weak references only, so tracking never keeps
//! a stream alive.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::stream::Stream;

pub(crate) trait Inspect {
    fn label(&self) -> &str;
    fn is_disposed(&self) -> bool;
    fn subscriber_count(&self) -> usize;
}

/// Point-in-time view of one tracked stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    /// How many times the name was tracked without being untracked.
    pub registrations: u32,
    /// False once the stream has been dropped.
    pub alive: bool,
    pub disposed: bool,
    pub subscribers: usize,
}

#[derive(Clone, Default)]
pub struct StreamRegistry {
    entries: Rc<RefCell<HashMap<String, (u32, Weak<dyn Inspect>)>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `stream` under `name`. Tracking an existing name points it at the
    /// newer stream and bumps its registration count.
    pub fn track<V: Clone + 'static>(&self, name: &str, stream: &Stream<V>) {
        stream.track_in(self, name);
    }

    pub(crate) fn track_inspect(&self, name: &str, stream: Weak<dyn Inspect>) {
        let mut entries = self.entries.borrow_mut();
        let entry = entries
            .entry(name.to_string())
            .or_insert_with(|| (0, Weak::clone(&stream)));

        entry.0 += 1;
        entry.1 = stream;
        log::trace!("Registry tracks '{}' ({} registrations)", name, entry.0);
    }

    /// Drops one registration of `name`, removing the entry on the last one.
    pub fn untrack(&self, name: &str) {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(name) {
            if entry.0 > 0 {
                entry.0 -= 1;
            }
            if entry.0 == 0 {
                entries.remove(name);
            }
        }
    }

    /// Entries sorted by name.
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        let entries = self.entries.borrow();
        let mut out: Vec<RegistryEntry> = entries
            .iter()
            .map(|(name, (count, weak))| match weak.upgrade() {
                Some(s) => RegistryEntry {
                    name: name.clone(),
                    registrations: *count,
                    alive: true,
                    disposed: s.is_disposed(),
                    subscribers: s.subscriber_count(),
                },
                None => RegistryEntry {
                    name: name.clone(),
                    registrations: *count,
                    alive: false,
                    disposed: true,
                    subscribers: 0,
                },
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Removes entries whose stream was dropped or disposed. Returns how many.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|name, (_, weak)| match weak.upgrade() {
            Some(s) if !s.is_disposed() => true,
            _ => {
                log::debug!("Registry prunes '{}'", name);
                false
            }
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        let live: Vec<String> = entries
            .values()
            .filter_map(|(_, w)| w.upgrade())
            .map(|s| s.label().to_string())
            .collect();
        f.debug_struct("StreamRegistry")
            .field("entries", &entries.len())
            .field("live", &live)
            .finish()
    }
}
