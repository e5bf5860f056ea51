//! Which host structures currently lead to a live cavern
//!
//! Controllers heartbeat their host every ready tick and deregister on
//! destruction. Reads take the current tick: a host whose last heartbeat is
//! older than `stale_after` reads as inactive even if no controller is left
//! to run `maybe_refresh`, which only prunes the stored entries.
//!
//! The registry is shared between controllers through a single-threaded
//! `Rc<RefCell<_>>` handle; callers that find it already borrowed skip
//! their update for that tick instead of panicking.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::core::types::{HostId, Tick};

pub type RegistryHandle = Rc<RefCell<ActiveCavernRegistry>>;

#[derive(Debug, Clone)]
pub struct ActiveCavernRegistry {
    /// Host -> tick of its last heartbeat
    hosts: BTreeMap<HostId, Tick>,
    refresh_interval: u64,
    stale_after: u64,
    next_refresh: Tick,
}

impl Default for ActiveCavernRegistry {
    fn default() -> Self {
        Self::new(250, 1_000)
    }
}

impl ActiveCavernRegistry {
    pub fn new(refresh_interval: u64, stale_after: u64) -> Self {
        Self {
            hosts: BTreeMap::new(),
            refresh_interval: refresh_interval.max(1),
            stale_after,
            next_refresh: 0,
        }
    }

    /// Wrap in a shareable handle
    pub fn shared(self) -> RegistryHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn heartbeat(&mut self, host: HostId, now: Tick) {
        self.hosts.insert(host, now);
    }

    pub fn mark_inactive(&mut self, host: HostId) -> bool {
        self.hosts.remove(&host).is_some()
    }

    /// Host heartbeated within `stale_after` ticks of `now`
    pub fn is_active(&self, host: HostId, now: Tick) -> bool {
        self.hosts
            .get(&host)
            .is_some_and(|&seen| self.is_fresh(seen, now))
    }

    pub fn active_hosts(&self, now: Tick) -> Vec<HostId> {
        self.hosts
            .iter()
            .filter(|(_, seen)| self.is_fresh(**seen, now))
            .map(|(host, _)| *host)
            .collect()
    }

    /// Stored entries, stale ones included until the next refresh
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    fn is_fresh(&self, seen: Tick, now: Tick) -> bool {
        now.saturating_sub(seen) <= self.stale_after
    }

    /// Drop stale hosts if a refresh is due; returns how many were dropped
    pub fn maybe_refresh(&mut self, now: Tick) -> usize {
        if now < self.next_refresh {
            return 0;
        }
        self.next_refresh = now + self.refresh_interval;
        let before = self.hosts.len();
        let stale_after = self.stale_after;
        self.hosts
            .retain(|_, seen| now.saturating_sub(*seen) <= stale_after);
        let dropped = before - self.hosts.len();
        if dropped > 0 {
            tracing::debug!("Active cavern registry dropped {} stale hosts", dropped);
        }
        dropped
    }
}
