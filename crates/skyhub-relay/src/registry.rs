//! Generic keyed collection for sessions, relay peers, crossfeeds and
//! access lists.
//!
//! A registry preserves insertion order (fan-out and operator listings
//! walk entries oldest-first), assigns each entry a never-reused id,
//! and keeps the traffic counters in [`EntryRecord`] current. Interior
//! mutability behind one mutex; lookups hand out clones so callers
//! never hold the lock across fan-out work.

use std::sync::{Mutex, MutexGuard};

use skyhub_core::addr::NetAddress;

use crate::entry::Recorded;

#[derive(Debug)]
pub struct Registry<T: Recorded> {
    inner: Mutex<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    entries: Vec<T>,
    next_id: u64,
}

impl<T: Recorded> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Recorded> Registry<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // a poisoned lock still holds consistent entries
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Insert an entry, assigning it the next id. Returns the id.
    pub fn add(&self, mut entry: T) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        entry.record_mut().id = id;
        inner.entries.push(entry);
        id
    }

    /// Remove by id. Returns the removed entry.
    pub fn remove(&self, id: u64) -> Option<T> {
        let mut inner = self.lock();
        let pos = inner.entries.iter().position(|e| e.record().id == id)?;
        Some(inner.entries.remove(pos))
    }

    /// Apply a closure to the entry with the given id.
    pub fn modify<F: FnOnce(&mut T)>(&self, id: u64, f: F) -> bool {
        let mut inner = self.lock();
        match inner.entries.iter_mut().find(|e| e.record().id == id) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }

    /// Account an inbound packet to the entry and refresh its
    /// last-seen time.
    pub fn record_rcvd(&self, id: u64, bytes: usize, now: u64) {
        self.modify(id, |e| {
            let rec = e.record_mut();
            rec.pkts_rcvd += 1;
            rec.bytes_rcvd += bytes as u64;
            rec.last_seen = now;
        });
    }

    /// Account an outbound packet to the entry.
    pub fn record_sent(&self, id: u64, bytes: usize, now: u64) {
        self.modify(id, |e| {
            let rec = e.record_mut();
            rec.pkts_sent += 1;
            rec.bytes_sent += bytes as u64;
            rec.last_sent = now;
        });
    }
}

impl<T: Recorded + Clone> Registry<T> {
    pub fn get(&self, id: u64) -> Option<T> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.record().id == id)
            .cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<T> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.record().name == name)
            .cloned()
    }

    /// Port-insensitive address lookup.
    pub fn find_by_addr(&self, addr: &NetAddress) -> Option<T> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.record().address == *addr)
            .cloned()
    }

    /// Port-aware address lookup.
    pub fn find_by_endpoint(&self, addr: &NetAddress) -> Option<T> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.record().address.same_endpoint(addr))
            .cloned()
    }

    /// First entry whose address or prefix covers `addr`. This is the
    /// access-list check: a /8 entry blocks the whole net.
    pub fn find_containing(&self, addr: &NetAddress) -> Option<T> {
        self.lock()
            .entries
            .iter()
            .find(|e| {
                let a = &e.record().address;
                *a == *addr || a.contains(addr)
            })
            .cloned()
    }

    /// Copy of all entries in insertion order.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().entries.clone()
    }

    /// Remove every entry silent past its timeout, honoring a join
    /// grace period. Returns the removed entries.
    pub fn evict_expired(&self, now: u64, grace_secs: u64) -> Vec<T> {
        let mut inner = self.lock();
        let mut removed = Vec::new();
        inner.entries.retain(|e| {
            let rec = e.record();
            let past_grace = now.saturating_sub(rec.join_time) > grace_secs;
            if rec.expired(now) && past_grace {
                removed.push(e.clone());
                false
            } else {
                true
            }
        });
        removed
    }
}
