//! C1: dual-keyed (IPv6 ⇄ session) index with a randomized handle base.
//!
//! Grounded directly on the teacher's `Endpoint`: a `Slab<Connection>` as the single
//! authoritative store, with an `FnvHashMap` mapping an external key (there, `ConnectionId`;
//! here, `Address`) to the slab index. The random `firstHandle` offset (§3, §9) is the one
//! addition the teacher's CID-keyed design doesn't need, since QUIC connection IDs are already
//! unguessable; we add it so the externally visible handle is not a bare slab index.

use fnv::FnvHashMap;
use rand::rngs::OsRng;
use rand::Rng;
use slab::Slab;

use crate::address::{derive_address, Address};
use crate::session::Session;

/// Lower/upper bounds for the randomized per-instance handle base (§3).
const FIRST_HANDLE_MIN: u32 = 4;
const FIRST_HANDLE_MAX_EXCLUSIVE: u32 = 100_000;

/// Dual-keyed session store (C1). Every live session is reachable both by its `Address` and by
/// its `receive_handle` (I1); handles are never renumbered while an entry lives (§9).
pub struct SessionIndex {
    first_handle: u32,
    by_address: FnvHashMap<Address, usize>,
    slots: Slab<Session>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self::with_first_handle(random_first_handle())
    }

    /// Exposed for deterministic tests; production callers should use [`SessionIndex::new`] so
    /// the handle base is drawn from an OS random source, per the §9 security note.
    pub fn with_first_handle(first_handle: u32) -> Self {
        assert!((FIRST_HANDLE_MIN..FIRST_HANDLE_MAX_EXCLUSIVE).contains(&first_handle));
        SessionIndex {
            first_handle,
            by_address: FnvHashMap::default(),
            slots: Slab::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn handle_for_index(&self, index: usize) -> u32 {
        self.first_handle + index as u32
    }

    fn index_for_handle(&self, handle: u32) -> Option<usize> {
        handle.checked_sub(self.first_handle).map(|v| v as usize)
    }

    /// Allocates a slot and constructs the session to go in it via `build`, which receives the
    /// `receiveHandle` the new slot will carry — needed because `Session::new` takes its own
    /// handle as a constructor argument. Returns the allocated handle.
    pub fn insert_with<F>(&mut self, address: Address, build: F) -> u32
    where
        F: FnOnce(u32) -> Session,
    {
        debug_assert!(address.is_valid());
        let first_handle = self.first_handle;
        let entry = self.slots.vacant_entry();
        let idx = entry.key();
        let handle = first_handle + idx as u32;
        entry.insert(build(handle));
        self.by_address.insert(address, idx);
        handle
    }

    pub fn get_by_ip6(&mut self, ip: &Address) -> Option<&mut Session> {
        let idx = *self.by_address.get(ip)?;
        let session = self.slots.get_mut(idx)?;
        run_lazy_key_check(session);
        Some(session)
    }

    pub fn get_by_ip6_ref(&self, ip: &Address) -> Option<&Session> {
        let idx = *self.by_address.get(ip)?;
        self.slots.get(idx)
    }

    pub fn get_by_handle(&mut self, handle: u32) -> Option<&mut Session> {
        let idx = self.index_for_handle(handle)?;
        let session = self.slots.get_mut(idx)?;
        run_lazy_key_check(session);
        Some(session)
    }

    /// Read-only lookup by handle, for callers (the admin view) that only observe state and so
    /// have no need to run the lazy key-consistency check.
    pub fn get_by_handle_ref(&self, handle: u32) -> Option<&Session> {
        let idx = self.index_for_handle(handle)?;
        self.slots.get(idx)
    }

    /// Removes the session addressed by `handle`. Returns it so the caller can emit
    /// `SESSION_ENDED` with its final state before dropping it.
    pub fn remove_by_handle(&mut self, handle: u32) -> Option<Session> {
        let idx = self.index_for_handle(handle)?;
        if !self.slots.contains(idx) {
            return None;
        }
        let session = self.slots.remove(idx);
        self.by_address.remove(&session.ip6);
        Some(session)
    }

    /// Snapshot of every live handle, for the admin view (C8).
    pub fn list_handles(&self) -> Vec<u32> {
        self.slots
            .iter()
            .map(|(idx, _)| self.handle_for_index(idx))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Session)> {
        self.slots
            .iter()
            .map(move |(idx, s)| (self.handle_for_index(idx), s))
    }

    /// Iterates handles back-to-front, matching the housekeeper's (§4.8) requirement that
    /// removing an entry during the scan must not shift yet-to-visit entries. `Slab` removal
    /// never renumbers other entries, so this is really just "iterate in reverse handle order".
    pub fn handles_back_to_front(&self) -> Vec<u32> {
        let mut handles = self.list_handles();
        handles.sort_unstable_by(|a, b| b.cmp(a));
        handles
    }
}

impl Default for SessionIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// (§4.1) On every successful lookup, assert that a newly-learned peer key derives the address
/// this session is indexed under. A mismatch is category-5 in §7: a fatal assertion, since it
/// indicates memory corruption or a protocol violation, not a recoverable error.
fn run_lazy_key_check(session: &mut Session) {
    if session.found_key {
        return;
    }
    if let Some(key) = session.peer_public_key() {
        let derived = derive_address(&key);
        assert_eq!(
            derived,
            Some(session.ip6),
            "peer key for session {:?} derives a different address than it is indexed under",
            session.ip6
        );
        session.found_key = true;
    }
}

fn random_first_handle() -> u32 {
    OsRng.gen_range(FIRST_HANDLE_MIN..FIRST_HANDLE_MAX_EXCLUSIVE)
}
