//! C3: bounded store of outbound messages awaiting route discovery (§3 I4, §4.4, §8 P3/L4).

use bytes::Bytes;
use fnv::FnvHashMap;

use crate::address::Address;
use crate::error::DropReason;

/// One pending outbound plaintext message plus its arrival timestamp.
pub struct BufferedMessage {
    pub payload: Bytes,
    pub created_at_millis: u64,
}

/// Bounded map of destination → one pending message (I4: at most one per destination).
pub struct BufferedMessageStore {
    max_entries: usize,
    timeout_millis: u64,
    entries: FnvHashMap<Address, BufferedMessage>,
}

impl BufferedMessageStore {
    pub fn new(max_entries: usize, timeout_millis: u64) -> Self {
        BufferedMessageStore {
            max_entries,
            timeout_millis,
            entries: FnvHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, ip: &Address) -> bool {
        self.entries.contains_key(ip)
    }

    pub fn take(&mut self, ip: &Address) -> Option<BufferedMessage> {
        self.entries.remove(ip)
    }

    /// (§4.4 `needsLookup` steps 1-3) Evicts any existing buffer for `ip` (I4: at most one
    /// outstanding per destination), sweeps timed-out entries if the store is full, and stores
    /// the new message — unless the store is still full afterwards, in which case the message is
    /// dropped and `DropReason::BufferStoreFull` is returned.
    pub fn submit(
        &mut self,
        ip: Address,
        payload: Bytes,
        now: u64,
    ) -> Result<(), DropReason> {
        self.entries.remove(&ip);
        if self.entries.len() >= self.max_entries {
            self.check_timed_out(now);
        }
        if self.entries.len() >= self.max_entries {
            return Err(DropReason::BufferStoreFull);
        }
        self.entries.insert(
            ip,
            BufferedMessage {
                payload,
                created_at_millis: now,
            },
        );
        Ok(())
    }

    /// (§4.4 `checkTimedOutBuffers`, §8 L4) Drops any entry older than the configured timeout.
    /// Returns the addresses that were dropped, in case a caller wants to log them.
    pub fn check_timed_out(&mut self, now: u64) -> Vec<Address> {
        let timeout = self.timeout_millis;
        let expired: Vec<Address> = self
            .entries
            .iter()
            .filter(|(_, msg)| now.saturating_sub(msg.created_at_millis) >= timeout)
            .map(|(ip, _)| *ip)
            .collect();
        for ip in &expired {
            self.entries.remove(ip);
        }
        expired
    }
}
