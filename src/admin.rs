//! C8: the read-only admin view (§6) — a paged handle listing plus per-session stats, both
//! read directly off the live index with no side effects.

use crate::address::Address;
use crate::crypto_auth::{CryptoAuthSession, CryptoStats, HandshakeState};
use crate::manager::SessionManager;

/// Everything the admin view reports for one session (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub address: Address,
    pub state: HandshakeState,
    pub handle: u32,
    pub send_handle: u32,
    pub metric: u32,
    pub duplicates: u64,
    pub lost_packets: u64,
    pub received_out_of_range: u64,
}

impl SessionStats {
    fn from_session(handle: u32, session: &crate::session::Session) -> Self {
        let CryptoStats {
            duplicates,
            lost_packets,
            received_out_of_range,
        } = session.ca.stats();
        SessionStats {
            address: session.ip6,
            state: session.ca.state(),
            handle,
            send_handle: session.send_handle,
            metric: session.metric,
            duplicates,
            lost_packets,
            received_out_of_range,
        }
    }
}

impl SessionManager {
    /// Paged listing of live handles (§6 `get-handles`), in ascending handle order so pages are
    /// stable across calls as long as no handle is added or removed between them.
    pub fn admin_get_handles(&self, page: usize, page_size: usize) -> Vec<u32> {
        let mut handles = self.sessions.list_handles();
        handles.sort_unstable();
        let start = page.saturating_mul(page_size).min(handles.len());
        let end = start.saturating_add(page_size).min(handles.len());
        handles[start..end].to_vec()
    }

    /// Per-session stats for one handle (§6 `session-stats`), or `None` if the handle no longer
    /// names a live session.
    pub fn admin_session_stats(&self, handle: u32) -> Option<SessionStats> {
        let session = self.sessions.get_by_handle_ref(handle)?;
        Some(SessionStats::from_session(handle, session))
    }

    /// Total live session count, for the admin view's summary line.
    pub fn admin_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Count of destinations currently awaiting route discovery (§6, §3 I4).
    pub fn admin_buffered_message_count(&self) -> usize {
        self.buffers.len()
    }
}

/// Formats an address the way the admin view displays it: `v{version}.{16 hex bytes, grouped in
/// fours}.k`. Not a byte-exact reproduction of any particular encoding (the source design names
/// the scheme but not its exact alphabet); the "vN...k" shape is what §6 asks for. See DESIGN.md.
pub fn format_admin_address(addr: &Address, version: u32) -> String {
    use std::fmt::Write;
    let mut hex = String::with_capacity(32);
    for byte in addr.as_bytes() {
        write!(hex, "{:02x}", byte).expect("writing to a String cannot fail");
    }
    let groups: Vec<&str> = hex
        .as_bytes()
        .chunks(4)
        .map(|c| std::str::from_utf8(c).expect("hex is ascii"))
        .collect();
    format!("v{}.{}.k", version, groups.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::find_keypair_for_test;
    use crate::config::SessionManagerConfig;
    use rand::rngs::OsRng;
    use rand::RngCore;

    fn manager() -> SessionManager {
        let mut own_key = [0u8; 32];
        loop {
            OsRng.fill_bytes(&mut own_key);
            let secret = x25519_dalek::StaticSecret::from(own_key);
            let public = x25519_dalek::PublicKey::from(&secret);
            if crate::address::derive_address(&crate::address::PublicKey(*public.as_bytes()))
                .is_some()
            {
                break;
            }
        }
        SessionManager::new(own_key, SessionManagerConfig::default()).unwrap()
    }

    #[test]
    fn paging_splits_handles_into_even_chunks() {
        let mut mgr = manager();
        for _ in 0..5 {
            let (_s, pk, addr) = find_keypair_for_test();
            mgr.get_or_create(addr, Some(pk), 1, 0xAB, 10, true, 0);
        }
        let page0 = mgr.admin_get_handles(0, 2);
        let page1 = mgr.admin_get_handles(1, 2);
        let page2 = mgr.admin_get_handles(2, 2);
        assert_eq!(page0.len(), 2);
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 1);
        assert!(mgr.admin_get_handles(10, 2).is_empty());
    }

    #[test]
    fn session_stats_reports_live_session_and_none_after_removal() {
        let mut mgr = manager();
        let (_s, pk, addr) = find_keypair_for_test();
        let handle = mgr.get_or_create(addr, Some(pk), 1, 0xAB, 10, true, 0);
        let stats = mgr.admin_session_stats(handle).unwrap();
        assert_eq!(stats.address, addr);
        assert_eq!(stats.handle, handle);
        assert_eq!(mgr.admin_session_count(), 1);
        assert_eq!(mgr.admin_buffered_message_count(), 0);

        assert_eq!(mgr.admin_session_stats(handle + 9999), None);
    }

    #[test]
    fn address_formatting_matches_scheme() {
        let addr = Address([0xFC; 16]);
        let formatted = format_admin_address(&addr, 1);
        assert!(formatted.starts_with("v1."));
        assert!(formatted.ends_with(".k"));
    }
}
