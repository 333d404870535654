//! Per-peer session record (C2).

use crate::address::{Address, PublicKey};
use crate::crypto_auth::{CryptoAuthSession, HandshakeState, NoiseCryptoAuth};

/// Cost sentinel meaning "this path is broken" (§3, §4.5, §8 L2).
pub const DEAD_LINK: u32 = u32::MAX;
/// Baseline metric assigned to a session discovered via an inbound handshake.
pub const SM_INCOMING: u32 = 4096;
/// Baseline metric assigned to a session created to satisfy an outbound send.
pub const SM_SEND: u32 = 8192;

/// A single peer's session state: keys, routing metric, labels, counters, and the owned crypto
/// session. Constructed and owned exclusively by the `SessionIndex` (C1); callers only ever see
/// it through a manager-mediated borrow, matching the "manager owns sessions, sessions hold a
/// non-owning back-reference" note in §9.
pub struct Session {
    pub ip6: Address,
    pub ca: NoiseCryptoAuth,

    pub version: u32,
    pub send_switch_label: u64,
    pub recv_switch_label: u64,
    pub metric: u32,

    pub send_handle: u32,
    pub receive_handle: u32,

    pub bytes_in: u64,
    pub bytes_out: u64,
    pub time_of_last_in: u64,
    pub time_of_last_out: u64,
    pub time_of_keep_alive_in: u64,
    pub last_search_time: u64,

    pub maintain_session: bool,
    /// True once the peer's full public key is known. (I3): if true,
    /// `derive_address(ca.peer_public_key()) == ip6` must hold; checked lazily by `SessionIndex`.
    pub found_key: bool,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ip6: Address,
        ca: NoiseCryptoAuth,
        version: u32,
        send_switch_label: u64,
        metric: u32,
        maintain_session: bool,
        receive_handle: u32,
        now: u64,
    ) -> Self {
        let found_key = ca.peer_public_key().is_some();
        Session {
            ip6,
            ca,
            version,
            send_switch_label,
            recv_switch_label: 0,
            metric,
            send_handle: 0,
            receive_handle,
            bytes_in: 0,
            bytes_out: 0,
            time_of_last_in: now,
            time_of_last_out: now,
            time_of_keep_alive_in: now,
            last_search_time: now,
            maintain_session,
            found_key,
        }
    }

    /// (I5) A session is ready for data iff its crypto session has reached `RECEIVED_KEY`.
    pub fn ready_for_data(&self) -> bool {
        self.ca.state() >= HandshakeState::ReceivedKey
    }

    pub fn peer_public_key(&self) -> Option<PublicKey> {
        self.ca.peer_public_key()
    }
}
