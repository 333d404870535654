//! The `SessionManager` itself: the struct every component (C1-C8) hangs off, plus the shared
//! `get_or_create` (§4.5) used by both ingress paths and the event-bus endpoint.
//!
//! Grounded on the teacher's `Endpoint`/`Context` split: `Endpoint` owns the `Slab` of
//! connections plus lookup maps, while a `Context` bundles the rng, config, and outbound queues
//! threaded through every handler. Here the distinction collapses into one struct, since (unlike
//! QUIC) nothing here needs to borrow the index and the outbound queues independently of each
//! other at the same time.

use bytes::Bytes;

use crate::address::{derive_address, Address, PublicKey};
use crate::buffer::BufferedMessageStore;
use crate::config::SessionManagerConfig;
use crate::crypto_auth::{CryptoAuthSession, HandshakeState, NoiseCryptoAuth};
use crate::error::{DropReason, SessionManagerError};
use crate::event::{CoreEvent, Node, BROADCAST_PATHFINDER};
use crate::index::SessionIndex;
use crate::session::{Session, DEAD_LINK};

/// The session manager. Owns every session (via `SessionIndex`), the buffered-message store, and
/// the outbound queues for its three interfaces (switch, inside, event bus) — mirroring the
/// teacher's `Io`/`Event` queue pair, but split one-per-interface since we have three distinct
/// external interfaces rather than one.
pub struct SessionManager {
    pub(crate) own_private_key: [u8; 32],
    pub(crate) own_public_key: PublicKey,
    pub(crate) own_address: Address,
    pub(crate) config: SessionManagerConfig,

    pub(crate) sessions: SessionIndex,
    pub(crate) buffers: BufferedMessageStore,

    pub(crate) switch_out: Vec<Bytes>,
    pub(crate) inside_out: Vec<Bytes>,
    pub(crate) bus_out: Vec<CoreEvent>,

    pub(crate) last_housekeeping_millis: u64,
}

impl SessionManager {
    pub fn new(
        own_private_key: [u8; 32],
        config: SessionManagerConfig,
    ) -> Result<Self, SessionManagerError> {
        if config.max_buffered_messages == 0 {
            return Err(SessionManagerError::ZeroBufferCapacity);
        }
        let secret = x25519_dalek::StaticSecret::from(own_private_key);
        let public = x25519_dalek::PublicKey::from(&secret);
        let own_public_key = PublicKey(*public.as_bytes());
        let own_address =
            derive_address(&own_public_key).ok_or(SessionManagerError::InvalidOwnAddress)?;
        Ok(SessionManager {
            own_private_key,
            own_public_key,
            own_address,
            buffers: BufferedMessageStore::new(
                config.max_buffered_messages,
                config.buffer_timeout_millis,
            ),
            config,
            sessions: SessionIndex::new(),
            switch_out: Vec::new(),
            inside_out: Vec::new(),
            bus_out: Vec::new(),
            last_housekeeping_millis: 0,
        })
    }

    pub fn own_address(&self) -> Address {
        self.own_address
    }

    pub fn own_public_key(&self) -> PublicKey {
        self.own_public_key
    }

    /// Pending frames for the switch interface, drained by the caller after each handler call.
    pub fn take_switch_out(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.switch_out)
    }

    /// Pending frames for the inside interface.
    pub fn take_inside_out(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.inside_out)
    }

    /// Pending events for the event bus; each is encoded as its own frame by the transport.
    pub fn take_bus_out(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.bus_out)
    }

    fn emit(&mut self, event: CoreEvent) {
        self.bus_out.push(event);
    }

    /// (§4.5) Look up `ip`, applying the sticky-maintain / monotone-metric update rules if found,
    /// or create a fresh session otherwise. `label` of `0` means "no label offered". Emits
    /// `SESSION` on creation (§4.5), nothing on update (the caller may still want to emit
    /// `DISCOVERED_PATH`, which is specific to the switch-ingress caller, see §4.2 step 6).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn get_or_create(
        &mut self,
        ip: Address,
        pub_key: Option<PublicKey>,
        version: u32,
        label: u64,
        metric: u32,
        maintain: bool,
        now: u64,
    ) -> u32 {
        debug_assert!(ip.is_valid());
        if let Some(session) = self.sessions.get_by_ip6(&ip) {
            if session.version == 0 {
                session.version = version;
            }
            session.maintain_session |= maintain;

            if metric == DEAD_LINK && label == session.send_switch_label {
                if session.send_switch_label == session.recv_switch_label {
                    session.send_switch_label = 0;
                    session.metric = DEAD_LINK;
                } else {
                    session.send_switch_label = session.recv_switch_label;
                    session.metric = crate::session::SM_INCOMING;
                }
            } else if metric <= session.metric && label != 0 {
                session.send_switch_label = label;
                if session.version == 0 {
                    session.version = version;
                }
                session.metric = metric;
            }
            return session.receive_handle;
        }

        let handle = self.sessions.insert_with(ip, |handle| {
            let ca = if let Some(key) = pub_key {
                NoiseCryptoAuth::new_responder(self.own_private_key, Some(key), now)
            } else {
                NoiseCryptoAuth::new_initiator(self.own_private_key, None, now)
            };
            if let Some(key) = pub_key {
                debug_assert_eq!(derive_address(&key), Some(ip));
            }
            Session::new(ip, ca, version, label, metric, maintain, handle, now)
        });

        let node = {
            let session = self
                .sessions
                .get_by_handle(handle)
                .expect("just inserted");
            node_for(session)
        };
        self.emit(CoreEvent::Session {
            target_pathfinder: BROADCAST_PATHFINDER,
            node,
        });
        tracing::debug!(address = ?ip, handle, "session created");
        handle
    }

    /// True if the crypto session backing `ip` has reached `RECEIVED_KEY` or better.
    pub(crate) fn session_ready(&self, ip: &Address) -> bool {
        self.sessions
            .get_by_ip6_ref(ip)
            .map(|s| s.ca.state() >= HandshakeState::ReceivedKey)
            .unwrap_or(false)
    }

    pub(crate) fn drop_frame(&self, reason: DropReason) {
        tracing::debug!(%reason, "dropping frame");
    }
}

pub(crate) fn node_for(session: &Session) -> Node {
    Node {
        path: session.send_switch_label,
        metric: session.metric,
        version: session.version,
        public_key: session.peer_public_key().unwrap_or(PublicKey::ZERO),
        ip6: session.ip6,
    }
}
