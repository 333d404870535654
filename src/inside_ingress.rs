//! C5: inside-side ingress (§4.3) plus the shared encrypt path (§4.7) used by this component, by
//! the event-bus flush (C6), and by handshake replies.

use bytes::{BufMut, Bytes, BytesMut};

use crate::address::Address;
use crate::crypto_auth::CryptoAuthSession;
use crate::error::DropReason;
use crate::event::CoreEvent;
use crate::manager::SessionManager;
use crate::session::SM_SEND;
use crate::wire::{
    bit_reverse, DataHeader, RouteFlags, RouteHeader, SwitchControl, SwitchHeader, CONTROL_MARKER,
    ROUTE_HEADER_LEN,
};

/// Protocol version this node advertises in its own `SEARCH_REQ` events (§4.4 step 4: "current
/// version"). Not otherwise specified; a single crate-wide constant stands in for it.
pub const OWN_PROTOCOL_VERSION: u32 = 1;

impl SessionManager {
    /// Handles one plaintext datagram arriving on the inside interface (§4.3).
    pub fn handle_inside_frame(&mut self, frame: Bytes, now: u64) {
        let Some(route_header) = RouteHeader::parse(&frame) else {
            self.drop_frame(DropReason::ShortRouteHeader);
            return;
        };
        let body = frame.slice(ROUTE_HEADER_LEN..);

        if route_header.flags.contains(RouteFlags::CTRLMSG) {
            self.forward_ctrlmsg_to_switch(&route_header, body);
            return;
        }

        let dest = route_header.ip6;
        if !dest.is_valid() {
            self.drop_frame(DropReason::ShortRouteHeader);
            return;
        }

        // Route through `get_or_create` whether or not a session already exists for `dest`: on a
        // hit it still applies the §4.5 update (adopt a non-zero version/label/metric), so a
        // session that only ever learned its version from an inbound handshake isn't stuck
        // forever just because it was never looked up again via `get_or_create` directly.
        let handle = if self.sessions.get_by_ip6_ref(&dest).is_some() {
            self.get_or_create(
                dest,
                None,
                route_header.version,
                route_header.switch_label,
                SM_SEND,
                !route_header.flags.contains(RouteFlags::PATHFINDER),
                now,
            )
        } else {
            let have_key = !route_header.public_key.is_zero();
            let have_version = route_header.version != 0;
            if have_key && have_version {
                self.get_or_create(
                    dest,
                    Some(route_header.public_key),
                    route_header.version,
                    route_header.switch_label,
                    SM_SEND,
                    !route_header.flags.contains(RouteFlags::PATHFINDER),
                    now,
                )
            } else {
                self.log_missing_route(dest);
                self.buffer_and_search(dest, frame.clone(), route_header.version, now);
                return;
            }
        };

        // Re-borrow: `get_or_create` may have just inserted this session.
        let (version_unknown, label_unknown, label_fallback, ready) = {
            let session = self
                .sessions
                .get_by_handle(handle)
                .expect("handle resolved above");
            let label_fallback = if route_header.switch_label == 0 {
                session.send_switch_label
            } else {
                route_header.switch_label
            };
            (
                session.version == 0,
                route_header.switch_label == 0 && session.send_switch_label == 0,
                label_fallback,
                session.ready_for_data(),
            )
        };

        if version_unknown || label_unknown {
            self.log_missing_route(dest);
            self.buffer_and_search(dest, frame.clone(), route_header.version, now);
            return;
        }

        let Some(data_header) = DataHeader::parse(&body) else {
            self.drop_frame(DropReason::MissingDataHeader);
            return;
        };
        let is_dht = data_header.is_dht();
        if !is_dht && !ready {
            self.buffer_and_search(dest, frame.clone(), route_header.version, now);
            return;
        }

        let mut effective_header = route_header;
        effective_header.switch_label = label_fallback;
        self.encrypt_path(handle, &effective_header, BytesMut::from(&body[..]), now);
    }

    /// (§7 category 4) Logs why an outbound frame to `dest` couldn't be forwarded immediately
    /// and had to be parked instead; the frame itself isn't dropped here (`buffer_and_search`
    /// may still emit `DropReason::BufferStoreFull` if there's no room left for it).
    fn log_missing_route(&self, dest: Address) {
        tracing::debug!(reason = %DropReason::NoRouteVersionOrKey(dest), "buffering outbound frame");
    }

    fn forward_ctrlmsg_to_switch(&mut self, route_header: &RouteHeader, body: Bytes) {
        if !route_header.public_key.is_zero() || !route_header.ip6.is_zero() {
            self.drop_frame(DropReason::BadCtrlmsgFlags);
            return;
        }
        let mut out = BytesMut::new();
        let header = SwitchHeader {
            label: bit_reverse(route_header.switch_label),
            control: SwitchControl::empty(),
        };
        header.write(&mut out);
        out.put_u32(CONTROL_MARKER);
        out.put_slice(&body);
        self.switch_out.push(out.freeze());
    }

    /// (§4.4 `needsLookup`) Buffers `frame` for `dest` and emits a `SEARCH_REQ`.
    pub(crate) fn buffer_and_search(&mut self, dest: Address, frame: Bytes, _version: u32, now: u64) {
        match self.buffers.submit(dest, frame, now) {
            Ok(()) => {}
            Err(reason) => {
                self.drop_frame(reason);
                return;
            }
        }
        self.bus_out.push(CoreEvent::SearchReq {
            target_pathfinder: crate::event::BROADCAST_PATHFINDER,
            ip6: dest,
            version: OWN_PROTOCOL_VERSION,
        });
    }

    /// (§4.7) Encrypts `body` (data header + user payload, route header already stripped) for
    /// the session at `handle` and queues the resulting frame on the switch interface.
    pub(crate) fn encrypt_path(
        &mut self,
        handle: u32,
        route_header: &RouteHeader,
        mut body: BytesMut,
        now: u64,
    ) {
        let Some(data_header) = DataHeader::parse(&body) else {
            self.drop_frame(DropReason::MissingDataHeader);
            return;
        };
        let is_dht = data_header.is_dht();

        let pre_state = {
            let session = self
                .sessions
                .get_by_handle(handle)
                .expect("caller resolved handle");
            if !is_dht {
                session.time_of_last_out = now;
            }
            session.ca.reset_if_timeout(now);
            session.ca.state()
        };

        if pre_state < crate::crypto_auth::HandshakeState::ReceivedKey {
            let receive_handle = self
                .sessions
                .get_by_handle(handle)
                .expect("caller resolved handle")
                .receive_handle;
            let mut with_handle = BytesMut::with_capacity(4 + body.len());
            with_handle.put_u32(receive_handle);
            with_handle.put_slice(&body);
            body = with_handle;
        }

        let encrypt_result = {
            let session = self.sessions.get_by_handle(handle).expect("resolved above");
            session.ca.encrypt(&mut body)
        };
        if let Err(err) = encrypt_result {
            tracing::debug!(handle, %err, "outbound encrypt failed, dropping frame");
            return;
        }

        let (nonce_or_handle, out_label) = {
            let session = self.sessions.get_by_handle(handle).expect("resolved above");
            session.bytes_out += body.len() as u64;
            let nonce_or_handle = if session.ca.state() >= crate::crypto_auth::HandshakeState::ReceivedKey
            {
                session.send_handle
            } else {
                0
            };
            let out_label = if route_header.switch_label != 0 {
                route_header.switch_label
            } else {
                session.send_switch_label
            };
            (nonce_or_handle, out_label)
        };

        let mut out = BytesMut::new();
        let header = SwitchHeader {
            label: bit_reverse(out_label),
            control: SwitchControl::empty(),
        };
        header.write(&mut out);
        out.put_u32(nonce_or_handle);
        out.put_slice(&body);
        self.switch_out.push(out.freeze());
    }
}
