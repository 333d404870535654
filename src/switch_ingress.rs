//! C4: switch-side ingress (§4.2). Parses frames arriving from the routing fabric, dispatches to
//! control / handshake / data paths, and turns decryption failures into structured error replies.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::address::derive_address;
use crate::crypto_auth::CryptoAuthSession;
use crate::error::DropReason;
use crate::event::CoreEvent;
use crate::manager::SessionManager;
use crate::session::SM_INCOMING;
use crate::wire::{
    bit_reverse, CryptoHeader, ErrorEnvelope, RouteFlags, RouteHeader, SwitchControl,
    SwitchHeader, CRYPTO_HEADER_LEN, NONCE_OR_HANDLE_LEN, SWITCH_HEADER_LEN,
};

const CONTROL_TYPE_ERROR: u32 = 1;
const CONTROL_SUBTYPE_AUTHENTICATION: u32 = 1;

impl SessionManager {
    /// Handles one datagram arriving on the switch interface. Never panics on attacker-controlled
    /// input; malformed frames are dropped per §7 category 1/2, decrypt failures produce a wire
    /// reply per category 3.
    pub fn handle_switch_frame(&mut self, frame: Bytes, now: u64) {
        if frame.len() < SWITCH_HEADER_LEN + NONCE_OR_HANDLE_LEN {
            self.drop_frame(DropReason::RuntFrame);
            return;
        }
        let switch_header =
            SwitchHeader::parse(&frame).expect("length checked above");
        let forward_label = bit_reverse(switch_header.label);

        let mut cursor = &frame[SWITCH_HEADER_LEN..];
        let nonce_or_handle = cursor.get_u32();
        let payload = &frame[SWITCH_HEADER_LEN + NONCE_OR_HANDLE_LEN..];

        if nonce_or_handle == crate::wire::CONTROL_MARKER {
            self.forward_control_frame(forward_label, payload);
            return;
        }

        if nonce_or_handle > crate::wire::MAX_RESERVED_NONCE {
            self.handle_data_frame(forward_label, nonce_or_handle, payload, now);
            return;
        }

        self.handle_handshake_frame(forward_label, payload, now);
    }

    fn forward_control_frame(&mut self, forward_label: u64, payload: &[u8]) {
        let route_header = RouteHeader {
            switch_label: forward_label,
            flags: RouteFlags::INCOMING | RouteFlags::CTRLMSG,
            version: 0,
            public_key: crate::address::PublicKey::ZERO,
            ip6: crate::address::Address::ZERO,
        };
        let mut out = BytesMut::new();
        route_header.write(&mut out);
        out.put_slice(payload);
        self.inside_out.push(out.freeze());
    }

    fn handle_data_frame(
        &mut self,
        forward_label: u64,
        handle: u32,
        payload: &[u8],
        now: u64,
    ) {
        if self.sessions.get_by_handle(handle).is_none() {
            self.drop_frame(DropReason::UnknownHandle(handle));
            return;
        }
        if payload.len() < 4 {
            self.drop_frame(DropReason::RuntFrame);
            return;
        }
        let peeked_nonce = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if peeked_nonce <= crate::wire::MAX_RESERVED_NONCE {
            self.drop_frame(DropReason::NonceWithHandle(peeked_nonce));
            return;
        }
        self.decrypt_and_forward(handle, forward_label, payload, now, false);
    }

    fn handle_handshake_frame(&mut self, forward_label: u64, payload: &[u8], now: u64) {
        if payload.len() < CRYPTO_HEADER_LEN {
            self.drop_frame(DropReason::ShortHandshakeFrame);
            return;
        }
        let crypto_header = CryptoHeader::parse(payload).expect("length checked above");
        let Some(peer_ip6) = derive_address(&crypto_header.public_key) else {
            self.drop_frame(DropReason::InvalidDerivedAddress);
            return;
        };
        if crypto_header.public_key == self.own_public_key() {
            self.drop_frame(DropReason::SelfHandshake);
            return;
        }

        let handle = self.get_or_create(
            peer_ip6,
            Some(crypto_header.public_key),
            crypto_header.handshake_version,
            forward_label,
            SM_INCOMING,
            false,
            now,
        );
        if let Some(session) = self.sessions.get_by_handle(handle) {
            session.ca.reset_if_timeout(now);
        }
        // The crypto header is only needed to look up/create the session; the Noise handshake
        // message itself starts right after it.
        self.decrypt_and_forward(handle, forward_label, &payload[CRYPTO_HEADER_LEN..], now, true);
    }

    fn decrypt_and_forward(
        &mut self,
        handle: u32,
        forward_label: u64,
        payload: &[u8],
        now: u64,
        was_handshake: bool,
    ) {
        let original_len = payload.len();
        let mut prefix = [0u8; 16];
        let copy_len = original_len.min(16);
        prefix[..copy_len].copy_from_slice(&payload[..copy_len]);

        let mut buf = BytesMut::from(payload);
        let decrypt_result = {
            let session = self
                .sessions
                .get_by_handle(handle)
                .expect("handle resolved by caller");
            session.ca.decrypt(&mut buf)
        };

        let session_state = self
            .sessions
            .get_by_handle(handle)
            .map(|s| s.ca.state() as u32)
            .unwrap_or(0);

        match decrypt_result {
            Err(err) => {
                self.send_authentication_error(forward_label, &prefix, err.wire_code(), session_state);
            }
            Ok(()) => {
                self.on_decrypt_success(handle, forward_label, buf, original_len, now, was_handshake);
            }
        }
    }

    fn send_authentication_error(
        &mut self,
        forward_label: u64,
        original_prefix: &[u8; 16],
        decrypt_error_code: u32,
        session_state: u32,
    ) {
        let envelope = ErrorEnvelope {
            original_prefix: *original_prefix,
            decrypt_error_code,
            session_state,
        };
        let mut body = BytesMut::new();
        body.put_u32(CONTROL_TYPE_ERROR);
        body.put_u32(CONTROL_SUBTYPE_AUTHENTICATION);
        body.put_u32(checksum(original_prefix, decrypt_error_code, session_state));
        envelope.write(&mut body);

        let mut out = BytesMut::new();
        let reply_header = SwitchHeader {
            label: bit_reverse(forward_label),
            control: SwitchControl::SUPPRESS_ERRORS,
        };
        reply_header.write(&mut out);
        out.put_u32(crate::wire::CONTROL_MARKER);
        out.put_slice(&body);
        self.switch_out.push(out.freeze());
    }

    fn on_decrypt_success(
        &mut self,
        handle: u32,
        forward_label: u64,
        mut decrypted: BytesMut,
        original_len: usize,
        now: u64,
        was_handshake: bool,
    ) {
        if was_handshake {
            if decrypted.len() < 4 {
                self.drop_frame(DropReason::ShortHandshakeFrame);
                return;
            }
            let peer_send_handle = decrypted.split_to(4);
            let peer_send_handle = u32::from_be_bytes([
                peer_send_handle[0],
                peer_send_handle[1],
                peer_send_handle[2],
                peer_send_handle[3],
            ]);
            if let Some(session) = self.sessions.get_by_handle(handle) {
                session.send_handle = peer_send_handle;
            }
        }

        let is_dht = crate::wire::DataHeader::parse(&decrypted)
            .map(|h| h.is_dht())
            .unwrap_or(false);

        let mut recv_label_changed = None;
        let route_header = {
            let session = self
                .sessions
                .get_by_handle(handle)
                .expect("handle resolved earlier");
            session.bytes_in += original_len as u64;
            session.time_of_keep_alive_in = now;
            if !is_dht {
                session.time_of_last_in = now;
            }
            if session.recv_switch_label != forward_label {
                session.recv_switch_label = forward_label;
                recv_label_changed = Some(());
            }
            RouteHeader {
                switch_label: forward_label,
                flags: RouteFlags::INCOMING,
                version: session.version,
                public_key: session.peer_public_key().unwrap_or(crate::address::PublicKey::ZERO),
                ip6: session.ip6,
            }
        };

        if recv_label_changed.is_some() {
            let node = {
                let session = self.sessions.get_by_handle(handle).expect("resolved above");
                crate::event::Node {
                    path: session.send_switch_label,
                    metric: session.metric,
                    version: session.version,
                    public_key: session.peer_public_key().unwrap_or(crate::address::PublicKey::ZERO),
                    ip6: session.ip6,
                }
            };
            self.bus_out.push(CoreEvent::DiscoveredPath {
                target_pathfinder: crate::event::BROADCAST_PATHFINDER,
                node,
            });
        }

        let mut out = BytesMut::new();
        route_header.write(&mut out);
        out.put_slice(&decrypted);
        self.inside_out.push(out.freeze());
    }
}

/// Internal checksum covering the error envelope fields. Not specified byte-exactly by the
/// source design ("recompute its internal checksum"); a simple additive checksum is used here
/// since only this implementation's own error frames ever need to parse it back. See DESIGN.md.
fn checksum(prefix: &[u8; 16], code: u32, state: u32) -> u32 {
    let mut acc: u32 = 0;
    for chunk in prefix.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        acc = acc.wrapping_add(u32::from_be_bytes(word));
    }
    acc.wrapping_add(code).wrapping_add(state)
}
