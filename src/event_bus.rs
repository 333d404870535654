//! C6: the event-bus endpoint talking to a pathfinder (§4.6, §9 "please respond" pattern).

use bytes::BytesMut;

use crate::event::{CoreEvent, Node, PathfinderEvent, BROADCAST_PATHFINDER};
use crate::manager::{node_for, SessionManager};
use crate::session::DEAD_LINK;
use crate::wire::{RouteFlags, RouteHeader, ROUTE_HEADER_LEN};

impl SessionManager {
    /// Handles one event consumed from the pathfinder (§4.6).
    pub fn handle_pathfinder_event(&mut self, event: PathfinderEvent, now: u64) {
        match event {
            PathfinderEvent::Sessions { source_pathfinder } => {
                self.reply_all_sessions(source_pathfinder)
            }
            PathfinderEvent::Node {
                source_pathfinder: _,
                node,
            } => self.handle_node_report(node, now),
        }
    }

    /// (§4.6 "please respond"): re-emits every live session as a `SESSION` event targeted back at
    /// whichever pathfinder asked, rather than broadcasting.
    fn reply_all_sessions(&mut self, source_pathfinder: u32) {
        let events: Vec<CoreEvent> = self
            .sessions
            .iter()
            .map(|(_, session)| CoreEvent::Session {
                target_pathfinder: source_pathfinder,
                node: node_for(session),
            })
            .collect();
        self.bus_out.extend(events);
    }

    /// A route/node report from the pathfinder (§4.6). Ignored unless this node either already
    /// has a session with that peer or has a message buffered for it — an unsolicited report
    /// about an address nobody asked about is not acted on. A `DEAD_LINK` report with no existing
    /// session is likewise ignored: there is nothing here to mark dead.
    fn handle_node_report(&mut self, node: Node, now: u64) {
        let has_session = self.sessions.get_by_ip6_ref(&node.ip6).is_some();
        let has_buffer = self.buffers.contains(&node.ip6);
        if !has_session && !has_buffer {
            return;
        }
        if node.metric == DEAD_LINK && !has_session {
            return;
        }

        let pub_key = if node.public_key.is_zero() {
            None
        } else {
            Some(node.public_key)
        };
        let handle = self.get_or_create(
            node.ip6,
            pub_key,
            node.version,
            node.path,
            node.metric,
            false,
            now,
        );

        if self.session_ready(&node.ip6) {
            if let Some(buffered) = self.buffers.take(&node.ip6) {
                let route_header = RouteHeader {
                    switch_label: node.path,
                    flags: RouteFlags::empty(),
                    version: node.version,
                    public_key: node.public_key,
                    ip6: node.ip6,
                };
                // `buffered.payload` is the whole inside frame handed to `buffer_and_search`,
                // route header included; strip it the same way fresh inside frames are stripped
                // before reaching `encrypt_path`.
                let body = buffered.payload.slice(ROUTE_HEADER_LEN..);
                self.encrypt_path(handle, &route_header, BytesMut::from(&body[..]), now);
            }
            return;
        }

        let unsetup_node = {
            let session = self
                .sessions
                .get_by_handle(handle)
                .expect("get_or_create just resolved this handle");
            node_for(session)
        };
        self.bus_out.push(CoreEvent::UnsetupSession {
            target_pathfinder: BROADCAST_PATHFINDER,
            node: unsetup_node,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{find_keypair_for_test, PublicKey};
    use crate::config::SessionManagerConfig;
    use bytes::Bytes;
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
    fn node_report_with_no_session_or_buffer_is_ignored() {
        let mut mgr = manager();
        let (_secret, _pk, addr) = find_keypair_for_test();
        mgr.handle_pathfinder_event(
            PathfinderEvent::Node {
                source_pathfinder: 1,
                node: Node {
                    path: 1,
                    metric: 10,
                    version: 1,
                    public_key: PublicKey::ZERO,
                    ip6: addr,
                },
            },
            0,
        );
        assert_eq!(mgr.sessions.len(), 0);
    }

    #[test]
    fn node_report_for_buffered_destination_creates_session_and_emits_unsetup() {
        let mut mgr = manager();
        let (_secret, pk, addr) = find_keypair_for_test();
        mgr.buffers
            .submit(addr, Bytes::from_static(b"hello"), 0)
            .unwrap();

        mgr.handle_pathfinder_event(
            PathfinderEvent::Node {
                source_pathfinder: 1,
                node: Node {
                    path: 0xAB,
                    metric: 10,
                    version: 1,
                    public_key: pk,
                    ip6: addr,
                },
            },
            0,
        );

        assert_eq!(mgr.sessions.len(), 1);
        let events = mgr.take_bus_out();
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::UnsetupSession { .. })));
        // Not yet handshaken, so the buffered message stays put rather than being flushed.
        assert!(mgr.buffers.contains(&addr));
    }

    #[test]
    fn sessions_request_replies_targeted_at_requester() {
        let mut mgr = manager();
        let (_secret, pk, addr) = find_keypair_for_test();
        mgr.get_or_create(addr, Some(pk), 1, 0xAB, 10, true, 0);
        mgr.take_bus_out();

        mgr.handle_pathfinder_event(
            PathfinderEvent::Sessions {
                source_pathfinder: 42,
            },
            0,
        );
        let events = mgr.take_bus_out();
        assert_eq!(events.len(), 1);
        match events[0] {
            CoreEvent::Session {
                target_pathfinder,
                node,
            } => {
                assert_eq!(target_pathfinder, 42);
                assert_eq!(node.ip6, addr);
            }
            _ => panic!("expected a SESSION event"),
        }
    }
}
