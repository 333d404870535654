//! C6 wire types: the event-bus frame format and the small state protocol with the pathfinder
//! (§4.6, §6, §9 "please respond" pattern).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::address::{Address, PublicKey};

/// `0xFFFFFFFF` as a destination pathfinder id means "broadcast to all".
pub const BROADCAST_PATHFINDER: u32 = 0xFFFF_FFFF;

/// The 64-byte `Node` record carried as payload by most events (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    pub path: u64,
    pub metric: u32,
    pub version: u32,
    pub public_key: PublicKey,
    pub ip6: Address,
}

pub const NODE_LEN: usize = 8 + 4 + 4 + 32 + 16;

impl Node {
    pub fn write(&self, out: &mut BytesMut) {
        out.put_u64(self.path);
        out.put_u32(self.metric);
        out.put_u32(self.version);
        out.put_slice(self.public_key.as_bytes());
        out.put_slice(self.ip6.as_bytes());
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < NODE_LEN {
            return None;
        }
        let mut cursor = buf;
        let path = cursor.get_u64();
        let metric = cursor.get_u32();
        let version = cursor.get_u32();
        let mut pk = [0u8; 32];
        cursor.copy_to_slice(&mut pk);
        let mut ip = [0u8; 16];
        cursor.copy_to_slice(&mut ip);
        Some(Node {
            path,
            metric,
            version,
            public_key: PublicKey(pk),
            ip6: Address(ip),
        })
    }
}

/// Events consumed from the pathfinder (§4.6, §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathfinderEvent {
    /// Request to re-emit all known sessions as `SESSION` events, targeted back at
    /// `source_pathfinder` (the "please respond" correlation field, §9).
    Sessions { source_pathfinder: u32 },
    /// A route/node discovery result.
    Node {
        source_pathfinder: u32,
        node: Node,
    },
}

/// Events this crate emits onto the bus (§4.6, §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreEvent {
    Session {
        target_pathfinder: u32,
        node: Node,
    },
    SessionEnded {
        target_pathfinder: u32,
        node: Node,
    },
    DiscoveredPath {
        target_pathfinder: u32,
        node: Node,
    },
    UnsetupSession {
        target_pathfinder: u32,
        node: Node,
    },
    SearchReq {
        target_pathfinder: u32,
        ip6: Address,
        version: u32,
    },
}

const EVENT_TAG_SESSION: u32 = 1;
const EVENT_TAG_SESSION_ENDED: u32 = 2;
const EVENT_TAG_DISCOVERED_PATH: u32 = 3;
const EVENT_TAG_UNSETUP_SESSION: u32 = 4;
const EVENT_TAG_SEARCH_REQ: u32 = 5;

const PATHFINDER_TAG_SESSIONS: u32 = 100;
const PATHFINDER_TAG_NODE: u32 = 101;

impl CoreEvent {
    pub fn target_pathfinder(&self) -> u32 {
        match self {
            CoreEvent::Session {
                target_pathfinder, ..
            }
            | CoreEvent::SessionEnded {
                target_pathfinder, ..
            }
            | CoreEvent::DiscoveredPath {
                target_pathfinder, ..
            }
            | CoreEvent::UnsetupSession {
                target_pathfinder, ..
            }
            | CoreEvent::SearchReq {
                target_pathfinder, ..
            } => *target_pathfinder,
        }
    }

    /// Encodes `{event-tag: u32 be, destination-pathfinder: u32 be, payload}` (§6).
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        match self {
            CoreEvent::Session {
                target_pathfinder,
                node,
            } => {
                out.put_u32(EVENT_TAG_SESSION);
                out.put_u32(*target_pathfinder);
                node.write(&mut out);
            }
            CoreEvent::SessionEnded {
                target_pathfinder,
                node,
            } => {
                out.put_u32(EVENT_TAG_SESSION_ENDED);
                out.put_u32(*target_pathfinder);
                node.write(&mut out);
            }
            CoreEvent::DiscoveredPath {
                target_pathfinder,
                node,
            } => {
                out.put_u32(EVENT_TAG_DISCOVERED_PATH);
                out.put_u32(*target_pathfinder);
                node.write(&mut out);
            }
            CoreEvent::UnsetupSession {
                target_pathfinder,
                node,
            } => {
                out.put_u32(EVENT_TAG_UNSETUP_SESSION);
                out.put_u32(*target_pathfinder);
                node.write(&mut out);
            }
            CoreEvent::SearchReq {
                target_pathfinder,
                ip6,
                version,
            } => {
                out.put_u32(EVENT_TAG_SEARCH_REQ);
                out.put_u32(*target_pathfinder);
                out.put_slice(ip6.as_bytes());
                out.put_u32(*version);
                out.put_u32(0); // zero placeholder word, per §6
            }
        }
        out.freeze()
    }
}

impl PathfinderEvent {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < 8 {
            return None;
        }
        let mut cursor = buf;
        let tag = cursor.get_u32();
        let source_pathfinder = cursor.get_u32();
        match tag {
            PATHFINDER_TAG_SESSIONS => Some(PathfinderEvent::Sessions { source_pathfinder }),
            PATHFINDER_TAG_NODE => {
                let node = Node::parse(cursor)?;
                Some(PathfinderEvent::Node {
                    source_pathfinder,
                    node,
                })
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        match self {
            PathfinderEvent::Sessions { source_pathfinder } => {
                out.put_u32(PATHFINDER_TAG_SESSIONS);
                out.put_u32(*source_pathfinder);
            }
            PathfinderEvent::Node {
                source_pathfinder,
                node,
            } => {
                out.put_u32(PATHFINDER_TAG_NODE);
                out.put_u32(*source_pathfinder);
                node.write(&mut out);
            }
        }
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_round_trips() {
        let node = Node {
            path: 7,
            metric: 9,
            version: 20,
            public_key: PublicKey([1u8; 32]),
            ip6: Address([0xFC; 16]),
        };
        let mut buf = BytesMut::new();
        node.write(&mut buf);
        assert_eq!(buf.len(), NODE_LEN);
        assert_eq!(Node::parse(&buf), Some(node));
    }

    #[test]
    fn pathfinder_event_round_trips() {
        let node = Node {
            path: 1,
            metric: 2,
            version: 3,
            public_key: PublicKey([4u8; 32]),
            ip6: Address([0xFC; 16]),
        };
        let ev = PathfinderEvent::Node {
            source_pathfinder: 42,
            node,
        };
        let encoded = ev.encode();
        assert_eq!(PathfinderEvent::parse(&encoded), Some(ev));
    }
}
