//! Session manager for a mesh-overlay networking stack.
//!
//! Maintains one `Session` per peer reachable through this node: a self-certifying address
//! derived from a Curve25519 public key, a crypto-authenticated channel to that peer, and the
//! switch-fabric routing state needed to reach it. Frames arrive on two interfaces (the routing
//! switch and the local "inside" network stack) and are handled synchronously, with a third
//! interface to a pathfinder process for route discovery, plus periodic housekeeping.
//!
//! The manager itself never performs I/O: callers push frames in through [`SessionManager`]'s
//! handler methods and drain the outbound queues (`take_switch_out`, `take_inside_out`,
//! `take_bus_out`) after each call, the same `Io`/`Event`-queue shape the teacher crate uses for
//! its own synchronous, non-blocking core.

mod address;
mod admin;
mod buffer;
mod config;
mod crypto_auth;
mod error;
mod event;
mod event_bus;
mod housekeeper;
mod index;
mod inside_ingress;
mod manager;
mod session;
mod switch_ingress;
mod wire;

pub use address::{derive_address, Address, PublicKey, ADDRESS_PREFIX};
pub use admin::{format_admin_address, SessionStats};
pub use config::SessionManagerConfig;
pub use crypto_auth::{CryptoAuthSession, CryptoStats, HandshakeState};
pub use error::{CryptoError, DropReason, SessionManagerError};
pub use event::{CoreEvent, Node, PathfinderEvent, BROADCAST_PATHFINDER, NODE_LEN};
pub use inside_ingress::OWN_PROTOCOL_VERSION;
pub use manager::SessionManager;
pub use wire::{
    bit_reverse, ControlSubtype, CryptoHeader, DataHeader, ErrorEnvelope, Label, RouteFlags,
    RouteHeader, SwitchControl, SwitchHeader, CONTENT_TYPE_DHT, CRYPTO_HEADER_LEN,
    DATA_HEADER_LEN, ERROR_ENVELOPE_LEN, ROUTE_HEADER_LEN, SWITCH_HEADER_LEN,
};
