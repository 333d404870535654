//! Error taxonomy (§7). Categories 1/2/4 collapse into [`DropReason`], a value that is always
//! logged and never answered on the wire. Category 3 (decryption failure) is a [`CryptoError`]
//! surfaced to the caller of the encrypt/decrypt path, which turns it into a wire reply.
//! Category 5 (invariant violation) is not a value at all: it is a `panic!`/`assert!`, the same
//! way the teacher uses `debug_assert!` for states that indicate corrupted memory rather than a
//! recoverable protocol error.

use thiserror::Error;

use crate::address::Address;

/// Why an inbound or outbound frame was silently dropped. Every variant is logged once at the
/// point of decision and never produces a wire reply.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    #[error("frame shorter than the minimum switch header + nonce/handle")]
    RuntFrame,

    #[error("setup nonce ({0}) appeared alongside an allocated handle")]
    NonceWithHandle(u32),

    #[error("handshake frame shorter than switch header + nonce + crypto header")]
    ShortHandshakeFrame,

    #[error("crypto header public key does not derive a valid mesh address")]
    InvalidDerivedAddress,

    #[error("handshake frame claims the public key of this node (loopback attack)")]
    SelfHandshake,

    #[error("no session registered for handle {0}")]
    UnknownHandle(u32),

    #[error("route header requests CTRLMSG but carries a non-zero key or address")]
    BadCtrlmsgFlags,

    #[error("outbound frame to {0} has no route, version, or key yet")]
    NoRouteVersionOrKey(Address),

    #[error("buffered-message store is full and no entry could be evicted")]
    BufferStoreFull,

    #[error("route header shorter than the minimum size")]
    ShortRouteHeader,

    #[error("data header missing from inside-interface frame")]
    MissingDataHeader,
}

/// Surfaced by the `CryptoAuthSession` boundary on a failed decrypt (§7 category 3) or an
/// attempt to encrypt/decrypt in an invalid state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("authentication failed decrypting inbound frame (code {0})")]
    Authentication(u32),
    #[error("handshake message was malformed or out of sequence")]
    HandshakeFailed,
    #[error("encrypt attempted before handshake produced a transport key")]
    NotReady,
}

impl CryptoError {
    /// The numeric code carried in the failed-decrypt error envelope (§4.2 step 5).
    pub fn wire_code(&self) -> u32 {
        match self {
            CryptoError::Authentication(code) => *code,
            CryptoError::HandshakeFailed => 1,
            CryptoError::NotReady => 2,
        }
    }
}

/// Errors constructing a `SessionManager` or validating its configuration.
#[derive(Debug, Error)]
pub enum SessionManagerError {
    #[error("own public key does not derive a valid mesh address: generate a new keypair")]
    InvalidOwnAddress,
    #[error("max_buffered_messages must be nonzero")]
    ZeroBufferCapacity,
}
