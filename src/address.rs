//! Self-certifying addresses: 16-byte IPv6 addresses derived from a 32-byte public key.

use std::fmt;

use sha2::{Digest, Sha512};

/// First byte every valid address in this mesh must carry.
pub const ADDRESS_PREFIX: u8 = 0xFC;

/// A 16-byte overlay address. Only `is_valid` addresses (first byte `0xFC`) ever appear as
/// keys in the session index; everything else is rejected at the edges.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 16]);

impl Address {
    pub const ZERO: Address = Address([0u8; 16]);

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0[0] == ADDRESS_PREFIX
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 && i % 2 == 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A peer's Curve25519 public key, 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub const ZERO: PublicKey = PublicKey([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..)")
    }
}

/// Derives the self-certifying address for `key` by double-hashing it with SHA-512 and taking
/// the leading 16 bytes of the second digest, as cjdns-style meshes do. Returns `None` when the
/// resulting address does not carry the required [`ADDRESS_PREFIX`] — most keys are rejected
/// this way, which is expected; only keys whose derived address happens to start with `0xFC`
/// are usable on this mesh.
pub fn derive_address(key: &PublicKey) -> Option<Address> {
    let first = Sha512::digest(key.as_bytes());
    let second = Sha512::digest(first);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&second[..16]);
    let addr = Address(bytes);
    if addr.is_valid() {
        Some(addr)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) fn find_keypair_for_test() -> (x25519_dalek::StaticSecret, PublicKey, Address) {
    use rand::rngs::OsRng;
    loop {
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let public = x25519_dalek::PublicKey::from(&secret);
        let pk = PublicKey(*public.as_bytes());
        if let Some(addr) = derive_address(&pk) {
            return (secret, pk, addr);
        }
    }
}
