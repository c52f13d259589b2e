//! `WireGuard` key material as reported by the live interface.
//!
//! Keys are kept in their base64 text form because that is how `wg` prints
//! them and how they are persisted. Secret keys compare in constant time and
//! never appear in `Debug` output.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// `WireGuard` key size in bytes (256-bit Curve25519 keys).
pub const KEY_SIZE: usize = 32;

fn decode_key(s: &str) -> Option<[u8; KEY_SIZE]> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(s).ok()?;
    <[u8; KEY_SIZE]>::try_from(bytes.as_slice()).ok()
}

/// A public key in base64 text form.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    /// Wraps a base64 key string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the base64 text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the text decodes to a 32-byte key.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        decode_key(&self.0).is_some()
    }

    /// Decodes the raw key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Option<[u8; KEY_SIZE]> {
        decode_key(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "PublicKey({short}...)")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PublicKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A private or pre-shared key in base64 text form.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    /// Wraps a base64 key string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the base64 text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the text decodes to a 32-byte key.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        decode_key(&self.0).is_some()
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && bool::from(self.0.as_bytes().ct_eq(other.0.as_bytes()))
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";

    #[test]
    fn well_formed_key() {
        assert!(PublicKey::new(KEY).is_well_formed());
        assert!(SecretKey::new(KEY).is_well_formed());
        assert_eq!(PublicKey::new(KEY).to_bytes().map(|b| b.len()), Some(KEY_SIZE));
    }

    #[test]
    fn placeholder_key_is_not_well_formed() {
        assert!(!PublicKey::new("PUBKEY").is_well_formed());
        assert!(!SecretKey::new("dG9vIHNob3J0").is_well_formed());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let debug = format!("{:?}", SecretKey::new(KEY));
        assert!(!debug.contains("yAnz"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn public_debug_is_shortened() {
        assert_eq!(format!("{:?}", PublicKey::new(KEY)), "PublicKey(yAnz5TF+...)");
        assert_eq!(format!("{:?}", PublicKey::new("abc")), "PublicKey(abc...)");
    }

    #[test]
    fn secret_equality() {
        assert_eq!(SecretKey::new(KEY), SecretKey::new(KEY));
        assert_ne!(SecretKey::new(KEY), SecretKey::new("other"));
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&PublicKey::new(KEY)).expect("serialize");
        assert_eq!(json, format!("\"{KEY}\""));
        let back: SecretKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.expose(), KEY);
    }
}
