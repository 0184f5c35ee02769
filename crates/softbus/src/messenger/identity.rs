// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Opaque fixed-capacity device identifier.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Capacity of a [`DeviceIdentity`] in bytes.
pub const DEVICE_ID_MAX_LEN: usize = 64;

/// Peer device identifier: up to 64 bytes plus a logical length.
///
/// Equality compares the length and the bytes; a prefix never matches.
/// `Debug`/`Display` only ever show [`DeviceIdentity::mask_id`].
#[derive(Clone, Copy)]
pub struct DeviceIdentity {
    bytes: [u8; DEVICE_ID_MAX_LEN],
    len: usize,
}

impl DeviceIdentity {
    /// Identity whose logical length is exactly `bytes.len()`.
    ///
    /// Returns `None` for an empty or oversized slice.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > DEVICE_ID_MAX_LEN {
            return None;
        }
        let mut identity = Self {
            bytes: [0; DEVICE_ID_MAX_LEN],
            len: bytes.len(),
        };
        identity.bytes[..bytes.len()].copy_from_slice(bytes);
        Some(identity)
    }

    /// Identity derived from a topology UDID.
    ///
    /// The UDID is truncated to 64 bytes and zero padded; the logical length
    /// is always the full capacity, so every UDID-derived identity compares
    /// consistently. Returns `None` for an empty UDID.
    pub fn from_udid(udid: &str) -> Option<Self> {
        let raw = udid.as_bytes();
        if raw.first().map_or(true, |b| *b == 0) {
            return None;
        }
        let mut identity = Self {
            bytes: [0; DEVICE_ID_MAX_LEN],
            len: DEVICE_ID_MAX_LEN,
        };
        let n = raw.len().min(DEVICE_ID_MAX_LEN);
        identity.bytes[..n].copy_from_slice(&raw[..n]);
        Some(identity)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 32-bit tag safe to log in place of the identity.
    pub fn mask_id(&self) -> u32 {
        let mut head = [0u8; 4];
        let n = self.len.min(4);
        head[..n].copy_from_slice(&self.bytes[..n]);
        u32::from_be_bytes(head)
    }
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for DeviceIdentity {}

impl Hash for DeviceIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len.hash(state);
        self.as_bytes().hash(state);
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceIdentity({:08x}***, len={})", self.mask_id(), self.len)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}***", self.mask_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_not_equal() {
        let long = DeviceIdentity::from_bytes(b"device-1234").expect("long");
        let short = DeviceIdentity::from_bytes(b"device-12").expect("short");
        assert_ne!(long, short);
        assert_eq!(long, DeviceIdentity::from_bytes(b"device-1234").expect("copy"));
    }

    #[test]
    fn test_udid_identity_is_full_length() {
        let id = DeviceIdentity::from_udid("abcdef").expect("udid");
        assert_eq!(id.len(), DEVICE_ID_MAX_LEN);
        assert_eq!(&id.as_bytes()[..6], b"abcdef");
        assert!(id.as_bytes()[6..].iter().all(|b| *b == 0));
        assert_ne!(id, DeviceIdentity::from_bytes(b"abcdef").expect("bytes"));

        let long = "x".repeat(100);
        assert_eq!(
            DeviceIdentity::from_udid(&long).expect("truncated").len(),
            DEVICE_ID_MAX_LEN
        );
        assert!(DeviceIdentity::from_udid("").is_none());
    }

    #[test]
    fn test_bounds() {
        assert!(DeviceIdentity::from_bytes(&[]).is_none());
        assert!(DeviceIdentity::from_bytes(&[1; DEVICE_ID_MAX_LEN + 1]).is_none());
        assert!(DeviceIdentity::from_bytes(&[1; DEVICE_ID_MAX_LEN]).is_some());
    }

    #[test]
    fn test_mask_hides_identity() {
        let id = DeviceIdentity::from_bytes(&[0xde, 0xad, 0xbe, 0xef, 1, 2, 3]).expect("id");
        assert_eq!(id.mask_id(), 0xdead_beef);
        assert_eq!(id.to_string(), "deadbeef***");
        assert!(!format!("{:?}", id).contains("010203"));

        let short = DeviceIdentity::from_bytes(&[0xab]).expect("short");
        assert_eq!(short.mask_id(), 0xab00_0000);
    }
}
