// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Capability names and bitmaps.

use crate::error::DiscoveryError;
use std::fmt;

/// Number of capability bits tracked by the discovery manager.
pub const CAPABILITY_MAX_BITNUM: u32 = 16;

/// Static capability-name table: `(name, bit)`.
pub const CAPABILITY_MAP: &[(&str, u32)] = &[
    ("hicall", 0),
    ("profile", 1),
    ("homevisionPic", 2),
    ("castPlus", 3),
    ("aaCapability", 4),
    ("dvKit", 5),
    ("ddmpCapability", 6),
    ("osdCapability", 7),
];

/// Resolve a capability string to its bit position.
pub fn capability_bit(name: &str) -> Result<u32, DiscoveryError> {
    CAPABILITY_MAP
        .iter()
        .find(|(cap, _)| *cap == name)
        .map(|(_, bit)| *bit)
        .ok_or_else(|| DiscoveryError::CapabilityInvalid(name.to_string()))
}

/// Capability name for a bit, if the table defines one.
pub fn capability_name(bit: u32) -> Option<&'static str> {
    CAPABILITY_MAP
        .iter()
        .find(|(_, b)| *b == bit)
        .map(|(name, _)| *name)
}

/// Fixed-width capability bit vector.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilityBitmap(u32);

impl CapabilityBitmap {
    pub const EMPTY: Self = Self(0);

    /// Bitmap with only the given bits set; bits past the maximum are ignored.
    pub fn from_bits(bits: &[u32]) -> Self {
        let mut bitmap = Self::EMPTY;
        for &bit in bits {
            bitmap.set(bit);
        }
        bitmap
    }

    /// Resolve every capability name; any unknown name rejects the whole set.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, DiscoveryError> {
        let mut bitmap = Self::EMPTY;
        for name in names {
            bitmap.set(capability_bit(name.as_ref())?);
        }
        Ok(bitmap)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn set(&mut self, bit: u32) {
        if bit < CAPABILITY_MAX_BITNUM {
            self.0 |= 1 << bit;
        }
    }

    pub fn is_set(self, bit: u32) -> bool {
        bit < CAPABILITY_MAX_BITNUM && self.0 & (1 << bit) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set bit positions in ascending order.
    pub fn bits(self) -> impl Iterator<Item = u32> {
        (0..CAPABILITY_MAX_BITNUM).filter(move |&bit| self.is_set(bit))
    }
}

impl From<u32> for CapabilityBitmap {
    fn from(raw: u32) -> Self {
        Self(raw & ((1 << CAPABILITY_MAX_BITNUM) - 1))
    }
}

impl fmt::Debug for CapabilityBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityBitmap({:#06x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_names() {
        assert_eq!(capability_bit("hicall"), Ok(0));
        assert_eq!(capability_bit("ddmpCapability"), Ok(6));
        assert_eq!(capability_name(3), Some("castPlus"));
        assert_eq!(capability_name(12), None);
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert_eq!(
            capability_bit("warpDrive"),
            Err(DiscoveryError::CapabilityInvalid("warpDrive".into()))
        );
        assert!(CapabilityBitmap::from_names(&["hicall", "warpDrive"]).is_err());
    }

    #[test]
    fn test_bitmap_ops() {
        let bitmap = CapabilityBitmap::from_names(&["hicall", "homevisionPic"]).expect("names");
        assert_eq!(bitmap.raw(), 0b101);
        assert!(bitmap.is_set(0));
        assert!(!bitmap.is_set(1));
        assert_eq!(bitmap.bits().collect::<Vec<_>>(), vec![0, 2]);

        let mut bitmap = CapabilityBitmap::EMPTY;
        bitmap.set(CAPABILITY_MAX_BITNUM);
        assert!(bitmap.is_empty());
        assert_eq!(CapabilityBitmap::from(u32::MAX).bits().count(), 16);
    }
}
