//! LE-specific types.

use std::fmt::{Debug, Display, Formatter};

/// Bluetooth device address ([Vol 6] Part B, Section 1.3).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Addr {
    Public(RawAddr),
    Random(RawAddr),
}

crate::impl_display_via_debug! { Addr }

impl Addr {
    /// Constructs a peer address from type and raw components.
    #[inline]
    #[must_use]
    pub const fn peer(typ: u8, raw: RawAddr) -> Self {
        // [Vol 4] Part E, Section 7.7.65.1
        match typ {
            // Random Device Address or Random (Static) Identity Address
            0x01 | 0x03 => Self::Random(raw),
            // Public Device Address or Public Identity Address
            _ => Self::Public(raw),
        }
    }

    /// Returns the raw 48-bit address.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> RawAddr {
        match self {
            Self::Public(addr) | Self::Random(addr) => addr,
        }
    }

    /// Returns the address type code used in HCI commands and SMP PDUs.
    #[inline]
    #[must_use]
    pub const fn typ(self) -> u8 {
        match self {
            Self::Public(_) => 0x00,
            Self::Random(_) => 0x01,
        }
    }
}

impl Default for Addr {
    #[inline]
    fn default() -> Self {
        Self::Public(RawAddr::default())
    }
}

/// 48-bit untyped device address stored in little-endian byte order.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct RawAddr([u8; 6]);

impl RawAddr {
    /// Returns the address as little-endian bytes.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for RawAddr {
    #[inline]
    fn from(v: [u8; 6]) -> Self {
        Self(v)
    }
}

impl AsRef<[u8]> for RawAddr {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Debug for RawAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // [Vol 3] Part C, Section 3.2.1.3
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

impl Display for RawAddr {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_display() {
        let a = RawAddr::from([0x01, 0x00, 0x00, 0x9B, 0x1A, 0x00]);
        assert_eq!(a.to_string(), "00:1A:9B:00:00:01");
    }

    #[test]
    fn addr_typ() {
        let raw = RawAddr::from([1, 2, 3, 4, 5, 6]);
        assert_eq!(Addr::peer(0x00, raw).typ(), 0x00);
        assert_eq!(Addr::peer(0x01, raw).typ(), 0x01);
        assert_eq!(Addr::peer(0x03, raw), Addr::Random(raw));
    }
}
