//! Cryptographic toolbox for LE legacy pairing
//! ([Vol 3] Part H, Section 2.2).
//!
//! All 128-bit values are kept in little-endian byte order, matching how
//! they appear in Security Manager PDUs. The security function `e` reverses
//! key and plaintext into the big-endian convention of the AES primitive and
//! reverses the ciphertext back.

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(unused_crate_dependencies)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::cargo)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::undocumented_unsafe_blocks)]

use std::fmt::{Debug, Formatter};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroize;

/// 128-bit secret key in little-endian byte order. Also represents the
/// Short Term Key produced by [`Key::s1`].
#[derive(Clone, Default, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
#[must_use]
#[repr(transparent)]
pub struct Key([u8; 16]);

impl Key {
    /// Creates a key from little-endian bytes.
    #[inline(always)]
    pub const fn from_le_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    /// Returns the key as little-endian bytes.
    #[inline(always)]
    #[must_use]
    pub const fn to_le_bytes(&self) -> [u8; 16] {
        self.0
    }

    /// Generates the legacy pairing confirm value
    /// ([Vol 3] Part H, Section 2.2.3).
    ///
    /// `preq` and `pres` are the Pairing Request and Pairing Response PDUs
    /// in transmission order, code byte first. `ia` and `ra` are the
    /// initiating and responding device addresses in little-endian byte
    /// order, with their address type codes `iat` and `rat`.
    #[allow(clippy::many_single_char_names, clippy::too_many_arguments)]
    pub fn c1(
        &self,
        r: &Nonce,
        preq: &[u8; 7],
        pres: &[u8; 7],
        iat: u8,
        ia: &[u8; 6],
        rat: u8,
        ra: &[u8; 6],
    ) -> Confirm {
        let mut p1 = [0; 16];
        p1[0] = iat;
        p1[1] = rat;
        p1[2..9].copy_from_slice(preq);
        p1[9..16].copy_from_slice(pres);
        let mut p2 = [0; 16];
        p2[..6].copy_from_slice(ra);
        p2[6..12].copy_from_slice(ia);
        let v = self.e(xor(self.e(xor(r.0, p1)), p2));
        p1.zeroize();
        Confirm(v)
    }

    /// Generates the Short Term Key from the pairing random values
    /// ([Vol 3] Part H, Section 2.2.4). `r1` is the responder contribution
    /// and `r2` the initiator one; the least significant 8 octets of each
    /// are concatenated and encrypted.
    pub fn s1(&self, r1: &Nonce, r2: &Nonce) -> Self {
        let mut r = [0; 16];
        r[..8].copy_from_slice(&r2.0[..8]);
        r[8..].copy_from_slice(&r1.0[..8]);
        Self(self.e(r))
    }

    /// Security function `e` ([Vol 3] Part H, Section 2.2.1).
    fn e(&self, d: [u8; 16]) -> [u8; 16] {
        let mut k = self.0;
        k.reverse();
        let aes = Aes128::new(GenericArray::from_slice(&k));
        k.zeroize();
        let mut b = d;
        b.reverse();
        aes.encrypt_block(GenericArray::from_mut_slice(&mut b));
        b.reverse();
        b
    }
}

impl Debug for Key {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Key").field(&"<secret key>").finish()
    }
}

/// 128-bit random value in little-endian byte order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[must_use]
#[repr(transparent)]
pub struct Nonce([u8; 16]);

impl Nonce {
    /// Obtains a new random nonce value from the OS CSPRNG.
    #[inline]
    pub fn new() -> Self {
        let mut b = [0; 16];
        getrandom::getrandom(b.as_mut_slice()).expect("OS CSPRNG error");
        Self(b)
    }

    /// Creates a nonce from little-endian bytes.
    #[inline(always)]
    pub const fn from_le_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    /// Returns the nonce as little-endian bytes.
    #[inline(always)]
    #[must_use]
    pub const fn to_le_bytes(&self) -> [u8; 16] {
        self.0
    }
}

/// 128-bit pairing confirm value with constant-time comparison.
#[derive(Clone, Copy, Debug, Default, Eq)]
#[must_use]
#[repr(transparent)]
pub struct Confirm([u8; 16]);

impl Confirm {
    /// Creates a confirm value from little-endian bytes.
    #[inline(always)]
    pub const fn from_le_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    /// Returns the confirm value as little-endian bytes.
    #[inline(always)]
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 16] {
        self.0
    }
}

impl ConstantTimeEq for Confirm {
    #[inline(always)]
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.ct_eq(&other.0)
    }
}

impl PartialEq for Confirm {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.ct_eq(other))
    }
}

#[inline]
fn xor(mut a: [u8; 16], b: [u8; 16]) -> [u8; 16] {
    for (a, b) in a.iter_mut().zip(b.iter()) {
        *a ^= b;
    }
    a
}
