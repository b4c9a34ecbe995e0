//! Security Manager implementation ([Vol 3] Part H).
//!
//! Only the responder role of LE legacy pairing is implemented, with a fixed
//! Just Works policy: NoInputNoOutput capabilities, all-zero temporary key,
//! and bonding without man-in-the-middle protection. The derived Short-Term
//! Key is handed to an external [`KeyStore`], which answers the controller's
//! key requests when the initiator enables encryption.

use std::sync::Arc;

use structbuf::{Pack, StructBuf, Unpack};
use tracing::{debug, warn};

use bluelet_crypto::{Confirm, Key, Nonce};

pub use {consts::*, smp::*};

use crate::acl::{AclTx, Cid};
use crate::host::{self, Transport};
use crate::le::Addr;

mod consts;
#[allow(clippy::module_inception)]
mod smp;
#[cfg(test)]
mod tests;

/// Error type returned by Security Manager operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Pairing was aborted by this device.
    #[error("pairing failed locally ({0})")]
    Local(Reason),
    /// Pairing was aborted by the peer.
    #[error("pairing failed by peer ({0})")]
    Remote(Reason),
    #[error(transparent)]
    Host(#[from] host::Error),
}

/// Common Security Manager result type.
pub type Result<T> = std::result::Result<T, Error>;

/// External store for keys derived during pairing. The stack keeps no key
/// material of its own across connections.
pub trait KeyStore: std::fmt::Debug + Send + Sync {
    /// Registers the encryption key for the connection with `peer`, along
    /// with the EDIV and Rand values identifying it.
    fn add_long_term_key(&self, peer: Addr, key: Key, ediv: u16, rand: [u8; 8]);
}
