//! Host Controller Interface ([Vol 4] Part E).

use crate::host;

pub use {consts::*, hci::*};

mod consts;
mod hci;

#[cfg(test)]
mod tests;

/// Error type returned by the HCI layer.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Host(#[from] host::Error),
    #[error("invalid event packet: {0:02X?}")]
    InvalidEvent(Vec<u8>),
    #[error("invalid ACL data packet: {0:02X?}")]
    InvalidAcl(Vec<u8>),
}

/// Common HCI result type.
pub type Result<T> = std::result::Result<T, Error>;
