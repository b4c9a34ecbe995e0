//! Generic Access Profile ([Vol 3] Part C).

pub use {adv::*, gap::*, uuid::*};

mod adv;
#[allow(clippy::module_inception)]
mod gap;
mod uuid;

use crate::hci;

/// Error type returned by the GAP layer.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("advertisement data is over maximum limit of 31 bytes ({0} bytes)")]
    AdvDataTooLong(usize),
    #[error("scan response data is over maximum limit of 31 bytes ({0} bytes)")]
    ScanDataTooLong(usize),
    #[error(transparent)]
    Hci(#[from] hci::Error),
}

/// Common GAP result type.
pub type Result<T> = std::result::Result<T, Error>;
