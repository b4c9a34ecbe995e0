//! Host transport layer ([Vol 4] Part A).

use std::fmt::Debug;

/// Local host errors.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Raw HCI access was denied by the OS.
    #[error("operation not permitted")]
    NotPermitted,
    /// The controller interface is down.
    #[error("network is down")]
    NetworkDown,
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Io(String),
}

/// Common host result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Writable HCI channel provided by the embedder.
///
/// The stack never opens the channel itself and never reads from it; inbound
/// packets are fed back through [`crate::ble::Peripheral::on_data`]. Methods
/// take `&self` so that the transport can be shared behind an [`std::sync::Arc`]
/// by the per-connection send paths.
pub trait Transport: Debug + Send + Sync + 'static {
    /// Sends one complete HCI packet, indicator byte first.
    fn write(&self, pkt: &[u8]) -> Result<()>;

    /// Installs an HCI packet filter for the events the stack consumes.
    fn set_filter(&self, filter: &[u8]) -> Result<()>;

    /// Returns whether the underlying device is up.
    fn is_dev_up(&self) -> bool;
}
