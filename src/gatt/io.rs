use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use structbuf::{Pack, StructBuf};
use tracing::trace;

use crate::acl::{AclTx, Cid};
use crate::host::{self, Transport};

use super::*;

/// I/O callback result type.
pub type IoResult<T> = std::result::Result<T, ErrorCode>;

/// Application I/O callbacks for one characteristic. All methods are called
/// synchronously from packet processing, so they must not block. The defaults
/// reject reads and writes and ignore subscription changes.
pub trait Handler: Debug + Send + Sync {
    /// Handles a read request starting at `offset` into the value.
    fn read(&self, offset: u16) -> IoResult<Vec<u8>> {
        let _ = offset;
        Err(ErrorCode::ReadNotPermitted)
    }

    /// Handles a write request. `without_response` is set for write commands
    /// where any returned error is never reported to the client.
    fn write(&self, offset: u16, value: &[u8], without_response: bool) -> IoResult<()> {
        let _ = (offset, value, without_response);
        Err(ErrorCode::WriteNotPermitted)
    }

    /// Called when the client enables notifications or indications. The
    /// handler keeps `sub` for as long as it wants to send value updates.
    fn subscribe(&self, sub: Subscription) {
        let _ = sub;
    }

    /// Called when the client disables value updates or disconnects.
    fn unsubscribe(&self) {}

    /// Called after each sent notification.
    fn notified(&self) {}

    /// Called when the client confirms an indication.
    fn indicated(&self) {}
}

/// Characteristic without application I/O, used for static values.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoIo;

impl Handler for NoIo {}

/// Outbound ATT channel for value updates, hiding the transport type from
/// [`Handler`] implementations.
pub(super) trait Sink: Debug + Send + Sync {
    fn send(&self, op: Opcode, hdl: Handle, value: &[u8]) -> host::Result<()>;
}

impl<T: Transport> Sink for AclTx<T> {
    fn send(&self, op: Opcode, hdl: Handle, value: &[u8]) -> host::Result<()> {
        let mut pdu = StructBuf::new(3 + value.len());
        pdu.append().u8(op).u16(hdl).put(value);
        self.write(Cid::ATT, pdu.as_ref())
    }
}

/// Slot holding the target of an unconfirmed indication.
pub(super) type IndicateSlot = Arc<Mutex<Option<Arc<dyn Handler>>>>;

/// Active client subscription to value updates of one characteristic.
#[derive(Clone, Debug)]
pub struct Subscription {
    sink: Arc<dyn Sink>,
    io: Arc<dyn Handler>,
    ind: IndicateSlot,
    hdl: Handle,
    max_len: usize,
    indicate: bool,
}

impl Subscription {
    pub(super) fn new(
        sink: Arc<dyn Sink>,
        io: Arc<dyn Handler>,
        ind: IndicateSlot,
        hdl: Handle,
        max_len: usize,
        indicate: bool,
    ) -> Self {
        Self {
            sink,
            io,
            ind,
            hdl,
            max_len,
            indicate,
        }
    }

    /// Returns the maximum value length that fits in one update. The limit is
    /// fixed by the ATT_MTU in effect when the client subscribed.
    #[inline]
    #[must_use]
    pub const fn max_value_len(&self) -> usize {
        self.max_len
    }

    /// Returns whether updates are sent as indications.
    #[inline]
    #[must_use]
    pub const fn is_indication(&self) -> bool {
        self.indicate
    }

    /// Sends the new characteristic value, truncated to
    /// [`max_value_len`](Self::max_value_len) bytes.
    pub fn update(&self, value: &[u8]) -> host::Result<()> {
        let n = value.len().min(self.max_len);
        let op = if self.indicate {
            Opcode::HandleValueInd
        } else {
            Opcode::HandleValueNtf
        };
        trace!("{op:?} for {}: {:02X?}", self.hdl, &value[..n]);
        self.sink.send(op, self.hdl, &value[..n])?;
        if self.indicate {
            *self.ind.lock() = Some(Arc::clone(&self.io));
        } else {
            self.io.notified();
        }
        Ok(())
    }
}
