//! Connection-oriented data transfer over ACL packets
//! ([Vol 4] Part E, Section 5.4.2).

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use structbuf::{Pack, StructBuf};
use tracing::trace;

use crate::hci::{ConnHandle, ACL_PKT, ACL_START_NO_FLUSH};
use crate::host::{self, Transport};

/// L2CAP channel identifier ([Vol 3] Part A, Section 2.1).
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Cid(u16);

impl Cid {
    /// Attribute protocol fixed channel.
    pub const ATT: Self = Self(0x0004);
    /// Security Manager protocol fixed channel.
    pub const SMP: Self = Self(0x0006);

    /// Returns the raw channel ID.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl From<u16> for Cid {
    #[inline]
    fn from(v: u16) -> Self {
        Self(v)
    }
}

impl From<Cid> for u16 {
    #[inline]
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl Debug for Cid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ATT => f.write_str("ATT"),
            Self::SMP => f.write_str("SMP"),
            Self(v) => write!(f, "Cid({v:#06X})"),
        }
    }
}

impl Display for Cid {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Outbound ACL channel for one connection. Clones share the transport, so
/// notification senders can keep one after the protocol handlers move on.
#[derive(Debug)]
pub struct AclTx<T: Transport> {
    t: Arc<T>,
    handle: ConnHandle,
}

impl<T: Transport> Clone for AclTx<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            t: Arc::clone(&self.t),
            handle: self.handle,
        }
    }
}

impl<T: Transport> AclTx<T> {
    #[inline]
    #[must_use]
    pub(crate) fn new(t: Arc<T>, handle: ConnHandle) -> Self {
        Self { t, handle }
    }

    /// Returns the connection handle.
    #[inline]
    #[must_use]
    pub const fn handle(&self) -> ConnHandle {
        self.handle
    }

    /// Sends one complete PDU on channel `cid` as a single unfragmented ACL
    /// packet with a full basic L2CAP header.
    pub fn write(&self, cid: Cid, pdu: &[u8]) -> host::Result<()> {
        let n = u16::try_from(pdu.len()).expect("PDU too long");
        let mut pkt = StructBuf::new(9 + pdu.len());
        pkt.append()
            .u8(ACL_PKT)
            .u16(self.handle.raw() | ACL_START_NO_FLUSH << 12)
            .u16(n + 4)
            .u16(n)
            .u16(cid)
            .put(pdu);
        trace!("{} {cid} send: {pdu:02X?}", self.handle);
        self.t.write(pkt.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use crate::host::fake::Fake;

    use super::*;

    #[test]
    fn pdu_framing() {
        let t = Arc::new(Fake::default());
        let tx = AclTx::new(Arc::clone(&t), ConnHandle::new(0x0040));
        tx.write(Cid::ATT, &[0x03, 0x17, 0x00]).unwrap();
        assert_eq!(
            t.pop_write().unwrap(),
            [0x02, 0x40, 0x00, 0x07, 0x00, 0x03, 0x00, 0x04, 0x00, 0x03, 0x17, 0x00]
        );
    }

    #[test]
    fn cid_names() {
        assert_eq!(format!("{}", Cid::ATT), "ATT");
        assert_eq!(format!("{}", Cid::from(0x0040)), "Cid(0x0040)");
    }
}
