use std::collections::BTreeMap;
use std::sync::Arc;

use structbuf::{Pack, StructBuf, Unpacker};
use tracing::{debug, trace};

use crate::acl::{AclTx, Cid};
use crate::gap::Uuid;
use crate::host::{self, Transport};

use super::db::{Db, Entry, Kind};
use super::*;

/// Default appearance reported by the GAP service (Generic Computer).
const APPEARANCE_VALUE: u16 = 0x0080;

/// Server-side event reported to the application.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ServerEvent {
    /// The client negotiated a new ATT_MTU.
    MtuChange(u16),
}

/// Queued prepared write ([Vol 3] Part F, Section 3.4.6.1). Only one
/// contiguous queue for one handle is supported.
#[derive(Debug)]
struct Prepared {
    hdl: Handle,
    offset: u16,
    data: Vec<u8>,
}

/// GATT server handling all inbound ATT PDUs for one connection at a time.
#[derive(Debug)]
pub struct Gatt {
    db: Db,
    name: String,
    max_mtu: u16,
    mtu: u16,
    encrypted: bool,
    /// CCCD values, keyed by descriptor handle.
    cccd: BTreeMap<Handle, u16>,
    /// Subscribed characteristics, keyed by CCCD handle.
    subs: BTreeMap<Handle, Arc<super::db::Chr>>,
    prepared: Option<Prepared>,
    ind: IndicateSlot,
}

impl Gatt {
    /// Creates a server with only the fixed GAP and GATT services.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            db: Db::new(&name, APPEARANCE_VALUE, &[]),
            name,
            max_mtu: MAX_MTU,
            mtu: DEFAULT_MTU,
            encrypted: false,
            cccd: BTreeMap::new(),
            subs: BTreeMap::new(),
            prepared: None,
            ind: IndicateSlot::default(),
        }
    }

    /// Replaces the application services, discarding all per-connection
    /// state.
    pub fn set_services(&mut self, services: &[Service]) {
        self.db = Db::new(&self.name, APPEARANCE_VALUE, services);
        self.reset();
    }

    /// Returns the ATT_MTU in effect.
    #[inline]
    #[must_use]
    pub const fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Caps the ATT_MTU that can be negotiated. Takes effect at the next
    /// exchange.
    pub fn set_max_mtu(&mut self, mtu: u16) {
        self.max_mtu = mtu.clamp(DEFAULT_MTU, MAX_MTU);
    }

    /// Updates the link encryption status used for access checks.
    pub fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }

    /// Clears all per-connection state, notifying subscribed handlers.
    pub fn reset(&mut self) {
        for chr in std::mem::take(&mut self.subs).into_values() {
            chr.io.unsubscribe();
        }
        self.cccd.clear();
        self.mtu = DEFAULT_MTU;
        self.encrypted = false;
        self.prepared = None;
        self.ind.lock().take();
    }

    /// Handles one inbound ATT PDU, sending any response through `tx`.
    pub fn on_data<T: Transport>(
        &mut self,
        tx: &AclTx<T>,
        pdu: &[u8],
    ) -> host::Result<Option<ServerEvent>> {
        let mut p = Unpacker::new(pdu);
        let op = p.u8();
        let mut evt = None;
        let rsp = match Opcode::try_from(op) {
            Ok(Opcode::ExchangeMtuReq) => Some(self.exchange_mtu(p, &mut evt)),
            Ok(Opcode::FindInformationReq) => Some(self.find_information(p)),
            Ok(Opcode::FindByTypeValueReq) => Some(self.find_by_type_value(p)),
            Ok(Opcode::ReadByTypeReq) => Some(self.read_by_type(p)),
            Ok(Opcode::ReadReq) => Some(self.read(p, false)),
            Ok(Opcode::ReadBlobReq) => Some(self.read(p, true)),
            Ok(Opcode::ReadByGroupTypeReq) => Some(self.read_by_group_type(p)),
            Ok(Opcode::WriteReq) => Some(self.write(tx, p, false)),
            Ok(Opcode::WriteCmd) => {
                // Write commands never get a response, not even on error
                let _ = self.write(tx, p, true);
                None
            }
            Ok(Opcode::PrepareWriteReq) => Some(self.prepare_write(p)),
            Ok(Opcode::ExecuteWriteReq) => Some(self.execute_write(p)),
            Ok(Opcode::HandleValueCfm) => {
                if let Some(io) = self.ind.lock().take() {
                    io.indicated();
                }
                None
            }
            // Both get an explicit rejection despite the command flag on the
            // signed write
            Ok(Opcode::ReadMultipleReq | Opcode::SignedWriteCmd) => {
                Some(Err(ErrorRsp::new(op, 0, ErrorCode::RequestNotSupported)))
            }
            Ok(_) | Err(_) if Opcode::is_cmd(op) => None,
            Ok(_) | Err(_) => Some(Err(ErrorRsp::new(op, 0, ErrorCode::RequestNotSupported))),
        };
        if let Some(rsp) = rsp {
            let pdu = rsp.unwrap_or_else(|e| {
                debug!("{e}");
                error_rsp(&e)
            });
            tx.write(Cid::ATT, &pdu)?;
        }
        Ok(evt)
    }

    fn exchange_mtu(&mut self, mut p: Unpacker, evt: &mut Option<ServerEvent>) -> RspResult<Vec<u8>> {
        let client = p.u16();
        require_ok(&p, Opcode::ExchangeMtuReq)?;
        self.mtu = client.clamp(DEFAULT_MTU, self.max_mtu);
        debug!("ATT_MTU is now {}", self.mtu);
        *evt = Some(ServerEvent::MtuChange(self.mtu));
        let mut rsp = StructBuf::new(3);
        rsp.append().u8(Opcode::ExchangeMtuRsp).u16(self.mtu);
        Ok(rsp.as_ref().to_vec())
    }

    /// `ATT_FIND_INFORMATION_REQ` ([Vol 3] Part F, Section 3.4.3.1). Entries
    /// are grouped by UUID size, stopping at the first size change.
    fn find_information(&mut self, mut p: Unpacker) -> RspResult<Vec<u8>> {
        const OP: Opcode = Opcode::FindInformationReq;
        let (start, end) = (p.u16(), p.u16());
        require_ok(&p, OP)?;
        let range = (HandleRange::decode(start, end))
            .ok_or_else(|| ErrorRsp::new(OP.into(), start, ErrorCode::InvalidHandle))?;
        let mut rsp = StructBuf::new(usize::from(self.mtu));
        let mut uuid16 = true;
        for (hdl, e) in self.db.range(range) {
            let entry_len = if e.typ.as_u16().is_some() { 4 } else { 18 };
            if rsp.len() == 0 {
                uuid16 = entry_len == 4;
                rsp.append()
                    .u8(Opcode::FindInformationRsp)
                    .u8(if uuid16 { 0x01_u8 } else { 0x02 });
            } else if uuid16 != (entry_len == 4) || rsp.len() + entry_len > usize::from(self.mtu) {
                break;
            }
            rsp.append().u16(hdl).put(uuid_bytes(e.typ));
        }
        if rsp.len() == 0 {
            return Err(ErrorRsp::new(OP.into(), start, ErrorCode::AttributeNotFound));
        }
        Ok(rsp.as_ref().to_vec())
    }

    /// `ATT_FIND_BY_TYPE_VALUE_REQ` ([Vol 3] Part F, Section 3.4.3.3). Only
    /// primary service groups can be located.
    fn find_by_type_value(&mut self, mut p: Unpacker) -> RspResult<Vec<u8>> {
        const OP: Opcode = Opcode::FindByTypeValueReq;
        let (start, end, typ) = (p.u16(), p.u16(), p.u16());
        let value = p.take();
        require_ok(&value, OP)?;
        let range = (HandleRange::decode(start, end))
            .ok_or_else(|| ErrorRsp::new(OP.into(), start, ErrorCode::InvalidHandle))?;
        let not_found = ErrorRsp::new(OP.into(), start, ErrorCode::AttributeNotFound);
        if typ != PRIMARY_SERVICE.raw() {
            return Err(not_found);
        }
        let mut rsp = StructBuf::new(usize::from(self.mtu));
        for (hdl, e) in self.db.range(range) {
            let &Kind::Service { uuid, end } = &e.kind else { continue };
            if uuid_bytes(uuid).as_slice() != value.as_ref() {
                continue;
            }
            if rsp.len() == 0 {
                rsp.append().u8(Opcode::FindByTypeValueRsp);
            } else if rsp.len() + 4 > usize::from(self.mtu) {
                break;
            }
            rsp.append().u16(hdl).u16(end);
        }
        if rsp.len() == 0 {
            return Err(not_found);
        }
        Ok(rsp.as_ref().to_vec())
    }

    /// `ATT_READ_BY_TYPE_REQ` ([Vol 3] Part F, Section 3.4.4.1). Requests for
    /// the Characteristic type enumerate declarations; any other type reads
    /// the first matching attribute value.
    fn read_by_type(&mut self, mut p: Unpacker) -> RspResult<Vec<u8>> {
        const OP: Opcode = Opcode::ReadByTypeReq;
        let (start, end) = (p.u16(), p.u16());
        let typ = take_uuid(&mut p)
            .ok_or_else(|| ErrorRsp::new(OP.into(), start, ErrorCode::InvalidPdu))?;
        let range = (HandleRange::decode(start, end))
            .ok_or_else(|| ErrorRsp::new(OP.into(), start, ErrorCode::InvalidHandle))?;
        let not_found = ErrorRsp::new(OP.into(), start, ErrorCode::AttributeNotFound);
        let mtu = usize::from(self.mtu);
        if typ == CHARACTERISTIC.as_uuid() {
            let mut rsp = StructBuf::new(mtu);
            let mut entry_len = 0;
            for (hdl, e) in self.db.range(range) {
                let Kind::Decl(ref chr) = e.kind else { continue };
                let n = 5 + uuid_bytes(chr.uuid).len();
                if rsp.len() == 0 {
                    entry_len = n;
                    #[allow(clippy::cast_possible_truncation)]
                    rsp.append().u8(Opcode::ReadByTypeRsp).u8(n as u8);
                } else if n != entry_len || rsp.len() + n > mtu {
                    break;
                }
                rsp.append()
                    .u16(hdl)
                    .u8(chr.props.bits())
                    .u16(chr.value)
                    .put(uuid_bytes(chr.uuid));
            }
            if rsp.len() == 0 {
                return Err(not_found);
            }
            return Ok(rsp.as_ref().to_vec());
        }
        let Some((hdl, entry)) = (self.db.range(range)).find(|&(_, e)| e.typ == typ) else {
            return Err(not_found);
        };
        let data = (self.read_entry(entry, 0, false))
            .map_err(|e| ErrorRsp::new(OP.into(), hdl.into(), e))?;
        let n = data.len().min(mtu - 4);
        let mut rsp = StructBuf::new(mtu);
        #[allow(clippy::cast_possible_truncation)]
        rsp.append()
            .u8(Opcode::ReadByTypeRsp)
            .u8((2 + n) as u8)
            .u16(hdl)
            .put(&data[..n]);
        Ok(rsp.as_ref().to_vec())
    }

    /// `ATT_READ_REQ` and `ATT_READ_BLOB_REQ`
    /// ([Vol 3] Part F, Sections 3.4.4.3 and 3.4.4.5).
    fn read(&mut self, mut p: Unpacker, blob: bool) -> RspResult<Vec<u8>> {
        let (op, rsp_op) = if blob {
            (Opcode::ReadBlobReq, Opcode::ReadBlobRsp)
        } else {
            (Opcode::ReadReq, Opcode::ReadRsp)
        };
        let raw_hdl = p.u16();
        let offset = if blob { p.u16() } else { 0 };
        require_ok(&p, op)?;
        let err = |e| ErrorRsp::new(op.into(), raw_hdl, e);
        let hdl = Handle::new(raw_hdl).ok_or_else(|| err(ErrorCode::InvalidHandle))?;
        let entry = self.db.get(hdl).ok_or_else(|| err(ErrorCode::InvalidHandle))?;
        let data = self.read_entry(entry, offset, blob).map_err(err)?;
        let n = data.len().min(usize::from(self.mtu) - 1);
        let mut rsp = StructBuf::new(1 + n);
        rsp.append().u8(rsp_op).put(&data[..n]);
        Ok(rsp.as_ref().to_vec())
    }

    /// `ATT_READ_BY_GROUP_TYPE_REQ` ([Vol 3] Part F, Section 3.4.4.9).
    fn read_by_group_type(&mut self, mut p: Unpacker) -> RspResult<Vec<u8>> {
        const OP: Opcode = Opcode::ReadByGroupTypeReq;
        let (start, end) = (p.u16(), p.u16());
        let typ = take_uuid(&mut p)
            .ok_or_else(|| ErrorRsp::new(OP.into(), start, ErrorCode::InvalidPdu))?;
        let range = (HandleRange::decode(start, end))
            .ok_or_else(|| ErrorRsp::new(OP.into(), start, ErrorCode::InvalidHandle))?;
        if typ == INCLUDE.as_uuid() {
            // A valid grouping type, but nothing declares included services.
            return Err(ErrorRsp::new(OP.into(), start, ErrorCode::AttributeNotFound));
        }
        if typ != PRIMARY_SERVICE.as_uuid() {
            return Err(ErrorRsp::new(
                OP.into(),
                start,
                ErrorCode::UnsupportedGroupType,
            ));
        }
        let mtu = usize::from(self.mtu);
        let mut rsp = StructBuf::new(mtu);
        let mut entry_len = 0;
        for (hdl, e) in self.db.range(range) {
            let &Kind::Service { uuid, end } = &e.kind else { continue };
            let n = 4 + uuid_bytes(uuid).len();
            if rsp.len() == 0 {
                entry_len = n;
                #[allow(clippy::cast_possible_truncation)]
                rsp.append().u8(Opcode::ReadByGroupTypeRsp).u8(n as u8);
            } else if n != entry_len || rsp.len() + n > mtu {
                break;
            }
            rsp.append().u16(hdl).u16(end).put(uuid_bytes(uuid));
        }
        if rsp.len() == 0 {
            return Err(ErrorRsp::new(OP.into(), start, ErrorCode::AttributeNotFound));
        }
        Ok(rsp.as_ref().to_vec())
    }

    /// `ATT_WRITE_REQ` and `ATT_WRITE_CMD`
    /// ([Vol 3] Part F, Sections 3.4.5.1 and 3.4.5.3).
    fn write<T: Transport>(
        &mut self,
        tx: &AclTx<T>,
        mut p: Unpacker,
        without_rsp: bool,
    ) -> RspResult<Vec<u8>> {
        let op = if without_rsp {
            Opcode::WriteCmd
        } else {
            Opcode::WriteReq
        };
        let raw_hdl = p.u16();
        let value = p.take();
        require_ok(&value, op)?;
        let err = |e| ErrorRsp::new(op.into(), raw_hdl, e);
        let hdl = Handle::new(raw_hdl).ok_or_else(|| err(ErrorCode::InvalidHandle))?;
        let target = match self.db.get(hdl).map(|e| &e.kind) {
            Some(&Kind::Cccd(ref chr)) => Ok((true, Arc::clone(chr))),
            Some(&Kind::Value(ref chr)) => Ok((false, Arc::clone(chr))),
            Some(_) => Err(ErrorCode::WriteNotPermitted),
            None => Err(ErrorCode::InvalidHandle),
        };
        let (is_cccd, chr) = target.map_err(err)?;
        if is_cccd {
            self.write_cccd(tx, hdl, &chr, value.as_ref()).map_err(err)?;
        } else {
            let need = if without_rsp {
                Prop::WRITE_WITHOUT_RESPONSE
            } else {
                Prop::WRITE
            };
            if !chr.props.contains(need) {
                return Err(err(ErrorCode::WriteNotPermitted));
            }
            if chr.secure.contains(need) && !self.encrypted {
                return Err(err(ErrorCode::InsufficientAuthentication));
            }
            chr.io.write(0, value.as_ref(), without_rsp).map_err(err)?;
        }
        Ok(vec![Opcode::WriteRsp.into()])
    }

    /// Handles a CCCD write, notifying the characteristic handler of
    /// subscription changes. Notifications win when both bits are set.
    fn write_cccd<T: Transport>(
        &mut self,
        tx: &AclTx<T>,
        hdl: Handle,
        chr: &Arc<super::db::Chr>,
        value: &[u8],
    ) -> IoResult<()> {
        if chr.secure.intersects(Prop::NOTIFY | Prop::INDICATE) && !self.encrypted {
            return Err(ErrorCode::InsufficientAuthentication);
        }
        let [lo, hi] = *value else {
            return Err(ErrorCode::InvalidAttributeValueLength);
        };
        let bits = u16::from_le_bytes([lo, hi]);
        self.cccd.insert(hdl, bits);
        if let Some(prev) = self.subs.remove(&hdl) {
            prev.io.unsubscribe();
        }
        let indicate = if chr.props.contains(Prop::NOTIFY) && bits & CCCD_NOTIFY != 0 {
            false
        } else if chr.props.contains(Prop::INDICATE) && bits & CCCD_INDICATE != 0 {
            true
        } else {
            return Ok(());
        };
        trace!("{} subscribed to {} (indicate={indicate})", hdl, chr.uuid);
        let sub = Subscription::new(
            Arc::new(tx.clone()),
            Arc::clone(&chr.io),
            Arc::clone(&self.ind),
            chr.value,
            usize::from(self.mtu) - 3,
            indicate,
        );
        self.subs.insert(hdl, Arc::clone(chr));
        chr.io.subscribe(sub);
        Ok(())
    }

    /// `ATT_PREPARE_WRITE_REQ` ([Vol 3] Part F, Section 3.4.6.1).
    fn prepare_write(&mut self, mut p: Unpacker) -> RspResult<Vec<u8>> {
        const OP: Opcode = Opcode::PrepareWriteReq;
        let (raw_hdl, offset) = (p.u16(), p.u16());
        let value = p.take();
        require_ok(&value, OP)?;
        let err = |e| ErrorRsp::new(OP.into(), raw_hdl, e);
        let hdl = Handle::new(raw_hdl).ok_or_else(|| err(ErrorCode::InvalidHandle))?;
        let Some(&Kind::Value(ref chr)) = self.db.get(hdl).map(|e| &e.kind) else {
            return Err(err(ErrorCode::AttributeNotLong));
        };
        if !chr.props.contains(Prop::WRITE) {
            return Err(err(ErrorCode::WriteNotPermitted));
        }
        if chr.secure.contains(Prop::WRITE) && !self.encrypted {
            return Err(err(ErrorCode::InsufficientAuthentication));
        }
        match self.prepared {
            None => {
                self.prepared = Some(Prepared {
                    hdl,
                    offset,
                    data: value.as_ref().to_vec(),
                });
            }
            Some(ref mut prep) => {
                if prep.hdl != hdl {
                    return Err(err(ErrorCode::UnlikelyError));
                }
                if usize::from(offset) != usize::from(prep.offset) + prep.data.len() {
                    return Err(err(ErrorCode::InvalidOffset));
                }
                prep.data.extend_from_slice(value.as_ref());
            }
        }
        let mut rsp = StructBuf::new(5 + value.as_ref().len());
        rsp.append()
            .u8(Opcode::PrepareWriteRsp)
            .u16(raw_hdl)
            .u16(offset)
            .put(value.as_ref());
        Ok(rsp.as_ref().to_vec())
    }

    /// `ATT_EXECUTE_WRITE_REQ` ([Vol 3] Part F, Section 3.4.6.3). The queue
    /// is consumed whether the execution succeeds or not.
    fn execute_write(&mut self, mut p: Unpacker) -> RspResult<Vec<u8>> {
        const OP: Opcode = Opcode::ExecuteWriteReq;
        let flags = p.u8();
        require_ok(&p, OP)?;
        let prep = (self.prepared.take())
            .ok_or_else(|| ErrorRsp::new(OP.into(), 0, ErrorCode::UnlikelyError))?;
        let err = |e| ErrorRsp::new(OP.into(), prep.hdl.into(), e);
        match flags {
            0x00 => {} // cancel
            0x01 => {
                let Some(&Kind::Value(ref chr)) = self.db.get(prep.hdl).map(|e| &e.kind) else {
                    return Err(err(ErrorCode::UnlikelyError));
                };
                chr.io.write(prep.offset, &prep.data, false).map_err(err)?;
            }
            _ => return Err(err(ErrorCode::UnlikelyError)),
        }
        Ok(vec![Opcode::ExecuteWriteRsp.into()])
    }

    /// Produces the value of one attribute for a read-class request.
    fn read_entry(&self, entry: &Entry, offset: u16, blob: bool) -> IoResult<Vec<u8>> {
        match entry.kind {
            Kind::Service { uuid, .. } => {
                if blob {
                    return Err(ErrorCode::AttributeNotLong);
                }
                Ok(uuid_bytes(uuid))
            }
            Kind::Decl(ref chr) => {
                if blob {
                    return Err(ErrorCode::AttributeNotLong);
                }
                let uuid = uuid_bytes(chr.uuid);
                let mut v = StructBuf::new(3 + uuid.len());
                v.append().u8(chr.props.bits()).u16(chr.value).put(uuid);
                Ok(v.as_ref().to_vec())
            }
            Kind::Value(ref chr) => {
                if !chr.props.contains(Prop::READ) {
                    return Err(ErrorCode::ReadNotPermitted);
                }
                if chr.secure.contains(Prop::READ) && !self.encrypted {
                    return Err(ErrorCode::InsufficientAuthentication);
                }
                match chr.static_value {
                    Some(ref v) => slice_from(v, offset),
                    None => chr.io.read(offset),
                }
            }
            Kind::Cccd(ref chr) => {
                if chr.secure.intersects(Prop::NOTIFY | Prop::INDICATE) && !self.encrypted {
                    return Err(ErrorCode::InsufficientAuthentication);
                }
                slice_from(&self.cccd_value(entry).to_le_bytes(), offset)
            }
            Kind::Descriptor { ref value } => slice_from(value, offset),
        }
    }

    /// Returns the stored CCCD value for `entry`.
    fn cccd_value(&self, entry: &Entry) -> u16 {
        // Entries do not know their own handle, so match by identity
        for (&hdl, &v) in &self.cccd {
            if let Some(e) = self.db.get(hdl) {
                if std::ptr::eq(e, entry) {
                    return v;
                }
            }
        }
        0
    }
}

/// Returns `InvalidPdu` if any request field was truncated.
fn require_ok(p: &Unpacker, op: Opcode) -> RspResult<()> {
    if p.is_ok() {
        Ok(())
    } else {
        Err(ErrorRsp::new(op.into(), 0, ErrorCode::InvalidPdu))
    }
}

/// Encodes an `ATT_ERROR_RSP` PDU.
fn error_rsp(e: &ErrorRsp) -> Vec<u8> {
    let mut rsp = StructBuf::new(5);
    rsp.append().u8(Opcode::ErrorRsp).u8(e.req).u16(e.hdl).u8(e.err);
    rsp.as_ref().to_vec()
}

/// Encodes a UUID in its shortest wire form.
fn uuid_bytes(u: Uuid) -> Vec<u8> {
    match u.as_uuid16() {
        Some(u) => u.to_bytes().to_vec(),
        None => u.to_bytes().to_vec(),
    }
}

/// Decodes a trailing 16- or 128-bit attribute type.
fn take_uuid(p: &mut Unpacker) -> Option<Uuid> {
    let rest = p.take();
    rest.is_ok()
        .then(|| Uuid::try_from(rest.as_ref()).ok())
        .flatten()
}

/// Returns the value starting at `offset`, or `InvalidOffset` when the offset
/// is past the end.
fn slice_from(v: &[u8], offset: u16) -> IoResult<Vec<u8>> {
    (v.get(usize::from(offset)..).map(<[u8]>::to_vec)).ok_or(ErrorCode::InvalidOffset)
}
