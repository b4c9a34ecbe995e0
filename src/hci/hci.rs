use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use structbuf::{Pack, Packer, StructBuf, Unpacker};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::acl::Cid;
use crate::host::{self, Transport};
use crate::le::{Addr, RawAddr};

use super::*;

/// Event mask enabling the events the stack consumes
/// ([Vol 4] Part E, Section 7.3.1).
const EVENT_MASK: [u8; 8] = [0xFF, 0xFF, 0xFB, 0xFF, 0x07, 0xF8, 0xBF, 0x3D];

/// LE event mask ([Vol 4] Part E, Section 7.8.1).
const LE_EVENT_MASK: [u8; 8] = [0x1F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Command packet header length (indicator, opcode, parameter length).
const CMD_HDR: usize = 4;

/// Connection handle ([Vol 4] Part E, Section 5.4.2).
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct ConnHandle(u16);

impl ConnHandle {
    /// Wraps a raw 12-bit connection handle.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        Self(v & 0x0FFF)
    }

    /// Returns the raw handle value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl Debug for ConnHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnHandle({:#05X})", self.0)
    }
}

impl Display for ConnHandle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Connection role ([Vol 4] Part E, Section 7.7.65.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum Role {
    #[num_enum(default)]
    Central = 0x00,
    Peripheral = 0x01,
}

/// `HCI_Read_Local_Version_Information` parameters
/// ([Vol 4] Part E, Section 7.4.1).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LocalVersion {
    pub hci_ver: u8,
    pub hci_rev: u16,
    pub lmp_ver: u8,
    pub manufacturer: u16,
    pub lmp_subver: u16,
}

/// `HCI_LE_Connection_Complete` parameters
/// ([Vol 4] Part E, Section 7.7.65.1).
#[derive(Clone, Copy, Debug)]
pub struct LeConnComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub role: Role,
    pub peer: Addr,
    pub interval: Duration,
    pub latency: u16,
    pub timeout: Duration,
    pub clock_accuracy: u8,
}

/// Typed events emitted by the HCI layer.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    State(AdapterState),
    Address(RawAddr),
    LocalVersion(LocalVersion),
    AdvertisingParametersSet(Status),
    AdvertisingDataSet(Status),
    ScanResponseDataSet(Status),
    AdvertiseEnableSet(Status),
    RssiRead {
        handle: ConnHandle,
        rssi: i8,
    },
    LtkNegReply {
        handle: ConnHandle,
    },
    DisconnComplete {
        handle: ConnHandle,
        reason: Status,
    },
    EncryptChange {
        handle: ConnHandle,
        encrypted: bool,
    },
    LeConnComplete(LeConnComplete),
    LeConnUpdateComplete {
        status: Status,
        handle: ConnHandle,
        interval: Duration,
        latency: u16,
        timeout: Duration,
    },
    AclData {
        handle: ConnHandle,
        cid: Cid,
        data: Vec<u8>,
    },
}

/// In-progress reassembly of a fragmented inbound ACL PDU.
#[derive(Debug)]
struct Assembly {
    len: usize,
    cid: Cid,
    data: Vec<u8>,
}

/// Host side of the Host Controller Interface.
///
/// The embedder feeds inbound packets through [`Hci::on_data`] and calls
/// [`Hci::poll_dev_up`] once per second; decoded events are delivered on the
/// channel returned by [`Hci::new`].
#[derive(Debug)]
pub struct Hci<T: Transport> {
    t: Arc<T>,
    events: mpsc::UnboundedSender<Event>,
    state: AdapterState,
    dev_up: Option<bool>,
    /// Set when the first successful local version read triggered advertising
    /// setup. Cleared when the device goes down.
    init_done: bool,
    adv_interval: Duration,
    recv: BTreeMap<ConnHandle, Assembly>,
}

impl<T: Transport> Hci<T> {
    /// Creates the HCI layer over `transport` along with the receiving half
    /// of its event channel.
    #[must_use]
    pub fn new(transport: T, adv_interval: Duration) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Self {
            t: Arc::new(transport),
            events: tx,
            state: AdapterState::Unknown,
            dev_up: None,
            init_done: false,
            adv_interval,
            recv: BTreeMap::new(),
        };
        (this, rx)
    }

    /// Returns a shared reference to the transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> Arc<T> {
        Arc::clone(&self.t)
    }

    /// Returns the last reported adapter state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> AdapterState {
        self.state
    }

    /// Checks for device up/down transitions. Must be called once per second
    /// by the embedder. An up transition installs the packet filter and runs
    /// controller setup; a down transition reports `PoweredOff`.
    pub fn poll_dev_up(&mut self) -> Result<()> {
        let up = self.t.is_dev_up();
        if self.dev_up != Some(up) {
            self.dev_up = Some(up);
            if up {
                self.set_socket_filter()?;
                self.startup()?;
            } else {
                self.init_done = false;
                self.emit(Event::State(AdapterState::PoweredOff));
            }
        }
        Ok(())
    }

    /// Issues the controller setup command sequence.
    fn startup(&mut self) -> Result<()> {
        self.set_event_mask()?;
        self.set_le_event_mask()?;
        self.read_local_version()?;
        self.write_le_host_supported()?;
        self.read_le_host_supported()?;
        self.read_bd_addr()
    }

    fn set_socket_filter(&mut self) -> Result<()> {
        let type_mask = 1_u32 << EVENT_PKT | 1 << ACL_PKT;
        let event_mask1 = 1_u32 << u8::from(EventCode::DisconnectionComplete)
            | 1 << u8::from(EventCode::EncryptionChange)
            | 1 << u8::from(EventCode::CommandComplete)
            | 1 << u8::from(EventCode::CommandStatus);
        let event_mask2 = 1_u32 << (u8::from(EventCode::LeMetaEvent) - 32);
        let mut f = StructBuf::new(14);
        f.append()
            .u32(type_mask)
            .u32(event_mask1)
            .u32(event_mask2)
            .u16(0_u16);
        trace!("socket filter: {:02X?}", f.as_ref());
        let r = self.t.set_filter(f.as_ref());
        self.check(r)
    }

    pub fn set_event_mask(&mut self) -> Result<()> {
        let mut cmd = Cmd::new(Opcode::SET_EVENT_MASK);
        cmd.append().put(EVENT_MASK);
        self.submit(cmd)
    }

    pub fn set_le_event_mask(&mut self) -> Result<()> {
        let mut cmd = Cmd::new(Opcode::LE_SET_EVENT_MASK);
        cmd.append().put(LE_EVENT_MASK);
        self.submit(cmd)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.submit(Cmd::new(Opcode::RESET))
    }

    pub fn read_local_version(&mut self) -> Result<()> {
        self.submit(Cmd::new(Opcode::READ_LOCAL_VERSION))
    }

    pub fn write_le_host_supported(&mut self) -> Result<()> {
        let mut cmd = Cmd::new(Opcode::WRITE_LE_HOST_SUPPORTED);
        cmd.append().u8(1_u8).u8(0_u8); // le=1, simul=0
        self.submit(cmd)
    }

    pub fn read_le_host_supported(&mut self) -> Result<()> {
        self.submit(Cmd::new(Opcode::READ_LE_HOST_SUPPORTED))
    }

    pub fn read_bd_addr(&mut self) -> Result<()> {
        self.submit(Cmd::new(Opcode::READ_BD_ADDR))
    }

    /// Configures undirected connectable advertising on all channels
    /// ([Vol 4] Part E, Section 7.8.5).
    pub fn set_advertising_parameters(&mut self) -> Result<()> {
        let interval = ticks_625us(self.adv_interval);
        let mut cmd = Cmd::new(Opcode::LE_SET_ADVERTISING_PARAMETERS);
        cmd.append()
            .u16(interval) // min interval
            .u16(interval) // max interval
            .u8(0_u8) // ADV_IND
            .u8(0_u8) // own address type: public
            .u8(0_u8) // peer address type
            .put([0_u8; 6]) // peer address
            .u8(0x07_u8) // all advertising channels
            .u8(0_u8); // no filter policy
        self.submit(cmd)
    }

    pub fn set_advertising_data(&mut self, data: &[u8]) -> Result<()> {
        self.set_eir_data(Opcode::LE_SET_ADVERTISING_DATA, data)
    }

    pub fn set_scan_response_data(&mut self, data: &[u8]) -> Result<()> {
        self.set_eir_data(Opcode::LE_SET_SCAN_RESPONSE_DATA, data)
    }

    /// The parameter is a fixed 32-byte block: significant length followed by
    /// up to 31 data bytes, zero padded ([Vol 4] Part E, Section 7.8.7).
    #[allow(clippy::cast_possible_truncation)]
    fn set_eir_data(&mut self, opcode: Opcode, data: &[u8]) -> Result<()> {
        let n = data.len().min(31);
        let mut cmd = Cmd::new(opcode);
        cmd.append()
            .u8(n as u8)
            .put(&data[..n])
            .put(&[0_u8; 31][..31 - n]);
        self.submit(cmd)
    }

    pub fn set_advertise_enable(&mut self, enabled: bool) -> Result<()> {
        let mut cmd = Cmd::new(Opcode::LE_SET_ADVERTISE_ENABLE);
        cmd.append().bool(enabled);
        self.submit(cmd)
    }

    pub fn disconnect(&mut self, handle: ConnHandle, reason: Status) -> Result<()> {
        let mut cmd = Cmd::new(Opcode::DISCONNECT);
        cmd.append().u16(handle.raw()).u8(reason);
        self.submit(cmd)
    }

    pub fn read_rssi(&mut self, handle: ConnHandle) -> Result<()> {
        let mut cmd = Cmd::new(Opcode::READ_RSSI);
        cmd.append().u16(handle.raw());
        self.submit(cmd)
    }

    pub fn le_ltk_neg_reply(&mut self, handle: ConnHandle) -> Result<()> {
        let mut cmd = Cmd::new(Opcode::LE_LTK_NEG_REPLY);
        cmd.append().u16(handle.raw());
        self.submit(cmd)
    }

    /// Decodes one inbound HCI packet, indicator byte first.
    pub fn on_data(&mut self, pkt: &[u8]) -> Result<()> {
        trace!("controller: {pkt:02X?}");
        let mut p = Unpacker::new(pkt);
        match p.u8() {
            EVENT_PKT => self.on_event(p, pkt),
            ACL_PKT => self.on_acl_data(p, pkt),
            _ => {
                warn!("unknown packet type: {pkt:02X?}");
                Ok(())
            }
        }
    }

    fn on_event(&mut self, mut p: Unpacker, pkt: &[u8]) -> Result<()> {
        let code = p.u8();
        let _plen = p.u8();
        let Ok(code) = EventCode::try_from(code) else {
            debug!("ignored event: {pkt:02X?}");
            return Ok(());
        };
        match code {
            EventCode::DisconnectionComplete => {
                let _status = p.u8();
                let handle = ConnHandle::new(p.u16());
                let reason = Status::from(p.u8());
                if !p.is_ok() {
                    return Err(Error::InvalidEvent(pkt.to_vec()));
                }
                debug!("{handle} disconnected: {reason}");
                self.recv.remove(&handle);
                self.emit(Event::DisconnComplete { handle, reason });
                Ok(())
            }
            EventCode::EncryptionChange => {
                let _status = p.u8();
                let handle = ConnHandle::new(p.u16());
                let encrypted = p.bool();
                if !p.is_ok() {
                    return Err(Error::InvalidEvent(pkt.to_vec()));
                }
                debug!("{handle} encrypt change: {encrypted}");
                self.emit(Event::EncryptChange { handle, encrypted });
                Ok(())
            }
            EventCode::CommandComplete => {
                let _ncmd = p.u8();
                let opcode = Opcode::from(p.u16());
                let status = Status::from(p.u8());
                if !p.is_ok() {
                    return Err(Error::InvalidEvent(pkt.to_vec()));
                }
                self.on_cmd_complete(opcode, status, p.as_ref())
            }
            EventCode::CommandStatus => {
                let status = Status::from(p.u8());
                let _ncmd = p.u8();
                let opcode = Opcode::from(p.u16());
                debug!("command status for {opcode}: {status}");
                Ok(())
            }
            EventCode::LeMetaEvent => {
                let sub = p.u8();
                let status = Status::from(p.u8());
                let Ok(sub) = SubeventCode::try_from(sub) else {
                    debug!("ignored LE meta event: {pkt:02X?}");
                    return Ok(());
                };
                self.on_le_meta(sub, status, p, pkt)
            }
        }
    }

    fn on_le_meta(
        &mut self,
        sub: SubeventCode,
        status: Status,
        mut p: Unpacker,
        pkt: &[u8],
    ) -> Result<()> {
        match sub {
            SubeventCode::ConnectionComplete => {
                let handle = ConnHandle::new(p.u16());
                let role = Role::from(p.u8());
                let typ = p.u8();
                let peer = Addr::peer(typ, raw_addr(&mut p));
                let interval = Duration::from_micros(u64::from(p.u16()) * 1250);
                let latency = p.u16();
                let timeout = Duration::from_millis(u64::from(p.u16()) * 10);
                let clock_accuracy = p.u8();
                if !p.is_ok() {
                    return Err(Error::InvalidEvent(pkt.to_vec()));
                }
                debug!("{handle} connected to {peer} as {role:?}");
                self.emit(Event::LeConnComplete(LeConnComplete {
                    status,
                    handle,
                    role,
                    peer,
                    interval,
                    latency,
                    timeout,
                    clock_accuracy,
                }));
                Ok(())
            }
            SubeventCode::ConnectionUpdateComplete => {
                let handle = ConnHandle::new(p.u16());
                let interval = Duration::from_micros(u64::from(p.u16()) * 1250);
                let latency = p.u16();
                let timeout = Duration::from_millis(u64::from(p.u16()) * 10);
                if !p.is_ok() {
                    return Err(Error::InvalidEvent(pkt.to_vec()));
                }
                self.emit(Event::LeConnUpdateComplete {
                    status,
                    handle,
                    interval,
                    latency,
                    timeout,
                });
                Ok(())
            }
        }
    }

    fn on_cmd_complete(&mut self, opcode: Opcode, status: Status, params: &[u8]) -> Result<()> {
        match opcode {
            Opcode::RESET => self.startup(),
            Opcode::READ_LE_HOST_SUPPORTED => {
                if status.is_ok() {
                    let mut p = Unpacker::new(params);
                    let (le, simul) = (p.u8(), p.u8());
                    debug!("LE host support: le={le} simul={simul}");
                }
                Ok(())
            }
            Opcode::READ_LOCAL_VERSION => {
                let mut p = Unpacker::new(params);
                let v = LocalVersion {
                    hci_ver: p.u8(),
                    hci_rev: p.u16(),
                    lmp_ver: p.u8(),
                    manufacturer: p.u16(),
                    lmp_subver: p.u16(),
                };
                if !p.is_ok() {
                    return Err(Error::InvalidEvent(params.to_vec()));
                }
                if v.hci_ver < 0x06 {
                    self.emit(Event::State(AdapterState::Unsupported));
                } else if !self.init_done {
                    self.init_done = true;
                    self.set_advertise_enable(false)?;
                    self.set_advertising_parameters()?;
                }
                self.emit(Event::LocalVersion(v));
                Ok(())
            }
            Opcode::READ_BD_ADDR => {
                let mut p = Unpacker::new(params);
                let addr = raw_addr(&mut p);
                if !p.is_ok() {
                    return Err(Error::InvalidEvent(params.to_vec()));
                }
                debug!("local address: {addr}");
                self.emit(Event::Address(addr));
                Ok(())
            }
            Opcode::LE_SET_ADVERTISING_PARAMETERS => {
                self.emit(Event::State(AdapterState::PoweredOn));
                self.emit(Event::AdvertisingParametersSet(status));
                Ok(())
            }
            Opcode::LE_SET_ADVERTISING_DATA => {
                self.emit(Event::AdvertisingDataSet(status));
                Ok(())
            }
            Opcode::LE_SET_SCAN_RESPONSE_DATA => {
                self.emit(Event::ScanResponseDataSet(status));
                Ok(())
            }
            Opcode::LE_SET_ADVERTISE_ENABLE => {
                self.emit(Event::AdvertiseEnableSet(status));
                Ok(())
            }
            Opcode::READ_RSSI => {
                let mut p = Unpacker::new(params);
                let handle = ConnHandle::new(p.u16());
                let rssi = p.i8();
                if !p.is_ok() {
                    return Err(Error::InvalidEvent(params.to_vec()));
                }
                self.emit(Event::RssiRead { handle, rssi });
                Ok(())
            }
            Opcode::LE_LTK_NEG_REPLY => {
                let mut p = Unpacker::new(params);
                let handle = ConnHandle::new(p.u16());
                if !p.is_ok() {
                    return Err(Error::InvalidEvent(params.to_vec()));
                }
                self.emit(Event::LtkNegReply { handle });
                Ok(())
            }
            _ => {
                debug!("unhandled command complete: {opcode} ({status})");
                Ok(())
            }
        }
    }

    fn on_acl_data(&mut self, mut p: Unpacker, pkt: &[u8]) -> Result<()> {
        let hf = p.u16();
        let flags = hf >> 12;
        let handle = ConnHandle::new(hf);
        match flags {
            ACL_START => {
                let _total = p.u16();
                let len = usize::from(p.u16());
                let cid = Cid::from(p.u16());
                if !p.is_ok() {
                    return Err(Error::InvalidAcl(pkt.to_vec()));
                }
                let data = p.as_ref().to_vec();
                if data.len() == len {
                    self.emit(Event::AclData { handle, cid, data });
                } else {
                    trace!("buffering partial {cid} PDU for {handle}");
                    self.recv.insert(handle, Assembly { len, cid, data });
                }
                Ok(())
            }
            ACL_CONT => {
                let _total = p.u16();
                if !p.is_ok() {
                    return Err(Error::InvalidAcl(pkt.to_vec()));
                }
                let Some(asm) = self.recv.get_mut(&handle) else {
                    warn!("ACL continuation for unknown {handle}");
                    return Ok(());
                };
                asm.data.extend_from_slice(p.as_ref());
                if asm.data.len() == asm.len {
                    if let Some(asm) = self.recv.remove(&handle) {
                        self.emit(Event::AclData {
                            handle,
                            cid: asm.cid,
                            data: asm.data,
                        });
                    }
                }
                Ok(())
            }
            _ => {
                warn!("unexpected ACL boundary flags {flags:#03X} for {handle}");
                Ok(())
            }
        }
    }

    /// Submits an encoded command, mapping transport failures to adapter
    /// state changes the way the raw socket reports them.
    fn submit(&mut self, cmd: Cmd) -> Result<()> {
        let r = cmd.exec(&*self.t);
        self.check(r)
    }

    fn check(&mut self, r: host::Result<()>) -> Result<()> {
        if let Err(ref e) = r {
            match *e {
                host::Error::NotPermitted => {
                    self.emit(Event::State(AdapterState::Unauthorized));
                }
                host::Error::NetworkDown => {} // the next poll sees the device down
                host::Error::Io(ref e) => error!("transport error: {e}"),
            }
        }
        Ok(r?)
    }

    fn emit(&mut self, evt: Event) {
        if let Event::State(s) = evt {
            debug!("adapter state: {s}");
            self.state = s;
        }
        let _ = self.events.send(evt);
    }
}

/// Returns the next `BD_ADDR` in wire byte order.
fn raw_addr(p: &mut Unpacker) -> RawAddr {
    RawAddr::from([p.u8(), p.u8(), p.u8(), p.u8(), p.u8(), p.u8()])
}

/// Converts `d` to 0.625 ms units used by advertising intervals.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn ticks_625us(d: Duration) -> u16 {
    (d.as_micros() / 625).min(u128::from(u16::MAX)) as u16
}

/// HCI command encoder with deferred parameter length.
#[derive(Debug)]
struct Cmd {
    buf: StructBuf,
}

impl Cmd {
    #[must_use]
    fn new(opcode: Opcode) -> Self {
        let mut buf = StructBuf::new(CMD_HDR + 255);
        buf.append().u8(COMMAND_PKT).u16(opcode.raw()).u8(0_u8);
        Self { buf }
    }

    /// Finalizes the parameter length and writes the command packet.
    fn exec<T: Transport>(mut self, t: &T) -> host::Result<()> {
        let n = u8::try_from(self.buf.len() - CMD_HDR).expect("command too long");
        self.buf.at(CMD_HDR - 1).u8(n);
        trace!("command: {:02X?}", self.buf.as_ref());
        t.write(self.buf.as_ref())
    }
}

impl Pack for Cmd {
    #[inline]
    fn append(&mut self) -> Packer {
        self.buf.append()
    }

    #[inline]
    fn at(&mut self, i: usize) -> Packer {
        self.buf.at(CMD_HDR + i)
    }
}
