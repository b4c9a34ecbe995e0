//! Peripheral facade tying the HCI, GAP, GATT, and SMP layers together.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::acl::{AclTx, Cid};
use crate::gap::{self, AdvData, AdvEvent, Gap, Uuid};
use crate::gatt::{Gatt, ServerEvent, Service};
use crate::hci::{self, AdapterState, ConnHandle, Hci, Role, Status};
use crate::host::Transport;
use crate::le::{Addr, RawAddr};
use crate::smp::{self, KeyStore, Smp};

/// Manufacturer whose controllers misbehave with an ATT_MTU above the
/// default.
const MTU_QUIRK_MANUFACTURER: u16 = 93;

/// Peripheral configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Device name served by the Generic Access service and advertised in
    /// the scan response.
    pub name: String,
    /// Advertising interval.
    pub adv_interval: Duration,
    /// Skip the pre-enable advertising data write ([`Gap::new`]).
    pub single_eir_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::from("bluelet"),
            adv_interval: Duration::from_millis(100),
            single_eir_write: false,
        }
    }
}

/// Application-visible peripheral events.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// Adapter power or authorization state changed.
    StateChange(AdapterState),
    /// Controller address became known.
    AddressChange(RawAddr),
    /// Advertising start completed, possibly with a controller error.
    AdvertisingStart(Option<Status>),
    /// Advertising was stopped.
    AdvertisingStop,
    /// A central connected.
    Accept(Addr),
    /// The connection was closed.
    Disconnect(Addr),
    /// Result of [`Peripheral::update_rssi`].
    RssiUpdate(i8),
    /// A new ATT_MTU was negotiated.
    MtuChange(u16),
    /// The attribute database was rebuilt.
    ServicesSet,
}

/// State for the one active central connection.
#[derive(Debug)]
struct Connection<T: Transport> {
    handle: ConnHandle,
    peer: Addr,
    tx: AclTx<T>,
    smp: Smp,
}

/// Single-connection BLE peripheral.
///
/// The embedder owns the HCI channel: inbound packets go into
/// [`Peripheral::on_data`] and [`Peripheral::tick`] must run once per second,
/// or [`Peripheral::run`] does both from an async context.
#[derive(Debug)]
pub struct Peripheral<T: Transport> {
    hci: Hci<T>,
    hci_rx: mpsc::UnboundedReceiver<hci::Event>,
    gap: Gap,
    gatt: Gatt,
    keys: Arc<dyn KeyStore>,
    events: mpsc::UnboundedSender<Event>,
    addr: Addr,
    conn: Option<Connection<T>>,
}

impl<T: Transport> Peripheral<T> {
    /// Creates the peripheral along with the receiving half of its event
    /// channel.
    #[must_use]
    pub fn new(
        transport: T,
        config: &Config,
        keys: Arc<dyn KeyStore>,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (hci, hci_rx) = Hci::new(transport, config.adv_interval);
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Self {
            hci,
            hci_rx,
            gap: Gap::new(config.single_eir_write),
            gatt: Gatt::new(config.name.as_str()),
            keys,
            events: tx,
            addr: Addr::default(),
            conn: None,
        };
        (this, rx)
    }

    /// Handles one inbound HCI packet from the transport.
    pub fn on_data(&mut self, pkt: &[u8]) -> hci::Result<()> {
        self.hci.on_data(pkt)?;
        self.drain();
        Ok(())
    }

    /// Checks for device up/down transitions. Must be called once per
    /// second.
    pub fn tick(&mut self) -> hci::Result<()> {
        self.hci.poll_dev_up()?;
        self.drain();
        Ok(())
    }

    /// Drives the peripheral from a channel of inbound HCI packets until the
    /// sending half is dropped.
    pub async fn run(mut self, mut pkts: mpsc::UnboundedReceiver<Vec<u8>>) -> hci::Result<()> {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                pkt = pkts.recv() => match pkt {
                    Some(pkt) => self.on_data(&pkt)?,
                    None => return Ok(()),
                },
                _ = tick.tick() => self.tick()?,
            }
        }
    }

    /// Starts connectable advertising with the configured name in the scan
    /// response and `uuids` in the advertisement.
    pub fn start_advertising(&mut self, name: &str, uuids: &[Uuid]) -> gap::Result<()> {
        self.gap.start_advertising(&mut self.hci, name, uuids)
    }

    /// Starts advertising an iBeacon frame with the given beacon payload.
    pub fn start_advertising_ibeacon(&mut self, data: &[u8]) -> gap::Result<()> {
        self.gap.start_advertising_ibeacon(&mut self.hci, data)
    }

    /// Starts advertising with caller-supplied advertisement and scan
    /// response buffers.
    pub fn start_advertising_with_eir_data(
        &mut self,
        ad: &AdvData,
        srd: &AdvData,
    ) -> gap::Result<()> {
        self.gap.start_advertising_with_eir_data(&mut self.hci, ad, srd)
    }

    /// Stops advertising.
    pub fn stop_advertising(&mut self) -> gap::Result<()> {
        self.gap.stop_advertising(&mut self.hci)
    }

    /// Replaces the attribute database.
    pub fn set_services(&mut self, services: &[Service]) {
        self.gatt.set_services(services);
        self.emit(Event::ServicesSet);
    }

    /// Closes the active connection.
    pub fn disconnect(&mut self) -> hci::Result<()> {
        if let Some(ref conn) = self.conn {
            let handle = conn.handle;
            (self.hci).disconnect(handle, Status::RemoteUserTerminatedConnection)?;
        }
        Ok(())
    }

    /// Requests the RSSI of the active connection, reported later as
    /// [`Event::RssiUpdate`].
    pub fn update_rssi(&mut self) -> hci::Result<()> {
        if let Some(ref conn) = self.conn {
            let handle = conn.handle;
            self.hci.read_rssi(handle)?;
        }
        Ok(())
    }

    fn drain(&mut self) {
        while let Ok(evt) = self.hci_rx.try_recv() {
            self.route(evt);
        }
    }

    fn route(&mut self, evt: hci::Event) {
        use hci::Event::*;
        match evt {
            State(s) => {
                match s {
                    AdapterState::Unauthorized => {
                        warn!("Raw HCI access denied, adapter is unusable");
                    }
                    AdapterState::Unsupported => {
                        warn!("Controller does not support Bluetooth LE");
                    }
                    _ => {}
                }
                self.emit(Event::StateChange(s));
            }
            Address(addr) => {
                self.addr = Addr::Public(addr);
                self.emit(Event::AddressChange(addr));
            }
            LocalVersion(v) => {
                if v.manufacturer == MTU_QUIRK_MANUFACTURER {
                    self.gatt.set_max_mtu(crate::att::DEFAULT_MTU);
                }
            }
            AdvertiseEnableSet(status) => match self.gap.on_advertise_enable_set(status) {
                Some(AdvEvent::Started(err)) => self.emit(Event::AdvertisingStart(err)),
                Some(AdvEvent::Stopped) => self.emit(Event::AdvertisingStop),
                None => {}
            },
            LeConnComplete(cc) => self.on_conn_complete(&cc),
            DisconnComplete { handle, reason } => self.on_disconn_complete(handle, reason),
            EncryptChange { handle, encrypted } => {
                let Some(conn) = self.conn_mut(handle) else { return };
                if let Err(e) = conn.smp.on_encrypt_change(&conn.tx, encrypted) {
                    warn!("Key distribution failed: {e}");
                }
                self.gatt.set_encrypted(encrypted);
            }
            LtkNegReply { handle } => {
                let Some(conn) = self.conn_mut(handle) else { return };
                if let Err(e) = conn.smp.on_ltk_neg_reply(&conn.tx) {
                    warn!("Pairing failed: {e}");
                }
            }
            RssiRead { handle, rssi } => {
                if self.conn_mut(handle).is_some() {
                    self.emit(Event::RssiUpdate(rssi));
                }
            }
            AclData { handle, cid, data } => self.on_acl_data(handle, cid, &data),
            _ => {}
        }
    }

    fn on_conn_complete(&mut self, cc: &hci::LeConnComplete) {
        if cc.status != Status::Success {
            debug!("Failed connection from {}: {}", cc.peer, cc.status);
            return;
        }
        if cc.role != Role::Peripheral {
            debug!("Ignoring connection with central role");
            return;
        }
        self.gatt.reset();
        self.conn = Some(Connection {
            handle: cc.handle,
            peer: cc.peer,
            tx: AclTx::new(self.hci.transport(), cc.handle),
            smp: Smp::new(Arc::clone(&self.keys), self.addr, cc.peer),
        });
        self.emit(Event::Accept(cc.peer));
    }

    fn on_disconn_complete(&mut self, handle: ConnHandle, reason: Status) {
        let Some(conn) = self.conn_mut(handle) else { return };
        let peer = conn.peer;
        debug!("Disconnected from {peer}: {reason}");
        self.conn = None;
        self.gatt.reset();
        self.emit(Event::Disconnect(peer));
        if self.gap.is_advertising() {
            if let Err(e) = self.gap.restart_advertising(&mut self.hci) {
                warn!("Failed to restart advertising: {e}");
            }
        }
    }

    fn on_acl_data(&mut self, handle: ConnHandle, cid: Cid, data: &[u8]) {
        let Some(conn) = self.conn.as_mut().filter(|c| c.handle == handle) else {
            debug!("Ignoring ACL data for unknown {handle}");
            return;
        };
        match cid {
            Cid::ATT => match self.gatt.on_data(&conn.tx, data) {
                Ok(Some(ServerEvent::MtuChange(mtu))) => self.emit(Event::MtuChange(mtu)),
                Ok(None) => {}
                Err(e) => warn!("ATT response failed: {e}"),
            },
            Cid::SMP => match conn.smp.on_data(&conn.tx, data) {
                Ok(()) => {}
                Err(smp::Error::Host(e)) => warn!("SMP response failed: {e}"),
                Err(e) => warn!("Pairing failed: {e}"),
            },
            _ => debug!("Ignoring data on unhandled channel {cid}"),
        }
    }

    /// Returns the active connection if `handle` refers to it.
    fn conn_mut(&mut self, handle: ConnHandle) -> Option<&mut Connection<T>> {
        self.conn.as_mut().filter(|c| c.handle == handle)
    }

    fn emit(&self, evt: Event) {
        let _ = self.events.send(evt);
    }
}

#[cfg(test)]
mod tests;
