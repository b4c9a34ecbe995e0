use matches::assert_matches;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

use bluelet_crypto::Key;

use crate::host::fake::Fake;

use super::*;

#[derive(Debug, Default)]
struct NoKeys;

impl KeyStore for NoKeys {
    fn add_long_term_key(&self, _peer: Addr, _key: Key, _ediv: u16, _rand: [u8; 8]) {}
}

/// LE Connection Complete for handle 0x0040, peripheral role, random peer.
#[rustfmt::skip]
const CONN: [u8; 22] = [
    0x04, 0x3E, 0x13, 0x01, 0x00, 0x40, 0x00, 0x01, 0x01,
    0xB6, 0xB5, 0xB4, 0xB3, 0xB2, 0xB1,
    0x28, 0x00, 0x00, 0x00, 0xC8, 0x00, 0x01,
];

/// Disconnection Complete for handle 0x0040, remote user termination.
const DISC: [u8; 7] = [0x04, 0x05, 0x04, 0x00, 0x40, 0x00, 0x13];

struct Fixture {
    p: Peripheral<Fake>,
    rx: UnboundedReceiver<Event>,
    t: Arc<Fake>,
}

fn fixture() -> Fixture {
    let (mut p, rx) = Peripheral::new(Fake::default(), &Config::default(), Arc::new(NoKeys));
    let t = p.hci.transport();
    t.set_up(true);
    p.tick().unwrap();
    t.take_writes();
    t.take_filters();
    Fixture { p, rx, t }
}

fn cmd_complete(opcode: u16, status: u8, params: &[u8]) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    let mut pkt = vec![0x04, 0x0E, 4 + params.len() as u8, 0x01];
    pkt.extend_from_slice(&opcode.to_le_bytes());
    pkt.push(status);
    pkt.extend_from_slice(params);
    pkt
}

/// Complete ACL packet for handle 0x0040 carrying one PDU on `cid`.
fn acl(cid: u16, pdu: &[u8]) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    let n = pdu.len() as u16;
    let mut pkt = vec![0x02, 0x40, 0x20];
    pkt.extend_from_slice(&(n + 4).to_le_bytes());
    pkt.extend_from_slice(&n.to_le_bytes());
    pkt.extend_from_slice(&cid.to_le_bytes());
    pkt.extend_from_slice(pdu);
    pkt
}

#[test]
fn accept_and_disconnect() {
    let mut f = fixture();
    f.p.on_data(&CONN).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::Accept(Addr::Random(_))));

    // ATT traffic reaches the server and MTU changes surface
    f.p.on_data(&acl(0x0004, &[0x02, 0x00, 0x02])).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::MtuChange(256)));
    assert_eq!(f.t.pop_write().unwrap()[9..], [0x03, 0x00, 0x01]);

    f.p.on_data(&DISC).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::Disconnect(Addr::Random(_))));

    // Traffic for the stale handle is dropped
    f.p.on_data(&acl(0x0004, &[0x02, 0x00, 0x02])).unwrap();
    assert_matches!(f.rx.try_recv(), Err(TryRecvError::Empty));
    assert!(f.t.take_writes().is_empty());
}

#[test]
fn advertising_restarts_once_after_disconnect() {
    let mut f = fixture();
    f.p.start_advertising("ping", &[]).unwrap();
    f.t.take_writes();
    f.p.on_data(&cmd_complete(0x200A, 0, &[])).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::AdvertisingStart(None)));

    f.p.on_data(&CONN).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::Accept(_)));
    f.p.on_data(&DISC).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::Disconnect(_)));
    // Exactly one advertise enable, nothing else
    assert_eq!(f.t.take_writes(), [[0x01, 0x0A, 0x20, 0x01, 0x01]]);
}

#[test]
fn raw_eir_data_advertising() {
    let mut f = fixture();
    let mut ad = AdvData::new();
    ad.general_discoverable();
    f.p.start_advertising_with_eir_data(&ad, &AdvData::new()).unwrap();
    let ops: Vec<u16> = (f.t.take_writes().iter())
        .map(|pkt| u16::from_le_bytes([pkt[1], pkt[2]]))
        .collect();
    assert_eq!(ops, [0x2009, 0x2008, 0x200A, 0x2009, 0x2008]);
    f.p.on_data(&cmd_complete(0x200A, 0, &[])).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::AdvertisingStart(None)));
}

#[test]
fn ibeacon_advertising() {
    let mut f = fixture();
    f.p.start_advertising_ibeacon(&[0xAA; 21]).unwrap();
    let w = f.t.take_writes();
    assert_eq!(u16::from_le_bytes([w[1][1], w[1][2]]), 0x2008);
    // Flags plus a 27-byte manufacturer record
    assert_eq!(w[1][4], 30);
    assert_eq!(w[1][8..14], [0x1A, 0xFF, 0x4C, 0x00, 0x02, 0x15]);
}

#[test]
fn stopped_advertising_is_not_restarted() {
    let mut f = fixture();
    f.p.on_data(&CONN).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::Accept(_)));
    f.p.on_data(&DISC).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::Disconnect(_)));
    assert!(f.t.take_writes().is_empty());
}

#[test]
fn central_role_connection_is_ignored() {
    let mut f = fixture();
    let mut pkt = CONN;
    pkt[7] = 0x00;
    f.p.on_data(&pkt).unwrap();
    assert_matches!(f.rx.try_recv(), Err(TryRecvError::Empty));
    f.p.on_data(&acl(0x0004, &[0x02, 0x00, 0x02])).unwrap();
    assert!(f.t.take_writes().is_empty());
}

#[test]
fn rssi_update() {
    let mut f = fixture();
    // No connection, no command
    f.p.update_rssi().unwrap();
    assert!(f.t.take_writes().is_empty());

    f.p.on_data(&CONN).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::Accept(_)));
    f.p.update_rssi().unwrap();
    assert_eq!(
        f.t.pop_write().unwrap(),
        [0x01, 0x05, 0x14, 0x02, 0x40, 0x00]
    );
    f.p.on_data(&cmd_complete(0x1405, 0, &[0x40, 0x00, 0xC0]))
        .unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::RssiUpdate(-64)));
}

#[test]
fn quirky_manufacturer_caps_mtu() {
    let mut f = fixture();
    let params = [0x06, 0x00, 0x00, 0x09, 0x5D, 0x00, 0x00, 0x00];
    f.p.on_data(&cmd_complete(0x1001, 0, &params)).unwrap();
    f.t.take_writes();
    f.p.on_data(&CONN).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::Accept(_)));
    f.p.on_data(&acl(0x0004, &[0x02, 0x00, 0x02])).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::MtuChange(23)));
}

#[test]
fn set_services_reports_completion() {
    let mut f = fixture();
    f.p.set_services(&[]);
    assert_matches!(f.rx.try_recv(), Ok(Event::ServicesSet));
}

#[test]
fn adapter_state_and_address_are_forwarded() {
    let mut f = fixture();
    let addr = [0xB6, 0xB5, 0xB4, 0xB3, 0xB2, 0xB1];
    f.p.on_data(&cmd_complete(0x1009, 0, &addr)).unwrap();
    match f.rx.try_recv() {
        Ok(Event::AddressChange(a)) => assert_eq!(a.to_bytes(), addr),
        e => panic!("unexpected event: {e:?}"),
    }
    f.t.set_up(false);
    f.p.tick().unwrap();
    assert_matches!(
        f.rx.try_recv(),
        Ok(Event::StateChange(AdapterState::PoweredOff))
    );
}

#[test]
fn smp_traffic_reaches_the_security_manager() {
    let mut f = fixture();
    f.p.on_data(&CONN).unwrap();
    assert_matches!(f.rx.try_recv(), Ok(Event::Accept(_)));
    f.p.on_data(&acl(0x0006, &[0x01, 0x04, 0x00, 0x01, 0x10, 0x03, 0x03]))
        .unwrap();
    let w = f.t.pop_write().unwrap();
    assert_eq!(w[7..9], [0x06, 0x00]);
    assert_eq!(w[9..], [0x02, 0x03, 0x00, 0x01, 0x10, 0x00, 0x01]);
}
