use std::time::Duration;

use matches::assert_matches;
use tokio::sync::mpsc;

use crate::acl::Cid;
use crate::host::fake::Fake;
use crate::le::Addr;

use super::*;

fn new_hci() -> (Hci<Fake>, mpsc::UnboundedReceiver<Event>) {
    Hci::new(Fake::default(), Duration::from_millis(100))
}

/// Brings the device up and discards the setup traffic.
fn up(hci: &mut Hci<Fake>) {
    let t = hci.transport();
    t.set_up(true);
    hci.poll_dev_up().unwrap();
    t.take_writes();
    t.take_filters();
}

fn cmd_complete(opcode: Opcode, status: u8, params: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0x04, 0x0E, 4 + params.len() as u8, 0x01];
    pkt.extend_from_slice(&opcode.raw().to_le_bytes());
    pkt.push(status);
    pkt.extend_from_slice(params);
    pkt
}

#[test]
fn startup_command_sequence() {
    let (mut hci, _rx) = new_hci();
    let t = hci.transport();
    t.set_up(true);
    hci.poll_dev_up().unwrap();

    let filters = t.take_filters();
    assert_eq!(filters.len(), 1);
    assert_eq!(
        filters[0],
        [0x14, 0, 0, 0, 0x20, 0xC1, 0, 0, 0, 0, 0, 0x40, 0, 0]
    );

    let w = t.take_writes();
    assert_eq!(w.len(), 6);
    assert_eq!(
        w[0],
        [0x01, 0x01, 0x0C, 0x08, 0xFF, 0xFF, 0xFB, 0xFF, 0x07, 0xF8, 0xBF, 0x3D]
    );
    assert_eq!(w[1], [0x01, 0x01, 0x20, 0x08, 0x1F, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(w[2], [0x01, 0x01, 0x10, 0x00]);
    assert_eq!(w[3], [0x01, 0x6D, 0x0C, 0x02, 0x01, 0x00]);
    assert_eq!(w[4], [0x01, 0x6C, 0x0C, 0x00]);
    assert_eq!(w[5], [0x01, 0x09, 0x10, 0x00]);

    // Repeated polls without a state change are quiet
    hci.poll_dev_up().unwrap();
    assert!(t.take_writes().is_empty());
}

#[test]
fn dev_down_powers_off() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    hci.transport().set_up(false);
    hci.poll_dev_up().unwrap();
    assert_matches!(rx.try_recv(), Ok(Event::State(AdapterState::PoweredOff)));
    assert_eq!(hci.state(), AdapterState::PoweredOff);
}

#[test]
fn local_version_enables_advertising() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    let params = [0x06, 0x00, 0x00, 0x09, 0x5D, 0x00, 0x00, 0x00];
    hci.on_data(&cmd_complete(Opcode::READ_LOCAL_VERSION, 0, &params))
        .unwrap();

    let t = hci.transport();
    let w = t.take_writes();
    assert_eq!(w.len(), 2);
    assert_eq!(w[0], [0x01, 0x0A, 0x20, 0x01, 0x00]);
    // 100 ms interval is 160 (0x00A0) ticks of 0.625 ms
    assert_eq!(
        w[1],
        [0x01, 0x06, 0x20, 0x0F, 0xA0, 0x00, 0xA0, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x07, 0]
    );

    assert_matches!(
        rx.try_recv(),
        Ok(Event::LocalVersion(LocalVersion {
            hci_ver: 0x06,
            manufacturer: 93,
            ..
        }))
    );

    // Advertising setup runs only once
    hci.on_data(&cmd_complete(Opcode::READ_LOCAL_VERSION, 0, &params))
        .unwrap();
    assert!(t.take_writes().is_empty());
}

#[test]
fn old_controller_is_unsupported() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    let params = [0x05, 0x00, 0x00, 0x05, 0x0F, 0x00, 0x00, 0x00];
    hci.on_data(&cmd_complete(Opcode::READ_LOCAL_VERSION, 0, &params))
        .unwrap();
    assert!(hci.transport().take_writes().is_empty());
    assert_matches!(rx.try_recv(), Ok(Event::State(AdapterState::Unsupported)));
    assert_matches!(rx.try_recv(), Ok(Event::LocalVersion(_)));
}

#[test]
fn advertising_parameters_power_on() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    hci.on_data(&cmd_complete(Opcode::LE_SET_ADVERTISING_PARAMETERS, 0, &[]))
        .unwrap();
    assert_matches!(rx.try_recv(), Ok(Event::State(AdapterState::PoweredOn)));
    assert_matches!(
        rx.try_recv(),
        Ok(Event::AdvertisingParametersSet(Status::Success))
    );
    assert_eq!(hci.state(), AdapterState::PoweredOn);
}

#[test]
fn bd_addr_is_wire_order() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    let addr = [0xB6, 0xB5, 0xB4, 0xB3, 0xB2, 0xB1];
    hci.on_data(&cmd_complete(Opcode::READ_BD_ADDR, 0, &addr))
        .unwrap();
    match rx.try_recv() {
        Ok(Event::Address(a)) => assert_eq!(a.to_bytes(), addr),
        e => panic!("unexpected event: {e:?}"),
    }
}

#[test]
fn rssi_read() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    hci.read_rssi(ConnHandle::new(0x0040)).unwrap();
    assert_eq!(
        hci.transport().pop_write().unwrap(),
        [0x01, 0x05, 0x14, 0x02, 0x40, 0x00]
    );
    hci.on_data(&cmd_complete(Opcode::READ_RSSI, 0, &[0x40, 0x00, 0xC0]))
        .unwrap();
    assert_matches!(
        rx.try_recv(),
        Ok(Event::RssiRead { handle, rssi: -64 }) if handle == ConnHandle::new(0x0040)
    );
}

#[test]
fn connection_complete_decode() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    #[rustfmt::skip]
    let pkt = [
        0x04, 0x3E, 0x13, 0x01, 0x00, 0x40, 0x00, 0x01, 0x01,
        0xB6, 0xB5, 0xB4, 0xB3, 0xB2, 0xB1,
        0x28, 0x00, 0x00, 0x00, 0xC8, 0x00, 0x01,
    ];
    hci.on_data(&pkt).unwrap();
    match rx.try_recv() {
        Ok(Event::LeConnComplete(cn)) => {
            assert_eq!(cn.status, Status::Success);
            assert_eq!(cn.handle, ConnHandle::new(0x0040));
            assert_eq!(cn.role, Role::Peripheral);
            assert_matches!(cn.peer, Addr::Random(_));
            assert_eq!(cn.interval, Duration::from_millis(50));
            assert_eq!(cn.latency, 0);
            assert_eq!(cn.timeout, Duration::from_secs(2));
        }
        e => panic!("unexpected event: {e:?}"),
    }
}

#[test]
fn disconnection_complete_decode() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    hci.on_data(&[0x04, 0x05, 0x04, 0x00, 0x40, 0x00, 0x13])
        .unwrap();
    assert_matches!(
        rx.try_recv(),
        Ok(Event::DisconnComplete {
            reason: Status::RemoteUserTerminatedConnection,
            ..
        })
    );
}

#[test]
fn encryption_change_decode() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    hci.on_data(&[0x04, 0x08, 0x04, 0x00, 0x40, 0x00, 0x01])
        .unwrap();
    assert_matches!(
        rx.try_recv(),
        Ok(Event::EncryptChange {
            encrypted: true,
            ..
        })
    );
}

#[test]
fn truncated_event_is_rejected() {
    let (mut hci, _rx) = new_hci();
    up(&mut hci);
    let r = hci.on_data(&[0x04, 0x05, 0x04, 0x00, 0x40]);
    assert_matches!(r, Err(Error::InvalidEvent(_)));
}

#[test]
fn acl_complete_in_one_fragment() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    #[rustfmt::skip]
    let pkt = [
        0x02, 0x40, 0x20, 0x07, 0x00, 0x03, 0x00, 0x04, 0x00,
        0xAA, 0xBB, 0xCC,
    ];
    hci.on_data(&pkt).unwrap();
    match rx.try_recv() {
        Ok(Event::AclData { handle, cid, data }) => {
            assert_eq!(handle, ConnHandle::new(0x0040));
            assert_eq!(cid, Cid::ATT);
            assert_eq!(data, [0xAA, 0xBB, 0xCC]);
        }
        e => panic!("unexpected event: {e:?}"),
    }
}

#[test]
fn acl_reassembly_across_fragments() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    #[rustfmt::skip]
    let start = [
        0x02, 0x40, 0x20, 0x06, 0x00, 0x04, 0x00, 0x06, 0x00,
        0xAA, 0xBB,
    ];
    hci.on_data(&start).unwrap();
    assert_matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Empty));

    hci.on_data(&[0x02, 0x40, 0x10, 0x02, 0x00, 0xCC, 0xDD])
        .unwrap();
    match rx.try_recv() {
        Ok(Event::AclData { cid, data, .. }) => {
            assert_eq!(cid, Cid::SMP);
            assert_eq!(data, [0xAA, 0xBB, 0xCC, 0xDD]);
        }
        e => panic!("unexpected event: {e:?}"),
    }
}

#[test]
fn acl_unknown_continuation_is_dropped() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    hci.on_data(&[0x02, 0x41, 0x10, 0x02, 0x00, 0xCC, 0xDD])
        .unwrap();
    assert_matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Empty));
}

#[test]
fn disconnect_drops_partial_reassembly() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    #[rustfmt::skip]
    let start = [
        0x02, 0x40, 0x20, 0x06, 0x00, 0x04, 0x00, 0x04, 0x00,
        0xAA, 0xBB,
    ];
    hci.on_data(&start).unwrap();
    hci.on_data(&[0x04, 0x05, 0x04, 0x00, 0x40, 0x00, 0x13])
        .unwrap();
    assert_matches!(rx.try_recv(), Ok(Event::DisconnComplete { .. }));

    hci.on_data(&[0x02, 0x40, 0x10, 0x02, 0x00, 0xCC, 0xDD])
        .unwrap();
    assert_matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Empty));
}

#[test]
fn not_permitted_reports_unauthorized() {
    let (mut hci, mut rx) = new_hci();
    up(&mut hci);
    hci.transport().fail_next(host::Error::NotPermitted);
    assert!(hci.read_bd_addr().is_err());
    assert_matches!(rx.try_recv(), Ok(Event::State(AdapterState::Unauthorized)));
    assert_eq!(hci.state(), AdapterState::Unauthorized);
}

#[test]
fn eir_data_is_zero_padded() {
    let (mut hci, _rx) = new_hci();
    up(&mut hci);
    hci.set_advertising_data(&[0x02, 0x01, 0x06]).unwrap();
    let w = hci.transport().pop_write().unwrap();
    assert_eq!(w.len(), 4 + 32);
    assert_eq!(&w[..4], [0x01, 0x08, 0x20, 0x20]);
    assert_eq!(w[4], 3);
    assert_eq!(&w[5..8], [0x02, 0x01, 0x06]);
    assert!(w[8..].iter().all(|&b| b == 0));
}

#[test]
fn interval_ticks() {
    assert_eq!(ticks_625us(Duration::from_millis(100)), 160);
    assert_eq!(ticks_625us(Duration::from_micros(625)), 1);
    assert_eq!(ticks_625us(Duration::from_secs(3600)), u16::MAX);
}
