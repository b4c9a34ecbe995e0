use matches::assert_matches;
use parking_lot::Mutex;

use crate::hci::ConnHandle;
use crate::host::fake::Fake;
use crate::le::RawAddr;

use super::*;

/// Recording key store.
#[derive(Debug, Default)]
struct Keys(Mutex<Vec<(Addr, [u8; 16], u16, [u8; 8])>>);

impl KeyStore for Keys {
    fn add_long_term_key(&self, peer: Addr, key: Key, ediv: u16, rand: [u8; 8]) {
        self.0.lock().push((peer, key.to_le_bytes(), ediv, rand));
    }
}

const LOCAL: [u8; 6] = [0xB6, 0xB5, 0xB4, 0xB3, 0xB2, 0xB1];
const PEER: [u8; 6] = [0xA6, 0xA5, 0xA4, 0xA3, 0xA2, 0xA1];
const PREQ: [u8; 7] = [0x01, 0x04, 0x00, 0x01, 0x10, 0x03, 0x03];

struct Fixture {
    smp: Smp,
    tx: AclTx<Fake>,
    t: Arc<Fake>,
    keys: Arc<Keys>,
    peer: Addr,
}

fn fixture() -> Fixture {
    let t = Arc::new(Fake::default());
    let tx = AclTx::new(Arc::clone(&t), ConnHandle::new(0x0040));
    let keys = Arc::new(Keys::default());
    let peer = Addr::Random(RawAddr::from(PEER));
    let smp = Smp::new(
        Arc::clone(&keys) as Arc<dyn KeyStore>,
        Addr::Public(RawAddr::from(LOCAL)),
        peer,
    );
    Fixture { smp, tx, t, keys, peer }
}

/// Removes and returns all sent SMP PDUs, without the ACL framing.
fn sent(f: &Fixture) -> Vec<Vec<u8>> {
    (f.t.take_writes().iter()).map(|pkt| pkt[9..].to_vec()).collect()
}

/// Runs the exchange up to and including the peer's Pairing Random, using
/// `mr` as the initiator random value. Returns the local random value
/// revealed in the response.
fn pair(f: &mut Fixture, mr: &Nonce) -> Nonce {
    f.smp.on_data(&f.tx, &PREQ).unwrap();
    let pres: [u8; 7] = sent(f)[0].as_slice().try_into().unwrap();
    let tk = Key::default();
    let mcnf = tk.c1(mr, &PREQ, &pres, 0x01, &PEER, 0x00, &LOCAL);
    let mut pdu = vec![0x03];
    pdu.extend(mcnf.to_le_bytes());
    f.smp.on_data(&f.tx, &pdu).unwrap();
    let scnf = sent(f).remove(0);
    assert_eq!(scnf[0], 0x03);
    let mut pdu = vec![0x04];
    pdu.extend(mr.to_le_bytes());
    f.smp.on_data(&f.tx, &pdu).unwrap();
    let srand = sent(f).remove(0);
    assert_eq!(srand[0], 0x04);
    let sr = Nonce::from_le_bytes(srand[1..].try_into().unwrap());
    // The revealed random must reproduce the confirm value sent earlier.
    let want = tk.c1(&sr, &PREQ, &pres, 0x01, &PEER, 0x00, &LOCAL);
    assert_eq!(want.to_le_bytes().as_slice(), &scnf[1..]);
    sr
}

#[test]
fn pairing_response_capabilities() {
    let mut f = fixture();
    f.smp.on_data(&f.tx, &PREQ).unwrap();
    assert_eq!(sent(&f), [[0x02, 0x03, 0x00, 0x01, 0x10, 0x00, 0x01]]);
}

#[test]
fn just_works_pairing() {
    let mut f = fixture();
    let mr = Nonce::from_le_bytes([0x11; 16]);
    let sr = pair(&mut f, &mr);
    let stk = Key::default().s1(&sr, &mr);
    assert_eq!(
        *f.keys.0.lock(),
        [(f.peer, stk.to_le_bytes(), 0, [0; 8])]
    );
    // Keys are distributed once the link is encrypted, in order.
    f.smp.on_encrypt_change(&f.tx, true).unwrap();
    let pdus = sent(&f);
    assert_eq!(pdus.len(), 2);
    assert_eq!(pdus[0][0], 0x06);
    assert_eq!(pdus[0][1..], stk.to_le_bytes());
    assert_eq!(pdus[1], [0x07, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    // And only once.
    f.smp.on_encrypt_change(&f.tx, true).unwrap();
    assert!(sent(&f).is_empty());
}

#[test]
fn unencrypted_link_gets_no_keys() {
    let mut f = fixture();
    pair(&mut f, &Nonce::from_le_bytes([0x22; 16]));
    f.smp.on_encrypt_change(&f.tx, false).unwrap();
    assert!(sent(&f).is_empty());
}

#[test]
fn confirm_mismatch() {
    let mut f = fixture();
    f.smp.on_data(&f.tx, &PREQ).unwrap();
    let mut pdu = vec![0x03];
    pdu.extend([0xEE; 16]);
    f.smp.on_data(&f.tx, &pdu).unwrap();
    sent(&f);
    // Reveal a random value that cannot match the bogus confirm.
    let mut pdu = vec![0x04];
    pdu.extend([0x33; 16]);
    let e = f.smp.on_data(&f.tx, &pdu).unwrap_err();
    assert_matches!(e, Error::Local(Reason::ConfirmValueFailed));
    assert_eq!(sent(&f), [[0x05, 0x03]]);
    assert!(f.keys.0.lock().is_empty());
    // The failed session never distributes keys.
    f.smp.on_encrypt_change(&f.tx, true).unwrap();
    assert!(sent(&f).is_empty());
}

#[test]
fn peer_failure_is_terminal() {
    let mut f = fixture();
    pair(&mut f, &Nonce::from_le_bytes([0x44; 16]));
    let e = f.smp.on_data(&f.tx, &[0x05, 0x03]).unwrap_err();
    assert_matches!(e, Error::Remote(Reason::ConfirmValueFailed));
    f.smp.on_encrypt_change(&f.tx, true).unwrap();
    assert!(sent(&f).is_empty());
    // A fresh Pairing Request restarts cleanly.
    f.smp.on_data(&f.tx, &PREQ).unwrap();
    assert_eq!(sent(&f), [[0x02, 0x03, 0x00, 0x01, 0x10, 0x00, 0x01]]);
}

#[test]
fn ltk_rejection_fails_pairing() {
    let mut f = fixture();
    pair(&mut f, &Nonce::from_le_bytes([0x55; 16]));
    let e = f.smp.on_ltk_neg_reply(&f.tx).unwrap_err();
    assert_matches!(e, Error::Local(Reason::Unspecified));
    assert_eq!(sent(&f), [[0x05, 0x08]]);
    f.smp.on_encrypt_change(&f.tx, true).unwrap();
    assert!(sent(&f).is_empty());
}

#[test]
fn malformed_pdus_are_ignored() {
    let mut f = fixture();
    f.smp.on_data(&f.tx, &[]).unwrap();
    f.smp.on_data(&f.tx, &[0x0B]).unwrap();
    f.smp.on_data(&f.tx, &[0x01, 0x04]).unwrap();
    f.smp.on_data(&f.tx, &[0x03, 0x01, 0x02]).unwrap();
    assert!(sent(&f).is_empty());
}
