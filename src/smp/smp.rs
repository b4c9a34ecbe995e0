use super::*;

/// Fixed Pairing Response: NoInputNoOutput, no out-of-band data, bonding
/// without MITM protection, 16-byte maximum key size, no initiator key
/// distribution, responder distributes the encryption key only
/// ([Vol 3] Part H, Section 3.5.2).
const PAIRING_RSP: [u8; 7] = [0x02, 0x03, 0x00, 0x01, 0x10, 0x00, 0x01];

/// Pairing session progress.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum State {
    #[default]
    Idle,
    /// Capabilities exchanged, waiting for the peer confirm value.
    Requested,
    /// Confirm values exchanged, waiting for the peer random value.
    Confirmed,
    /// Short-term key derived, key distribution pending link encryption.
    Keyed,
    Failed,
}

/// Responder-side Security Manager for one connection.
#[derive(Debug)]
pub struct Smp {
    keys: Arc<dyn KeyStore>,
    local: Addr,
    peer: Addr,
    state: State,
    /// Pairing Request PDU in transmission order, code byte first.
    preq: [u8; 7],
    /// Pairing Response PDU in transmission order, code byte first.
    pres: [u8; 7],
    /// Temporary key, fixed to zero for Just Works.
    tk: Key,
    /// Local random value revealed after confirm exchange.
    r: Nonce,
    /// Peer confirm value awaiting verification.
    pcnf: Confirm,
    stk: Option<Key>,
    distributed: bool,
}

impl Smp {
    /// Creates a pairing state machine for the connection between `local`
    /// and `peer`.
    #[must_use]
    pub fn new(keys: Arc<dyn KeyStore>, local: Addr, peer: Addr) -> Self {
        Self {
            keys,
            local,
            peer,
            state: State::default(),
            preq: [0; 7],
            pres: [0; 7],
            tk: Key::default(),
            r: Nonce::default(),
            pcnf: Confirm::default(),
            stk: None,
            distributed: false,
        }
    }

    /// Handles one inbound SMP PDU. A returned [`Error::Local`] or
    /// [`Error::Remote`] marks the end of the pairing session; a new Pairing
    /// Request starts a fresh one.
    pub fn on_data<T: Transport>(&mut self, tx: &AclTx<T>, pdu: &[u8]) -> Result<()> {
        let mut p = pdu.unpack();
        let code = p.u8();
        if !p.is_ok() {
            warn!("Empty SMP PDU from {}", self.peer);
            return Ok(());
        }
        let Ok(code) = Code::try_from(code) else {
            debug!("Ignoring unknown SMP command {code:#04X}");
            return Ok(());
        };
        match code {
            Code::PairingRequest => self.on_pairing_request(tx, p.as_ref()),
            Code::PairingConfirm => self.on_pairing_confirm(tx, p.as_ref()),
            Code::PairingRandom => self.on_pairing_random(tx, p.as_ref()),
            Code::PairingFailed => self.on_pairing_failed(p.as_ref()),
            Code::PairingResponse | Code::EncryptionInformation | Code::MasterIdentification => {
                debug!("Ignoring {code} from initiator");
                Ok(())
            }
        }
    }

    /// Handles a link encryption change. Key distribution happens on the
    /// first transition to an encrypted link after a successful pairing.
    pub fn on_encrypt_change<T: Transport>(&mut self, tx: &AclTx<T>, encrypted: bool) -> Result<()> {
        if !encrypted || self.distributed || self.state != State::Keyed {
            return Ok(());
        }
        let Some(stk) = self.stk.clone() else {
            return Ok(());
        };
        self.distributed = true;
        debug!("Distributing encryption key to {}", self.peer);
        self.send(tx, Code::EncryptionInformation, &stk.to_le_bytes())?;
        let mut ident = StructBuf::new(10);
        // The STK carries zero EDIV and Rand values.
        ident.append().u16(0_u16).put([0; 8]);
        self.send(tx, Code::MasterIdentification, ident.as_ref())
    }

    /// Handles the controller rejecting the long-term key request for this
    /// connection.
    pub fn on_ltk_neg_reply<T: Transport>(&mut self, tx: &AclTx<T>) -> Result<()> {
        self.fail(tx, Reason::Unspecified)
    }

    fn on_pairing_request<T: Transport>(&mut self, tx: &AclTx<T>, p: &[u8]) -> Result<()> {
        let Ok(caps) = <[u8; 6]>::try_from(p) else {
            warn!("Malformed {} from {}", Code::PairingRequest, self.peer);
            return Ok(());
        };
        debug!("Pairing request from {}", self.peer);
        self.preq[0] = Code::PairingRequest.into();
        self.preq[1..].copy_from_slice(&caps);
        self.pres = PAIRING_RSP;
        self.stk = None;
        self.distributed = false;
        self.state = State::Requested;
        tx.write(Cid::SMP, &self.pres)?;
        Ok(())
    }

    fn on_pairing_confirm<T: Transport>(&mut self, tx: &AclTx<T>, p: &[u8]) -> Result<()> {
        let Ok(v) = <[u8; 16]>::try_from(p) else {
            warn!("Malformed {} from {}", Code::PairingConfirm, self.peer);
            return Ok(());
        };
        self.pcnf = Confirm::from_le_bytes(v);
        self.r = Nonce::new();
        let cnf = self.confirm(&self.r);
        self.state = State::Confirmed;
        self.send(tx, Code::PairingConfirm, &cnf.to_le_bytes())
    }

    fn on_pairing_random<T: Transport>(&mut self, tx: &AclTx<T>, p: &[u8]) -> Result<()> {
        let Ok(v) = <[u8; 16]>::try_from(p) else {
            warn!("Malformed {} from {}", Code::PairingRandom, self.peer);
            return Ok(());
        };
        let peer_r = Nonce::from_le_bytes(v);
        if self.confirm(&peer_r) != self.pcnf {
            warn!("Pairing confirm mismatch for {}", self.peer);
            return self.fail(tx, Reason::ConfirmValueFailed);
        }
        let stk = self.tk.s1(&self.r, &peer_r);
        self.keys.add_long_term_key(self.peer, stk.clone(), 0, [0; 8]);
        self.stk = Some(stk);
        self.state = State::Keyed;
        let r = self.r.to_le_bytes();
        self.send(tx, Code::PairingRandom, &r)
    }

    fn on_pairing_failed(&mut self, p: &[u8]) -> Result<()> {
        let reason = p.first().map_or(Reason::Unspecified, |&v| Reason::from(v));
        self.state = State::Failed;
        self.stk = None;
        Err(Error::Remote(reason))
    }

    /// Computes the confirm value for random `r` over the exchanged pairing
    /// PDUs and both device addresses. The peer is the initiator.
    fn confirm(&self, r: &Nonce) -> Confirm {
        self.tk.c1(
            r,
            &self.preq,
            &self.pres,
            self.peer.typ(),
            &self.peer.raw().to_bytes(),
            self.local.typ(),
            &self.local.raw().to_bytes(),
        )
    }

    /// Aborts the pairing session, notifying the peer.
    fn fail<T: Transport>(&mut self, tx: &AclTx<T>, reason: Reason) -> Result<()> {
        self.state = State::Failed;
        self.stk = None;
        self.send(tx, Code::PairingFailed, &[u8::from(reason)])?;
        Err(Error::Local(reason))
    }

    fn send<T: Transport>(&self, tx: &AclTx<T>, code: Code, payload: &[u8]) -> Result<()> {
        let mut pdu = StructBuf::new(1 + payload.len());
        pdu.append().u8(code).put(payload);
        tx.write(Cid::SMP, pdu.as_ref())?;
        Ok(())
    }
}
