use tracing::{debug, warn};

use crate::hci::{Hci, Status};
use crate::host::Transport;

use super::{AdvData, Error, Result, Uuid};

/// Advertising state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum AdvState {
    #[default]
    Idle,
    Starting,
    Started,
    Restarting,
    Stopping,
    Stopped,
}

/// Outcome of an advertising enable/disable command, reported to the
/// application by the facade.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdvEvent {
    /// Advertising was started, possibly with a controller error.
    Started(Option<Status>),
    /// Advertising was stopped.
    Stopped,
}

/// Undirected connectable advertising state machine.
///
/// All methods drive the controller through `hci` and complete asynchronously
/// when the matching command completion arrives via
/// [`Gap::on_advertise_enable_set`].
#[derive(Debug)]
pub struct Gap {
    state: AdvState,
    /// Skip the advertising data writes that precede the enable command.
    /// Some controllers only accept a single write of each data buffer.
    single_eir_write: bool,
}

impl Gap {
    #[must_use]
    pub fn new(single_eir_write: bool) -> Self {
        Self {
            state: AdvState::Idle,
            single_eir_write,
        }
    }

    /// Returns the current advertising state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> AdvState {
        self.state
    }

    /// Returns whether advertising is enabled or being enabled.
    #[inline]
    #[must_use]
    pub const fn is_advertising(&self) -> bool {
        matches!(
            self.state,
            AdvState::Starting | AdvState::Started | AdvState::Restarting
        )
    }

    /// Starts connectable advertising with the local name in the scan
    /// response and service class UUIDs in the advertisement.
    pub fn start_advertising<T: Transport>(
        &mut self,
        hci: &mut Hci<T>,
        name: &str,
        uuids: &[Uuid],
    ) -> Result<()> {
        let mut ad = AdvData::new();
        ad.general_discoverable().service_classes(uuids);
        let mut srd = AdvData::new();
        srd.local_name(false, name);
        self.start_advertising_with_eir_data(hci, &ad, &srd)
    }

    /// Starts advertising an iBeacon frame with the given beacon payload.
    pub fn start_advertising_ibeacon<T: Transport>(
        &mut self,
        hci: &mut Hci<T>,
        data: &[u8],
    ) -> Result<()> {
        let mut ad = AdvData::new();
        ad.general_discoverable().ibeacon(data);
        self.start_advertising_with_eir_data(hci, &ad, &AdvData::new())
    }

    /// Starts advertising with raw advertisement and scan response data.
    pub fn start_advertising_with_eir_data<T: Transport>(
        &mut self,
        hci: &mut Hci<T>,
        ad: &AdvData,
        srd: &AdvData,
    ) -> Result<()> {
        if ad.as_bytes().len() > 31 {
            return Err(Error::AdvDataTooLong(ad.as_bytes().len()));
        }
        if srd.as_bytes().len() > 31 {
            return Err(Error::ScanDataTooLong(srd.as_bytes().len()));
        }
        debug!("start advertising: ad={:02X?}", ad.as_bytes());
        self.state = AdvState::Starting;
        if !self.single_eir_write {
            hci.set_scan_response_data(srd.as_bytes())?;
            hci.set_advertising_data(ad.as_bytes())?;
        }
        hci.set_advertise_enable(true)?;
        hci.set_scan_response_data(srd.as_bytes())?;
        hci.set_advertising_data(ad.as_bytes())?;
        Ok(())
    }

    /// Re-enables advertising after a connection consumed the previous
    /// advertising event. Completes without an application event.
    pub fn restart_advertising<T: Transport>(&mut self, hci: &mut Hci<T>) -> Result<()> {
        debug!("restart advertising");
        self.state = AdvState::Restarting;
        Ok(hci.set_advertise_enable(true)?)
    }

    /// Stops advertising.
    pub fn stop_advertising<T: Transport>(&mut self, hci: &mut Hci<T>) -> Result<()> {
        debug!("stop advertising");
        self.state = AdvState::Stopping;
        Ok(hci.set_advertise_enable(false)?)
    }

    /// Handles an `LE_Set_Advertising_Enable` completion.
    pub(crate) fn on_advertise_enable_set(&mut self, status: Status) -> Option<AdvEvent> {
        match self.state {
            AdvState::Starting => {
                self.state = AdvState::Started;
                let err = (!status.is_ok()).then_some(status);
                if let Some(e) = err {
                    warn!("advertising start failed: {e}");
                }
                Some(AdvEvent::Started(err))
            }
            AdvState::Restarting => {
                self.state = AdvState::Started;
                None
            }
            AdvState::Stopping => {
                self.state = AdvState::Stopped;
                Some(AdvEvent::Stopped)
            }
            _ => None,
        }
    }
}
