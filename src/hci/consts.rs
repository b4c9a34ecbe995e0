use std::fmt::{Debug, Display, Formatter};

/// HCI packet indicators ([Vol 4] Part A, Section 2).
pub(crate) const COMMAND_PKT: u8 = 0x01;
pub(crate) const ACL_PKT: u8 = 0x02;
pub(crate) const EVENT_PKT: u8 = 0x04;

/// ACL packet boundary flags ([Vol 4] Part E, Section 5.4.2).
pub(crate) const ACL_START_NO_FLUSH: u16 = 0x00;
pub(crate) const ACL_CONT: u16 = 0x01;
pub(crate) const ACL_START: u16 = 0x02;

/// HCI command opcode, combining the Opcode Group Field and the Opcode
/// Command Field ([Vol 4] Part E, Section 5.4.1).
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Opcode(u16);

impl Opcode {
    // Link Control (OGF 0x01)
    pub const DISCONNECT: Self = Self::new(0x01, 0x0006);

    // Controller & Baseband (OGF 0x03)
    pub const SET_EVENT_MASK: Self = Self::new(0x03, 0x0001);
    pub const RESET: Self = Self::new(0x03, 0x0003);
    pub const READ_LE_HOST_SUPPORTED: Self = Self::new(0x03, 0x006C);
    pub const WRITE_LE_HOST_SUPPORTED: Self = Self::new(0x03, 0x006D);

    // Informational Parameters (OGF 0x04)
    pub const READ_LOCAL_VERSION: Self = Self::new(0x04, 0x0001);
    pub const READ_BD_ADDR: Self = Self::new(0x04, 0x0009);

    // Status Parameters (OGF 0x05)
    pub const READ_RSSI: Self = Self::new(0x05, 0x0005);

    // LE Controller (OGF 0x08)
    pub const LE_SET_EVENT_MASK: Self = Self::new(0x08, 0x0001);
    pub const LE_SET_ADVERTISING_PARAMETERS: Self = Self::new(0x08, 0x0006);
    pub const LE_SET_ADVERTISING_DATA: Self = Self::new(0x08, 0x0008);
    pub const LE_SET_SCAN_RESPONSE_DATA: Self = Self::new(0x08, 0x0009);
    pub const LE_SET_ADVERTISE_ENABLE: Self = Self::new(0x08, 0x000A);
    pub const LE_LTK_NEG_REPLY: Self = Self::new(0x08, 0x001B);

    /// Combines `ogf` and `ocf` into one opcode.
    #[inline]
    #[must_use]
    const fn new(ogf: u16, ocf: u16) -> Self {
        Self(ogf << 10 | ocf)
    }

    /// Returns the raw opcode value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl From<u16> for Opcode {
    #[inline]
    fn from(v: u16) -> Self {
        Self(v)
    }
}

impl From<Opcode> for u16 {
    #[inline]
    fn from(op: Opcode) -> Self {
        op.0
    }
}

impl Debug for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Opcode({:#06X})", self.0)
    }
}

impl Display for Opcode {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// HCI event codes consumed by the stack ([Vol 4] Part E, Section 7.7).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    strum::Display,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum EventCode {
    DisconnectionComplete = 0x05,
    EncryptionChange = 0x08,
    CommandComplete = 0x0E,
    CommandStatus = 0x0F,
    LeMetaEvent = 0x3E,
}

/// LE meta event subevent codes ([Vol 4] Part E, Section 7.7.65).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive, strum::Display)]
#[non_exhaustive]
#[repr(u8)]
pub enum SubeventCode {
    ConnectionComplete = 0x01,
    ConnectionUpdateComplete = 0x03,
}

/// Adapter power and authorization state reported to the application.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display)]
#[non_exhaustive]
#[strum(serialize_all = "camelCase")]
pub enum AdapterState {
    #[default]
    Unknown,
    /// Raw HCI access was denied by the OS.
    Unauthorized,
    /// The controller does not support Bluetooth 4.0 LE.
    Unsupported,
    PoweredOff,
    PoweredOn,
}

/// HCI status codes ([Vol 1] Part F, Section 1.3).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::FromPrimitive,
    num_enum::IntoPrimitive,
    strum::Display,
    thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    UnknownCommand = 0x01,
    UnknownConnectionIdentifier = 0x02,
    HardwareFailure = 0x03,
    PageTimeout = 0x04,
    AuthenticationFailure = 0x05,
    PinOrKeyMissing = 0x06,
    MemoryCapacityExceeded = 0x07,
    ConnectionTimeout = 0x08,
    ConnectionLimitExceeded = 0x09,
    SynchronousConnectionLimitToADeviceExceeded = 0x0A,
    ConnectionAlreadyExists = 0x0B,
    CommandDisallowed = 0x0C,
    ConnectionRejectedDueToLimitedResources = 0x0D,
    ConnectionRejectedDueToSecurityReasons = 0x0E,
    ConnectionRejectedDueToUnacceptableBdAddr = 0x0F,
    ConnectionAcceptTimeoutExceeded = 0x10,
    UnsupportedFeatureOrParameterValue = 0x11,
    InvalidCommandParameters = 0x12,
    RemoteUserTerminatedConnection = 0x13,
    RemoteDeviceTerminatedConnectionDueToLowResources = 0x14,
    RemoteDeviceTerminatedConnectionDueToPowerOff = 0x15,
    ConnectionTerminatedByLocalHost = 0x16,
    RepeatedAttempts = 0x17,
    PairingNotAllowed = 0x18,
    UnknownLmpPdu = 0x19,
    UnsupportedRemoteFeature = 0x1A,
    ScoOffsetRejected = 0x1B,
    ScoIntervalRejected = 0x1C,
    ScoAirModeRejected = 0x1D,
    InvalidLmpLlParameters = 0x1E,
    #[num_enum(default)] // [Vol 4] Part E, Section 1.2
    UnspecifiedError = 0x1F,
    UnsupportedLmpLlParameterValue = 0x20,
    RoleChangeNotAllowed = 0x21,
    LmpLlResponseTimeout = 0x22,
    LmpLlErrorTransactionCollision = 0x23,
    LmpPduNotAllowed = 0x24,
    EncryptionModeNotAcceptable = 0x25,
    LinkKeyCannotBeChanged = 0x26,
    RequestedQosNotSupported = 0x27,
    InstantPassed = 0x28,
    PairingWithUnitKeyNotSupported = 0x29,
    DifferentTransactionCollision = 0x2A,
    QosUnacceptableParameter = 0x2C,
    QosRejected = 0x2D,
    ChannelClassificationNotSupported = 0x2E,
    InsufficientSecurity = 0x2F,
    ParameterOutOfMandatoryRange = 0x30,
    RoleSwitchPending = 0x32,
    ReservedSlotViolation = 0x34,
    RoleSwitchFailed = 0x35,
    ExtendedInquiryResponseTooLarge = 0x36,
    SecureSimplePairingNotSupportedByHost = 0x37,
    HostBusyPairing = 0x38,
    ConnectionRejectedDueToNoSuitableChannelFound = 0x39,
    ControllerBusy = 0x3A,
    UnacceptableConnectionParameters = 0x3B,
    AdvertisingTimeout = 0x3C,
    ConnectionTerminatedDueToMicFailure = 0x3D,
    ConnectionFailedToBeEstablished = 0x3E,
    MacConnectionFailed = 0x3F,
    CoarseClockAdjustmentRejected = 0x40,
    Type0SubmapNotDefined = 0x41,
    UnknownAdvertisingIdentifier = 0x42,
    LimitReached = 0x43,
    OperationCancelledByHost = 0x44,
    PacketTooLong = 0x45,
}

impl Status {
    /// Returns whether the status is `Success`.
    #[inline]
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_ogf_ocf() {
        assert_eq!(Opcode::RESET.raw(), 0x0C03);
        assert_eq!(Opcode::SET_EVENT_MASK.raw(), 0x0C01);
        assert_eq!(Opcode::DISCONNECT.raw(), 0x0406);
        assert_eq!(Opcode::READ_LOCAL_VERSION.raw(), 0x1001);
        assert_eq!(Opcode::READ_BD_ADDR.raw(), 0x1009);
        assert_eq!(Opcode::READ_RSSI.raw(), 0x1405);
        assert_eq!(Opcode::LE_SET_ADVERTISING_PARAMETERS.raw(), 0x2006);
        assert_eq!(Opcode::LE_SET_ADVERTISING_DATA.raw(), 0x2008);
        assert_eq!(Opcode::LE_SET_SCAN_RESPONSE_DATA.raw(), 0x2009);
        assert_eq!(Opcode::LE_SET_ADVERTISE_ENABLE.raw(), 0x200A);
        assert_eq!(Opcode::LE_LTK_NEG_REPLY.raw(), 0x201B);
    }

    #[test]
    fn status_from_raw() {
        assert_eq!(Status::from(0x13), Status::RemoteUserTerminatedConnection);
        assert_eq!(Status::from(0xFE), Status::UnspecifiedError);
        assert!(Status::from(0x00).is_ok());
    }

    #[test]
    fn adapter_state_names() {
        assert_eq!(AdapterState::PoweredOn.to_string(), "poweredOn");
        assert_eq!(AdapterState::Unauthorized.to_string(), "unauthorized");
    }
}
