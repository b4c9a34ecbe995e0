/// Security Manager command codes ([Vol 3] Part H, Section 3.3).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Code {
    PairingRequest = 0x01,
    PairingResponse = 0x02,
    PairingConfirm = 0x03,
    PairingRandom = 0x04,
    PairingFailed = 0x05,
    EncryptionInformation = 0x06,
    MasterIdentification = 0x07,
}

crate::impl_display_via_debug! { Code }

/// Reason codes carried in the Pairing Failed PDU. `ConfirmValueFailed`
/// keeps the legacy wire value `0x03` that the deployed initiators expect.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Reason {
    PasskeyEntryFailed = 0x01,
    OobNotAvailable = 0x02,
    ConfirmValueFailed = 0x03,
    #[num_enum(default)]
    Unspecified = 0x08,
}

crate::impl_display_via_debug! { Reason }
