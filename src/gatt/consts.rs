use crate::gap::{uuid16, Uuid16};

/// Primary Service declaration ([Vol 3] Part G, Section 3.1).
pub(crate) const PRIMARY_SERVICE: Uuid16 = uuid16(0x2800);
/// Include declaration ([Vol 3] Part G, Section 3.2).
pub(crate) const INCLUDE: Uuid16 = uuid16(0x2802);
/// Characteristic declaration ([Vol 3] Part G, Section 3.3.1).
pub(crate) const CHARACTERISTIC: Uuid16 = uuid16(0x2803);
/// Client Characteristic Configuration descriptor
/// ([Vol 3] Part G, Section 3.3.3.3).
pub(crate) const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid16 = uuid16(0x2902);

/// Generic Access service and its characteristics
/// ([Vol 3] Part C, Section 12).
pub(crate) const GENERIC_ACCESS: Uuid16 = uuid16(0x1800);
pub(crate) const DEVICE_NAME: Uuid16 = uuid16(0x2A00);
pub(crate) const APPEARANCE: Uuid16 = uuid16(0x2A01);

/// Generic Attribute service and the Service Changed characteristic
/// ([Vol 3] Part G, Section 7).
pub(crate) const GENERIC_ATTRIBUTE: Uuid16 = uuid16(0x1801);
pub(crate) const SERVICE_CHANGED: Uuid16 = uuid16(0x2A05);

/// CCCD notification and indication enable bits.
pub(crate) const CCCD_NOTIFY: u16 = 0x0001;
pub(crate) const CCCD_INDICATE: u16 = 0x0002;

bitflags::bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1). The same
    /// bits select which operations require an encrypted link when used as a
    /// security mask.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}
