//! Advertising and Scan Response Data construction
//! ([Vol 3] Part C, Section 11 and \[CSS\] Part A, Section 1).

use structbuf::{Pack, Packer, StructBuf};

use super::Uuid;

/// Apple's company identifier used for iBeacon frames.
const APPLE: u16 = 0x004C;

/// Data type codes (\[Assigned Numbers\] Section 2.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
enum DataType {
    Flags = 0x01,
    CompleteServiceClass16 = 0x03,
    IncompleteServiceClass128 = 0x06,
    ShortLocalName = 0x08,
    CompleteLocalName = 0x09,
    ManufacturerData = 0xFF,
}

/// Length-type-value advertising data builder. The builder does not enforce
/// the 31-byte advertising PDU limit; oversized data is rejected when it is
/// passed to the advertising state machine.
#[derive(Clone, Debug, Default)]
pub struct AdvData(StructBuf);

impl AdvData {
    /// Creates an empty data buffer.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(StructBuf::new(254))
    }

    /// Returns the encoded data.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Appends flags for a general-discoverable, LE-only device
    /// (\[CSS\] Part A, Section 1.3).
    pub fn general_discoverable(&mut self) -> &mut Self {
        self.put(DataType::Flags, |b| {
            b.u8(0x06_u8); // LE General Discoverable, BR/EDR Not Supported
        })
    }

    /// Appends service class UUID lists (\[CSS\] Part A, Section 1.1).
    /// Assigned 16-bit UUIDs and full 128-bit UUIDs go into separate lists,
    /// either of which is omitted when empty.
    pub fn service_classes(&mut self, uuids: &[Uuid]) -> &mut Self {
        self.maybe_put(false, DataType::CompleteServiceClass16, |b| {
            (uuids.iter().filter_map(|&u| u.as_u16())).for_each(|v| {
                b.u16(v);
            });
        });
        self.maybe_put(false, DataType::IncompleteServiceClass128, |b| {
            (uuids.iter().filter_map(|&u| u.as_u128())).for_each(|v| {
                b.u128(v);
            });
        })
    }

    /// Appends either shortened or complete local device name
    /// (\[CSS\] Part A, Section 1.2).
    pub fn local_name<T: AsRef<str>>(&mut self, complete: bool, v: T) -> &mut Self {
        let typ = u8::from(DataType::ShortLocalName) + u8::from(complete);
        self.put(typ, |b| {
            b.put(v.as_ref().as_bytes());
        })
    }

    /// Appends manufacturer-specific data (\[CSS\] Part A, Section 1.4).
    pub fn manufacturer_data(&mut self, company_id: u16, v: &[u8]) -> &mut Self {
        self.put(DataType::ManufacturerData, |b| {
            b.u16(company_id).put(v);
        })
    }

    /// Appends an iBeacon frame. `data` carries the proximity UUID, major,
    /// minor, and measured power in Apple's big-endian layout (21 bytes for
    /// a standard beacon), written with its actual length.
    pub fn ibeacon(&mut self, data: &[u8]) -> &mut Self {
        let n = u8::try_from(data.len()).expect("advertising data overflow");
        self.put(DataType::ManufacturerData, |b| {
            b.u16(APPLE)
                .u8(0x02_u8) // iBeacon
                .u8(n)
                .put(data);
        })
    }

    /// Appends a length-type-data field to the buffer, calling `f` to provide
    /// the data.
    #[inline]
    fn put<T: Into<u8>>(&mut self, typ: T, f: impl Fn(&mut Packer)) -> &mut Self {
        self.maybe_put(true, typ, f)
    }

    /// Appends a length-type-data field to the buffer, calling `f` to provide
    /// the data. If the data is empty and `keep_empty` is `false`, then
    /// nothing gets appended.
    fn maybe_put<T: Into<u8>>(
        &mut self,
        keep_empty: bool,
        typ: T,
        f: impl Fn(&mut Packer),
    ) -> &mut Self {
        let i = self.0.len();
        f(self.0.append().put([0, typ.into()]));
        let n = u8::try_from(self.0.len().wrapping_sub(i + 1)).expect("advertising data overflow");
        self.0[i] = n;
        if !keep_empty && n < 2 {
            self.0.truncate(i);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::uuid16;
    use super::*;

    #[test]
    fn connectable_advertisement() {
        let mut ad = AdvData::new();
        ad.general_discoverable()
            .service_classes(&[uuid16(0x180F).as_uuid()]);
        assert_eq!(
            ad.as_bytes(),
            &[0x02, 0x01, 0x06, 0x03, 0x03, 0x0F, 0x18]
        );
    }

    #[test]
    fn uuid128_list() {
        let mut ad = AdvData::new();
        let u: Uuid = "E20A39F4-73F5-4BC4-A12F-17D1AD07A961".parse().unwrap();
        ad.service_classes(&[u]);
        let b = ad.as_bytes();
        assert_eq!(&b[..2], &[0x11, 0x06]);
        assert_eq!(&b[2..], u.to_bytes());
    }

    #[test]
    fn scan_response_name() {
        let mut srd = AdvData::new();
        srd.local_name(false, "ping");
        assert_eq!(srd.as_bytes(), b"\x05\x08ping");
    }

    #[test]
    fn ibeacon_frame() {
        let mut data = [0xAA; 21];
        data[16..18].copy_from_slice(&0x0102_u16.to_be_bytes());
        data[18..20].copy_from_slice(&0x0304_u16.to_be_bytes());
        data[20] = 0xC5;
        let mut ad = AdvData::new();
        ad.general_discoverable().ibeacon(&data);
        let b = ad.as_bytes();
        assert_eq!(&b[..3], &[0x02, 0x01, 0x06]);
        assert_eq!(&b[3..9], &[0x1A, 0xFF, 0x4C, 0x00, 0x02, 0x15]);
        assert_eq!(&b[9..25], &[0xAA; 16]);
        assert_eq!(&b[25..], &[0x01, 0x02, 0x03, 0x04, 0xC5]);
    }
}
