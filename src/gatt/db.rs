use std::sync::Arc;

use crate::gap::Uuid;

use super::*;

/// Shared definition of one characteristic, referenced by its declaration,
/// value, and CCCD attribute entries.
#[derive(Debug)]
pub(super) struct Chr {
    pub uuid: Uuid,
    pub props: Prop,
    pub secure: Prop,
    pub value: Handle,
    pub static_value: Option<Vec<u8>>,
    pub io: Arc<dyn Handler>,
}

/// Attribute table entry. `typ` is the attribute type compared by type-based
/// requests.
#[derive(Debug)]
pub(super) struct Entry {
    pub typ: Uuid,
    pub kind: Kind,
}

#[derive(Debug)]
pub(super) enum Kind {
    /// Primary service declaration grouping attributes up to `end`.
    Service { uuid: Uuid, end: Handle },
    /// Characteristic declaration.
    Decl(Arc<Chr>),
    /// Characteristic value.
    Value(Arc<Chr>),
    /// Client Characteristic Configuration descriptor.
    Cccd(Arc<Chr>),
    /// Read-only user descriptor.
    Descriptor { value: Vec<u8> },
}

/// Flat attribute table. Handles are assigned sequentially from 0x0001, so
/// entry `i` has handle `i + 1`.
#[derive(Debug, Default)]
pub(super) struct Db(Vec<Entry>);

impl Db {
    /// Builds the attribute table with the fixed GAP and GATT services ahead
    /// of the application services.
    pub fn new(name: &str, appearance: u16, services: &[Service]) -> Self {
        let mut db = Self(Vec::new());
        db.push_service(&Service::new(
            GENERIC_ACCESS,
            vec![
                Characteristic::new(DEVICE_NAME, Prop::READ, NoIo).with_value(name.as_bytes()),
                Characteristic::new(APPEARANCE, Prop::READ, NoIo)
                    .with_value(appearance.to_le_bytes()),
            ],
        ));
        db.push_service(&Service::new(
            GENERIC_ATTRIBUTE,
            vec![Characteristic::new(SERVICE_CHANGED, Prop::INDICATE, NoIo).with_value([0; 4])],
        ));
        for s in services {
            db.push_service(s);
        }
        db
    }

    fn push_service(&mut self, s: &Service) {
        let decl = self.0.len();
        self.0.push(Entry {
            typ: PRIMARY_SERVICE.as_uuid(),
            kind: Kind::Service {
                uuid: s.uuid,
                end: Handle::MAX, // patched below
            },
        });
        for c in &s.characteristics {
            let value = handle_at(self.0.len() + 2);
            let chr = Arc::new(Chr {
                uuid: c.uuid,
                props: c.props,
                secure: c.secure,
                value,
                static_value: c.value.clone(),
                io: Arc::clone(&c.io),
            });
            self.0.push(Entry {
                typ: CHARACTERISTIC.as_uuid(),
                kind: Kind::Decl(Arc::clone(&chr)),
            });
            self.0.push(Entry {
                typ: c.uuid,
                kind: Kind::Value(Arc::clone(&chr)),
            });
            if c.props.intersects(Prop::NOTIFY | Prop::INDICATE) {
                self.0.push(Entry {
                    typ: CLIENT_CHARACTERISTIC_CONFIGURATION.as_uuid(),
                    kind: Kind::Cccd(Arc::clone(&chr)),
                });
            }
            for d in &c.descriptors {
                self.0.push(Entry {
                    typ: d.uuid,
                    kind: Kind::Descriptor {
                        value: d.value.clone(),
                    },
                });
            }
        }
        let end = handle_at(self.0.len());
        if let Kind::Service { end: e, .. } = &mut self.0[decl].kind {
            *e = end;
        }
    }

    /// Returns the entry for `hdl`.
    #[inline]
    pub fn get(&self, hdl: Handle) -> Option<&Entry> {
        self.0.get(usize::from(hdl) - 1)
    }

    /// Iterates over `(handle, entry)` pairs within `range`.
    pub fn range(&self, range: HandleRange) -> impl Iterator<Item = (Handle, &Entry)> {
        let start = usize::from(range.start()) - 1;
        let end = self.0.len().min(usize::from(range.end()));
        (self.0.get(start..end).unwrap_or_default().iter())
            .enumerate()
            .map(move |(i, e)| (handle_at(start + i + 1), e))
    }
}

/// Returns the handle of entry index `i - 1`.
fn handle_at(i: usize) -> Handle {
    (u16::try_from(i).ok().and_then(Handle::new)).expect("attribute table overflow")
}
