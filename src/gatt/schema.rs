use std::sync::Arc;

use crate::gap::Uuid;

use super::{Handler, Prop};

/// Primary service definition.
#[derive(Clone, Debug)]
pub struct Service {
    pub(super) uuid: Uuid,
    pub(super) characteristics: Vec<Characteristic>,
}

impl Service {
    /// Creates a primary service definition.
    #[inline]
    #[must_use]
    pub fn new(uuid: impl Into<Uuid>, characteristics: Vec<Characteristic>) -> Self {
        Self {
            uuid: uuid.into(),
            characteristics,
        }
    }

    /// Returns the service UUID.
    #[inline]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// Characteristic definition.
#[derive(Clone, Debug)]
pub struct Characteristic {
    pub(super) uuid: Uuid,
    pub(super) props: Prop,
    pub(super) secure: Prop,
    pub(super) value: Option<Vec<u8>>,
    pub(super) descriptors: Vec<Descriptor>,
    pub(super) io: Arc<dyn Handler>,
}

impl Characteristic {
    /// Creates a characteristic definition with I/O callbacks.
    #[must_use]
    pub fn new(uuid: impl Into<Uuid>, props: Prop, io: impl Handler + 'static) -> Self {
        Self {
            uuid: uuid.into(),
            props,
            secure: Prop::empty(),
            value: None,
            descriptors: Vec::new(),
            io: Arc::new(io),
        }
    }

    /// Sets a static read value, used instead of the read callback.
    #[must_use]
    pub fn with_value(mut self, v: impl Into<Vec<u8>>) -> Self {
        self.value = Some(v.into());
        self
    }

    /// Requires an encrypted link for the selected operations.
    #[must_use]
    pub const fn with_secure(mut self, secure: Prop) -> Self {
        self.secure = secure;
        self
    }

    /// Adds a read-only user descriptor.
    #[must_use]
    pub fn with_descriptor(mut self, d: Descriptor) -> Self {
        self.descriptors.push(d);
        self
    }
}

/// Read-only characteristic descriptor definition.
#[derive(Clone, Debug)]
pub struct Descriptor {
    pub(super) uuid: Uuid,
    pub(super) value: Vec<u8>,
}

impl Descriptor {
    /// Creates a descriptor definition.
    #[inline]
    #[must_use]
    pub fn new(uuid: impl Into<Uuid>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            uuid: uuid.into(),
            value: value.into(),
        }
    }
}
