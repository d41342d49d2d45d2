//! `dummy_iface` device parameters.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::netlink::attr::nla_total_size;
use crate::netlink::codec::{AttrSet, AttrValue};
use crate::netlink::policy::{DUMMY_IFACE_BIN_LEN, Namespace, ifla_dummy::*};
use crate::netlink::{Error, Result};

/// Fixed-size binary attribute (IFLA_DUMMY_IFACE_ATTR_BIN).
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct BinAttr(pub [u8; DUMMY_IFACE_BIN_LEN]);

impl BinAttr {
    /// Size on the wire.
    pub const SIZE: usize = DUMMY_IFACE_BIN_LEN;

    /// Copy a blob of exactly [`BinAttr::SIZE`] bytes.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        Self::read_from_bytes(data).ok()
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The two-field IFLA_DUMMY_IFACE_ATTR_NEST group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NestParams {
    pub a: u32,
    pub b: u32,
}

/// Configuration of one `dummy_iface` device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceParameters {
    pub attr0: u8,
    pub attr1: u16,
    pub attr2: u32,
    pub nest: NestParams,
    pub bin: BinAttr,
}

impl DeviceParameters {
    /// Bytes taken by the encoded attribute set of [`DeviceParameters::to_attrs`].
    pub const ENCODED_LEN: usize = nla_total_size(1) // IFLA_DUMMY_IFACE_ATTR_0
        + nla_total_size(2) // IFLA_DUMMY_IFACE_ATTR_1
        + nla_total_size(4) // IFLA_DUMMY_IFACE_ATTR_2
        + nla_total_size(nla_total_size(4) + nla_total_size(4)) // IFLA_DUMMY_IFACE_ATTR_NEST
        + nla_total_size(BinAttr::SIZE); // IFLA_DUMMY_IFACE_ATTR_BIN

    /// All fields as a `dummy_iface` attribute set.
    pub fn to_attrs(&self) -> AttrSet {
        let mut nest = AttrSet::new();
        nest.insert(IFLA_DUMMY_IFACE_ATTR_NEST_A, AttrValue::U32(self.nest.a));
        nest.insert(IFLA_DUMMY_IFACE_ATTR_NEST_B, AttrValue::U32(self.nest.b));

        let mut attrs = AttrSet::new();
        attrs.insert(IFLA_DUMMY_IFACE_ATTR_0, AttrValue::U8(self.attr0));
        attrs.insert(IFLA_DUMMY_IFACE_ATTR_1, AttrValue::U16(self.attr1));
        attrs.insert(IFLA_DUMMY_IFACE_ATTR_2, AttrValue::U32(self.attr2));
        attrs.insert(
            IFLA_DUMMY_IFACE_ATTR_NEST,
            AttrValue::nested(Namespace::DummyNest, nest),
        );
        attrs.insert(
            IFLA_DUMMY_IFACE_ATTR_BIN,
            AttrValue::Bytes(self.bin.as_bytes().to_vec()),
        );
        attrs
    }
}

fn missing(name: &str) -> Error {
    Error::InvalidAttribute(format!("missing {}", name))
}

impl TryFrom<&AttrSet> for DeviceParameters {
    type Error = Error;

    /// Rebuild parameters from a complete, decoded `dummy_iface` set.
    fn try_from(attrs: &AttrSet) -> Result<Self> {
        let get = |id: u16| attrs.get(&id);
        let nest = get(IFLA_DUMMY_IFACE_ATTR_NEST)
            .and_then(AttrValue::as_nested)
            .ok_or_else(|| missing("IFLA_DUMMY_IFACE_ATTR_NEST"))?;

        Ok(Self {
            attr0: get(IFLA_DUMMY_IFACE_ATTR_0)
                .and_then(AttrValue::as_u8)
                .ok_or_else(|| missing("IFLA_DUMMY_IFACE_ATTR_0"))?,
            attr1: get(IFLA_DUMMY_IFACE_ATTR_1)
                .and_then(AttrValue::as_u16)
                .ok_or_else(|| missing("IFLA_DUMMY_IFACE_ATTR_1"))?,
            attr2: get(IFLA_DUMMY_IFACE_ATTR_2)
                .and_then(AttrValue::as_u32)
                .ok_or_else(|| missing("IFLA_DUMMY_IFACE_ATTR_2"))?,
            nest: NestParams {
                a: nest
                    .get(&IFLA_DUMMY_IFACE_ATTR_NEST_A)
                    .and_then(AttrValue::as_u32)
                    .ok_or_else(|| missing("IFLA_DUMMY_IFACE_ATTR_NEST_A"))?,
                b: nest
                    .get(&IFLA_DUMMY_IFACE_ATTR_NEST_B)
                    .and_then(AttrValue::as_u32)
                    .ok_or_else(|| missing("IFLA_DUMMY_IFACE_ATTR_NEST_B"))?,
            },
            bin: get(IFLA_DUMMY_IFACE_ATTR_BIN)
                .and_then(AttrValue::as_bytes)
                .and_then(BinAttr::from_bytes)
                .ok_or_else(|| missing("IFLA_DUMMY_IFACE_ATTR_BIN"))?,
        })
    }
}
