//! `dummy_iface` link driver.
//!
//! [`DummyIface`] implements the driver half of the link lifecycle: it
//! validates system attributes, applies device attributes from an
//! `IFLA_INFO_DATA` container and dumps its configuration back in the same
//! wire format.

use tracing::trace;

use super::params::{BinAttr, DeviceParameters};
use super::registry::{LinkRegistry, NetdevEvent};
use crate::netlink::codec::{self, AttrSet, AttrValue, RawAttrs};
use crate::netlink::policy::{DUMMY_IFACE_KIND, Namespace, ifla, ifla_dummy::*};
use crate::netlink::types::link::format_mac;
use crate::netlink::{Error, Result};

/// Ethernet address length.
pub const ETH_ALEN: usize = 6;

/// Order in which changelink applies device attributes.
const CHANGELINK_ORDER: [u16; 5] = [
    IFLA_DUMMY_IFACE_ATTR_0,
    IFLA_DUMMY_IFACE_ATTR_1,
    IFLA_DUMMY_IFACE_ATTR_2,
    IFLA_DUMMY_IFACE_ATTR_NEST,
    IFLA_DUMMY_IFACE_ATTR_BIN,
];

/// Lifecycle state of a device.
///
/// There is no destroyed state: [`DummyIface::dellink`] consumes the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Parameters are being applied, not yet registered.
    Uninitialized,
    /// Registered and visible.
    Configured,
}

/// Check that `addr` is a non-zero unicast Ethernet address.
pub fn is_valid_ether_addr(addr: &[u8]) -> bool {
    addr.len() == ETH_ALEN && addr[0] & 0x01 == 0 && addr.iter().any(|&b| b != 0)
}

/// One `dummy_iface` device instance.
#[derive(Debug)]
pub struct DummyIface {
    name: String,
    ifindex: u32,
    state: LinkState,
    params: DeviceParameters,
}

impl DummyIface {
    /// Link kind handled by this driver.
    pub const KIND: &'static str = DUMMY_IFACE_KIND;

    /// Validate the system attributes of a new-link request.
    ///
    /// `IFLA_ADDRESS`, when present, must be a 6 byte valid unicast address.
    /// Device data is checked attribute by attribute during changelink; the
    /// `data` argument only keeps the shape of the kernel's `validate(tb, data)`
    /// hook and is not inspected here.
    pub fn validate(tb: &RawAttrs<'_>, _data: Option<&RawAttrs<'_>>) -> Result<()> {
        trace!("validate");
        if let Some(addr) = tb.get(ifla::IFLA_ADDRESS) {
            if addr.len() != ETH_ALEN {
                return Err(Error::LengthViolation {
                    id: ifla::IFLA_ADDRESS,
                    expected: ETH_ALEN,
                    actual: addr.len(),
                });
            }
            if !is_valid_ether_addr(addr) {
                return Err(Error::InvalidAddress(format_mac(addr)));
            }
        }
        Ok(())
    }

    /// Create a device, apply `data` and register it under `name`.
    ///
    /// On any failure the partially configured device is dropped.
    pub fn create<R: LinkRegistry + ?Sized>(
        name: &str,
        data: Option<&RawAttrs<'_>>,
        registry: &mut R,
    ) -> Result<Self> {
        trace!(name, "newlink");
        let mut dev = Self {
            name: name.to_string(),
            ifindex: 0,
            state: LinkState::Uninitialized,
            params: DeviceParameters::default(),
        };

        dev.changelink(data, registry)?;

        dev.ifindex = registry
            .register(name)
            .map_err(|e| Error::RegistrationFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        dev.state = LinkState::Configured;
        Ok(dev)
    }

    /// Apply device attributes from an `IFLA_INFO_DATA` container.
    ///
    /// Attributes are applied in the order attr0, attr1, attr2, nest, bin.
    /// The first invalid attribute stops the update; attributes applied
    /// before it keep their new values.
    pub fn changelink<R: LinkRegistry + ?Sized>(
        &mut self,
        data: Option<&RawAttrs<'_>>,
        registry: &mut R,
    ) -> Result<()> {
        trace!(name = %self.name, "changelink");
        let Some(data) = data else {
            return Ok(());
        };

        for id in CHANGELINK_ORDER {
            let Some(raw) = data.get(id) else {
                continue;
            };
            self.set_opt(id, raw)?;
            registry.notify(&self.name, NetdevEvent::ChangeInfoData);
        }
        Ok(())
    }

    fn set_opt(&mut self, id: u16, raw: &[u8]) -> Result<()> {
        let Some(value) = codec::validate(Namespace::DummyIface, id, raw)? else {
            return Ok(());
        };

        match value {
            AttrValue::U8(v) if id == IFLA_DUMMY_IFACE_ATTR_0 => self.params.attr0 = v,
            AttrValue::U16(v) if id == IFLA_DUMMY_IFACE_ATTR_1 => self.params.attr1 = v,
            AttrValue::U32(v) if id == IFLA_DUMMY_IFACE_ATTR_2 => self.params.attr2 = v,
            AttrValue::Nested { attrs, .. } if id == IFLA_DUMMY_IFACE_ATTR_NEST => {
                let field = |nid: u16| attrs.get(&nid).and_then(AttrValue::as_u32);
                if let Some(a) = field(IFLA_DUMMY_IFACE_ATTR_NEST_A) {
                    self.params.nest.a = a;
                }
                if let Some(b) = field(IFLA_DUMMY_IFACE_ATTR_NEST_B) {
                    self.params.nest.b = b;
                }
            }
            AttrValue::Bytes(b) if id == IFLA_DUMMY_IFACE_ATTR_BIN => {
                self.params.bin = BinAttr::from_bytes(&b).ok_or(Error::LengthViolation {
                    id,
                    expected: BinAttr::SIZE,
                    actual: b.len(),
                })?;
            }
            other => {
                return Err(Error::InvalidAttribute(format!(
                    "unexpected value for attribute {}: {:?}",
                    id, other
                )));
            }
        }
        trace!(name = %self.name, id, "applied attribute");
        Ok(())
    }

    /// Unregister the device. The device is gone afterwards.
    pub fn dellink<R: LinkRegistry + ?Sized>(self, registry: &mut R) {
        trace!(name = %self.name, ifindex = self.ifindex, "dellink");
        registry.unregister(self.ifindex);
    }

    /// Current configuration as a `dummy_iface` attribute set.
    pub fn dump(&self) -> AttrSet {
        self.params.to_attrs()
    }

    /// Current configuration encoded as an `IFLA_INFO_DATA` payload.
    pub fn fill_info(&self) -> Vec<u8> {
        trace!(name = %self.name, "fill_info");
        codec::encode(&self.dump(), Namespace::DummyIface)
    }

    /// Exact size of [`DummyIface::fill_info`].
    pub fn size_hint(&self) -> usize {
        DeviceParameters::ENCODED_LEN
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn params(&self) -> &DeviceParameters {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::params::NestParams;
    use crate::device::registry::MemoryRegistry;
    use crate::netlink::MessageBuilder;

    fn full_data() -> Vec<u8> {
        let mut b = MessageBuilder::attributes();
        b.append_attr_u8(IFLA_DUMMY_IFACE_ATTR_0, 7);
        b.append_attr_u16(IFLA_DUMMY_IFACE_ATTR_1, 0x0102);
        b.append_attr_u32(IFLA_DUMMY_IFACE_ATTR_2, 0xdead_beef);
        let nest = b.nest_start(IFLA_DUMMY_IFACE_ATTR_NEST);
        b.append_attr_u32(IFLA_DUMMY_IFACE_ATTR_NEST_A, 10);
        b.append_attr_u32(IFLA_DUMMY_IFACE_ATTR_NEST_B, 20);
        b.nest_end(nest);
        b.append_attr(IFLA_DUMMY_IFACE_ATTR_BIN, &[0xab; 16]);
        b.finish()
    }

    fn created(registry: &mut MemoryRegistry) -> DummyIface {
        DummyIface::create("di0", None, registry).unwrap()
    }

    #[test]
    fn test_create_applies_data_and_registers() {
        let mut reg = MemoryRegistry::new();
        let buf = full_data();
        let data = codec::scan(&buf).unwrap();

        let dev = DummyIface::create("di0", Some(&data), &mut reg).unwrap();
        assert_eq!(dev.state(), LinkState::Configured);
        assert_eq!(dev.ifindex(), 1);
        assert_eq!(
            *dev.params(),
            DeviceParameters {
                attr0: 7,
                attr1: 0x0102,
                attr2: 0xdead_beef,
                nest: NestParams { a: 10, b: 20 },
                bin: BinAttr([0xab; 16]),
            }
        );

        let events: Vec<_> = reg.events().iter().map(|(_, e)| *e).collect();
        let mut expected = vec![NetdevEvent::ChangeInfoData; 5];
        expected.push(NetdevEvent::Register);
        assert_eq!(events, expected);
    }

    #[test]
    fn test_create_without_data_uses_defaults() {
        let mut reg = MemoryRegistry::new();
        let dev = created(&mut reg);
        assert_eq!(*dev.params(), DeviceParameters::default());
        assert_eq!(reg.events().len(), 1);
    }

    #[test]
    fn test_create_registration_failure() {
        let mut reg = MemoryRegistry::new();
        let _first = created(&mut reg);

        let err = DummyIface::create("di0", None, &mut reg).unwrap_err();
        assert!(matches!(err, Error::RegistrationFailed { ref name, .. } if name == "di0"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_create_invalid_data_does_not_register() {
        let mut reg = MemoryRegistry::new();
        let mut b = MessageBuilder::attributes();
        b.append_attr(IFLA_DUMMY_IFACE_ATTR_BIN, &[0; 15]);
        let buf = b.finish();
        let data = codec::scan(&buf).unwrap();

        let err = DummyIface::create("di0", Some(&data), &mut reg).unwrap_err();
        assert!(err.is_validation());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_changelink_fail_fast_keeps_earlier_updates() {
        let mut reg = MemoryRegistry::new();
        let mut dev = created(&mut reg);
        reg.take_events();

        let mut b = MessageBuilder::attributes();
        b.append_attr_u8(IFLA_DUMMY_IFACE_ATTR_0, 9);
        b.append_attr(IFLA_DUMMY_IFACE_ATTR_1, &[1, 2, 3]);
        b.append_attr_u32(IFLA_DUMMY_IFACE_ATTR_2, 5);
        b.append_attr(IFLA_DUMMY_IFACE_ATTR_BIN, &[1; 16]);
        let buf = b.finish();
        let data = codec::scan(&buf).unwrap();

        let err = dev.changelink(Some(&data), &mut reg).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthViolation {
                id: IFLA_DUMMY_IFACE_ATTR_1,
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(dev.params().attr0, 9);
        assert_eq!(dev.params().attr1, 0);
        assert_eq!(dev.params().attr2, 0);
        assert_eq!(dev.params().bin, BinAttr::default());
        assert_eq!(
            reg.take_events(),
            vec![("di0".to_string(), NetdevEvent::ChangeInfoData)]
        );
    }

    #[test]
    fn test_changelink_nest_fields_are_independent() {
        let mut reg = MemoryRegistry::new();
        let mut dev = created(&mut reg);

        // Distinct values: `b` must be read from NEST_B, never from NEST_A.
        let mut b = MessageBuilder::attributes();
        let nest = b.nest_start(IFLA_DUMMY_IFACE_ATTR_NEST);
        b.append_attr_u32(IFLA_DUMMY_IFACE_ATTR_NEST_A, 1);
        b.append_attr_u32(IFLA_DUMMY_IFACE_ATTR_NEST_B, 2);
        b.nest_end(nest);
        let buf = b.finish();
        dev.changelink(Some(&codec::scan(&buf).unwrap()), &mut reg)
            .unwrap();
        assert_eq!(dev.params().nest, NestParams { a: 1, b: 2 });

        // Only NEST_B: `a` keeps its value.
        let mut b = MessageBuilder::attributes();
        let nest = b.nest_start(IFLA_DUMMY_IFACE_ATTR_NEST);
        b.append_attr_u32(IFLA_DUMMY_IFACE_ATTR_NEST_B, 3);
        b.nest_end(nest);
        let buf = b.finish();
        dev.changelink(Some(&codec::scan(&buf).unwrap()), &mut reg)
            .unwrap();
        assert_eq!(dev.params().nest, NestParams { a: 1, b: 3 });
    }

    #[test]
    fn test_changelink_invalid_nest_child_leaves_nest_alone() {
        let mut reg = MemoryRegistry::new();
        let mut dev = created(&mut reg);

        let mut b = MessageBuilder::attributes();
        let nest = b.nest_start(IFLA_DUMMY_IFACE_ATTR_NEST);
        b.append_attr_u32(IFLA_DUMMY_IFACE_ATTR_NEST_A, 1);
        b.append_attr_u16(IFLA_DUMMY_IFACE_ATTR_NEST_B, 2);
        b.nest_end(nest);
        let buf = b.finish();

        let err = dev
            .changelink(Some(&codec::scan(&buf).unwrap()), &mut reg)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LengthViolation {
                id: IFLA_DUMMY_IFACE_ATTR_NEST_B,
                ..
            }
        ));
        assert_eq!(dev.params().nest, NestParams::default());
    }

    #[test]
    fn test_changelink_ignores_unknown_ids() {
        let mut reg = MemoryRegistry::new();
        let mut dev = created(&mut reg);

        let mut b = MessageBuilder::attributes();
        b.append_attr_u32(99, 1);
        b.append_attr_u8(IFLA_DUMMY_IFACE_ATTR_0, 4);
        let buf = b.finish();
        dev.changelink(Some(&codec::scan(&buf).unwrap()), &mut reg)
            .unwrap();
        assert_eq!(dev.params().attr0, 4);
    }

    #[test]
    fn test_size_hint_matches_fill_info() {
        let mut reg = MemoryRegistry::new();
        let buf = full_data();
        let dev = DummyIface::create("di0", Some(&codec::scan(&buf).unwrap()), &mut reg).unwrap();
        assert_eq!(dev.size_hint(), dev.fill_info().len());
        assert_eq!(dev.size_hint(), 64);
    }

    #[test]
    fn test_dump_is_idempotent_and_roundtrips() {
        let mut reg = MemoryRegistry::new();
        let buf = full_data();
        let dev = DummyIface::create("di0", Some(&codec::scan(&buf).unwrap()), &mut reg).unwrap();

        let first = dev.fill_info();
        assert_eq!(first, dev.fill_info());

        let decoded = codec::decode(&first, Namespace::DummyIface).unwrap();
        assert_eq!(decoded, dev.dump());
        assert_eq!(DeviceParameters::try_from(&decoded).unwrap(), *dev.params());
    }

    #[test]
    fn test_dellink_unregisters() {
        let mut reg = MemoryRegistry::new();
        let dev = created(&mut reg);
        dev.dellink(&mut reg);
        assert!(reg.is_empty());
        assert_eq!(reg.events().last().map(|(_, e)| *e), Some(NetdevEvent::Unregister));
    }

    #[test]
    fn test_validate_address() {
        let mut b = MessageBuilder::attributes();
        b.append_attr(ifla::IFLA_ADDRESS, &[0x02, 0, 0, 0, 0, 1]);
        let ok = b.finish();
        assert!(DummyIface::validate(&codec::scan(&ok).unwrap(), None).is_ok());

        let mut b = MessageBuilder::attributes();
        b.append_attr(ifla::IFLA_ADDRESS, &[0x02, 0, 0, 0, 1]);
        let short = b.finish();
        assert!(matches!(
            DummyIface::validate(&codec::scan(&short).unwrap(), None),
            Err(Error::LengthViolation { expected: 6, actual: 5, .. })
        ));

        for addr in [[0u8; 6], [0x01, 0, 0x5e, 0, 0, 1]] {
            let mut b = MessageBuilder::attributes();
            b.append_attr(ifla::IFLA_ADDRESS, &addr);
            let buf = b.finish();
            assert!(matches!(
                DummyIface::validate(&codec::scan(&buf).unwrap(), None),
                Err(Error::InvalidAddress(_))
            ));
        }

        assert!(DummyIface::validate(&RawAttrs::default(), None).is_ok());
    }
}
