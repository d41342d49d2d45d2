//! Attribute policy tables.
//!
//! Each [`Namespace`] owns a fixed, id-sorted table of [`AttrSpec`] entries
//! describing the value kind and length constraint of every attribute it
//! recognizes. Ids missing from a table are unknown to that namespace and
//! are skipped by the decoder.

use std::fmt;

/// Top-level link attribute ids (IFLA_*).
pub mod ifla {
    pub const IFLA_ADDRESS: u16 = 1;
    pub const IFLA_BROADCAST: u16 = 2;
    pub const IFLA_IFNAME: u16 = 3;
    pub const IFLA_MTU: u16 = 4;
    pub const IFLA_LINK: u16 = 5;
    pub const IFLA_MASTER: u16 = 10;
    pub const IFLA_TXQLEN: u16 = 13;
    pub const IFLA_OPERSTATE: u16 = 16;
    pub const IFLA_LINKMODE: u16 = 17;
    pub const IFLA_LINKINFO: u16 = 18;
    pub const IFLA_IFALIAS: u16 = 20;
    pub const IFLA_GROUP: u16 = 27;
    pub const IFLA_PROMISCUITY: u16 = 30;
    pub const IFLA_NUM_TX_QUEUES: u16 = 31;
    pub const IFLA_NUM_RX_QUEUES: u16 = 32;
    pub const IFLA_CARRIER: u16 = 33;
    pub const IFLA_CARRIER_CHANGES: u16 = 35;
}

/// Nested IFLA_INFO_* attribute ids.
pub mod ifla_info {
    pub const IFLA_INFO_KIND: u16 = 1;
    pub const IFLA_INFO_DATA: u16 = 2;
    pub const IFLA_INFO_SLAVE_KIND: u16 = 4;
}

/// `dummy_iface` device attribute ids (inside IFLA_INFO_DATA).
pub mod ifla_dummy {
    pub const IFLA_DUMMY_IFACE_ATTR_0: u16 = 1;
    pub const IFLA_DUMMY_IFACE_ATTR_1: u16 = 2;
    pub const IFLA_DUMMY_IFACE_ATTR_2: u16 = 3;
    pub const IFLA_DUMMY_IFACE_ATTR_NEST: u16 = 4;
    pub const IFLA_DUMMY_IFACE_ATTR_BIN: u16 = 5;

    /// Ids inside IFLA_DUMMY_IFACE_ATTR_NEST.
    pub const IFLA_DUMMY_IFACE_ATTR_NEST_A: u16 = 1;
    pub const IFLA_DUMMY_IFACE_ATTR_NEST_B: u16 = 2;
}

/// Link kind string registered by the `dummy_iface` driver.
pub const DUMMY_IFACE_KIND: &str = "dummy_iface";

/// Size of the `dummy_iface` binary attribute.
pub const DUMMY_IFACE_BIN_LEN: usize = 16;

/// Maximum interface name length, terminator excluded (IFNAMSIZ - 1).
pub const IFNAMSIZ_MAX: usize = 15;

/// Maximum link-layer address length (MAX_ADDR_LEN).
pub const MAX_ADDR_LEN: usize = 32;

/// Maximum interface alias length, terminator excluded (IFALIASZ - 1).
pub const IFALIAS_MAX: usize = 255;

/// Attribute namespaces. Ids are only meaningful within one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    /// Top-level link attributes (IFLA_*).
    Link,
    /// IFLA_LINKINFO sub-attributes.
    LinkInfo,
    /// `dummy_iface` attributes carried in IFLA_INFO_DATA.
    DummyIface,
    /// Sub-attributes of IFLA_DUMMY_IFACE_ATTR_NEST.
    DummyNest,
}

/// Expected value kind and length constraint of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// Exactly one byte.
    U8,
    /// Exactly two bytes, native byte order.
    U16,
    /// Exactly four bytes, native byte order.
    U32,
    /// String of at most `max_len` bytes before the first NUL.
    String { max_len: usize },
    /// Blob of exactly `len` bytes.
    Binary { len: usize },
    /// Blob of at most `max_len` bytes.
    Bytes { max_len: usize },
    /// Attribute stream decoded against another namespace.
    Nested(Namespace),
    /// Attribute stream whose namespace is chosen by the string value of
    /// sibling attribute `kind_attr`.
    KindData { kind_attr: u16 },
}

/// Policy entry for one attribute id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrSpec {
    /// Attribute id within its namespace.
    pub id: u16,
    /// Symbolic name, for logging.
    pub name: &'static str,
    /// Value kind and length constraint.
    pub kind: AttrKind,
}

const fn spec(id: u16, name: &'static str, kind: AttrKind) -> AttrSpec {
    AttrSpec { id, name, kind }
}

static LINK_POLICY: &[AttrSpec] = &[
    spec(ifla::IFLA_ADDRESS, "IFLA_ADDRESS", AttrKind::Bytes { max_len: MAX_ADDR_LEN }),
    spec(ifla::IFLA_BROADCAST, "IFLA_BROADCAST", AttrKind::Bytes { max_len: MAX_ADDR_LEN }),
    spec(ifla::IFLA_IFNAME, "IFLA_IFNAME", AttrKind::String { max_len: IFNAMSIZ_MAX }),
    spec(ifla::IFLA_MTU, "IFLA_MTU", AttrKind::U32),
    spec(ifla::IFLA_LINK, "IFLA_LINK", AttrKind::U32),
    spec(ifla::IFLA_MASTER, "IFLA_MASTER", AttrKind::U32),
    spec(ifla::IFLA_TXQLEN, "IFLA_TXQLEN", AttrKind::U32),
    spec(ifla::IFLA_OPERSTATE, "IFLA_OPERSTATE", AttrKind::U8),
    spec(ifla::IFLA_LINKMODE, "IFLA_LINKMODE", AttrKind::U8),
    spec(ifla::IFLA_LINKINFO, "IFLA_LINKINFO", AttrKind::Nested(Namespace::LinkInfo)),
    spec(ifla::IFLA_IFALIAS, "IFLA_IFALIAS", AttrKind::String { max_len: IFALIAS_MAX }),
    spec(ifla::IFLA_GROUP, "IFLA_GROUP", AttrKind::U32),
    spec(ifla::IFLA_PROMISCUITY, "IFLA_PROMISCUITY", AttrKind::U32),
    spec(ifla::IFLA_NUM_TX_QUEUES, "IFLA_NUM_TX_QUEUES", AttrKind::U32),
    spec(ifla::IFLA_NUM_RX_QUEUES, "IFLA_NUM_RX_QUEUES", AttrKind::U32),
    spec(ifla::IFLA_CARRIER, "IFLA_CARRIER", AttrKind::U8),
    spec(ifla::IFLA_CARRIER_CHANGES, "IFLA_CARRIER_CHANGES", AttrKind::U32),
];

static LINK_INFO_POLICY: &[AttrSpec] = &[
    spec(ifla_info::IFLA_INFO_KIND, "IFLA_INFO_KIND", AttrKind::String { max_len: IFNAMSIZ_MAX }),
    spec(
        ifla_info::IFLA_INFO_DATA,
        "IFLA_INFO_DATA",
        AttrKind::KindData {
            kind_attr: ifla_info::IFLA_INFO_KIND,
        },
    ),
    spec(
        ifla_info::IFLA_INFO_SLAVE_KIND,
        "IFLA_INFO_SLAVE_KIND",
        AttrKind::String { max_len: IFNAMSIZ_MAX },
    ),
];

static DUMMY_IFACE_POLICY: &[AttrSpec] = &[
    spec(ifla_dummy::IFLA_DUMMY_IFACE_ATTR_0, "IFLA_DUMMY_IFACE_ATTR_0", AttrKind::U8),
    spec(ifla_dummy::IFLA_DUMMY_IFACE_ATTR_1, "IFLA_DUMMY_IFACE_ATTR_1", AttrKind::U16),
    spec(ifla_dummy::IFLA_DUMMY_IFACE_ATTR_2, "IFLA_DUMMY_IFACE_ATTR_2", AttrKind::U32),
    spec(
        ifla_dummy::IFLA_DUMMY_IFACE_ATTR_NEST,
        "IFLA_DUMMY_IFACE_ATTR_NEST",
        AttrKind::Nested(Namespace::DummyNest),
    ),
    spec(
        ifla_dummy::IFLA_DUMMY_IFACE_ATTR_BIN,
        "IFLA_DUMMY_IFACE_ATTR_BIN",
        AttrKind::Binary {
            len: DUMMY_IFACE_BIN_LEN,
        },
    ),
];

static DUMMY_NEST_POLICY: &[AttrSpec] = &[
    spec(ifla_dummy::IFLA_DUMMY_IFACE_ATTR_NEST_A, "IFLA_DUMMY_IFACE_ATTR_NEST_A", AttrKind::U32),
    spec(ifla_dummy::IFLA_DUMMY_IFACE_ATTR_NEST_B, "IFLA_DUMMY_IFACE_ATTR_NEST_B", AttrKind::U32),
];

impl Namespace {
    /// The id-sorted policy table of this namespace.
    pub fn policy(self) -> &'static [AttrSpec] {
        match self {
            Self::Link => LINK_POLICY,
            Self::LinkInfo => LINK_INFO_POLICY,
            Self::DummyIface => DUMMY_IFACE_POLICY,
            Self::DummyNest => DUMMY_NEST_POLICY,
        }
    }

    /// Look up the policy of `id`; `None` means the id is unknown here.
    pub fn spec(self, id: u16) -> Option<&'static AttrSpec> {
        let policy = self.policy();
        policy
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .map(|i| &policy[i])
    }

    /// Namespace of the IFLA_INFO_DATA payload for a link kind.
    pub fn for_kind(kind: &str) -> Option<Self> {
        match kind {
            DUMMY_IFACE_KIND => Some(Self::DummyIface),
            _ => None,
        }
    }

    /// Name of this namespace, for logging.
    pub fn name(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::LinkInfo => "link-info",
            Self::DummyIface => "dummy_iface",
            Self::DummyNest => "dummy_iface-nest",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
