//! Link message types (RTM_NEWLINK / RTM_DELLINK / RTM_GETLINK).

use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::netlink::builder::MessageBuilder;
use crate::netlink::codec::{self, AttrSet, AttrValue};
use crate::netlink::error::{Error, Result};
use crate::netlink::policy::{Namespace, ifla, ifla_info};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Interface info message header (mirrors struct ifinfomsg).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct IfInfoMsg {
    /// Address family (AF_UNSPEC for links).
    pub ifi_family: u8,
    /// Padding.
    pub __ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    /// Interface index.
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Change mask.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: i32) -> Self {
        self.ifi_index = index;
        self
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            })
    }
}

/// Interface flags (IFF_*).
pub mod iff {
    pub const BROADCAST: u32 = 0x2;
    pub const NOARP: u32 = 0x80;
}

/// ARPHRD_ETHER device type.
pub const ARPHRD_ETHER: u16 = 1;

/// Operational state (IF_OPER_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperState {
    Unknown,
    NotPresent,
    Down,
    LowerLayerDown,
    Testing,
    Dormant,
    Up,
}

impl From<u8> for OperState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::NotPresent,
            2 => Self::Down,
            3 => Self::LowerLayerDown,
            4 => Self::Testing,
            5 => Self::Dormant,
            6 => Self::Up,
            _ => Self::Unknown,
        }
    }
}

impl OperState {
    /// Name as printed by iproute2.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotPresent => "NOTPRESENT",
            Self::Down => "DOWN",
            Self::LowerLayerDown => "LOWERLAYERDOWN",
            Self::Testing => "TESTING",
            Self::Dormant => "DORMANT",
            Self::Up => "UP",
        }
    }
}

/// A link message body: `ifinfomsg` followed by top-level link attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMessage {
    /// Fixed-size header.
    pub header: IfInfoMsg,
    /// Decoded attributes in the [`Namespace::Link`] namespace.
    pub attrs: AttrSet,
}

/// Split a link message body into its header and raw attribute stream.
pub fn parse_link_header(input: &mut &[u8]) -> PResult<IfInfoMsg> {
    if input.len() < IfInfoMsg::SIZE {
        return Err(ErrMode::Cut(ContextError::new()));
    }

    let header_bytes: &[u8] = take(IfInfoMsg::SIZE).parse_next(input)?;
    let header = *IfInfoMsg::from_bytes(header_bytes)
        .map_err(|_| ErrMode::Cut(ContextError::new()))?;
    Ok(header)
}

/// Split a link message body without decoding attributes.
pub fn split_link_message(payload: &[u8]) -> Result<(IfInfoMsg, &[u8])> {
    let mut input = payload;
    let header = parse_link_header(&mut input).map_err(|_| Error::Truncated {
        expected: IfInfoMsg::SIZE,
        actual: payload.len(),
    })?;
    Ok((header, input))
}

impl LinkMessage {
    /// Parse a link message body (the payload after the netlink header).
    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        let (header, attrs) = split_link_message(payload)?;
        Ok(Self {
            header,
            attrs: codec::decode(attrs, Namespace::Link)?,
        })
    }

    /// Append header and attributes to a message builder.
    pub fn write_to(&self, builder: &mut MessageBuilder) {
        builder.append(&self.header);
        codec::encode_into(builder, &self.attrs, Namespace::Link);
    }

    /// Build a complete netlink message carrying this link.
    pub fn to_message(&self, msg_type: u16, flags: u16, seq: u32) -> Vec<u8> {
        let mut builder = MessageBuilder::new(msg_type, flags);
        builder.set_seq(seq);
        self.write_to(&mut builder);
        builder.finish()
    }

    /// Get the interface index.
    pub fn ifindex(&self) -> u32 {
        self.header.ifi_index as u32
    }

    /// Get the interface name.
    pub fn name(&self) -> Option<&str> {
        self.attrs.get(&ifla::IFLA_IFNAME)?.as_str()
    }

    /// Get the hardware address as bytes.
    pub fn address(&self) -> Option<&[u8]> {
        self.attrs.get(&ifla::IFLA_ADDRESS)?.as_bytes()
    }

    /// Get the decoded IFLA_LINKINFO container.
    pub fn link_info(&self) -> Option<&AttrSet> {
        self.attrs.get(&ifla::IFLA_LINKINFO)?.as_nested()
    }

    /// Get the link type kind (e.g., "vlan", "dummy_iface").
    pub fn kind(&self) -> Option<&str> {
        self.link_info()?.get(&ifla_info::IFLA_INFO_KIND)?.as_str()
    }

    /// Get the device specific data, if its kind is known.
    pub fn info_data(&self) -> Option<&AttrValue> {
        self.link_info()?.get(&ifla_info::IFLA_INFO_DATA)
    }
}

/// Format a hardware address as a colon separated hex string.
pub fn format_mac(addr: &[u8]) -> String {
    addr.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
