//! Netlink attribute protocol.
//!
//! This module holds the wire format pieces shared by the link driver and
//! the notification listener: attribute framing, the message builder, the
//! per-namespace policy tables and the policy-driven codec.
//!
//! # Quick Start
//!
//! ```
//! use dummy_iface::netlink::codec::{self, AttrSet, AttrValue};
//! use dummy_iface::netlink::policy::{Namespace, ifla};
//!
//! let mut attrs = AttrSet::new();
//! attrs.insert(ifla::IFLA_IFNAME, AttrValue::String("di0".into()));
//! attrs.insert(ifla::IFLA_MTU, AttrValue::U32(1500));
//!
//! let wire = codec::encode(&attrs, Namespace::Link);
//! let decoded = codec::decode(&wire, Namespace::Link)?;
//! assert_eq!(decoded[&ifla::IFLA_MTU].as_u32(), Some(1500));
//! # Ok::<(), dummy_iface::Error>(())
//! ```

pub mod attr;
mod builder;
pub mod codec;
mod error;
pub mod message;
pub mod policy;
mod socket;
pub mod types;

pub use attr::{AttrIter, NlAttr};
pub use builder::{MessageBuilder, NestToken};
pub use codec::{AttrSet, AttrValue, RawAttrs};
pub use error::{Error, Result};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use policy::{AttrKind, AttrSpec, Namespace};
pub use socket::{NetlinkSocket, rtnetlink_groups};
