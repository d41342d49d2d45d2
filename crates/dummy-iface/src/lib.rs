//! Netlink attribute codec, `dummy_iface` link driver and link
//! notification listener.
//!
//! # Modules
//!
//! - [`netlink`] - attribute framing, policy tables, the policy-driven codec
//!   and the async route socket
//! - [`device`] - the `dummy_iface` driver and an in-process link manager
//! - [`listener`] - table-driven decoding of link notifications
//!
//! # Features
//!
//! - `output` - `serde` serialization of listener reports
//!
//! # Example
//!
//! ```
//! use dummy_iface::device::{DummyIface, MemoryRegistry};
//! use dummy_iface::netlink::MessageBuilder;
//! use dummy_iface::netlink::codec;
//! use dummy_iface::netlink::policy::ifla_dummy;
//!
//! let mut data = MessageBuilder::attributes();
//! data.append_attr_u32(ifla_dummy::IFLA_DUMMY_IFACE_ATTR_2, 42);
//! let data = data.finish();
//!
//! let mut registry = MemoryRegistry::new();
//! let dev = DummyIface::create("di0", Some(&codec::scan(&data)?), &mut registry)?;
//! assert_eq!(dev.params().attr2, 42);
//! assert_eq!(dev.fill_info().len(), dev.size_hint());
//! # Ok::<(), dummy_iface::Error>(())
//! ```

pub mod device;
pub mod listener;
pub mod netlink;

pub use netlink::{Error, Result};
