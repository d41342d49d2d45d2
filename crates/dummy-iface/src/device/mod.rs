//! The `dummy_iface` link driver and its link manager.
//!
//! - [`DummyIface`]: one device, its parameters and lifecycle operations
//! - [`LinkRegistry`]: the system side the driver registers with
//! - [`LinkManager`]: request handling on top of the driver

mod link;
mod manager;
mod params;
mod registry;

pub use link::{DummyIface, ETH_ALEN, LinkState, is_valid_ether_addr};
pub use manager::{DEFAULT_MTU, LinkManager, error_reply};
pub use params::{BinAttr, DeviceParameters, NestParams};
pub use registry::{LinkRegistry, MemoryRegistry, NetdevEvent};
