//! Device registry seam.
//!
//! The driver never owns interface indexes or the event bus. It asks a
//! [`LinkRegistry`] to register and unregister devices and to broadcast
//! configuration changes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::netlink::policy::IFNAMSIZ_MAX;
use crate::netlink::{Error, Result};

/// Netdevice notifier events raised by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetdevEvent {
    /// The device became visible.
    Register,
    /// The device is going away.
    Unregister,
    /// A device specific parameter changed.
    ChangeInfoData,
}

impl NetdevEvent {
    /// Event name in kernel notation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register => "NETDEV_REGISTER",
            Self::Unregister => "NETDEV_UNREGISTER",
            Self::ChangeInfoData => "NETDEV_CHANGEINFODATA",
        }
    }
}

/// System side of the link lifecycle.
pub trait LinkRegistry {
    /// Register a device under `name`, returning its interface index.
    fn register(&mut self, name: &str) -> Result<u32>;

    /// Remove a previously registered device.
    fn unregister(&mut self, ifindex: u32);

    /// Broadcast `event` for the device called `name`.
    fn notify(&mut self, name: &str, event: NetdevEvent);
}

/// In-process registry that hands out indexes and records every event.
#[derive(Debug, Clone)]
pub struct MemoryRegistry {
    next_index: u32,
    links: BTreeMap<u32, String>,
    events: Vec<(String, NetdevEvent)>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    /// Create an empty registry. Indexes start at 1.
    pub fn new() -> Self {
        Self {
            next_index: 1,
            links: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Look up the index of a registered name.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.links
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(idx, _)| *idx)
    }

    /// Look up the name registered at `ifindex`.
    pub fn name_of(&self, ifindex: u32) -> Option<&str> {
        self.links.get(&ifindex).map(String::as_str)
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Events recorded so far, oldest first.
    pub fn events(&self) -> &[(String, NetdevEvent)] {
        &self.events
    }

    /// Drain the recorded events.
    pub fn take_events(&mut self) -> Vec<(String, NetdevEvent)> {
        std::mem::take(&mut self.events)
    }
}

impl LinkRegistry for MemoryRegistry {
    fn register(&mut self, name: &str) -> Result<u32> {
        if name.is_empty() || name.len() > IFNAMSIZ_MAX || name.contains(['/', ' ', ':']) {
            return Err(Error::InvalidMessage(format!(
                "invalid interface name: {:?}",
                name
            )));
        }
        if self.index_of(name).is_some() {
            return Err(Error::AlreadyExists {
                name: name.to_string(),
            });
        }

        let ifindex = self.next_index;
        self.next_index += 1;
        self.links.insert(ifindex, name.to_string());
        debug!(name, ifindex, "registered link");
        self.notify(name, NetdevEvent::Register);
        Ok(ifindex)
    }

    fn unregister(&mut self, ifindex: u32) {
        if let Some(name) = self.links.remove(&ifindex) {
            debug!(name, ifindex, "unregistered link");
            self.notify(&name, NetdevEvent::Unregister);
        }
    }

    fn notify(&mut self, name: &str, event: NetdevEvent) {
        self.events.push((name.to_string(), event));
    }
}
