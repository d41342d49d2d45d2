//! Stock handlers that summarize link notifications.

use std::fmt;

use super::dispatch::{DispatchTable, LinkContext, NotificationDecoder};
use crate::netlink::codec::AttrValue;
use crate::netlink::message::NlMsgType;
use crate::netlink::policy::{DUMMY_IFACE_KIND, Namespace, ifla, ifla_dummy::*, ifla_info};
use crate::netlink::types::link::{IfInfoMsg, OperState, format_mac};
use crate::netlink::{Error, Result};

/// `dummy_iface` parameters carried by a notification.
#[cfg_attr(feature = "output", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DummyIfaceReport {
    pub attr0: Option<u8>,
    pub attr1: Option<u16>,
    pub attr2: Option<u32>,
    pub nest_a: Option<u32>,
    pub nest_b: Option<u32>,
    /// Hex encoded binary attribute.
    pub bin: Option<String>,
}

/// Summary of one link notification.
#[cfg_attr(feature = "output", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// "new" or "del".
    pub action: &'static str,
    pub ifindex: u32,
    pub name: Option<String>,
    pub address: Option<String>,
    pub mtu: Option<u32>,
    pub operstate: Option<&'static str>,
    pub kind: Option<String>,
    pub dummy_iface: Option<DummyIfaceReport>,
}

impl LinkReport {
    /// Check if the link is a `dummy_iface` device.
    pub fn is_dummy_iface(&self) -> bool {
        self.kind.as_deref() == Some(DUMMY_IFACE_KIND)
    }

    fn dummy(&mut self) -> &mut DummyIfaceReport {
        self.dummy_iface.get_or_insert_with(Default::default)
    }
}

impl fmt::Display for LinkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LINK{}: {} index {}",
            if self.action == "del" { " DEL" } else { "" },
            self.name.as_deref().unwrap_or("?"),
            self.ifindex
        )?;
        if let Some(kind) = &self.kind {
            write!(f, " kind {}", kind)?;
        }
        if let Some(address) = &self.address {
            write!(f, " link/ether {}", address)?;
        }
        if let Some(mtu) = self.mtu {
            write!(f, " mtu {}", mtu)?;
        }
        if let Some(state) = self.operstate {
            write!(f, " state {}", state)?;
        }
        if let Some(d) = &self.dummy_iface {
            let fields = [
                ("attr0", d.attr0.map(|v| v.to_string())),
                ("attr1", d.attr1.map(|v| v.to_string())),
                ("attr2", d.attr2.map(|v| v.to_string())),
                ("nest_a", d.nest_a.map(|v| v.to_string())),
                ("nest_b", d.nest_b.map(|v| v.to_string())),
                ("bin", d.bin.clone()),
            ];
            for (name, value) in fields {
                if let Some(value) = value {
                    write!(f, " {} {}", name, value)?;
                }
            }
        }
        Ok(())
    }
}

/// Collects one [`LinkReport`] per dispatched message.
#[derive(Debug, Default)]
pub struct ReportCollector {
    current: LinkReport,
    reports: Vec<LinkReport>,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports completed so far.
    pub fn reports(&self) -> &[LinkReport] {
        &self.reports
    }

    /// Drain completed reports.
    pub fn take(&mut self) -> Vec<LinkReport> {
        std::mem::take(&mut self.reports)
    }
}

impl LinkContext for ReportCollector {
    fn begin(&mut self, msg_type: u16, header: &IfInfoMsg) {
        self.current = LinkReport {
            action: if msg_type == NlMsgType::RTM_DELLINK {
                "del"
            } else {
                "new"
            },
            ifindex: header.ifi_index as u32,
            ..LinkReport::default()
        };
    }

    fn finish(&mut self) {
        self.reports.push(std::mem::take(&mut self.current));
    }
}

fn mismatch(id: u16, value: &AttrValue) -> Error {
    Error::InvalidAttribute(format!("attribute {}: unexpected value {:?}", id, value))
}

fn u32_of(id: u16, value: &AttrValue) -> Result<u32> {
    value.as_u32().ok_or_else(|| mismatch(id, value))
}

/// Decoder with handlers for the link, link-info and `dummy_iface` namespaces.
pub fn report_decoder() -> NotificationDecoder<ReportCollector> {
    let link = DispatchTable::<ReportCollector>::builder(Namespace::Link)
        .on(ifla::IFLA_IFNAME, |id, v, c| {
            c.current.name = Some(v.as_str().ok_or_else(|| mismatch(id, v))?.to_string());
            Ok(())
        })
        .on(ifla::IFLA_ADDRESS, |id, v, c| {
            c.current.address = Some(format_mac(v.as_bytes().ok_or_else(|| mismatch(id, v))?));
            Ok(())
        })
        .on(ifla::IFLA_MTU, |id, v, c| {
            c.current.mtu = Some(u32_of(id, v)?);
            Ok(())
        })
        .on(ifla::IFLA_OPERSTATE, |id, v, c| {
            let state = v.as_u8().ok_or_else(|| mismatch(id, v))?;
            c.current.operstate = Some(OperState::from(state).name());
            Ok(())
        })
        .build();

    let info = DispatchTable::<ReportCollector>::builder(Namespace::LinkInfo)
        .on(ifla_info::IFLA_INFO_KIND, |id, v, c| {
            c.current.kind = Some(v.as_str().ok_or_else(|| mismatch(id, v))?.to_string());
            Ok(())
        })
        .build();

    let dummy = DispatchTable::<ReportCollector>::builder(Namespace::DummyIface)
        .on(IFLA_DUMMY_IFACE_ATTR_0, |id, v, c| {
            c.current.dummy().attr0 = Some(v.as_u8().ok_or_else(|| mismatch(id, v))?);
            Ok(())
        })
        .on(IFLA_DUMMY_IFACE_ATTR_1, |id, v, c| {
            c.current.dummy().attr1 = Some(v.as_u16().ok_or_else(|| mismatch(id, v))?);
            Ok(())
        })
        .on(IFLA_DUMMY_IFACE_ATTR_2, |id, v, c| {
            c.current.dummy().attr2 = Some(u32_of(id, v)?);
            Ok(())
        })
        .on(IFLA_DUMMY_IFACE_ATTR_BIN, |id, v, c| {
            let bin = v.as_bytes().ok_or_else(|| mismatch(id, v))?;
            c.current.dummy().bin = Some(bin.iter().map(|b| format!("{:02x}", b)).collect());
            Ok(())
        })
        .build();

    let nest = DispatchTable::<ReportCollector>::builder(Namespace::DummyNest)
        .on(IFLA_DUMMY_IFACE_ATTR_NEST_A, |id, v, c| {
            c.current.dummy().nest_a = Some(u32_of(id, v)?);
            Ok(())
        })
        .on(IFLA_DUMMY_IFACE_ATTR_NEST_B, |id, v, c| {
            c.current.dummy().nest_b = Some(u32_of(id, v)?);
            Ok(())
        })
        .build();

    NotificationDecoder::new()
        .with_table(link)
        .with_table(info)
        .with_table(dummy)
        .with_table(nest)
}
