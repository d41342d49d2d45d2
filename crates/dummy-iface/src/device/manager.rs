//! In-process link management.
//!
//! [`LinkManager`] plays the generic rtnetlink side of the link lifecycle:
//! it accepts `RTM_NEWLINK`, `RTM_DELLINK` and `RTM_GETLINK` requests,
//! validates them against the link policy, hands `IFLA_INFO_DATA` to the
//! `dummy_iface` driver and answers with netlink replies. Every successful
//! change also produces a multicast-style notification message that the
//! listener can decode.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::link::{DummyIface, ETH_ALEN};
use super::registry::{LinkRegistry, MemoryRegistry};
use crate::netlink::codec::{self, AttrSet, AttrValue, RawAttrs};
use crate::netlink::message::{
    MessageIter, NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_MULTI, NlMsgError,
    NlMsgHdr, NlMsgType,
};
use crate::netlink::policy::{Namespace, ifla, ifla_info};
use crate::netlink::types::link::{ARPHRD_ETHER, IfInfoMsg, LinkMessage, iff, split_link_message};
use crate::netlink::{Error, MessageBuilder, Result};

/// Default MTU of a new link.
pub const DEFAULT_MTU: u32 = 1500;

/// IF_OPER_UNKNOWN, reported by devices without carrier handling.
const OPER_UNKNOWN: u8 = 0;

#[derive(Debug)]
struct ManagedLink {
    device: DummyIface,
    address: [u8; ETH_ALEN],
    mtu: u32,
}

impl ManagedLink {
    fn message(&self) -> LinkMessage {
        let mut info = AttrSet::new();
        info.insert(
            ifla_info::IFLA_INFO_KIND,
            AttrValue::String(DummyIface::KIND.to_string()),
        );
        info.insert(
            ifla_info::IFLA_INFO_DATA,
            AttrValue::nested(Namespace::DummyIface, self.device.dump()),
        );

        let mut attrs = AttrSet::new();
        attrs.insert(ifla::IFLA_ADDRESS, AttrValue::Bytes(self.address.to_vec()));
        attrs.insert(
            ifla::IFLA_IFNAME,
            AttrValue::String(self.device.name().to_string()),
        );
        attrs.insert(ifla::IFLA_MTU, AttrValue::U32(self.mtu));
        attrs.insert(ifla::IFLA_OPERSTATE, AttrValue::U8(OPER_UNKNOWN));
        attrs.insert(
            ifla::IFLA_LINKINFO,
            AttrValue::nested(Namespace::LinkInfo, info),
        );

        LinkMessage {
            header: IfInfoMsg {
                ifi_type: ARPHRD_ETHER,
                ifi_index: self.device.ifindex() as i32,
                ifi_flags: iff::BROADCAST | iff::NOARP,
                ..IfInfoMsg::default()
            },
            attrs,
        }
    }
}

/// Locally administered address derived from the interface index.
fn default_address(ifindex: u32) -> [u8; ETH_ALEN] {
    let idx = ifindex.to_be_bytes();
    [0x02, 0x00, idx[0], idx[1], idx[2], idx[3]]
}

/// Build an `NLMSG_ERROR` reply for `request`. `error` is 0 for an ACK.
pub fn error_reply(request: &NlMsgHdr, error: i32) -> Vec<u8> {
    let mut builder = MessageBuilder::new(NlMsgType::ERROR, 0);
    builder.set_seq(request.nlmsg_seq);
    builder.set_pid(request.nlmsg_pid);
    builder.append(&NlMsgError {
        error,
        msg: *request,
    });
    builder.finish()
}

/// Owner of all `dummy_iface` links and their registry.
#[derive(Debug)]
pub struct LinkManager<R: LinkRegistry = MemoryRegistry> {
    registry: R,
    links: BTreeMap<u32, ManagedLink>,
    notifications: Vec<Vec<u8>>,
}

impl Default for LinkManager<MemoryRegistry> {
    fn default() -> Self {
        Self::new(MemoryRegistry::new())
    }
}

impl<R: LinkRegistry> LinkManager<R> {
    /// Create a manager on top of `registry`.
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            links: BTreeMap::new(),
            notifications: Vec::new(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Look up a link by name.
    pub fn get(&self, name: &str) -> Option<&DummyIface> {
        self.find(name).and_then(|idx| self.links.get(&idx)).map(|l| &l.device)
    }

    /// Iterate over all links in index order.
    pub fn links(&self) -> impl Iterator<Item = &DummyIface> {
        self.links.values().map(|l| &l.device)
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if there are no links.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Drain the notification messages produced so far.
    pub fn take_notifications(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.notifications)
    }

    fn find(&self, name: &str) -> Option<u32> {
        self.links
            .iter()
            .find(|(_, l)| l.device.name() == name)
            .map(|(idx, _)| *idx)
    }

    /// Resolve the target of a request by index, then by name.
    fn lookup(&self, header: &IfInfoMsg, tb: &RawAttrs<'_>) -> Result<Option<u32>> {
        if header.ifi_index > 0 {
            let idx = header.ifi_index as u32;
            return Ok(self.links.contains_key(&idx).then_some(idx));
        }
        match tb.get(ifla::IFLA_IFNAME) {
            Some(raw) => {
                let name = crate::netlink::attr::get::string(raw)?;
                Ok(self.find(name))
            }
            None => Ok(None),
        }
    }

    fn free_name(&self) -> String {
        (0..)
            .map(|n| format!("{}{}", DummyIface::KIND, n))
            .find(|name| self.find(name).is_none())
            .unwrap_or_else(|| DummyIface::KIND.to_string())
    }

    /// Process every request in `buf` and return the concatenated replies.
    pub fn handle_request(&mut self, buf: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();

        for msg in MessageIter::new(buf) {
            let (header, payload) = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "dropping malformed request");
                    break;
                }
            };

            let result = match header.nlmsg_type {
                NlMsgType::RTM_NEWLINK => self.new_link(header, payload).map(|()| Vec::new()),
                NlMsgType::RTM_DELLINK => self.del_link(payload).map(|()| Vec::new()),
                NlMsgType::RTM_GETLINK => self.get_link(header, payload),
                other => Err(Error::NotSupported(format!(
                    "message type {}",
                    NlMsgType::name(other)
                ))),
            };

            match result {
                Ok(replies) => {
                    out.extend_from_slice(&replies);
                    if header.has_flag(NLM_F_ACK) {
                        out.extend_from_slice(&error_reply(header, 0));
                    }
                }
                Err(e) => {
                    debug!(
                        msg_type = NlMsgType::name(header.nlmsg_type),
                        seq = header.nlmsg_seq,
                        error = %e,
                        "request failed"
                    );
                    out.extend_from_slice(&error_reply(header, -e.errno()));
                }
            }
        }
        out
    }

    /// Create a link, or change an existing one.
    pub fn new_link(&mut self, request: &NlMsgHdr, payload: &[u8]) -> Result<()> {
        let (header, attrs) = split_link_message(payload)?;

        // Policy check of the whole request before anything is touched.
        let msg = LinkMessage {
            header,
            attrs: codec::decode(attrs, Namespace::Link)?,
        };
        let tb = codec::scan(attrs)?;
        let info = tb.get(ifla::IFLA_LINKINFO).map(codec::scan).transpose()?;
        let data = info
            .as_ref()
            .and_then(|i| i.get(ifla_info::IFLA_INFO_DATA))
            .map(codec::scan)
            .transpose()?;

        match msg.kind() {
            Some(kind) if kind != DummyIface::KIND => {
                return Err(Error::NotSupported(format!("link kind {}", kind)));
            }
            None if data.is_some() => {
                return Err(Error::NotSupported("link data without kind".into()));
            }
            _ => {}
        }

        if let Some(idx) = self.lookup(&header, &tb)? {
            if request.has_flag(NLM_F_EXCL) {
                let name = self.links[&idx].device.name().to_string();
                return Err(Error::AlreadyExists { name });
            }
            DummyIface::validate(&tb, data.as_ref())?;

            let Some(link) = self.links.get_mut(&idx) else {
                return Err(Error::InterfaceNotFound {
                    name: format!("index {}", idx),
                });
            };
            link.device.changelink(data.as_ref(), &mut self.registry)?;
            if let Some(addr) = tb.get(ifla::IFLA_ADDRESS) {
                link.address.copy_from_slice(addr);
            }
            if let Some(mtu) = msg.attrs.get(&ifla::IFLA_MTU).and_then(AttrValue::as_u32) {
                link.mtu = mtu;
            }
            let notification = link.message().to_message(NlMsgType::RTM_NEWLINK, 0, 0);
            self.notifications.push(notification);
            return Ok(());
        }

        if header.ifi_index > 0 || !request.has_flag(NLM_F_CREATE) {
            return Err(Error::InterfaceNotFound {
                name: msg
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("index {}", header.ifi_index)),
            });
        }
        if msg.kind().is_none() {
            return Err(Error::NotSupported("link without kind".into()));
        }

        DummyIface::validate(&tb, data.as_ref())?;
        let name = msg
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| self.free_name());
        let device = DummyIface::create(&name, data.as_ref(), &mut self.registry)?;

        let ifindex = device.ifindex();
        let mut address = default_address(ifindex);
        if let Some(addr) = tb.get(ifla::IFLA_ADDRESS) {
            address.copy_from_slice(addr);
        }
        let link = ManagedLink {
            device,
            address,
            mtu: msg
                .attrs
                .get(&ifla::IFLA_MTU)
                .and_then(AttrValue::as_u32)
                .unwrap_or(DEFAULT_MTU),
        };
        debug!(name, ifindex, "created link");
        self.notifications
            .push(link.message().to_message(NlMsgType::RTM_NEWLINK, 0, 0));
        self.links.insert(ifindex, link);
        Ok(())
    }

    /// Delete a link selected by index or name.
    pub fn del_link(&mut self, payload: &[u8]) -> Result<()> {
        let (header, attrs) = split_link_message(payload)?;
        let tb = codec::scan(attrs)?;

        let link = self
            .lookup(&header, &tb)?
            .and_then(|idx| self.links.remove(&idx))
            .ok_or_else(|| Error::InterfaceNotFound {
                name: tb
                    .get(ifla::IFLA_IFNAME)
                    .and_then(|raw| crate::netlink::attr::get::string(raw).ok())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("index {}", header.ifi_index)),
            })?;

        self.notifications
            .push(link.message().to_message(NlMsgType::RTM_DELLINK, 0, 0));
        debug!(name = link.device.name(), "deleting link");
        link.device.dellink(&mut self.registry);
        Ok(())
    }

    /// Answer a get request: one link, or all of them for `NLM_F_DUMP`.
    pub fn get_link(&self, request: &NlMsgHdr, payload: &[u8]) -> Result<Vec<u8>> {
        let seq = request.nlmsg_seq;

        if request.has_flag(NLM_F_DUMP) {
            let mut out = Vec::new();
            for link in self.links.values() {
                out.extend(
                    link.message()
                        .to_message(NlMsgType::RTM_NEWLINK, NLM_F_MULTI, seq),
                );
            }
            let mut done = MessageBuilder::new(NlMsgType::DONE, NLM_F_MULTI);
            done.set_seq(seq);
            done.append(&0i32);
            out.extend(done.finish());
            return Ok(out);
        }

        let (header, attrs) = split_link_message(payload)?;
        let tb = codec::scan(attrs)?;
        let link = self
            .lookup(&header, &tb)?
            .and_then(|idx| self.links.get(&idx))
            .ok_or_else(|| Error::InterfaceNotFound {
                name: format!("index {}", header.ifi_index),
            })?;
        Ok(link.message().to_message(NlMsgType::RTM_NEWLINK, 0, seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::registry::NetdevEvent;
    use crate::netlink::message::NLM_F_REQUEST;
    use crate::netlink::policy::ifla_dummy::*;

    fn request(msg_type: u16, flags: u16, seq: u32, link: LinkMessage) -> Vec<u8> {
        link.to_message(msg_type, NLM_F_REQUEST | flags, seq)
    }

    fn new_link(name: &str, data: AttrSet) -> LinkMessage {
        let mut info = AttrSet::new();
        info.insert(
            ifla_info::IFLA_INFO_KIND,
            AttrValue::String(DummyIface::KIND.into()),
        );
        if !data.is_empty() {
            info.insert(
                ifla_info::IFLA_INFO_DATA,
                AttrValue::nested(Namespace::DummyIface, data),
            );
        }
        let mut attrs = AttrSet::new();
        attrs.insert(ifla::IFLA_IFNAME, AttrValue::String(name.into()));
        attrs.insert(
            ifla::IFLA_LINKINFO,
            AttrValue::nested(Namespace::LinkInfo, info),
        );
        LinkMessage {
            header: IfInfoMsg::default(),
            attrs,
        }
    }

    fn by_name(name: &str) -> LinkMessage {
        let mut attrs = AttrSet::new();
        attrs.insert(ifla::IFLA_IFNAME, AttrValue::String(name.into()));
        LinkMessage {
            header: IfInfoMsg::default(),
            attrs,
        }
    }

    fn errors(reply: &[u8]) -> Vec<i32> {
        MessageIter::new(reply)
            .map(|m| m.unwrap())
            .filter(|(h, _)| h.is_error())
            .map(|(_, p)| NlMsgError::from_bytes(p).unwrap().error)
            .collect()
    }

    #[test]
    fn test_create_and_ack() {
        let mut mgr = LinkManager::default();
        let mut data = AttrSet::new();
        data.insert(IFLA_DUMMY_IFACE_ATTR_2, AttrValue::U32(77));

        let reply = mgr.handle_request(&request(
            NlMsgType::RTM_NEWLINK,
            NLM_F_CREATE | NLM_F_EXCL | NLM_F_ACK,
            1,
            new_link("di0", data),
        ));
        assert_eq!(errors(&reply), vec![0]);

        let dev = mgr.get("di0").unwrap();
        assert_eq!(dev.params().attr2, 77);
        assert_eq!(mgr.len(), 1);
        assert_eq!(mgr.take_notifications().len(), 1);
    }

    #[test]
    fn test_create_requires_create_flag() {
        let mut mgr = LinkManager::default();
        let reply = mgr.handle_request(&request(
            NlMsgType::RTM_NEWLINK,
            NLM_F_ACK,
            1,
            new_link("di0", AttrSet::new()),
        ));
        assert_eq!(errors(&reply), vec![-libc::ENODEV]);
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_exclusive_create_of_existing_link() {
        let mut mgr = LinkManager::default();
        let req = request(
            NlMsgType::RTM_NEWLINK,
            NLM_F_CREATE | NLM_F_EXCL,
            1,
            new_link("di0", AttrSet::new()),
        );
        assert!(mgr.handle_request(&req).is_empty());
        assert_eq!(errors(&mgr.handle_request(&req)), vec![-libc::EEXIST]);
    }

    #[test]
    fn test_unknown_kind_not_supported() {
        let mut mgr = LinkManager::default();
        let mut msg = new_link("v0", AttrSet::new());
        let mut info = AttrSet::new();
        info.insert(ifla_info::IFLA_INFO_KIND, AttrValue::String("vlan".into()));
        msg.attrs.insert(
            ifla::IFLA_LINKINFO,
            AttrValue::nested(Namespace::LinkInfo, info),
        );

        let reply =
            mgr.handle_request(&request(NlMsgType::RTM_NEWLINK, NLM_F_CREATE, 1, msg));
        assert_eq!(errors(&reply), vec![-libc::EOPNOTSUPP]);
    }

    #[test]
    fn test_invalid_data_rejected_before_create() {
        let mut mgr = LinkManager::default();
        let mut b = MessageBuilder::new(NlMsgType::RTM_NEWLINK, NLM_F_REQUEST | NLM_F_CREATE);
        b.append(&IfInfoMsg::default());
        b.append_attr_str(ifla::IFLA_IFNAME, "di0");
        let linkinfo = b.nest_start(ifla::IFLA_LINKINFO);
        b.append_attr_str(ifla_info::IFLA_INFO_KIND, DummyIface::KIND);
        let data = b.nest_start(ifla_info::IFLA_INFO_DATA);
        b.append_attr_u8(IFLA_DUMMY_IFACE_ATTR_0, 1);
        b.append_attr(IFLA_DUMMY_IFACE_ATTR_BIN, &[0; 4]);
        b.nest_end(data);
        b.nest_end(linkinfo);

        let reply = mgr.handle_request(&b.finish());
        assert_eq!(errors(&reply), vec![-libc::EINVAL]);
        assert!(mgr.is_empty());
        assert!(mgr.registry().events().is_empty());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let mut mgr = LinkManager::default();
        let mut msg = new_link("di0", AttrSet::new());
        msg.attrs
            .insert(ifla::IFLA_ADDRESS, AttrValue::Bytes(vec![0x01, 0, 0, 0, 0, 1]));
        let reply =
            mgr.handle_request(&request(NlMsgType::RTM_NEWLINK, NLM_F_CREATE, 1, msg));
        assert_eq!(errors(&reply), vec![-libc::EADDRNOTAVAIL]);
    }

    #[test]
    fn test_change_existing_link() {
        let mut mgr = LinkManager::default();
        mgr.handle_request(&request(
            NlMsgType::RTM_NEWLINK,
            NLM_F_CREATE,
            1,
            new_link("di0", AttrSet::new()),
        ));

        let mut data = AttrSet::new();
        data.insert(IFLA_DUMMY_IFACE_ATTR_0, AttrValue::U8(3));
        let mut msg = new_link("di0", data);
        msg.attrs.insert(ifla::IFLA_MTU, AttrValue::U32(9000));
        let reply = mgr.handle_request(&request(NlMsgType::RTM_NEWLINK, NLM_F_ACK, 2, msg));
        assert_eq!(errors(&reply), vec![0]);

        assert_eq!(mgr.get("di0").unwrap().params().attr0, 3);
        assert_eq!(mgr.take_notifications().len(), 2);
        assert_eq!(
            mgr.registry().events().last(),
            Some(&("di0".to_string(), NetdevEvent::ChangeInfoData))
        );
    }

    #[test]
    fn test_data_without_kind_changes_nothing() {
        let mut mgr = LinkManager::default();
        mgr.handle_request(&request(
            NlMsgType::RTM_NEWLINK,
            NLM_F_CREATE,
            1,
            new_link("di0", AttrSet::new()),
        ));
        mgr.take_notifications();
        let events = mgr.registry().events().len();

        let mut b = MessageBuilder::new(NlMsgType::RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK);
        b.append(&IfInfoMsg::default());
        b.append_attr_str(ifla::IFLA_IFNAME, "di0");
        let linkinfo = b.nest_start(ifla::IFLA_LINKINFO);
        let data = b.nest_start(ifla_info::IFLA_INFO_DATA);
        b.append_attr_u8(IFLA_DUMMY_IFACE_ATTR_0, 9);
        b.append_attr(IFLA_DUMMY_IFACE_ATTR_1, &[1, 2, 3]);
        b.nest_end(data);
        b.nest_end(linkinfo);

        let reply = mgr.handle_request(&b.finish());
        assert_eq!(errors(&reply), vec![-libc::EOPNOTSUPP]);
        assert_eq!(mgr.get("di0").unwrap().params().attr0, 0);
        assert_eq!(mgr.registry().events().len(), events);
        assert!(mgr.take_notifications().is_empty());
    }

    #[test]
    fn test_get_link_reply() {
        let mut mgr = LinkManager::default();
        let mut data = AttrSet::new();
        data.insert(IFLA_DUMMY_IFACE_ATTR_1, AttrValue::U16(513));
        mgr.handle_request(&request(
            NlMsgType::RTM_NEWLINK,
            NLM_F_CREATE,
            1,
            new_link("di0", data),
        ));

        let reply = mgr.handle_request(&request(NlMsgType::RTM_GETLINK, 0, 9, by_name("di0")));
        let (hdr, payload) = MessageIter::new(&reply).next().unwrap().unwrap();
        assert_eq!(hdr.nlmsg_type, NlMsgType::RTM_NEWLINK);
        assert_eq!(hdr.nlmsg_seq, 9);

        let link = LinkMessage::from_bytes(payload).unwrap();
        assert_eq!(link.name(), Some("di0"));
        assert_eq!(link.kind(), Some(DummyIface::KIND));
        assert_eq!(link.address(), Some(&default_address(1)[..]));
        let data = link.info_data().and_then(AttrValue::as_nested).unwrap();
        assert_eq!(data[&IFLA_DUMMY_IFACE_ATTR_1], AttrValue::U16(513));
        assert_eq!(*data, mgr.get("di0").unwrap().dump());
    }

    #[test]
    fn test_dump_all_links() {
        let mut mgr = LinkManager::default();
        for name in ["di0", "di1"] {
            mgr.handle_request(&request(
                NlMsgType::RTM_NEWLINK,
                NLM_F_CREATE,
                1,
                new_link(name, AttrSet::new()),
            ));
        }

        let reply = mgr.handle_request(&request(
            NlMsgType::RTM_GETLINK,
            NLM_F_DUMP,
            5,
            LinkMessage::default(),
        ));
        let types: Vec<u16> = MessageIter::new(&reply)
            .map(|m| m.unwrap().0.nlmsg_type)
            .collect();
        assert_eq!(
            types,
            vec![
                NlMsgType::RTM_NEWLINK,
                NlMsgType::RTM_NEWLINK,
                NlMsgType::DONE
            ]
        );
    }

    #[test]
    fn test_generated_name() {
        let mut mgr = LinkManager::default();
        let mut msg = new_link("unused", AttrSet::new());
        msg.attrs.remove(&ifla::IFLA_IFNAME);
        mgr.handle_request(&request(NlMsgType::RTM_NEWLINK, NLM_F_CREATE, 1, msg));
        assert!(mgr.get("dummy_iface0").is_some());
    }

    #[test]
    fn test_delete_link() {
        let mut mgr = LinkManager::default();
        mgr.handle_request(&request(
            NlMsgType::RTM_NEWLINK,
            NLM_F_CREATE,
            1,
            new_link("di0", AttrSet::new()),
        ));
        mgr.take_notifications();

        let reply = mgr.handle_request(&request(NlMsgType::RTM_DELLINK, NLM_F_ACK, 2, by_name("di0")));
        assert_eq!(errors(&reply), vec![0]);
        assert!(mgr.is_empty());
        assert!(mgr.registry().is_empty());

        let notes = mgr.take_notifications();
        let (hdr, _) = MessageIter::new(&notes[0]).next().unwrap().unwrap();
        assert_eq!(hdr.nlmsg_type, NlMsgType::RTM_DELLINK);

        let reply = mgr.handle_request(&request(NlMsgType::RTM_DELLINK, 0, 3, by_name("di0")));
        assert_eq!(errors(&reply), vec![-libc::ENODEV]);
    }

    #[test]
    fn test_unsupported_message_type() {
        let mut mgr = LinkManager::default();
        let reply = mgr.handle_request(&request(NlMsgType::RTM_SETLINK, 0, 1, by_name("di0")));
        assert_eq!(errors(&reply), vec![-libc::EOPNOTSUPP]);
    }
}
