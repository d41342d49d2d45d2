//! Table-driven dispatch of decoded link notifications.
//!
//! A [`NotificationDecoder`] owns one [`DispatchTable`] per attribute
//! namespace. Link messages are decoded with the link policy, then every
//! attribute is handed to the handler registered for its id; nested
//! containers are walked with the table of their own namespace.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{trace, warn};

use crate::netlink::codec::{AttrSet, AttrValue};
use crate::netlink::message::{MessageIter, NlMsgType};
use crate::netlink::policy::Namespace;
use crate::netlink::types::link::{IfInfoMsg, LinkMessage};
use crate::netlink::Result;

/// Attribute handler: receives the attribute id, its value and the caller's context.
pub type Handler<C> = Box<dyn Fn(u16, &AttrValue, &mut C) -> Result<()> + Send + Sync>;

/// Per-message hooks for contexts fed through [`NotificationDecoder::intake`].
pub trait LinkContext {
    /// Called before the attributes of a link message are dispatched.
    fn begin(&mut self, _msg_type: u16, _header: &IfInfoMsg) {}

    /// Called once every attribute of the message has been dispatched.
    fn finish(&mut self) {}
}

/// Handlers of one namespace, keyed by attribute id.
pub struct DispatchTable<C> {
    namespace: Namespace,
    handlers: BTreeMap<u16, Handler<C>>,
}

impl<C> DispatchTable<C> {
    /// Start building a table for `namespace`.
    pub fn builder(namespace: Namespace) -> DispatchTableBuilder<C> {
        DispatchTableBuilder {
            namespace,
            handlers: BTreeMap::new(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Handler for `id`, if one is registered.
    pub fn get(&self, id: u16) -> Option<&Handler<C>> {
        self.handlers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C> fmt::Debug for DispatchTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("namespace", &self.namespace)
            .field("ids", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`DispatchTable`].
pub struct DispatchTableBuilder<C> {
    namespace: Namespace,
    handlers: BTreeMap<u16, Handler<C>>,
}

impl<C> DispatchTableBuilder<C> {
    /// Register `handler` for attribute `id`, replacing any previous one.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not part of the namespace policy.
    pub fn on<F>(mut self, id: u16, handler: F) -> Self
    where
        F: Fn(u16, &AttrValue, &mut C) -> Result<()> + Send + Sync + 'static,
    {
        assert!(
            self.namespace.spec(id).is_some(),
            "attribute {} is not part of the {} policy",
            id,
            self.namespace
        );
        self.handlers.insert(id, Box::new(handler));
        self
    }

    pub fn build(self) -> DispatchTable<C> {
        DispatchTable {
            namespace: self.namespace,
            handlers: self.handlers,
        }
    }
}

/// Recursive decoder for link notifications.
pub struct NotificationDecoder<C> {
    tables: BTreeMap<Namespace, DispatchTable<C>>,
}

impl<C> Default for NotificationDecoder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for NotificationDecoder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tables.values()).finish()
    }
}

impl<C> NotificationDecoder<C> {
    /// Create a decoder without any handler.
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Add a table, replacing the one of the same namespace.
    pub fn with_table(mut self, table: DispatchTable<C>) -> Self {
        self.tables.insert(table.namespace(), table);
        self
    }

    /// Table of `namespace`, if any.
    pub fn table(&self, namespace: Namespace) -> Option<&DispatchTable<C>> {
        self.tables.get(&namespace)
    }

    /// Hand every attribute of `attrs` to its handler, descending into
    /// nested values. Returns the number of handler invocations.
    ///
    /// A failing handler is logged; the remaining attributes are still
    /// dispatched.
    pub fn dispatch(&self, attrs: &AttrSet, namespace: Namespace, ctx: &mut C) -> usize {
        let table = self.tables.get(&namespace);
        let mut calls = 0;

        for (&id, value) in attrs {
            if let Some(handler) = table.and_then(|t| t.get(id)) {
                calls += 1;
                if let Err(error) = handler(id, value, ctx) {
                    warn!(%namespace, id, %error, "attribute handler failed");
                }
            }

            if let AttrValue::Nested {
                namespace: inner,
                attrs: children,
            } = value
            {
                calls += self.dispatch(children, *inner, ctx);
            }
        }
        calls
    }
}

impl<C: LinkContext> NotificationDecoder<C> {
    /// Decode and dispatch every link message found in `buf`.
    ///
    /// Messages other than `RTM_NEWLINK` and `RTM_DELLINK` are ignored. A
    /// message that fails to decode is logged and skipped. Returns the
    /// number of messages dispatched.
    pub fn intake(&self, buf: &[u8], ctx: &mut C) -> usize {
        let mut dispatched = 0;

        for msg in MessageIter::new(buf) {
            let (header, payload) = match msg {
                Ok(msg) => msg,
                Err(error) => {
                    warn!(%error, "dropping rest of netlink buffer");
                    break;
                }
            };

            match header.nlmsg_type {
                NlMsgType::RTM_NEWLINK | NlMsgType::RTM_DELLINK => {}
                other => {
                    trace!(msg_type = NlMsgType::name(other), "ignoring message");
                    continue;
                }
            }

            let link = match LinkMessage::from_bytes(payload) {
                Ok(link) => link,
                Err(error) => {
                    warn!(
                        msg_type = NlMsgType::name(header.nlmsg_type),
                        seq = header.nlmsg_seq,
                        %error,
                        "skipping malformed link message"
                    );
                    continue;
                }
            };

            ctx.begin(header.nlmsg_type, &link.header);
            let calls = self.dispatch(&link.attrs, Namespace::Link, ctx);
            ctx.finish();
            trace!(ifindex = link.ifindex(), calls, "dispatched link message");
            dispatched += 1;
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::NLM_F_REQUEST;
    use crate::netlink::policy::{DUMMY_IFACE_KIND, ifla, ifla_dummy::*, ifla_info};
    use crate::netlink::{Error, MessageBuilder};

    #[derive(Debug, Default)]
    struct Seen {
        ids: Vec<(Namespace, u16)>,
        messages: usize,
    }

    impl LinkContext for Seen {
        fn finish(&mut self) {
            self.messages += 1;
        }
    }

    fn record(ns: Namespace) -> impl Fn(u16, &AttrValue, &mut Seen) -> Result<()> {
        move |id, _, seen| {
            seen.ids.push((ns, id));
            Ok(())
        }
    }

    fn decoder() -> NotificationDecoder<Seen> {
        NotificationDecoder::new()
            .with_table(
                DispatchTable::builder(Namespace::Link)
                    .on(ifla::IFLA_IFNAME, record(Namespace::Link))
                    .build(),
            )
            .with_table(
                DispatchTable::builder(Namespace::LinkInfo)
                    .on(ifla_info::IFLA_INFO_KIND, record(Namespace::LinkInfo))
                    .build(),
            )
            .with_table(
                DispatchTable::builder(Namespace::DummyIface)
                    .on(IFLA_DUMMY_IFACE_ATTR_0, record(Namespace::DummyIface))
                    .on(IFLA_DUMMY_IFACE_ATTR_1, record(Namespace::DummyIface))
                    .build(),
            )
    }

    fn link_with_data(msg_type: u16) -> Vec<u8> {
        let mut b = MessageBuilder::new(msg_type, NLM_F_REQUEST);
        b.append(&IfInfoMsg::new().with_index(4));
        b.append_attr_str(ifla::IFLA_IFNAME, "di0");
        let info = b.nest_start(ifla::IFLA_LINKINFO);
        b.append_attr_str(ifla_info::IFLA_INFO_KIND, DUMMY_IFACE_KIND);
        let data = b.nest_start(ifla_info::IFLA_INFO_DATA);
        b.append_attr_u8(IFLA_DUMMY_IFACE_ATTR_0, 1);
        b.append_attr_u16(IFLA_DUMMY_IFACE_ATTR_1, 2);
        b.nest_end(data);
        b.nest_end(info);
        b.finish()
    }

    #[test]
    fn test_nested_dispatch_calls_each_handler_once() {
        let mut seen = Seen::default();
        let n = decoder().intake(&link_with_data(NlMsgType::RTM_NEWLINK), &mut seen);

        assert_eq!(n, 1);
        assert_eq!(seen.messages, 1);
        assert_eq!(
            seen.ids,
            vec![
                (Namespace::Link, ifla::IFLA_IFNAME),
                (Namespace::LinkInfo, ifla_info::IFLA_INFO_KIND),
                (Namespace::DummyIface, IFLA_DUMMY_IFACE_ATTR_0),
                (Namespace::DummyIface, IFLA_DUMMY_IFACE_ATTR_1),
            ]
        );
    }

    #[test]
    fn test_handler_error_does_not_stop_dispatch() {
        let decoder = NotificationDecoder::new().with_table(
            DispatchTable::builder(Namespace::DummyIface)
                .on(IFLA_DUMMY_IFACE_ATTR_0, |_, _, _: &mut Seen| {
                    Err(Error::InvalidAttribute("rejected".into()))
                })
                .on(IFLA_DUMMY_IFACE_ATTR_1, record(Namespace::DummyIface))
                .build(),
        );

        let mut seen = Seen::default();
        assert_eq!(
            decoder.intake(&link_with_data(NlMsgType::RTM_DELLINK), &mut seen),
            1
        );
        assert_eq!(
            seen.ids,
            vec![(Namespace::DummyIface, IFLA_DUMMY_IFACE_ATTR_1)]
        );
    }

    #[test]
    fn test_malformed_message_is_skipped() {
        let mut bad = MessageBuilder::new(NlMsgType::RTM_NEWLINK, 0);
        bad.append(&IfInfoMsg::new());
        bad.append_attr_u16(ifla::IFLA_MTU, 1500);
        let mut buf = bad.finish();
        buf.extend(link_with_data(NlMsgType::RTM_NEWLINK));

        let mut seen = Seen::default();
        assert_eq!(decoder().intake(&buf, &mut seen), 1);
        assert_eq!(seen.messages, 1);
    }

    #[test]
    fn test_other_message_types_ignored() {
        let mut done = MessageBuilder::new(NlMsgType::DONE, 0);
        done.append(&0i32);
        let mut buf = done.finish();
        buf.extend(link_with_data(NlMsgType::RTM_GETLINK));

        let mut seen = Seen::default();
        assert_eq!(decoder().intake(&buf, &mut seen), 0);
        assert!(seen.ids.is_empty());
    }

    #[test]
    fn test_missing_table_still_descends() {
        let decoder = NotificationDecoder::new().with_table(
            DispatchTable::builder(Namespace::DummyIface)
                .on(IFLA_DUMMY_IFACE_ATTR_1, record(Namespace::DummyIface))
                .build(),
        );
        let mut seen = Seen::default();
        decoder.intake(&link_with_data(NlMsgType::RTM_NEWLINK), &mut seen);
        assert_eq!(seen.ids.len(), 1);
        assert!(decoder.table(Namespace::Link).is_none());
    }

    #[test]
    #[should_panic(expected = "not part of the link policy")]
    fn test_handler_for_unknown_id_panics() {
        let _ = DispatchTable::<Seen>::builder(Namespace::Link).on(999, |_, _, _| Ok(()));
    }
}
