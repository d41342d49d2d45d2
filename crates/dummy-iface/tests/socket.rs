//! Socket tests against the running kernel.
//!
//! Run with: `cargo test -p dummy-iface --test socket --features integration`

#![cfg(feature = "integration")]

use std::time::Duration;

use dummy_iface::netlink::message::{MessageIter, NLM_F_DUMP, NLM_F_REQUEST};
use dummy_iface::netlink::types::link::{IfInfoMsg, LinkMessage};
use dummy_iface::netlink::{MessageBuilder, NetlinkSocket, NlMsgType};

#[tokio::test]
async fn test_link_monitor_binds() {
    let socket = NetlinkSocket::link_monitor().unwrap();
    assert_ne!(socket.pid(), 0);
}

#[tokio::test]
async fn test_dump_contains_loopback() {
    let socket = NetlinkSocket::new().unwrap();
    let mut req = MessageBuilder::new(NlMsgType::RTM_GETLINK, NLM_F_REQUEST | NLM_F_DUMP);
    req.set_seq(1);
    req.append(&IfInfoMsg::new());
    socket.send(&req.finish()).await.unwrap();

    let mut names = Vec::new();
    'recv: loop {
        let buf = tokio::time::timeout(Duration::from_secs(2), socket.recv_msg())
            .await
            .expect("dump timed out")
            .unwrap();
        for msg in MessageIter::new(&buf) {
            let (hdr, payload) = msg.unwrap();
            if hdr.is_done() {
                break 'recv;
            }
            if let Ok(link) = LinkMessage::from_bytes(payload) {
                names.extend(link.name().map(str::to_string));
            }
        }
    }

    assert!(names.iter().any(|n| n == "lo"), "loopback not found");
}
