//! Passive link notification listener.
//!
//! # Example
//!
//! ```ignore
//! use dummy_iface::listener::{ReportCollector, report_decoder};
//! use dummy_iface::netlink::NetlinkSocket;
//!
//! let socket = NetlinkSocket::link_monitor()?;
//! let decoder = report_decoder();
//! let mut collector = ReportCollector::new();
//!
//! loop {
//!     let buf = socket.recv_msg().await?;
//!     decoder.intake(&buf, &mut collector);
//!     for report in collector.take() {
//!         println!("{}", report);
//!     }
//! }
//! ```

mod dispatch;
mod report;

pub use dispatch::{DispatchTable, DispatchTableBuilder, Handler, LinkContext, NotificationDecoder};
pub use report::{DummyIfaceReport, LinkReport, ReportCollector, report_decoder};
