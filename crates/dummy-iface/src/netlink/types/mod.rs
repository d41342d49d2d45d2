//! Fixed-layout netlink structures.

pub mod link;
