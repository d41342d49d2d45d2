//! Error types for attribute decoding and link operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding attributes or driving a link.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Attribute payload length disagrees with its policy.
    #[error("attribute {id}: length violation, expected {expected} bytes, got {actual}")]
    LengthViolation {
        /// Attribute id.
        id: u16,
        /// Length allowed by the policy (exact or maximum, depending on the kind).
        expected: usize,
        /// Payload length found on the wire.
        actual: usize,
    },

    /// Attribute payload is not encoded the way its policy requires.
    #[error("attribute {id}: type violation, {reason}")]
    TypeViolation {
        /// Attribute id.
        id: u16,
        /// What was wrong with the encoding.
        reason: String,
    },

    /// Hardware address rejected by system-attribute validation.
    #[error("invalid hardware address: {0}")]
    InvalidAddress(String),

    /// The device registry refused to register the link.
    #[error("registration of {name} failed: {reason}")]
    RegistrationFailed {
        /// Link name.
        name: String,
        /// Reason reported by the registry.
        reason: String,
    },

    /// Operation not supported.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Interface not found.
    #[error("interface not found: {name}")]
    InterfaceNotFound {
        /// The interface name that was not found.
        name: String,
    },

    /// Interface already exists.
    #[error("interface already exists: {name}")]
    AlreadyExists {
        /// The interface name.
        name: String,
    },
}

impl Error {
    /// Check if this is an attribute validation error.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::LengthViolation { .. } | Self::TypeViolation { .. }
        )
    }

    /// Check if this is a "already exists" error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Get the errno a netlink error reply would carry for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Self::InvalidAddress(_) => libc::EADDRNOTAVAIL,
            Self::InterfaceNotFound { .. } => libc::ENODEV,
            Self::AlreadyExists { .. } => libc::EEXIST,
            Self::NotSupported(_) => libc::EOPNOTSUPP,
            _ => libc::EINVAL,
        }
    }
}
