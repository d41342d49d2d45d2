//! Policy-driven attribute codec.
//!
//! Decoding is split in two passes. [`scan`] walks the record framing and
//! keeps the last payload seen for every id, without interpreting it.
//! [`validate`] checks one payload against its [`AttrSpec`] and turns it into
//! an [`AttrValue`]. [`decode`] frames the whole buffer with `scan`, then
//! validates every record in wire order; nested containers are decoded
//! recursively against their own namespace.
//!
//! Unknown ids are skipped, never rejected, and a repeated id replaces the
//! earlier occurrence. Both rules are part of the protocol.
//!
//! # Example
//!
//! ```
//! use dummy_iface::netlink::codec::{self, AttrSet, AttrValue};
//! use dummy_iface::netlink::policy::{Namespace, ifla_dummy};
//!
//! let mut attrs = AttrSet::new();
//! attrs.insert(ifla_dummy::IFLA_DUMMY_IFACE_ATTR_1, AttrValue::U16(1500));
//!
//! let wire = codec::encode(&attrs, Namespace::DummyIface);
//! assert_eq!(codec::decode(&wire, Namespace::DummyIface).unwrap(), attrs);
//! ```

use std::collections::BTreeMap;

use tracing::{debug, trace};

use super::attr::{AttrIter, NLA_F_NESTED, get, nla_total_size};
use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::policy::{AttrKind, AttrSpec, Namespace};

/// Decoded attributes of one namespace, ordered by id.
pub type AttrSet = BTreeMap<u16, AttrValue>;

/// A decoded, typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    U8(u8),
    U16(u16),
    U32(u32),
    String(String),
    /// Fixed or bounded binary payload.
    Bytes(Vec<u8>),
    /// Attribute stream decoded against `namespace`.
    Nested { namespace: Namespace, attrs: AttrSet },
    /// Container whose namespace could not be resolved; kept verbatim.
    Opaque(Vec<u8>),
}

impl AttrValue {
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Self::U8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Self::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) | Self::Opaque(b) => Some(b),
            _ => None,
        }
    }

    /// Children of a nested value.
    pub fn as_nested(&self) -> Option<&AttrSet> {
        match self {
            Self::Nested { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    /// Build a nested value.
    pub fn nested(namespace: Namespace, attrs: AttrSet) -> Self {
        Self::Nested { namespace, attrs }
    }
}

/// Raw attribute payloads of one buffer, keyed by id, last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAttrs<'a> {
    attrs: BTreeMap<u16, &'a [u8]>,
}

impl<'a> RawAttrs<'a> {
    /// Payload of `id`, if present.
    pub fn get(&self, id: u16) -> Option<&'a [u8]> {
        self.attrs.get(&id).copied()
    }

    /// Check if `id` is present.
    pub fn contains(&self, id: u16) -> bool {
        self.attrs.contains_key(&id)
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Check if no attribute was found.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Iterate over `(id, payload)` in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &'a [u8])> + '_ {
        self.attrs.iter().map(|(id, data)| (*id, *data))
    }
}

/// Split `buf` into attribute records without interpreting payloads.
pub fn scan(buf: &[u8]) -> Result<RawAttrs<'_>> {
    let mut raw = RawAttrs::default();
    for attr in AttrIter::new(buf) {
        let (id, payload) = attr?;
        if raw.attrs.insert(id, payload).is_some() {
            trace!(id, "duplicate attribute, keeping the last one");
        }
    }
    Ok(raw)
}

/// Validate a single attribute payload against the policy of `namespace`.
///
/// Returns `Ok(None)` when `id` is unknown in `namespace`. An
/// [`AttrKind::KindData`] container validated on its own has no sibling to
/// select its namespace and comes back as [`AttrValue::Opaque`].
pub fn validate(namespace: Namespace, id: u16, raw: &[u8]) -> Result<Option<AttrValue>> {
    match namespace.spec(id) {
        Some(spec) => validate_spec(spec, raw, &RawAttrs::default()).map(Some),
        None => Ok(None),
    }
}

fn check_exact(id: u16, expected: usize, raw: &[u8]) -> Result<()> {
    if raw.len() != expected {
        return Err(Error::LengthViolation {
            id,
            expected,
            actual: raw.len(),
        });
    }
    Ok(())
}

fn check_max(id: u16, max: usize, actual: usize) -> Result<()> {
    if actual > max {
        return Err(Error::LengthViolation {
            id,
            expected: max,
            actual,
        });
    }
    Ok(())
}

fn decode_nested(spec: &AttrSpec, raw: &[u8], namespace: Namespace) -> Result<AttrValue> {
    let attrs = decode(raw, namespace).map_err(|e| match e {
        Error::Truncated { .. } | Error::InvalidAttribute(_) => Error::TypeViolation {
            id: spec.id,
            reason: format!("malformed {} container: {}", namespace, e),
        },
        other => other,
    })?;
    Ok(AttrValue::Nested { namespace, attrs })
}

fn validate_spec(spec: &AttrSpec, raw: &[u8], siblings: &RawAttrs<'_>) -> Result<AttrValue> {
    let id = spec.id;
    match spec.kind {
        AttrKind::U8 => {
            check_exact(id, 1, raw)?;
            Ok(AttrValue::U8(get::u8(raw)?))
        }
        AttrKind::U16 => {
            check_exact(id, 2, raw)?;
            Ok(AttrValue::U16(get::u16_ne(raw)?))
        }
        AttrKind::U32 => {
            check_exact(id, 4, raw)?;
            Ok(AttrValue::U32(get::u32_ne(raw)?))
        }
        AttrKind::String { max_len } => {
            check_max(id, max_len, get::string_len(raw))?;
            let s = get::string(raw).map_err(|e| Error::TypeViolation {
                id,
                reason: e.to_string(),
            })?;
            Ok(AttrValue::String(s.to_string()))
        }
        AttrKind::Binary { len } => {
            check_exact(id, len, raw)?;
            Ok(AttrValue::Bytes(raw.to_vec()))
        }
        AttrKind::Bytes { max_len } => {
            check_max(id, max_len, raw.len())?;
            Ok(AttrValue::Bytes(raw.to_vec()))
        }
        AttrKind::Nested(namespace) => decode_nested(spec, raw, namespace),
        AttrKind::KindData { kind_attr } => {
            let namespace = siblings
                .get(kind_attr)
                .and_then(|kind| get::string(kind).ok())
                .and_then(Namespace::for_kind);
            match namespace {
                Some(namespace) => decode_nested(spec, raw, namespace),
                None => Ok(AttrValue::Opaque(raw.to_vec())),
            }
        }
    }
}

/// Decode an attribute stream against the policy of `namespace`.
///
/// Every known record is checked in wire order, duplicates included, and
/// decoding fails on the first one that violates its policy. Among valid
/// duplicates the last one wins. Nothing outside the returned set is touched.
pub fn decode(buf: &[u8], namespace: Namespace) -> Result<AttrSet> {
    let raw = scan(buf)?;
    let mut attrs = AttrSet::new();
    for attr in AttrIter::new(buf) {
        let (id, payload) = attr?;
        let Some(spec) = namespace.spec(id) else {
            debug!(%namespace, id, len = payload.len(), "skipping unknown attribute");
            continue;
        };
        let value = validate_spec(spec, payload, &raw)?;
        attrs.insert(id, value);
    }
    Ok(attrs)
}

/// Encode `attrs` as an attribute stream, in ascending id order.
///
/// # Panics
///
/// Panics if an id is not in the policy of `namespace` or if a value does
/// not fit its policy. Sets produced by [`decode`] always encode.
pub fn encode(attrs: &AttrSet, namespace: Namespace) -> Vec<u8> {
    let mut builder = MessageBuilder::attributes();
    encode_into(&mut builder, attrs, namespace);
    builder.finish()
}

/// Append `attrs` to an existing builder. See [`encode`].
pub fn encode_into(builder: &mut MessageBuilder, attrs: &AttrSet, namespace: Namespace) {
    for (&id, value) in attrs {
        let Some(spec) = namespace.spec(id) else {
            panic!("attribute {} is not part of the {} policy", id, namespace);
        };
        match (spec.kind, value) {
            (AttrKind::U8, AttrValue::U8(v)) => builder.append_attr_u8(id, *v),
            (AttrKind::U16, AttrValue::U16(v)) => builder.append_attr_u16(id, *v),
            (AttrKind::U32, AttrValue::U32(v)) => builder.append_attr_u32(id, *v),
            (AttrKind::String { max_len }, AttrValue::String(s)) => {
                assert!(s.len() <= max_len, "{} longer than {} bytes", spec.name, max_len);
                builder.append_attr_str(id, s);
            }
            (AttrKind::Binary { len }, AttrValue::Bytes(b)) => {
                assert_eq!(b.len(), len, "{} must be exactly {} bytes", spec.name, len);
                builder.append_attr(id, b);
            }
            (AttrKind::Bytes { max_len }, AttrValue::Bytes(b)) => {
                assert!(b.len() <= max_len, "{} longer than {} bytes", spec.name, max_len);
                builder.append_attr(id, b);
            }
            (AttrKind::Nested(inner), AttrValue::Nested { namespace: ns, attrs }) => {
                assert_eq!(inner, *ns, "{} nests {} attributes", spec.name, inner);
                let nest = builder.nest_start(id);
                encode_into(builder, attrs, inner);
                builder.nest_end(nest);
            }
            (AttrKind::KindData { .. }, AttrValue::Nested { namespace: ns, attrs }) => {
                let nest = builder.nest_start(id);
                encode_into(builder, attrs, *ns);
                builder.nest_end(nest);
            }
            (AttrKind::KindData { .. }, AttrValue::Opaque(b)) => {
                builder.append_attr(id | NLA_F_NESTED, b);
            }
            (kind, value) => panic!("{}: {:?} does not match policy {:?}", spec.name, value, kind),
        }
    }
}

/// Exact number of bytes [`encode`] produces for `attrs`.
pub fn encoded_len(attrs: &AttrSet) -> usize {
    attrs.values().map(value_len).sum()
}

fn value_len(value: &AttrValue) -> usize {
    match value {
        AttrValue::U8(_) => nla_total_size(1),
        AttrValue::U16(_) => nla_total_size(2),
        AttrValue::U32(_) => nla_total_size(4),
        AttrValue::String(s) => nla_total_size(s.len() + 1),
        AttrValue::Bytes(b) | AttrValue::Opaque(b) => nla_total_size(b.len()),
        AttrValue::Nested { attrs, .. } => nla_total_size(encoded_len(attrs)),
    }
}
