//! Field specifiers (template level) and decoded field values (record level).

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::Protocol;

/// Reserved length announcing that the value length is carried in-band.
pub const VARIABLE_LENGTH: u16 = 0xFFFF;

/// Size of a `(type, length)` pair on the wire.
pub const FIELD_SPECIFIER_LEN: usize = 4;

/// Size of the enterprise number that follows an enterprise-scoped IPFIX specifier.
pub const ENTERPRISE_NUMBER_LEN: usize = 4;

const ENTERPRISE_BIT: u16 = 0x8000;

/// Type and width of one field within a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum FieldSpecifier {
    /// NetFlow v9 field or IANA-registered IPFIX Information Element.
    Plain { field_type: u16, length: u16 },

    /// IPFIX Information Element whose type is only meaningful within `enterprise_id`.
    Enterprise {
        field_type: u16,
        length: u16,
        enterprise_id: u32,
    },
}

impl FieldSpecifier {
    pub const fn new(field_type: u16, length: u16) -> Self {
        Self::Plain { field_type, length }
    }

    /// The enterprise bit is stripped from `field_type`.
    pub const fn enterprise(field_type: u16, length: u16, enterprise_id: u32) -> Self {
        Self::Enterprise {
            field_type: field_type & !ENTERPRISE_BIT,
            length,
            enterprise_id,
        }
    }

    pub const fn field_type(&self) -> u16 {
        match *self {
            Self::Plain { field_type, .. } | Self::Enterprise { field_type, .. } => field_type,
        }
    }

    pub const fn length(&self) -> u16 {
        match *self {
            Self::Plain { length, .. } | Self::Enterprise { length, .. } => length,
        }
    }

    pub const fn enterprise_id(&self) -> Option<u32> {
        match *self {
            Self::Plain { .. } => None,
            Self::Enterprise { enterprise_id, .. } => Some(enterprise_id),
        }
    }

    pub const fn is_variable(&self) -> bool {
        self.length() == VARIABLE_LENGTH
    }

    /// Smallest number of bytes a value of this field can occupy in a record.
    pub const fn min_wire_len(&self) -> usize {
        if self.is_variable() {
            1
        } else {
            self.length() as usize
        }
    }

    /// Size of this specifier inside a template record.
    pub const fn encoded_len(&self) -> usize {
        match self {
            Self::Plain { .. } => FIELD_SPECIFIER_LEN,
            Self::Enterprise { .. } => FIELD_SPECIFIER_LEN + ENTERPRISE_NUMBER_LEN,
        }
    }

    /// Reads one specifier. Returns the number of bytes still required when
    /// `buf` is too short.
    pub(crate) fn parse(buf: &mut Bytes, protocol: Protocol) -> Result<Self, usize> {
        if buf.remaining() < FIELD_SPECIFIER_LEN {
            return Err(FIELD_SPECIFIER_LEN);
        }
        let raw_type = buf.get_u16();
        let length = buf.get_u16();

        // NetFlow v9 has no enterprise bit: the full 16 bits are the type.
        if protocol == Protocol::NetflowV9 || raw_type & ENTERPRISE_BIT == 0 {
            return Ok(Self::new(raw_type, length));
        }

        if buf.remaining() < ENTERPRISE_NUMBER_LEN {
            return Err(ENTERPRISE_NUMBER_LEN);
        }
        Ok(Self::enterprise(raw_type, length, buf.get_u32()))
    }

    pub fn encode(&self, out: &mut BytesMut) {
        match *self {
            Self::Plain { field_type, length } => {
                out.put_u16(field_type);
                out.put_u16(length);
            }
            Self::Enterprise {
                field_type,
                length,
                enterprise_id,
            } => {
                out.put_u16(field_type | ENTERPRISE_BIT);
                out.put_u16(length);
                out.put_u32(enterprise_id);
            }
        }
    }
}

/// Wire representation chosen for a field type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Unsigned,
    Ipv4,
    Ipv6,
    Mac,
    String,
    Bytes,
}

/// Classifies IANA Information Element IDs (shared by NetFlow v9 for IDs below 128).
///
/// Anything not listed is kept as raw bytes; naming and further semantics
/// belong to the caller's type registry.
pub const fn field_kind(field_type: u16) -> FieldKind {
    match field_type {
        8 | 12 | 15 | 18 | 43 | 44 | 45 | 47 | 130 | 225 | 226 => FieldKind::Ipv4,
        27 | 28 | 62 | 63 | 131 | 281 | 282 => FieldKind::Ipv6,
        56 | 57 | 80 | 81 => FieldKind::Mac,
        82 | 83 | 84 | 94 | 96 | 100 | 236 => FieldKind::String,
        1..=7
        | 9..=11
        | 13
        | 14
        | 16
        | 17
        | 19..=26
        | 29..=42
        | 46
        | 48..=55
        | 58..=61
        | 64
        | 85
        | 86
        | 88
        | 89
        | 136
        | 148..=153
        | 227
        | 228
        | 234
        | 235 => FieldKind::Unsigned,
        _ => FieldKind::Bytes,
    }
}

/// Decoded representation of a field value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Big-endian unsigned integer of 1 to 8 bytes.
    Unsigned(u64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Mac([u8; 6]),
    String(String),
    Bytes(Bytes),
}

impl FieldValue {
    /// Interprets `raw` as `kind`, falling back to an integer or raw bytes
    /// when the observed width does not fit the kind.
    pub fn interpret(kind: FieldKind, raw: &Bytes) -> Self {
        match (kind, raw.len()) {
            (FieldKind::Bytes, _) => Self::Bytes(raw.clone()),
            (FieldKind::Ipv4, 4) => {
                let mut buf = &raw[..];
                Self::Ipv4(Ipv4Addr::from(buf.get_u32()))
            }
            (FieldKind::Ipv6, 16) => {
                let mut buf = &raw[..];
                Self::Ipv6(Ipv6Addr::from(buf.get_u128()))
            }
            (FieldKind::Mac, 6) => {
                let mut mac = [0; 6];
                mac.copy_from_slice(raw);
                Self::Mac(mac)
            }
            (FieldKind::String, _) => match std::str::from_utf8(raw) {
                Ok(s) => Self::String(s.trim_end_matches('\0').to_owned()),
                Err(_) => Self::Bytes(raw.clone()),
            },
            (_, len @ 1..=8) => {
                let mut buf = &raw[..];
                Self::Unsigned(buf.get_uint(len))
            }
            _ => Self::Bytes(raw.clone()),
        }
    }

    pub const fn as_unsigned(&self) -> Option<u64> {
        match self {
            Self::Unsigned(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(value) => write!(f, "{value}"),
            Self::Ipv4(addr) => write!(f, "{addr}"),
            Self::Ipv6(addr) => write!(f, "{addr}"),
            Self::Mac(mac) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            Self::String(s) => f.write_str(s),
            Self::Bytes(raw) => f.write_str(&data_encoding::HEXLOWER.encode(raw)),
        }
    }
}

/// One decoded value of a data record.
///
/// The raw bytes are retained alongside the typed value so consumers never
/// need to re-read the packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataField {
    pub field_type: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enterprise_id: Option<u32>,
    /// Observed length in bytes; for variable-length fields this is the in-band length.
    pub length: u16,
    #[serde(skip)]
    pub raw: Bytes,
    pub value: FieldValue,
}

impl DataField {
    /// Types `raw` for `spec`. Enterprise-scoped values stay raw unless
    /// `type_enterprise` is set, in which case they are only ever read as
    /// integers or bytes since their registry is unknown here.
    pub fn new(spec: &FieldSpecifier, raw: Bytes, type_enterprise: bool) -> Self {
        let kind = match spec {
            FieldSpecifier::Plain { field_type, .. } => field_kind(*field_type),
            FieldSpecifier::Enterprise { .. } if type_enterprise && raw.len() <= 8 => {
                FieldKind::Unsigned
            }
            FieldSpecifier::Enterprise { .. } => FieldKind::Bytes,
        };
        let value = FieldValue::interpret(kind, &raw);

        Self {
            field_type: spec.field_type(),
            enterprise_id: spec.enterprise_id(),
            length: raw.len() as u16,
            raw,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn enterprise_constructor_masks_type() {
        let spec = FieldSpecifier::enterprise(0x8000 | 42, 4, 9);
        assert_eq!(spec.field_type(), 42);
        assert_eq!(spec.enterprise_id(), Some(9));
        assert_eq!(spec.encoded_len(), 8);
    }

    #[test]
    fn variable_length_sentinel() {
        let spec = FieldSpecifier::new(82, VARIABLE_LENGTH);
        assert!(spec.is_variable());
        assert_eq!(spec.min_wire_len(), 1);
        assert!(!FieldSpecifier::new(8, 4).is_variable());
    }

    #[test]
    fn parse_ipfix_enterprise_specifier() {
        let mut buf = Bytes::from_static(&[0x80, 0x01, 0xff, 0xff, 0x00, 0x00, 0x5d, 0x3b]);
        let spec = FieldSpecifier::parse(&mut buf, Protocol::Ipfix).unwrap();
        assert_eq!(spec, FieldSpecifier::enterprise(1, VARIABLE_LENGTH, 23867));
        assert!(spec.is_variable());
        assert!(buf.is_empty());
    }

    #[test]
    fn parse_netflow_v9_ignores_high_bit() {
        let mut buf = Bytes::from_static(&[0x80, 0x01, 0x00, 0x04]);
        let spec = FieldSpecifier::parse(&mut buf, Protocol::NetflowV9).unwrap();
        assert_eq!(spec, FieldSpecifier::new(0x8001, 4));
    }

    #[test]
    fn parse_truncated_enterprise_number() {
        let mut buf = Bytes::from_static(&[0x80, 0x01, 0x00, 0x04, 0x00, 0x00]);
        assert_eq!(
            FieldSpecifier::parse(&mut buf, Protocol::Ipfix),
            Err(ENTERPRISE_NUMBER_LEN)
        );
    }

    #[test]
    fn interpret_known_kinds() {
        let addr = Bytes::from_static(&[192, 168, 1, 1]);
        assert_eq!(
            FieldValue::interpret(field_kind(8), &addr),
            FieldValue::Ipv4(Ipv4Addr::new(192, 168, 1, 1))
        );

        let port = Bytes::from_static(&[0x01, 0xbb]);
        assert_eq!(
            FieldValue::interpret(field_kind(11), &port),
            FieldValue::Unsigned(443)
        );

        let mut v6 = [0u8; 16];
        v6[15] = 1;
        assert_eq!(
            FieldValue::interpret(field_kind(27), &Bytes::copy_from_slice(&v6)),
            FieldValue::Ipv6(Ipv6Addr::LOCALHOST)
        );

        let mac = Bytes::from_static(&[0, 0x1b, 0x21, 0x3c, 0x4d, 0x5e]);
        let value = FieldValue::interpret(field_kind(56), &mac);
        assert_eq!(value.to_string(), "00:1b:21:3c:4d:5e");

        let name = Bytes::from_static(b"eth0\0\0");
        assert_eq!(
            FieldValue::interpret(field_kind(82), &name),
            FieldValue::String("eth0".to_owned())
        );
    }

    #[test]
    fn interpret_falls_back_on_width_mismatch() {
        // A 2-byte "address" is not an address.
        let short = Bytes::from_static(&[0x0a, 0x00]);
        assert_eq!(
            FieldValue::interpret(FieldKind::Ipv4, &short),
            FieldValue::Unsigned(0x0a00)
        );

        let wide = Bytes::from_static(&[1; 12]);
        assert_eq!(
            FieldValue::interpret(FieldKind::Unsigned, &wide),
            FieldValue::Bytes(wide.clone())
        );
    }

    #[test]
    fn unknown_types_stay_raw() {
        let raw = Bytes::from_static(&[0xde, 0xad]);
        let field = DataField::new(&FieldSpecifier::new(40000, 2), raw.clone(), true);
        assert_eq!(field.value, FieldValue::Bytes(raw));
        assert_eq!(field.value.to_string(), "dead");
    }

    #[test]
    fn enterprise_values_respect_typing_switch() {
        let spec = FieldSpecifier::enterprise(3, 8, 23867);
        let raw = Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0x05, 0x39]);

        let typed = DataField::new(&spec, raw.clone(), true);
        assert_eq!(typed.value, FieldValue::Unsigned(1337));
        assert_eq!(typed.value.as_unsigned(), Some(1337));
        assert_eq!(typed.enterprise_id, Some(23867));

        let untyped = DataField::new(&spec, raw.clone(), false);
        assert_eq!(untyped.value, FieldValue::Bytes(raw));
        assert_eq!(untyped.value.as_unsigned(), None);
    }
}
