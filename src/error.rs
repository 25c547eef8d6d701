use snafu::Snafu;

/// Errors raised while decoding an export packet.
///
/// Only `PacketTooShort`, `UnsupportedVersion` and `InvalidMessageLength` are
/// fatal for a whole packet. The others are scoped to a single FlowSet and are
/// surfaced as [`Diagnostic`](crate::netflow::Diagnostic)s by the FlowSet parser.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display("Packet too short: needed {needed} bytes, got {available}."))]
    PacketTooShort { needed: usize, available: usize },

    #[snafu(display("Unsupported export protocol version {version}."))]
    UnsupportedVersion { version: u16 },

    #[snafu(display(
        "IPFIX message declares length {length}, but {available} bytes were received."
    ))]
    InvalidMessageLength { length: u16, available: usize },

    #[snafu(display(
        "Malformed FlowSet header at offset {offset}: declared length {length}, {remaining} bytes remaining."
    ))]
    MalformedHeader {
        offset: usize,
        length: u16,
        remaining: usize,
    },

    #[snafu(display(
        "Truncated template record {template_id}: needed {needed} bytes, {available} available."
    ))]
    MalformedTemplate {
        template_id: u16,
        needed: usize,
        available: usize,
    },

    #[snafu(display(
        "Options template {template_id} declares {scope_field_count} scope fields out of {field_count}."
    ))]
    InvalidScopeCount {
        template_id: u16,
        scope_field_count: u16,
        field_count: u16,
    },

    #[snafu(display(
        "Truncated record for template {template_id}: field {field_index} needs {needed} bytes, {available} available."
    ))]
    TruncatedRecord {
        template_id: u16,
        field_index: usize,
        needed: usize,
        available: usize,
    },
}

/// Errors raised while encoding a template record.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EncodeError {
    #[snafu(display(
        "Template {template_id} cannot be encoded: {what} of {value} exceeds 65535."
    ))]
    FieldOverflow {
        template_id: u16,
        what: &'static str,
        value: usize,
    },
}

impl DecodeError {
    /// Stable key used for counting and metric labels.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PacketTooShort { .. } => "packet_too_short",
            Self::UnsupportedVersion { .. } => "unsupported_version",
            Self::InvalidMessageLength { .. } => "invalid_message_length",
            Self::MalformedHeader { .. } => "malformed_header",
            Self::MalformedTemplate { .. } => "malformed_template",
            Self::InvalidScopeCount { .. } => "invalid_scope_count",
            Self::TruncatedRecord { .. } => "truncated_record",
        }
    }
}
