//! Template and Options-Template records.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use snafu::{OptionExt, ensure};

use super::{FieldSpecifier, Protocol, fields::FIELD_SPECIFIER_LEN};
use crate::error::{
    DecodeError, EncodeError, FieldOverflowSnafu, InvalidScopeCountSnafu, MalformedTemplateSnafu,
};

/// Lowest template ID usable by a data FlowSet.
pub const MIN_TEMPLATE_ID: u16 = 256;

/// Template ID and field count.
pub const TEMPLATE_RECORD_HEADER_LEN: usize = 4;

/// NetFlow v9: template ID, scope length, option length.
pub const NETFLOW_V9_OPTIONS_HEADER_LEN: usize = 6;

/// IPFIX: template ID, field count, scope field count.
pub const IPFIX_OPTIONS_HEADER_LEN: usize = 6;

/// An ordered list of field specifiers describing one data record layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TemplateRecord {
    pub template_id: u16,
    pub fields: Vec<FieldSpecifier>,
}

impl TemplateRecord {
    pub const fn new(template_id: u16, fields: Vec<FieldSpecifier>) -> Self {
        Self {
            template_id,
            fields,
        }
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// A record without fields is an IPFIX withdrawal.
    pub fn is_withdrawal(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn min_record_len(&self) -> usize {
        self.fields.iter().map(FieldSpecifier::min_wire_len).sum()
    }

    /// Encodes the record. Fails when the field count does not fit the wire
    /// format; nothing is written in that case.
    pub fn encode(&self, out: &mut BytesMut) -> Result<(), EncodeError> {
        let count = wire_u16(self.template_id, "field count", self.fields.len())?;
        out.put_u16(self.template_id);
        out.put_u16(count);
        for field in &self.fields {
            field.encode(out);
        }
        Ok(())
    }
}

/// A template whose fields are split into scope and option sections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionsTemplateRecord {
    pub template_id: u16,
    pub scope_fields: Vec<FieldSpecifier>,
    pub option_fields: Vec<FieldSpecifier>,
}

impl OptionsTemplateRecord {
    pub const fn new(
        template_id: u16,
        scope_fields: Vec<FieldSpecifier>,
        option_fields: Vec<FieldSpecifier>,
    ) -> Self {
        Self {
            template_id,
            scope_fields,
            option_fields,
        }
    }

    pub fn field_count(&self) -> usize {
        self.scope_fields.len() + self.option_fields.len()
    }

    pub fn is_withdrawal(&self) -> bool {
        self.scope_fields.is_empty() && self.option_fields.is_empty()
    }

    pub fn min_record_len(&self) -> usize {
        self.scope_fields
            .iter()
            .chain(&self.option_fields)
            .map(FieldSpecifier::min_wire_len)
            .sum()
    }

    /// Encodes the record, including the trailing padding NetFlow v9 expects.
    /// Fails when a section length or field count does not fit the wire
    /// format; nothing is written in that case.
    pub fn encode(&self, protocol: Protocol, out: &mut BytesMut) -> Result<(), EncodeError> {
        let id = self.template_id;
        match protocol {
            Protocol::NetflowV9 => {
                let scope_len: usize = self.scope_fields.iter().map(|f| f.encoded_len()).sum();
                let option_len: usize = self.option_fields.iter().map(|f| f.encoded_len()).sum();
                let scope_wire = wire_u16(id, "scope section length", scope_len)?;
                let option_wire = wire_u16(id, "option section length", option_len)?;
                out.put_u16(id);
                out.put_u16(scope_wire);
                out.put_u16(option_wire);
                self.encode_fields(out);
                let written = NETFLOW_V9_OPTIONS_HEADER_LEN + scope_len + option_len;
                out.put_bytes(0, padding_len(written));
            }
            Protocol::Ipfix => {
                let count = wire_u16(id, "field count", self.field_count())?;
                out.put_u16(id);
                out.put_u16(count);
                if !self.is_withdrawal() {
                    // Bounded by `count`.
                    out.put_u16(self.scope_fields.len() as u16);
                    self.encode_fields(out);
                }
            }
        }
        Ok(())
    }

    fn encode_fields(&self, out: &mut BytesMut) {
        for field in self.scope_fields.iter().chain(&self.option_fields) {
            field.encode(out);
        }
    }
}

fn wire_u16(template_id: u16, what: &'static str, value: usize) -> Result<u16, EncodeError> {
    u16::try_from(value).ok().context(FieldOverflowSnafu {
        template_id,
        what,
        value,
    })
}

const fn padding_len(written: usize) -> usize {
    (4 - written % 4) % 4
}

fn parse_fields(
    buf: &mut Bytes,
    protocol: Protocol,
    template_id: u16,
    count: usize,
) -> Result<Vec<FieldSpecifier>, DecodeError> {
    let mut fields = Vec::with_capacity(count.min(buf.remaining() / FIELD_SPECIFIER_LEN));
    for _ in 0..count {
        let field = FieldSpecifier::parse(buf, protocol).map_err(|needed| {
            DecodeError::MalformedTemplate {
                template_id,
                needed,
                available: buf.remaining(),
            }
        })?;
        fields.push(field);
    }
    Ok(fields)
}

/// Parses the next record of a Template FlowSet.
///
/// Returns `Ok(None)` when the remaining bytes are padding rather than a
/// record. A truncated record is an error, and the caller must abandon the
/// rest of the FlowSet.
pub(crate) fn parse_template_record(
    buf: &mut Bytes,
    protocol: Protocol,
) -> Result<Option<TemplateRecord>, DecodeError> {
    if buf.remaining() < TEMPLATE_RECORD_HEADER_LEN {
        return Ok(None);
    }
    let template_id = buf.get_u16();
    let field_count = buf.get_u16();

    if protocol == Protocol::Ipfix && field_count == 0 {
        let withdraws_all = template_id == protocol.template_set_id();
        if template_id >= MIN_TEMPLATE_ID || withdraws_all {
            return Ok(Some(TemplateRecord::new(template_id, Vec::new())));
        }
    }
    if template_id < MIN_TEMPLATE_ID || field_count == 0 {
        return Ok(None);
    }

    let fields = parse_fields(buf, protocol, template_id, field_count as usize)?;
    Ok(Some(TemplateRecord::new(template_id, fields)))
}

/// Parses the next record of an Options-Template FlowSet.
pub(crate) fn parse_options_template_record(
    buf: &mut Bytes,
    protocol: Protocol,
) -> Result<Option<OptionsTemplateRecord>, DecodeError> {
    match protocol {
        Protocol::NetflowV9 => parse_netflow_v9_options(buf),
        Protocol::Ipfix => parse_ipfix_options(buf),
    }
}

fn parse_netflow_v9_options(buf: &mut Bytes) -> Result<Option<OptionsTemplateRecord>, DecodeError> {
    if buf.remaining() < NETFLOW_V9_OPTIONS_HEADER_LEN {
        return Ok(None);
    }
    let template_id = buf.get_u16();
    let scope_len = buf.get_u16() as usize;
    let option_len = buf.get_u16() as usize;
    if template_id < MIN_TEMPLATE_ID {
        return Ok(None);
    }

    let needed = scope_len + option_len;
    ensure!(
        buf.remaining() >= needed,
        MalformedTemplateSnafu {
            template_id,
            needed,
            available: buf.remaining(),
        }
    );

    // Section lengths are in bytes; a trailing partial specifier is skipped.
    let mut scope = buf.split_to(scope_len);
    let mut options = buf.split_to(option_len);
    let scope_fields = parse_fields(
        &mut scope,
        Protocol::NetflowV9,
        template_id,
        scope_len / FIELD_SPECIFIER_LEN,
    )?;
    let option_fields = parse_fields(
        &mut options,
        Protocol::NetflowV9,
        template_id,
        option_len / FIELD_SPECIFIER_LEN,
    )?;

    let padding = padding_len(NETFLOW_V9_OPTIONS_HEADER_LEN + needed).min(buf.remaining());
    buf.advance(padding);

    Ok(Some(OptionsTemplateRecord::new(
        template_id,
        scope_fields,
        option_fields,
    )))
}

fn parse_ipfix_options(buf: &mut Bytes) -> Result<Option<OptionsTemplateRecord>, DecodeError> {
    if buf.remaining() < TEMPLATE_RECORD_HEADER_LEN {
        return Ok(None);
    }
    let template_id = buf.get_u16();
    let field_count = buf.get_u16();

    if field_count == 0 {
        let withdraws_all = template_id == Protocol::Ipfix.options_template_set_id();
        if template_id >= MIN_TEMPLATE_ID || withdraws_all {
            return Ok(Some(OptionsTemplateRecord::new(
                template_id,
                Vec::new(),
                Vec::new(),
            )));
        }
        return Ok(None);
    }
    if template_id < MIN_TEMPLATE_ID {
        return Ok(None);
    }

    ensure!(
        buf.remaining() >= 2,
        MalformedTemplateSnafu {
            template_id,
            needed: 2usize,
            available: buf.remaining(),
        }
    );
    let scope_field_count = buf.get_u16();
    ensure!(
        scope_field_count >= 1 && scope_field_count <= field_count,
        InvalidScopeCountSnafu {
            template_id,
            scope_field_count,
            field_count,
        }
    );

    let mut fields = parse_fields(buf, Protocol::Ipfix, template_id, field_count as usize)?;
    let option_fields = fields.split_off(scope_field_count as usize);

    Ok(Some(OptionsTemplateRecord::new(
        template_id,
        fields,
        option_fields,
    )))
}
