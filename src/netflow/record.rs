//! Data and Options Data record decoding.

use bytes::{Buf, Bytes};
use serde::Serialize;

use super::{DataField, FieldSpecifier, OptionsTemplateRecord, TemplateRecord};
use crate::error::{DecodeError, TruncatedRecordSnafu};

/// Prefix value announcing that a two-byte length follows.
const LONG_LENGTH_MARKER: u8 = 255;

/// One decoded record of a Data FlowSet, in template field order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DataRecord {
    pub values: Vec<DataField>,
}

/// One decoded record governed by an Options-Template.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OptionsDataRecord {
    pub scope_values: Vec<DataField>,
    pub option_values: Vec<DataField>,
}

/// Records decoded from one FlowSet body.
///
/// When `truncated` is set, decoding stopped at that error and `records`
/// holds everything decoded before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoded<R> {
    pub records: Vec<R>,
    pub truncated: Option<DecodeError>,
}

impl<R> Default for Decoded<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            truncated: None,
        }
    }
}

struct FieldReader<'a> {
    buf: &'a mut Bytes,
    template_id: u16,
    type_enterprise: bool,
}

impl FieldReader<'_> {
    fn truncated(&self, field_index: usize, needed: usize) -> DecodeError {
        TruncatedRecordSnafu {
            template_id: self.template_id,
            field_index,
            needed,
            available: self.buf.remaining(),
        }
        .build()
    }

    fn value_len(
        &mut self,
        spec: &FieldSpecifier,
        field_index: usize,
    ) -> Result<usize, DecodeError> {
        if !spec.is_variable() {
            return Ok(spec.length() as usize);
        }
        if !self.buf.has_remaining() {
            return Err(self.truncated(field_index, 1));
        }
        match self.buf.get_u8() {
            LONG_LENGTH_MARKER => {
                if self.buf.remaining() < 2 {
                    return Err(self.truncated(field_index, 2));
                }
                Ok(self.buf.get_u16() as usize)
            }
            len => Ok(len as usize),
        }
    }

    fn read(
        &mut self,
        spec: &FieldSpecifier,
        field_index: usize,
    ) -> Result<DataField, DecodeError> {
        let len = self.value_len(spec, field_index)?;
        if self.buf.remaining() < len {
            return Err(self.truncated(field_index, len));
        }
        let raw = self.buf.split_to(len);
        Ok(DataField::new(spec, raw, self.type_enterprise))
    }

    fn read_all<'s>(
        &mut self,
        specs: impl IntoIterator<Item = &'s FieldSpecifier>,
        first_index: usize,
    ) -> Result<Vec<DataField>, DecodeError> {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| self.read(spec, first_index + i))
            .collect()
    }
}

/// Decodes a single data record from the front of `buf`.
pub fn decode_data_record(
    template: &TemplateRecord,
    buf: &mut Bytes,
    type_enterprise: bool,
) -> Result<DataRecord, DecodeError> {
    let mut reader = FieldReader {
        buf,
        template_id: template.template_id,
        type_enterprise,
    };
    let values = reader.read_all(&template.fields, 0)?;
    Ok(DataRecord { values })
}

/// Decodes a single options data record from the front of `buf`.
pub fn decode_options_data_record(
    template: &OptionsTemplateRecord,
    buf: &mut Bytes,
    type_enterprise: bool,
) -> Result<OptionsDataRecord, DecodeError> {
    let mut reader = FieldReader {
        buf,
        template_id: template.template_id,
        type_enterprise,
    };
    let scope_values = reader.read_all(&template.scope_fields, 0)?;
    let option_values =
        reader.read_all(&template.option_fields, template.scope_fields.len())?;
    Ok(OptionsDataRecord {
        scope_values,
        option_values,
    })
}

fn decode_repeated<R>(
    mut body: Bytes,
    min_record_len: usize,
    mut decode_one: impl FnMut(&mut Bytes) -> Result<R, DecodeError>,
) -> Decoded<R> {
    let mut decoded = Decoded::default();
    // A template without fields describes no records; nothing can be consumed.
    if min_record_len == 0 {
        return decoded;
    }
    while body.remaining() >= min_record_len {
        match decode_one(&mut body) {
            Ok(record) => decoded.records.push(record),
            Err(error) => {
                decoded.truncated = Some(error);
                break;
            }
        }
    }
    decoded
}

/// Decodes every record of a Data FlowSet body. Bytes shorter than the
/// template's minimum record length are padding.
pub fn decode_data_records(
    template: &TemplateRecord,
    body: Bytes,
    type_enterprise: bool,
) -> Decoded<DataRecord> {
    decode_repeated(body, template.min_record_len(), |buf| {
        decode_data_record(template, buf, type_enterprise)
    })
}

pub fn decode_options_records(
    template: &OptionsTemplateRecord,
    body: Bytes,
    type_enterprise: bool,
) -> Decoded<OptionsDataRecord> {
    decode_repeated(body, template.min_record_len(), |buf| {
        decode_options_data_record(template, buf, type_enterprise)
    })
}
