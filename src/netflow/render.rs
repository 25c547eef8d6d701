//! Human-readable dumps of decoded FlowSets.
//!
//! Field names come from caller-supplied lookups so the decoder stays free of
//! vendor type tables. A lookup that returns an empty name falls back to the
//! numeric code.

use std::fmt::{self, Write};

use super::{
    DataField, DataFlowSet, DecodedPacket, FieldSpecifier, FieldValue, FlowSet, MessageHeader,
    OptionsDataFlowSet, OptionsTemplateFlowSet, TemplateFlowSet,
};

/// Values rendered longer than this many characters are cut and suffixed with `...`.
pub const DEFAULT_MAX_VALUE_LEN: usize = 64;

const FLOWSET_INDENT: &str = "       ";
const FIELD_INDENT: &str = "            ";

pub struct Renderer<T, S> {
    type_name: T,
    scope_name: S,
    max_value_len: usize,
}

fn code_only(code: u16) -> String {
    code.to_string()
}

/// Renders every code by its number.
pub fn numeric() -> Renderer<fn(u16) -> String, fn(u16) -> String> {
    let lookup: fn(u16) -> String = code_only;
    Renderer::new(lookup, lookup)
}

fn render(write: impl FnOnce(&mut String) -> fmt::Result) -> String {
    let mut out = String::new();
    // Writing into a `String` never fails.
    let _ = write(&mut out);
    out
}

impl<T, S> Renderer<T, S>
where
    T: Fn(u16) -> String,
    S: Fn(u16) -> String,
{
    pub const fn new(type_name: T, scope_name: S) -> Self {
        Self {
            type_name,
            scope_name,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
        }
    }

    #[must_use]
    pub fn with_max_value_len(mut self, max_value_len: usize) -> Self {
        self.max_value_len = max_value_len;
        self
    }

    pub fn template_flowset(&self, flowset: &TemplateFlowSet) -> String {
        render(|out| self.write_template_flowset(out, flowset))
    }

    pub fn options_template_flowset(&self, flowset: &OptionsTemplateFlowSet) -> String {
        render(|out| self.write_options_template_flowset(out, flowset))
    }

    pub fn data_flowset(&self, flowset: &DataFlowSet) -> String {
        render(|out| self.write_data_flowset(out, flowset))
    }

    pub fn options_data_flowset(&self, flowset: &OptionsDataFlowSet) -> String {
        render(|out| self.write_options_data_flowset(out, flowset))
    }

    pub fn flowset(&self, flowset: &FlowSet) -> String {
        render(|out| self.write_flowset(out, flowset))
    }

    pub fn packet(&self, packet: &DecodedPacket) -> String {
        render(|out| self.write_packet(out, packet))
    }

    fn name(lookup: &impl Fn(u16) -> String, code: u16) -> String {
        let name = lookup(code);
        if name.is_empty() {
            code.to_string()
        } else {
            name
        }
    }

    fn value(&self, value: &FieldValue) -> String {
        let mut rendered = value.to_string();
        if let Some((cut, _)) = rendered.char_indices().nth(self.max_value_len) {
            rendered.truncate(cut);
            rendered.push_str("...");
        }
        rendered
    }

    fn write_header(out: &mut String, id: u16, length: u16, records: usize) -> fmt::Result {
        writeln!(out, "{FLOWSET_INDENT}Id {id}")?;
        writeln!(out, "{FLOWSET_INDENT}Length: {length}")?;
        writeln!(out, "{FLOWSET_INDENT}Records ({records} records):")
    }

    fn write_specifiers(
        &self,
        out: &mut String,
        fields: &[FieldSpecifier],
        lookup: &impl Fn(u16) -> String,
    ) -> fmt::Result {
        for (index, field) in fields.iter().enumerate() {
            let code = field.field_type();
            write!(out, "{FIELD_INDENT}- {index}. {} ({code}): ", Self::name(lookup, code))?;
            if field.is_variable() {
                out.push_str("VARIABLE");
            } else {
                write!(out, "{}", field.length())?;
            }
            if let Some(enterprise_id) = field.enterprise_id().filter(|&id| id > 0) {
                write!(out, " (enterprise: {enterprise_id})")?;
            }
            out.push('\n');
        }
        Ok(())
    }

    fn write_values(
        &self,
        out: &mut String,
        values: &[DataField],
        lookup: &impl Fn(u16) -> String,
    ) -> fmt::Result {
        for (index, field) in values.iter().enumerate() {
            let code = field.field_type;
            write!(
                out,
                "{FIELD_INDENT}- {index}. {} ({code}): {}",
                Self::name(lookup, code),
                self.value(&field.value)
            )?;
            if let Some(enterprise_id) = field.enterprise_id.filter(|&id| id > 0) {
                write!(out, " (enterprise: {enterprise_id})")?;
            }
            out.push('\n');
        }
        Ok(())
    }

    fn write_template_flowset(&self, out: &mut String, flowset: &TemplateFlowSet) -> fmt::Result {
        let header = &flowset.header;
        Self::write_header(out, header.id, header.length, flowset.records.len())?;
        for (index, record) in flowset.records.iter().enumerate() {
            writeln!(out, "{FLOWSET_INDENT}- {index}. Record:")?;
            writeln!(out, "{FIELD_INDENT}TemplateId: {}", record.template_id)?;
            writeln!(out, "{FIELD_INDENT}FieldCount: {}", record.field_count())?;
            writeln!(out, "{FIELD_INDENT}Fields ({}):", record.fields.len())?;
            self.write_specifiers(out, &record.fields, &self.type_name)?;
        }
        Ok(())
    }

    fn write_options_template_flowset(
        &self,
        out: &mut String,
        flowset: &OptionsTemplateFlowSet,
    ) -> fmt::Result {
        let header = &flowset.header;
        Self::write_header(out, header.id, header.length, flowset.records.len())?;
        for (index, record) in flowset.records.iter().enumerate() {
            writeln!(out, "{FLOWSET_INDENT}- {index}. Record:")?;
            writeln!(out, "{FIELD_INDENT}TemplateId: {}", record.template_id)?;
            writeln!(out, "{FIELD_INDENT}Scopes ({}):", record.scope_fields.len())?;
            self.write_specifiers(out, &record.scope_fields, &self.scope_name)?;
            writeln!(out, "{FIELD_INDENT}Options ({}):", record.option_fields.len())?;
            self.write_specifiers(out, &record.option_fields, &self.type_name)?;
        }
        Ok(())
    }

    fn write_data_flowset(&self, out: &mut String, flowset: &DataFlowSet) -> fmt::Result {
        let length = flowset.header.length;
        Self::write_header(out, flowset.template_id(), length, flowset.records.len())?;
        for (index, record) in flowset.records.iter().enumerate() {
            writeln!(out, "{FLOWSET_INDENT}- Record {index}:")?;
            writeln!(out, "{FIELD_INDENT}Values ({}):", record.values.len())?;
            self.write_values(out, &record.values, &self.type_name)?;
        }
        Ok(())
    }

    fn write_options_data_flowset(
        &self,
        out: &mut String,
        flowset: &OptionsDataFlowSet,
    ) -> fmt::Result {
        let length = flowset.header.length;
        Self::write_header(out, flowset.template_id(), length, flowset.records.len())?;
        for (index, record) in flowset.records.iter().enumerate() {
            writeln!(out, "{FLOWSET_INDENT}- Record {index}:")?;
            writeln!(out, "{FIELD_INDENT}Scopes ({}):", record.scope_values.len())?;
            self.write_values(out, &record.scope_values, &self.scope_name)?;
            writeln!(out, "{FIELD_INDENT}Options ({}):", record.option_values.len())?;
            self.write_values(out, &record.option_values, &self.type_name)?;
        }
        Ok(())
    }

    fn write_flowset(&self, out: &mut String, flowset: &FlowSet) -> fmt::Result {
        match flowset {
            FlowSet::Template(flowset) => self.write_template_flowset(out, flowset),
            FlowSet::OptionsTemplate(flowset) => {
                self.write_options_template_flowset(out, flowset)
            }
            FlowSet::Data(flowset) => self.write_data_flowset(out, flowset),
            FlowSet::OptionsData(flowset) => self.write_options_data_flowset(out, flowset),
        }
    }

    fn write_packet(&self, out: &mut String, packet: &DecodedPacket) -> fmt::Result {
        writeln!(out, "Exporter: {}", packet.exporter)?;
        match packet.header {
            Some(MessageHeader::NetflowV9 {
                count,
                sys_uptime,
                unix_secs,
                sequence_number,
                source_id,
            }) => {
                writeln!(out, "NetFlow v9 packet:")?;
                writeln!(out, "  Count: {count}")?;
                writeln!(out, "  SystemUptime: {sys_uptime}")?;
                writeln!(out, "  UnixSeconds: {unix_secs}")?;
                writeln!(out, "  SequenceNumber: {sequence_number}")?;
                writeln!(out, "  SourceId: {source_id}")?;
            }
            Some(MessageHeader::Ipfix {
                length,
                export_time,
                sequence_number,
                observation_domain_id,
            }) => {
                writeln!(out, "IPFIX message:")?;
                writeln!(out, "  Length: {length}")?;
                writeln!(out, "  ExportTime: {export_time}")?;
                writeln!(out, "  SequenceNumber: {sequence_number}")?;
                writeln!(out, "  ObservationDomainId: {observation_domain_id}")?;
            }
            None => writeln!(out, "{} FlowSets:", packet.protocol.as_str())?,
        }

        writeln!(out, "  FlowSets ({}):", packet.flowsets.len())?;
        for flowset in &packet.flowsets {
            let label = match flowset {
                FlowSet::Template(_) => "Template FlowSet",
                FlowSet::OptionsTemplate(_) => "Options Template FlowSet",
                FlowSet::Data(_) => "Data FlowSet",
                FlowSet::OptionsData(_) => "Options Data FlowSet",
            };
            writeln!(out, "    - {label}:")?;
            self.write_flowset(out, flowset)?;
        }

        if !packet.diagnostics.is_empty() {
            writeln!(out, "  Diagnostics ({}):", packet.diagnostics.len())?;
            for diagnostic in &packet.diagnostics {
                writeln!(out, "    - {}", diagnostic.kind())?;
            }
        }
        Ok(())
    }
}
