//! FlowSet framing and dispatch.

use bytes::{Buf, Bytes};
use serde::{Deserialize, Serialize};

use super::{
    BoundTemplate, DataRecord, ExporterKey, OptionsDataRecord, OptionsTemplateRecord, PutOutcome,
    TemplateCache, TemplateRecord,
    record::{Decoded, decode_data_records, decode_options_records},
    template::{parse_options_template_record, parse_template_record},
};
use crate::{
    config::DecoderConfig,
    error::{DecodeError, MalformedHeaderSnafu},
    internal_events::{
        NetflowFlowSetError, NetflowOptionsTemplatesDisabled, NetflowRecordsDecoded,
        NetflowReservedFlowSet, NetflowTemplateLimitReached, NetflowTemplateReceived,
        NetflowTemplateWithdrawn, NetflowUnresolvedTemplate,
    },
};

/// FlowSet ID and length.
pub const FLOWSET_HEADER_LEN: usize = 4;

/// Lowest FlowSet ID that carries data records.
pub const MIN_DATA_SET_ID: u16 = 256;

/// Export protocol of a packet. Determines the FlowSet ID layout and how
/// field specifiers are read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    NetflowV9,
    Ipfix,
}

impl Protocol {
    pub const fn version(self) -> u16 {
        match self {
            Self::NetflowV9 => 9,
            Self::Ipfix => 10,
        }
    }

    pub const fn from_version(version: u16) -> Option<Self> {
        match version {
            9 => Some(Self::NetflowV9),
            10 => Some(Self::Ipfix),
            _ => None,
        }
    }

    pub const fn template_set_id(self) -> u16 {
        match self {
            Self::NetflowV9 => 0,
            Self::Ipfix => 2,
        }
    }

    pub const fn options_template_set_id(self) -> u16 {
        match self {
            Self::NetflowV9 => 1,
            Self::Ipfix => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NetflowV9 => "netflow_v9",
            Self::Ipfix => "ipfix",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowSetKind {
    Template,
    OptionsTemplate,
    Data,
    Reserved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FlowSetHeader {
    pub id: u16,
    /// Total length including this header and any padding.
    pub length: u16,
}

impl FlowSetHeader {
    pub const fn kind(&self, protocol: Protocol) -> FlowSetKind {
        if self.id == protocol.template_set_id() {
            FlowSetKind::Template
        } else if self.id == protocol.options_template_set_id() {
            FlowSetKind::OptionsTemplate
        } else if self.id >= MIN_DATA_SET_ID {
            FlowSetKind::Data
        } else {
            FlowSetKind::Reserved
        }
    }

    pub const fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(FLOWSET_HEADER_LEN)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TemplateFlowSet {
    pub header: FlowSetHeader,
    pub records: Vec<TemplateRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionsTemplateFlowSet {
    pub header: FlowSetHeader,
    pub records: Vec<OptionsTemplateRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataFlowSet {
    pub header: FlowSetHeader,
    pub exporter: ExporterKey,
    pub records: Vec<DataRecord>,
}

impl DataFlowSet {
    pub const fn template_id(&self) -> u16 {
        self.header.id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionsDataFlowSet {
    pub header: FlowSetHeader,
    pub exporter: ExporterKey,
    pub records: Vec<OptionsDataRecord>,
}

impl OptionsDataFlowSet {
    pub const fn template_id(&self) -> u16 {
        self.header.id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowSet {
    Template(TemplateFlowSet),
    OptionsTemplate(OptionsTemplateFlowSet),
    Data(DataFlowSet),
    OptionsData(OptionsDataFlowSet),
}

impl FlowSet {
    pub const fn header(&self) -> &FlowSetHeader {
        match self {
            Self::Template(flowset) => &flowset.header,
            Self::OptionsTemplate(flowset) => &flowset.header,
            Self::Data(flowset) => &flowset.header,
            Self::OptionsData(flowset) => &flowset.header,
        }
    }
}

/// A recoverable condition met while parsing the FlowSets of a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// The declared length was inconsistent and the whole packet was dropped.
    MalformedHeader { flowset_id: u16, error: DecodeError },
    UnresolvedTemplate { template_id: u16, length: u16 },
    /// Records decoded before the error were kept.
    TruncatedRecord {
        template_id: u16,
        records_decoded: usize,
        error: DecodeError,
    },
    MalformedTemplate { flowset_id: u16, error: DecodeError },
    ReservedFlowSet { flowset_id: u16, length: u16 },
    TemplateLimitReached { template_id: u16, limit: usize },
    OptionsTemplatesDisabled { length: u16 },
}

impl Diagnostic {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedHeader { .. } => "malformed_header",
            Self::UnresolvedTemplate { .. } => "unresolved_template",
            Self::TruncatedRecord { .. } => "truncated_record",
            Self::MalformedTemplate { .. } => "malformed_template",
            Self::ReservedFlowSet { .. } => "reserved_flowset",
            Self::TemplateLimitReached { .. } => "template_limit_reached",
            Self::OptionsTemplatesDisabled { .. } => "options_templates_disabled",
        }
    }
}

/// FlowSets and diagnostics produced from one packet body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedFlowSets {
    pub flowsets: Vec<FlowSet>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Walks the FlowSets of one packet from one exporter, learning templates
/// into the cache and decoding data against it.
pub struct FlowSetParser<'a> {
    cache: &'a TemplateCache,
    config: &'a DecoderConfig,
    protocol: Protocol,
    exporter: ExporterKey,
}

impl<'a> FlowSetParser<'a> {
    pub const fn new(
        cache: &'a TemplateCache,
        config: &'a DecoderConfig,
        protocol: Protocol,
        exporter: ExporterKey,
    ) -> Self {
        Self {
            cache,
            config,
            protocol,
            exporter,
        }
    }

    /// Parses every FlowSet in `body`. Fewer than four trailing bytes are
    /// treated as message padding.
    ///
    /// A malformed FlowSet header drops the packet: no FlowSets are returned,
    /// only the diagnostics gathered up to that point.
    pub fn parse(&self, mut body: Bytes) -> ParsedFlowSets {
        let total = body.len();
        let mut parsed = ParsedFlowSets::default();

        while body.remaining() >= FLOWSET_HEADER_LEN {
            let offset = total - body.remaining();
            let header = FlowSetHeader {
                id: body.get_u16(),
                length: body.get_u16(),
            };

            if (header.length as usize) < FLOWSET_HEADER_LEN
                || header.body_len() > body.remaining()
            {
                let error = MalformedHeaderSnafu {
                    offset,
                    length: header.length,
                    remaining: body.remaining() + FLOWSET_HEADER_LEN,
                }
                .build();
                self.report(header.id, &error);
                parsed.diagnostics.push(Diagnostic::MalformedHeader {
                    flowset_id: header.id,
                    error,
                });
                // The packet is dropped; templates it carried stay learned.
                parsed.flowsets.clear();
                break;
            }

            let flowset_body = body.split_to(header.body_len());
            let flowset = match header.kind(self.protocol) {
                FlowSetKind::Template => Some(FlowSet::Template(self.template_flowset(
                    header,
                    flowset_body,
                    &mut parsed.diagnostics,
                ))),
                FlowSetKind::OptionsTemplate if self.config.parse_options_templates => {
                    Some(FlowSet::OptionsTemplate(self.options_template_flowset(
                        header,
                        flowset_body,
                        &mut parsed.diagnostics,
                    )))
                }
                FlowSetKind::OptionsTemplate => {
                    emit!(NetflowOptionsTemplatesDisabled {
                        exporter: &self.exporter,
                        length: header.length,
                    });
                    parsed
                        .diagnostics
                        .push(Diagnostic::OptionsTemplatesDisabled {
                            length: header.length,
                        });
                    None
                }
                FlowSetKind::Data => {
                    self.data_flowset(header, flowset_body, &mut parsed.diagnostics)
                }
                FlowSetKind::Reserved => {
                    emit!(NetflowReservedFlowSet {
                        exporter: &self.exporter,
                        flowset_id: header.id,
                        length: header.length,
                    });
                    parsed.diagnostics.push(Diagnostic::ReservedFlowSet {
                        flowset_id: header.id,
                        length: header.length,
                    });
                    None
                }
            };
            parsed.flowsets.extend(flowset);
        }

        parsed
    }

    fn report(&self, flowset_id: u16, error: &DecodeError) {
        emit!(NetflowFlowSetError {
            exporter: &self.exporter,
            protocol: self.protocol,
            flowset_id,
            error,
        });
    }

    fn template_flowset(
        &self,
        header: FlowSetHeader,
        mut body: Bytes,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> TemplateFlowSet {
        let mut records = Vec::new();
        loop {
            match parse_template_record(&mut body, self.protocol) {
                Ok(Some(record)) => {
                    if record.is_withdrawal() {
                        self.withdraw(record.template_id, false);
                    } else {
                        self.learn(
                            record.template_id,
                            record.field_count(),
                            false,
                            diagnostics,
                            |cache| cache.put_template(self.exporter, record.clone()),
                        );
                    }
                    records.push(record);
                }
                Ok(None) => break,
                Err(error) => {
                    self.report(header.id, &error);
                    diagnostics.push(Diagnostic::MalformedTemplate {
                        flowset_id: header.id,
                        error,
                    });
                    break;
                }
            }
        }
        TemplateFlowSet { header, records }
    }

    fn options_template_flowset(
        &self,
        header: FlowSetHeader,
        mut body: Bytes,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> OptionsTemplateFlowSet {
        let mut records = Vec::new();
        loop {
            match parse_options_template_record(&mut body, self.protocol) {
                Ok(Some(record)) => {
                    if record.is_withdrawal() {
                        self.withdraw(record.template_id, true);
                    } else {
                        self.learn(
                            record.template_id,
                            record.field_count(),
                            true,
                            diagnostics,
                            |cache| cache.put_options_template(self.exporter, record.clone()),
                        );
                    }
                    records.push(record);
                }
                Ok(None) => break,
                Err(error) => {
                    self.report(header.id, &error);
                    diagnostics.push(Diagnostic::MalformedTemplate {
                        flowset_id: header.id,
                        error,
                    });
                    break;
                }
            }
        }
        OptionsTemplateFlowSet { header, records }
    }

    fn learn(
        &self,
        template_id: u16,
        field_count: usize,
        options: bool,
        diagnostics: &mut Vec<Diagnostic>,
        put: impl FnOnce(&TemplateCache) -> PutOutcome,
    ) {
        match put(self.cache) {
            PutOutcome::Rejected { limit } => {
                emit!(NetflowTemplateLimitReached {
                    exporter: &self.exporter,
                    template_id,
                    limit,
                });
                diagnostics.push(Diagnostic::TemplateLimitReached { template_id, limit });
            }
            outcome => emit!(NetflowTemplateReceived {
                exporter: &self.exporter,
                protocol: self.protocol,
                template_id,
                field_count,
                options,
                replaced: outcome == PutOutcome::Replaced,
            }),
        }
    }

    fn withdraw(&self, template_id: u16, options: bool) {
        let (template_id, removed) = match (options, template_id < MIN_DATA_SET_ID) {
            (false, true) => (None, self.cache.withdraw_all_templates(&self.exporter)),
            (true, true) => (
                None,
                self.cache.withdraw_all_options_templates(&self.exporter),
            ),
            (false, false) => (
                Some(template_id),
                usize::from(self.cache.withdraw_template(&self.exporter, template_id)),
            ),
            (true, false) => (
                Some(template_id),
                usize::from(
                    self.cache
                        .withdraw_options_template(&self.exporter, template_id),
                ),
            ),
        };
        emit!(NetflowTemplateWithdrawn {
            exporter: &self.exporter,
            template_id,
            options,
            removed,
        });
    }

    fn data_flowset(
        &self,
        header: FlowSetHeader,
        body: Bytes,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<FlowSet> {
        let byte_size = body.len();
        let type_enterprise = self.config.parse_enterprise_fields;

        let Some(bound) = self
            .cache
            .resolve(&self.exporter, header.id, self.config.lookup_precedence)
        else {
            emit!(NetflowUnresolvedTemplate {
                exporter: &self.exporter,
                protocol: self.protocol,
                template_id: header.id,
                length: header.length,
            });
            diagnostics.push(Diagnostic::UnresolvedTemplate {
                template_id: header.id,
                length: header.length,
            });
            return None;
        };

        let (flowset, count, truncated) = match bound {
            BoundTemplate::Template(template) => {
                let Decoded { records, truncated } =
                    decode_data_records(&template, body, type_enterprise);
                let count = records.len();
                let flowset = FlowSet::Data(DataFlowSet {
                    header,
                    exporter: self.exporter,
                    records,
                });
                (flowset, count, truncated)
            }
            BoundTemplate::Options(template) => {
                let Decoded { records, truncated } =
                    decode_options_records(&template, body, type_enterprise);
                let count = records.len();
                let flowset = FlowSet::OptionsData(OptionsDataFlowSet {
                    header,
                    exporter: self.exporter,
                    records,
                });
                (flowset, count, truncated)
            }
        };

        emit!(NetflowRecordsDecoded {
            exporter: &self.exporter,
            protocol: self.protocol,
            template_id: header.id,
            count,
            byte_size,
        });
        if let Some(error) = truncated {
            self.report(header.id, &error);
            diagnostics.push(Diagnostic::TruncatedRecord {
                template_id: header.id,
                records_decoded: count,
                error,
            });
        }

        Some(flowset)
    }
}
