//! Template-driven NetFlow v9 and IPFIX decoding.
//!
//! Templates announced by an exporter are learned into a [`TemplateCache`]
//! and later used to interpret that exporter's Data FlowSets. Decoding is
//! synchronous and never blocks; the cache is the only shared state.

pub mod fields;
mod flowset;
pub mod packet;
mod record;
pub mod render;
mod template;
mod template_cache;

pub use self::{
    fields::{DataField, FieldKind, FieldSpecifier, FieldValue, field_kind},
    flowset::{
        DataFlowSet, Diagnostic, FLOWSET_HEADER_LEN, FlowSet, FlowSetHeader, FlowSetKind,
        FlowSetParser, MIN_DATA_SET_ID, OptionsDataFlowSet, OptionsTemplateFlowSet,
        ParsedFlowSets, Protocol, TemplateFlowSet,
    },
    packet::{DecodedPacket, MessageHeader, PacketDecoder, RecordRef},
    record::{
        DataRecord, Decoded, OptionsDataRecord, decode_data_record, decode_data_records,
        decode_options_data_record, decode_options_records,
    },
    render::Renderer,
    template::{MIN_TEMPLATE_ID, OptionsTemplateRecord, TemplateRecord},
    template_cache::{BoundTemplate, ExporterKey, PutOutcome, TemplateCache},
};
