use std::net::SocketAddr;

use metrics::counter;

use super::InternalEvent;
use super::prelude::{error_stage, error_type};
use crate::error::DecodeError;
use crate::netflow::{ExporterKey, Protocol};

#[derive(Debug)]
pub struct NetflowTemplateReceived<'a> {
    pub exporter: &'a ExporterKey,
    pub protocol: Protocol,
    pub template_id: u16,
    pub field_count: usize,
    pub options: bool,
    pub replaced: bool,
}

impl InternalEvent for NetflowTemplateReceived<'_> {
    fn emit(self) {
        debug!(
            message = "Template received.",
            exporter = %self.exporter,
            protocol = self.protocol.as_str(),
            template_id = self.template_id,
            field_count = self.field_count,
            options = self.options,
            replaced = self.replaced,
        );
        counter!(
            "netflow_templates_received_total",
            "protocol" => self.protocol.as_str(),
            "kind" => if self.options { "options_template" } else { "template" },
        )
        .increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("NetflowTemplateReceived")
    }
}

#[derive(Debug)]
pub struct NetflowTemplateWithdrawn<'a> {
    pub exporter: &'a ExporterKey,
    /// `None` when every template of the namespace was withdrawn at once.
    pub template_id: Option<u16>,
    pub options: bool,
    pub removed: usize,
}

impl InternalEvent for NetflowTemplateWithdrawn<'_> {
    fn emit(self) {
        debug!(
            message = "Template withdrawn.",
            exporter = %self.exporter,
            template_id = ?self.template_id,
            options = self.options,
            removed = self.removed,
        );
        counter!("netflow_templates_withdrawn_total").increment(self.removed as u64);
    }

    fn name(&self) -> Option<&'static str> {
        Some("NetflowTemplateWithdrawn")
    }
}

#[derive(Debug)]
pub struct NetflowTemplateLimitReached<'a> {
    pub exporter: &'a ExporterKey,
    pub template_id: u16,
    pub limit: usize,
}

impl InternalEvent for NetflowTemplateLimitReached<'_> {
    fn emit(self) {
        warn!(
            message = "Template cache is full; refusing new template.",
            exporter = %self.exporter,
            template_id = self.template_id,
            limit = self.limit,
            error_type = error_type::ACQUIRE_FAILED,
            stage = error_stage::PROCESSING,
            internal_log_rate_limit = true,
        );
        counter!(
            "component_errors_total",
            "error_code" => "template_limit_reached",
            "error_type" => error_type::ACQUIRE_FAILED,
            "stage" => error_stage::PROCESSING,
        )
        .increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("NetflowTemplateLimitReached")
    }
}

#[derive(Debug)]
pub struct NetflowUnresolvedTemplate<'a> {
    pub exporter: &'a ExporterKey,
    pub protocol: Protocol,
    pub template_id: u16,
    pub length: u16,
}

impl InternalEvent for NetflowUnresolvedTemplate<'_> {
    fn emit(self) {
        warn!(
            message = "Data FlowSet references an unknown template; skipping.",
            exporter = %self.exporter,
            protocol = self.protocol.as_str(),
            template_id = self.template_id,
            length = self.length,
            error_type = error_type::CONDITION_FAILED,
            stage = error_stage::PROCESSING,
            internal_log_rate_limit = true,
        );
        counter!(
            "netflow_unresolved_templates_total",
            "protocol" => self.protocol.as_str(),
        )
        .increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("NetflowUnresolvedTemplate")
    }
}

#[derive(Debug)]
pub struct NetflowFlowSetError<'a> {
    pub exporter: &'a ExporterKey,
    pub protocol: Protocol,
    pub flowset_id: u16,
    pub error: &'a DecodeError,
}

impl InternalEvent for NetflowFlowSetError<'_> {
    fn emit(self) {
        error!(
            message = "Error occurred while parsing FlowSet.",
            exporter = %self.exporter,
            protocol = self.protocol.as_str(),
            flowset_id = self.flowset_id,
            error = %self.error,
            error_code = self.error.kind(),
            error_type = error_type::PARSER_FAILED,
            stage = error_stage::PROCESSING,
            internal_log_rate_limit = true,
        );
        counter!(
            "component_errors_total",
            "error_code" => self.error.kind(),
            "error_type" => error_type::PARSER_FAILED,
            "stage" => error_stage::PROCESSING,
        )
        .increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("NetflowFlowSetError")
    }
}

#[derive(Debug)]
pub struct NetflowReservedFlowSet<'a> {
    pub exporter: &'a ExporterKey,
    pub flowset_id: u16,
    pub length: u16,
}

impl InternalEvent for NetflowReservedFlowSet<'_> {
    fn emit(self) {
        debug!(
            message = "Skipping FlowSet with reserved ID.",
            exporter = %self.exporter,
            flowset_id = self.flowset_id,
            length = self.length,
        );
        counter!("netflow_flowsets_skipped_total", "reason" => "reserved_id").increment(1);
    }
}

#[derive(Debug)]
pub struct NetflowOptionsTemplatesDisabled<'a> {
    pub exporter: &'a ExporterKey,
    pub length: u16,
}

impl InternalEvent for NetflowOptionsTemplatesDisabled<'_> {
    fn emit(self) {
        trace!(
            message = "Skipping Options-Template FlowSet.",
            exporter = %self.exporter,
            length = self.length,
        );
        counter!("netflow_flowsets_skipped_total", "reason" => "options_disabled").increment(1);
    }
}

#[derive(Debug)]
pub struct NetflowRecordsDecoded<'a> {
    pub exporter: &'a ExporterKey,
    pub protocol: Protocol,
    pub template_id: u16,
    pub count: usize,
    pub byte_size: usize,
}

impl InternalEvent for NetflowRecordsDecoded<'_> {
    fn emit(self) {
        trace!(
            message = "Records decoded.",
            exporter = %self.exporter,
            template_id = self.template_id,
            count = self.count,
            byte_size = self.byte_size,
        );
        counter!(
            "netflow_records_decoded_total",
            "protocol" => self.protocol.as_str(),
        )
        .increment(self.count as u64);
        counter!(
            "netflow_record_bytes_decoded_total",
            "protocol" => self.protocol.as_str(),
        )
        .increment(self.byte_size as u64);
    }

    fn name(&self) -> Option<&'static str> {
        Some("NetflowRecordsDecoded")
    }
}

#[derive(Debug)]
pub struct NetflowPacketError<'a> {
    pub source: SocketAddr,
    pub error: &'a DecodeError,
}

impl InternalEvent for NetflowPacketError<'_> {
    fn emit(self) {
        error!(
            message = "Dropping undecodable export packet.",
            source = %self.source,
            error = %self.error,
            error_code = self.error.kind(),
            error_type = error_type::PARSER_FAILED,
            stage = error_stage::RECEIVING,
            internal_log_rate_limit = true,
        );
        counter!(
            "component_errors_total",
            "error_code" => self.error.kind(),
            "error_type" => error_type::PARSER_FAILED,
            "stage" => error_stage::RECEIVING,
        )
        .increment(1);
        counter!("component_discarded_events_total", "intentional" => "false").increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("NetflowPacketError")
    }
}
