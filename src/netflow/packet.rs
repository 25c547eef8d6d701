//! Export message framing: the NetFlow v9 / IPFIX message header in front of the FlowSets.

use std::net::SocketAddr;

use bytes::{Buf, Bytes};
use serde::Serialize;
use snafu::ensure;

use super::{
    DataRecord, Diagnostic, ExporterKey, FlowSet, FlowSetParser, OptionsDataRecord, Protocol,
    Renderer, TemplateCache,
};
use crate::{
    config::DecoderConfig,
    error::{DecodeError, InvalidMessageLengthSnafu, PacketTooShortSnafu, UnsupportedVersionSnafu},
    internal_events::NetflowPacketError,
};

pub const NETFLOW_V9_HEADER_LEN: usize = 20;
pub const IPFIX_HEADER_LEN: usize = 16;

const VERSION_LEN: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum MessageHeader {
    NetflowV9 {
        /// Number of FlowSets (some exporters count records instead).
        count: u16,
        sys_uptime: u32,
        unix_secs: u32,
        sequence_number: u32,
        source_id: u32,
    },
    Ipfix {
        /// Total message length including this header.
        length: u16,
        export_time: u32,
        sequence_number: u32,
        observation_domain_id: u32,
    },
}

impl MessageHeader {
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::NetflowV9 { .. } => Protocol::NetflowV9,
            Self::Ipfix { .. } => Protocol::Ipfix,
        }
    }

    /// NetFlow v9 Source ID or IPFIX observation domain.
    pub const fn observation_domain_id(&self) -> u32 {
        match *self {
            Self::NetflowV9 { source_id, .. } => source_id,
            Self::Ipfix {
                observation_domain_id,
                ..
            } => observation_domain_id,
        }
    }

    pub const fn sequence_number(&self) -> u32 {
        match *self {
            Self::NetflowV9 {
                sequence_number, ..
            }
            | Self::Ipfix {
                sequence_number, ..
            } => sequence_number,
        }
    }

    /// Reads the message header and returns it with the FlowSet region.
    ///
    /// For IPFIX the region is bounded by the declared message length; bytes
    /// past it are ignored.
    pub fn parse(mut packet: Bytes) -> Result<(Self, Bytes), DecodeError> {
        ensure!(
            packet.remaining() >= VERSION_LEN,
            PacketTooShortSnafu {
                needed: VERSION_LEN,
                available: packet.remaining(),
            }
        );
        let version = packet.get_u16();
        let Some(protocol) = Protocol::from_version(version) else {
            return UnsupportedVersionSnafu { version }.fail();
        };

        let header_len = match protocol {
            Protocol::NetflowV9 => NETFLOW_V9_HEADER_LEN,
            Protocol::Ipfix => IPFIX_HEADER_LEN,
        };
        ensure!(
            packet.remaining() >= header_len - VERSION_LEN,
            PacketTooShortSnafu {
                needed: header_len,
                available: packet.remaining() + VERSION_LEN,
            }
        );

        let header = match protocol {
            Protocol::NetflowV9 => Self::NetflowV9 {
                count: packet.get_u16(),
                sys_uptime: packet.get_u32(),
                unix_secs: packet.get_u32(),
                sequence_number: packet.get_u32(),
                source_id: packet.get_u32(),
            },
            Protocol::Ipfix => {
                let length = packet.get_u16();
                // Version and length are already consumed.
                let available = packet.remaining() + 4;
                let header = Self::Ipfix {
                    length,
                    export_time: packet.get_u32(),
                    sequence_number: packet.get_u32(),
                    observation_domain_id: packet.get_u32(),
                };
                let declared = length as usize;
                ensure!(
                    declared >= IPFIX_HEADER_LEN && declared <= available,
                    InvalidMessageLengthSnafu { length, available }
                );
                packet.truncate(declared - IPFIX_HEADER_LEN);
                header
            }
        };

        Ok((header, packet))
    }
}

/// A decoded record, borrowed from its FlowSet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordRef<'a> {
    Data(&'a DataRecord),
    Options(&'a OptionsDataRecord),
}

/// Everything decoded from one export packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedPacket {
    pub exporter: ExporterKey,
    pub protocol: Protocol,
    /// Absent when the FlowSets were handed over already framed.
    pub header: Option<MessageHeader>,
    pub flowsets: Vec<FlowSet>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DecodedPacket {
    /// Every decoded record in packet order, tagged with its template ID.
    pub fn records(&self) -> impl Iterator<Item = (u16, RecordRef<'_>)> + '_ {
        self.flowsets.iter().flat_map(|flowset| {
            let data: &[DataRecord] = match flowset {
                FlowSet::Data(data) => &data.records,
                _ => &[],
            };
            let options: &[OptionsDataRecord] = match flowset {
                FlowSet::OptionsData(options) => &options.records,
                _ => &[],
            };
            let template_id = flowset.header().id;
            data.iter()
                .map(move |record| (template_id, RecordRef::Data(record)))
                .chain(
                    options
                        .iter()
                        .map(move |record| (template_id, RecordRef::Options(record))),
                )
        })
    }

    /// False when a malformed FlowSet header caused the packet to be dropped.
    /// A dropped packet carries diagnostics but no FlowSets.
    pub fn is_complete(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|diagnostic| matches!(diagnostic, Diagnostic::MalformedHeader { .. }))
    }
}

/// Decodes export packets against a shared template cache.
///
/// Cloning is cheap and every clone shares the cache, so a decoder can be
/// handed to each worker.
#[derive(Clone, Debug)]
pub struct PacketDecoder {
    config: DecoderConfig,
    cache: TemplateCache,
}

impl PacketDecoder {
    pub const fn new(config: DecoderConfig, cache: TemplateCache) -> Self {
        Self { config, cache }
    }

    /// Builds a decoder with a fresh cache sized by `config`.
    pub fn from_config(config: DecoderConfig) -> Self {
        let cache = config.build_cache();
        Self::new(config, cache)
    }

    pub const fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    pub const fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// A renderer using the configured value truncation.
    pub fn renderer<T, S>(&self, type_name: T, scope_name: S) -> Renderer<T, S>
    where
        T: Fn(u16) -> String,
        S: Fn(u16) -> String,
    {
        Renderer::new(type_name, scope_name).with_max_value_len(self.config.max_value_len)
    }

    /// Decodes a complete export packet received from `source`.
    ///
    /// Only an unreadable message header fails the packet. Problems inside
    /// FlowSets are returned as diagnostics; a malformed FlowSet header also
    /// drops every FlowSet of the packet.
    pub fn decode(
        &self,
        packet: Bytes,
        source: SocketAddr,
    ) -> Result<DecodedPacket, DecodeError> {
        let (header, body) = MessageHeader::parse(packet).inspect_err(|error| {
            emit!(NetflowPacketError { source, error });
        })?;

        let exporter = ExporterKey::new(source, header.observation_domain_id());
        let mut decoded = self.decode_flowsets(header.protocol(), exporter, body);
        decoded.header = Some(header);
        Ok(decoded)
    }

    /// Decodes already framed FlowSets on behalf of `exporter`.
    pub fn decode_flowsets(
        &self,
        protocol: Protocol,
        exporter: ExporterKey,
        body: Bytes,
    ) -> DecodedPacket {
        let parsed =
            FlowSetParser::new(&self.cache, &self.config, protocol, exporter).parse(body);
        DecodedPacket {
            exporter,
            protocol,
            header: None,
            flowsets: parsed.flowsets,
            diagnostics: parsed.diagnostics,
        }
    }
}
