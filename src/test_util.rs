use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bytes::{BufMut, Bytes, BytesMut};

use crate::netflow::{
    ExporterKey, FieldSpecifier, OptionsTemplateRecord, Protocol, TemplateRecord,
    packet::{IPFIX_HEADER_LEN, NETFLOW_V9_HEADER_LEN},
};

pub const EXPORT_PORT: u16 = 2055;

pub fn exporter_addr(host: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, host)), EXPORT_PORT)
}

pub fn exporter(host: u8, observation_domain_id: u32) -> ExporterKey {
    ExporterKey::new(exporter_addr(host), observation_domain_id)
}

/// Assembles export packets FlowSet by FlowSet.
#[derive(Clone, Debug)]
pub struct PacketBuilder {
    protocol: Protocol,
    body: BytesMut,
    flowsets: u16,
}

impl PacketBuilder {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            body: BytesMut::new(),
            flowsets: 0,
        }
    }

    /// Appends a FlowSet whose declared length is taken as given.
    pub fn raw_flowset(mut self, id: u16, length: u16, body: &[u8]) -> Self {
        self.body.put_u16(id);
        self.body.put_u16(length);
        self.body.put_slice(body);
        self.flowsets += 1;
        self
    }

    fn flowset(self, id: u16, body: &[u8]) -> Self {
        let length = (4 + body.len()) as u16;
        self.raw_flowset(id, length, body)
    }

    pub fn template(self, template_id: u16, fields: &[FieldSpecifier]) -> Self {
        let mut record = BytesMut::new();
        TemplateRecord::new(template_id, fields.to_vec())
            .encode(&mut record)
            .unwrap();
        let set_id = self.protocol.template_set_id();
        self.flowset(set_id, &record)
    }

    pub fn options_template(self, template: &OptionsTemplateRecord) -> Self {
        let mut record = BytesMut::new();
        template.encode(self.protocol, &mut record).unwrap();
        let set_id = self.protocol.options_template_set_id();
        self.flowset(set_id, &record)
    }

    pub fn data(self, template_id: u16, records: &[u8]) -> Self {
        self.flowset(template_id, records)
    }

    /// FlowSets without a message header.
    pub fn body(&self) -> Bytes {
        self.body.clone().freeze()
    }

    /// A complete message whose Source ID or observation domain is `domain`.
    pub fn packet(&self, domain: u32) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u16(self.protocol.version());
        match self.protocol {
            Protocol::NetflowV9 => {
                out.put_u16(self.flowsets);
                out.put_u32(360_000);
                out.put_u32(1_700_000_000);
                out.put_u32(42);
                out.put_u32(domain);
                debug_assert_eq!(out.len(), NETFLOW_V9_HEADER_LEN);
            }
            Protocol::Ipfix => {
                out.put_u16((IPFIX_HEADER_LEN + self.body.len()) as u16);
                out.put_u32(1_700_000_000);
                out.put_u32(42);
                out.put_u32(domain);
                debug_assert_eq!(out.len(), IPFIX_HEADER_LEN);
            }
        }
        out.put_slice(&self.body);
        out.freeze()
    }
}
