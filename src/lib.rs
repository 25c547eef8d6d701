#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]

//! NetFlow v9 and IPFIX FlowSet decoding driven by exporter templates.

#[macro_use]
extern crate tracing;

#[macro_use]
pub mod internal_events;

pub mod config;
pub mod error;
pub mod netflow;

#[cfg(test)]
mod test_util;

pub use self::{
    config::{ConfigError, DecoderConfig, LookupPrecedence},
    error::{DecodeError, EncodeError},
    netflow::{DecodedPacket, ExporterKey, PacketDecoder, Protocol, TemplateCache},
};
