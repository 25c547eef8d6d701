use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bytes::{BufMut, Bytes, BytesMut};
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use netflow_decoder::{DecoderConfig, PacketDecoder};

const RECORDS: usize = 24;

/// A NetFlow v9 packet carrying a five-tuple template and `RECORDS` records.
fn packet() -> Bytes {
    let fields: [(u16, u16); 7] = [(8, 4), (12, 4), (7, 2), (11, 2), (4, 1), (1, 8), (2, 8)];
    let record_len: usize = fields.iter().map(|(_, len)| *len as usize).sum();

    let mut template = BytesMut::new();
    template.put_u16(256);
    template.put_u16(fields.len() as u16);
    for (field_type, len) in fields {
        template.put_u16(field_type);
        template.put_u16(len);
    }

    let mut data = BytesMut::new();
    for i in 0..RECORDS {
        data.put_slice(&[10, 0, 0, i as u8, 192, 0, 2, 1]);
        data.put_u16(40_000 + i as u16);
        data.put_u16(443);
        data.put_u8(6);
        data.put_u64(1500 * i as u64);
        data.put_u64(i as u64);
    }
    debug_assert_eq!(data.len(), RECORDS * record_len);

    let mut out = BytesMut::new();
    out.put_u16(9);
    out.put_u16(2);
    out.put_u32(360_000);
    out.put_u32(1_700_000_000);
    out.put_u32(1);
    out.put_u32(0);
    for (id, body) in [(0u16, template), (256, data)] {
        out.put_u16(id);
        out.put_u16((4 + body.len()) as u16);
        out.put_slice(&body);
    }
    out.freeze()
}

fn benchmark_decode(c: &mut Criterion) {
    let source = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 2055);
    let packet = packet();
    let decoder = PacketDecoder::from_config(DecoderConfig::default());

    let mut group = c.benchmark_group("netflow/decode");
    group.throughput(Throughput::Bytes(packet.len() as u64));
    group.bench_function("netflow_v9", |b| {
        b.iter_batched(
            || packet.clone(),
            |packet| decoder.decode(packet, source),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, benchmark_decode);
criterion_main!(benches);
