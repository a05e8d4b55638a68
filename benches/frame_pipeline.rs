//! Frame pipeline benchmark suite.
//!
//! Benchmarks the per-connection codec path and the dispatcher fan-out:
//! - Reassembly of fragmented messages
//! - permessage-deflate compress + inflate
//! - Send throughput across in-memory connections
//!
//! Run with: cargo bench --bench frame_pipeline
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use socket_mux::codec::Step;
use socket_mux::{
    ChannelSink, CodecConfig, ConnectionId, CreateOptions, Dispatcher, Event, ExtensionParameters,
    Frame, MemoryFactory, MessageLimits, MessageReassembler, PerMessageDeflate,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const MESSAGE_SIZES: &[usize] = &[128, 4 * 1024, 64 * 1024];
const FRAGMENTS: usize = 8;
const CONNECTION_COUNTS: &[u32] = &[10, 100];

fn payload(size: usize) -> Vec<u8> {
    b"{\"kind\":\"tick\",\"value\":12345}"
        .iter()
        .copied()
        .cycle()
        .take(size)
        .collect()
}

fn fragments(data: &[u8]) -> Vec<Frame> {
    let chunk = data.len().div_ceil(FRAGMENTS).max(1);
    let pieces: Vec<_> = data.chunks(chunk).collect();
    let last = pieces.len() - 1;

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            if i == 0 {
                Frame::text(i == last, piece)
            } else {
                Frame::continuation(i == last, piece)
            }
        })
        .collect()
}

// ============================================================================
// Benchmark: Reassembly
// ============================================================================

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");
    let config = CodecConfig::default();

    for &size in MESSAGE_SIZES {
        let frames = fragments(&payload(size));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("fragmented_text", size), &frames, |b, frames| {
            let mut reassembler = MessageReassembler::new(MessageLimits::unlimited(), &config);
            b.iter(|| {
                for frame in frames.iter().cloned() {
                    if let Step::Message(message) = reassembler.push(frame).unwrap() {
                        black_box(message);
                    }
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Compression
// ============================================================================

fn bench_deflate_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("deflate");
    let config = CodecConfig::default();
    let params = ExtensionParameters::negotiate(&[("permessage-deflate", "")]).unwrap();

    for &size in MESSAGE_SIZES {
        let data = payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("round_trip", size), &data, |b, data| {
            let mut sender = PerMessageDeflate::new(params, &config);
            let mut receiver = PerMessageDeflate::new(params, &config);
            b.iter(|| {
                let compressed = sender.add_frame(Frame::text(true, data.clone())).unwrap();
                black_box(receiver.on_frame(compressed).unwrap());
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Dispatcher Fan-out
// ============================================================================

fn bench_dispatch_send(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("dispatch_send");
    group.sample_size(20);

    for &count in CONNECTION_COUNTS {
        group.bench_with_input(BenchmarkId::new("connections", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| async move { send_to_all(count).await });
        });
    }

    group.finish();
}

async fn send_to_all(count: u32) {
    let (factory, mut peers) = MemoryFactory::new();
    let (sink, mut events) = ChannelSink::new();
    let dispatcher = Dispatcher::builder()
        .factory(factory)
        .event_sink(sink)
        .build()
        .unwrap();

    for i in 0..count {
        dispatcher.create(ConnectionId::new(i), "ws://memory/", "", CreateOptions::default());
    }

    let mut held = Vec::with_capacity(count as usize);
    for _ in 0..count {
        held.push(peers.recv().await.unwrap());
    }
    for _ in 0..count {
        let (_, event) = events.recv().await.unwrap();
        assert!(matches!(event, Event::Open { .. }));
    }

    for i in 0..count {
        dispatcher.send(ConnectionId::new(i), "ping", false);
    }
    for peer in &mut held {
        black_box(peer.recv().await);
    }

    dispatcher.shutdown();
}

criterion_group!(
    benches,
    bench_reassembly,
    bench_deflate_round_trip,
    bench_dispatch_send
);
criterion_main!(benches);
