//! Fan-out benchmarks for the message router.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use webchannel_core::{ConnectionRegistry, Message, Observer, SharedChannel};

fn join_many(registry: &ConnectionRegistry, count: usize) -> Vec<SharedChannel> {
    (0..count)
        .map(|_| SharedChannel::join(registry, "bench").unwrap())
        .collect()
}

/// Benchmark callback delivery to every handle in a channel.
fn bench_callback_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("callback_fanout");

    for size in [2usize, 16, 128] {
        let registry = ConnectionRegistry::new();
        let channels = join_many(&registry, size);
        for channel in &channels {
            channel.register_callback("key", |p| {
                black_box(p);
            });
        }

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &channels, |b, channels| {
            b.iter(|| {
                channels[0]
                    .send_message(black_box(Message::all("payload").with_callback_key("key")))
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark observer delivery.
fn bench_observer_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("observer_fanout");

    for size in [2usize, 16, 128] {
        let registry = ConnectionRegistry::new();
        let channels = join_many(&registry, size);
        let _observers: Vec<Observer> = channels
            .iter()
            .map(|channel| {
                Observer::new(channel, |m| {
                    black_box(m);
                })
                .unwrap()
            })
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &channels, |b, channels| {
            b.iter(|| {
                channels[0]
                    .send_message(black_box(Message::broadcast("payload")))
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark join/leave churn.
fn bench_membership(c: &mut Criterion) {
    let registry = ConnectionRegistry::new();
    let _anchor = SharedChannel::join(&registry, "bench").unwrap();

    c.bench_function("join_leave", |b| {
        b.iter(|| {
            let channel = SharedChannel::join(&registry, "bench").unwrap();
            black_box(channel.connections());
        })
    });
}

criterion_group!(
    benches,
    bench_callback_fanout,
    bench_observer_fanout,
    bench_membership
);
criterion_main!(benches);
