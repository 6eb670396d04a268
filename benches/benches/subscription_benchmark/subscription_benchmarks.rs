use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use libris::{EventBus, SubscriptionChannel};

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let bus: EventBus<u64> = EventBus::new(64);
    c.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            let sub = bus.subscribe("chan");
            drop(black_box(sub));
        })
    });
}

fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");

    for &subscribers in &[1usize, 10, 100] {
        let bus: EventBus<u64> = EventBus::new(1024);
        // подписки держим живыми весь прогон, очереди упираются в ёмкость
        let _subs: Vec<SubscriptionChannel<u64>> =
            (0..subscribers).map(|_| bus.subscribe("chan")).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| b.iter(|| black_box(bus.publish("chan", black_box(7)))),
        );
    }
    group.finish();
}

fn bench_publish_and_drain(c: &mut Criterion) {
    let bus: EventBus<u64> = EventBus::new(1024);
    let mut sub = bus.subscribe("chan");
    c.bench_function("publish_and_drain", |b| {
        b.iter(|| {
            bus.publish("chan", 1);
            black_box(sub.try_recv().ok());
        })
    });
}

fn bench_publish_no_subscribers(c: &mut Criterion) {
    let bus: EventBus<u64> = EventBus::new(64);
    c.bench_function("publish_no_subscribers", |b| {
        b.iter(|| black_box(bus.publish("nobody", 1)))
    });
}

criterion_group!(
    benches,
    bench_subscribe_unsubscribe,
    bench_publish_fan_out,
    bench_publish_and_drain,
    bench_publish_no_subscribers,
);
criterion_main!(benches);
