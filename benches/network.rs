//! Criterion benchmarks for the hebnet network.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use hebnet::network::{Network, NetworkConfig};

fn make_network(cell_count: usize, seed: u64) -> (Network, Vec<String>) {
    let cfg = NetworkConfig::default()
        .with_seed(seed)
        .with_learning(3.0, 0.05);
    let mut net = Network::new(cfg);

    let names: Vec<String> = (0..cell_count).map(|i| format!("cell-{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    net.grow(&refs);

    // Prime the network so update ticks exercise propagation, not just
    // the percept path: confirm a band of pairs and run a few ticks.
    for i in 0..cell_count.min(32) {
        let from = &names[i];
        let to = &names[(i + 1) % cell_count];
        for _ in 0..4 {
            net.reinforce(from, to, 0, 0.8).unwrap();
        }
    }
    for i in 0..16 {
        let percept = &names[i % cell_count];
        net.update(&[percept.as_str()], &[]).unwrap();
    }

    (net, names)
}

/// Benchmark update() with varying cell counts.
fn bench_update_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_size");

    for size in [64, 256, 1024].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (mut net, names) = make_network(size, 42);
            let mut i = 0usize;

            b.iter(|| {
                let percept = names[i % size].as_str();
                i += 1;
                black_box(net.update(&[percept], &[]).unwrap())
            });
        });
    }

    group.finish();
}

/// Benchmark a single reinforcement, which is dominated by the
/// outgoing-row decay.
fn bench_reinforce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reinforce");

    for size in [64, 1024].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (mut net, names) = make_network(size, 7);
            let from = names[0].as_str();
            let to = names[1].as_str();

            b.iter(|| net.reinforce(black_box(from), black_box(to), 0, 0.5).unwrap());
        });
    }

    group.finish();
}

/// Benchmark serializing a network image (tensor chunks are the bulk).
fn bench_save_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("save_image");

    for size in [256, 1024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (net, _) = make_network(size, 3);
            b.iter(|| black_box(net.save_image_bytes().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_update_sizes, bench_reinforce, bench_save_image);
criterion_main!(benches);
