//! Journal benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use segjournal_bench::utils::{generate_payloads, populated_journal, random_data, temp_journal};
use segjournal_core::{ReaderMode, StorageLevel};

const LEVELS: [StorageLevel; 2] = [StorageLevel::Disk, StorageLevel::Mapped];

/// Benchmark appends, including segment rolls.
fn bench_append(c: &mut Criterion) {
    for level in LEVELS {
        let mut group = c.benchmark_group(format!("{level}_append"));
        group.sample_size(50);

        for size in [64, 1024, 4096].iter() {
            group.throughput(Throughput::Bytes(*size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
                let (_dir, journal) = temp_journal(level);
                let mut writer = journal.writer().unwrap();
                let data = random_data(size);

                b.iter(|| black_box(writer.append(black_box(&data)).unwrap()));
            });
        }

        group.finish();
    }
}

/// Benchmark a full sequential scan.
fn bench_sequential_read(c: &mut Criterion) {
    let payloads = generate_payloads(10_000, 256);

    let mut group = c.benchmark_group("sequential_read");
    group.throughput(Throughput::Elements(payloads.len() as u64));
    group.sample_size(20);
    for level in LEVELS {
        let (_dir, journal) = populated_journal(level, &payloads);
        group.bench_function(level.to_string(), |b| {
            b.iter(|| {
                let reader = journal.open_reader(1, ReaderMode::All).unwrap();
                black_box(reader.map(|entry| entry.unwrap().len()).sum::<usize>())
            });
        });
    }
    group.finish();
}

/// Benchmark opening readers at arbitrary indices through the sparse index.
fn bench_seek(c: &mut Criterion) {
    let payloads = generate_payloads(10_000, 128);

    let mut group = c.benchmark_group("reader_seek");
    for level in LEVELS {
        let (_dir, journal) = populated_journal(level, &payloads);
        let mut index = 1u64;
        group.bench_function(level.to_string(), |b| {
            b.iter(|| {
                index = index * 7919 % payloads.len() as u64 + 1;
                let mut reader = journal.open_reader(black_box(index), ReaderMode::All).unwrap();
                black_box(reader.try_next().unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_append, bench_sequential_read, bench_seek);
criterion_main!(benches);
