//! File access benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use segjournal_bench::utils::random_data;
use segjournal_storage::{FileAccess, FileReader, FileWriter, StorageLevel};
use tempfile::TempDir;

const FILE_SIZE: usize = 16 * 1024 * 1024;

fn open_access(dir: &TempDir, level: StorageLevel) -> FileAccess {
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(dir.path().join("bench.log"))
        .unwrap();
    file.set_len(FILE_SIZE as u64).unwrap();
    FileAccess::open(&file, level, FILE_SIZE).unwrap()
}

/// Benchmark sequential two-phase writes.
fn bench_write(c: &mut Criterion) {
    for level in [StorageLevel::Disk, StorageLevel::Mapped] {
        let mut group = c.benchmark_group(format!("{level}_write"));
        group.sample_size(50);

        for size in [256, 1024, 4096].iter() {
            group.throughput(Throughput::Bytes(*size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
                let temp_dir = TempDir::new().unwrap();
                let access = open_access(&temp_dir, level);
                let mut writer = access.new_writer();
                let data = random_data(size);
                let mut position = 0;

                b.iter(|| {
                    if position + size > FILE_SIZE {
                        position = 0;
                    }
                    let mut region = writer.start_write(position, size).unwrap();
                    region.copy_from_slice(black_box(&data));
                    drop(region);
                    writer.commit_write(position, size).unwrap();
                    position += size;
                });
            });
        }

        group.finish();
    }
}

/// Benchmark reads of previously written regions.
fn bench_read(c: &mut Criterion) {
    for level in [StorageLevel::Disk, StorageLevel::Mapped] {
        let mut group = c.benchmark_group(format!("{level}_read"));

        for size in [256, 1024, 4096].iter() {
            group.throughput(Throughput::Bytes(*size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
                let temp_dir = TempDir::new().unwrap();
                let access = open_access(&temp_dir, level);
                let mut reader = access.new_reader();
                let mut position = 0;

                b.iter(|| {
                    if position + size > FILE_SIZE {
                        position = 0;
                    }
                    let region = reader.read(black_box(position), size).unwrap();
                    black_box(&*region);
                    drop(region);
                    position += size;
                });
            });
        }

        group.finish();
    }
}

criterion_group!(benches, bench_write, bench_read);
criterion_main!(benches);
