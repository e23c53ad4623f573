// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for the VeriSimDB segmented journal

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::path::{Path, PathBuf};

use verisim_journal::{BytesSerdes, JournalConfig, JournalWriter, ReaderMode, SegmentedJournal, StorageLevel};

const LEVELS: [StorageLevel; 2] = [StorageLevel::Disk, StorageLevel::Mapped];

fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bench-{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn open(dir: &Path, level: StorageLevel) -> SegmentedJournal<BytesSerdes> {
    let config = JournalConfig::new(dir, "bench")
        .with_storage_level(level)
        .with_max_segment_size(4 * 1024 * 1024)
        .with_index_density(0.01);
    SegmentedJournal::open(config, BytesSerdes).unwrap()
}

fn fill(journal: &mut SegmentedJournal<BytesSerdes>, count: u64, entry_size: usize) {
    let writer = journal.writer().unwrap();
    for i in 0..count {
        writer.append(vec![(i % 251) as u8; entry_size]).unwrap();
    }
    writer.commit(writer.last_index()).unwrap();
}

/// Start over once the journal holds this many entries, to bound disk use.
const RECYCLE_AFTER: u64 = 20_000;

fn recycle(writer: &mut JournalWriter<BytesSerdes>) {
    if writer.next_index() % RECYCLE_AFTER == 0 {
        let next = writer.next_index() + 1;
        writer.reset(next).unwrap();
    }
}

// ============================================================================
// Append Benchmarks
// ============================================================================

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for level in LEVELS {
        for entry_size in [64usize, 1024, 16 * 1024] {
            let dir = temp_dir("append");
            let mut journal = open(&dir, level);
            let entry = vec![0xAB; entry_size];

            group.throughput(Throughput::Bytes(entry_size as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{level:?}"), entry_size),
                &entry,
                |b, entry| {
                    let writer = journal.writer().unwrap();
                    b.iter(|| {
                        recycle(writer);
                        black_box(writer.append(entry.clone()).unwrap().index)
                    });
                },
            );

            drop(journal);
            std::fs::remove_dir_all(&dir).ok();
        }
    }

    group.finish();
}

fn bench_append_and_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_commit");

    for level in LEVELS {
        let dir = temp_dir("commit");
        let mut journal = open(&dir, level);

        group.bench_function(format!("{level:?}"), |b| {
            let writer = journal.writer().unwrap();
            b.iter(|| {
                recycle(writer);
                let index = writer.append(vec![7u8; 256]).unwrap().index;
                writer.commit(black_box(index)).unwrap();
            });
        });

        drop(journal);
        std::fs::remove_dir_all(&dir).ok();
    }

    group.finish();
}

// ============================================================================
// Read Benchmarks
// ============================================================================

fn bench_sequential_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_read");
    let count = 10_000u64;

    for level in LEVELS {
        for mode in [ReaderMode::All, ReaderMode::Commits] {
            let dir = temp_dir("read");
            let mut journal = open(&dir, level);
            fill(&mut journal, count, 256);

            group.throughput(Throughput::Elements(count));
            group.bench_function(format!("{level:?}/{mode:?}"), |b| {
                let mut reader = journal.open_reader(1, mode).unwrap();
                b.iter(|| {
                    reader.reset().unwrap();
                    let mut read = 0u64;
                    while let Some(indexed) = reader.try_next().unwrap() {
                        read += indexed.size as u64;
                    }
                    black_box(read)
                });
            });

            drop(journal);
            std::fs::remove_dir_all(&dir).ok();
        }
    }

    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    let mut group = c.benchmark_group("seek");
    let count = 50_000u64;

    for level in LEVELS {
        let dir = temp_dir("seek");
        let mut journal = open(&dir, level);
        fill(&mut journal, count, 128);

        group.bench_function(format!("{level:?}"), |b| {
            let mut reader = journal.open_reader(1, ReaderMode::All).unwrap();
            let mut target = 1u64;
            b.iter(|| {
                // Stride through the journal so every seek lands somewhere new.
                target = (target + 7_919) % count + 1;
                reader.reset_to(target).unwrap();
                black_box(reader.try_next().unwrap().map(|indexed| indexed.index))
            });
        });

        drop(journal);
        std::fs::remove_dir_all(&dir).ok();
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_append,
    bench_append_and_commit,
    bench_sequential_read,
    bench_seek,
);

criterion_main!(benches);
