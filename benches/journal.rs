use criterion::{criterion_group, criterion_main, Criterion};
use rand::RngCore;
use segmented_journal::{Config, Journal};

fn append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    let sizes = [
        128,     // 128 B
        1_024,   // 1 KiB
        4_096,   // 4 KiB
        16_000,  // 16 KiB
        64_000,  // 64 KiB
        256_000, // 256 KiB
    ];

    for size in sizes {
        let folder = tempfile::tempdir().unwrap();

        let journal = Journal::open(
            folder.path(),
            Config::default().max_segment_size(256 * 1_024 * 1_024),
        )
        .unwrap();

        let mut rng = rand::thread_rng();
        let mut data = vec![0u8; size];
        rng.fill_bytes(&mut data);

        group.bench_function(format!("{size} bytes"), |b| {
            b.iter(|| {
                journal.append(&data).unwrap();
            });
        });
    }

    group.finish();
}

fn read_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    let folder = tempfile::tempdir().unwrap();
    let journal = Journal::open(folder.path(), Config::default()).unwrap();

    let mut rng = rand::thread_rng();
    let mut data = vec![0u8; 1_024];

    for _ in 0..10_000 {
        rng.fill_bytes(&mut data);
        journal.append(&data).unwrap();
    }

    group.bench_function("sequential scan (10k x 1 KiB)", |b| {
        b.iter(|| {
            let reader = journal.open_reader().unwrap();
            assert_eq!(10_000, reader.map(Result::unwrap).count());
        });
    });

    group.bench_function("seek to random index", |b| {
        let mut reader = journal.open_reader().unwrap();

        b.iter(|| {
            let index = 1 + rng.next_u64() % 10_000;
            reader.seek(index);
            assert_eq!(index, reader.read_next().unwrap().unwrap().index);
        });
    });

    group.finish();
}

criterion_group!(benches, append, read_sequential);
criterion_main!(benches);
