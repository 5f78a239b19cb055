use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dataverse_exporter::{archive, chunker, CollectedFile, FileCatalog};
use std::fs;
use tempfile::TempDir;

const MAX_PAYLOAD: u64 = 100 * 1024 * 1024;

fn make_files(count: usize) -> Vec<CollectedFile> {
    (0..count)
        .map(|i| {
            // Mix of small feedback records and larger transcripts
            let size = if i % 10 == 0 { 2 * 1024 * 1024 } else { 4 * 1024 };
            CollectedFile::new(format!("transcripts/u{}/c{}.json", i % 50, i), size)
        })
        .collect()
}

fn populate(dir: &TempDir, count: usize) {
    for i in 0..count {
        let sub = dir.path().join(if i % 2 == 0 { "feedback" } else { "transcripts" });
        fs::create_dir_all(&sub).unwrap();
        fs::write(
            sub.join(format!("{}.json", i)),
            format!("{{\"id\": {}, \"query\": \"{}\"}}", i, "q".repeat(256)),
        )
        .unwrap();
    }
}

fn bench_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunker_group");

    for file_count in [100, 1000, 10000].iter() {
        let files = make_files(*file_count);
        group.bench_with_input(BenchmarkId::from_parameter(file_count), &files, |b, files| {
            b.iter(|| chunker::group(black_box(files), black_box(MAX_PAYLOAD)));
        });
    }

    group.finish();
}

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_collect");

    for file_count in [100, 1000].iter() {
        let dir = TempDir::new().unwrap();
        populate(&dir, *file_count);
        let catalog = FileCatalog::new(dir.path(), Vec::<String>::new(), MAX_PAYLOAD, u64::MAX);

        group.bench_with_input(BenchmarkId::from_parameter(file_count), &catalog, |b, catalog| {
            b.iter(|| catalog.collect().unwrap());
        });
    }

    group.finish();
}

fn bench_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_build");
    group.sample_size(20);

    for file_count in [10, 100, 500].iter() {
        let dir = TempDir::new().unwrap();
        populate(&dir, *file_count);
        let catalog = FileCatalog::new(dir.path(), Vec::<String>::new(), MAX_PAYLOAD, u64::MAX);
        let paths: Vec<_> = catalog
            .collect()
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(file_count), &paths, |b, paths| {
            b.iter(|| archive::build(black_box(paths), dir.path()).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_group, bench_collect, bench_archive);
criterion_main!(benches);
