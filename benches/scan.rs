//! Discovery benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use filterbridge::arch::Architecture;
use filterbridge::discovery::{EnableContext, EnableExpr, PluginScanner, ScannerConfig, parse_pipl};
use filterbridge::pe::{PeImage, ResourceId, probe_architecture};
use filterbridge::testing::{PeBuilder, PiplBuilder};
use std::path::Path;

fn module(filters: usize) -> Vec<u8> {
    let mut builder = PeBuilder::new(Architecture::X64);
    for i in 0..filters {
        builder = builder.resource(
            "PIPL",
            ResourceId::Integer(16000 + i as u16),
            PiplBuilder::filter(&format!("Filter {i}"), "Bench", Architecture::X64, &format!("Entry{i}"))
                .enable_info("in (PSHOP_ImageMode, RGBMode, GrayScaleMode) && PSHOP_ImageDepth == 8")
                .build(),
        );
    }
    builder.build()
}

fn bench_parse_pipl(c: &mut Criterion) {
    let bytes = module(1);
    let image = PeImage::parse(&bytes).unwrap();
    let data = PiplBuilder::filter("Twirl", "Distort", Architecture::X64, "Main").build();

    let mut group = c.benchmark_group("parse_pipl");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("single_filter", |b| {
        b.iter(|| parse_pipl(Path::new("/bench/twirl.8bf"), &image, std::hint::black_box(&data)).unwrap());
    });
    group.finish();
}

fn bench_scan_directory(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_directory");
    group.sample_size(20);

    for files in [8, 64] {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..files {
            std::fs::write(dir.path().join(format!("f{i}.8bf")), module(3)).unwrap();
        }

        for threads in [1, 4] {
            let scanner = PluginScanner::new(
                ScannerConfig::default().with_host(Architecture::X64).with_threads(threads),
            );
            group.throughput(Throughput::Elements(files as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{threads}_threads"), files),
                &scanner,
                |b, scanner| {
                    b.iter(|| {
                        let found = scanner.scan_directory(dir.path());
                        assert_eq!(found.len(), files * 3);
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_probe(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("probe.8bf");
    std::fs::write(&path, module(1)).unwrap();

    c.bench_function("probe_architecture", |b| {
        b.iter(|| probe_architecture(std::hint::black_box(&path)));
    });
}

fn bench_enable_info(c: &mut Criterion) {
    let source = "in (PSHOP_ImageMode, RGBMode, GrayScaleMode) && (PSHOP_ImageDepth == 8 || PSHOP_ImageDepth == 16)";
    let ctx = EnableContext::default();

    let mut group = c.benchmark_group("enable_info");
    group.bench_function("parse", |b| {
        b.iter(|| EnableExpr::parse(std::hint::black_box(source)).unwrap());
    });
    let expr = EnableExpr::parse(source).unwrap();
    group.bench_function("evaluate", |b| {
        b.iter(|| expr.is_enabled(std::hint::black_box(&ctx)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_pipl,
    bench_scan_directory,
    bench_probe,
    bench_enable_info
);
criterion_main!(benches);
