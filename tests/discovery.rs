//! Directory scans over synthetic filter modules.

use filterbridge::arch::Architecture;
use filterbridge::discovery::properties::ANY_HOST;
use filterbridge::discovery::{EnableContext, PluginScanner, ScannerConfig, SkipReason};
use filterbridge::pe::ResourceId;
use filterbridge::plugin::{ImageMode, PluginCatalog};
use filterbridge::testing::{PeBuilder, PiplBuilder, legacy_pimi, legacy_title};
use std::path::Path;

fn x64_scanner() -> PluginScanner {
    PluginScanner::new(ScannerConfig::default().with_host(Architecture::X64).with_threads(2))
}

fn write(dir: &Path, name: &str, bytes: &[u8]) {
    std::fs::write(dir.join(name), bytes).unwrap();
}

#[test]
fn test_mixed_directory() {
    let dir = tempfile::tempdir().unwrap();

    let modern = PeBuilder::new(Architecture::X64)
        .resource(
            "PIPL",
            ResourceId::Integer(16000),
            PiplBuilder::filter("Twirl", "Distort", Architecture::X64, "PluginMain").build(),
        )
        .build();
    write(dir.path(), "twirl.8bf", &modern);

    let legacy = PeBuilder::new(Architecture::X86)
        .resource("PIMI", ResourceId::Name("RIPPLE".into()), legacy_pimi("Distort", 8 | 2, ANY_HOST))
        .resource("_8BFM", ResourceId::Name("RIPPLE".into()), legacy_title("Ripple..."))
        .build();
    write(dir.path(), "ripple.8bf", &legacy);

    write(dir.path(), "readme.8bf", b"not a library at all");

    let report = x64_scanner().scan_directory_with_report(dir.path());
    assert_eq!(report.files_examined, 3);

    let mut titles: Vec<_> = report.descriptors.iter().map(|d| d.title().to_string()).collect();
    titles.sort();
    assert_eq!(titles, ["Ripple...", "Twirl"]);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::UnknownArchitecture);
    assert!(report.skipped[0].path.ends_with("readme.8bf"));

    let ripple = report.descriptors.iter().find(|d| d.title() == "Ripple...").unwrap();
    assert_eq!(ripple.entry_point(), "RIPPLE");
    assert_eq!(ripple.architecture(), Architecture::X86);
}

#[test]
fn test_module_with_many_filters() {
    let dir = tempfile::tempdir().unwrap();
    let names = ["Blur", "Sharpen", "Noise", "Emboss"];
    let mut builder = PeBuilder::new(Architecture::X64);
    for (i, name) in names.iter().enumerate() {
        builder = builder.resource(
            "PIPL",
            ResourceId::Integer(16000 + i as u16),
            PiplBuilder::filter(name, "Pack", Architecture::X64, &format!("{name}Main")).build(),
        );
    }
    write(dir.path(), "pack.8bf", &builder.build());

    let found = x64_scanner().scan_directory(dir.path());
    assert_eq!(found.len(), names.len());

    let mut expected: Vec<String> = names.iter().map(|n| format!("{n}Main")).collect();
    expected.sort();
    for descriptor in &found {
        let mut points = descriptor.module_entry_points().unwrap().to_vec();
        points.sort();
        assert_eq!(points, expected);
    }
}

#[test]
fn test_truncated_property_lists_yield_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipl = PiplBuilder::filter("Broken", "Tests", Architecture::X64, "Main").build();
    pipl.truncate(pipl.len() / 2);
    let bytes = PeBuilder::new(Architecture::X64)
        .resource("PIPL", ResourceId::Integer(1), pipl)
        .build();
    write(dir.path(), "broken.8bf", &bytes);

    let report = x64_scanner().scan_directory_with_report(dir.path());
    assert!(report.descriptors.is_empty());
}

#[test]
fn test_catalog_filters_by_enable_info() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = PeBuilder::new(Architecture::X64)
        .resource(
            "PIPL",
            ResourceId::Integer(1),
            PiplBuilder::filter("Deep", "Tests", Architecture::X64, "Deep")
                .enable_info("PSHOP_ImageDepth == 16")
                .build(),
        )
        .resource(
            "PIPL",
            ResourceId::Integer(2),
            PiplBuilder::filter("Plain", "Tests", Architecture::X64, "Plain").build(),
        )
        .build();
    write(dir.path(), "mixed.8bf", &bytes);

    let catalog: PluginCatalog = x64_scanner().scan_directory(dir.path()).into_iter().collect();
    assert_eq!(catalog.len(), 2);

    let eight_bit = EnableContext::default();
    let enabled: Vec<_> = catalog.enabled_for(&eight_bit).map(|d| d.title()).collect();
    assert_eq!(enabled, ["Plain"]);

    let sixteen_bit = EnableContext {
        image_depth: 16,
        ..EnableContext::default()
    };
    assert_eq!(catalog.enabled_for(&sixteen_bit).count(), 2);

    let cmyk = EnableContext {
        image_mode: ImageMode::Cmyk,
        ..EnableContext::default()
    };
    assert_eq!(catalog.enabled_for(&cmyk).count(), 0);
}
