//! Directory scanning.

use super::pimi::read_pimi;
use super::pipl::read_pipl;
use super::properties::{FILTER_TITLE_RESOURCE, PIMI_RESOURCE, PIPL_RESOURCE};
use super::ModuleScan;
use crate::arch::Architecture;
use crate::observability::span_scan;
use crate::pe::{PeImage, probe_architecture};
use crate::plugin::PluginDescriptor;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Extension of filter modules.
pub const FILTER_EXTENSION: &str = "8bf";
/// Extension of Windows shell shortcuts.
pub const SHORTCUT_EXTENSION: &str = "lnk";

/// Resolves shell shortcut files to their targets.
pub trait ShortcutResolver: Send + Sync {
    /// The target of the shortcut at `path`, if it can be resolved.
    fn resolve(&self, path: &Path) -> Option<PathBuf>;
}

/// A resolver that resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoShortcuts;

impl ShortcutResolver for NoShortcuts {
    fn resolve(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

/// Scanner configuration.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Architecture of the host; decides which modules are accepted.
    pub host: Architecture,
    /// Maximum number of files scanned concurrently.
    pub threads: usize,
    /// Descend into sub-directories.
    pub recursive: bool,
    /// Consider every file, not only `.8bf` modules.
    pub all_files: bool,
    /// Modules larger than this are skipped.
    pub max_module_size: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            host: Architecture::host(),
            threads: std::thread::available_parallelism()
                .map(|n| n.get().min(8))
                .unwrap_or(1),
            recursive: true,
            all_files: false,
            max_module_size: 256 * 1024 * 1024,
        }
    }
}

impl ScannerConfig {
    /// Set the host architecture.
    pub fn with_host(mut self, host: Architecture) -> Self {
        self.host = host;
        self
    }

    /// Set the number of scanning threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Enable or disable recursion.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Consider every file regardless of extension.
    pub fn with_all_files(mut self, all_files: bool) -> Self {
        self.all_files = all_files;
        self
    }

    /// Set the module size limit.
    pub fn with_max_module_size(mut self, bytes: u64) -> Self {
        self.max_module_size = bytes;
        self
    }
}

/// Why a file produced no descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Not a recognizable native library.
    UnknownArchitecture,
    /// A library this host cannot execute.
    UnsupportedArchitecture(Architecture),
    /// The headers or resource tree are damaged.
    NotPeImage(String),
    /// The library carries no filter resources.
    NoFilterResources,
    /// The file exceeds the size limit.
    TooLarge(u64),
    /// A shortcut whose target could not be resolved.
    UnresolvedShortcut,
    /// Reading the file failed.
    Io(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownArchitecture => f.write_str("unknown architecture"),
            Self::UnsupportedArchitecture(arch) => write!(f, "unsupported architecture {arch}"),
            Self::NotPeImage(e) => write!(f, "not a valid image: {e}"),
            Self::NoFilterResources => f.write_str("no filter resources"),
            Self::TooLarge(size) => write!(f, "module of {size} bytes exceeds limit"),
            Self::UnresolvedShortcut => f.write_str("unresolved shortcut"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

/// A file that produced no descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    /// The file.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Result of a directory scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Filters found, in directory order.
    pub descriptors: Vec<PluginDescriptor>,
    /// Files that yielded nothing.
    pub skipped: Vec<SkippedFile>,
    /// Number of candidate files examined.
    pub files_examined: usize,
}

/// Finds filters in directories of modules.
pub struct PluginScanner {
    config: ScannerConfig,
    resolver: Box<dyn ShortcutResolver>,
}

impl fmt::Debug for PluginScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginScanner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for PluginScanner {
    fn default() -> Self {
        Self::new(ScannerConfig::default())
    }
}

impl PluginScanner {
    /// Create a scanner.
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            config,
            resolver: Box::new(NoShortcuts),
        }
    }

    /// Use `resolver` for shortcut files.
    pub fn with_resolver(mut self, resolver: impl ShortcutResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Every filter found under `dir`. Never fails.
    pub fn scan_directory(&self, dir: impl AsRef<Path>) -> Vec<PluginDescriptor> {
        self.scan_directory_with_report(dir).descriptors
    }

    /// Every filter found under `dir`, with the files that were skipped.
    pub fn scan_directory_with_report(&self, dir: impl AsRef<Path>) -> ScanReport {
        let dir = dir.as_ref();
        let _span = span_scan(dir).entered();

        let mut report = ScanReport::default();
        let mut candidates = Vec::new();
        let mut visited = HashSet::new();
        self.collect_candidates(dir, &mut visited, &mut candidates, &mut report.skipped);
        report.files_examined = candidates.len();

        for (path, outcome) in self.scan_all(&candidates) {
            match outcome {
                Ok(mut found) => report.descriptors.append(&mut found),
                Err(reason) => report.skipped.push(SkippedFile {
                    path: path.clone(),
                    reason,
                }),
            }
        }

        tracing::info!(
            "scanned {}: {} filters from {} files, {} skipped",
            dir.display(),
            report.descriptors.len(),
            report.files_examined,
            report.skipped.len()
        );
        report
    }

    /// Scan one module.
    pub fn scan_file(&self, path: impl AsRef<Path>) -> Result<Vec<PluginDescriptor>, SkipReason> {
        let path = path.as_ref();

        let architecture = probe_architecture(path);
        if architecture == Architecture::Unknown {
            tracing::warn!("{}: unknown architecture", path.display());
            return Err(SkipReason::UnknownArchitecture);
        }
        if !self.config.host.accepts(architecture) {
            tracing::warn!(
                "{}: {} modules cannot run on a {} host",
                path.display(),
                architecture,
                self.config.host
            );
            return Err(SkipReason::UnsupportedArchitecture(architecture));
        }

        let bytes = read_module(path, self.config.max_module_size)?;
        let image = PeImage::parse(&bytes).map_err(|e| {
            tracing::error!("{}: {}", path.display(), e);
            SkipReason::NotPeImage(e.to_string())
        })?;

        let scan = ModuleScan {
            path,
            image: &image,
            architecture,
        };
        let descriptors = scan_resources(&scan)?;

        if descriptors.len() > 1 {
            let mut entry_points: Vec<String> = Vec::with_capacity(descriptors.len());
            for d in &descriptors {
                if !entry_points.iter().any(|e| e == d.entry_point()) {
                    entry_points.push(d.entry_point().to_string());
                }
            }
            return Ok(descriptors
                .into_iter()
                .map(|d| d.with_module_entry_points(entry_points.clone()))
                .collect());
        }
        Ok(descriptors)
    }

    fn scan_all<'p>(
        &self,
        candidates: &'p [PathBuf],
    ) -> Vec<(&'p PathBuf, Result<Vec<PluginDescriptor>, SkipReason>)> {
        let threads = self.config.threads.max(1);
        if threads == 1 || candidates.len() <= 1 {
            return candidates
                .iter()
                .map(|path| (path, self.scan_file(path)))
                .collect();
        }

        let chunk_size = candidates.len().div_ceil(threads);
        std::thread::scope(|scope| {
            let workers: Vec<_> = candidates
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|path| (path, self.scan_file(path)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(candidates.len());
            for worker in workers {
                match worker.join() {
                    Ok(mut chunk) => results.append(&mut chunk),
                    Err(_) => tracing::error!("scanner thread panicked; its files are skipped"),
                }
            }
            results
        })
    }

    /// Directories are visited once by canonical path, so symlinks that
    /// loop back into the tree end the walk.
    fn collect_candidates(
        &self,
        dir: &Path,
        visited: &mut HashSet<PathBuf>,
        out: &mut Vec<PathBuf>,
        skipped: &mut Vec<SkippedFile>,
    ) {
        let canonical = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        if !visited.insert(canonical) {
            tracing::debug!("{} already scanned", dir.display());
            return;
        }

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("cannot read {}: {}", dir.display(), e);
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                if self.config.recursive {
                    self.collect_candidates(&path, visited, out, skipped);
                }
                continue;
            }

            let path = if has_extension(&path, SHORTCUT_EXTENSION) {
                match self.resolver.resolve(&path) {
                    Some(target) => target,
                    None => {
                        skipped.push(SkippedFile {
                            path,
                            reason: SkipReason::UnresolvedShortcut,
                        });
                        continue;
                    }
                }
            } else {
                path
            };

            if self.config.all_files || has_extension(&path, FILTER_EXTENSION) {
                out.push(path);
            }
        }
    }
}

/// Enumerate filter resources, falling back to the legacy format only when
/// the module has no property lists at all.
fn scan_resources(scan: &ModuleScan<'_>) -> Result<Vec<PluginDescriptor>, SkipReason> {
    let image_error = |e: crate::pe::PeError| {
        tracing::error!("{}: {}", scan.path.display(), e);
        SkipReason::NotPeImage(e.to_string())
    };

    let pipls = scan.image.resources(PIPL_RESOURCE).map_err(image_error)?;
    let mut descriptors = Vec::new();

    if !pipls.is_empty() {
        for resource in pipls {
            match read_pipl(scan, resource.data) {
                Ok(d) => descriptors.push(d),
                Err(e) => e.log(scan.path, &resource.name),
            }
        }
        return Ok(descriptors);
    }

    let pimis = scan.image.resources(PIMI_RESOURCE).map_err(image_error)?;
    if pimis.is_empty() {
        tracing::debug!("{}: no filter resources", scan.path.display());
        return Err(SkipReason::NoFilterResources);
    }
    for resource in pimis {
        let title = match scan.image.find_resource(FILTER_TITLE_RESOURCE, &resource.name) {
            Ok(title) => title,
            Err(e) => {
                tracing::warn!("{} {}: title resource: {}", scan.path.display(), resource.name, e);
                None
            }
        };
        match read_pimi(scan, &resource.name, resource.data, title) {
            Ok(d) => descriptors.push(d),
            Err(e) => e.log(scan.path, &resource.name),
        }
    }
    Ok(descriptors)
}

fn read_module(path: &Path, limit: u64) -> Result<Vec<u8>, SkipReason> {
    let io_error = |e: std::io::Error| {
        tracing::warn!("{}: {}", path.display(), e);
        SkipReason::Io(e.to_string())
    };
    let size = std::fs::metadata(path).map_err(io_error)?.len();
    if size > limit {
        tracing::warn!("{}: {} bytes exceeds the module size limit", path.display(), size);
        return Err(SkipReason::TooLarge(size));
    }
    std::fs::read(path).map_err(io_error)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::ResourceId;
    use crate::testing::{PeBuilder, PiplBuilder};

    fn scanner() -> PluginScanner {
        PluginScanner::new(ScannerConfig::default().with_host(Architecture::X64).with_threads(1))
    }

    #[test]
    fn test_multi_filter_module_shares_entry_points() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = PeBuilder::new(Architecture::X64);
        for (i, name) in ["One", "Two", "Three"].iter().enumerate() {
            builder = builder.resource(
                "PIPL",
                ResourceId::Integer(16000 + i as u16),
                PiplBuilder::filter(name, "Pack", Architecture::X64, &format!("Entry{name}")).build(),
            );
        }
        let path = dir.path().join("pack.8bf");
        std::fs::write(&path, builder.build()).unwrap();

        let found = scanner().scan_file(&path).unwrap();
        assert_eq!(found.len(), 3);
        for d in &found {
            let mut points = d.module_entry_points().unwrap().to_vec();
            points.sort();
            assert_eq!(points, ["EntryOne", "EntryThree", "EntryTwo"]);
        }
    }

    #[test]
    fn test_single_filter_has_no_entry_point_set() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = PeBuilder::new(Architecture::X86)
            .resource(
                "PIPL",
                ResourceId::Integer(1),
                PiplBuilder::filter("Solo", "Tests", Architecture::X86, "Solo").build(),
            )
            .build();
        let path = dir.path().join("solo.8bf");
        std::fs::write(&path, bytes).unwrap();

        let found = scanner().scan_file(&path).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].module_entry_points().is_none());
    }

    #[test]
    fn test_directory_symlink_loop_is_walked_once() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = PeBuilder::new(Architecture::X64)
            .resource(
                "PIPL",
                ResourceId::Integer(1),
                PiplBuilder::filter("Loop", "Tests", Architecture::X64, "Loop").build(),
            )
            .build();
        std::fs::write(dir.path().join("loop.8bf"), bytes).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("nested").join("up")).unwrap();
        std::os::unix::fs::symlink(".", dir.path().join("self")).unwrap();

        let report = scanner().scan_directory_with_report(dir.path());
        assert_eq!(report.files_examined, 1);
        assert_eq!(report.descriptors.len(), 1);
    }

    #[test]
    fn test_policy_rejects_other_architectures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arm.8bf");
        std::fs::write(&path, PeBuilder::new(Architecture::Arm64).build()).unwrap();
        assert_eq!(
            scanner().scan_file(&path),
            Err(SkipReason::UnsupportedArchitecture(Architecture::Arm64))
        );
    }

    #[test]
    fn test_no_resources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.8bf");
        std::fs::write(&path, PeBuilder::new(Architecture::X64).build()).unwrap();
        assert_eq!(scanner().scan_file(&path), Err(SkipReason::NoFilterResources));
    }

    #[test]
    fn test_extension_filter_and_shortcuts() {
        struct ToFixture(PathBuf);
        impl ShortcutResolver for ToFixture {
            fn resolve(&self, _path: &Path) -> Option<PathBuf> {
                Some(self.0.clone())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let bytes = PeBuilder::new(Architecture::X64)
            .resource(
                "PIPL",
                ResourceId::Integer(1),
                PiplBuilder::filter("Linked", "Tests", Architecture::X64, "Main").build(),
            )
            .build();
        let target = target_dir.path().join("linked.8BF");
        std::fs::write(&target, &bytes).unwrap();
        std::fs::write(dir.path().join("ignored.dll"), &bytes).unwrap();
        std::fs::write(dir.path().join("shortcut.lnk"), b"").unwrap();

        let report = scanner().scan_directory_with_report(dir.path());
        assert_eq!(report.descriptors.len(), 0);
        assert_eq!(report.skipped[0].reason, SkipReason::UnresolvedShortcut);

        let report = scanner()
            .with_resolver(ToFixture(target))
            .scan_directory_with_report(dir.path());
        assert_eq!(report.descriptors.len(), 1);
        assert_eq!(report.descriptors[0].title(), "Linked");

        let all = PluginScanner::new(ScannerConfig::default().with_host(Architecture::X64).with_all_files(true))
            .scan_directory(dir.path());
        assert_eq!(all.len(), 1);
    }
}
