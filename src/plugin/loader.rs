//! Loading filter modules with libloading.

use super::descriptor::PluginDescriptor;
use libloading::Library;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading a filter module.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to load the shared library.
    #[error("failed to load {path}: {message}")]
    LoadFailed {
        /// Module path.
        path: PathBuf,
        /// Loader message.
        message: String,
    },

    /// The module does not export an entry point its resources name.
    #[error("missing entry point {0}")]
    MissingEntryPoint(String),

    /// The module targets an architecture this process cannot load.
    #[error("module is built for {0} and cannot be loaded in this process")]
    WrongArchitecture(crate::arch::Architecture),
}

/// Signature of a filter entry point.
pub type PluginEntryFn =
    unsafe extern "C" fn(selector: i16, record: *mut c_void, data: *mut isize, result: *mut i16);

/// A loaded filter module with its resolved entry points.
///
/// The library stays loaded for as long as the module is alive; the entry
/// points are only valid during that time.
pub struct PluginModule {
    path: PathBuf,
    entry_points: HashMap<String, PluginEntryFn>,
    /// Kept alive, and dropped last.
    _library: Option<Library>,
}

impl PluginModule {
    /// Load the module of `descriptor` and resolve every entry point of the
    /// module, not just the descriptor's own.
    ///
    /// # Safety
    ///
    /// Loading a module runs its initialisers. The module must be trusted
    /// to follow the filter ABI.
    pub unsafe fn load(descriptor: &PluginDescriptor) -> Result<Self, LoadError> {
        if !descriptor.architecture().runs_in_process() {
            return Err(LoadError::WrongArchitecture(descriptor.architecture()));
        }
        let path = descriptor.path();

        // SAFETY: caller guarantees the module is trusted.
        let library = unsafe {
            Library::new(path).map_err(|e| LoadError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        let names: Vec<&str> = match descriptor.module_entry_points() {
            Some(all) => all.iter().map(String::as_str).collect(),
            None => vec![descriptor.entry_point()],
        };

        let mut entry_points = HashMap::with_capacity(names.len());
        for name in names {
            let mut symbol = name.as_bytes().to_vec();
            symbol.push(0);
            // SAFETY: the symbol is declared by the module's resources as a
            // filter entry point with this signature.
            let entry = unsafe {
                *library
                    .get::<PluginEntryFn>(&symbol)
                    .map_err(|_| LoadError::MissingEntryPoint(name.to_string()))?
            };
            entry_points.insert(name.to_string(), entry);
        }

        tracing::debug!(
            "loaded {} with {} entry points",
            path.display(),
            entry_points.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            entry_points,
            _library: Some(library),
        })
    }

    /// A module whose entry points are functions of this process.
    pub fn from_entry_points(
        path: impl Into<PathBuf>,
        entry_points: impl IntoIterator<Item = (String, PluginEntryFn)>,
    ) -> Self {
        Self {
            path: path.into(),
            entry_points: entry_points.into_iter().collect(),
            _library: None,
        }
    }

    /// Module file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the resolved entry points.
    pub fn entry_point_names(&self) -> impl Iterator<Item = &str> {
        self.entry_points.keys().map(String::as_str)
    }

    /// Call entry point `name` with `selector`.
    ///
    /// Returns the result code the filter wrote.
    ///
    /// # Safety
    ///
    /// `record` must point to a parameter block valid for `selector`, and a
    /// suite session must be active on this thread.
    pub unsafe fn call(
        &self,
        name: &str,
        selector: i16,
        record: *mut c_void,
        data: &mut isize,
    ) -> Result<i16, LoadError> {
        let entry = self
            .entry_points
            .get(name)
            .ok_or_else(|| LoadError::MissingEntryPoint(name.to_string()))?;
        let mut result: i16 = 0;
        // SAFETY: the caller upholds the parameter block and session
        // requirements; the library is alive as long as `self`.
        unsafe { entry(selector, record, data, &mut result) };
        Ok(result)
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModule")
            .field("path", &self.path)
            .field("entry_points", &self.entry_points.len())
            .field("native", &self._library.is_some())
            .finish()
    }
}
