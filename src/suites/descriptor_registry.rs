//! `PSDescriptorRegistryProcs`: descriptors kept across invocations.
//!
//! A plugin registers its last-used settings under a key (usually its
//! class id) and reads them back the next time it runs. Persistent entries
//! can be written to disk; the rest live as long as the registry value.

use super::action::{ActionDescriptor, DescriptorToken, decode_descriptor, encode_descriptor};
use super::error::SuiteError;
use super::ffi::{c_str, from_bool, write_out};
use super::session::guard;
use std::collections::BTreeMap;
use std::ffi::c_char;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
struct RegistryItem {
    descriptor: ActionDescriptor,
    persistent: bool,
}

/// Registered descriptors by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorRegistry {
    items: BTreeMap<String, RegistryItem>,
}

/// Stored form of a [`DescriptorRegistry`].
#[derive(Debug, Clone, PartialEq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct RegistryRecord {
    /// Entries sorted by key.
    pub items: Vec<RegistryItemRecord>,
}

/// One entry of a [`RegistryRecord`].
#[derive(Debug, Clone, PartialEq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct RegistryItemRecord {
    /// Registry key.
    pub key: String,
    /// Whether the entry survives the host process.
    pub persistent: bool,
    /// Encoded descriptor.
    pub descriptor: Vec<u8>,
}

impl DescriptorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `descriptor` under `key`, replacing any entry.
    pub fn register(&mut self, key: impl Into<String>, descriptor: ActionDescriptor, persistent: bool) {
        self.items.insert(
            key.into(),
            RegistryItem {
                descriptor,
                persistent,
            },
        );
    }

    /// Remove `key`. Returns whether it was present.
    pub fn erase(&mut self, key: &str) -> bool {
        self.items.remove(key).is_some()
    }

    /// The descriptor under `key`.
    pub fn get(&self, key: &str) -> Option<&ActionDescriptor> {
        self.items.get(key).map(|item| &item.descriptor)
    }

    /// Whether the entry under `key` is persistent.
    pub fn is_persistent(&self, key: &str) -> Option<bool> {
        self.items.get(key).map(|item| item.persistent)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keep only persistent entries.
    pub fn retain_persistent(&mut self) {
        self.items.retain(|_, item| item.persistent);
    }

    /// Convert to the stored record.
    pub fn to_record(&self) -> RegistryRecord {
        RegistryRecord {
            items: self
                .items
                .iter()
                .map(|(key, item)| RegistryItemRecord {
                    key: key.clone(),
                    persistent: item.persistent,
                    descriptor: encode_descriptor(&item.descriptor),
                })
                .collect(),
        }
    }

    /// Rebuild from a stored record.
    pub fn from_record(record: RegistryRecord) -> Result<Self, SuiteError> {
        let mut registry = Self::new();
        for item in record.items {
            let descriptor = decode_descriptor(&item.descriptor)
                .map_err(|e| SuiteError::Storage(format!("entry {:?}: {}", item.key, e)))?;
            registry.register(item.key, descriptor, item.persistent);
        }
        Ok(registry)
    }

    /// Serialize every entry.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SuiteError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(&self.to_record())
            .map(|bytes| bytes.into_vec())
            .map_err(|e| SuiteError::Storage(e.to_string()))
    }

    /// Deserialize bytes produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SuiteError> {
        let mut aligned = rkyv::util::AlignedVec::<8>::new();
        aligned.extend_from_slice(bytes);
        let record = rkyv::from_bytes::<RegistryRecord, rkyv::rancor::Error>(&aligned)
            .map_err(|e| SuiteError::Storage(e.to_string()))?;
        Self::from_record(record)
    }

    /// Read persistent entries saved by [`save`](Self::save).
    ///
    /// A missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self, SuiteError> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let registry = Self::from_bytes(&bytes)?;
                tracing::debug!("loaded {} registry entries from {}", registry.len(), path.display());
                Ok(registry)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(SuiteError::Storage(format!("{}: {}", path.display(), e))),
        }
    }

    /// Write the persistent entries to `path`, replacing it atomically.
    pub fn save(&self, path: &Path) -> Result<(), SuiteError> {
        let mut persistent = self.clone();
        persistent.retain_persistent();
        let bytes = persistent.to_bytes()?;

        let storage = |e: std::io::Error| SuiteError::Storage(format!("{}: {}", path.display(), e));
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(storage)?;
        std::fs::rename(&tmp, path).map_err(storage)?;
        tracing::debug!("saved {} registry entries to {}", persistent.len(), path.display());
        Ok(())
    }
}

/// `PSDescriptorRegistryProcs`.
#[repr(C)]
pub struct PSDescriptorRegistryProcs {
    /// `Register(key, descriptor, isPersistent)`.
    pub register: unsafe extern "C" fn(*const c_char, DescriptorToken, u8) -> i32,
    /// `Erase(key)`.
    pub erase: unsafe extern "C" fn(*const c_char) -> i32,
    /// `Get(key, &descriptor)`; null when nothing is registered.
    pub get: unsafe extern "C" fn(*const c_char, *mut DescriptorToken) -> i32,
}

/// The descriptor registry suite table.
pub static DESCRIPTOR_REGISTRY_SUITE: PSDescriptorRegistryProcs = PSDescriptorRegistryProcs {
    register: registry_register,
    erase: registry_erase,
    get: registry_get,
};

/// Borrow a registry key; null is a missing parameter.
///
/// # Safety
///
/// A non-null `key` must be a NUL-terminated string.
unsafe fn key<'a>(key: *const c_char) -> Result<std::borrow::Cow<'a, str>, SuiteError> {
    if key.is_null() {
        return Err(SuiteError::MissingParameter);
    }
    // SAFETY: forwarded from the caller.
    Ok(unsafe { c_str(key) }?.to_string_lossy())
}

unsafe extern "C" fn registry_register(key_ptr: *const c_char, descriptor: DescriptorToken, persistent: u8) -> i32 {
    guard("Registry.Register", |session| {
        // SAFETY: plugin-supplied key string.
        let key = unsafe { key(key_ptr) }?;
        let descriptor = session.actions.descriptor(descriptor)?.clone();
        session.registry.register(key, descriptor, from_bool(persistent));
        Ok(())
    })
}

unsafe extern "C" fn registry_erase(key_ptr: *const c_char) -> i32 {
    guard("Registry.Erase", |session| {
        // SAFETY: plugin-supplied key string.
        let key = unsafe { key(key_ptr) }?;
        session.registry.erase(&key);
        Ok(())
    })
}

unsafe extern "C" fn registry_get(key_ptr: *const c_char, out: *mut DescriptorToken) -> i32 {
    guard("Registry.Get", |session| {
        // SAFETY: plugin-supplied key string.
        let key = unsafe { key(key_ptr) }?;
        let token = match session.registry.get(&key) {
            Some(descriptor) => {
                let mut descriptor = descriptor.clone();
                if let Some(aete) = &session.aete {
                    descriptor.apply_terminology(aete);
                }
                session.actions.insert_descriptor(descriptor)
            }
            None => std::ptr::null_mut(),
        };
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, token) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourcc::fourcc;
    use crate::suites::action::ActionValue;
    use crate::suites::error::codes;
    use crate::suites::{SuiteConfig, SuiteSession};

    fn settings(amount: i32) -> ActionDescriptor {
        let mut d = ActionDescriptor::new();
        d.put(fourcc(b"Amnt"), ActionValue::Integer(amount));
        d
    }

    #[test]
    fn test_save_keeps_only_persistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.bin");

        let mut registry = DescriptorRegistry::new();
        registry.register("blur", settings(3), true);
        registry.register("scratch", settings(9), false);
        registry.save(&path).unwrap();

        let loaded = DescriptorRegistry::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("blur"), Some(&settings(3)));
        assert_eq!(loaded.is_persistent("blur"), Some(true));
        assert!(loaded.get("scratch").is_none());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DescriptorRegistry::load(&dir.path().join("absent")).unwrap();
        assert!(registry.is_empty());
        std::fs::write(dir.path().join("junk"), b"not a registry").unwrap();
        assert!(DescriptorRegistry::load(&dir.path().join("junk")).is_err());
    }

    #[test]
    fn test_suite_register_and_get() {
        let active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
        unsafe {
            let token = active
                .with(|s| s.actions.insert_descriptor(settings(5)))
                .unwrap();
            let suite = &DESCRIPTOR_REGISTRY_SUITE;
            assert_eq!((suite.register)(c"blur".as_ptr(), token, 1), codes::NO_ERROR);

            let mut got: DescriptorToken = std::ptr::dangling_mut();
            assert_eq!((suite.get)(c"missing".as_ptr(), &mut got), codes::NO_ERROR);
            assert!(got.is_null());

            assert_eq!((suite.get)(c"blur".as_ptr(), &mut got), codes::NO_ERROR);
            assert!(!got.is_null());
            assert_ne!(got, token);

            assert_eq!((suite.register)(std::ptr::null(), token, 0), codes::MISSING_PARAMETER);
            assert_eq!((suite.erase)(c"blur".as_ptr()), codes::NO_ERROR);
        }
        let session = active.finish().unwrap();
        assert!(session.registry().is_empty());
    }
}
