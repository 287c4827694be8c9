//! The per-thread suite session.
//!
//! Plugins call suite entries with no context argument, so the state those
//! entries operate on is installed in a thread-local slot for the duration
//! of an invocation. All calls from one plugin happen on the thread that
//! invoked it.

use super::action::ActionStore;
use super::blocks::BlockTable;
use super::descriptor_registry::DescriptorRegistry;
use super::error::{SuiteError, codes};
use super::handle::HandleTable;
use super::registry::SuiteId;
use super::zstring::ZStringTable;
use super::{NativeCallbacks, SuiteConfig};
use crate::host::ProgressSink;
use crate::plugin::AeteData;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

thread_local! {
    static SESSION: RefCell<Option<SuiteSession>> = const { RefCell::new(None) };
}

static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(0x1000);

/// A fresh opaque token for descriptors, lists, references and strings.
pub(crate) fn next_token() -> usize {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// State behind every suite entry for one plugin invocation.
pub struct SuiteSession {
    pub(crate) plugin_name: String,
    pub(crate) aete: Option<AeteData>,
    pub(crate) parent_window: isize,
    pub(crate) abort: Arc<AtomicBool>,
    pub(crate) progress: Option<Box<dyn ProgressSink>>,
    pub(crate) blocks: BlockTable,
    pub(crate) buffers: BlockTable,
    pub(crate) handles: HandleTable,
    pub(crate) registry: DescriptorRegistry,
    pub(crate) actions: ActionStore,
    pub(crate) zstrings: ZStringTable,
    acquired: HashMap<SuiteId, u32>,
    created: Vec<SuiteId>,
}

impl SuiteSession {
    /// A session with an empty descriptor registry.
    pub fn new(config: &SuiteConfig) -> Self {
        Self {
            plugin_name: String::new(),
            aete: None,
            parent_window: 0,
            abort: Arc::new(AtomicBool::new(false)),
            progress: None,
            blocks: BlockTable::new(None),
            buffers: BlockTable::new(config.buffer_limit),
            handles: HandleTable::default(),
            registry: DescriptorRegistry::new(),
            actions: ActionStore::default(),
            zstrings: ZStringTable::default(),
            acquired: HashMap::new(),
            created: Vec::new(),
        }
    }

    /// Set the title reported by `GetPluginName`.
    pub fn with_plugin_name(mut self, name: impl Into<String>) -> Self {
        self.plugin_name = name.into();
        self
    }

    /// Scripting parameter flags of the plugin.
    pub fn with_terminology(mut self, aete: Option<AeteData>) -> Self {
        self.aete = aete;
        self
    }

    /// Window handle reported by `MainAppWindow`.
    pub fn with_parent_window(mut self, window: isize) -> Self {
        self.parent_window = window;
        self
    }

    /// Share an abort flag, typically set from another thread.
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Receive progress reports.
    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Some(Box::new(sink));
        self
    }

    /// Continue from an existing descriptor registry.
    pub fn with_registry(mut self, registry: DescriptorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The abort flag consulted by `TestAbort`.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// The descriptor registry.
    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    /// Take the descriptor registry, ending the session.
    pub fn into_registry(self) -> DescriptorRegistry {
        self.registry
    }

    /// Suites created so far, in creation order.
    pub fn created_suites(&self) -> &[SuiteId] {
        &self.created
    }

    /// Hand out the table for `(name, version)`, creating its dependencies
    /// first.
    pub fn acquire(&mut self, name: &str, version: i32) -> Result<*const c_void, SuiteError> {
        let id = SuiteId::resolve(name, version)?;
        for dependency in id.dependencies() {
            self.create(*dependency);
        }
        self.create(id);
        *self.acquired.entry(id).or_default() += 1;
        Ok(id.table())
    }

    /// Balance an earlier [`acquire`](Self::acquire).
    pub fn release(&mut self, name: &str, version: i32) -> Result<(), SuiteError> {
        let id = SuiteId::resolve(name, version)?;
        match self.acquired.get_mut(&id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Ok(())
            }
            _ => Err(SuiteError::BadParameter("suite was not acquired")),
        }
    }

    fn create(&mut self, id: SuiteId) {
        if !self.created.contains(&id) {
            tracing::trace!("creating suite {}", id);
            self.actions.construct(id);
            self.created.push(id);
        }
    }

    /// Install this session on the current thread.
    pub fn activate(self) -> Result<ActiveSession, SuiteError> {
        SESSION.with(|slot| {
            let mut slot = slot
                .try_borrow_mut()
                .map_err(|_| SuiteError::SessionActive)?;
            if slot.is_some() {
                return Err(SuiteError::SessionActive);
            }
            *slot = Some(self);
            Ok(ActiveSession {
                _thread_bound: PhantomData,
            })
        })
    }
}

impl fmt::Debug for SuiteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteSession")
            .field("plugin_name", &self.plugin_name)
            .field("handles", &self.handles.len())
            .field("buffers", &self.buffers.len())
            .field("registry", &self.registry.len())
            .field("actions", &self.actions.len())
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

/// Guard for the session installed on this thread.
///
/// Dropping it removes and drops the session; [`finish`](Self::finish)
/// removes and returns it.
#[derive(Debug)]
pub struct ActiveSession {
    _thread_bound: PhantomData<*const ()>,
}

impl ActiveSession {
    /// Pointers to place in the plugin's parameter block.
    pub fn callbacks(&self) -> NativeCallbacks {
        NativeCallbacks::new()
    }

    /// Run `f` against the installed session.
    pub fn with<R>(&self, f: impl FnOnce(&mut SuiteSession) -> R) -> Result<R, SuiteError> {
        with_session(|session| Ok(f(session)))
    }

    /// Uninstall the session and return it.
    pub fn finish(self) -> Result<SuiteSession, SuiteError> {
        SESSION.with(|slot| {
            slot.try_borrow_mut()
                .map_err(|_| SuiteError::SessionActive)?
                .take()
                .ok_or(SuiteError::NoSession)
        })
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        let session = SESSION.with(|slot| slot.try_borrow_mut().ok().and_then(|mut s| s.take()));
        drop(session);
    }
}

/// Run `f` against this thread's session.
pub(crate) fn with_session<R>(
    f: impl FnOnce(&mut SuiteSession) -> Result<R, SuiteError>,
) -> Result<R, SuiteError> {
    SESSION.with(|slot| {
        let mut slot = slot
            .try_borrow_mut()
            .map_err(|_| SuiteError::BadParameter("re-entrant suite call"))?;
        let session = slot.as_mut().ok_or(SuiteError::NoSession)?;
        f(session)
    })
}

fn run<R>(
    entry: &'static str,
    f: impl FnOnce(&mut SuiteSession) -> Result<R, SuiteError>,
) -> Result<R, SuiteError> {
    match catch_unwind(AssertUnwindSafe(|| with_session(f))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::debug!("{}: {}", entry, e);
            Err(e)
        }
        Err(_) => {
            tracing::error!("{}: panicked", entry);
            Err(SuiteError::BadParameter("panic in suite entry"))
        }
    }
}

/// Entry returning an `SPErr`.
pub(crate) fn guard(
    entry: &'static str,
    f: impl FnOnce(&mut SuiteSession) -> Result<(), SuiteError>,
) -> i32 {
    match run(entry, f) {
        Ok(()) => codes::NO_ERROR,
        Err(e) => e.code(),
    }
}

/// Entry returning an `OSErr`.
pub(crate) fn guard_os(
    entry: &'static str,
    f: impl FnOnce(&mut SuiteSession) -> Result<(), SuiteError>,
) -> i16 {
    match run(entry, f) {
        Ok(()) => 0,
        Err(e) => e.os_err(),
    }
}

/// Entry returning a value, with `fallback` on any failure.
pub(crate) fn guard_value<T>(
    entry: &'static str,
    fallback: T,
    f: impl FnOnce(&mut SuiteSession) -> Result<T, SuiteError>,
) -> T {
    run(entry, f).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suites::registry::{ACTION_DESCRIPTOR_SUITE_NAME, BUFFER_SUITE_NAME};

    #[test]
    fn test_single_active_session() {
        let config = SuiteConfig::default();
        let active = SuiteSession::new(&config).activate().unwrap();
        assert_eq!(
            SuiteSession::new(&config).activate().err(),
            Some(SuiteError::SessionActive)
        );
        let session = active.finish().unwrap();
        assert!(session.created_suites().is_empty());
        assert_eq!(with_session(|_| Ok(())), Err(SuiteError::NoSession));
    }

    #[test]
    fn test_descriptor_suite_creates_dependencies_first() {
        let mut session = SuiteSession::new(&SuiteConfig::default());
        session.acquire(ACTION_DESCRIPTOR_SUITE_NAME, 2).unwrap();
        session.acquire(ACTION_DESCRIPTOR_SUITE_NAME, 2).unwrap();
        assert_eq!(
            session.created_suites(),
            &[SuiteId::ActionList, SuiteId::ActionReference, SuiteId::ActionDescriptor]
        );
        assert_eq!(
            session.actions.constructed(),
            &[SuiteId::ActionList, SuiteId::ActionReference, SuiteId::ActionDescriptor]
        );
        session.release(ACTION_DESCRIPTOR_SUITE_NAME, 2).unwrap();
        session.release(ACTION_DESCRIPTOR_SUITE_NAME, 2).unwrap();
        assert!(session.release(ACTION_DESCRIPTOR_SUITE_NAME, 2).is_err());
    }

    #[test]
    fn test_action_state_is_built_on_demand() {
        let mut session = SuiteSession::new(&SuiteConfig::default());
        assert!(session.actions.constructed().is_empty());
        session.acquire(BUFFER_SUITE_NAME, 1).unwrap();
        assert!(session.actions.constructed().is_empty());

        // A list handed out before any suite was acquired builds only its
        // own table.
        session.actions.insert_list(crate::suites::ActionList::new());
        assert_eq!(session.actions.constructed(), &[SuiteId::ActionList]);

        session.actions.insert_descriptor(crate::suites::ActionDescriptor::new());
        assert_eq!(
            session.actions.constructed(),
            &[SuiteId::ActionList, SuiteId::ActionReference, SuiteId::ActionDescriptor]
        );
        assert_eq!(session.actions.len(), 2);
    }

    #[test]
    fn test_unsupported_version_hands_out_nothing() {
        let mut session = SuiteSession::new(&SuiteConfig::default());
        assert!(matches!(
            session.acquire(BUFFER_SUITE_NAME, 2),
            Err(SuiteError::UnsupportedVersion { .. })
        ));
        assert!(session.created_suites().is_empty());
    }

    #[test]
    fn test_guard_maps_panics() {
        let _active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
        let code = guard("test", |_| panic!("boom"));
        assert_eq!(code, codes::BAD_PARAMETER);
        // The session survives the panic.
        assert_eq!(guard("test", |_| Ok(())), codes::NO_ERROR);
        assert_eq!(guard_value("test", 7, |_| Err(SuiteError::OutOfMemory)), 7);
    }
}
