//! Cancellation event shared with the worker.
//!
//! A 4-byte mapped file: the host stores 1 to request cancellation and the
//! worker polls it from a background thread, copying it into the abort
//! flag its filter reads through `TestAbort`.

use super::BridgeError;
use super::mapping::validate_name;
use crate::memory::MappedFile;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How often the watcher thread looks at the flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A named cancellation flag.
#[derive(Debug)]
pub struct CancelEvent {
    name: String,
    file: MappedFile,
}

impl CancelEvent {
    /// Create an unset event; the file is removed on drop.
    pub fn create(dir: &Path, name: &str) -> Result<Self, BridgeError> {
        validate_name(name)?;
        let file = MappedFile::create(dir.join(name), 4)?;
        Ok(Self {
            name: name.to_string(),
            file,
        })
    }

    /// Open an event created by the other process.
    pub fn open(dir: &Path, name: &str) -> Result<Self, BridgeError> {
        validate_name(name)?;
        let file = MappedFile::open(dir.join(name))?;
        let event = Self {
            name: name.to_string(),
            file,
        };
        event.word()?;
        Ok(event)
    }

    /// Event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn word(&self) -> Result<&AtomicU32, BridgeError> {
        self.file
            .atomic_u32(0)
            .ok_or_else(|| BridgeError::BadMapping(format!("{}: not an event", self.name)))
    }

    /// Request cancellation.
    pub fn set(&self) {
        if let Ok(word) = self.word() {
            word.store(1, Ordering::Release);
        }
    }

    /// Whether cancellation was requested.
    pub fn is_set(&self) -> bool {
        self.word().is_ok_and(|word| word.load(Ordering::Acquire) != 0)
    }

    /// Wait up to `timeout` for the event. Returns whether it is set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_set() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Spawn a thread that sets `abort` once the event fires. It exits on
    /// cancellation or when `stop` becomes true.
    pub fn spawn_watcher(
        self: Arc<Self>,
        abort: Arc<AtomicBool>,
        stop: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("filterbridge-cancel".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if self.wait(POLL_INTERVAL) {
                        tracing::debug!("cancellation requested");
                        abort.store(true, Ordering::Release);
                        return;
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_seen_by_other_handle() {
        let dir = tempfile::tempdir().unwrap();
        let host = CancelEvent::create(dir.path(), "fb-cancel").unwrap();
        let worker = CancelEvent::open(dir.path(), "fb-cancel").unwrap();

        assert!(!worker.is_set());
        assert!(!worker.wait(Duration::from_millis(30)));
        host.set();
        assert!(worker.is_set());
        assert!(worker.wait(Duration::ZERO));
    }

    #[test]
    fn test_watcher_flips_abort_flag() {
        let dir = tempfile::tempdir().unwrap();
        let host = CancelEvent::create(dir.path(), "fb-watch").unwrap();
        let worker = Arc::new(CancelEvent::open(dir.path(), "fb-watch").unwrap());

        let abort = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = worker.spawn_watcher(Arc::clone(&abort), stop).unwrap();
        host.set();
        handle.join().unwrap();
        assert!(abort.load(Ordering::Acquire));
    }

    #[test]
    fn test_watcher_stops_without_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let _host = CancelEvent::create(dir.path(), "fb-idle").unwrap();
        let worker = Arc::new(CancelEvent::open(dir.path(), "fb-idle").unwrap());

        let abort = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(true));
        worker.spawn_watcher(Arc::clone(&abort), stop).unwrap().join().unwrap();
        assert!(!abort.load(Ordering::Acquire));
    }
}
