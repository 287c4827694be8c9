//! `PSUIHooksSuite1` and the abort/progress callbacks of the parameter block.

use super::error::{SuiteError, codes};
use super::ffi::{to_bool, write_out};
use super::session::{guard, guard_value};
use super::zstring::ZString;
use std::ffi::c_void;
use std::sync::atomic::Ordering;

/// `PSUIHooksSuite1`.
#[repr(C)]
pub struct PSUIHooksSuite1 {
    /// `ProcessEvent(event)`.
    pub process_event: unsafe extern "C" fn(event: *mut c_void),
    /// `DisplayPixels(source, srcRect, dstRow, dstCol, platformContext)`.
    pub display_pixels:
        unsafe extern "C" fn(*const c_void, *const c_void, i32, i32, *mut c_void) -> i16,
    /// `ProgressBar(done, total)`.
    pub progress_bar: unsafe extern "C" fn(done: i32, total: i32),
    /// `TestAbort()`.
    pub test_abort: unsafe extern "C" fn() -> u8,
    /// `MainAppWindow()`.
    pub main_app_window: unsafe extern "C" fn() -> isize,
    /// `SetCursor(cursor)`.
    pub set_cursor: unsafe extern "C" fn(cursor: *mut c_void) -> i32,
    /// `TickCount()`.
    pub tick_count: unsafe extern "C" fn() -> u32,
    /// `GetPluginName(plugin, &name)`.
    pub get_plugin_name: unsafe extern "C" fn(plugin: *mut c_void, name: *mut ZString) -> i32,
}

/// The UI hooks suite table.
pub static UI_HOOKS_SUITE: PSUIHooksSuite1 = PSUIHooksSuite1 {
    process_event,
    display_pixels,
    progress_bar: progress_proc,
    test_abort: abort_proc,
    main_app_window,
    set_cursor,
    tick_count,
    get_plugin_name,
};

/// Rate of the clock legacy filters expect behind `TickCount`.
pub const TICKS_PER_SECOND: u32 = 60;

/// The fixed value `TickCount` reports: one second of a 60 Hz clock.
pub const TICK_COUNT: u32 = TICKS_PER_SECOND;

unsafe extern "C" fn process_event(_event: *mut c_void) {}

unsafe extern "C" fn display_pixels(
    _source: *const c_void,
    _rect: *const c_void,
    _row: i32,
    _col: i32,
    _context: *mut c_void,
) -> i16 {
    tracing::debug!("DisplayPixels is not supported");
    codes::HOST_INSUFFICIENT as i16
}

/// `ProgressProc`: forwards to the session's progress sink.
pub unsafe extern "C" fn progress_proc(done: i32, total: i32) {
    guard_value("ProgressBar", (), |session| {
        crate::observability::trace_progress(done, total);
        if let Some(sink) = &session.progress {
            sink.report(done, total);
        }
        Ok(())
    })
}

/// `TestAbortProc`: reads the session's abort flag.
pub unsafe extern "C" fn abort_proc() -> u8 {
    guard_value("TestAbort", 0, |session| {
        Ok(to_bool(session.abort.load(Ordering::Acquire)))
    })
}

unsafe extern "C" fn main_app_window() -> isize {
    guard_value("MainAppWindow", 0, |session| Ok(session.parent_window))
}

unsafe extern "C" fn set_cursor(_cursor: *mut c_void) -> i32 {
    codes::NO_ERROR
}

unsafe extern "C" fn tick_count() -> u32 {
    TICK_COUNT
}

unsafe extern "C" fn get_plugin_name(_plugin: *mut c_void, name: *mut ZString) -> i32 {
    guard("GetPluginName", |session| {
        if name.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let zstring = session.zstrings.make(session.plugin_name.clone());
        // SAFETY: checked non-null above.
        unsafe { write_out(name, zstring) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suites::{SuiteConfig, SuiteSession};
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_hooks_read_the_session() {
        let abort = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let session = SuiteSession::new(&SuiteConfig::default())
            .with_plugin_name("Twirl")
            .with_parent_window(0x42)
            .with_abort_flag(Arc::clone(&abort))
            .with_progress(move |done, total| sink.lock().unwrap().push((done, total)));
        let active = session.activate().unwrap();

        unsafe {
            assert_eq!((UI_HOOKS_SUITE.main_app_window)(), 0x42);
            assert_eq!((UI_HOOKS_SUITE.test_abort)(), 0);
            abort.store(true, Ordering::Release);
            assert_eq!(abort_proc(), 1);

            progress_proc(3, 10);
            (UI_HOOKS_SUITE.progress_bar)(10, 10);

            let mut name: ZString = std::ptr::null_mut();
            assert_eq!((UI_HOOKS_SUITE.get_plugin_name)(std::ptr::null_mut(), &mut name), codes::NO_ERROR);
            let text = active.with(|s| s.zstrings.text(name).map(str::to_owned)).unwrap();
            assert_eq!(text.as_deref(), Ok("Twirl"));

            assert_eq!((UI_HOOKS_SUITE.set_cursor)(std::ptr::null_mut()), codes::NO_ERROR);
            assert_eq!(
                (UI_HOOKS_SUITE.display_pixels)(
                    std::ptr::null(),
                    std::ptr::null(),
                    0,
                    0,
                    std::ptr::null_mut()
                ),
                codes::HOST_INSUFFICIENT as i16
            );
        }
        assert_eq!(*seen.lock().unwrap(), vec![(3, 10), (10, 10)]);
    }

    #[test]
    fn test_tick_count_is_fixed() {
        let first = unsafe { (UI_HOOKS_SUITE.tick_count)() };
        std::thread::sleep(std::time::Duration::from_millis(50));
        let second = unsafe { (UI_HOOKS_SUITE.tick_count)() };
        assert_eq!(first, TICK_COUNT);
        assert_eq!(first, second);
    }

    #[test]
    fn test_without_session_defaults() {
        unsafe {
            assert_eq!(abort_proc(), 0);
            assert_eq!((UI_HOOKS_SUITE.main_app_window)(), 0);
        }
    }
}
