//! Tracing integration for structured logging and spans.

use std::path::Path;
use tracing::{Level, Span, span};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the worker's log filter directives.
pub const LOG_ENV: &str = "FILTERBRIDGE_LOG";

/// Create a span for a directory scan.
///
/// # Example
///
/// ```rust,ignore
/// use filterbridge::observability::span_scan;
///
/// let _guard = span_scan(dir).entered();
/// // Scanning here...
/// ```
#[inline]
pub fn span_scan(dir: &Path) -> Span {
    span!(Level::INFO, "scan", dir = %dir.display())
}

/// Create a span for one filter invocation.
#[inline]
pub fn span_invocation(title: &str, entry_point: &str, mode: &str) -> Span {
    span!(
        Level::INFO,
        "invocation",
        title = %title,
        entry_point = %entry_point,
        mode = %mode
    )
}

/// Enter a span for one filter invocation.
pub fn instrument_invocation(
    title: &str,
    entry_point: &str,
    mode: &str,
) -> tracing::span::EnteredSpan {
    span_invocation(title, entry_point, mode).entered()
}

/// Create a span for a request served by the bridge host.
#[inline]
pub fn span_bridge_request(command: &str) -> Span {
    span!(Level::DEBUG, "bridge_request", command = %command)
}

/// Log a selector call.
#[inline]
pub fn trace_selector(entry_point: &str, selector: i16, result: i16) {
    tracing::trace!(
        entry_point = %entry_point,
        selector = selector,
        result = result,
        "selector returned"
    );
}

/// Log filter progress.
#[inline]
pub fn trace_progress(done: i32, total: i32) {
    tracing::trace!(done = done, total = total, "progress");
}

/// Install a `tracing-subscriber` formatter filtered by [`LOG_ENV`].
///
/// Falls back to `default_directives` when the variable is unset or
/// invalid. Calling it twice is harmless.
pub fn init_logging(default_directives: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_creation() {
        // These should not panic
        let _span = span_scan(Path::new("/plugins"));
        let _span = span_invocation("Twirl", "TWIRL", "in-process");
        let _span = span_bridge_request("GetSourceImage");
    }

    #[test]
    fn test_instrumentation() {
        let _guard = instrument_invocation("Twirl", "TWIRL", "bridged");
        trace_selector("TWIRL", 3, 0);
        trace_progress(1, 10);
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging("warn");
        init_logging("debug");
    }
}
