//! Tracing spans and log setup.
//!
//! filterbridge emits spans for:
//! - Directory scans
//! - Filter invocations (in process or bridged)
//! - Bridge requests served by the host
//!
//! Only the worker binary installs a subscriber; embedders install their own.

mod tracing_support;

pub use tracing_support::{
    LOG_ENV, init_logging, instrument_invocation, span_bridge_request, span_invocation, span_scan,
    trace_progress, trace_selector,
};
