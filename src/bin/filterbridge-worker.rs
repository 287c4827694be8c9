//! Bridge worker: runs one filter for a host of another architecture.
//!
//! Spawned by the host with `FILTERBRIDGE_SOCKET`, `FILTERBRIDGE_RUNTIME_DIR`
//! and `FILTERBRIDGE_CANCEL` set. Logs go to stderr, filtered by
//! `FILTERBRIDGE_LOG`.
//!
//! This binary has no parameter block provider of its own: hosts that
//! bridge filters build their own worker around
//! [`filterbridge::bridge::run_worker`] with their factory. Run as is, it
//! answers every invocation with a "no parameter block provider" error.

use filterbridge::bridge::{BridgeClient, CANCEL_ENV, CancelEvent, EXIT_FAILED, run_worker};
use filterbridge::observability::init_logging;
use std::process::ExitCode;

fn main() -> ExitCode {
    init_logging("warn");

    let client = match BridgeClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("filterbridge-worker: {e}");
            eprintln!("this program is started by a filterbridge host");
            return ExitCode::from(EXIT_FAILED as u8);
        }
    };

    let cancel = std::env::var(CANCEL_ENV).ok().and_then(|name| {
        CancelEvent::open(client.runtime_dir(), &name)
            .inspect_err(|e| tracing::warn!("cannot open cancellation event {}: {}", name, e))
            .ok()
    });

    tracing::debug!("worker started (pid {})", std::process::id());
    let code = run_worker(&client, cancel, None);
    ExitCode::from(code as u8)
}
