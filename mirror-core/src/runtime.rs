//! Process-wide worker runtime.
//!
//! Every sender, receiver, and session demultiplexer runs on one shared
//! multi-thread Tokio runtime. [`startup`] must be called before any
//! other entry point and [`shutdown`] once, after the last stream is
//! gone. Nothing runs implicitly at load time.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::info;

use crate::error::MirrorError;

/// How long [`shutdown`] waits for workers to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

static RUNTIME: Mutex<Option<Runtime>> = Mutex::new(None);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Worker thread count. Defaults to the number of CPU cores.
    pub worker_threads: Option<usize>,
}

fn slot() -> MutexGuard<'static, Option<Runtime>> {
    RUNTIME.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Start the runtime with default options. Idempotent.
pub fn startup() -> Result<(), MirrorError> {
    startup_with(RuntimeOptions::default())
}

/// Start the runtime. A second call while running is a no-op and
/// ignores `options`.
pub fn startup_with(options: RuntimeOptions) -> Result<(), MirrorError> {
    let mut slot = slot();
    if slot.is_some() {
        return Ok(());
    }

    let mut builder = Builder::new_multi_thread();
    builder.enable_all().thread_name("mirror-worker");
    if let Some(threads) = options.worker_threads {
        builder.worker_threads(threads.max(1));
    }

    *slot = Some(builder.build()?);
    info!("mirror runtime started");
    Ok(())
}

/// Stop the runtime. Streams still alive are cancelled without their
/// worker running again. Must not be called from a worker thread.
pub fn shutdown() {
    let runtime = slot().take();
    if let Some(runtime) = runtime {
        runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        info!("mirror runtime stopped");
    }
}

pub fn is_started() -> bool {
    slot().is_some()
}

/// Handle to the running runtime, or [`MirrorError::NotStarted`].
pub(crate) fn handle() -> Result<Handle, MirrorError> {
    slot()
        .as_ref()
        .map(|runtime| runtime.handle().clone())
        .ok_or(MirrorError::NotStarted)
}
