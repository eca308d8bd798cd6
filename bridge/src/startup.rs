//! Library startup gate.
//!
//! Every public library operation first waits for the native library to be
//! started. The startup call is made once, by whichever operation arrives
//! first; concurrent callers await the same shared future.

use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::native::{NativeBridge, NativeError};
use crate::{Error, Result};

type StartupFuture = Shared<BoxFuture<'static, std::result::Result<(), NativeError>>>;

enum StartupState {
    NotStarted,
    Starting(StartupFuture),
    Ready,
}

/// One-time startup state machine: `NotStarted -> Starting -> Ready`.
///
/// A failed startup returns the gate to `NotStarted` so the next operation
/// retries it.
pub struct StartupGate {
    state: Mutex<StartupState>,
    native: Arc<dyn NativeBridge>,
    clear_cache: bool,
}

impl StartupGate {
    pub fn new(native: Arc<dyn NativeBridge>, clear_cache: bool) -> Self {
        Self {
            state: Mutex::new(StartupState::NotStarted),
            native,
            clear_cache,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), StartupState::Ready)
    }

    /// Wait until the library has started, starting it if needed.
    pub async fn ensure_started(&self) -> Result<()> {
        let startup = {
            let mut state = self.state.lock();
            match &*state {
                StartupState::Ready => return Ok(()),
                StartupState::Starting(startup) => startup.clone(),
                StartupState::NotStarted => {
                    tracing::info!(clear_cache = self.clear_cache, "Starting photo library");
                    let native = Arc::clone(&self.native);
                    let clear_cache = self.clear_cache;
                    let startup = async move { native.library_startup(clear_cache).await }
                        .boxed()
                        .shared();
                    *state = StartupState::Starting(startup.clone());
                    startup
                }
            }
        };

        let result = startup.clone().await;

        let mut state = self.state.lock();
        // Only the attempt we awaited may move the state machine.
        if let StartupState::Starting(current) = &*state {
            if current.ptr_eq(&startup) {
                *state = match &result {
                    Ok(()) => StartupState::Ready,
                    Err(_) => StartupState::NotStarted,
                };
            }
        }

        result.map_err(|e| {
            tracing::error!(error = %e, "Photo library startup failed");
            Error::Startup(e)
        })
    }
}
