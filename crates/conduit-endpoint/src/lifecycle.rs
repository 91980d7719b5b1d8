//! Endpoint lifecycle management.
//!
//! Every endpoint is either stopped or running. Transitions happen under the
//! endpoint's own lock and redundant calls are no-ops.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use conduit_core::MessagingResult;

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

#[derive(Debug, Default)]
struct LifecycleState {
    running: bool,
    initialized: bool,
}

/// Running flag and lock shared by every endpoint.
#[derive(Debug)]
pub struct EndpointLifecycle {
    name: String,
    state: Mutex<LifecycleState>,
    auto_startup: AtomicBool,
}

impl EndpointLifecycle {
    /// Create a stopped lifecycle with auto-startup enabled.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(LifecycleState::default()),
            auto_startup: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Whether [`EndpointRegistry::start_all`](crate::EndpointRegistry::start_all)
    /// starts this endpoint.
    pub fn is_auto_startup(&self) -> bool {
        self.auto_startup.load(Ordering::SeqCst)
    }

    pub fn set_auto_startup(&self, auto_startup: bool) {
        self.auto_startup.store(auto_startup, Ordering::SeqCst);
    }

    /// Run `init` once, then `start`, moving to running.
    ///
    /// A failing `init` is retried on the next call. A failing `start` leaves
    /// the endpoint stopped.
    pub fn start<I, S>(&self, init: I, start: S) -> MessagingResult<()>
    where
        I: FnOnce() -> MessagingResult<()>,
        S: FnOnce() -> MessagingResult<()>,
    {
        let mut state = self.state.lock();
        if state.running {
            return Ok(());
        }
        if !state.initialized {
            init()?;
            state.initialized = true;
        }
        if let Err(e) = start() {
            warn!(endpoint = %self.name, error = %e, "Endpoint failed to start");
            return Err(e);
        }
        state.running = true;
        info!(endpoint = %self.name, "Endpoint started");
        Ok(())
    }

    /// Run `stop`, moving to stopped.
    pub fn stop<S>(&self, stop: S)
    where
        S: FnOnce(),
    {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }
        stop();
        state.running = false;
        info!(endpoint = %self.name, "Endpoint stopped");
    }
}

/// A messaging endpoint with a stopped/running lifecycle.
///
/// Implementors provide the hooks; `start`, `stop` and `is_running` are
/// provided. Hooks run under the lifecycle lock and must not call back into
/// the lifecycle.
pub trait Endpoint: Send + Sync {
    fn lifecycle(&self) -> &EndpointLifecycle;

    /// One-time validation before the first start.
    fn on_init(&self) -> MessagingResult<()> {
        Ok(())
    }

    fn do_start(&self) -> MessagingResult<()>;

    fn do_stop(&self);

    fn name(&self) -> &str {
        self.lifecycle().name()
    }

    fn start(&self) -> MessagingResult<()> {
        self.lifecycle().start(|| self.on_init(), || self.do_start())
    }

    fn stop(&self) {
        self.lifecycle().stop(|| self.do_stop());
    }

    fn is_running(&self) -> bool {
        self.lifecycle().is_running()
    }
}
