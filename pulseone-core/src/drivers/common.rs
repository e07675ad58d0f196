use pulseone_contracts::{ConnectionState, DriverError, LifecycleState};
use std::sync::Mutex;

/// Shared lifecycle/connection/last-error bookkeeping every driver
/// implementation embeds, since [`pulseone_contracts::Driver`] methods take
/// `&self` (§4.1: a driver instance, not a driver task, owns these).
#[derive(Debug, Default)]
pub struct DriverState {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    lifecycle: Option<LifecycleState>,
    connection: Option<ConnectionState>,
    last_error: Option<DriverError>,
}

impl DriverState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                lifecycle: Some(LifecycleState::Uninitialized),
                connection: Some(ConnectionState::Disconnected),
                last_error: None,
            }),
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.inner.lock().unwrap().lifecycle.unwrap()
    }

    pub fn set_lifecycle(&self, state: LifecycleState) {
        self.inner.lock().unwrap().lifecycle = Some(state);
    }

    pub fn connection(&self) -> ConnectionState {
        self.inner.lock().unwrap().connection.unwrap()
    }

    /// Records the transition and returns the previous state, so callers
    /// can fire a status callback with (old, new) per §4.1.
    pub fn set_connection(&self, state: ConnectionState) -> ConnectionState {
        let mut guard = self.inner.lock().unwrap();
        let old = guard.connection.unwrap();
        guard.connection = Some(state);
        old
    }

    pub fn last_error(&self) -> Option<DriverError> {
        self.inner.lock().unwrap().last_error.clone()
    }

    pub fn record_error(&self, error: DriverError) {
        self.inner.lock().unwrap().last_error = Some(error);
    }
}
