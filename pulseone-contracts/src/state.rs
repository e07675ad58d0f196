//! The two state machines a driver exposes (§4.1 "Lifecycle state
//! machine" / "Connection state"). They are orthogonal: a driver can be
//! `Running` while its connection cycles through reconnect attempts.

/// Lifecycle state machine. Only `Error` and `Crashed` are unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Initialized,
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
    Crashed,
}

impl LifecycleState {
    pub fn is_healthy(&self) -> bool {
        !matches!(self, LifecycleState::Error | LifecycleState::Crashed)
    }

    /// `Start` is valid only from `Initialized` or `Stopped` (§4.1).
    pub fn can_start(&self) -> bool {
        matches!(self, LifecycleState::Initialized | LifecycleState::Stopped)
    }

    /// `Stop` is valid from any live state and is idempotent (§4.1).
    pub fn can_stop(&self) -> bool {
        !matches!(self, LifecycleState::Stopped)
    }
}

/// Connection state machine, orthogonal to [`LifecycleState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
    Timeout,
    Unauthorized,
    Maintenance,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_valid_only_from_initialized_or_stopped() {
        assert!(LifecycleState::Initialized.can_start());
        assert!(LifecycleState::Stopped.can_start());
        assert!(!LifecycleState::Running.can_start());
        assert!(!LifecycleState::Uninitialized.can_start());
    }

    #[test]
    fn stop_is_idempotent_on_already_stopped() {
        assert!(!LifecycleState::Stopped.can_stop());
        assert!(LifecycleState::Running.can_stop());
    }

    #[test]
    fn only_error_and_crashed_are_unhealthy() {
        assert!(!LifecycleState::Error.is_healthy());
        assert!(!LifecycleState::Crashed.is_healthy());
        assert!(LifecycleState::Paused.is_healthy());
    }
}
