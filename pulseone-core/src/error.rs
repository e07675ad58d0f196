use pulseone_contracts::DriverError;
use pulseone_model::ModelError;
use thiserror::Error;

/// Errors surfaced above the driver boundary: worker scheduling, pipeline
/// sinks, and the rule engine. Per §7, a lower layer never logs-and-rethrows
/// — it returns one of these and lets the caller decide.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("device {device_id} has no driver registered for protocol {protocol}")]
    NoDriverRegistered { device_id: i64, protocol: String },

    #[error("worker for device {device_id} is not running")]
    WorkerNotRunning { device_id: i64 },

    #[error("write to point {point_id} past its deadline")]
    DeadlineExceeded { point_id: i64 },

    #[error("virtual point {point_id} participates in a dependency cycle")]
    CyclicDependency { point_id: i64 },

    #[error("rule engine evaluation failed: {0}")]
    RuleEvaluation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
