use crate::error::Result;
use crate::state::{ConnectionState, LifecycleState};
use crate::statistics::StatisticsSnapshot;
use async_trait::async_trait;
use pulseone_model::{DataPoint, ProtocolKind, Quality};
use std::fmt;
use std::time::Duration;

/// A value a driver reads from or writes to the wire, before the
/// worker's engineering transform is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WireValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl WireValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            WireValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            WireValue::Int(i) => i as f64,
            WireValue::Float(f) => f,
        }
    }
}

/// One point's raw reading, as returned by [`Driver::read_values`]. Per
/// §4.1, a read batch must return one of these per requested point, in
/// request order, even when that point individually failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub point_id: i64,
    pub raw_value: f64,
    pub quality: Quality,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Result of a whole-batch [`Driver::read_values`] call. Per §4.1, the
/// driver attempts all requested points; only a transport-level outage
/// fails the call itself (`TransportDown`), in which case every point is
/// reported at `not_connected` quality by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Ok(Vec<RawReading>),
    TransportDown,
}

/// The uniform capability set every protocol driver implements (§4.1).
///
/// A driver instance is bound to exactly one device's endpoint and
/// protocol configuration; it knows nothing about scheduling, the
/// pipeline, or persistence. Object-safe so the [`crate::factory`]
/// module can hand out `Box<dyn Driver>`.
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    fn protocol(&self) -> ProtocolKind;

    async fn initialize(&self) -> Result<()>;
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    fn is_connected(&self) -> bool;

    /// Batched read with a per-call deadline. Values are returned in
    /// request order (§4.1 "Read semantics").
    async fn read_values(&self, points: &[DataPoint], timeout: Duration) -> Result<ReadOutcome>;

    /// Synchronous write; type conversion to the wire representation is
    /// the driver's concern (§4.1 "Write semantics").
    async fn write_value(
        &self,
        point: &DataPoint,
        value: WireValue,
        timeout: Duration,
    ) -> Result<()>;

    fn lifecycle_state(&self) -> LifecycleState;
    fn connection_state(&self) -> ConnectionState;
    fn last_error(&self) -> Option<crate::error::DriverError>;
    fn statistics(&self) -> StatisticsSnapshot;
    fn reset_statistics(&self);

    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}
