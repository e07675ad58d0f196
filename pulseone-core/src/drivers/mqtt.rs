//! MQTT driver: points are subscribed topics rather than addressable
//! registers, so `read_values` serves the most recent retained message per
//! topic instead of issuing a wire round-trip (§9 supplement — MQTT has no
//! native "read" verb).

use super::common::DriverState;
use async_trait::async_trait;
use dashmap::DashMap;
use pulseone_contracts::{
    ConnectionState, Driver, DriverError, DriverErrorKind, DriverStatistics, LifecycleState,
    RawReading, ReadOutcome, Result, StatisticsSnapshot, WireValue,
};
use pulseone_model::{DataPoint, Device, ProtocolKind, Quality};
use std::time::Duration;

/// One retained value per subscribed topic, keyed by the point's string
/// address (the MQTT topic). A real client would populate this from its
/// message callback; here the broker client itself is the opaque wire
/// library named out of scope in §1.
pub struct MqttDriver {
    device: Device,
    state: DriverState,
    stats: DriverStatistics,
    retained: DashMap<String, (f64, chrono::DateTime<chrono::Utc>)>,
}

impl std::fmt::Debug for MqttDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttDriver")
            .field("device_id", &self.device.id)
            .field("subscribed_topics", &self.retained.len())
            .finish()
    }
}

impl MqttDriver {
    pub fn new(device: &Device) -> std::sync::Arc<dyn Driver> {
        std::sync::Arc::new(Self {
            device: device.clone(),
            state: DriverState::new(),
            stats: DriverStatistics::new(),
            retained: DashMap::new(),
        })
    }

    /// Invoked by the broker client's message callback (not part of the
    /// [`Driver`] contract; MQTT-specific ingestion path).
    pub fn on_message(&self, topic: &str, value: f64) {
        self.retained.insert(topic.to_string(), (value, chrono::Utc::now()));
    }
}

#[async_trait]
impl Driver for MqttDriver {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Mqtt
    }

    async fn initialize(&self) -> Result<()> {
        self.state.set_lifecycle(LifecycleState::Initialized);
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        self.state.set_connection(ConnectionState::Connected);
        self.stats.mark_started();
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.set_connection(ConnectionState::Disconnected);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connection().is_connected()
    }

    async fn read_values(&self, points: &[DataPoint], _timeout: Duration) -> Result<ReadOutcome> {
        if !self.is_connected() {
            self.stats.record_read_failure();
            return Ok(ReadOutcome::TransportDown);
        }
        let readings = points
            .iter()
            .map(|p| {
                let topic = p.address.string.clone().unwrap_or_default();
                match self.retained.get(&topic) {
                    Some(entry) => RawReading {
                        point_id: p.id.value(),
                        raw_value: entry.0,
                        quality: Quality::Good,
                        timestamp: entry.1,
                    },
                    None => RawReading {
                        point_id: p.id.value(),
                        raw_value: 0.0,
                        quality: Quality::Uncertain,
                        timestamp: chrono::Utc::now(),
                    },
                }
            })
            .collect();
        self.stats.record_read(points.len() as u64, 0);
        Ok(ReadOutcome::Ok(readings))
    }

    async fn write_value(&self, point: &DataPoint, value: WireValue, _timeout: Duration) -> Result<()> {
        let topic = point.address.string.clone().ok_or_else(|| {
            DriverError::new(DriverErrorKind::InvalidAddress, "point has no MQTT topic configured")
        })?;
        self.retained.insert(topic, (value.as_f64(), chrono::Utc::now()));
        self.stats.record_write(0);
        Ok(())
    }

    fn lifecycle_state(&self) -> LifecycleState {
        self.state.lifecycle()
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.connection()
    }

    fn last_error(&self) -> Option<DriverError> {
        self.state.last_error()
    }

    fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }

    async fn start(&self) -> Result<()> {
        self.state.set_lifecycle(LifecycleState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _ = self.disconnect().await;
        self.state.set_lifecycle(LifecycleState::Stopped);
        Ok(())
    }
}
