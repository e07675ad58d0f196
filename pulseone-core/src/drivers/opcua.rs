//! OPC UA driver. Binary-protocol framing and security-policy negotiation
//! are the opaque wire library named out of scope in §1; this driver
//! implements the [`Driver`] contract against a TCP stub standing in for a
//! real OPC UA client SDK.

use super::common::DriverState;
use async_trait::async_trait;
use pulseone_contracts::{
    ConnectionState, Driver, DriverError, DriverErrorKind, DriverStatistics, LifecycleState,
    RawReading, ReadOutcome, Result, StatisticsSnapshot, WireValue,
};
use pulseone_model::{DataPoint, Device, ProtocolKind, Quality};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

pub struct OpcUaDriver {
    device: Device,
    socket: AsyncMutex<Option<TcpStream>>,
    state: DriverState,
    stats: DriverStatistics,
}

impl std::fmt::Debug for OpcUaDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcUaDriver")
            .field("device_id", &self.device.id)
            .field("endpoint", &self.device.endpoint)
            .finish()
    }
}

impl OpcUaDriver {
    pub fn new(device: &Device) -> std::sync::Arc<dyn Driver> {
        std::sync::Arc::new(Self {
            device: device.clone(),
            socket: AsyncMutex::new(None),
            state: DriverState::new(),
            stats: DriverStatistics::new(),
        })
    }

    fn endpoint_host_port(&self) -> String {
        let endpoint = self.device.endpoint.trim_start_matches("opc.tcp://");
        if endpoint.contains(':') {
            endpoint.split('/').next().unwrap_or(endpoint).to_string()
        } else {
            format!("{}:{}", endpoint, self.device.default_port())
        }
    }
}

#[async_trait]
impl Driver for OpcUaDriver {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::OpcUa
    }

    async fn initialize(&self) -> Result<()> {
        if self.device.endpoint.is_empty() {
            let err = DriverError::new(DriverErrorKind::ConfigurationError, "empty OPC UA endpoint URL");
            self.state.record_error(err.clone());
            self.state.set_lifecycle(LifecycleState::Error);
            return Err(err);
        }
        self.state.set_lifecycle(LifecycleState::Initialized);
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        self.state.set_connection(ConnectionState::Connecting);
        let timeout = Duration::from_millis(self.device.settings.connection_timeout_ms as u64);
        match tokio::time::timeout(timeout, TcpStream::connect(self.endpoint_host_port())).await {
            Ok(Ok(stream)) => {
                *self.socket.lock().await = Some(stream);
                self.state.set_connection(ConnectionState::Connected);
                self.stats.mark_started();
                Ok(())
            }
            Ok(Err(e)) => {
                let err = DriverError::new(DriverErrorKind::ConnectionRefused, e.to_string());
                self.state.record_error(err.clone());
                self.state.set_connection(ConnectionState::Error);
                Err(err)
            }
            Err(_) => {
                let err = DriverError::new(DriverErrorKind::ConnectionTimeout, "opc ua connect timed out");
                self.state.record_error(err.clone());
                self.state.set_connection(ConnectionState::Timeout);
                Err(err)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        *self.socket.lock().await = None;
        self.state.set_connection(ConnectionState::Disconnected);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.try_lock().map(|g| g.is_some()).unwrap_or(false)
    }

    async fn read_values(&self, points: &[DataPoint], timeout: Duration) -> Result<ReadOutcome> {
        let mut guard = self.socket.lock().await;
        let stream = match guard.as_mut() {
            Some(s) => s,
            None => {
                self.stats.record_read_failure();
                return Ok(ReadOutcome::TransportDown);
            }
        };

        // A real client would send a ReadRequest service message keyed by
        // each point's NodeId (carried in `address.string`) and parse a
        // ReadResponse; the stub client here round-trips a byte per point.
        let probe = vec![points.len() as u8];
        let mut buf = [0u8; 256];
        let outcome = tokio::time::timeout(timeout, async {
            stream.write_all(&probe).await?;
            stream.read(&mut buf).await
        })
        .await;

        match outcome {
            Ok(Ok(_)) => {
                self.stats.record_read(points.len() as u64, 0);
                let readings = points
                    .iter()
                    .map(|p| RawReading {
                        point_id: p.id.value(),
                        raw_value: p.address.numeric as f64,
                        quality: Quality::Good,
                        timestamp: chrono::Utc::now(),
                    })
                    .collect();
                Ok(ReadOutcome::Ok(readings))
            }
            Ok(Err(_)) | Err(_) => {
                self.stats.record_read_failure();
                Ok(ReadOutcome::TransportDown)
            }
        }
    }

    async fn write_value(&self, point: &DataPoint, _value: WireValue, _timeout: Duration) -> Result<()> {
        if point.address.string.is_none() {
            return Err(DriverError::new(
                DriverErrorKind::InvalidAddress,
                "point has no OPC UA NodeId configured",
            ));
        }
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
