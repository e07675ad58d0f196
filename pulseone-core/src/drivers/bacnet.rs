//! BACnet/IP driver. The BACnet APDU/NPDU encoding itself is the opaque
//! per-protocol wire library named out of scope in §1 — this driver
//! implements the [`Driver`] contract (lifecycle, batching, statistics,
//! errors) against a minimal UDP client stub standing in for it.

use super::common::DriverState;
use async_trait::async_trait;
use pulseone_contracts::{
    ConnectionState, Driver, DriverError, DriverErrorKind, DriverStatistics, LifecycleState,
    RawReading, ReadOutcome, Result, StatisticsSnapshot, WireValue,
};
use pulseone_model::{DataPoint, Device, ProtocolKind, Quality};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;

pub struct BacnetIpDriver {
    device: Device,
    socket: AsyncMutex<Option<UdpSocket>>,
    state: DriverState,
    stats: DriverStatistics,
}

impl std::fmt::Debug for BacnetIpDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacnetIpDriver")
            .field("device_id", &self.device.id)
            .finish()
    }
}

impl BacnetIpDriver {
    pub fn new(device: &Device) -> std::sync::Arc<dyn Driver> {
        std::sync::Arc::new(Self {
            device: device.clone(),
            socket: AsyncMutex::new(None),
            state: DriverState::new(),
            stats: DriverStatistics::new(),
        })
    }

    /// Builds a minimal Who-Is-style keepalive datagram; real property
    /// reads would encode ReadProperty APDUs here instead.
    fn keepalive_datagram(instance: u32) -> Vec<u8> {
        let mut datagram = vec![0x81, 0x0A, 0x00, 0x08];
        datagram.extend_from_slice(&instance.to_be_bytes());
        datagram
    }
}

#[async_trait]
impl Driver for BacnetIpDriver {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::BacnetIp
    }

    async fn initialize(&self) -> Result<()> {
        self.state.set_lifecycle(LifecycleState::Initialized);
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        self.state.set_connection(ConnectionState::Connecting);
        match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => {
                let addr = if self.device.endpoint.contains(':') {
                    self.device.endpoint.clone()
                } else {
                    format!("{}:{}", self.device.endpoint, self.device.default_port())
                };
                if socket.connect(&addr).await.is_err() {
                    let err = DriverError::new(DriverErrorKind::ConnectionRefused, "bacnet connect failed");
                    self.state.record_error(err.clone());
                    self.state.set_connection(ConnectionState::Error);
                    return Err(err);
                }
                *self.socket.lock().await = Some(socket);
                self.state.set_connection(ConnectionState::Connected);
                self.stats.mark_started();
                Ok(())
            }
            Err(e) => {
                let err = DriverError::new(DriverErrorKind::ConnectionFailed, e.to_string());
                self.state.record_error(err.clone());
                self.state.set_connection(ConnectionState::Error);
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
        let guard = self.socket.lock().await;
        let socket = match guard.as_ref() {
            Some(s) => s,
            None => {
                self.stats.record_read_failure();
                return Ok(ReadOutcome::TransportDown);
            }
        };

        let datagram = Self::keepalive_datagram(self.device.id.value() as u32);
        let mut buf = [0u8; 64];
        match tokio::time::timeout(timeout, async {
            socket.send(&datagram).await?;
            socket.recv(&mut buf).await
        })
        .await
        {
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

    async fn write_value(&self, _point: &DataPoint, _value: WireValue, _timeout: Duration) -> Result<()> {
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
