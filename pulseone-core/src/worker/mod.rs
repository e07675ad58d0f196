//! Device Worker: the poll loop that turns one device's driver into a
//! stream of samples, plus its write queue and reconnect/backoff handling
//! (§4.2).

mod write_queue;

pub use write_queue::{WriteQueue, WriteRequest};

use crate::pipeline::Pipeline;
use chrono::Utc;
use dashmap::DashMap;
use pulseone_contracts::{Driver, ReadOutcome};
use pulseone_model::{DataPoint, Device, PointId, Quality, StorageType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One device's poll loop. Owns the only handle to its driver instance
/// (§5 "the Worker thread is the only thread touching its driver") and
/// its own write queue and deadband bookkeeping.
pub struct DeviceWorker {
    device: Device,
    driver: Arc<dyn Driver>,
    points: Vec<DataPoint>,
    pipeline: Arc<Pipeline>,
    write_queue: Arc<WriteQueue>,
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    last_saved: DashMap<PointId, (f64, chrono::DateTime<Utc>)>,
}

impl std::fmt::Debug for DeviceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWorker")
            .field("device_id", &self.device.id)
            .field("points", &self.points.len())
            .field("paused", &self.paused.load(Ordering::Relaxed))
            .finish()
    }
}

impl DeviceWorker {
    pub fn new(
        device: Device,
        driver: Arc<dyn Driver>,
        points: Vec<DataPoint>,
        pipeline: Arc<Pipeline>,
        write_queue: Arc<WriteQueue>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            device,
            driver,
            points,
            pipeline,
            write_queue,
            cancel,
            paused: Arc::new(AtomicBool::new(false)),
            last_saved: DashMap::new(),
        }
    }

    pub fn device_id(&self) -> pulseone_model::DeviceId {
        self.device.id
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn pause_flag(&self) -> Arc<AtomicBool> {
        self.paused.clone()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn write_queue(&self) -> &Arc<WriteQueue> {
        &self.write_queue
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// The main poll loop: initialize, connect, then alternate between
    /// draining pending writes and polling reads until cancelled.
    /// Isolation (§5): any error bubbling out of a single poll iteration
    /// is handled inline — this loop itself never returns `Err` so a
    /// crash here can't propagate past the supervising Registry task.
    pub async fn run(self: Arc<Self>) {
        if self.driver.initialize().await.is_err() {
            return;
        }
        if self.driver.connect().await.is_err() {
            self.reconnect_until_up().await;
        }

        let poll_interval = Duration::from_millis(self.device.settings.polling_interval_ms.max(1) as u64);

        loop {
            if self.cancel.is_cancelled() {
                let _ = self.driver.disconnect().await;
                return;
            }
            if self.paused.load(Ordering::Relaxed) {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        let _ = self.driver.disconnect().await;
                        return;
                    }
                    _ = tokio::time::sleep(poll_interval) => continue,
                }
            }

            self.drain_writes().await;

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = self.driver.disconnect().await;
                    return;
                }
                _ = tokio::time::sleep(poll_interval) => {
                    self.poll_once().await;
                }
            }
        }
    }

    async fn drain_writes(&self) {
        let write_timeout = Duration::from_millis(self.device.settings.write_timeout_ms as u64);
        while let Some(request) = self.write_queue.dequeue_ready() {
            let result = self
                .driver
                .write_value(&request.point, request.value, write_timeout)
                .await
                .map_err(crate::error::CoreError::from);
            if let Some(responder) = request.responder {
                let _ = responder.send(result);
            }
        }
    }

    async fn poll_once(&self) {
        if self.points.is_empty() {
            return;
        }
        let timeout = Duration::from_millis(self.device.settings.read_timeout_ms as u64);
        match self.driver.read_values(&self.points, timeout).await {
            Ok(ReadOutcome::Ok(readings)) => {
                for reading in readings {
                    let Some(point) = self.points.iter().find(|p| p.id.0 == reading.point_id) else {
                        continue;
                    };
                    let scaled = point.scale(reading.raw_value);
                    let quality = match scaled.clamp {
                        pulseone_model::Clamp::Over => Quality::Overrange,
                        pulseone_model::Clamp::Under => Quality::Underrange,
                        pulseone_model::Clamp::None => reading.quality,
                    };
                    let point_id = PointId::Data(point.id);
                    let sample = pulseone_contracts::Sample {
                        point: point_id,
                        value: scaled.value,
                        raw_value: reading.raw_value,
                        quality,
                        timestamp: reading.timestamp,
                        source_device: Some(self.device.id),
                    };

                    let emit = self.should_log(point, scaled.value, sample.timestamp);
                    self.pipeline.route(sample, storage_type_for(point), emit).await;
                }
            }
            Ok(ReadOutcome::TransportDown) => {
                self.mark_all_offline(Quality::NotConnected);
                self.reconnect_until_up().await;
            }
            Err(_) => {
                // Per-operation and configuration errors are already
                // reflected in the driver's own statistics/last_error;
                // the worker loop simply continues to the next cycle.
            }
        }
    }

    /// Log-deadband decision from §4.2 step 3 / §8 S1: a point logs if
    /// logging is enabled and either the logging interval has elapsed or
    /// the value moved by at least the configured deadband since the
    /// last logged value.
    fn should_log(&self, point: &DataPoint, value: f64, now: chrono::DateTime<Utc>) -> bool {
        if !point.log_enabled {
            return false;
        }
        let point_id = PointId::Data(point.id);
        let should = match self.last_saved.get(&point_id) {
            None => true,
            Some(entry) => {
                let (last_value, last_time) = *entry;
                let elapsed_ms = (now - last_time).num_milliseconds();
                elapsed_ms >= point.log_interval_ms as i64 || (value - last_value).abs() >= point.log_deadband
            }
        };
        if should {
            self.last_saved.insert(point_id, (value, now));
        }
        should
    }

    fn mark_all_offline(&self, quality: Quality) {
        let ids: Vec<PointId> = self.points.iter().map(|p| PointId::Data(p.id)).collect();
        self.pipeline.live_cache().mark_offline(&ids, quality);
    }

    /// Reconnect loop for §8 S3: `max_retry_count` attempts spaced by
    /// `retry_interval_ms`, then exponential backoff via
    /// `DeviceSettings::backoff_after`, capped at `max_backoff_time_ms`,
    /// until a connect succeeds or the worker is cancelled.
    async fn reconnect_until_up(&self) {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let wait_ms = if attempt < self.device.settings.max_retry_count {
                self.device.settings.retry_interval_ms
            } else {
                self.device.settings.backoff_after(attempt - self.device.settings.max_retry_count)
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(wait_ms as u64)) => {}
            }
            if self.driver.connect().await.is_ok() {
                return;
            }
            attempt += 1;
        }
    }
}

/// Derives a mirror storage-policy hint from the point's logging
/// configuration. `DataPoint` doesn't carry its own `StorageType` field —
/// that enum exists for the Cache/mirror layer, not the point's own
/// configuration — so on_change/periodic/immediate are inferred from
/// whether deadband filtering or a logging interval is configured.
fn storage_type_for(point: &DataPoint) -> StorageType {
    if !point.log_enabled {
        StorageType::Immediate
    } else if point.log_deadband > 0.0 {
        StorageType::OnChange
    } else if point.log_interval_ms > 0 {
        StorageType::Periodic
    } else {
        StorageType::Immediate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use crate::pipeline::HistorianBuffer;
    use pulseone_model::{AccessMode, DataPointId, DataType, DeviceId, Metadata, PointAddress, ProtocolKind, SiteId, Tags, TenantId};

    fn point() -> DataPoint {
        DataPoint {
            id: DataPointId(1),
            device_id: DeviceId(1),
            address: PointAddress { numeric: 0, string: None },
            data_type: DataType::Float32,
            access_mode: AccessMode::Read,
            scaling_factor: 1.0,
            scaling_offset: 0.0,
            min_value: 0.0,
            max_value: 1000.0,
            unit: None,
            log_enabled: true,
            log_interval_ms: 1000,
            log_deadband: 0.5,
            scan_override_ms: None,
            tags: Tags::empty(),
            metadata: Metadata::empty(),
        }
    }

    fn device() -> Device {
        Device {
            id: DeviceId(1),
            tenant_id: TenantId(1),
            site_id: SiteId(1),
            name: "D1".into(),
            protocol: ProtocolKind::ModbusTcp,
            endpoint: "127.0.0.1:502".into(),
            protocol_config: pulseone_model::ProtocolConfig::empty(),
            enabled: true,
            settings: Default::default(),
        }
    }

    struct NoopDriver;

    #[async_trait::async_trait]
    impl Driver for NoopDriver {
        fn protocol(&self) -> ProtocolKind {
            ProtocolKind::ModbusTcp
        }
        async fn initialize(&self) -> pulseone_contracts::Result<()> {
            Ok(())
        }
        async fn connect(&self) -> pulseone_contracts::Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> pulseone_contracts::Result<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn read_values(&self, _points: &[DataPoint], _timeout: Duration) -> pulseone_contracts::Result<ReadOutcome> {
            Ok(ReadOutcome::Ok(vec![]))
        }
        async fn write_value(&self, _point: &DataPoint, _value: pulseone_contracts::WireValue, _timeout: Duration) -> pulseone_contracts::Result<()> {
            Ok(())
        }
        fn lifecycle_state(&self) -> pulseone_contracts::LifecycleState {
            pulseone_contracts::LifecycleState::Running
        }
        fn connection_state(&self) -> pulseone_contracts::ConnectionState {
            pulseone_contracts::ConnectionState::Connected
        }
        fn last_error(&self) -> Option<pulseone_contracts::DriverError> {
            None
        }
        fn statistics(&self) -> pulseone_contracts::StatisticsSnapshot {
            pulseone_contracts::DriverStatistics::new().snapshot()
        }
        fn reset_statistics(&self) {}
        async fn start(&self) -> pulseone_contracts::Result<()> {
            Ok(())
        }
        async fn stop(&self) -> pulseone_contracts::Result<()> {
            Ok(())
        }
    }

    fn worker() -> DeviceWorker {
        let (cache, _rx) = crate::pipeline::LiveValueCache::with_mirror(16, Duration::from_secs(300));
        struct NullSink;
        #[async_trait::async_trait]
        impl crate::pipeline::HistorianSink for NullSink {
            async fn write_batch(&self, _samples: &[pulseone_contracts::Sample]) -> Result<(), String> {
                Ok(())
            }
        }
        let historian = Arc::new(HistorianBuffer::spawn(
            Arc::new(NullSink),
            16,
            8,
            Duration::from_millis(50),
            Duration::from_millis(5),
            Duration::from_millis(50),
        ));
        let pipeline = Arc::new(Pipeline::new(cache, historian, Arc::new(crate::pipeline::NullRuleSink)));
        DeviceWorker::new(
            device(),
            Arc::new(NoopDriver),
            vec![point()],
            pipeline,
            Arc::new(WriteQueue::new()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn logs_on_first_sample_then_respects_interval_and_deadband() {
        let w = worker();
        let p = point();
        let t0 = Utc::now();
        assert!(w.should_log(&p, 10.0, t0));
        assert!(!w.should_log(&p, 10.2, t0 + ChronoDuration::milliseconds(200)));
        assert!(w.should_log(&p, 10.2, t0 + ChronoDuration::milliseconds(1200)));
        assert!(w.should_log(&p, 10.8, t0 + ChronoDuration::milliseconds(1300)));
    }

    #[test]
    fn storage_type_follows_logging_configuration() {
        let mut p = point();
        assert_eq!(storage_type_for(&p), StorageType::OnChange);
        p.log_deadband = 0.0;
        assert_eq!(storage_type_for(&p), StorageType::Periodic);
        p.log_enabled = false;
        assert_eq!(storage_type_for(&p), StorageType::Immediate);
    }
}
