//! Worker Registry and the runtime root that assembles a device's driver,
//! pipeline, and rule engine into a running [`crate::worker::DeviceWorker`]
//! (§5 "Worker Registry", §9 "explicit dependency injection into the
//! Runtime root").

use crate::error::CoreError;
use crate::pipeline::Pipeline;
use crate::rules::RuleEngine;
use crate::worker::{DeviceWorker, WriteQueue};
use pulseone_contracts::DriverFactory;
use pulseone_model::{DataPoint, Device, DeviceId};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const MAX_SUPERVISED_RESTARTS: u32 = 5;
const RESTART_BASE_BACKOFF_MS: u64 = 500;
const RESTART_MAX_BACKOFF_MS: u64 = 30_000;
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

struct WorkerHandle {
    worker: Arc<DeviceWorker>,
    supervisor: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Process-wide map from device id to its running worker (§5 "a
/// process-wide map behind a reader/writer lock; reads ... frequent,
/// writes ... rare").
pub struct WorkerRegistry {
    workers: RwLock<HashMap<DeviceId, WorkerHandle>>,
    factory: Arc<DriverFactory>,
    pipeline: Arc<Pipeline>,
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.workers.try_read().map(|g| g.len()).unwrap_or_default();
        f.debug_struct("WorkerRegistry").field("workers", &count).finish()
    }
}

impl WorkerRegistry {
    pub fn new(factory: Arc<DriverFactory>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            factory,
            pipeline,
        }
    }

    /// Starts a supervised worker for `device`. A fresh driver instance
    /// and worker are (re)built from `device`/`points` each time the
    /// supervisor restarts it after a panic, since the old driver's
    /// internal state can't be trusted post-crash (§5 Isolation).
    pub async fn spawn_worker(&self, device: Device, points: Vec<DataPoint>) -> Result<(), CoreError> {
        let cancel = CancellationToken::new();
        let pipeline = self.pipeline.clone();
        let factory = self.factory.clone();
        let device_id = device.id;

        let first_driver = factory.create_driver(&device)?;
        let worker = Arc::new(DeviceWorker::new(
            device.clone(),
            first_driver,
            points.clone(),
            pipeline.clone(),
            Arc::new(WriteQueue::new()),
            cancel.clone(),
        ));

        let supervisor = tokio::spawn(supervise(device, points, factory, pipeline, worker.clone(), cancel.clone()));

        let mut guard = self.workers.write().await;
        guard.insert(device_id, WorkerHandle { worker, supervisor, cancel });
        Ok(())
    }

    pub async fn pause(&self, device_id: DeviceId) -> bool {
        match self.workers.read().await.get(&device_id) {
            Some(handle) => {
                handle.worker.pause_flag().store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub async fn resume(&self, device_id: DeviceId) -> bool {
        match self.workers.read().await.get(&device_id) {
            Some(handle) => {
                handle.worker.pause_flag().store(false, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Cancels the worker and waits up to a fixed grace period for the
    /// in-flight driver call to finish before moving on (§5 "allowed to
    /// complete up to its deadline, then the driver is force-disconnected").
    pub async fn stop(&self, device_id: DeviceId) -> bool {
        let handle = self.workers.write().await.remove(&device_id);
        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                let _ = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, handle.supervisor).await;
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let ids: Vec<DeviceId> = self.workers.read().await.keys().copied().collect();
        for id in ids {
            self.stop(id).await;
        }
    }

    pub async fn device_ids(&self) -> Vec<DeviceId> {
        self.workers.read().await.keys().copied().collect()
    }

    pub async fn worker(&self, device_id: DeviceId) -> Option<Arc<DeviceWorker>> {
        self.workers.read().await.get(&device_id).map(|h| h.worker.clone())
    }

    pub async fn is_running(&self, device_id: DeviceId) -> bool {
        self.workers.read().await.contains_key(&device_id)
    }
}

/// Runs `worker`, and on an uncancelled panic rebuilds a fresh worker from
/// `device`/`points` and restarts it, up to `MAX_SUPERVISED_RESTARTS`
/// times with doubling backoff (§5 Isolation).
async fn supervise(
    device: Device,
    points: Vec<DataPoint>,
    factory: Arc<DriverFactory>,
    pipeline: Arc<Pipeline>,
    mut worker: Arc<DeviceWorker>,
    cancel: CancellationToken,
) {
    let mut attempt = 0u32;
    loop {
        let task = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run().await }
        });

        match task.await {
            Ok(()) => return,
            Err(join_err) if join_err.is_panic() && !cancel.is_cancelled() => {
                if attempt >= MAX_SUPERVISED_RESTARTS {
                    return;
                }
                let backoff = (RESTART_BASE_BACKOFF_MS * 2u64.pow(attempt)).min(RESTART_MAX_BACKOFF_MS);
                attempt += 1;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
                }
                let driver = match factory.create_driver(&device) {
                    Ok(driver) => driver,
                    Err(_) => return,
                };
                worker = Arc::new(DeviceWorker::new(
                    device.clone(),
                    driver,
                    points.clone(),
                    pipeline.clone(),
                    Arc::new(WriteQueue::new()),
                    cancel.clone(),
                ));
            }
            Err(_) => return,
        }
    }
}

/// Assembles the Driver Factory, Pipeline, Rule Engine, and Worker
/// Registry with explicit dependency injection rather than any global
/// singleton (§9).
pub struct Runtime {
    pub registry: Arc<WorkerRegistry>,
    pub pipeline: Arc<Pipeline>,
    pub rule_engine: Arc<RuleEngine>,
}

impl Runtime {
    pub fn new(factory: Arc<DriverFactory>, pipeline: Arc<Pipeline>, rule_engine: Arc<RuleEngine>) -> Self {
        let registry = Arc::new(WorkerRegistry::new(factory, pipeline.clone()));
        Self {
            registry,
            pipeline,
            rule_engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{HistorianBuffer, HistorianSink, LiveValueCache, NullRuleSink};
    use pulseone_model::{ProtocolKind, SiteId, TenantId};

    fn device() -> Device {
        Device {
            id: DeviceId(1),
            tenant_id: TenantId(1),
            site_id: SiteId(1),
            name: "D1".into(),
            protocol: ProtocolKind::Mqtt,
            endpoint: "localhost:1883".into(),
            protocol_config: pulseone_model::ProtocolConfig::empty(),
            enabled: true,
            settings: Default::default(),
        }
    }

    struct NullSink;
    #[async_trait::async_trait]
    impl HistorianSink for NullSink {
        async fn write_batch(&self, _samples: &[pulseone_contracts::Sample]) -> Result<(), String> {
            Ok(())
        }
    }

    fn pipeline() -> Arc<Pipeline> {
        let (cache, _rx) = LiveValueCache::with_mirror(16, Duration::from_secs(300));
        let historian = Arc::new(HistorianBuffer::spawn(
            Arc::new(NullSink),
            16,
            8,
            Duration::from_millis(50),
            Duration::from_millis(5),
            Duration::from_millis(50),
        ));
        Arc::new(Pipeline::new(cache, historian, Arc::new(NullRuleSink)))
    }

    #[tokio::test]
    async fn spawns_and_stops_a_worker_by_device_id() {
        let factory = Arc::new(crate::drivers::built_in_factory());
        let registry = WorkerRegistry::new(factory, pipeline());
        registry.spawn_worker(device(), vec![]).await.unwrap();

        assert!(registry.is_running(DeviceId(1)).await);
        assert!(registry.pause(DeviceId(1)).await);
        assert!(registry.resume(DeviceId(1)).await);
        assert!(registry.stop(DeviceId(1)).await);
        assert!(!registry.is_running(DeviceId(1)).await);
    }

    #[tokio::test]
    async fn pause_of_unknown_device_is_a_no_op_false() {
        let factory = Arc::new(crate::drivers::built_in_factory());
        let registry = WorkerRegistry::new(factory, pipeline());
        assert!(!registry.pause(DeviceId(99)).await);
    }
}
