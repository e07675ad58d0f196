//! The asynchronous fan-out conveyor from Workers to the Live Value Cache,
//! Rule Engine, and Historian Buffer (§4.3).

mod historian;
mod live_cache;

pub use historian::{HistorianBuffer, HistorianSink};
pub use live_cache::{LiveValueCache, MirrorWriteOwned};

use async_trait::async_trait;
use pulseone_contracts::Sample;
use pulseone_model::StorageType;
use std::sync::Arc;

/// The Rule Engine's entry point as seen by the Pipeline. Implemented by
/// `rules::RuleEngine`; kept as a trait here so the pipeline and rule-engine
/// modules don't need a concrete-type cycle.
#[async_trait]
pub trait RuleSink: Send + Sync + std::fmt::Debug {
    async fn on_sample(&self, sample: Sample);
}

/// A no-op sink used before the real Rule Engine is wired in, and in tests.
#[derive(Debug, Default)]
pub struct NullRuleSink;

#[async_trait]
impl RuleSink for NullRuleSink {
    async fn on_sample(&self, _sample: Sample) {}
}

#[derive(Debug)]
pub struct Pipeline {
    live_cache: Arc<LiveValueCache>,
    historian: Arc<HistorianBuffer>,
    rule_sink: Arc<dyn RuleSink>,
}

impl Pipeline {
    pub fn new(live_cache: Arc<LiveValueCache>, historian: Arc<HistorianBuffer>, rule_sink: Arc<dyn RuleSink>) -> Self {
        Self {
            live_cache,
            historian,
            rule_sink,
        }
    }

    pub fn live_cache(&self) -> &Arc<LiveValueCache> {
        &self.live_cache
    }

    pub fn historian(&self) -> &Arc<HistorianBuffer> {
        &self.historian
    }

    /// Routes one accepted sample to all three sinks in the order fixed by
    /// §4.3: Live Value Cache (synchronous, including the async mirror
    /// enqueue which never blocks), Rule Engine (synchronous — awaited,
    /// never dropped), then Historian Buffer (asynchronous mailbox, only
    /// when `emit_to_historian` — the caller's log-deadband decision from
    /// §4.2 step 3 — is true).
    pub async fn route(&self, sample: Sample, storage_type: StorageType, emit_to_historian: bool) {
        self.live_cache.apply(&sample, storage_type);
        self.rule_sink.on_sample(sample).await;
        if emit_to_historian {
            self.historian.enqueue(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseone_model::{PointId, Quality};
    use std::time::Duration;

    struct RejectingSink;

    #[async_trait::async_trait]
    impl HistorianSink for RejectingSink {
        async fn write_batch(&self, _samples: &[Sample]) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_sample_into_cache_and_historian() {
        let (cache, _rx) = LiveValueCache::with_mirror(16, Duration::from_secs(300));
        let historian = Arc::new(HistorianBuffer::spawn(
            Arc::new(RejectingSink),
            16,
            8,
            Duration::from_millis(20),
            Duration::from_millis(5),
            Duration::from_millis(50),
        ));
        let pipeline = Pipeline::new(cache.clone(), historian.clone(), Arc::new(NullRuleSink));

        let sample = Sample {
            point: PointId::data(1),
            value: 42.0,
            raw_value: 42.0,
            quality: Quality::Good,
            timestamp: chrono::Utc::now(),
            source_device: None,
        };
        pipeline.route(sample, StorageType::OnChange, true).await;

        assert!(cache.get(PointId::data(1)).is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(historian.emitted(), 1);
    }
}
