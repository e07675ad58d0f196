//! In-process Live Value Cache, mirrored to an external key-value store
//! (§4.3). Partitioned per point via [`DashMap`], so concurrent readers of
//! different points never contend and a reader of one point always sees a
//! complete record, never a partial update (§5 "partitioned per point").

use dashmap::DashMap;
use pulseone_contracts::Sample;
use pulseone_model::{CurrentValue, PointId, Quality, StorageType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A pending external-mirror write, dispatched through a bounded mailbox so
/// a slow KV store can never block the Worker (§4.3, §5).
#[derive(Debug, Clone)]
struct MirrorWrite {
    key: String,
    value: CurrentValue,
    ttl: Duration,
}

pub struct LiveValueCache {
    entries: DashMap<PointId, CurrentValue>,
    mirror_tx: Option<mpsc::Sender<MirrorWrite>>,
    default_ttl: Duration,
    mirror_drops: AtomicU64,
}

impl std::fmt::Debug for LiveValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveValueCache")
            .field("entries", &self.entries.len())
            .field("mirror_drops", &self.mirror_drops.load(Ordering::Relaxed))
            .finish()
    }
}

impl LiveValueCache {
    /// Builds a cache wired to an async mirror task; the caller owns the
    /// receiver end and is responsible for draining it into the actual KV
    /// client (kept out of this crate's direct dependency surface so the
    /// cache stays testable without a running Redis).
    pub fn with_mirror(mailbox_capacity: usize, default_ttl: Duration) -> (Arc<Self>, mpsc::Receiver<MirrorWriteOwned>) {
        let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
        let cache = Arc::new(Self {
            entries: DashMap::new(),
            mirror_tx: Some(tx),
            default_ttl,
            mirror_drops: AtomicU64::new(0),
        });
        (cache, rx)
    }

    /// Applies an incoming sample (§4.3 "out-of-order protection"):
    /// discards if it would move the point's timestamp backwards,
    /// otherwise replaces the entry and enqueues the external mirror
    /// write. Returns `false` when the sample was discarded as stale.
    pub fn apply(&self, sample: &Sample, storage_type: StorageType) -> bool {
        if let Some(existing) = self.entries.get(&sample.point) {
            if existing.is_stale_against(sample.timestamp) {
                return false;
            }
        }

        let current = CurrentValue {
            point: sample.point,
            value: sample.value,
            raw_value: sample.raw_value,
            quality: sample.quality,
            timestamp: sample.timestamp,
            storage_type,
            last_save_time: None,
            last_saved_value: None,
        };
        let key = current.cache_key();
        self.entries.insert(sample.point, current.clone());

        if let Some(tx) = &self.mirror_tx {
            let write = MirrorWrite {
                key,
                value: current,
                ttl: self.default_ttl,
            };
            if tx.try_send(MirrorWriteOwned(write)).is_err() {
                self.mirror_drops.fetch_add(1, Ordering::Relaxed);
            }
        }
        true
    }

    pub fn get(&self, point: PointId) -> Option<CurrentValue> {
        self.entries.get(&point).map(|entry| entry.clone())
    }

    pub fn quality_of(&self, point: PointId) -> Option<Quality> {
        self.entries.get(&point).map(|entry| entry.quality)
    }

    /// Marks every point as offline without discarding the last known
    /// value, used on transport loss (§4.2 "marks all its points' current
    /// qualities as timeout/not_connected (preserving last known value)").
    pub fn mark_offline(&self, points: &[PointId], quality: Quality) {
        for point in points {
            if let Some(mut entry) = self.entries.get_mut(point) {
                entry.quality = quality;
            }
        }
    }

    pub fn mirror_drops(&self) -> u64 {
        self.mirror_drops.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Newtype so the mirror channel's item type doesn't leak the private
/// [`MirrorWrite`] struct past this module's public surface.
#[derive(Debug, Clone)]
pub struct MirrorWriteOwned(MirrorWrite);

impl MirrorWriteOwned {
    pub fn key(&self) -> &str {
        &self.0.key
    }

    pub fn value(&self) -> &CurrentValue {
        &self.0.value
    }

    pub fn ttl(&self) -> Duration {
        self.0.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn sample(point: PointId, value: f64, ts: chrono::DateTime<Utc>) -> Sample {
        Sample {
            point,
            value,
            raw_value: value,
            quality: Quality::Good,
            timestamp: ts,
            source_device: None,
        }
    }

    #[test]
    fn discards_samples_older_than_the_stored_timestamp() {
        let (cache, _rx) = LiveValueCache::with_mirror(16, Duration::from_secs(300));
        let point = PointId::data(1);
        let now = Utc::now();
        assert!(cache.apply(&sample(point, 1.0, now), StorageType::OnChange));
        let stale = sample(point, 2.0, now - ChronoDuration::seconds(5));
        assert!(!cache.apply(&stale, StorageType::OnChange));
        assert_eq!(cache.get(point).unwrap().value, 1.0);
    }

    #[test]
    fn mirror_drop_counter_increments_when_mailbox_is_full() {
        let (cache, _rx) = LiveValueCache::with_mirror(1, Duration::from_secs(300));
        let point = PointId::data(1);
        let now = Utc::now();
        for i in 0..5 {
            cache.apply(&sample(point, i as f64, now + ChronoDuration::milliseconds(i)), StorageType::OnChange);
        }
        assert!(cache.mirror_drops() > 0);
    }
}
