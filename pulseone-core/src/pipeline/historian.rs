//! Historian Buffer: a bounded FIFO of samples accepted for logging,
//! drained by a background batcher into the historical store (§4.3).

use pulseone_contracts::Sample;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Anything that can durably persist a batch of samples. The concrete
/// implementation (SQL insert, etc.) lives with the configuration
/// persistence layer named out of scope in §1; this crate only owns the
/// buffering and retry discipline around it.
#[async_trait::async_trait]
pub trait HistorianSink: Send + Sync {
    async fn write_batch(&self, samples: &[Sample]) -> Result<(), String>;
}

pub struct HistorianBuffer {
    tx: mpsc::Sender<Sample>,
    dropped: Arc<AtomicU64>,
    emitted: Arc<AtomicU64>,
}

impl std::fmt::Debug for HistorianBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistorianBuffer")
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .field("emitted", &self.emitted.load(Ordering::Relaxed))
            .finish()
    }
}

impl HistorianBuffer {
    /// Spawns the background batcher task and returns a handle. The task
    /// runs until the sender side is dropped.
    pub fn spawn(
        sink: Arc<dyn HistorianSink>,
        mailbox_capacity: usize,
        batch_size: usize,
        flush_interval: std::time::Duration,
        retry_backoff: std::time::Duration,
        max_retry_backoff: std::time::Duration,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel(mailbox_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let emitted = Arc::new(AtomicU64::new(0));
        let dropped_task = dropped.clone();
        let emitted_task = emitted.clone();

        tokio::spawn(async move {
            let mut backlog: Vec<Sample> = Vec::with_capacity(batch_size);
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    maybe_sample = rx.recv() => {
                        match maybe_sample {
                            Some(sample) => {
                                backlog.push(sample);
                                if backlog.len() >= batch_size {
                                    flush(&sink, &mut backlog, &dropped_task, &emitted_task, retry_backoff, max_retry_backoff).await;
                                }
                            }
                            None => {
                                flush(&sink, &mut backlog, &dropped_task, &emitted_task, retry_backoff, max_retry_backoff).await;
                                break;
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        if !backlog.is_empty() {
                            flush(&sink, &mut backlog, &dropped_task, &emitted_task, retry_backoff, max_retry_backoff).await;
                        }
                    }
                }
            }
        });

        Self { tx, dropped, emitted }
    }

    /// Enqueues a sample for logging. Per §4.3, this never blocks the
    /// Worker: if the mailbox is full the sample is dropped and the drop
    /// counter increments.
    pub fn enqueue(&self, sample: Sample) {
        if self.tx.try_send(sample).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

async fn flush(
    sink: &Arc<dyn HistorianSink>,
    backlog: &mut Vec<Sample>,
    dropped: &Arc<AtomicU64>,
    emitted: &Arc<AtomicU64>,
    retry_backoff: std::time::Duration,
    max_retry_backoff: std::time::Duration,
) {
    if backlog.is_empty() {
        return;
    }
    let mut backoff = retry_backoff;
    let mut attempt = 0;
    loop {
        match sink.write_batch(backlog).await {
            Ok(()) => {
                emitted.fetch_add(backlog.len() as u64, Ordering::Relaxed);
                backlog.clear();
                return;
            }
            Err(_) if attempt < 3 => {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_retry_backoff);
                attempt += 1;
            }
            Err(_) => {
                // Sustained failure: drop the batch so the buffer can't
                // grow unbounded, per §4.3 "oldest samples are dropped".
                dropped.fetch_add(backlog.len() as u64, Ordering::Relaxed);
                backlog.clear();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseone_model::{PointId, Quality};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct CountingSink {
        fail: AtomicBool,
        writes: AtomicU64,
    }

    #[async_trait::async_trait]
    impl HistorianSink for CountingSink {
        async fn write_batch(&self, samples: &[Sample]) -> Result<(), String> {
            if self.fail.load(Ordering::Relaxed) {
                return Err("simulated failure".into());
            }
            self.writes.fetch_add(samples.len() as u64, Ordering::Relaxed);
            Ok(())
        }
    }

    fn sample() -> Sample {
        Sample {
            point: PointId::data(1),
            value: 1.0,
            raw_value: 1.0,
            quality: Quality::Good,
            timestamp: chrono::Utc::now(),
            source_device: None,
        }
    }

    #[tokio::test]
    async fn flushes_when_batch_size_reached() {
        let sink = Arc::new(CountingSink {
            fail: AtomicBool::new(false),
            writes: AtomicU64::new(0),
        });
        let buffer = HistorianBuffer::spawn(
            sink.clone(),
            64,
            2,
            Duration::from_secs(10),
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        buffer.enqueue(sample());
        buffer.enqueue(sample());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.writes.load(Ordering::Relaxed), 2);
        assert_eq!(buffer.emitted(), 2);
    }

    #[tokio::test]
    async fn drops_batch_after_sustained_failure() {
        let sink = Arc::new(CountingSink {
            fail: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        });
        let buffer = HistorianBuffer::spawn(
            sink,
            64,
            1,
            Duration::from_secs(10),
            Duration::from_millis(1),
            Duration::from_millis(2),
        );
        buffer.enqueue(sample());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(buffer.dropped(), 1);
    }
}
