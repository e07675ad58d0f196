//! Priority write queue: a device's pending writes, ordered by priority
//! then arrival order, with deadline enforcement at dequeue (§4.2, §8 S4).

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use pulseone_contracts::WireValue;
use pulseone_model::DataPoint;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tokio::sync::oneshot;

/// One caller's write request, carrying the means to report back success,
/// failure, or `deadline_exceeded` without touching the wire (§8 S4).
pub struct WriteRequest {
    pub point: DataPoint,
    pub value: WireValue,
    pub priority: i32,
    pub deadline: DateTime<Utc>,
    pub responder: Option<oneshot::Sender<Result<(), CoreError>>>,
}

struct Queued {
    priority: i32,
    seq: u64,
    request: WriteRequest,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Queued {}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority pops first; among
        // equal priorities, the earlier-enqueued (lower seq) pops first.
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shared between the Worker (the sole dequeuer) and any number of
/// callers enqueuing writes (§5: the Worker thread is the only thread
/// touching its driver, so only it ever calls `dequeue_ready`).
pub struct WriteQueue {
    heap: Mutex<BinaryHeap<Queued>>,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("pending", &self.heap.lock().unwrap().len())
            .finish()
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn enqueue(&self, request: WriteRequest) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().unwrap().push(Queued {
            priority: request.priority,
            seq,
            request,
        });
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pops the highest-priority request still before its deadline,
    /// failing (and responding to) any expired ones it passes over along
    /// the way without ever touching the wire (§8 S4).
    pub fn dequeue_ready(&self) -> Option<WriteRequest> {
        let mut heap = self.heap.lock().unwrap();
        loop {
            let mut queued = heap.pop()?;
            if queued.request.deadline < Utc::now() {
                let point_id = queued.request.point.id.0;
                if let Some(responder) = queued.request.responder.take() {
                    let _ = responder.send(Err(CoreError::DeadlineExceeded { point_id }));
                }
                continue;
            }
            return Some(queued.request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use pulseone_model::{AccessMode, DataPointId, DataType, DeviceId, Metadata, PointAddress, Tags};

    fn point(id: i64) -> DataPoint {
        DataPoint {
            id: DataPointId(id),
            device_id: DeviceId(1),
            address: PointAddress { numeric: 0, string: None },
            data_type: DataType::Float32,
            access_mode: AccessMode::Write,
            scaling_factor: 1.0,
            scaling_offset: 0.0,
            min_value: 0.0,
            max_value: 100.0,
            unit: None,
            log_enabled: false,
            log_interval_ms: 0,
            log_deadband: 0.0,
            scan_override_ms: None,
            tags: Tags::empty(),
            metadata: Metadata::empty(),
        }
    }

    fn request(priority: i32) -> WriteRequest {
        WriteRequest {
            point: point(1),
            value: WireValue::Float(1.0),
            priority,
            deadline: Utc::now() + ChronoDuration::seconds(30),
            responder: None,
        }
    }

    #[test]
    fn higher_priority_write_dequeues_first_even_when_enqueued_later() {
        let queue = WriteQueue::new();
        queue.enqueue(request(5));
        queue.enqueue(request(10));
        let first = queue.dequeue_ready().unwrap();
        assert_eq!(first.priority, 10);
        let second = queue.dequeue_ready().unwrap();
        assert_eq!(second.priority, 5);
    }

    #[tokio::test]
    async fn expired_write_fails_with_deadline_exceeded_without_surfacing() {
        let queue = WriteQueue::new();
        let (tx, rx) = oneshot::channel();
        let mut expired = request(1);
        expired.deadline = Utc::now() - ChronoDuration::seconds(1);
        expired.responder = Some(tx);
        queue.enqueue(expired);
        queue.enqueue(request(1));

        let ready = queue.dequeue_ready().unwrap();
        assert_eq!(ready.priority, 1);
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(CoreError::DeadlineExceeded { .. })));
    }
}
