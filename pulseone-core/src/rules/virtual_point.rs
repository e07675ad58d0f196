//! Virtual-Point Evaluator: dependency DAG, trigger scheduling, and the
//! four execution kinds described in §4.5.

use super::expr::Expr;
use crate::pipeline::LiveValueCache;
use chrono::Utc;
use dashmap::DashMap;
use pulseone_contracts::Sample;
use pulseone_model::{
    ErrorHandlingPolicy, ExecutionKind, PointId, Quality, TriggerKind, VirtualPoint,
    VirtualPointId, VirtualPointStats,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

struct Entry {
    point: VirtualPoint,
    cyclic: bool,
    stats: Mutex<VirtualPointStats>,
}

/// Evaluates virtual points against the Live Value Cache and republishes
/// results as new samples. Holds a channel rather than a direct reference
/// back into the [`crate::pipeline::Pipeline`] so evaluator and pipeline
/// never form an `Arc` reference cycle; whoever assembles the runtime
/// drains `republish_rx` into `Pipeline::route`.
pub struct VirtualPointEvaluator {
    points: DashMap<VirtualPointId, Arc<Entry>>,
    dependents: DashMap<PointId, Vec<VirtualPointId>>,
    live_cache: Arc<LiveValueCache>,
    republish_tx: mpsc::Sender<Sample>,
    time_wheel: Mutex<BTreeMap<Instant, Vec<VirtualPointId>>>,
    evaluations: AtomicU64,
}

impl std::fmt::Debug for VirtualPointEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualPointEvaluator")
            .field("points", &self.points.len())
            .field("evaluations", &self.evaluations.load(Ordering::Relaxed))
            .finish()
    }
}

impl VirtualPointEvaluator {
    pub fn new(live_cache: Arc<LiveValueCache>, republish_tx: mpsc::Sender<Sample>) -> Self {
        Self {
            points: DashMap::new(),
            dependents: DashMap::new(),
            live_cache,
            republish_tx,
            time_wheel: Mutex::new(BTreeMap::new()),
            evaluations: AtomicU64::new(0),
        }
    }

    /// Indexes all virtual points and flags any that participate in a
    /// dependency cycle (§4.5 "Cycles are detected ... flagged invalid").
    /// A cyclic point's evaluation is never recursed into again; it always
    /// takes the error_handling path (§8 scenario S6).
    pub fn load(&self, points: Vec<VirtualPoint>) {
        let mut graph: HashMap<VirtualPointId, Vec<VirtualPointId>> = HashMap::new();
        let virtual_ids: HashSet<VirtualPointId> =
            points.iter().map(|p| p.id).collect();

        for point in &points {
            let deps = point
                .dependencies
                .iter()
                .filter_map(|d| match d {
                    PointId::Virtual(id) if virtual_ids.contains(id) => Some(*id),
                    _ => None,
                })
                .collect();
            graph.insert(point.id, deps);
        }
        let cyclic = detect_cycles(&graph);

        for point in points {
            for input in &point.inputs {
                self.dependents.entry(input.point).or_default().push(point.id);
            }
            let is_cyclic = cyclic.contains(&point.id);
            let timer_due = if point.trigger_kind == TriggerKind::Timer && point.calculation_interval_ms > 0 {
                Some(Duration::from_millis(point.calculation_interval_ms as u64))
            } else {
                None
            };
            let id = point.id;
            self.points.insert(
                id,
                Arc::new(Entry {
                    point,
                    cyclic: is_cyclic,
                    stats: Mutex::new(VirtualPointStats::default()),
                }),
            );
            if let Some(interval) = timer_due {
                self.schedule(id, interval);
            }
        }
    }

    fn schedule(&self, id: VirtualPointId, interval: Duration) {
        let due = Instant::now() + interval;
        self.time_wheel.lock().unwrap().entry(due).or_default().push(id);
    }

    /// Called by the Rule Engine's `on_sample` for every accepted sample:
    /// schedules evaluation of any `on_change` virtual point that
    /// depends on the point that just changed, provided the sample's
    /// quality is good or uncertain (§4.5 "Triggering").
    pub async fn on_dependency_changed(&self, sample: &Sample) {
        // Bad-quality samples still trigger re-evaluation: §8 scenario S5
        // requires the dependent to re-run and fall back via
        // error_handling rather than silently keep its stale value.
        if !matches!(sample.quality, Quality::Good | Quality::Uncertain | Quality::Bad) {
            return;
        }
        let Some(dependents) = self.dependents.get(&sample.point) else {
            return;
        };
        let ids: Vec<VirtualPointId> = dependents.clone();
        drop(dependents);
        for id in ids {
            let entry = match self.points.get(&id) {
                Some(entry) => entry.clone(),
                None => continue,
            };
            if entry.point.trigger_kind == TriggerKind::OnChange {
                if let Some(result) = self.evaluate(&entry).await {
                    let _ = self.republish_tx.try_send(result);
                }
            }
        }
    }

    /// External event trigger (§4.5 "event: external signals enqueue the
    /// point").
    pub async fn trigger_event(&self, id: VirtualPointId) {
        if let Some(entry) = self.points.get(&id) {
            let entry = entry.clone();
            if let Some(result) = self.evaluate(&entry).await {
                let _ = self.republish_tx.try_send(result);
            }
        }
    }

    /// On-demand evaluation through the external query path (§4.5).
    pub async fn evaluate_on_demand(&self, id: VirtualPointId) -> Option<Sample> {
        let entry = self.points.get(&id)?.clone();
        self.evaluate(&entry).await
    }

    /// Drains due timer-triggered points and reschedules them. Intended to
    /// be called in a loop by whoever owns the evaluator's background
    /// task, sleeping until the next due instant in between.
    pub async fn run_due_timers(&self) {
        loop {
            let due_ids = {
                let mut wheel = self.time_wheel.lock().unwrap();
                let now = Instant::now();
                let due_keys: Vec<Instant> = wheel.range(..=now).map(|(k, _)| *k).collect();
                let mut ids = Vec::new();
                for key in due_keys {
                    if let Some(batch) = wheel.remove(&key) {
                        ids.extend(batch);
                    }
                }
                ids
            };
            if due_ids.is_empty() {
                break;
            }
            for id in due_ids {
                let entry = match self.points.get(&id) {
                    Some(entry) => entry.clone(),
                    None => continue,
                };
                if let Some(result) = self.evaluate(&entry).await {
                    let _ = self.republish_tx.try_send(result);
                }
                if entry.point.calculation_interval_ms > 0 {
                    self.schedule(id, Duration::from_millis(entry.point.calculation_interval_ms as u64));
                }
            }
        }
    }

    /// Returns the duration until the next timer-triggered point is due,
    /// for a caller driving `run_due_timers` off a sleep.
    pub fn next_timer_due_in(&self) -> Option<Duration> {
        let wheel = self.time_wheel.lock().unwrap();
        wheel.keys().next().map(|instant| instant.saturating_duration_since(Instant::now()))
    }

    async fn evaluate(&self, entry: &Arc<Entry>) -> Option<Sample> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let (value, quality) = if entry.cyclic {
            let stats = entry.stats.lock().unwrap();
            let (v, _) = apply_error_handling(entry.point.error_handling, stats.last_value, entry.point.default_value);
            (v, Quality::Bad)
        } else {
            self.evaluate_fresh(entry)
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        {
            let mut stats = entry.stats.lock().unwrap();
            stats.record(Some(value), elapsed_ms);
        }

        Some(Sample {
            point: PointId::Virtual(entry.point.id),
            value,
            raw_value: value,
            quality,
            timestamp: Utc::now(),
            source_device: None,
        })
    }

    fn evaluate_fresh(&self, entry: &Arc<Entry>) -> (f64, Quality) {
        let vp = &entry.point;
        let mut ctx = HashMap::new();
        let mut qualities = Vec::with_capacity(vp.inputs.len());
        let mut missing = false;

        for input in &vp.inputs {
            match self.live_cache.get(input.point) {
                Some(current) => {
                    ctx.insert(input.name.clone(), current.value);
                    qualities.push(current.quality);
                }
                None => missing = true,
            }
        }

        if missing {
            let stats = entry.stats.lock().unwrap();
            let (v, q) = apply_error_handling(vp.error_handling, stats.last_value, vp.default_value);
            return (v, q);
        }

        let worst = worst_quality(&qualities);
        if worst == Quality::Bad {
            let stats = entry.stats.lock().unwrap();
            let (v, q) = apply_error_handling(vp.error_handling, stats.last_value, vp.default_value);
            return (v, q);
        }

        let computed = match vp.execution_kind {
            ExecutionKind::Formula | ExecutionKind::Script => Expr::parse(&vp.formula).ok().and_then(|e| e.eval(&ctx).ok()),
            ExecutionKind::Aggregate => evaluate_aggregate(&vp.formula, ctx.values().copied()),
            ExecutionKind::Reference => ctx.values().next().copied(),
        };

        match computed {
            Some(value) => (value, worst),
            None => {
                let stats = entry.stats.lock().unwrap();
                let (v, q) = apply_error_handling(vp.error_handling, stats.last_value, vp.default_value);
                (v, q)
            }
        }
    }
}

/// DFS-based cycle detection returning the set of points that participate
/// in at least one cycle.
fn detect_cycles(graph: &HashMap<VirtualPointId, Vec<VirtualPointId>>) -> HashSet<VirtualPointId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<VirtualPointId, Mark> = HashMap::new();
    let mut cyclic = HashSet::new();

    for &start in graph.keys() {
        if marks.contains_key(&start) {
            continue;
        }
        // (node, next-dependency-index-to-visit); an explicit stack keeps
        // this iterative since dependency chains come from untrusted
        // configuration and could be deep.
        let mut stack = vec![(start, 0usize)];
        while let Some((node, idx)) = stack.pop() {
            if idx == 0 {
                if let Some(Mark::Done) = marks.get(&node) {
                    continue;
                }
                marks.insert(node, Mark::Visiting);
            }
            let deps = graph.get(&node).cloned().unwrap_or_default();
            if idx < deps.len() {
                stack.push((node, idx + 1));
                let next = deps[idx];
                match marks.get(&next) {
                    Some(Mark::Visiting) => {
                        cyclic.insert(next);
                        cyclic.insert(node);
                    }
                    Some(Mark::Done) => {}
                    None => stack.push((next, 0)),
                }
            } else {
                marks.insert(node, Mark::Done);
            }
        }
    }
    cyclic
}

fn worst_quality(qualities: &[Quality]) -> Quality {
    if qualities.iter().any(|q| !matches!(q, Quality::Good | Quality::Uncertain)) {
        return Quality::Bad;
    }
    if qualities.iter().any(|q| *q != Quality::Good) {
        return Quality::Uncertain;
    }
    Quality::Good
}

fn evaluate_aggregate(formula: &str, values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return None;
    }
    let name = formula.split('(').next().unwrap_or(formula).trim().to_ascii_lowercase();
    match name.as_str() {
        "sum" => Some(values.iter().sum()),
        "avg" | "average" | "mean" => Some(values.iter().sum::<f64>() / values.len() as f64),
        "min" => values.iter().cloned().fold(f64::INFINITY, f64::min).into(),
        "max" => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max).into(),
        _ => None,
    }
}

/// Computes the fallback (value, quality) pair for one of the four
/// error-handling policies (§4.5). `return_null` always yields bad
/// quality; the others yield uncertain quality to signal "a stand-in
/// value, not a measurement".
fn apply_error_handling(policy: ErrorHandlingPolicy, last_value: Option<f64>, default_value: Option<f64>) -> (f64, Quality) {
    match policy {
        ErrorHandlingPolicy::ReturnNull => (0.0, Quality::Bad),
        ErrorHandlingPolicy::ReturnLast => (last_value.unwrap_or(0.0), Quality::Uncertain),
        ErrorHandlingPolicy::ReturnZero => (0.0, Quality::Uncertain),
        ErrorHandlingPolicy::ReturnDefault => (default_value.unwrap_or(0.0), Quality::Uncertain),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseone_model::{DataPointId, StorageType, TenantId, VirtualPointInput};
    use std::time::Duration as StdDuration;

    fn vp_a_plus_b() -> VirtualPoint {
        VirtualPoint {
            id: VirtualPointId(1),
            tenant_id: TenantId(1),
            site_id: None,
            device_id: None,
            formula: "a + b".to_string(),
            execution_kind: ExecutionKind::Formula,
            trigger_kind: TriggerKind::OnChange,
            calculation_interval_ms: 0,
            inputs: vec![
                VirtualPointInput { name: "a".to_string(), point: PointId::Data(DataPointId(1)) },
                VirtualPointInput { name: "b".to_string(), point: PointId::Data(DataPointId(2)) },
            ],
            dependencies: vec![],
            cache_duration_ms: 0,
            error_handling: ErrorHandlingPolicy::ReturnLast,
            default_value: None,
        }
    }

    fn sample(point: PointId, value: f64, quality: Quality) -> Sample {
        Sample {
            point,
            value,
            raw_value: value,
            quality,
            timestamp: Utc::now(),
            source_device: None,
        }
    }

    #[tokio::test]
    async fn propagates_sum_then_falls_back_on_bad_input() {
        let (cache, _rx) = LiveValueCache::with_mirror(16, StdDuration::from_secs(300));
        let (tx, mut rx) = mpsc::channel(16);
        let evaluator = VirtualPointEvaluator::new(cache.clone(), tx);
        evaluator.load(vec![vp_a_plus_b()]);

        cache.apply(&sample(PointId::Data(DataPointId(1)), 10.0, Quality::Good), StorageType::OnChange);
        evaluator.on_dependency_changed(&sample(PointId::Data(DataPointId(1)), 10.0, Quality::Good)).await;

        cache.apply(&sample(PointId::Data(DataPointId(2)), 20.0, Quality::Good), StorageType::OnChange);
        evaluator.on_dependency_changed(&sample(PointId::Data(DataPointId(2)), 20.0, Quality::Good)).await;

        let published = rx.recv().await.unwrap();
        assert_eq!(published.value, 30.0);
        assert_eq!(published.quality, Quality::Good);

        cache.apply(&sample(PointId::Data(DataPointId(1)), 10.0, Quality::Bad), StorageType::OnChange);
        evaluator.on_dependency_changed(&sample(PointId::Data(DataPointId(1)), 10.0, Quality::Bad)).await;

        let fallback = rx.recv().await.unwrap();
        assert_eq!(fallback.value, 30.0);
        assert_eq!(fallback.quality, Quality::Uncertain);
    }

    #[test]
    fn cyclic_dependency_is_flagged_and_isolated() {
        let mut v1 = vp_a_plus_b();
        v1.id = VirtualPointId(1);
        v1.dependencies = vec![PointId::Virtual(VirtualPointId(2))];
        let mut v2 = vp_a_plus_b();
        v2.id = VirtualPointId(2);
        v2.dependencies = vec![PointId::Virtual(VirtualPointId(1))];

        let (cache, _rx) = LiveValueCache::with_mirror(16, StdDuration::from_secs(300));
        let (tx, _rx2) = mpsc::channel(16);
        let evaluator = VirtualPointEvaluator::new(cache, tx);
        evaluator.load(vec![v1, v2]);

        assert!(evaluator.points.get(&VirtualPointId(1)).unwrap().cyclic);
        assert!(evaluator.points.get(&VirtualPointId(2)).unwrap().cyclic);
    }

    #[tokio::test]
    async fn cyclic_point_always_emits_bad_quality() {
        let mut v1 = vp_a_plus_b();
        v1.dependencies = vec![PointId::Virtual(VirtualPointId(1))];

        let (cache, _rx) = LiveValueCache::with_mirror(16, StdDuration::from_secs(300));
        let (tx, mut rx) = mpsc::channel(16);
        let evaluator = VirtualPointEvaluator::new(cache, tx);
        evaluator.load(vec![v1]);

        let result = evaluator.evaluate_on_demand(VirtualPointId(1)).await.unwrap();
        assert_eq!(result.quality, Quality::Bad);
        assert!(rx.try_recv().is_err());
    }
}
