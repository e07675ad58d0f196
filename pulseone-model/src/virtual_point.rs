use crate::enums::{ErrorHandlingPolicy, ExecutionKind, TriggerKind};
use crate::ids::{DeviceId, PointId, SiteId, TenantId, VirtualPointId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A derived signal computed from other points (§3 "Virtual Point").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VirtualPoint {
    pub id: VirtualPointId,
    pub tenant_id: TenantId,
    pub site_id: Option<SiteId>,
    pub device_id: Option<DeviceId>,
    pub formula: String,
    pub execution_kind: ExecutionKind,
    pub trigger_kind: TriggerKind,
    pub calculation_interval_ms: u32,
    pub inputs: Vec<VirtualPointInput>,
    pub dependencies: Vec<PointId>,
    pub cache_duration_ms: u32,
    pub error_handling: ErrorHandlingPolicy,
    pub default_value: Option<f64>,
}

/// One named slot in a virtual point's input mapping.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VirtualPointInput {
    pub name: String,
    pub point: PointId,
}

impl VirtualPoint {
    /// The default per-evaluation timeout, used when `cache_duration_ms`
    /// is zero (§4.5 "under a timeout bounded by the point's
    /// cache_duration_ms or a default").
    pub fn evaluation_timeout_ms(&self) -> u32 {
        if self.cache_duration_ms == 0 {
            Self::DEFAULT_TIMEOUT_MS
        } else {
            self.cache_duration_ms
        }
    }

    pub const DEFAULT_TIMEOUT_MS: u32 = 1000;
}

/// Running execution statistics for a virtual point (§3).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VirtualPointStats {
    pub execution_count: u64,
    pub last_value: Option<f64>,
    pub avg_execution_time_ms: f64,
}

impl VirtualPointStats {
    /// Folds in a new measured execution time using a running mean,
    /// matching the driver statistics' "running average" idiom (§4.1).
    pub fn record(&mut self, value: Option<f64>, execution_time_ms: f64) {
        let n = self.execution_count as f64;
        self.avg_execution_time_ms =
            (self.avg_execution_time_ms * n + execution_time_ms) / (n + 1.0);
        self.execution_count += 1;
        self.last_value = value.or(self.last_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_updates_incrementally() {
        let mut stats = VirtualPointStats::default();
        stats.record(Some(1.0), 10.0);
        stats.record(Some(2.0), 20.0);
        assert_eq!(stats.execution_count, 2);
        assert_eq!(stats.avg_execution_time_ms, 15.0);
        assert_eq!(stats.last_value, Some(2.0));
    }

    #[test]
    fn zero_cache_duration_falls_back_to_default_timeout() {
        let vp = VirtualPoint {
            id: VirtualPointId(1),
            tenant_id: TenantId(1),
            site_id: None,
            device_id: None,
            formula: "a + b".into(),
            execution_kind: ExecutionKind::Formula,
            trigger_kind: TriggerKind::OnChange,
            calculation_interval_ms: 0,
            inputs: vec![],
            dependencies: vec![],
            cache_duration_ms: 0,
            error_handling: ErrorHandlingPolicy::ReturnLast,
            default_value: None,
        };
        assert_eq!(vp.evaluation_timeout_ms(), VirtualPoint::DEFAULT_TIMEOUT_MS);
    }
}
