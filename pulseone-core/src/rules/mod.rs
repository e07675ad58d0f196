//! Rule Engine: the Alarm Evaluator and Virtual-Point Evaluator (§4.4,
//! §4.5), combined behind the [`crate::pipeline::RuleSink`] the Pipeline
//! calls into for every accepted sample.

pub mod alarm;
pub mod expr;
pub mod virtual_point;

pub use alarm::{AlarmEvaluator, NullOccurrenceSink, OccurrenceSink};
pub use virtual_point::VirtualPointEvaluator;

use crate::pipeline::{LiveValueCache, RuleSink};
use async_trait::async_trait;
use pulseone_contracts::Sample;
use pulseone_model::{AlarmRule, VirtualPoint};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Combines both evaluators and feeds virtual-point results back into the
/// pipeline through `republish_rx`, which the runtime root drains into
/// `Pipeline::route` (§4.5; kept out-of-band to avoid an `Arc` cycle
/// between the Rule Engine and the Pipeline it's invoked by).
pub struct RuleEngine {
    alarms: AlarmEvaluator,
    virtual_points: VirtualPointEvaluator,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("alarms", &self.alarms)
            .field("virtual_points", &self.virtual_points)
            .finish()
    }
}

impl RuleEngine {
    pub fn new(live_cache: Arc<LiveValueCache>, occurrence_sink: Arc<dyn OccurrenceSink>) -> (Self, mpsc::Receiver<Sample>) {
        let (tx, rx) = mpsc::channel(256);
        let engine = Self {
            alarms: AlarmEvaluator::new(occurrence_sink),
            virtual_points: VirtualPointEvaluator::new(live_cache, tx),
        };
        (engine, rx)
    }

    pub fn load_alarm_rules(&self, rules: Vec<AlarmRule>) {
        self.alarms.load_rules(rules);
    }

    pub fn load_virtual_points(&self, points: Vec<VirtualPoint>) {
        self.virtual_points.load(points);
    }

    pub fn alarms(&self) -> &AlarmEvaluator {
        &self.alarms
    }

    pub fn virtual_points(&self) -> &VirtualPointEvaluator {
        &self.virtual_points
    }
}

#[async_trait]
impl RuleSink for RuleEngine {
    async fn on_sample(&self, sample: Sample) {
        self.alarms.on_sample(&sample).await;
        self.virtual_points.on_dependency_changed(&sample).await;
    }
}
