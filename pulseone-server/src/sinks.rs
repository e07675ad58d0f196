//! Stand-in sinks for the two external collaborators named out of scope
//! in §1: the historical store and the alarm-occurrence repository. Both
//! log structurally via `tracing` rather than silently dropping, the
//! same ambient-observability stance the teacher takes around its own
//! repository boundaries.

use pulseone_contracts::Sample;
use pulseone_core::pipeline::HistorianSink;
use pulseone_model::AlarmOccurrence;
use tracing::info;

#[derive(Debug, Default)]
pub struct TracingHistorianSink;

#[async_trait::async_trait]
impl HistorianSink for TracingHistorianSink {
    async fn write_batch(&self, samples: &[Sample]) -> Result<(), String> {
        info!(count = samples.len(), "historian batch accepted");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TracingOccurrenceSink;

#[async_trait::async_trait]
impl pulseone_core::rules::OccurrenceSink for TracingOccurrenceSink {
    async fn persist(&self, occurrence: &AlarmOccurrence) {
        info!(
            rule_id = occurrence.rule_id.0,
            state = occurrence.state.as_str(),
            value = occurrence.trigger_value,
            message = %occurrence.alarm_message,
            "alarm occurrence"
        );
    }
}
