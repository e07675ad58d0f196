//! Alarm Evaluator: analog hysteresis bands, digital triggers, and script
//! rules, driving the occurrence state machine described in §4.4.

use super::expr::Expr;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pulseone_contracts::Sample;
use pulseone_model::{
    AlarmOccurrence, AlarmRule, AlarmTarget, AnalogBand, AnalogThresholds, DigitalTrigger,
    AlarmKind, AlarmOccurrenceId, AlarmRuleId, OccurrenceState, PointId, Severity,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Durably persists alarm occurrence transitions. The concrete store lives
/// with the configuration/historical persistence layer named out of scope
/// in §1; this evaluator only owns the condition and state-machine logic.
#[async_trait::async_trait]
pub trait OccurrenceSink: Send + Sync {
    async fn persist(&self, occurrence: &AlarmOccurrence);
}

#[derive(Debug, Default)]
pub struct NullOccurrenceSink;

#[async_trait::async_trait]
impl OccurrenceSink for NullOccurrenceSink {
    async fn persist(&self, _occurrence: &AlarmOccurrence) {}
}

/// Per-(rule, target) tracked state needed to evaluate the next sample:
/// the current hysteresis band, the previous raw value/time for rate-of-
/// change and edge detection, and the live non-terminal occurrence if any.
#[derive(Debug, Clone, Default)]
struct Tracked {
    band: Option<AnalogBand>,
    previous_value: Option<f64>,
    previous_sample_time: Option<DateTime<Utc>>,
    occurrence: Option<AlarmOccurrence>,
}

/// Evaluates every configured [`AlarmRule`] against incoming samples.
///
/// Rules are indexed by target point so `on_sample` only evaluates the
/// handful of rules that actually watch the point that changed.
/// Per-(rule, target) state lives in a [`DashMap`], whose internal
/// sharding already serializes concurrent access to the same key — the
/// same property the spec asks the Live Value Cache to offer (§5) — so no
/// separate lock pool is needed here.
pub struct AlarmEvaluator {
    rules_by_point: DashMap<PointId, Vec<Arc<AlarmRule>>>,
    tracked: DashMap<(AlarmRuleId, PointId), Tracked>,
    next_occurrence_id: AtomicI64,
    sink: Arc<dyn OccurrenceSink>,
}

impl std::fmt::Debug for AlarmEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmEvaluator")
            .field("rules", &self.rules_by_point.len())
            .field("tracked", &self.tracked.len())
            .finish()
    }
}

impl AlarmEvaluator {
    pub fn new(sink: Arc<dyn OccurrenceSink>) -> Self {
        Self {
            rules_by_point: DashMap::new(),
            tracked: DashMap::new(),
            next_occurrence_id: AtomicI64::new(1),
            sink,
        }
    }

    /// Indexes one rule under its target point. Group targets aren't
    /// indexed here: group membership isn't part of this model, so a
    /// `Group` target is only reachable through `evaluate_group`.
    pub fn load_rule(&self, rule: AlarmRule) {
        if let AlarmTarget::Point(point) = rule.target {
            self.rules_by_point.entry(point).or_default().push(Arc::new(rule));
        }
    }

    pub fn load_rules(&self, rules: Vec<AlarmRule>) {
        for rule in rules {
            self.load_rule(rule);
        }
    }

    /// Evaluates every rule indexed against `sample.point`, firing,
    /// updating, or clearing occurrences as needed.
    pub async fn on_sample(&self, sample: &Sample) {
        let rules = match self.rules_by_point.get(&sample.point) {
            Some(entry) => entry.clone(),
            None => return,
        };
        for rule in rules {
            if !rule.is_enabled {
                continue;
            }
            self.evaluate_one(&rule, sample).await;
        }
    }

    async fn evaluate_one(&self, rule: &Arc<AlarmRule>, sample: &Sample) {
        let key = (rule.id, sample.point);
        let mut entry = self.tracked.entry(key).or_default();

        let decision = match rule.kind {
            AlarmKind::Analog => self.decide_analog(rule, sample, &mut entry),
            AlarmKind::Digital => self.decide_digital(rule, sample, &mut entry),
            AlarmKind::Script => self.decide_script(rule, sample, &mut entry),
        };
        entry.previous_value = Some(sample.value);
        entry.previous_sample_time = Some(sample.timestamp);

        let outcome = match decision {
            Decision::Enter(condition) => self.enter_occurrence(rule, sample, &mut entry, condition),
            Decision::Clear(value) => self.clear_occurrence(rule, &mut entry, value),
            Decision::Unchanged => None,
        };
        drop(entry);

        if let Some(occurrence) = outcome {
            self.sink.persist(&occurrence).await;
        }
    }

    fn decide_analog(&self, rule: &AlarmRule, sample: &Sample, entry: &mut Tracked) -> Decision {
        let Some(thresholds) = rule.analog else {
            return Decision::Unchanged;
        };
        let previous_band = entry.band.unwrap_or(AnalogBand::Normal);
        let new_band = classify_band(sample.value, &thresholds, previous_band);
        let rate_fired = rate_of_change_fired(&thresholds, sample, entry);
        entry.band = Some(new_band);

        let has_live_occurrence = entry.occurrence.as_ref().is_some_and(|o| o.is_non_terminal());

        if (new_band.is_alarm() || rate_fired) && !has_live_occurrence {
            return Decision::Enter(format!("{new_band:?}"));
        }
        if has_live_occurrence && new_band.is_alarm() {
            // Escalating/de-escalating within the alarm region re-renders
            // the message but doesn't open a second occurrence.
            if let Some(occ) = entry.occurrence.as_mut() {
                occ.trigger_condition = format!("{new_band:?}");
                occ.trigger_value = sample.value;
            }
            return Decision::Unchanged;
        }
        if has_live_occurrence && !new_band.is_alarm() {
            // Retried every sample while the band stays normal: a latched,
            // unacknowledged occurrence blocks the first few attempts and
            // clears on the first one after it's acknowledged.
            return Decision::Clear(sample.value);
        }
        Decision::Unchanged
    }

    fn decide_digital(&self, rule: &AlarmRule, sample: &Sample, entry: &mut Tracked) -> Decision {
        let Some(trigger) = rule.digital_trigger else {
            return Decision::Unchanged;
        };
        let current = sample.value != 0.0;
        let previous = entry.previous_value.map(|v| v != 0.0);

        let fires = match trigger {
            DigitalTrigger::OnTrue => current,
            DigitalTrigger::OnFalse => !current,
            DigitalTrigger::OnChange => previous.map(|p| p != current).unwrap_or(false),
            DigitalTrigger::OnRising => previous == Some(false) && current,
            DigitalTrigger::OnFalling => previous == Some(true) && !current,
        };
        // The inverse of the entering condition per trigger kind: the level
        // trigger's opposite level, the edge trigger's opposite edge, and
        // for OnChange (symmetric) the next change after entry.
        let clears = match trigger {
            DigitalTrigger::OnTrue => !current,
            DigitalTrigger::OnFalse => current,
            DigitalTrigger::OnChange => previous.map(|p| p != current).unwrap_or(false),
            DigitalTrigger::OnRising => previous == Some(true) && !current,
            DigitalTrigger::OnFalling => previous == Some(false) && current,
        };

        let has_live_occurrence = entry.occurrence.as_ref().map(|o| o.is_non_terminal()).unwrap_or(false);

        if has_live_occurrence {
            if clears {
                return Decision::Clear(sample.value);
            }
            return Decision::Unchanged;
        }
        if fires {
            return Decision::Enter(trigger.as_str().to_string());
        }
        Decision::Unchanged
    }

    fn decide_script(&self, rule: &AlarmRule, sample: &Sample, entry: &mut Tracked) -> Decision {
        let Some(script) = rule.condition_script.as_deref() else {
            return Decision::Unchanged;
        };
        let expr = match Expr::parse(script) {
            Ok(expr) => expr,
            Err(_) => return Decision::Unchanged,
        };
        let mut ctx = HashMap::new();
        ctx.insert("value".to_string(), sample.value);
        ctx.insert("previous".to_string(), entry.previous_value.unwrap_or(sample.value));
        let fires = expr.eval_bool(&ctx).unwrap_or(false);
        let active = entry.occurrence.as_ref().map(|o| o.is_non_terminal()).unwrap_or(false);

        match (fires, active) {
            (true, false) => Decision::Enter("script".to_string()),
            (false, true) => Decision::Clear(sample.value),
            _ => Decision::Unchanged,
        }
    }

    fn enter_occurrence(
        &self,
        rule: &AlarmRule,
        sample: &Sample,
        entry: &mut Tracked,
        condition: String,
    ) -> Option<AlarmOccurrence> {
        if entry.occurrence.as_ref().is_some_and(|o| o.is_non_terminal()) {
            return None;
        }
        let id = AlarmOccurrenceId(self.next_occurrence_id.fetch_add(1, Ordering::Relaxed));
        let message = render_message(rule, sample, &condition);
        let occurrence = AlarmOccurrence {
            id,
            rule_id: rule.id,
            tenant_id: rule.tenant_id,
            occurrence_time: sample.timestamp,
            trigger_value: sample.value,
            trigger_condition: condition,
            alarm_message: message,
            severity: rule.severity,
            state: OccurrenceState::Active,
            acknowledged_time: None,
            acknowledged_by: None,
            acknowledged_comment: None,
            cleared_time: None,
            cleared_value: None,
            cleared_comment: None,
            notification_sent: false,
            notification_time: None,
            notification_count: 0,
            notification_result: None,
            context_data: pulseone_model::ContextData::empty(),
            source_name: sample.point.to_string(),
            location: None,
        };
        entry.occurrence = Some(occurrence.clone());
        Some(occurrence)
    }

    fn clear_occurrence(&self, rule: &AlarmRule, entry: &mut Tracked, value: f64) -> Option<AlarmOccurrence> {
        let occurrence = entry.occurrence.as_mut()?;
        if !rule.auto_clear || !occurrence.can_clear(rule.is_latched) {
            return None;
        }
        occurrence.state = OccurrenceState::Cleared;
        occurrence.cleared_time = Some(Utc::now());
        occurrence.cleared_value = Some(value);
        let cleared = occurrence.clone();
        entry.occurrence = None;
        Some(cleared)
    }

    /// Acknowledges the live occurrence for (rule, target), if any.
    pub fn acknowledge(&self, rule_id: AlarmRuleId, target: PointId, by: &str, comment: Option<&str>) -> bool {
        if let Some(mut entry) = self.tracked.get_mut(&(rule_id, target)) {
            if let Some(occurrence) = entry.occurrence.as_mut() {
                if occurrence.state == OccurrenceState::Active {
                    occurrence.state = OccurrenceState::Acknowledged;
                    occurrence.acknowledged_time = Some(Utc::now());
                    occurrence.acknowledged_by = Some(by.to_string());
                    occurrence.acknowledged_comment = comment.map(|c| c.to_string());
                    return true;
                }
            }
        }
        false
    }

    pub fn active_occurrence(&self, rule_id: AlarmRuleId, target: PointId) -> Option<AlarmOccurrence> {
        self.tracked.get(&(rule_id, target)).and_then(|entry| entry.occurrence.clone())
    }
}

enum Decision {
    Enter(String),
    Clear(f64),
    Unchanged,
}

fn rate_of_change_fired(thresholds: &AnalogThresholds, sample: &Sample, entry: &Tracked) -> bool {
    if thresholds.rate_of_change <= 0.0 {
        return false;
    }
    let (Some(prev_value), Some(prev_time)) = (entry.previous_value, entry.previous_sample_time) else {
        return false;
    };
    let elapsed = (sample.timestamp - prev_time).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return false;
    }
    ((sample.value - prev_value) / elapsed).abs() >= thresholds.rate_of_change
}

/// Classifies the band a value falls into, applying hysteresis so a value
/// hovering near a threshold doesn't chatter between bands (§4.4). Leaving
/// a non-normal band back towards normal requires crossing the threshold
/// by more than `deadband`; entering one only requires reaching it.
fn classify_band(value: f64, thresholds: &AnalogThresholds, previous_band: AnalogBand) -> AnalogBand {
    match previous_band {
        AnalogBand::HighHigh => {
            let exit = thresholds.high_high.map(|hh| hh - thresholds.deadband);
            match exit {
                Some(exit) if value < exit => classify_entering(value, thresholds),
                _ => AnalogBand::HighHigh,
            }
        }
        AnalogBand::High => {
            if let Some(hh) = thresholds.high_high {
                if value >= hh {
                    return AnalogBand::HighHigh;
                }
            }
            let exit = thresholds.high.map(|h| h - thresholds.deadband);
            match exit {
                Some(exit) if value < exit => classify_entering(value, thresholds),
                _ => AnalogBand::High,
            }
        }
        AnalogBand::Low => {
            if let Some(ll) = thresholds.low_low {
                if value <= ll {
                    return AnalogBand::LowLow;
                }
            }
            let exit = thresholds.low.map(|l| l + thresholds.deadband);
            match exit {
                Some(exit) if value > exit => classify_entering(value, thresholds),
                _ => AnalogBand::Low,
            }
        }
        AnalogBand::LowLow => {
            let exit = thresholds.low_low.map(|ll| ll + thresholds.deadband);
            match exit {
                Some(exit) if value > exit => classify_entering(value, thresholds),
                _ => AnalogBand::LowLow,
            }
        }
        AnalogBand::Normal => classify_entering(value, thresholds),
    }
}

fn classify_entering(value: f64, thresholds: &AnalogThresholds) -> AnalogBand {
    if let Some(hh) = thresholds.high_high {
        if value >= hh {
            return AnalogBand::HighHigh;
        }
    }
    if let Some(h) = thresholds.high {
        if value >= h {
            return AnalogBand::High;
        }
    }
    if let Some(ll) = thresholds.low_low {
        if value <= ll {
            return AnalogBand::LowLow;
        }
    }
    if let Some(l) = thresholds.low {
        if value <= l {
            return AnalogBand::Low;
        }
    }
    AnalogBand::Normal
}

/// Renders the alarm message. `message_script` is evaluated as a template
/// too: the internal expression language in [`super::expr`] only yields
/// scalars, not strings, so it can't build message text on its own — a
/// deliberate scope limit noted in the grounding ledger rather than a
/// reason to add a second, string-capable language.
fn render_message(rule: &AlarmRule, sample: &Sample, condition: &str) -> String {
    let template = rule
        .message_script
        .as_deref()
        .or(rule.message_template.as_deref())
        .unwrap_or("{target} alarm: {condition} at {value}");
    template
        .replace("{target}", &sample.point.to_string())
        .replace("{value}", &format!("{:.3}", sample.value))
        .replace("{condition}", condition)
        .replace("{severity}", rule.severity.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseone_model::{DataPointId, Quality, SuppressionRules, NotificationSettings, TenantId};

    fn sample(value: f64) -> Sample {
        Sample {
            point: PointId::Data(DataPointId(1)),
            value,
            raw_value: value,
            quality: Quality::Good,
            timestamp: Utc::now(),
            source_device: None,
        }
    }

    fn analog_rule() -> AlarmRule {
        AlarmRule {
            id: AlarmRuleId(1),
            tenant_id: TenantId(1),
            target: AlarmTarget::Point(PointId::Data(DataPointId(1))),
            kind: AlarmKind::Analog,
            is_enabled: true,
            analog: Some(AnalogThresholds {
                high_high: None,
                high: Some(80.0),
                low: None,
                low_low: None,
                deadband: 2.0,
                rate_of_change: 0.0,
            }),
            digital_trigger: None,
            condition_script: None,
            message_script: None,
            message_template: None,
            severity: Severity::High,
            priority: 1,
            auto_acknowledge: false,
            auto_clear: true,
            is_latched: false,
            suppression_rules: SuppressionRules::empty(),
            notification: NotificationSettings::default(),
            escalation: None,
        }
    }

    #[tokio::test]
    async fn analog_hysteresis_band_resists_chatter_near_threshold() {
        let evaluator = AlarmEvaluator::new(Arc::new(NullOccurrenceSink));
        evaluator.load_rule(analog_rule());

        evaluator.on_sample(&sample(75.0)).await;
        assert!(evaluator.active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1))).is_none());

        evaluator.on_sample(&sample(81.0)).await;
        let occ = evaluator.active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1))).unwrap();
        assert_eq!(occ.state, OccurrenceState::Active);

        evaluator.on_sample(&sample(79.0)).await;
        let still_active = evaluator.active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1))).unwrap();
        assert_eq!(still_active.state, OccurrenceState::Active);

        evaluator.on_sample(&sample(77.0)).await;
        assert!(evaluator.active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1))).is_none());
    }

    #[tokio::test]
    async fn latched_rule_requires_acknowledge_before_clear() {
        let mut rule = analog_rule();
        rule.is_latched = true;
        let evaluator = AlarmEvaluator::new(Arc::new(NullOccurrenceSink));
        evaluator.load_rule(rule);

        evaluator.on_sample(&sample(81.0)).await;
        evaluator.on_sample(&sample(10.0)).await;
        let occ = evaluator
            .active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1)))
            .expect("latched occurrence stays active until acknowledged");
        assert_eq!(occ.state, OccurrenceState::Active);

        assert!(evaluator.acknowledge(AlarmRuleId(1), PointId::Data(DataPointId(1)), "operator", None));
        evaluator.on_sample(&sample(9.0)).await;
        assert!(evaluator.active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1))).is_none());
    }

    #[test]
    fn renders_message_template_placeholders() {
        let rule = analog_rule();
        let msg = render_message(&rule, &sample(81.5), "High");
        assert!(msg.contains("81.500"));
        assert!(msg.contains("High"));
    }

    fn digital_rule(trigger: DigitalTrigger) -> AlarmRule {
        let mut rule = analog_rule();
        rule.kind = AlarmKind::Digital;
        rule.analog = None;
        rule.digital_trigger = Some(trigger);
        rule
    }

    #[tokio::test]
    async fn on_false_trigger_auto_clears_once_signal_returns_true() {
        let evaluator = AlarmEvaluator::new(Arc::new(NullOccurrenceSink));
        evaluator.load_rule(digital_rule(DigitalTrigger::OnFalse));

        evaluator.on_sample(&sample(0.0)).await;
        let occ = evaluator.active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1))).unwrap();
        assert_eq!(occ.state, OccurrenceState::Active);

        evaluator.on_sample(&sample(1.0)).await;
        assert!(evaluator.active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1))).is_none());
    }

    #[tokio::test]
    async fn on_rising_trigger_auto_clears_on_falling_edge() {
        let evaluator = AlarmEvaluator::new(Arc::new(NullOccurrenceSink));
        evaluator.load_rule(digital_rule(DigitalTrigger::OnRising));

        evaluator.on_sample(&sample(0.0)).await;
        evaluator.on_sample(&sample(1.0)).await;
        let occ = evaluator.active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1))).unwrap();
        assert_eq!(occ.state, OccurrenceState::Active);

        evaluator.on_sample(&sample(0.0)).await;
        assert!(evaluator.active_occurrence(AlarmRuleId(1), PointId::Data(DataPointId(1))).is_none());
    }
}
