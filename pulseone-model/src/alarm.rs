use crate::enums::{AlarmKind, DigitalTrigger, OccurrenceState, Severity};
use crate::ids::{AlarmOccurrenceId, AlarmRuleId, PointId, TenantId};
use crate::json_doc::{ContextData, EscalationRules, SuppressionRules};
use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What an alarm rule is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "id"))]
pub enum AlarmTarget {
    Point(PointId),
    Group(i64),
}

/// Analog threshold configuration (§3 "Alarm Rule").
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalogThresholds {
    pub high_high: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub low_low: Option<f64>,
    pub deadband: f64,
    /// Per-second rate of change that additionally fires the rule; zero
    /// disables the check.
    pub rate_of_change: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NotificationSettings {
    pub enabled: bool,
    pub delay_sec: u32,
    pub repeat_interval_min: u32,
    pub channels: Vec<String>,
    pub recipients: Vec<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_sec: 0,
            repeat_interval_min: 0,
            channels: Vec::new(),
            recipients: Vec::new(),
        }
    }
}

/// One configured alarm condition over a target point or group (§3
/// "Alarm Rule").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlarmRule {
    pub id: AlarmRuleId,
    pub tenant_id: TenantId,
    pub target: AlarmTarget,
    pub kind: AlarmKind,
    pub is_enabled: bool,
    pub analog: Option<AnalogThresholds>,
    pub digital_trigger: Option<DigitalTrigger>,
    pub condition_script: Option<String>,
    pub message_script: Option<String>,
    pub message_template: Option<String>,
    pub severity: Severity,
    pub priority: i32,
    pub auto_acknowledge: bool,
    pub auto_clear: bool,
    pub is_latched: bool,
    pub suppression_rules: SuppressionRules,
    pub notification: NotificationSettings,
    pub escalation: Option<EscalationRules>,
}

/// One instance of an alarm condition being entered and eventually
/// cleared (§3 "Alarm Occurrence").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlarmOccurrence {
    pub id: AlarmOccurrenceId,
    pub rule_id: AlarmRuleId,
    pub tenant_id: TenantId,
    pub occurrence_time: DateTime<Utc>,
    pub trigger_value: f64,
    pub trigger_condition: String,
    pub alarm_message: String,
    pub severity: Severity,
    pub state: OccurrenceState,
    pub acknowledged_time: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_comment: Option<String>,
    pub cleared_time: Option<DateTime<Utc>>,
    pub cleared_value: Option<f64>,
    pub cleared_comment: Option<String>,
    pub notification_sent: bool,
    pub notification_time: Option<DateTime<Utc>>,
    pub notification_count: u32,
    pub notification_result: Option<String>,
    pub context_data: ContextData,
    pub source_name: String,
    pub location: Option<String>,
}

impl AlarmOccurrence {
    pub fn is_non_terminal(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Clear requires prior acknowledgement when the rule is latched
    /// (§4.4 occurrence state machine).
    pub fn can_clear(&self, rule_is_latched: bool) -> bool {
        if rule_is_latched {
            matches!(self.state, OccurrenceState::Acknowledged)
        } else {
            matches!(
                self.state,
                OccurrenceState::Active | OccurrenceState::Acknowledged
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occurrence(state: OccurrenceState) -> AlarmOccurrence {
        AlarmOccurrence {
            id: AlarmOccurrenceId(1),
            rule_id: AlarmRuleId(1),
            tenant_id: TenantId(1),
            occurrence_time: Utc::now(),
            trigger_value: 81.0,
            trigger_condition: "high".into(),
            alarm_message: "High alarm".into(),
            severity: Severity::High,
            state,
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
            context_data: ContextData::empty(),
            source_name: "P1".into(),
            location: None,
        }
    }

    #[test]
    fn latched_occurrence_requires_ack_before_clear() {
        let active = occurrence(OccurrenceState::Active);
        assert!(!active.can_clear(true));
        let acked = occurrence(OccurrenceState::Acknowledged);
        assert!(acked.can_clear(true));
    }

    #[test]
    fn unlatched_occurrence_clears_from_active_or_acknowledged() {
        let active = occurrence(OccurrenceState::Active);
        assert!(active.can_clear(false));
    }
}
