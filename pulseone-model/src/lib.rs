//! Plain value types shared across the PulseOne runtime crates.
#![allow(missing_docs)]

pub mod alarm;
pub mod current_value;
pub mod device;
pub mod enums;
pub mod error;
pub mod ids;
pub mod json_doc;
pub mod point;
pub mod prelude;
pub mod virtual_point;

pub use alarm::{
    AlarmOccurrence, AlarmRule, AlarmTarget, AnalogThresholds, NotificationSettings,
};
pub use current_value::CurrentValue;
pub use device::{Device, DeviceSettings};
pub use enums::{
    AccessMode, AlarmKind, AnalogBand, DataType, DigitalTrigger, ErrorHandlingPolicy,
    ExecutionKind, OccurrenceState, ProtocolKind, Quality, Severity, StorageType, TriggerKind,
};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{
    AlarmOccurrenceId, AlarmRuleId, DataPointId, DeviceId, PointId, SiteId, TenantId,
    VirtualPointId,
};
pub use json_doc::{ContextData, EscalationRules, Metadata, ProtocolConfig, SuppressionRules, Tags};
pub use point::{Clamp, DataPoint, PointAddress, ScaledValue};
pub use virtual_point::{VirtualPoint, VirtualPointInput, VirtualPointStats};
