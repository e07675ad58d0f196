//! Closed enumerations with a single canonical spelling for persistence.
//!
//! Per the §9 redesign note, an unknown spelling loaded from storage
//! becomes a typed [`ModelError::UnknownVariant`], never a silent default.

use crate::error::ModelError;
use std::fmt;
use std::str::FromStr;

macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $spelling:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $spelling),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($spelling => Ok(Self::$variant),)+
                    other => Err(ModelError::UnknownVariant {
                        field: stringify!($name),
                        spelling: other.to_string(),
                    }),
                }
            }
        }
    };
}

closed_enum! {
    /// Fieldbus/network protocol a device is reachable over.
    ProtocolKind {
        ModbusTcp => "modbus_tcp",
        ModbusRtu => "modbus_rtu",
        Mqtt => "mqtt",
        BacnetIp => "bacnet_ip",
        OpcUa => "opc_ua",
    }
}

closed_enum! {
    /// Wire-level value representation of a data point.
    DataType {
        Bool => "bool",
        Int8 => "int8",
        Int16 => "int16",
        Int32 => "int32",
        Int64 => "int64",
        Uint8 => "uint8",
        Uint16 => "uint16",
        Uint32 => "uint32",
        Uint64 => "uint64",
        Float32 => "float32",
        Float64 => "float64",
        String => "string",
        Binary => "binary",
        Timestamp => "timestamp",
    }
}

closed_enum! {
    /// Whether a point may be read, written, or both.
    AccessMode {
        Read => "read",
        Write => "write",
        ReadWrite => "read_write",
    }
}

closed_enum! {
    /// Trustworthiness tag carried by every sample.
    Quality {
        Good => "good",
        Bad => "bad",
        Uncertain => "uncertain",
        Timeout => "timeout",
        Invalid => "invalid",
        Overrange => "overrange",
        Underrange => "underrange",
        Offline => "offline",
        NotConnected => "not_connected",
    }
}

closed_enum! {
    /// Per-point policy for when a sample is pushed to cache/historian.
    StorageType {
        Immediate => "immediate",
        OnChange => "on_change",
        Periodic => "periodic",
        Buffered => "buffered",
    }
}

closed_enum! {
    /// How a virtual point's value is computed.
    ExecutionKind {
        Script => "script",
        Formula => "formula",
        Aggregate => "aggregate",
        Reference => "reference",
    }
}

closed_enum! {
    /// What causes a virtual point to be (re-)evaluated.
    TriggerKind {
        Timer => "timer",
        OnChange => "on_change",
        OnDemand => "on_demand",
        Event => "event",
    }
}

closed_enum! {
    /// What a virtual point publishes when evaluation fails.
    ErrorHandlingPolicy {
        ReturnNull => "return_null",
        ReturnLast => "return_last",
        ReturnZero => "return_zero",
        ReturnDefault => "return_default",
    }
}

closed_enum! {
    /// Alarm severity.
    Severity {
        Critical => "critical",
        High => "high",
        Medium => "medium",
        Low => "low",
        Info => "info",
    }
}

closed_enum! {
    /// Alarm occurrence lifecycle state.
    OccurrenceState {
        Active => "active",
        Acknowledged => "acknowledged",
        Cleared => "cleared",
        Suppressed => "suppressed",
        Shelved => "shelved",
    }
}

impl OccurrenceState {
    /// Terminal states admit a new occurrence for the same (rule, target).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OccurrenceState::Cleared)
    }
}

closed_enum! {
    /// Digital alarm trigger condition.
    DigitalTrigger {
        OnTrue => "on_true",
        OnFalse => "on_false",
        OnChange => "on_change",
        OnRising => "on_rising",
        OnFalling => "on_falling",
    }
}

closed_enum! {
    /// Alarm rule kind.
    AlarmKind {
        Analog => "analog",
        Digital => "digital",
        Script => "script",
    }
}

/// Ordered analog band, from the hysteresis state machine in §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AnalogBand {
    LowLow,
    Low,
    Normal,
    High,
    HighHigh,
}

impl AnalogBand {
    pub fn severity_rank(&self) -> u8 {
        match self {
            AnalogBand::Normal => 0,
            AnalogBand::Low | AnalogBand::High => 1,
            AnalogBand::LowLow | AnalogBand::HighHigh => 2,
        }
    }

    pub fn is_alarm(&self) -> bool {
        !matches!(self, AnalogBand::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_spelling() {
        assert_eq!(ProtocolKind::ModbusTcp.as_str(), "modbus_tcp");
        assert_eq!(
            ProtocolKind::from_str("modbus_tcp").unwrap(),
            ProtocolKind::ModbusTcp
        );
    }

    #[test]
    fn unknown_spelling_is_a_typed_error() {
        let err = ProtocolKind::from_str("modbus-tcp").unwrap_err();
        assert!(matches!(err, ModelError::UnknownVariant { .. }));
    }

    #[test]
    fn only_cleared_is_terminal() {
        assert!(OccurrenceState::Cleared.is_terminal());
        assert!(!OccurrenceState::Active.is_terminal());
        assert!(!OccurrenceState::Shelved.is_terminal());
    }
}
