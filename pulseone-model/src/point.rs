use crate::enums::{AccessMode, DataType};
use crate::ids::{DataPointId, DeviceId};
use crate::json_doc::{Metadata, Tags};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single readable/writable signal on a device (§3 "Data Point").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataPoint {
    pub id: DataPointId,
    pub device_id: DeviceId,
    pub address: PointAddress,
    pub data_type: DataType,
    pub access_mode: AccessMode,
    pub scaling_factor: f64,
    pub scaling_offset: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub unit: Option<String>,
    pub log_enabled: bool,
    pub log_interval_ms: u32,
    pub log_deadband: f64,
    /// Per-point polling interval overriding the device default, if set.
    pub scan_override_ms: Option<u32>,
    pub tags: Tags,
    pub metadata: Metadata,
}

/// Protocol-native address: a numeric form every driver can use directly
/// and a string form for protocols that address points by name (MQTT
/// topics, OPC UA node ids).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointAddress {
    pub numeric: u32,
    pub string: Option<String>,
}

impl DataPoint {
    pub fn is_readable(&self) -> bool {
        matches!(self.access_mode, AccessMode::Read | AccessMode::ReadWrite)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.access_mode, AccessMode::Write | AccessMode::ReadWrite)
    }

    /// Applies the engineering transform from §4.2 step 3: scaled = raw *
    /// factor + offset, clamped to [min_value, max_value]. Returns the
    /// clamped value plus whether clamping occurred, and in which
    /// direction (used by the caller to set overrange/underrange
    /// quality).
    pub fn scale(&self, raw: f64) -> ScaledValue {
        let scaled = raw * self.scaling_factor + self.scaling_offset;
        if scaled > self.max_value {
            ScaledValue {
                value: self.max_value,
                clamp: Clamp::Over,
            }
        } else if scaled < self.min_value {
            ScaledValue {
                value: self.min_value,
                clamp: Clamp::Under,
            }
        } else {
            ScaledValue {
                value: scaled,
                clamp: Clamp::None,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clamp {
    None,
    Over,
    Under,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledValue {
    pub value: f64,
    pub clamp: Clamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(min: f64, max: f64, factor: f64, offset: f64) -> DataPoint {
        DataPoint {
            id: DataPointId(1),
            device_id: DeviceId(1),
            address: PointAddress {
                numeric: 0,
                string: None,
            },
            data_type: DataType::Float32,
            access_mode: AccessMode::Read,
            scaling_factor: factor,
            scaling_offset: offset,
            min_value: min,
            max_value: max,
            unit: None,
            log_enabled: true,
            log_interval_ms: 1000,
            log_deadband: 0.0,
            scan_override_ms: None,
            tags: Tags::empty(),
            metadata: Metadata::empty(),
        }
    }

    #[test]
    fn scales_and_clamps_overrange() {
        let p = point(0.0, 100.0, 1.0, 0.0);
        let scaled = p.scale(150.0);
        assert_eq!(scaled.value, 100.0);
        assert_eq!(scaled.clamp, Clamp::Over);
    }

    #[test]
    fn scales_and_clamps_underrange() {
        let p = point(0.0, 100.0, 1.0, 0.0);
        let scaled = p.scale(-10.0);
        assert_eq!(scaled.value, 0.0);
        assert_eq!(scaled.clamp, Clamp::Under);
    }

    #[test]
    fn scales_within_range_without_clamping() {
        let p = point(0.0, 100.0, 2.0, 1.0);
        let scaled = p.scale(10.0);
        assert_eq!(scaled.value, 21.0);
        assert_eq!(scaled.clamp, Clamp::None);
    }
}
