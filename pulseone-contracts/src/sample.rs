use chrono::{DateTime, Utc};
use pulseone_model::{DeviceId, PointId, Quality};

/// One value flowing through the pipeline: (point, scaled value, raw
/// value, quality, timestamp, source device) — §4.3.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    pub point: PointId,
    pub value: f64,
    pub raw_value: f64,
    pub quality: Quality,
    pub timestamp: DateTime<Utc>,
    pub source_device: Option<DeviceId>,
}

impl Sample {
    pub fn is_good(&self) -> bool {
        matches!(self.quality, Quality::Good)
    }
}
