use crate::enums::{Quality, StorageType};
use crate::ids::PointId;
use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The latest known state of a point (§3 "Current Value").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurrentValue {
    pub point: PointId,
    pub value: f64,
    pub raw_value: f64,
    pub quality: Quality,
    pub timestamp: DateTime<Utc>,
    pub storage_type: StorageType,
    /// Deadband bookkeeping for the historian log-filter (§4.2 step 3).
    pub last_save_time: Option<DateTime<Utc>>,
    pub last_saved_value: Option<f64>,
}

impl CurrentValue {
    /// Cache key pattern from §6: `pulseone:live:<point-kind>:<point-id>`.
    pub fn cache_key(&self) -> String {
        match self.point {
            PointId::Data(id) => format!("pulseone:live:data:{}", id.0),
            PointId::Virtual(id) => format!("pulseone:live:virtual:{}", id.0),
        }
    }

    /// True if `other`'s timestamp would move this value's timestamp
    /// backwards — such samples are discarded by the cache (§4.3).
    pub fn is_stale_against(&self, incoming_timestamp: DateTime<Utc>) -> bool {
        incoming_timestamp < self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_distinguishes_data_and_virtual_points() {
        let data = CurrentValue {
            point: PointId::data(7),
            value: 1.0,
            raw_value: 1.0,
            quality: Quality::Good,
            timestamp: Utc::now(),
            storage_type: StorageType::OnChange,
            last_save_time: None,
            last_saved_value: None,
        };
        assert_eq!(data.cache_key(), "pulseone:live:data:7");

        let mut virt = data.clone();
        virt.point = PointId::virtual_(7);
        assert_eq!(virt.cache_key(), "pulseone:live:virtual:7");
    }
}
