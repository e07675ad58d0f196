//! Curated re-exports for downstream consumers.

pub use crate::alarm::{AlarmOccurrence, AlarmRule, AlarmTarget};
pub use crate::current_value::CurrentValue;
pub use crate::device::{Device, DeviceSettings};
pub use crate::enums::*;
pub use crate::error::{ModelError, Result as ModelResult};
pub use crate::ids::*;
pub use crate::point::DataPoint;
pub use crate::virtual_point::{VirtualPoint, VirtualPointStats};
