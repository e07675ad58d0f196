//! Strongly typed identifiers.
//!
//! Mirrors the teacher's newtype-over-primitive ID pattern, but over `i64`
//! rather than `Uuid`: §3 of the spec states identifiers are integers
//! unless stated otherwise.

use std::fmt;

macro_rules! int_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id!(TenantId, "Tenant identifier.");
int_id!(SiteId, "Site identifier.");
int_id!(DeviceId, "Device identifier.");
int_id!(DataPointId, "Data point identifier.");
int_id!(VirtualPointId, "Virtual point identifier.");
int_id!(AlarmRuleId, "Alarm rule identifier.");
int_id!(AlarmOccurrenceId, "Alarm occurrence identifier.");

/// A point identifier spans two disjoint namespaces that both feed the
/// pipeline: `data` points (read from the wire) and `virtual` points
/// (derived by the rule engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "id"))]
pub enum PointId {
    Data(DataPointId),
    Virtual(VirtualPointId),
}

impl PointId {
    pub fn data(id: i64) -> Self {
        PointId::Data(DataPointId(id))
    }

    pub fn virtual_(id: i64) -> Self {
        PointId::Virtual(VirtualPointId(id))
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, PointId::Virtual(_))
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Data(id) => write!(f, "data:{id}"),
            PointId::Virtual(id) => write!(f, "virtual:{id}"),
        }
    }
}
