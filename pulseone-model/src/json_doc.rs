//! Structured sub-types for the JSON blobs entities carry.
//!
//! Per the §9 redesign note, these are explicit newtypes around
//! [`serde_json::Value`] rather than bare strings: each parses the
//! fields the runtime actually interprets (if any) while preserving the
//! rest of the document verbatim on round-trip. Most of these are opaque
//! to the runtime per §6 and are carried through unread.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use serde_json::Value;

macro_rules! opaque_doc {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub Value);

        impl $name {
            pub fn empty() -> Self {
                Self(Value::Object(Default::default()))
            }

            pub fn as_value(&self) -> &Value {
                &self.0
            }

            pub fn get(&self, key: &str) -> Option<&Value> {
                self.0.get(key)
            }
        }

        impl From<Value> for $name {
            fn from(value: Value) -> Self {
                Self(value)
            }
        }
    };
}

opaque_doc!(
    /// Protocol-specific connection parameters (e.g. Modbus slave id,
    /// MQTT client id, OPC UA security policy). Parsed per driver.
    ProtocolConfig
);
opaque_doc!(
    /// Opaque suppression-rule document matched against alarm context.
    SuppressionRules
);
opaque_doc!(
    /// Escalation level/delay document for an alarm rule.
    EscalationRules
);
opaque_doc!(
    /// Free-form point tags.
    Tags
);
opaque_doc!(
    /// Free-form point metadata.
    Metadata
);
opaque_doc!(
    /// Alarm-occurrence context snapshot (target name, location, extra
    /// fields captured at trigger time).
    ContextData
);
