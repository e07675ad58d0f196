use crate::driver::Driver;
use crate::error::{DriverError, DriverErrorKind};
use pulseone_model::{Device, ProtocolKind};
use std::collections::HashMap;
use std::sync::Arc;

/// A driver constructor: given a device's endpoint and protocol config,
/// produces a fresh, unconnected driver instance.
pub type DriverConstructor = Arc<dyn Fn(&Device) -> Arc<dyn Driver> + Send + Sync>;

/// Process-wide registry mapping protocol-kind to constructor closure
/// (§4.1 "Factory", §9 "Factory holds constructor closures keyed by
/// protocol-kind. No CRTP."). Registration is write-once at startup;
/// reads thereafter are lock-free (§5).
#[derive(Default)]
pub struct DriverFactory {
    constructors: HashMap<ProtocolKind, DriverConstructor>,
}

impl DriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent for identical constructors (by pointer identity),
    /// rejected for duplicates otherwise (§4.1).
    pub fn register(
        &mut self,
        kind: ProtocolKind,
        constructor: DriverConstructor,
    ) -> Result<(), DriverError> {
        match self.constructors.get(&kind) {
            None => {
                self.constructors.insert(kind, constructor);
                Ok(())
            }
            Some(existing) if Arc::ptr_eq(existing, &constructor) => Ok(()),
            Some(_) => Err(DriverError::new(
                DriverErrorKind::ConfigurationError,
                format!("a driver constructor is already registered for {kind}"),
            )),
        }
    }

    pub fn create_driver(&self, device: &Device) -> Result<Arc<dyn Driver>, DriverError> {
        let constructor = self.constructors.get(&device.protocol).ok_or_else(|| {
            DriverError::new(
                DriverErrorKind::ConfigurationError,
                format!("no driver registered for protocol {}", device.protocol),
            )
        })?;
        Ok(constructor(device))
    }

    pub fn is_registered(&self, kind: ProtocolKind) -> bool {
        self.constructors.contains_key(&kind)
    }
}

impl std::fmt::Debug for DriverFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverFactory")
            .field("registered_protocols", &self.constructors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_of_a_distinct_constructor_is_rejected() {
        let mut factory = DriverFactory::new();
        let ctor_a: DriverConstructor = Arc::new(|_: &Device| unreachable!());
        let ctor_b: DriverConstructor = Arc::new(|_: &Device| unreachable!());
        factory.register(ProtocolKind::Mqtt, ctor_a.clone()).unwrap();
        assert!(factory.register(ProtocolKind::Mqtt, ctor_a).is_ok());
        assert!(factory.register(ProtocolKind::Mqtt, ctor_b).is_err());
    }

    #[test]
    fn create_driver_for_unregistered_protocol_is_a_configuration_error() {
        let factory = DriverFactory::new();
        assert!(!factory.is_registered(ProtocolKind::OpcUa));
    }
}
