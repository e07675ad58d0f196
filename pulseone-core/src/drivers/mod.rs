//! Concrete protocol driver implementations and the factory wiring that
//! registers each under its [`ProtocolKind`] (§4.1 "Factory").

mod bacnet;
mod common;
mod modbus;
mod mqtt;
mod opcua;

pub use bacnet::BacnetIpDriver;
pub use modbus::ModbusDriver;
pub use mqtt::MqttDriver;
pub use opcua::OpcUaDriver;

use pulseone_contracts::DriverFactory;
use pulseone_model::ProtocolKind;
use std::sync::Arc;

/// Builds a [`DriverFactory`] with all five built-in drivers registered.
/// Registration is write-once at startup per §5; the returned factory is
/// read-only from then on.
pub fn built_in_factory() -> DriverFactory {
    let mut factory = DriverFactory::new();
    factory
        .register(ProtocolKind::ModbusTcp, Arc::new(modbus::ModbusDriver::new_tcp))
        .expect("built-in registration cannot conflict");
    factory
        .register(ProtocolKind::ModbusRtu, Arc::new(modbus::ModbusDriver::new_rtu))
        .expect("built-in registration cannot conflict");
    factory
        .register(ProtocolKind::Mqtt, Arc::new(mqtt::MqttDriver::new))
        .expect("built-in registration cannot conflict");
    factory
        .register(ProtocolKind::BacnetIp, Arc::new(bacnet::BacnetIpDriver::new))
        .expect("built-in registration cannot conflict");
    factory
        .register(ProtocolKind::OpcUa, Arc::new(opcua::OpcUaDriver::new))
        .expect("built-in registration cannot conflict");
    factory
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_factory_registers_all_five_protocols() {
        let factory = built_in_factory();
        assert!(factory.is_registered(ProtocolKind::ModbusTcp));
        assert!(factory.is_registered(ProtocolKind::ModbusRtu));
        assert!(factory.is_registered(ProtocolKind::Mqtt));
        assert!(factory.is_registered(ProtocolKind::BacnetIp));
        assert!(factory.is_registered(ProtocolKind::OpcUa));
    }
}
