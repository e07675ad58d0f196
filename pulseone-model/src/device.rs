use crate::enums::ProtocolKind;
use crate::ids::{DeviceId, SiteId, TenantId};
use crate::json_doc::ProtocolConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-device tuning knobs (§3 "Device Settings").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSettings {
    pub polling_interval_ms: u32,
    pub connection_timeout_ms: u32,
    pub read_timeout_ms: u32,
    pub write_timeout_ms: u32,
    pub max_retry_count: u32,
    pub retry_interval_ms: u32,
    pub backoff_time_ms: u32,
    pub backoff_multiplier: f64,
    pub max_backoff_time_ms: u32,
    pub keep_alive_enabled: bool,
    pub keep_alive_interval_ms: u32,
    pub keep_alive_timeout_ms: u32,
    pub data_validation_enabled: bool,
    pub performance_monitoring_enabled: bool,
    pub diagnostic_mode: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            polling_interval_ms: 1000,
            connection_timeout_ms: 5000,
            read_timeout_ms: 3000,
            write_timeout_ms: 3000,
            max_retry_count: 3,
            retry_interval_ms: 5000,
            backoff_time_ms: 60_000,
            backoff_multiplier: 1.5,
            max_backoff_time_ms: 300_000,
            keep_alive_enabled: false,
            keep_alive_interval_ms: 30_000,
            keep_alive_timeout_ms: 5000,
            data_validation_enabled: true,
            performance_monitoring_enabled: true,
            diagnostic_mode: false,
        }
    }
}

impl DeviceSettings {
    /// Next backoff duration after `consecutive_failures` reconnect
    /// attempts beyond the initial retry budget, capped at
    /// `max_backoff_time_ms` (§8 S3).
    pub fn backoff_after(&self, rounds_beyond_retry_budget: u32) -> u32 {
        let mut backoff = self.backoff_time_ms as f64;
        for _ in 0..rounds_beyond_retry_budget {
            backoff *= self.backoff_multiplier;
        }
        backoff.min(self.max_backoff_time_ms as f64) as u32
    }
}

/// A field device reachable over one protocol at one endpoint (§3
/// "Device").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Device {
    pub id: DeviceId,
    pub tenant_id: TenantId,
    pub site_id: SiteId,
    pub name: String,
    pub protocol: ProtocolKind,
    pub endpoint: String,
    pub protocol_config: ProtocolConfig,
    pub enabled: bool,
    pub settings: DeviceSettings,
}

impl Device {
    pub fn default_port(&self) -> u16 {
        match self.protocol {
            ProtocolKind::ModbusTcp => 502,
            ProtocolKind::ModbusRtu => 0,
            ProtocolKind::Mqtt => 1883,
            ProtocolKind::BacnetIp => 47808,
            ProtocolKind::OpcUa => 4840,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_configured_maximum() {
        let settings = DeviceSettings::default();
        // §8 S3: 60_000 -> 90_000 -> 135_000 -> ... eventually capped.
        assert_eq!(settings.backoff_after(0), 60_000);
        assert_eq!(settings.backoff_after(1), 90_000);
        assert_eq!(settings.backoff_after(2), 135_000);
        assert_eq!(settings.backoff_after(20), 300_000);
    }
}
