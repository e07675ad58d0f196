//! Boot-time device fleet. The configuration-persistence layer that would
//! normally supply devices/points/rules is an external collaborator out
//! of scope here (§1); this module stands in for it with a fixed fleet,
//! the same role a demo-mode seed plays opposite a real repository.

use pulseone_model::{
    AccessMode, AlarmKind, AlarmRule, AlarmRuleId, AlarmTarget, AnalogThresholds, DataPoint,
    DataPointId, DataType, Device, DeviceId, DeviceSettings, ErrorHandlingPolicy, ExecutionKind,
    Metadata, NotificationSettings, PointAddress, PointId, ProtocolKind, SiteId, SuppressionRules,
    Tags, TenantId, TriggerKind, VirtualPoint, VirtualPointId, VirtualPointInput,
};

pub struct Fleet {
    pub devices: Vec<Device>,
    pub points_by_device: Vec<(DeviceId, Vec<DataPoint>)>,
    pub alarm_rules: Vec<AlarmRule>,
    pub virtual_points: Vec<VirtualPoint>,
}

/// One Modbus TCP boiler-room device with a temperature and a pressure
/// point, an analog high/high-high alarm on temperature, and a virtual
/// point summing both into a combined load reading.
pub fn default_fleet() -> Fleet {
    let device_id = DeviceId(1);
    let tenant_id = TenantId(1);
    let site_id = SiteId(1);

    let device = Device {
        id: device_id,
        tenant_id,
        site_id,
        name: "boiler-room-plc".to_string(),
        protocol: ProtocolKind::ModbusTcp,
        endpoint: "127.0.0.1:502".to_string(),
        protocol_config: pulseone_model::ProtocolConfig::empty(),
        enabled: true,
        settings: DeviceSettings::default(),
    };

    let temperature = DataPoint {
        id: DataPointId(1),
        device_id,
        address: PointAddress { numeric: 40001, string: None },
        data_type: DataType::Float32,
        access_mode: AccessMode::Read,
        scaling_factor: 0.1,
        scaling_offset: 0.0,
        min_value: -40.0,
        max_value: 150.0,
        unit: Some("celsius".to_string()),
        log_enabled: true,
        log_interval_ms: 60_000,
        log_deadband: 0.5,
        scan_override_ms: None,
        tags: Tags::empty(),
        metadata: Metadata::empty(),
    };

    let pressure = DataPoint {
        id: DataPointId(2),
        device_id,
        address: PointAddress { numeric: 40002, string: None },
        data_type: DataType::Float32,
        access_mode: AccessMode::Read,
        scaling_factor: 0.01,
        scaling_offset: 0.0,
        min_value: 0.0,
        max_value: 50.0,
        unit: Some("bar".to_string()),
        log_enabled: true,
        log_interval_ms: 60_000,
        log_deadband: 0.1,
        scan_override_ms: None,
        tags: Tags::empty(),
        metadata: Metadata::empty(),
    };

    let alarm_rule = AlarmRule {
        id: AlarmRuleId(1),
        tenant_id,
        target: AlarmTarget::Point(PointId::Data(temperature.id)),
        kind: AlarmKind::Analog,
        is_enabled: true,
        analog: Some(AnalogThresholds {
            high_high: Some(95.0),
            high: Some(85.0),
            low: None,
            low_low: None,
            deadband: 2.0,
            rate_of_change: 0.0,
        }),
        digital_trigger: None,
        condition_script: None,
        message_script: None,
        message_template: Some("Boiler temperature {value} at {tenant_id}".to_string()),
        severity: pulseone_model::Severity::High,
        priority: 10,
        auto_acknowledge: false,
        auto_clear: true,
        is_latched: false,
        suppression_rules: SuppressionRules::empty(),
        notification: NotificationSettings::default(),
        escalation: None,
    };

    let virtual_point = VirtualPoint {
        id: VirtualPointId(1),
        tenant_id,
        site_id: Some(site_id),
        device_id: Some(device_id),
        formula: "sum".to_string(),
        execution_kind: ExecutionKind::Aggregate,
        trigger_kind: TriggerKind::OnChange,
        calculation_interval_ms: 0,
        inputs: vec![
            VirtualPointInput { name: "temperature".to_string(), point: PointId::Data(temperature.id) },
            VirtualPointInput { name: "pressure".to_string(), point: PointId::Data(pressure.id) },
        ],
        dependencies: vec![PointId::Data(temperature.id), PointId::Data(pressure.id)],
        cache_duration_ms: 0,
        error_handling: ErrorHandlingPolicy::ReturnLast,
        default_value: Some(0.0),
    };

    Fleet {
        devices: vec![device],
        points_by_device: vec![(device_id, vec![temperature, pressure])],
        alarm_rules: vec![alarm_rule],
        virtual_points: vec![virtual_point],
    }
}
