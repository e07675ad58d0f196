//! Modbus TCP and Modbus RTU (carried over a TCP serial gateway) drivers.
//!
//! Both variants share the same register-batching and value-decoding logic
//! (§4.1 "Protocol-specific batching rules... must not be visible in the
//! contract") and differ only in wire framing: Modbus TCP wraps each PDU in
//! an MBAP header; RTU appends a CRC16 to the raw PDU instead. Framing is
//! kept out of the shared path entirely so the two drivers cannot drift.

use super::common::DriverState;
use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder};
use pulseone_contracts::{
    Driver, DriverError, DriverErrorKind, DriverStatistics, LifecycleState, RawReading,
    ReadOutcome, Result, StatisticsSnapshot, WireValue,
};
use pulseone_model::{DataPoint, DataType, Device, ProtocolKind, Quality};
use std::io;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

const READ_HOLDING_REGISTERS: u8 = 0x03;
const READ_COILS: u8 = 0x01;
const WRITE_SINGLE_REGISTER: u8 = 0x06;
const WRITE_SINGLE_COIL: u8 = 0x05;

const MAX_HOLDING_REGISTERS_PER_READ: u16 = 125;
const MAX_COILS_PER_READ: u16 = 2000;
const MAX_ADDRESS_GAP: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Mbap,
    Rtu,
}

fn register_span(data_type: DataType) -> u16 {
    match data_type {
        DataType::Bool
        | DataType::Int8
        | DataType::Uint8
        | DataType::Int16
        | DataType::Uint16 => 1,
        DataType::Int32 | DataType::Uint32 | DataType::Float32 => 2,
        DataType::Int64 | DataType::Uint64 | DataType::Float64 | DataType::Timestamp => 4,
        DataType::String | DataType::Binary => 1,
    }
}

fn is_coil(data_type: DataType) -> bool {
    matches!(data_type, DataType::Bool)
}

/// One coalesced register range to fetch in a single request, grounded in
/// the gap/size-bounded batching used for Modbus polling elsewhere in the
/// retrieval pack.
struct Batch<'a> {
    function_code: u8,
    start: u16,
    count: u16,
    points: Vec<&'a DataPoint>,
}

fn coalesce<'a>(points: &'a [&'a DataPoint]) -> Vec<Batch<'a>> {
    let mut coils: Vec<&DataPoint> = points.iter().copied().filter(|p| is_coil(p.data_type)).collect();
    let mut regs: Vec<&DataPoint> = points.iter().copied().filter(|p| !is_coil(p.data_type)).collect();
    coils.sort_by_key(|p| p.address.numeric);
    regs.sort_by_key(|p| p.address.numeric);

    let mut batches = Vec::new();
    batches.extend(coalesce_group(&coils, READ_COILS, MAX_COILS_PER_READ));
    batches.extend(coalesce_group(&regs, READ_HOLDING_REGISTERS, MAX_HOLDING_REGISTERS_PER_READ));
    batches
}

fn coalesce_group<'a>(points: &[&'a DataPoint], function_code: u8, max_span: u16) -> Vec<Batch<'a>> {
    let mut batches = Vec::new();
    let mut current: Vec<&DataPoint> = Vec::new();
    let mut span_start = 0u16;
    let mut span_end = 0u16;

    for &point in points {
        let addr = point.address.numeric as u16;
        let span = register_span(point.data_type);
        let candidate_end = addr + span;

        let should_flush = !current.is_empty()
            && (addr.saturating_sub(span_end) > MAX_ADDRESS_GAP
                || candidate_end.saturating_sub(span_start) > max_span);

        if should_flush {
            batches.push(Batch {
                function_code,
                start: span_start,
                count: span_end - span_start,
                points: std::mem::take(&mut current),
            });
        }

        if current.is_empty() {
            span_start = addr;
        }
        span_end = candidate_end.max(span_end);
        current.push(point);
    }

    if !current.is_empty() {
        batches.push(Batch {
            function_code,
            start: span_start,
            count: span_end - span_start,
            points: current,
        });
    }

    batches
}

fn decode_value(registers: &[u16], data_type: DataType) -> f64 {
    let mut bytes = [0u8; 8];
    for (i, reg) in registers.iter().enumerate().take(4) {
        BigEndian::write_u16(&mut bytes[i * 2..i * 2 + 2], *reg);
    }
    match data_type {
        DataType::Bool => {
            if registers.first().copied().unwrap_or(0) != 0 {
                1.0
            } else {
                0.0
            }
        }
        DataType::Int16 => registers.first().copied().unwrap_or(0) as i16 as f64,
        DataType::Uint16 | DataType::Int8 | DataType::Uint8 => {
            registers.first().copied().unwrap_or(0) as f64
        }
        DataType::Int32 => BigEndian::read_i32(&bytes[0..4]) as f64,
        DataType::Uint32 => BigEndian::read_u32(&bytes[0..4]) as f64,
        DataType::Float32 => BigEndian::read_f32(&bytes[0..4]) as f64,
        DataType::Int64 => BigEndian::read_i64(&bytes[0..8]) as f64,
        DataType::Uint64 => BigEndian::read_u64(&bytes[0..8]) as f64,
        DataType::Float64 => BigEndian::read_f64(&bytes[0..8]),
        DataType::String | DataType::Binary | DataType::Timestamp => {
            registers.first().copied().unwrap_or(0) as f64
        }
    }
}

fn encode_value(value: WireValue, data_type: DataType) -> Result<Vec<u16>> {
    let as_registers = |bytes: &[u8]| -> Vec<u16> {
        bytes
            .chunks(2)
            .map(|chunk| BigEndian::read_u16(&[chunk[0], *chunk.get(1).unwrap_or(&0)]))
            .collect()
    };
    match (data_type, value) {
        (DataType::Bool, WireValue::Bool(b)) => Ok(vec![if b { 0xFF00 } else { 0x0000 }]),
        (DataType::Int16 | DataType::Uint16, WireValue::Int(i)) => Ok(vec![i as u16]),
        (DataType::Int32 | DataType::Uint32, WireValue::Int(i)) => {
            let mut bytes = [0u8; 4];
            BigEndian::write_i32(&mut bytes, i as i32);
            Ok(as_registers(&bytes))
        }
        (DataType::Float32, WireValue::Float(f)) => {
            let mut bytes = [0u8; 4];
            BigEndian::write_f32(&mut bytes, f as f32);
            Ok(as_registers(&bytes))
        }
        (DataType::Float64, WireValue::Float(f)) => {
            let mut bytes = [0u8; 8];
            BigEndian::write_f64(&mut bytes, f);
            Ok(as_registers(&bytes))
        }
        _ => Err(DriverError::new(
            DriverErrorKind::DataTypeMismatch,
            format!("cannot encode {value:?} as {data_type}"),
        )),
    }
}

fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn build_pdu(unit_id: u8, function_code: u8, start: u16, data: &[u16]) -> Vec<u8> {
    let mut pdu = vec![unit_id, function_code];
    pdu.extend_from_slice(&start.to_be_bytes());
    match function_code {
        READ_HOLDING_REGISTERS | READ_COILS => {
            pdu.extend_from_slice(&data[0].to_be_bytes());
        }
        WRITE_SINGLE_REGISTER | WRITE_SINGLE_COIL => {
            pdu.extend_from_slice(&data[0].to_be_bytes());
        }
        _ => {}
    }
    pdu
}

/// Shared state for both Modbus variants. Holds at most one live TCP
/// connection; reads and writes serialize on the same socket lock, which
/// also gives the "writes and reads are mutually exclusive on the driver"
/// guarantee from §4.2 for free.
pub struct ModbusDriver {
    device: Device,
    protocol: ProtocolKind,
    framing: Framing,
    unit_id: u8,
    socket: AsyncMutex<Option<TcpStream>>,
    transaction_id: AtomicU16,
    state: DriverState,
    stats: DriverStatistics,
}

impl std::fmt::Debug for ModbusDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusDriver")
            .field("device_id", &self.device.id)
            .field("protocol", &self.protocol)
            .field("unit_id", &self.unit_id)
            .finish()
    }
}

impl ModbusDriver {
    fn new(device: Device, protocol: ProtocolKind, framing: Framing) -> Self {
        let unit_id = device
            .protocol_config
            .get("slave_id")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as u8;
        Self {
            device,
            protocol,
            framing,
            unit_id,
            socket: AsyncMutex::new(None),
            transaction_id: AtomicU16::new(0),
            state: DriverState::new(),
            stats: DriverStatistics::new(),
        }
    }

    pub fn new_tcp(device: &Device) -> std::sync::Arc<dyn Driver> {
        std::sync::Arc::new(Self::new(device.clone(), ProtocolKind::ModbusTcp, Framing::Mbap))
    }

    pub fn new_rtu(device: &Device) -> std::sync::Arc<dyn Driver> {
        std::sync::Arc::new(Self::new(device.clone(), ProtocolKind::ModbusRtu, Framing::Rtu))
    }

    async fn transact(&self, pdu: Vec<u8>, response_len_hint: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let mut guard = self.socket.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "modbus socket closed"))?;

        let frame = match self.framing {
            Framing::Mbap => {
                let txid = self.transaction_id.fetch_add(1, Ordering::Relaxed);
                let mut frame = Vec::with_capacity(7 + pdu.len() - 1);
                frame.extend_from_slice(&txid.to_be_bytes());
                frame.extend_from_slice(&0u16.to_be_bytes()); // protocol id
                frame.extend_from_slice(&((pdu.len() - 1 + 1) as u16).to_be_bytes());
                frame.extend_from_slice(&pdu);
                frame
            }
            Framing::Rtu => {
                let mut frame = pdu;
                let crc = crc16_modbus(&frame);
                frame.extend_from_slice(&crc.to_le_bytes());
                frame
            }
        };

        tokio::time::timeout(timeout, stream.write_all(&frame))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "modbus write timed out"))??;

        let mut response = vec![0u8; response_len_hint.max(8)];
        let n = tokio::time::timeout(timeout, stream.read(&mut response))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "modbus read timed out"))??;
        response.truncate(n);
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "modbus socket closed by peer"));
        }
        Ok(response)
    }
}

#[async_trait]
impl Driver for ModbusDriver {
    fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    async fn initialize(&self) -> Result<()> {
        self.state.set_lifecycle(LifecycleState::Initializing);
        if self.device.endpoint.is_empty() {
            let err = DriverError::new(DriverErrorKind::ConfigurationError, "empty endpoint");
            self.state.record_error(err.clone());
            self.state.set_lifecycle(LifecycleState::Error);
            return Err(err);
        }
        self.state.set_lifecycle(LifecycleState::Initialized);
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        use pulseone_contracts::ConnectionState;
        self.state.set_connection(ConnectionState::Connecting);
        let addr = if self.device.endpoint.contains(':') {
            self.device.endpoint.clone()
        } else {
            format!("{}:{}", self.device.endpoint, self.device.default_port())
        };
        let timeout = Duration::from_millis(self.device.settings.connection_timeout_ms as u64);
        match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                *self.socket.lock().await = Some(stream);
                self.state.set_connection(ConnectionState::Connected);
                self.stats.mark_started();
                Ok(())
            }
            Ok(Err(e)) => {
                let err = DriverError::new(DriverErrorKind::ConnectionRefused, e.to_string());
                self.state.record_error(err.clone());
                self.state.set_connection(ConnectionState::Error);
                Err(err)
            }
            Err(_) => {
                let err = DriverError::new(DriverErrorKind::ConnectionTimeout, "connect timed out");
                self.state.record_error(err.clone());
                self.state.set_connection(ConnectionState::Timeout);
                Err(err)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        use pulseone_contracts::ConnectionState;
        *self.socket.lock().await = None;
        self.state.set_connection(ConnectionState::Disconnected);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.try_lock().map(|g| g.is_some()).unwrap_or(false)
    }

    async fn read_values(&self, points: &[DataPoint], timeout: Duration) -> Result<ReadOutcome> {
        let refs: Vec<&DataPoint> = points.iter().collect();
        let batches = coalesce(&refs);
        let mut by_point: std::collections::HashMap<i64, RawReading> = std::collections::HashMap::new();

        for batch in &batches {
            let start = Instant::now();
            let pdu = build_pdu(self.unit_id, batch.function_code, batch.start, &[batch.count]);
            match self.transact(pdu, 9 + batch.count as usize * 2, timeout).await {
                Ok(response) => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    self.stats.record_read(batch.points.len() as u64, elapsed_ms);
                    let registers = parse_read_response(&response, self.framing);
                    for point in &batch.points {
                        let span = register_span(point.data_type) as usize;
                        let offset = (point.address.numeric as u16 - batch.start) as usize;
                        let quality = match &registers {
                            Some(regs) if offset + span <= regs.len() => Quality::Good,
                            _ => Quality::Invalid,
                        };
                        let raw_value = registers
                            .as_ref()
                            .filter(|regs| offset + span <= regs.len())
                            .map(|regs| decode_value(&regs[offset..offset + span], point.data_type))
                            .unwrap_or(0.0);
                        by_point.insert(
                            point.id.value(),
                            RawReading {
                                point_id: point.id.value(),
                                raw_value,
                                quality,
                                timestamp: chrono::Utc::now(),
                            },
                        );
                    }
                }
                Err(e) => {
                    self.stats.record_read_failure();
                    let err = DriverError::new(DriverErrorKind::ConnectionLost, e.to_string());
                    self.state.record_error(err);
                    return Ok(ReadOutcome::TransportDown);
                }
            }
        }

        let ordered = points
            .iter()
            .map(|p| {
                by_point.get(&p.id.value()).copied().unwrap_or(RawReading {
                    point_id: p.id.value(),
                    raw_value: 0.0,
                    quality: Quality::Invalid,
                    timestamp: chrono::Utc::now(),
                })
            })
            .collect();
        Ok(ReadOutcome::Ok(ordered))
    }

    async fn write_value(&self, point: &DataPoint, value: WireValue, timeout: Duration) -> Result<()> {
        let registers = encode_value(value, point.data_type)?;
        let function_code = if is_coil(point.data_type) {
            WRITE_SINGLE_COIL
        } else {
            WRITE_SINGLE_REGISTER
        };
        let pdu = build_pdu(self.unit_id, function_code, point.address.numeric as u16, &registers);
        let start = Instant::now();
        match self.transact(pdu, 8, timeout).await {
            Ok(_) => {
                self.stats.record_write(start.elapsed().as_millis() as u64);
                Ok(())
            }
            Err(e) => {
                self.stats.record_write_failure();
                let err = DriverError::new(DriverErrorKind::ConnectionLost, e.to_string());
                self.state.record_error(err.clone());
                Err(err)
            }
        }
    }

    fn lifecycle_state(&self) -> LifecycleState {
        self.state.lifecycle()
    }

    fn connection_state(&self) -> pulseone_contracts::ConnectionState {
        self.state.connection()
    }

    fn last_error(&self) -> Option<DriverError> {
        self.state.last_error()
    }

    fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }

    async fn start(&self) -> Result<()> {
        if !self.state.lifecycle().can_start() {
            return Err(DriverError::new(
                DriverErrorKind::ConfigurationError,
                format!("cannot start from {:?}", self.state.lifecycle()),
            ));
        }
        self.state.set_lifecycle(LifecycleState::Starting);
        self.state.set_lifecycle(LifecycleState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.state.lifecycle().can_stop() {
            return Ok(());
        }
        self.state.set_lifecycle(LifecycleState::Stopping);
        let _ = self.disconnect().await;
        self.state.set_lifecycle(LifecycleState::Stopped);
        Ok(())
    }
}

fn parse_read_response(response: &[u8], framing: Framing) -> Option<Vec<u16>> {
    let payload = match framing {
        Framing::Mbap => response.get(9..)?,
        Framing::Rtu => {
            if response.len() < 5 {
                return None;
            }
            let byte_count = response[2] as usize;
            response.get(3..3 + byte_count)?
        }
    };
    let byte_count = match framing {
        Framing::Mbap => *response.get(8)? as usize,
        Framing::Rtu => payload.len(),
    };
    let data = match framing {
        Framing::Mbap => response.get(9..9 + byte_count)?,
        Framing::Rtu => payload,
    };
    Some(
        data.chunks(2)
            .map(|c| BigEndian::read_u16(&[c[0], *c.get(1).unwrap_or(&0)]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseone_model::{AccessMode, DataPointId, DeviceId, PointAddress};

    fn point(id: i64, addr: u32, data_type: DataType) -> DataPoint {
        DataPoint {
            id: DataPointId(id),
            device_id: DeviceId(1),
            address: PointAddress { numeric: addr, string: None },
            data_type,
            access_mode: AccessMode::Read,
            scaling_factor: 1.0,
            scaling_offset: 0.0,
            min_value: f64::MIN,
            max_value: f64::MAX,
            unit: None,
            log_enabled: true,
            log_interval_ms: 1000,
            log_deadband: 0.0,
            scan_override_ms: None,
            tags: pulseone_model::Tags::empty(),
            metadata: pulseone_model::Metadata::empty(),
        }
    }

    #[test]
    fn coalesces_contiguous_holding_registers_into_one_batch() {
        let points = vec![
            point(1, 100, DataType::Uint16),
            point(2, 101, DataType::Uint16),
            point(3, 102, DataType::Uint16),
        ];
        let refs: Vec<&DataPoint> = points.iter().collect();
        let batches = coalesce(&refs);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].count, 3);
    }

    #[test]
    fn splits_batch_on_gap_beyond_tolerance() {
        let points = vec![point(1, 100, DataType::Uint16), point(2, 200, DataType::Uint16)];
        let refs: Vec<&DataPoint> = points.iter().collect();
        let batches = coalesce(&refs);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn coils_and_registers_batch_separately() {
        let points = vec![point(1, 0, DataType::Bool), point(2, 100, DataType::Uint16)];
        let refs: Vec<&DataPoint> = points.iter().collect();
        let batches = coalesce(&refs);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().any(|b| b.function_code == READ_COILS));
        assert!(batches.iter().any(|b| b.function_code == READ_HOLDING_REGISTERS));
    }

    #[test]
    fn decodes_big_endian_float32_across_two_registers() {
        let mut bytes = [0u8; 4];
        BigEndian::write_f32(&mut bytes, 3.5);
        let regs = [BigEndian::read_u16(&bytes[0..2]), BigEndian::read_u16(&bytes[2..4])];
        assert_eq!(decode_value(&regs, DataType::Float32), 3.5);
    }

    #[test]
    fn crc16_matches_known_vector() {
        // Read-holding-registers request to unit 1, addr 0, count 10 — a
        // commonly cited Modbus CRC worked example (0x01 0x03 0x00 0x00 0x00 0x0A).
        let frame = [0x01u8, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16_modbus(&frame), 0xCDC5);
    }
}
