//! OBD-II PID Definitions and Response Parsing
//!
//! Defines the Mode 01 Parameter IDs (PIDs) understood by the decoder and
//! their decoding formulas. The formula table is the single source for both
//! directions: the decoder dispatches through it and the request encoder
//! builds its vocabulary from [`Pid::ALL`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mode 01 PIDs with a decoding formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Supported PIDs 01-20 bitmap (0x00)
    SupportedPids = 0x00,
    /// MIL status and DTC count (0x01)
    MonitorStatus = 0x01,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Fuel pressure, gauge (0x0A)
    FuelPressure = 0x0A,
    /// Intake manifold absolute pressure (0x0B)
    IntakeManifoldPressure = 0x0B,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Timing advance before TDC (0x0E)
    TimingAdvance = 0x0E,
    /// Intake air temperature (0x0F)
    IntakeAirTemp = 0x0F,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Fuel tank level input (0x2F)
    FuelTankLevel = 0x2F,
    /// Relative accelerator pedal position (0x5A)
    AcceleratorPosition = 0x5A,
    /// Engine oil temperature (0x5C)
    OilTemp = 0x5C,
    /// Engine fuel rate (0x5E)
    FuelFlowRate = 0x5E,
}

/// One row of the decoding table
struct Formula {
    pid: Pid,
    data_bytes: usize,
    decode: fn(&[u8]) -> EngineParameter,
    description: &'static str,
    unit: &'static str,
}

const FORMULAS: [Formula; 14] = [
    Formula { pid: Pid::SupportedPids, data_bytes: 4, decode: supported_pids, description: "PIDs supported [01 - 20]", unit: "" },
    Formula { pid: Pid::MonitorStatus, data_bytes: 4, decode: monitor_status, description: "MIL status and DTC count", unit: "" },
    Formula { pid: Pid::CoolantTemp, data_bytes: 1, decode: coolant_temp, description: "Engine coolant temperature", unit: "°C" },
    Formula { pid: Pid::FuelPressure, data_bytes: 1, decode: fuel_pressure, description: "Fuel pressure", unit: "kPa" },
    Formula { pid: Pid::IntakeManifoldPressure, data_bytes: 1, decode: manifold_pressure, description: "Intake manifold absolute pressure", unit: "kPa" },
    Formula { pid: Pid::Rpm, data_bytes: 2, decode: engine_rpm, description: "Engine RPM", unit: "rpm" },
    Formula { pid: Pid::Speed, data_bytes: 1, decode: vehicle_speed, description: "Vehicle speed", unit: "km/h" },
    Formula { pid: Pid::TimingAdvance, data_bytes: 1, decode: timing_advance, description: "Timing advance", unit: "°" },
    Formula { pid: Pid::IntakeAirTemp, data_bytes: 1, decode: intake_air_temp, description: "Intake air temperature", unit: "°C" },
    Formula { pid: Pid::ThrottlePosition, data_bytes: 1, decode: throttle_position, description: "Throttle position", unit: "%" },
    Formula { pid: Pid::FuelTankLevel, data_bytes: 1, decode: fuel_tank_level, description: "Fuel tank level input", unit: "%" },
    Formula { pid: Pid::AcceleratorPosition, data_bytes: 1, decode: accelerator_position, description: "Relative accelerator pedal position", unit: "%" },
    Formula { pid: Pid::OilTemp, data_bytes: 1, decode: oil_temp, description: "Engine oil temperature", unit: "°C" },
    Formula { pid: Pid::FuelFlowRate, data_bytes: 2, decode: fuel_flow_rate, description: "Engine fuel rate", unit: "L/h" },
];

// A - 40
fn offset_temp(a: u8) -> f64 {
    a as f64 - 40.0
}

// 100 / 255 * A
fn percent(a: u8) -> f64 {
    a as f64 * 100.0 / 255.0
}

// 256 * A + B
fn word(d: &[u8]) -> f64 {
    (d[0] as f64 * 256.0) + d[1] as f64
}

fn supported_pids(d: &[u8]) -> EngineParameter {
    EngineParameter::SupportedPids(SupportedPidBitmap::from_bytes(crate::mode::CURRENT_DATA, [d[0], d[1], d[2], d[3]]))
}

fn monitor_status(d: &[u8]) -> EngineParameter {
    EngineParameter::MilStatus {
        on: d[0] & 0x80 != 0,
        dtc_count: d[0] & 0x7F,
    }
}

fn coolant_temp(d: &[u8]) -> EngineParameter {
    EngineParameter::CoolantTemp(offset_temp(d[0]))
}

fn fuel_pressure(d: &[u8]) -> EngineParameter {
    EngineParameter::FuelPressure(3.0 * d[0] as f64)
}

fn manifold_pressure(d: &[u8]) -> EngineParameter {
    EngineParameter::ManifoldPressure(d[0] as f64)
}

fn engine_rpm(d: &[u8]) -> EngineParameter {
    EngineParameter::EngineRpm(word(d) / 4.0)
}

fn vehicle_speed(d: &[u8]) -> EngineParameter {
    EngineParameter::VehicleSpeed(d[0] as f64)
}

fn timing_advance(d: &[u8]) -> EngineParameter {
    EngineParameter::TimingAdvance(d[0] as f64 / 2.0 - 64.0)
}

fn intake_air_temp(d: &[u8]) -> EngineParameter {
    EngineParameter::IntakeAirTemp(offset_temp(d[0]))
}

fn throttle_position(d: &[u8]) -> EngineParameter {
    EngineParameter::ThrottlePosition(percent(d[0]))
}

fn fuel_tank_level(d: &[u8]) -> EngineParameter {
    EngineParameter::FuelTankLevel(percent(d[0]))
}

fn accelerator_position(d: &[u8]) -> EngineParameter {
    EngineParameter::AcceleratorPosition(percent(d[0]))
}

fn oil_temp(d: &[u8]) -> EngineParameter {
    EngineParameter::OilTemp(offset_temp(d[0]))
}

fn fuel_flow_rate(d: &[u8]) -> EngineParameter {
    EngineParameter::FuelFlowRate(word(d) / 20.0)
}

impl Pid {
    /// Every PID the decoder understands, in code order
    pub const ALL: [Pid; 14] = [
        Pid::SupportedPids,
        Pid::MonitorStatus,
        Pid::CoolantTemp,
        Pid::FuelPressure,
        Pid::IntakeManifoldPressure,
        Pid::Rpm,
        Pid::Speed,
        Pid::TimingAdvance,
        Pid::IntakeAirTemp,
        Pid::ThrottlePosition,
        Pid::FuelTankLevel,
        Pid::AcceleratorPosition,
        Pid::OilTemp,
        Pid::FuelFlowRate,
    ];

    /// Look up a PID by its wire code
    pub fn from_code(code: u8) -> Option<Pid> {
        Self::ALL.iter().copied().find(|pid| pid.as_hex() == code)
    }

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    fn formula(&self) -> &'static Formula {
        let idx = match self {
            Pid::SupportedPids => 0,
            Pid::MonitorStatus => 1,
            Pid::CoolantTemp => 2,
            Pid::FuelPressure => 3,
            Pid::IntakeManifoldPressure => 4,
            Pid::Rpm => 5,
            Pid::Speed => 6,
            Pid::TimingAdvance => 7,
            Pid::IntakeAirTemp => 8,
            Pid::ThrottlePosition => 9,
            Pid::FuelTankLevel => 10,
            Pid::AcceleratorPosition => 11,
            Pid::OilTemp => 12,
            Pid::FuelFlowRate => 13,
        };
        &FORMULAS[idx]
    }

    /// Get the number of response data bytes for this PID
    pub fn data_bytes(&self) -> usize {
        self.formula().data_bytes
    }

    /// Human-readable parameter name
    pub fn description(&self) -> &'static str {
        self.formula().description
    }

    /// Display unit of the decoded value (empty for bit fields)
    pub fn unit(&self) -> &'static str {
        self.formula().unit
    }

    /// Apply the formula to the response data bytes.
    ///
    /// Returns `None` when fewer than [`Pid::data_bytes`] bytes are given;
    /// extra trailing bytes are ignored.
    pub fn decode(&self, data: &[u8]) -> Option<EngineParameter> {
        let formula = self.formula();
        debug_assert_eq!(formula.pid, *self);
        if data.len() < formula.data_bytes {
            return None;
        }
        Some((formula.decode)(&data[..formula.data_bytes]))
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.as_hex())
    }
}

/// Supported-PID bitmap for one mode, decoded from 4 data bytes.
///
/// Bit 31 (MSB of the first byte) is PID 1, bit 0 is PID 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedPidBitmap {
    /// Request mode the bitmap belongs to (0x01 or 0x09)
    pub mode: u8,
    bits: u32,
}

impl SupportedPidBitmap {
    /// Build from the 4 response data bytes
    pub fn from_bytes(mode: u8, bytes: [u8; 4]) -> Self {
        Self {
            mode,
            bits: u32::from_be_bytes(bytes),
        }
    }

    /// Build from a list of supported PIDs; codes outside 1..=32 are ignored
    pub fn from_pids(mode: u8, pids: impl IntoIterator<Item = u8>) -> Self {
        let bits = pids
            .into_iter()
            .filter(|pid| (1..=32).contains(pid))
            .fold(0u32, |acc, pid| acc | 1 << (32 - pid as u32));
        Self { mode, bits }
    }

    /// Raw bitmap value
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Response data bytes for this bitmap
    pub fn to_bytes(&self) -> [u8; 4] {
        self.bits.to_be_bytes()
    }

    /// Check whether a PID in 1..=32 is flagged as supported
    pub fn is_supported(&self, pid: u8) -> bool {
        (1..=32).contains(&pid) && self.bits & (1 << (32 - pid as u32)) != 0
    }

    /// All supported PIDs in ascending order
    pub fn supported(&self) -> Vec<u8> {
        (1..=32).filter(|pid| self.is_supported(*pid)).collect()
    }
}

/// A decoded Mode 01 engine parameter.
///
/// Plain value type: callers replace their cached value with each new
/// instance rather than mutating it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "parameter", content = "value")]
pub enum EngineParameter {
    EngineRpm(f64),
    VehicleSpeed(f64),
    CoolantTemp(f64),
    IntakeAirTemp(f64),
    ManifoldPressure(f64),
    ThrottlePosition(f64),
    OilTemp(f64),
    FuelPressure(f64),
    FuelFlowRate(f64),
    FuelTankLevel(f64),
    TimingAdvance(f64),
    AcceleratorPosition(f64),
    MilStatus { on: bool, dtc_count: u8 },
    SupportedPids(SupportedPidBitmap),
}

impl EngineParameter {
    /// The PID this parameter is decoded from
    pub fn pid(&self) -> Pid {
        match self {
            EngineParameter::EngineRpm(_) => Pid::Rpm,
            EngineParameter::VehicleSpeed(_) => Pid::Speed,
            EngineParameter::CoolantTemp(_) => Pid::CoolantTemp,
            EngineParameter::IntakeAirTemp(_) => Pid::IntakeAirTemp,
            EngineParameter::ManifoldPressure(_) => Pid::IntakeManifoldPressure,
            EngineParameter::ThrottlePosition(_) => Pid::ThrottlePosition,
            EngineParameter::OilTemp(_) => Pid::OilTemp,
            EngineParameter::FuelPressure(_) => Pid::FuelPressure,
            EngineParameter::FuelFlowRate(_) => Pid::FuelFlowRate,
            EngineParameter::FuelTankLevel(_) => Pid::FuelTankLevel,
            EngineParameter::TimingAdvance(_) => Pid::TimingAdvance,
            EngineParameter::AcceleratorPosition(_) => Pid::AcceleratorPosition,
            EngineParameter::MilStatus { .. } => Pid::MonitorStatus,
            EngineParameter::SupportedPids(_) => Pid::SupportedPids,
        }
    }

    /// Numeric gauge value, `None` for bit-field parameters
    pub fn value(&self) -> Option<f64> {
        match *self {
            EngineParameter::EngineRpm(v)
            | EngineParameter::VehicleSpeed(v)
            | EngineParameter::CoolantTemp(v)
            | EngineParameter::IntakeAirTemp(v)
            | EngineParameter::ManifoldPressure(v)
            | EngineParameter::ThrottlePosition(v)
            | EngineParameter::OilTemp(v)
            | EngineParameter::FuelPressure(v)
            | EngineParameter::FuelFlowRate(v)
            | EngineParameter::FuelTankLevel(v)
            | EngineParameter::TimingAdvance(v)
            | EngineParameter::AcceleratorPosition(v) => Some(v),
            EngineParameter::MilStatus { .. } | EngineParameter::SupportedPids(_) => None,
        }
    }

    /// Inverse of the decoding formula: the raw data bytes an ECU would send.
    ///
    /// Values are rounded to the nearest raw step and clamped to the
    /// formula's range.
    pub fn encode_raw(&self) -> Vec<u8> {
        fn byte(v: f64) -> u8 {
            v.round().clamp(0.0, 255.0) as u8
        }
        fn word(v: f64) -> Vec<u8> {
            (v.round().clamp(0.0, 65535.0) as u16).to_be_bytes().to_vec()
        }

        match *self {
            EngineParameter::EngineRpm(v) => word(v * 4.0),
            EngineParameter::FuelFlowRate(v) => word(v * 20.0),
            EngineParameter::VehicleSpeed(v) | EngineParameter::ManifoldPressure(v) => vec![byte(v)],
            EngineParameter::CoolantTemp(v)
            | EngineParameter::IntakeAirTemp(v)
            | EngineParameter::OilTemp(v) => vec![byte(v + 40.0)],
            EngineParameter::ThrottlePosition(v)
            | EngineParameter::FuelTankLevel(v)
            | EngineParameter::AcceleratorPosition(v) => vec![byte(v * 255.0 / 100.0)],
            EngineParameter::FuelPressure(v) => vec![byte(v / 3.0)],
            EngineParameter::TimingAdvance(v) => vec![byte((v + 64.0) * 2.0)],
            EngineParameter::MilStatus { on, dtc_count } => {
                vec![(on as u8) << 7 | (dtc_count & 0x7F), 0x07, 0xE5, 0x00]
            }
            EngineParameter::SupportedPids(bitmap) => bitmap.to_bytes().to_vec(),
        }
    }
}

impl fmt::Display for EngineParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pid = self.pid();
        match self {
            EngineParameter::MilStatus { on, dtc_count } => {
                write!(f, "MIL {} ({} DTCs)", if *on { "on" } else { "off" }, dtc_count)
            }
            EngineParameter::SupportedPids(bitmap) => {
                write!(f, "Mode {:02X} supported PIDs {:08X}", bitmap.mode, bitmap.bits())
            }
            _ => write!(
                f,
                "{}: {:.2} {}",
                pid.description(),
                self.value().unwrap_or_default(),
                pid.unit()
            ),
        }
    }
}

/// Latest known value of every tracked parameter.
///
/// `None` means no reading has been received; callers must never read it as
/// zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineParameterSet {
    /// Timestamp of the last update (Unix ms)
    pub updated_ms: u64,
    pub engine_rpm: Option<f64>,
    pub vehicle_speed: Option<f64>,
    pub coolant_temp: Option<f64>,
    pub intake_air_temp: Option<f64>,
    pub manifold_pressure: Option<f64>,
    pub throttle_position: Option<f64>,
    pub oil_temp: Option<f64>,
    pub fuel_pressure: Option<f64>,
    pub fuel_flow_rate: Option<f64>,
    pub fuel_tank_level: Option<f64>,
    pub timing_advance: Option<f64>,
    pub accelerator_position: Option<f64>,
    /// MIL lamp on/off
    pub mil_on: Option<bool>,
    /// Stored DTC count reported with the MIL status
    pub dtc_count: Option<u8>,
    /// Mode 01 supported PIDs
    pub supported: Option<SupportedPidBitmap>,
}

impl EngineParameterSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached value for the parameter's PID
    pub fn update(&mut self, parameter: &EngineParameter) {
        self.updated_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        match *parameter {
            EngineParameter::EngineRpm(v) => self.engine_rpm = Some(v),
            EngineParameter::VehicleSpeed(v) => self.vehicle_speed = Some(v),
            EngineParameter::CoolantTemp(v) => self.coolant_temp = Some(v),
            EngineParameter::IntakeAirTemp(v) => self.intake_air_temp = Some(v),
            EngineParameter::ManifoldPressure(v) => self.manifold_pressure = Some(v),
            EngineParameter::ThrottlePosition(v) => self.throttle_position = Some(v),
            EngineParameter::OilTemp(v) => self.oil_temp = Some(v),
            EngineParameter::FuelPressure(v) => self.fuel_pressure = Some(v),
            EngineParameter::FuelFlowRate(v) => self.fuel_flow_rate = Some(v),
            EngineParameter::FuelTankLevel(v) => self.fuel_tank_level = Some(v),
            EngineParameter::TimingAdvance(v) => self.timing_advance = Some(v),
            EngineParameter::AcceleratorPosition(v) => self.accelerator_position = Some(v),
            EngineParameter::MilStatus { on, dtc_count } => {
                self.mil_on = Some(on);
                self.dtc_count = Some(dtc_count);
            }
            EngineParameter::SupportedPids(bitmap) => self.supported = Some(bitmap),
        }
    }

    /// Latest numeric value for a PID
    pub fn get(&self, pid: Pid) -> Option<f64> {
        match pid {
            Pid::Rpm => self.engine_rpm,
            Pid::Speed => self.vehicle_speed,
            Pid::CoolantTemp => self.coolant_temp,
            Pid::IntakeAirTemp => self.intake_air_temp,
            Pid::IntakeManifoldPressure => self.manifold_pressure,
            Pid::ThrottlePosition => self.throttle_position,
            Pid::OilTemp => self.oil_temp,
            Pid::FuelPressure => self.fuel_pressure,
            Pid::FuelFlowRate => self.fuel_flow_rate,
            Pid::FuelTankLevel => self.fuel_tank_level,
            Pid::TimingAdvance => self.timing_advance,
            Pid::AcceleratorPosition => self.accelerator_position,
            Pid::MonitorStatus | Pid::SupportedPids => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_pid_list() {
        for (pid, formula) in Pid::ALL.iter().zip(FORMULAS.iter()) {
            assert_eq!(*pid, formula.pid);
        }
    }

    #[test]
    fn test_every_pid_has_own_formula() {
        for pid in Pid::ALL {
            assert_eq!(pid.formula().pid, pid);
        }
    }

    #[test]
    fn test_rpm_decode() {
        // 1A F8 => (26*256 + 248) / 4 = 1726
        assert_eq!(Pid::Rpm.decode(&[0x1A, 0xF8]), Some(EngineParameter::EngineRpm(1726.0)));
    }

    #[test]
    fn test_coolant_temp_decode() {
        // 0x73 = 115, so temp = 115 - 40 = 75°C
        assert_eq!(Pid::CoolantTemp.decode(&[0x73]), Some(EngineParameter::CoolantTemp(75.0)));
    }

    #[test]
    fn test_timing_advance_decode() {
        assert_eq!(Pid::TimingAdvance.decode(&[0x00]), Some(EngineParameter::TimingAdvance(-64.0)));
        assert_eq!(Pid::TimingAdvance.decode(&[0xFF]), Some(EngineParameter::TimingAdvance(63.5)));
    }

    #[test]
    fn test_mil_status_decode() {
        assert_eq!(
            Pid::MonitorStatus.decode(&[0x81, 0x07, 0x65, 0x04]),
            Some(EngineParameter::MilStatus { on: true, dtc_count: 1 })
        );
        assert_eq!(
            Pid::MonitorStatus.decode(&[0x00, 0x00, 0x00, 0x00]),
            Some(EngineParameter::MilStatus { on: false, dtc_count: 0 })
        );
    }

    #[test]
    fn test_short_data_rejected() {
        assert_eq!(Pid::Rpm.decode(&[0x1A]), None);
        assert_eq!(Pid::SupportedPids.decode(&[0xBE, 0x1F]), None);
    }

    #[test]
    fn test_supported_bitmap_msb_is_pid_one() {
        let bitmap = SupportedPidBitmap::from_bytes(0x01, [0x80, 0x00, 0x00, 0x01]);
        assert!(bitmap.is_supported(1));
        assert!(bitmap.is_supported(32));
        assert!(!bitmap.is_supported(2));
        assert!(!bitmap.is_supported(0));
        assert!(!bitmap.is_supported(33));
        assert_eq!(bitmap.supported(), vec![1, 32]);
    }

    #[test]
    fn test_bitmap_from_pids() {
        let bitmap = SupportedPidBitmap::from_pids(0x09, [0x02, 0x0A, 0x40]);
        assert_eq!(bitmap.supported(), vec![0x02, 0x0A]);
        assert_eq!(bitmap.to_bytes(), [0x40, 0x40, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_raw_inverts_formula() {
        assert_eq!(EngineParameter::EngineRpm(1726.0).encode_raw(), vec![0x1A, 0xF8]);
        assert_eq!(EngineParameter::CoolantTemp(75.0).encode_raw(), vec![0x73]);
        assert_eq!(EngineParameter::ThrottlePosition(100.0).encode_raw(), vec![0xFF]);
        assert_eq!(EngineParameter::TimingAdvance(-64.0).encode_raw(), vec![0x00]);
        assert_eq!(EngineParameter::FuelFlowRate(3276.75).encode_raw(), vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_parameter_set_keeps_unknown_as_none() {
        let mut set = EngineParameterSet::new();
        assert_eq!(set.get(Pid::Rpm), None);

        set.update(&EngineParameter::EngineRpm(900.0));
        set.update(&EngineParameter::MilStatus { on: true, dtc_count: 2 });

        assert_eq!(set.get(Pid::Rpm), Some(900.0));
        assert_eq!(set.get(Pid::Speed), None);
        assert_eq!(set.mil_on, Some(true));
        assert_eq!(set.dtc_count, Some(2));
        assert!(set.updated_ms > 0);
    }
}
