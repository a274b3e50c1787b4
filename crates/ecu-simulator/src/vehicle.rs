//! Simulated vehicle
//!
//! Engine values follow a fixed drive cycle: the RPM ramps from idle to
//! 3500 rpm, holds, ramps back down and idles again. Every other gauge is
//! derived from the RPM and the time since start.

use obd_protocol::{mode, DtcCode, EngineParameter, ObdProtocol, Pid, SupportedPidBitmap};
use std::time::Duration;
use tokio::time::Instant;

const IDLE_RPM: f64 = 800.0;
const MAX_RPM: f64 = 3500.0;
const RAMP_SECS: f64 = 4.0;
const HOLD_SECS: f64 = 3.0;
const CYCLE_SECS: f64 = 2.0 * (RAMP_SECS + HOLD_SECS);

/// Coolant warm-up from ambient to operating temperature
const WARMUP_SECS: f64 = 120.0;
const AMBIENT_TEMP: f64 = 20.0;
const OPERATING_TEMP: f64 = 90.0;

#[derive(Debug, Clone)]
pub struct VehicleModel {
    started: Instant,
    pub battery_voltage: f64,
    pub vin: String,
    pub ecu_name: String,
    pub stored_dtc: Option<DtcCode>,
    pub protocol: ObdProtocol,
}

impl VehicleModel {
    pub fn new(
        battery_voltage: f64,
        vin: impl Into<String>,
        ecu_name: impl Into<String>,
        stored_dtc: Option<DtcCode>,
        protocol: ObdProtocol,
    ) -> Self {
        Self {
            started: Instant::now(),
            battery_voltage,
            vin: vin.into(),
            ecu_name: ecu_name.into(),
            stored_dtc,
            protocol,
        }
    }

    /// Time since the engine was started
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// RPM at a point in the drive cycle
    pub fn rpm_at(elapsed: Duration) -> f64 {
        let phase = elapsed.as_secs_f64() % CYCLE_SECS;
        if phase < RAMP_SECS {
            IDLE_RPM + (MAX_RPM - IDLE_RPM) * (phase / RAMP_SECS)
        } else if phase < RAMP_SECS + HOLD_SECS {
            MAX_RPM
        } else if phase < 2.0 * RAMP_SECS + HOLD_SECS {
            let ramp = phase - RAMP_SECS - HOLD_SECS;
            MAX_RPM - (MAX_RPM - IDLE_RPM) * (ramp / RAMP_SECS)
        } else {
            IDLE_RPM
        }
    }

    /// Value of `pid` at `elapsed` into the drive
    pub fn parameter_at(&self, pid: Pid, elapsed: Duration) -> EngineParameter {
        let rpm = Self::rpm_at(elapsed);
        // 0.0 at idle, 1.0 at full rpm
        let load = (rpm - IDLE_RPM) / (MAX_RPM - IDLE_RPM);
        let warmup = (elapsed.as_secs_f64() / WARMUP_SECS).min(1.0);
        let coolant = AMBIENT_TEMP + (OPERATING_TEMP - AMBIENT_TEMP) * warmup;

        match pid {
            Pid::SupportedPids => EngineParameter::SupportedPids(Self::supported_pids()),
            Pid::MonitorStatus => EngineParameter::MilStatus {
                on: self.stored_dtc.is_some(),
                dtc_count: self.stored_dtc.is_some() as u8,
            },
            Pid::Rpm => EngineParameter::EngineRpm(rpm),
            Pid::Speed => EngineParameter::VehicleSpeed(120.0 * load),
            Pid::CoolantTemp => EngineParameter::CoolantTemp(coolant),
            Pid::OilTemp => EngineParameter::OilTemp(coolant + 5.0 * warmup),
            Pid::IntakeAirTemp => EngineParameter::IntakeAirTemp(AMBIENT_TEMP + 10.0 * load),
            Pid::IntakeManifoldPressure => EngineParameter::ManifoldPressure(30.0 + 70.0 * load),
            Pid::FuelPressure => EngineParameter::FuelPressure(300.0 + 90.0 * load),
            Pid::ThrottlePosition => EngineParameter::ThrottlePosition(15.0 + 60.0 * load),
            Pid::AcceleratorPosition => EngineParameter::AcceleratorPosition(65.0 * load),
            Pid::TimingAdvance => EngineParameter::TimingAdvance(10.0 + 20.0 * load),
            Pid::FuelTankLevel => EngineParameter::FuelTankLevel(62.0),
            Pid::FuelFlowRate => EngineParameter::FuelFlowRate(0.8 + 11.2 * load),
        }
    }

    /// Raw response data bytes for `pid` right now
    pub fn data(&self, pid: Pid) -> Vec<u8> {
        self.parameter_at(pid, self.uptime()).encode_raw()
    }

    /// Mode 01 PIDs the decoder understands
    pub fn supported_pids() -> SupportedPidBitmap {
        SupportedPidBitmap::from_pids(
            mode::CURRENT_DATA,
            Pid::ALL.iter().map(|pid| pid.as_hex()),
        )
    }
}
