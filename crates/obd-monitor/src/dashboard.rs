//! Gauge state fed by session events

use data_validator::{MedianFilter, ValidationError, Validator};
use obd_protocol::{
    DescriptionStore, DtcCode, EngineParameter, EngineParameterSet, InterfaceInfo,
    InterfaceUpdate, SessionEvent, VehicleInfo,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Dashboard {
    validator: Validator,
    rpm_filter: MedianFilter,
    speed_filter: MedianFilter,
    parameters: EngineParameterSet,
    interface: InterfaceInfo,
    vin: Option<String>,
    dtcs: Vec<DtcCode>,
    descriptions: Option<Arc<dyn DescriptionStore>>,
    rejected: u64,
    errors: u64,
}

impl Dashboard {
    pub fn new(filter_window: usize) -> Result<Self, ValidationError> {
        Ok(Self {
            validator: Validator::default(),
            rpm_filter: MedianFilter::new(filter_window)?,
            speed_filter: MedianFilter::new(filter_window)?,
            parameters: EngineParameterSet::new(),
            interface: InterfaceInfo::new(),
            vin: None,
            dtcs: Vec::new(),
            descriptions: None,
            rejected: 0,
            errors: 0,
        })
    }

    pub fn with_descriptions(mut self, store: Arc<dyn DescriptionStore>) -> Self {
        self.descriptions = Some(store);
        self
    }

    pub fn parameters(&self) -> &EngineParameterSet {
        &self.parameters
    }

    pub fn dtcs(&self) -> &[DtcCode] {
        &self.dtcs
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Parameter(parameter) => self.on_parameter(parameter),
            SessionEvent::Dtc(code) => self.on_dtc(code),
            SessionEvent::VehicleInfo(VehicleInfo::Vin(vin)) => {
                info!("VIN {}", vin);
                self.vin = Some(vin);
            }
            SessionEvent::VehicleInfo(VehicleInfo::EcuName(name)) => info!("ECU {}", name),
            SessionEvent::VehicleInfo(VehicleInfo::SupportedPids(bitmap)) => {
                debug!("Mode {:02X} supports {:?}", bitmap.mode, bitmap.supported());
            }
            SessionEvent::Interface(update) => self.on_interface(update),
            SessionEvent::Error(e) => {
                self.errors += 1;
                debug!("Session error: {}", e);
            }
            SessionEvent::Ready => {}
        }
    }

    fn on_parameter(&mut self, parameter: EngineParameter) {
        if let Err(e) = self.validator.validate(&parameter) {
            warn!("Discarding reading: {}", e);
            self.rejected += 1;
            return;
        }

        let smoothed = match parameter {
            EngineParameter::EngineRpm(rpm) => EngineParameter::EngineRpm(self.rpm_filter.filter(rpm)),
            EngineParameter::VehicleSpeed(speed) => {
                EngineParameter::VehicleSpeed(self.speed_filter.filter(speed))
            }
            other => other,
        };
        self.parameters.update(&smoothed);
    }

    fn on_dtc(&mut self, code: DtcCode) {
        if self.dtcs.contains(&code) {
            return;
        }
        let text = code.to_string();
        match self.descriptions.as_ref().and_then(|d| d.describe(&text)) {
            Some(description) => warn!("Trouble code {}: {}", text, description),
            None => warn!("Trouble code {}", text),
        }
        self.dtcs.push(code);
    }

    fn on_interface(&mut self, update: InterfaceUpdate) {
        match update {
            InterfaceUpdate::BatteryVoltage(v) => self.interface.battery_voltage = Some(v),
            InterfaceUpdate::InterfaceName(name) => self.interface.interface_name = name,
            InterfaceUpdate::Protocol { number, name } => {
                self.interface.protocol_number = number;
                self.interface.protocol_name = name;
            }
            InterfaceUpdate::Acknowledged(_) => {}
        }
    }

    /// One-line gauge summary
    pub fn summary(&self) -> String {
        fn gauge(value: Option<f64>, unit: &str) -> String {
            value.map_or_else(|| "--".to_string(), |v| format!("{:.0}{}", v, unit))
        }

        let p = &self.parameters;
        format!(
            "rpm {} | speed {} | coolant {} | oil {} | fuel {} | battery {} | MIL {} | codes [{}] | rejected {} errors {}",
            gauge(p.engine_rpm, ""),
            gauge(p.vehicle_speed, "km/h"),
            gauge(p.coolant_temp, "°C"),
            gauge(p.oil_temp, "°C"),
            gauge(p.fuel_tank_level, "%"),
            self.interface
                .battery_voltage
                .map_or_else(|| "--".to_string(), |v| format!("{:.1}V", v)),
            match p.mil_on {
                Some(true) => "on",
                Some(false) => "off",
                None => "--",
            },
            self.dtcs.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", "),
            self.rejected,
            self.errors,
        )
    }
}
