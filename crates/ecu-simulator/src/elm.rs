//! Simulated ELM327 interpreter settings
//!
//! Each peer gets its own settings, changed by AT commands the way a real
//! interpreter changes them.

use crate::vehicle::VehicleModel;
use obd_protocol::{AtCommand, ObdProtocol};

/// Identification banner
pub const BANNER: &str = "ELM327 v1.5";

/// CAN reply header of the engine ECU
const ECU_HEADER: &str = "7E8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElmState {
    pub echo: bool,
    pub linefeeds: bool,
    pub spaces: bool,
    pub headers: bool,
    /// Protocol selected with ATSP/ATTP
    pub protocol: ObdProtocol,
    /// Echo setting restored by ATZ
    default_echo: bool,
}

impl ElmState {
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            linefeeds: false,
            spaces: true,
            headers: false,
            protocol: ObdProtocol::Auto,
            default_echo: echo,
        }
    }

    pub fn line_ending(&self) -> &'static str {
        if self.linefeeds {
            "\r\n"
        } else {
            "\r"
        }
    }

    /// Apply an AT command and return the reply text
    pub fn apply(&mut self, command: AtCommand, vehicle: &VehicleModel) -> String {
        let ok = "OK".to_string();
        match command {
            AtCommand::Reset => {
                let protocol = self.protocol;
                *self = Self::new(self.default_echo);
                self.protocol = protocol;
                BANNER.to_string()
            }
            AtCommand::Identify => BANNER.to_string(),
            AtCommand::ReadVoltage => format!("{:.1}V", vehicle.battery_voltage),
            AtCommand::DescribeProtocol => match self.protocol {
                ObdProtocol::Auto => format!("AUTO, {}", vehicle.protocol.name()),
                selected => selected.name().to_string(),
            },
            AtCommand::DescribeProtocolNumber => match self.protocol {
                ObdProtocol::Auto => format!("A{:X}", vehicle.protocol.number()),
                selected => format!("{:X}", selected.number()),
            },
            AtCommand::SetProtocol(protocol) | AtCommand::TryProtocol(protocol) => {
                self.protocol = protocol;
                ok
            }
            AtCommand::Echo(on) => {
                self.echo = on;
                ok
            }
            AtCommand::Linefeeds(on) => {
                self.linefeeds = on;
                ok
            }
            AtCommand::Spaces(on) => {
                self.spaces = on;
                ok
            }
            AtCommand::Headers(on) => {
                self.headers = on;
                ok
            }
        }
    }

    /// Lay out an ECU reply (`41 0C 1A F8`) under the current settings
    pub fn format_ecu_reply(&self, reply: &str, vehicle: &VehicleModel) -> String {
        let mut text = reply.to_string();
        if self.headers && vehicle.protocol.is_can() {
            let len = reply.split_whitespace().count();
            text = format!("{} {:02X} {}", ECU_HEADER, len, text);
        }
        if !self.spaces {
            text.retain(|c| c != ' ');
        }
        text
    }
}
