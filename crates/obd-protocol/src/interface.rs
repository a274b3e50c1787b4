//! Interface (AT command) Response Decoding
//!
//! Accumulates what the interpreter reports about itself across successive
//! AT replies: battery voltage, identification banner and the active
//! protocol.

use crate::classifier::InterfaceResponse;
use crate::error::DecodeError;
use crate::framer::PLACEHOLDER;
use crate::protocol::ObdProtocol;
use serde::{Deserialize, Serialize};

/// Interpreter state, updated one field per AT reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// Protocol table index (0-12)
    pub protocol_number: Option<u8>,
    /// Protocol name as last reported
    pub protocol_name: String,
    /// Identification banner (`ATI`/`ATZ`)
    pub interface_name: String,
    /// Battery voltage from `ATRV`
    pub battery_voltage: Option<f64>,
}

impl InterfaceInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active protocol, when its number is known
    pub fn protocol(&self) -> Option<ObdProtocol> {
        self.protocol_number.map(ObdProtocol::from_number)
    }
}

/// The field a decoded AT reply changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterfaceUpdate {
    BatteryVoltage(f64),
    InterfaceName(String),
    Protocol { number: Option<u8>, name: String },
    /// Command accepted with `OK`; nothing changed
    Acknowledged(String),
}

/// Recognised reply prefixes, longest first
const PREFIXES: [&str; 7] = ["ATDPN", "ATRV", "ATDP", "ATSP", "ATTP", "ATZ", "ATI"];

pub struct InterfaceResponseDecoder;

impl InterfaceResponseDecoder {
    /// Decode one AT reply into `state`.
    ///
    /// Unrecognised replies leave `state` untouched.
    pub fn decode(
        msg: &InterfaceResponse,
        state: &mut InterfaceInfo,
    ) -> Result<InterfaceUpdate, DecodeError> {
        let normalized = msg.text().replace(PLACEHOLDER as char, " ");
        let normalized = normalized.trim();
        let unrecognized = || DecodeError::UnrecognizedInterfaceMessage(normalized.to_string());

        let (head, payload) = match normalized.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (normalized, ""),
        };
        let head = head.to_ascii_uppercase();
        if !head.starts_with("AT") {
            return Err(unrecognized());
        }

        let matched = PREFIXES
            .iter()
            .find(|prefix| head.starts_with(**prefix))
            .map(|prefix| (*prefix, &head[prefix.len()..]));

        match matched {
            Some(("ATRV", "")) => {
                let value = payload.trim_end_matches(['V', 'v']).trim();
                let voltage: f64 = value
                    .parse()
                    .map_err(|_| DecodeError::MalformedPayload(normalized.to_string()))?;
                state.battery_voltage = Some(voltage);
                Ok(InterfaceUpdate::BatteryVoltage(voltage))
            }
            Some(("ATI", "")) | Some(("ATZ", "")) if !payload.is_empty() => {
                state.interface_name = payload.to_string();
                Ok(InterfaceUpdate::InterfaceName(state.interface_name.clone()))
            }
            Some(("ATDP", "")) if !payload.is_empty() => {
                if let Some(number) = parse_selector(payload) {
                    return Ok(set_protocol(state, number));
                }
                state.protocol_name = payload.to_string();
                Ok(InterfaceUpdate::Protocol {
                    number: state.protocol_number,
                    name: state.protocol_name.clone(),
                })
            }
            Some(("ATDPN", "")) => {
                let selector = payload.strip_prefix(['A', 'a']).unwrap_or(payload);
                let number = parse_selector(selector)
                    .ok_or_else(|| DecodeError::MalformedPayload(normalized.to_string()))?;
                Ok(set_protocol(state, number))
            }
            Some(("ATSP", arg)) | Some(("ATTP", arg)) => {
                let selector = if arg.is_empty() {
                    payload.split_whitespace().next().unwrap_or("")
                } else {
                    arg
                };
                match parse_selector(selector) {
                    Some(number) => Ok(set_protocol(state, number)),
                    None if payload.eq_ignore_ascii_case("OK") => Ok(InterfaceUpdate::Acknowledged(head.clone())),
                    None => Err(unrecognized()),
                }
            }
            _ if payload.eq_ignore_ascii_case("OK") => Ok(InterfaceUpdate::Acknowledged(head.clone())),
            _ => Err(unrecognized()),
        }
    }
}

/// Protocol selector of up to two hex digits
fn parse_selector(text: &str) -> Option<u8> {
    if text.is_empty() || text.len() > 2 || !text.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(text, 16).ok()
}

fn set_protocol(state: &mut InterfaceInfo, number: u8) -> InterfaceUpdate {
    let protocol = ObdProtocol::from_number(number);
    state.protocol_number = Some(protocol.number());
    state.protocol_name = protocol.name().to_string();
    InterfaceUpdate::Protocol {
        number: state.protocol_number,
        name: state.protocol_name.clone(),
    }
}
