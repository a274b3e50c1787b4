//! Request Encoding
//!
//! Builds the exact wire text for ECU queries and AT commands, and parses
//! request text back into symbolic form.

use crate::error::DecodeError;
use crate::mode;
use crate::pid::Pid;
use crate::protocol::ObdProtocol;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Line terminator used by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminator {
    /// Carriage return (ELM327 default)
    #[default]
    Cr,
    Lf,
    CrLf,
}

impl Terminator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Terminator::Cr => "\r",
            Terminator::Lf => "\n",
            Terminator::CrLf => "\r\n",
        }
    }

    /// Whether the byte ends a message under this terminator
    pub fn is_boundary(&self, byte: u8) -> bool {
        match self {
            Terminator::Cr => byte == b'\r',
            Terminator::Lf => byte == b'\n',
            Terminator::CrLf => byte == b'\r' || byte == b'\n',
        }
    }
}

/// Mode 09 information PIDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InfoPid {
    /// Supported Mode 09 PIDs bitmap
    SupportedPids = 0x00,
    /// Vehicle identification number
    Vin = 0x02,
    /// ECU name
    EcuName = 0x0A,
}

impl InfoPid {
    pub const ALL: [InfoPid; 3] = [InfoPid::SupportedPids, InfoPid::Vin, InfoPid::EcuName];

    pub fn from_code(code: u8) -> Option<InfoPid> {
        Self::ALL.iter().copied().find(|pid| *pid as u8 == code)
    }

    pub fn as_hex(&self) -> u8 {
        *self as u8
    }
}

/// Interpreter configuration commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtCommand {
    /// `ATZ` full reset
    Reset,
    /// `ATI` interpreter identification
    Identify,
    /// `ATRV` battery voltage
    ReadVoltage,
    /// `ATDP` current protocol name
    DescribeProtocol,
    /// `ATDPN` current protocol number
    DescribeProtocolNumber,
    /// `ATSP n` set protocol and save it
    SetProtocol(ObdProtocol),
    /// `ATTP n` try protocol
    TryProtocol(ObdProtocol),
    /// `ATE0`/`ATE1`
    Echo(bool),
    /// `ATL0`/`ATL1`
    Linefeeds(bool),
    /// `ATS0`/`ATS1`
    Spaces(bool),
    /// `ATH0`/`ATH1`
    Headers(bool),
}

impl AtCommand {
    /// Command text without terminator, e.g. `ATSP6`
    pub fn text(&self) -> String {
        let flag = |on: bool| if on { '1' } else { '0' };
        match *self {
            AtCommand::Reset => "ATZ".to_string(),
            AtCommand::Identify => "ATI".to_string(),
            AtCommand::ReadVoltage => "ATRV".to_string(),
            AtCommand::DescribeProtocol => "ATDP".to_string(),
            AtCommand::DescribeProtocolNumber => "ATDPN".to_string(),
            AtCommand::SetProtocol(p) => format!("ATSP{:X}", p.number()),
            AtCommand::TryProtocol(p) => format!("ATTP{:X}", p.number()),
            AtCommand::Echo(on) => format!("ATE{}", flag(on)),
            AtCommand::Linefeeds(on) => format!("ATL{}", flag(on)),
            AtCommand::Spaces(on) => format!("ATS{}", flag(on)),
            AtCommand::Headers(on) => format!("ATH{}", flag(on)),
        }
    }

    fn parse_compact(body: &str) -> Option<AtCommand> {
        let flag = |arg: &str| match arg {
            "0" => Some(false),
            "1" => Some(true),
            _ => None,
        };
        let protocol = |arg: &str| {
            if arg.is_empty() || arg.len() > 2 || !arg.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            u8::from_str_radix(arg, 16)
                .ok()
                .and_then(ObdProtocol::try_from_number)
        };

        match body {
            "Z" => Some(AtCommand::Reset),
            "I" => Some(AtCommand::Identify),
            "RV" => Some(AtCommand::ReadVoltage),
            "DP" => Some(AtCommand::DescribeProtocol),
            "DPN" => Some(AtCommand::DescribeProtocolNumber),
            _ => {
                if let Some(arg) = body.strip_prefix("SP") {
                    protocol(arg).map(AtCommand::SetProtocol)
                } else if let Some(arg) = body.strip_prefix("TP") {
                    protocol(arg).map(AtCommand::TryProtocol)
                } else if let Some(arg) = body.strip_prefix('E') {
                    flag(arg).map(AtCommand::Echo)
                } else if let Some(arg) = body.strip_prefix('L') {
                    flag(arg).map(AtCommand::Linefeeds)
                } else if let Some(arg) = body.strip_prefix('S') {
                    flag(arg).map(AtCommand::Spaces)
                } else if let Some(arg) = body.strip_prefix('H') {
                    flag(arg).map(AtCommand::Headers)
                } else {
                    None
                }
            }
        }
    }
}

/// A symbolic request to the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObdRequest {
    /// Mode 01 live data
    CurrentData(Pid),
    /// Mode 03 stored trouble codes
    StoredDtcs,
    /// Mode 09 vehicle information
    VehicleInfo(InfoPid),
    /// Interpreter command
    At(AtCommand),
}

impl ObdRequest {
    /// Request text without terminator (`01 0C`, `03`, `ATRV`)
    pub fn text(&self) -> String {
        match self {
            ObdRequest::CurrentData(pid) => {
                format!("{:02X} {:02X}", mode::CURRENT_DATA, pid.as_hex())
            }
            ObdRequest::StoredDtcs => format!("{:02X}", mode::READ_DTC),
            ObdRequest::VehicleInfo(pid) => {
                format!("{:02X} {:02X}", mode::VEHICLE_INFO, pid.as_hex())
            }
            ObdRequest::At(cmd) => cmd.text(),
        }
    }

    pub fn is_at(&self) -> bool {
        matches!(self, ObdRequest::At(_))
    }

    /// Request mode, `None` for AT commands
    pub fn mode(&self) -> Option<u8> {
        match self {
            ObdRequest::CurrentData(_) => Some(mode::CURRENT_DATA),
            ObdRequest::StoredDtcs => Some(mode::READ_DTC),
            ObdRequest::VehicleInfo(_) => Some(mode::VEHICLE_INFO),
            ObdRequest::At(_) => None,
        }
    }

    /// Parse request text, case-insensitive with optional spaces.
    ///
    /// Accepts exactly the vocabulary [`ObdRequest::text`] produces.
    pub fn parse(text: &str) -> Result<ObdRequest, DecodeError> {
        let compact: String = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if compact.is_empty() {
            return Err(DecodeError::MalformedPayload("empty request".to_string()));
        }

        if let Some(body) = compact.strip_prefix("AT") {
            return AtCommand::parse_compact(body)
                .map(ObdRequest::At)
                .ok_or_else(|| DecodeError::MalformedPayload(format!("unknown AT command: {}", text.trim())));
        }

        let bytes = parse_hex_compact(&compact)?;
        match bytes.as_slice() {
            [mode::READ_DTC] => Ok(ObdRequest::StoredDtcs),
            [mode::CURRENT_DATA, pid] => Pid::from_code(*pid)
                .map(ObdRequest::CurrentData)
                .ok_or(DecodeError::UnsupportedPid(*pid)),
            [mode::VEHICLE_INFO, pid] => InfoPid::from_code(*pid)
                .map(ObdRequest::VehicleInfo)
                .ok_or(DecodeError::UnsupportedPid(*pid)),
            [other, ..] => Err(DecodeError::UnsupportedMode(*other)),
            [] => Err(DecodeError::MalformedPayload(text.to_string())),
        }
    }
}

impl fmt::Display for ObdRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl From<Pid> for ObdRequest {
    fn from(pid: Pid) -> Self {
        ObdRequest::CurrentData(pid)
    }
}

impl From<AtCommand> for ObdRequest {
    fn from(cmd: AtCommand) -> Self {
        ObdRequest::At(cmd)
    }
}

fn parse_hex_compact(compact: &str) -> Result<Vec<u8>, DecodeError> {
    if compact.len() % 2 != 0 || !compact.is_ascii() {
        return Err(DecodeError::MalformedPayload(compact.to_string()));
    }
    (0..compact.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&compact[i..i + 2], 16)
                .map_err(|_| DecodeError::MalformedPayload(compact.to_string()))
        })
        .collect()
}

/// Encodes requests with the interpreter's terminator
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestEncoder {
    terminator: Terminator,
}

impl RequestEncoder {
    pub fn new(terminator: Terminator) -> Self {
        Self { terminator }
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    /// Exact wire string for a request, e.g. `"01 0C\r"`
    pub fn encode(&self, request: ObdRequest) -> String {
        let mut wire = request.text();
        wire.push_str(self.terminator.as_str());
        wire
    }
}

/// ECU reply text for a request mode, e.g. `encode_response(0x01, 0x0C, &[0x1A, 0xF8])`
/// gives `"41 0C 1A F8"`.
pub fn encode_response(request_mode: u8, pid: u8, data: &[u8]) -> String {
    let mut text = format!("{:02X} {:02X}", request_mode.wrapping_add(mode::RESPONSE_OFFSET), pid);
    for byte in data {
        text.push_str(&format!(" {:02X}", byte));
    }
    text
}
