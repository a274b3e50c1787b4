//! ECU Response Decoding
//!
//! Parses the `4x PP` header of an ECU reply and dispatches the data bytes
//! through the PID formula table (Mode 01), the trouble code decoder
//! (Mode 03) or the vehicle information rules (Mode 09).

use crate::classifier::EcuResponse;
use crate::dtc::{DtcCode, DtcDecoder};
use crate::encoder::InfoPid;
use crate::error::DecodeError;
use crate::framer::PLACEHOLDER;
use crate::mode;
use crate::pid::{EngineParameter, Pid, SupportedPidBitmap};
use serde::{Deserialize, Serialize};

/// Request mode recovered from a response mode echo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    CurrentData,
    StoredDtcs,
    VehicleInfo,
    Unknown(u8),
}

impl Mode {
    /// Map a response mode echo (`0x41`, `0x43`, `0x49`) to its mode
    pub fn from_echo(echo: u8) -> Self {
        match echo.wrapping_sub(mode::RESPONSE_OFFSET) {
            mode::CURRENT_DATA => Mode::CurrentData,
            mode::READ_DTC => Mode::StoredDtcs,
            mode::VEHICLE_INFO => Mode::VehicleInfo,
            _ => Mode::Unknown(echo),
        }
    }
}

/// First two bytes of an ECU reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeader {
    pub mode: Mode,
    /// PID for Modes 01/09, code count for Mode 03
    pub pid: u8,
}

impl ParsedHeader {
    pub fn parse(msg: &EcuResponse) -> Result<Self, DecodeError> {
        let bytes = parse_hex_tokens(msg.text())?;
        Self::from_bytes(&bytes).ok_or_else(|| DecodeError::MalformedPayload(msg.text().to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [echo, pid, ..] => Some(Self {
                mode: Mode::from_echo(*echo),
                pid: *pid,
            }),
            _ => None,
        }
    }
}

/// Split reply text into bytes.
///
/// Tokens are separated by spaces or the framing placeholder. A longer
/// token of even length (spaces-off interpreters) is split into pairs.
pub fn parse_hex_tokens(text: &str) -> Result<Vec<u8>, DecodeError> {
    let malformed = || DecodeError::MalformedPayload(text.to_string());
    let mut bytes = Vec::new();

    for token in text
        .split(|c: char| c == ' ' || c == PLACEHOLDER as char)
        .filter(|t| !t.is_empty())
    {
        if token.len() % 2 != 0 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed());
        }
        for i in (0..token.len()).step_by(2) {
            let byte = u8::from_str_radix(&token[i..i + 2], 16).map_err(|_| malformed())?;
            bytes.push(byte);
        }
    }

    Ok(bytes)
}

/// Mode 09 vehicle information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VehicleInfo {
    SupportedPids(SupportedPidBitmap),
    Vin(String),
    EcuName(String),
}

/// Anything an ECU reply can decode to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EcuData {
    Parameter(EngineParameter),
    Dtc(DtcCode),
    VehicleInfo(VehicleInfo),
}

/// Decoder for ECU replies
pub struct EcuResponseDecoder;

impl EcuResponseDecoder {
    /// Decode a Mode 01 reply into an engine parameter
    pub fn decode(msg: &EcuResponse) -> Result<EngineParameter, DecodeError> {
        let bytes = parse_hex_tokens(msg.text())?;
        let header = ParsedHeader::from_bytes(&bytes)
            .ok_or_else(|| DecodeError::MalformedPayload(msg.text().to_string()))?;

        match header.mode {
            Mode::CurrentData => decode_current_data(header.pid, &bytes[2..]),
            _ => Err(DecodeError::UnsupportedMode(bytes[0])),
        }
    }

    /// Decode a reply of any supported mode
    pub fn decode_any(msg: &EcuResponse) -> Result<EcuData, DecodeError> {
        let bytes = parse_hex_tokens(msg.text())?;
        let echo = *bytes
            .first()
            .ok_or_else(|| DecodeError::MalformedPayload(msg.text().to_string()))?;

        match Mode::from_echo(echo) {
            Mode::CurrentData => Self::decode(msg).map(EcuData::Parameter),
            Mode::StoredDtcs => DtcDecoder::decode(msg).map(EcuData::Dtc),
            Mode::VehicleInfo => {
                let header = ParsedHeader::from_bytes(&bytes)
                    .ok_or_else(|| DecodeError::MalformedPayload(msg.text().to_string()))?;
                decode_vehicle_info(header.pid, &bytes[2..]).map(EcuData::VehicleInfo)
            }
            Mode::Unknown(echo) => Err(DecodeError::UnsupportedMode(echo)),
        }
    }
}

fn decode_current_data(code: u8, data: &[u8]) -> Result<EngineParameter, DecodeError> {
    let pid = Pid::from_code(code).ok_or(DecodeError::UnsupportedPid(code))?;
    pid.decode(data).ok_or(DecodeError::TruncatedPayload {
        pid: code,
        expected: pid.data_bytes(),
        actual: data.len(),
    })
}

fn decode_vehicle_info(code: u8, data: &[u8]) -> Result<VehicleInfo, DecodeError> {
    let pid = InfoPid::from_code(code).ok_or(DecodeError::UnsupportedPid(code))?;

    match pid {
        InfoPid::SupportedPids => {
            // Non-CAN interpreters prefix a message count byte
            let data = if data.len() > 4 { &data[1..5] } else { data };
            match data {
                [a, b, c, d] => Ok(VehicleInfo::SupportedPids(SupportedPidBitmap::from_bytes(
                    mode::VEHICLE_INFO,
                    [*a, *b, *c, *d],
                ))),
                _ => Err(DecodeError::TruncatedPayload {
                    pid: code,
                    expected: 4,
                    actual: data.len(),
                }),
            }
        }
        InfoPid::Vin => ascii_payload(code, data).map(VehicleInfo::Vin),
        InfoPid::EcuName => ascii_payload(code, data).map(VehicleInfo::EcuName),
    }
}

/// Printable ASCII after any leading count bytes, NUL padding dropped
fn ascii_payload(code: u8, data: &[u8]) -> Result<String, DecodeError> {
    let text: String = data
        .iter()
        .skip_while(|b| **b < 0x20)
        .filter(|b| (0x20..0x7F).contains(*b))
        .map(|b| *b as char)
        .collect();
    let text = text.trim().to_string();

    if text.is_empty() {
        return Err(DecodeError::TruncatedPayload {
            pid: code,
            expected: 1,
            actual: 0,
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_response;
    use proptest::prelude::*;

    fn decode(text: &str) -> Result<EngineParameter, DecodeError> {
        EcuResponseDecoder::decode(&EcuResponse::new(text))
    }

    #[test]
    fn test_decode_rpm() {
        assert_eq!(decode("41 0C 1A F8"), Ok(EngineParameter::EngineRpm(1726.0)));
    }

    #[test]
    fn test_decode_mil_status() {
        assert_eq!(
            decode("41 01 81 07 65 04"),
            Ok(EngineParameter::MilStatus { on: true, dtc_count: 1 })
        );
        assert_eq!(
            decode("41 01 00 00 00 00"),
            Ok(EngineParameter::MilStatus { on: false, dtc_count: 0 })
        );
    }

    #[test]
    fn test_decode_spaces_off() {
        assert_eq!(decode("410C1AF8"), Ok(EngineParameter::EngineRpm(1726.0)));
    }

    #[test]
    fn test_unknown_pid() {
        assert_eq!(decode("41 FF 00"), Err(DecodeError::UnsupportedPid(0xFF)));
    }

    #[test]
    fn test_truncated_payload() {
        assert_eq!(
            decode("41 0C 1A"),
            Err(DecodeError::TruncatedPayload { pid: 0x0C, expected: 2, actual: 1 })
        );
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(decode("41 0C 1A FZ"), Err(DecodeError::MalformedPayload(_))));
        assert!(matches!(decode("41 0C 1A F"), Err(DecodeError::MalformedPayload(_))));
        assert!(matches!(decode("41"), Err(DecodeError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_rejects_other_modes() {
        assert_eq!(decode("49 02 31"), Err(DecodeError::UnsupportedMode(0x49)));
        assert_eq!(decode("42 0C 00 00"), Err(DecodeError::UnsupportedMode(0x42)));
    }

    #[test]
    fn test_header_parse() {
        let header = ParsedHeader::parse(&EcuResponse::new("49 0A 45")).unwrap();
        assert_eq!(header.mode, Mode::VehicleInfo);
        assert_eq!(header.pid, 0x0A);
        assert_eq!(Mode::from_echo(0x42), Mode::Unknown(0x42));
    }

    #[test]
    fn test_decode_vin() {
        let expected = EcuData::VehicleInfo(VehicleInfo::Vin("1D4GP00R55B123456".to_string()));
        for text in [
            "49 02 31 44 34 47 50 30 30 52 35 35 42 31 32 33 34 35 36",
            "49 02 01 31 44 34 47 50 30 30 52 35 35 42 31 32 33 34 35 36",
        ] {
            assert_eq!(EcuResponseDecoder::decode_any(&EcuResponse::new(text)), Ok(expected.clone()));
        }
    }

    #[test]
    fn test_decode_ecu_name() {
        let msg = EcuResponse::new("49 0A 01 45 43 4D 2D 45 6E 67 69 6E 65 00 00");
        assert_eq!(
            EcuResponseDecoder::decode_any(&msg),
            Ok(EcuData::VehicleInfo(VehicleInfo::EcuName("ECM-Engine".to_string())))
        );
    }

    #[test]
    fn test_decode_mode09_bitmap() {
        let msg = EcuResponse::new("49 00 54 40 00 00");
        match EcuResponseDecoder::decode_any(&msg) {
            Ok(EcuData::VehicleInfo(VehicleInfo::SupportedPids(bitmap))) => {
                assert_eq!(bitmap.mode, 0x09);
                assert!(bitmap.is_supported(0x02));
                assert!(bitmap.is_supported(0x0A));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_any_dtc() {
        let msg = EcuResponse::new("43 01 01 33 00 00 00");
        match EcuResponseDecoder::decode_any(&msg) {
            Ok(EcuData::Dtc(code)) => assert_eq!(code.to_string(), "P0133"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_mode09_pid() {
        assert_eq!(
            EcuResponseDecoder::decode_any(&EcuResponse::new("49 04 00")),
            Err(DecodeError::UnsupportedPid(0x04))
        );
    }

    #[test]
    fn test_boundary_bytes_round_trip() {
        for pid in Pid::ALL {
            for fill in [0x00u8, 0xFF] {
                let data = vec![fill; pid.data_bytes()];
                let text = encode_response(mode::CURRENT_DATA, pid.as_hex(), &data);
                let decoded = decode(&text).unwrap();
                assert_eq!(Some(decoded), pid.decode(&data));
                assert_eq!(decoded.pid(), pid);
            }
        }
    }

    #[test]
    fn test_boundary_values() {
        assert_eq!(decode("41 05 00"), Ok(EngineParameter::CoolantTemp(-40.0)));
        assert_eq!(decode("41 05 FF"), Ok(EngineParameter::CoolantTemp(215.0)));
        assert_eq!(decode("41 0A FF"), Ok(EngineParameter::FuelPressure(765.0)));
        assert_eq!(decode("41 0C FF FF"), Ok(EngineParameter::EngineRpm(16383.75)));
        assert_eq!(decode("41 11 FF"), Ok(EngineParameter::ThrottlePosition(100.0)));
        assert_eq!(decode("41 5E FF FF"), Ok(EngineParameter::FuelFlowRate(3276.75)));
        assert_eq!(decode("41 0E FF"), Ok(EngineParameter::TimingAdvance(63.5)));
    }

    proptest! {
        #[test]
        fn test_encode_raw_decodes_to_same_bytes(a in any::<u8>(), b in any::<u8>()) {
            for pid in Pid::ALL {
                let data = [a, b, 0x00, 0x00];
                let data = &data[..pid.data_bytes()];
                if let Some(param) = pid.decode(data) {
                    if !matches!(pid, Pid::MonitorStatus) {
                        prop_assert_eq!(param.encode_raw(), data.to_vec());
                    }
                }
            }
        }
    }
}
