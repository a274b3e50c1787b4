//! Request handling
//!
//! Turns one request line into the full interpreter reply: optional echo,
//! the reply line, a blank line and the `>` prompt.

use crate::elm::ElmState;
use crate::vehicle::VehicleModel;
use obd_protocol::{
    encode_response, mode, DecodeError, InfoPid, ObdRequest, SupportedPidBitmap, READY_PROMPT,
};
use tracing::{debug, trace};

/// Bytes in the ECU name record
const ECU_NAME_LEN: usize = 20;

pub struct Simulator {
    vehicle: VehicleModel,
}

impl Simulator {
    pub fn new(vehicle: VehicleModel) -> Self {
        Self { vehicle }
    }

    pub fn vehicle(&self) -> &VehicleModel {
        &self.vehicle
    }

    /// Answer one request under the peer's interpreter settings
    pub fn respond(&self, state: &mut ElmState, request_text: &str) -> String {
        let line = request_text.trim_matches(|c: char| c.is_whitespace() || c.is_control());
        let prompt = READY_PROMPT as char;
        if line.is_empty() {
            return prompt.to_string();
        }

        // Echo and line ending follow the settings in force when the line arrived
        let le = state.line_ending();
        let echo = if state.echo {
            format!("{}{}", line, le)
        } else {
            String::new()
        };

        let body = match ObdRequest::parse(line) {
            Ok(ObdRequest::At(command)) => state.apply(command, &self.vehicle),
            Ok(request) => match self.ecu_reply(request) {
                Some(reply) => state.format_ecu_reply(&reply, &self.vehicle),
                None => "NO DATA".to_string(),
            },
            Err(DecodeError::UnsupportedPid(pid)) => {
                debug!("No data for PID {:02X}", pid);
                "NO DATA".to_string()
            }
            Err(DecodeError::UnsupportedMode(m)) => {
                debug!("No data for mode {:02X}", m);
                "NO DATA".to_string()
            }
            Err(e) => {
                trace!("Rejecting {:?}: {}", line, e);
                "?".to_string()
            }
        };

        format!("{}{}{}{}{}", echo, body, le, le, prompt)
    }

    /// ECU reply text for an OBD request
    fn ecu_reply(&self, request: ObdRequest) -> Option<String> {
        match request {
            ObdRequest::CurrentData(pid) => Some(encode_response(
                mode::CURRENT_DATA,
                pid.as_hex(),
                &self.vehicle.data(pid),
            )),
            ObdRequest::StoredDtcs => {
                let mut data = [0u8; 6];
                if let Some(code) = self.vehicle.stored_dtc {
                    let [b1, b2] = code.to_bytes();
                    data[..3].copy_from_slice(&[0x01, b1, b2]);
                }
                Some(dtc_reply(&data))
            }
            ObdRequest::VehicleInfo(info) => {
                let data = match info {
                    InfoPid::SupportedPids => {
                        let bitmap = SupportedPidBitmap::from_pids(
                            mode::VEHICLE_INFO,
                            [InfoPid::Vin.as_hex(), InfoPid::EcuName.as_hex()],
                        );
                        let mut data = vec![0x01];
                        data.extend_from_slice(&bitmap.to_bytes());
                        data
                    }
                    InfoPid::Vin => ascii_record(&self.vehicle.vin, 0),
                    InfoPid::EcuName => ascii_record(&self.vehicle.ecu_name, ECU_NAME_LEN),
                };
                Some(encode_response(mode::VEHICLE_INFO, info.as_hex(), &data))
            }
            ObdRequest::At(_) => None,
        }
    }
}

/// `43` followed by the data bytes, Mode 03 has no PID byte
fn dtc_reply(data: &[u8]) -> String {
    let mut text = format!("{:02X}", mode::READ_DTC + mode::RESPONSE_OFFSET);
    for byte in data {
        text.push_str(&format!(" {:02X}", byte));
    }
    text
}

/// Message count byte followed by the text, NUL padded to `len`
fn ascii_record(text: &str, len: usize) -> Vec<u8> {
    let mut data = vec![0x01];
    data.extend(text.bytes().filter(|b| b.is_ascii_graphic() || *b == b' '));
    while data.len() < len + 1 {
        data.push(0);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{
        EcuData, EcuResponse, EcuResponseDecoder, EngineParameter, ObdProtocol, VehicleInfo,
    };

    fn simulator(dtc: Option<&str>) -> Simulator {
        Simulator::new(VehicleModel::new(
            12.6,
            "1D4GP00R55B123456",
            "ECM-EngineControl",
            dtc.and_then(|c| c.parse().ok()),
            ObdProtocol::Iso15765_4Can11bit500,
        ))
    }

    fn decode(line: &str) -> EcuData {
        EcuResponseDecoder::decode_any(&EcuResponse::new(line)).unwrap()
    }

    #[test]
    fn test_echo_reply_prompt() {
        let sim = simulator(None);
        let mut state = ElmState::new(true);
        assert_eq!(sim.respond(&mut state, "ATRV\r"), "ATRV\r12.6V\r\r>");
    }

    #[test]
    fn test_echo_off_after_ate0() {
        let sim = simulator(None);
        let mut state = ElmState::new(true);
        assert_eq!(sim.respond(&mut state, "ATE0"), "ATE0\rOK\r\r>");
        assert_eq!(sim.respond(&mut state, "ATI"), "ELM327 v1.5\r\r>");
    }

    #[test]
    fn test_rpm_reply_decodes() {
        let sim = simulator(None);
        let mut state = ElmState::new(false);
        let reply = sim.respond(&mut state, "01 0C");
        let line = reply.split('\r').next().unwrap();
        assert!(line.starts_with("41 0C "));
        match decode(line) {
            EcuData::Parameter(EngineParameter::EngineRpm(rpm)) => {
                assert!((800.0..=3500.0).contains(&rpm))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stored_dtc() {
        let mut state = ElmState::new(false);
        let reply = simulator(Some("P0133")).respond(&mut state, "03");
        assert_eq!(reply, "43 01 01 33 00 00 00\r\r>");
        match decode("43 01 01 33 00 00 00") {
            EcuData::Dtc(code) => assert_eq!(code.to_string(), "P0133"),
            other => panic!("unexpected {:?}", other),
        }

        let reply = simulator(None).respond(&mut state, "03");
        assert_eq!(reply, "43 00 00 00 00 00 00\r\r>");
    }

    #[test]
    fn test_vin() {
        let mut state = ElmState::new(false);
        let reply = simulator(None).respond(&mut state, "0902");
        let line = reply.split('\r').next().unwrap();
        assert!(line.starts_with("49 02 01 31 44"));
        assert_eq!(
            decode(line),
            EcuData::VehicleInfo(VehicleInfo::Vin("1D4GP00R55B123456".to_string()))
        );
    }

    #[test]
    fn test_ecu_name_padded() {
        let mut state = ElmState::new(false);
        let reply = simulator(None).respond(&mut state, "09 0A");
        let line = reply.split('\r').next().unwrap();
        assert_eq!(line.split_whitespace().count(), 2 + 1 + ECU_NAME_LEN);
        assert_eq!(
            decode(line),
            EcuData::VehicleInfo(VehicleInfo::EcuName("ECM-EngineControl".to_string()))
        );
    }

    #[test]
    fn test_mode_09_supported() {
        let mut state = ElmState::new(false);
        let reply = simulator(None).respond(&mut state, "09 00");
        let line = reply.split('\r').next().unwrap();
        match decode(line) {
            EcuData::VehicleInfo(VehicleInfo::SupportedPids(bitmap)) => {
                assert_eq!(bitmap.supported(), vec![0x02, 0x0A]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_pid_and_garbage() {
        let sim = simulator(None);
        let mut state = ElmState::new(false);
        assert_eq!(sim.respond(&mut state, "01 04"), "NO DATA\r\r>");
        assert_eq!(sim.respond(&mut state, "22 F1 90"), "NO DATA\r\r>");
        assert_eq!(sim.respond(&mut state, "hello"), "?\r\r>");
        assert_eq!(sim.respond(&mut state, "\r"), ">");
    }
}
