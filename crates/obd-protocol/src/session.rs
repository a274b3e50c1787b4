//! Protocol Session
//!
//! Single-request-in-flight state machine over one interpreter connection.
//! Inbound bytes are framed, classified and decoded into [`SessionEvent`]s;
//! outbound requests are encoded only when the interpreter has shown its
//! ready prompt. The session performs no I/O itself.

use crate::classifier::{InterpreterStatus, MessageClassifier, MessageKind};
use crate::decoder::{EcuData, EcuResponseDecoder, VehicleInfo};
use crate::dtc::DtcCode;
use crate::encoder::{ObdRequest, RequestEncoder, Terminator};
use crate::error::{DecodeError, SessionError};
use crate::framer::{ByteStreamFramer, Frame, RawMessage, PLACEHOLDER};
use crate::interface::{InterfaceInfo, InterfaceResponseDecoder, InterfaceUpdate};
use crate::lookup::DescriptionStore;
use crate::pid::{EngineParameter, EngineParameterSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first `>` prompt
    AwaitingReady,
    /// Ready for the next request
    Idle,
    /// A request is in flight
    AwaitingResponse,
    /// Framing overflow; `reset()` required
    Faulted,
}

/// Something the session decoded or detected
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Interpreter printed its prompt
    Ready,
    Parameter(EngineParameter),
    Dtc(DtcCode),
    VehicleInfo(VehicleInfo),
    Interface(InterfaceUpdate),
    /// Recoverable failure; the session carries on
    Error(SessionError),
}

pub struct ProtocolSession {
    state: SessionState,
    framer: ByteStreamFramer,
    encoder: RequestEncoder,
    interface: InterfaceInfo,
    parameters: EngineParameterSet,
    in_flight: Option<ObdRequest>,
    sent_at: Option<Instant>,
    transcript: Vec<String>,
    descriptions: Option<Arc<dyn DescriptionStore>>,
}

impl Default for ProtocolSession {
    fn default() -> Self {
        Self::new(Terminator::default())
    }
}

fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

impl ProtocolSession {
    pub fn new(terminator: Terminator) -> Self {
        Self {
            state: SessionState::AwaitingReady,
            framer: ByteStreamFramer::new(terminator),
            encoder: RequestEncoder::new(terminator),
            interface: InterfaceInfo::new(),
            parameters: EngineParameterSet::new(),
            in_flight: None,
            sent_at: None,
            transcript: Vec::new(),
            descriptions: None,
        }
    }

    /// Attach a description store used for log output
    pub fn with_descriptions(mut self, store: Arc<dyn DescriptionStore>) -> Self {
        self.descriptions = Some(store);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn interface(&self) -> &InterfaceInfo {
        &self.interface
    }

    pub fn parameters(&self) -> &EngineParameterSet {
        &self.parameters
    }

    pub fn in_flight(&self) -> Option<ObdRequest> {
        self.in_flight
    }

    pub fn terminator(&self) -> Terminator {
        self.encoder.terminator()
    }

    /// Time spent in `AwaitingResponse`
    pub fn elapsed(&self) -> Option<Duration> {
        match self.state {
            SessionState::AwaitingResponse => self.sent_at.map(|t| t.elapsed()),
            _ => None,
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            debug!("Session state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Treat the interpreter as ready without waiting for a prompt
    pub fn assume_ready(&mut self) {
        if self.state == SessionState::AwaitingReady {
            self.set_state(SessionState::Idle);
        }
    }

    /// Encode a request and mark it in flight.
    ///
    /// Returns the exact bytes to write to the transport.
    pub fn send(&mut self, request: ObdRequest) -> Result<String, SessionError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::AwaitingResponse => return Err(SessionError::Busy),
            SessionState::AwaitingReady => return Err(SessionError::NotReady),
            SessionState::Faulted => return Err(SessionError::Faulted),
        }

        let wire = self.encoder.encode(request);
        debug!("Sending request {}", request);
        self.in_flight = Some(request);
        self.sent_at = Some(Instant::now());
        self.transcript.clear();
        self.set_state(SessionState::AwaitingResponse);
        Ok(wire)
    }

    /// Feed inbound bytes and collect the resulting events.
    ///
    /// While faulted, framed messages and prompts are dropped and reported
    /// as a single `Faulted` error per call.
    pub fn receive(&mut self, bytes: &[u8]) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let mut dropped = 0;

        for frame in self.framer.feed(bytes) {
            if self.state == SessionState::Faulted && !matches!(frame, Frame::Overflow { .. }) {
                dropped += 1;
                continue;
            }
            match frame {
                Frame::Ready => self.on_ready(&mut events),
                Frame::Overflow { len } => {
                    warn!("Framing overflow ({} bytes), session faulted", len);
                    self.in_flight = None;
                    self.sent_at = None;
                    self.set_state(SessionState::Faulted);
                    events.push(SessionEvent::Error(DecodeError::Framing { len }.into()));
                }
                Frame::Message(msg) => {
                    // Placeholders separate echoed request and reply on some interpreters
                    for segment in msg.text().split(PLACEHOLDER as char) {
                        let segment = segment.trim();
                        if !segment.is_empty() {
                            self.on_segment(segment, &mut events);
                        }
                    }
                }
            }
        }

        if dropped > 0 {
            trace!("Dropped {} frames while faulted", dropped);
            events.push(SessionEvent::Error(SessionError::Faulted));
        }
        events
    }

    /// Time out the in-flight request if it has waited at least `timeout`.
    ///
    /// Drops any partial reply and returns to `Idle`.
    pub fn expire(&mut self, timeout: Duration) -> Option<SessionEvent> {
        let elapsed = self.elapsed()?;
        if elapsed < timeout {
            return None;
        }

        warn!(
            "Request {} timed out after {}ms",
            self.in_flight.map(|r| r.to_string()).unwrap_or_default(),
            elapsed.as_millis()
        );
        self.framer.reset();
        self.in_flight = None;
        self.sent_at = None;
        self.set_state(SessionState::Idle);
        Some(SessionEvent::Error(SessionError::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
        }))
    }

    /// Discard everything buffered and wait for a fresh prompt
    pub fn reset(&mut self) {
        self.framer.reset();
        self.in_flight = None;
        self.sent_at = None;
        self.transcript.clear();
        self.set_state(SessionState::AwaitingReady);
    }

    /// Messages received for the current or last request
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn take_transcript(&mut self) -> Vec<String> {
        std::mem::take(&mut self.transcript)
    }

    fn on_ready(&mut self, events: &mut Vec<SessionEvent>) {
        self.in_flight = None;
        self.sent_at = None;
        self.set_state(SessionState::Idle);
        events.push(SessionEvent::Ready);
    }

    fn on_segment(&mut self, segment: &str, events: &mut Vec<SessionEvent>) {
        if let Some(request) = self.in_flight {
            if compact(segment) == compact(&request.text()) {
                trace!("Dropping echo of {}", request);
                return;
            }
        }

        if let Some(status) = InterpreterStatus::detect(segment) {
            if status.is_informational() {
                debug!("Interpreter: {}", segment);
                return;
            }
            self.transcript.push(segment.to_string());
            warn!("Interpreter reported {} for {:?}", status, self.in_flight.map(|r| r.to_string()));
            events.push(SessionEvent::Error(
                DecodeError::InterpreterStatus(segment.to_string()).into(),
            ));
            return;
        }

        // Echo-off interpreters answer AT commands with the bare value
        let text = match self.in_flight {
            Some(ObdRequest::At(cmd)) if !segment.to_ascii_uppercase().starts_with("AT") => {
                format!("{} {}", cmd.text(), segment)
            }
            _ => segment.to_string(),
        };
        self.transcript.push(text.clone());

        match MessageClassifier::classify(&RawMessage::new(text.as_str())) {
            MessageKind::InterfaceReady => self.on_ready(events),
            MessageKind::EcuResponse(response) => match EcuResponseDecoder::decode_any(&response) {
                Ok(data) => self.on_ecu_data(data, events),
                Err(err) => self.on_decode_error(err, events),
            },
            MessageKind::InterfaceResponse(response) => {
                match InterfaceResponseDecoder::decode(&response, &mut self.interface) {
                    Ok(update) => {
                        debug!("Interface update: {:?}", update);
                        events.push(SessionEvent::Interface(update));
                    }
                    Err(err) => self.on_decode_error(err, events),
                }
            }
            MessageKind::Malformed => {
                self.on_decode_error(DecodeError::MalformedPayload(text), events);
            }
        }
    }

    fn on_ecu_data(&mut self, data: EcuData, events: &mut Vec<SessionEvent>) {
        match data {
            EcuData::Parameter(parameter) => {
                trace!("{}", parameter);
                self.parameters.update(&parameter);
                events.push(SessionEvent::Parameter(parameter));
            }
            EcuData::Dtc(code) if code.is_empty() => {
                debug!("No stored trouble codes");
            }
            EcuData::Dtc(code) => {
                let code_text = code.to_string();
                match self.describe(&code_text) {
                    Some(description) => info!("Trouble code {}: {}", code_text, description),
                    None => info!("Trouble code {}", code_text),
                }
                events.push(SessionEvent::Dtc(code));
            }
            EcuData::VehicleInfo(info) => {
                debug!("Vehicle info: {:?}", info);
                events.push(SessionEvent::VehicleInfo(info));
            }
        }
    }

    fn on_decode_error(&self, err: DecodeError, events: &mut Vec<SessionEvent>) {
        match &err {
            DecodeError::UnsupportedPid(pid) => {
                let request = self.in_flight.map(|r| r.text());
                let description = request.as_deref().and_then(|r| self.describe(r));
                debug!(
                    "Unsupported PID {:02X}{}",
                    pid,
                    description.map(|d| format!(" ({})", d)).unwrap_or_default()
                );
            }
            _ => warn!("Decode error: {}", err),
        }
        events.push(SessionEvent::Error(err.into()));
    }

    fn describe(&self, code: &str) -> Option<String> {
        self.descriptions.as_ref().and_then(|store| store.describe(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::AtCommand;
    use crate::pid::Pid;
    use std::collections::HashMap;

    fn ready_session() -> ProtocolSession {
        let mut session = ProtocolSession::default();
        assert_eq!(session.receive(b">"), vec![SessionEvent::Ready]);
        session
    }

    #[test]
    fn test_send_requires_prompt() {
        let mut session = ProtocolSession::default();
        assert_eq!(session.state(), SessionState::AwaitingReady);
        assert_eq!(
            session.send(ObdRequest::CurrentData(Pid::Rpm)),
            Err(SessionError::NotReady)
        );

        session.receive(b"ELM327 v1.5\r\r>");
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_single_request_in_flight() {
        let mut session = ready_session();
        let wire = session.send(ObdRequest::CurrentData(Pid::Rpm)).unwrap();
        assert_eq!(wire, "01 0C\r");
        assert_eq!(session.state(), SessionState::AwaitingResponse);
        assert_eq!(
            session.send(ObdRequest::CurrentData(Pid::Speed)),
            Err(SessionError::Busy)
        );
    }

    #[test]
    fn test_response_then_prompt() {
        let mut session = ready_session();
        session.send(ObdRequest::CurrentData(Pid::Rpm)).unwrap();

        let events = session.receive(b"41 0C 1A F8\r");
        assert_eq!(events, vec![SessionEvent::Parameter(EngineParameter::EngineRpm(1726.0))]);
        assert_eq!(session.state(), SessionState::AwaitingResponse);

        let events = session.receive(b"\r>");
        assert_eq!(events, vec![SessionEvent::Ready]);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.parameters().engine_rpm, Some(1726.0));
        assert_eq!(session.transcript(), ["41 0C 1A F8".to_string()]);
    }

    #[test]
    fn test_echo_suppressed() {
        let mut session = ready_session();
        session.send(ObdRequest::CurrentData(Pid::Speed)).unwrap();
        let events = session.receive(b"010D\r41 0D 32\r\r>");
        assert_eq!(
            events,
            vec![
                SessionEvent::Parameter(EngineParameter::VehicleSpeed(50.0)),
                SessionEvent::Ready
            ]
        );
    }

    #[test]
    fn test_placeholder_separated_echo() {
        let mut session = ready_session();
        session.send(ObdRequest::CurrentData(Pid::CoolantTemp)).unwrap();
        let events = session.receive(b"01 05\n41 05 73\r>");
        assert_eq!(events[0], SessionEvent::Parameter(EngineParameter::CoolantTemp(75.0)));
    }

    #[test]
    fn test_unknown_pid_keeps_session_usable() {
        let mut session = ready_session();
        session.send(ObdRequest::CurrentData(Pid::Rpm)).unwrap();
        let events = session.receive(b"41 FF 00\r>");
        assert_eq!(
            events,
            vec![
                SessionEvent::Error(SessionError::Decode(DecodeError::UnsupportedPid(0xFF))),
                SessionEvent::Ready
            ]
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.send(ObdRequest::CurrentData(Pid::Rpm)).is_ok());
    }

    #[test]
    fn test_same_message_twice_yields_identical_events() {
        let mut session = ready_session();
        session.send(ObdRequest::CurrentData(Pid::Rpm)).unwrap();
        let first = session.receive(b"41 0C 1A F8\r");
        let second = session.receive(b"41 0C 1A F8\r");
        assert_eq!(first, second);
    }

    #[test]
    fn test_echo_off_at_reply_prefixed() {
        let mut session = ready_session();
        session.send(ObdRequest::At(AtCommand::ReadVoltage)).unwrap();
        let events = session.receive(b"12.5V\r\r>");
        assert_eq!(
            events,
            vec![
                SessionEvent::Interface(InterfaceUpdate::BatteryVoltage(12.5)),
                SessionEvent::Ready
            ]
        );
        assert_eq!(session.interface().battery_voltage, Some(12.5));
        assert_eq!(session.transcript(), ["ATRV 12.5V".to_string()]);
    }

    #[test]
    fn test_echo_on_at_reply() {
        let mut session = ready_session();
        session.send(ObdRequest::At(AtCommand::DescribeProtocol)).unwrap();
        let events = session.receive(b"ATDP\rAUTO, ISO 15765-4 (CAN 11/500)\r\r>");
        assert_eq!(
            events[0],
            SessionEvent::Interface(InterfaceUpdate::Protocol {
                number: None,
                name: "AUTO, ISO 15765-4 (CAN 11/500)".to_string()
            })
        );
    }

    #[test]
    fn test_no_data_status() {
        let mut session = ready_session();
        session.send(ObdRequest::CurrentData(Pid::OilTemp)).unwrap();
        let events = session.receive(b"SEARCHING...\rNO DATA\r\r>");
        assert_eq!(
            events,
            vec![
                SessionEvent::Error(SessionError::Decode(DecodeError::InterpreterStatus(
                    "NO DATA".to_string()
                ))),
                SessionEvent::Ready
            ]
        );
        assert_eq!(session.parameters().oil_temp, None);
    }

    #[test]
    fn test_dtc_event() {
        let mut map = HashMap::new();
        map.insert("P0133".to_string(), "O2 Sensor Circuit Slow Response".to_string());
        let mut session = ProtocolSession::default().with_descriptions(Arc::new(map));
        session.receive(b">");

        session.send(ObdRequest::StoredDtcs).unwrap();
        let events = session.receive(b"43 01 01 33 00 00 00\r>");
        match &events[0] {
            SessionEvent::Dtc(code) => assert_eq!(code.to_string(), "P0133"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_dtc_not_emitted() {
        let mut session = ready_session();
        session.send(ObdRequest::StoredDtcs).unwrap();
        let events = session.receive(b"43 00 00 00 00 00 00\r>");
        assert_eq!(events, vec![SessionEvent::Ready]);
    }

    #[test]
    fn test_overflow_faults_until_reset() {
        let mut session = ready_session();
        session.send(ObdRequest::CurrentData(Pid::Rpm)).unwrap();

        let noise = vec![b'7'; crate::framer::MAX_BUFFER_LEN + 1];
        let events = session.receive(&noise);
        assert!(matches!(
            events[0],
            SessionEvent::Error(SessionError::Decode(DecodeError::Framing { .. }))
        ));
        assert_eq!(session.state(), SessionState::Faulted);

        // Prompt does not clear a fault
        assert_eq!(session.receive(b">"), vec![SessionEvent::Error(SessionError::Faulted)]);
        assert_eq!(session.state(), SessionState::Faulted);
        assert_eq!(
            session.send(ObdRequest::CurrentData(Pid::Rpm)),
            Err(SessionError::Faulted)
        );

        session.reset();
        assert_eq!(session.state(), SessionState::AwaitingReady);
        session.receive(b">");
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_faulted_session_drops_ecu_data() {
        let mut session = ready_session();
        session.send(ObdRequest::CurrentData(Pid::Rpm)).unwrap();
        session.receive(&vec![b'A'; crate::framer::MAX_BUFFER_LEN + 1]);
        assert_eq!(session.state(), SessionState::Faulted);

        let events = session.receive(b"41 0C 1A F8\r41 0D 32\r\r>");
        assert_eq!(events, vec![SessionEvent::Error(SessionError::Faulted)]);
        assert_eq!(session.parameters().engine_rpm, None);
        assert_eq!(session.parameters().vehicle_speed, None);
        assert!(session.transcript().is_empty());

        session.reset();
        session.receive(b">");
        session.send(ObdRequest::CurrentData(Pid::Rpm)).unwrap();
        session.receive(b"41 0C 1A F8\r>");
        assert_eq!(session.parameters().engine_rpm, Some(1726.0));
    }

    #[test]
    fn test_expire_returns_to_idle() {
        let mut session = ready_session();
        assert!(session.expire(Duration::ZERO).is_none());

        session.send(ObdRequest::CurrentData(Pid::Rpm)).unwrap();
        session.receive(b"41 0C");
        assert!(session.expire(Duration::from_secs(3600)).is_none());

        let event = session.expire(Duration::ZERO);
        assert!(matches!(
            event,
            Some(SessionEvent::Error(SessionError::Timeout { .. }))
        ));
        assert_eq!(session.state(), SessionState::Idle);

        // Stale partial reply was discarded
        session.send(ObdRequest::CurrentData(Pid::Speed)).unwrap();
        let events = session.receive(b"41 0D 10\r");
        assert_eq!(events, vec![SessionEvent::Parameter(EngineParameter::VehicleSpeed(16.0))]);
    }

    #[test]
    fn test_malformed_reply_reported() {
        let mut session = ready_session();
        session.send(ObdRequest::CurrentData(Pid::Rpm)).unwrap();
        let events = session.receive(b"7E8 04 41 0C\r");
        assert!(matches!(
            events[0],
            SessionEvent::Error(SessionError::Decode(DecodeError::MalformedPayload(_)))
        ));
    }

    #[test]
    fn test_vehicle_info_event() {
        let mut session = ready_session();
        session
            .send(ObdRequest::VehicleInfo(crate::encoder::InfoPid::Vin))
            .unwrap();
        let events =
            session.receive(b"49 02 01 31 44 34 47 50 30 30 52 35 35 42 31 32 33 34 35 36\r>");
        assert_eq!(
            events[0],
            SessionEvent::VehicleInfo(VehicleInfo::Vin("1D4GP00R55B123456".to_string()))
        );
    }
}
