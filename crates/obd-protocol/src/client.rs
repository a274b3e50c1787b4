//! OBD-II Client for ELM327 Interpreters
//!
//! Drives a [`ProtocolSession`] over a [`Transport`]: writes each request,
//! then reads until the interpreter prompt or the response timeout.

use crate::encoder::{AtCommand, InfoPid, ObdRequest, Terminator};
use crate::error::{DecodeError, ObdError, SessionError};
use crate::interface::InterfaceInfo;
use crate::lookup::DescriptionStore;
use crate::pid::{EngineParameter, Pid};
use crate::protocol::ObdProtocol;
use crate::session::{ProtocolSession, SessionEvent, SessionState};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default timeout for OBD commands
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

const READ_BUFFER_LEN: usize = 1024;

/// Result of one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exchange {
    /// Events decoded while the request was in flight
    pub events: Vec<SessionEvent>,
    /// Reply messages, echo removed
    pub transcript: Vec<String>,
}

impl Exchange {
    pub fn parameters(&self) -> impl Iterator<Item = &EngineParameter> {
        self.events.iter().filter_map(|event| match event {
            SessionEvent::Parameter(p) => Some(p),
            _ => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &SessionError> {
        self.events.iter().filter_map(|event| match event {
            SessionEvent::Error(e) => Some(e),
            _ => None,
        })
    }

    /// The interpreter answered only with a status such as `NO DATA`
    pub fn is_unanswered(&self) -> bool {
        let answered = self.events.iter().any(|event| {
            matches!(
                event,
                SessionEvent::Parameter(_)
                    | SessionEvent::Dtc(_)
                    | SessionEvent::VehicleInfo(_)
                    | SessionEvent::Interface(_)
            )
        });
        !answered
            && self
                .errors()
                .any(|e| matches!(e, SessionError::Decode(DecodeError::InterpreterStatus(_))))
    }
}

/// OBD-II client for communicating with ELM327-compatible interpreters
pub struct ObdClient {
    transport: Transport,
    session: ProtocolSession,
    /// Command timeout
    timeout: Duration,
}

impl ObdClient {
    /// Create a client that waits for the interpreter prompt before its
    /// first request
    pub fn new(transport: Transport, terminator: Terminator) -> Self {
        Self {
            transport,
            session: ProtocolSession::new(terminator),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn with_descriptions(mut self, store: Arc<dyn DescriptionStore>) -> Self {
        self.session = self.session.with_descriptions(store);
        self
    }

    /// Skip the initial prompt wait (relays and simulators send nothing
    /// unsolicited)
    pub fn assume_ready(&mut self) {
        self.session.assume_ready();
    }

    pub fn session(&self) -> &ProtocolSession {
        &self.session
    }

    pub fn interface(&self) -> &InterfaceInfo {
        self.session.interface()
    }

    /// Set command timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read until the interpreter shows its prompt
    pub async fn wait_ready(&mut self) -> Result<(), ObdError> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; READ_BUFFER_LEN];

        while self.session.state() == SessionState::AwaitingReady {
            let n = match tokio::time::timeout_at(deadline, self.transport.recv(&mut buf)).await {
                Err(_) => return Err(ObdError::Timeout(self.timeout.as_millis() as u64)),
                Ok(result) => result?,
            };
            if n == 0 && !self.transport.is_datagram() {
                return Err(ObdError::Closed);
            }
            self.session.receive(&buf[..n]);
        }
        Ok(())
    }

    /// Send one request and collect its reply
    pub async fn query(&mut self, request: ObdRequest) -> Result<Exchange, ObdError> {
        if self.session.state() == SessionState::Faulted {
            warn!("Resetting faulted session");
            self.session.reset();
        }
        if self.session.state() == SessionState::AwaitingReady {
            match self.wait_ready().await {
                Ok(()) => {}
                Err(ObdError::Timeout(_)) => {
                    debug!("No prompt seen, assuming interpreter is idle");
                    self.session.assume_ready();
                }
                Err(e) => return Err(e),
            }
        }

        let wire = self.session.send(request)?;
        if let Err(e) = self.transport.send(wire.as_bytes()).await {
            error!("Failed to send {}: {}", request, e);
            self.session.expire(Duration::ZERO);
            return Err(e);
        }

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; READ_BUFFER_LEN];
        let mut events = Vec::new();

        while self.session.state() == SessionState::AwaitingResponse {
            let received = tokio::time::timeout_at(deadline, self.transport.recv(&mut buf)).await;
            match received {
                Err(_) => {
                    self.session.expire(Duration::ZERO);
                    return Err(ObdError::Timeout(self.timeout.as_millis() as u64));
                }
                Ok(Err(e)) => {
                    error!("Transport failure during {}: {}", request, e);
                    self.session.expire(Duration::ZERO);
                    return Err(e);
                }
                Ok(Ok(0)) if !self.transport.is_datagram() => {
                    self.session.expire(Duration::ZERO);
                    return Err(ObdError::Closed);
                }
                Ok(Ok(n)) => events.extend(self.session.receive(&buf[..n])),
            }
        }

        Ok(Exchange {
            events,
            transcript: self.session.take_transcript(),
        })
    }

    /// Reset and configure the interpreter, returning what it reported
    pub async fn initialize(&mut self, protocol: ObdProtocol) -> Result<InterfaceInfo, ObdError> {
        info!("Initializing interpreter, protocol {}", protocol);
        self.session.assume_ready();

        let sequence = [
            AtCommand::Reset,
            AtCommand::Echo(false),
            AtCommand::Linefeeds(false),
            AtCommand::TryProtocol(protocol),
            AtCommand::DescribeProtocol,
            AtCommand::ReadVoltage,
            AtCommand::Identify,
        ];
        for command in sequence {
            self.query_tolerant(ObdRequest::At(command)).await?;
        }

        let info = self.session.interface().clone();
        info!(
            "Interpreter '{}' on '{}', battery {:?}V",
            info.interface_name, info.protocol_name, info.battery_voltage
        );
        Ok(info)
    }

    /// Ask the vehicle what it supports and who it is
    pub async fn probe(&mut self) -> Result<Vec<SessionEvent>, ObdError> {
        let sequence = [
            ObdRequest::CurrentData(Pid::SupportedPids),
            ObdRequest::VehicleInfo(InfoPid::SupportedPids),
            ObdRequest::CurrentData(Pid::MonitorStatus),
            ObdRequest::VehicleInfo(InfoPid::Vin),
            ObdRequest::VehicleInfo(InfoPid::EcuName),
            ObdRequest::StoredDtcs,
        ];

        let mut events = Vec::new();
        for request in sequence {
            if let Some(exchange) = self.query_tolerant(request).await? {
                events.extend(exchange.events);
            }
        }
        Ok(events)
    }

    /// Query, treating a timeout as a missing answer
    async fn query_tolerant(&mut self, request: ObdRequest) -> Result<Option<Exchange>, ObdError> {
        match self.query(request).await {
            Ok(exchange) => Ok(Some(exchange)),
            Err(ObdError::Timeout(ms)) => {
                warn!("No answer to {} within {}ms", request, ms);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
