//! OBD-II Protocol Implementation
//!
//! Framing, classification and decoding of ELM327-style interpreter
//! traffic, the request encoder, and an async client that drives a
//! single-request-in-flight session over a serial port or UDP socket.

mod classifier;
mod client;
mod decoder;
mod dtc;
mod encoder;
mod error;
mod framer;
mod interface;
mod lookup;
mod pid;
mod protocol;
mod session;
mod transport;

pub use classifier::{EcuResponse, InterfaceResponse, InterpreterStatus, MessageClassifier, MessageKind};
pub use client::{Exchange, ObdClient, DEFAULT_TIMEOUT_MS};
pub use decoder::{parse_hex_tokens, EcuData, EcuResponseDecoder, Mode, ParsedHeader, VehicleInfo};
pub use dtc::{CodeType, DtcCode, DtcDecoder, SystemClass};
pub use encoder::{encode_response, AtCommand, InfoPid, ObdRequest, RequestEncoder, Terminator};
pub use error::{DecodeError, LookupError, ObdError, SessionError};
pub use framer::{ByteStreamFramer, Frame, RawMessage, MAX_BUFFER_LEN, PLACEHOLDER, READY_PROMPT};
pub use interface::{InterfaceInfo, InterfaceResponseDecoder, InterfaceUpdate};
pub use lookup::{DescriptionMap, DescriptionStore};
pub use pid::{EngineParameter, EngineParameterSet, Pid, SupportedPidBitmap};
pub use protocol::ObdProtocol;
pub use session::{ProtocolSession, SessionEvent, SessionState};
pub use transport::{ByteStream, Transport};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
    /// Added to the request mode in the reply mode echo
    pub const RESPONSE_OFFSET: u8 = 0x40;
}
