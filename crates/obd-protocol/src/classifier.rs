//! Message Classification
//!
//! Sorts framed messages into interpreter prompts, AT replies and ECU
//! replies by their leading character, and recognises the interpreter's
//! plain-text status replies (`NO DATA`, `CAN ERROR`, ...).

use crate::framer::{RawMessage, READY_PROMPT};
use std::fmt;

/// Reply to a Mode 01/03/09 request (starts with the `4x` mode echo)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcuResponse(String);

impl EcuResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

/// Reply to an AT command (starts with `A`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceResponse(String);

impl InterfaceResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

/// Category of a framed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    InterfaceReady,
    InterfaceResponse(InterfaceResponse),
    EcuResponse(EcuResponse),
    Malformed,
}

/// Leading-character classifier
pub struct MessageClassifier;

impl MessageClassifier {
    pub fn classify(msg: &RawMessage) -> MessageKind {
        if msg.is_empty() || !msg.is_terminated() {
            return MessageKind::Malformed;
        }

        let text = msg.text();
        match text.as_bytes()[0] {
            READY_PROMPT => MessageKind::InterfaceReady,
            b'4' => MessageKind::EcuResponse(EcuResponse::new(text)),
            b'A' | b'a' => MessageKind::InterfaceResponse(InterfaceResponse::new(text)),
            _ => MessageKind::Malformed,
        }
    }
}

/// Plain-text condition reported by the interpreter instead of data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterStatus {
    /// ECU did not answer the request
    NoData,
    /// Interpreter did not understand the command (`?`)
    Unknown,
    Error,
    UnableToConnect,
    /// `BUS INIT: ...` still in progress or succeeded
    BusInit,
    /// `BUS INIT: ...ERROR`
    BusInitError,
    CanError,
    BusBusy,
    BufferFull,
    Stopped,
    /// Automatic protocol search in progress
    Searching,
}

impl InterpreterStatus {
    /// Recognise a status reply
    pub fn detect(text: &str) -> Option<Self> {
        let upper = text.trim().to_ascii_uppercase();
        let status = if upper == "?" {
            InterpreterStatus::Unknown
        } else if upper.starts_with("NO DATA") {
            InterpreterStatus::NoData
        } else if upper.starts_with("SEARCHING") {
            InterpreterStatus::Searching
        } else if upper.starts_with("UNABLE TO CONNECT") {
            InterpreterStatus::UnableToConnect
        } else if upper.starts_with("BUS INIT") {
            if upper.contains("ERROR") {
                InterpreterStatus::BusInitError
            } else {
                InterpreterStatus::BusInit
            }
        } else if upper.starts_with("CAN ERROR") {
            InterpreterStatus::CanError
        } else if upper.starts_with("BUS BUSY") {
            InterpreterStatus::BusBusy
        } else if upper.starts_with("BUFFER FULL") {
            InterpreterStatus::BufferFull
        } else if upper.starts_with("STOPPED") {
            InterpreterStatus::Stopped
        } else if upper.contains("ERROR") {
            InterpreterStatus::Error
        } else {
            return None;
        };
        Some(status)
    }

    /// Progress notices that carry no result for the request
    pub fn is_informational(&self) -> bool {
        matches!(self, InterpreterStatus::Searching | InterpreterStatus::BusInit)
    }

    /// Canonical reply text
    pub fn as_str(&self) -> &'static str {
        match self {
            InterpreterStatus::NoData => "NO DATA",
            InterpreterStatus::Unknown => "?",
            InterpreterStatus::Error => "ERROR",
            InterpreterStatus::UnableToConnect => "UNABLE TO CONNECT",
            InterpreterStatus::BusInit => "BUS INIT: ...",
            InterpreterStatus::BusInitError => "BUS INIT: ...ERROR",
            InterpreterStatus::CanError => "CAN ERROR",
            InterpreterStatus::BusBusy => "BUS BUSY",
            InterpreterStatus::BufferFull => "BUFFER FULL",
            InterpreterStatus::Stopped => "STOPPED",
            InterpreterStatus::Searching => "SEARCHING...",
        }
    }
}

impl fmt::Display for InterpreterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
