//! OBD-II Protocol Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// ELM327 protocol selections, numbered as in `ATSP n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto = 0,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm = 1,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw = 2,
    /// ISO 9141-2 (5 baud init, 10.4 kbaud)
    Iso9141_2 = 3,
    /// ISO 14230-4 KWP (5 baud init)
    Iso14230_4Kwp = 4,
    /// ISO 14230-4 KWP (fast init)
    Iso14230_4KwpFast = 5,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500 = 6,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500 = 7,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250 = 8,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250 = 9,
    /// SAE J1939 CAN (29 bit ID, 250 kbaud)
    J1939Can = 10,
    /// USER1 CAN (11 bit ID, 125 kbaud)
    User1Can = 11,
    /// USER2 CAN (11 bit ID, 50 kbaud)
    User2Can = 12,
}

impl ObdProtocol {
    pub const ALL: [ObdProtocol; 13] = [
        ObdProtocol::Auto,
        ObdProtocol::J1850Pwm,
        ObdProtocol::J1850Vpw,
        ObdProtocol::Iso9141_2,
        ObdProtocol::Iso14230_4Kwp,
        ObdProtocol::Iso14230_4KwpFast,
        ObdProtocol::Iso15765_4Can11bit500,
        ObdProtocol::Iso15765_4Can29bit500,
        ObdProtocol::Iso15765_4Can11bit250,
        ObdProtocol::Iso15765_4Can29bit250,
        ObdProtocol::J1939Can,
        ObdProtocol::User1Can,
        ObdProtocol::User2Can,
    ];

    /// Resolve a protocol number, `None` above 0x0C
    pub fn try_from_number(number: u8) -> Option<Self> {
        Self::ALL.get(number as usize).copied()
    }

    /// Resolve a protocol number; out-of-range numbers clamp to `Auto`
    pub fn from_number(number: u8) -> Self {
        Self::ALL
            .get(number as usize)
            .copied()
            .unwrap_or(ObdProtocol::Auto)
    }

    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Canonical protocol name
    pub fn name(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "Automatic OBD-II Protocol Search",
            ObdProtocol::J1850Pwm => "SAE J1850 PWM (41.6 kbaud)",
            ObdProtocol::J1850Vpw => "SAE J1850 VPW (10.4 kbaud)",
            ObdProtocol::Iso9141_2 => "ISO 9141-2 (5 baud init, 10.4 kbaud)",
            ObdProtocol::Iso14230_4Kwp => "ISO 14230-4 KWP (5 baud init, 10.4 kbaud)",
            ObdProtocol::Iso14230_4KwpFast => "ISO 14230-4 KWP (fast init, 10.4 kbaud)",
            ObdProtocol::Iso15765_4Can11bit500 => "ISO 15765-4 CAN (11 bit ID, 500 kbaud)",
            ObdProtocol::Iso15765_4Can29bit500 => "ISO 15765-4 CAN (29 bit ID, 500 kbaud)",
            ObdProtocol::Iso15765_4Can11bit250 => "ISO 15765-4 CAN (11 bit ID, 250 kbaud)",
            ObdProtocol::Iso15765_4Can29bit250 => "ISO 15765-4 CAN (29 bit ID, 250 kbaud)",
            ObdProtocol::J1939Can => "SAE J1939 CAN (29 bit ID, 250 kbaud)",
            ObdProtocol::User1Can => "USER1 CAN (11 bit ID, 125 kbaud)",
            ObdProtocol::User2Can => "USER2 CAN (11 bit ID, 50 kbaud)",
        }
    }

    /// Get the ELM327 AT command for this protocol
    pub fn to_elm_command(&self) -> String {
        format!("ATSP{:X}", self.number())
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        self.number() >= ObdProtocol::Iso15765_4Can11bit500.number()
    }
}

impl fmt::Display for ObdProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X} - {}", self.number(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_bounds() {
        assert_eq!(ObdProtocol::from_number(0).name(), "Automatic OBD-II Protocol Search");
        assert_eq!(ObdProtocol::from_number(12), ObdProtocol::User2Can);
        assert_eq!(ObdProtocol::from_number(12).name(), "USER2 CAN (11 bit ID, 50 kbaud)");
        assert_eq!(ObdProtocol::from_number(13), ObdProtocol::Auto);
        assert_eq!(ObdProtocol::from_number(0xFF), ObdProtocol::Auto);
    }

    #[test]
    fn test_numbers_match_table_index() {
        for (idx, protocol) in ObdProtocol::ALL.iter().enumerate() {
            assert_eq!(protocol.number() as usize, idx);
        }
    }

    #[test]
    fn test_elm_command() {
        assert_eq!(ObdProtocol::Iso15765_4Can11bit500.to_elm_command(), "ATSP6");
        assert_eq!(ObdProtocol::User2Can.to_elm_command(), "ATSPC");
    }

    #[test]
    fn test_is_can() {
        assert!(ObdProtocol::Iso15765_4Can29bit250.is_can());
        assert!(ObdProtocol::User1Can.is_can());
        assert!(!ObdProtocol::Iso9141_2.is_can());
        assert!(!ObdProtocol::Auto.is_can());
    }
}
