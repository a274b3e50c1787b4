//! Diagnostic Trouble Codes
//!
//! Mode 03 replies pack each trouble code into two bytes: the top two bits
//! select the system letter, the next two the code type digit and the
//! remaining three nibbles the code number.

use crate::classifier::EcuResponse;
use crate::decoder::parse_hex_tokens;
use crate::error::DecodeError;
use crate::mode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vehicle system the code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemClass {
    Powertrain,
    Chassis,
    Body,
    Network,
}

impl SystemClass {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => SystemClass::Powertrain,
            1 => SystemClass::Chassis,
            2 => SystemClass::Body,
            _ => SystemClass::Network,
        }
    }

    pub fn bits(&self) -> u8 {
        *self as u8
    }

    pub fn letter(&self) -> char {
        match self {
            SystemClass::Powertrain => 'P',
            SystemClass::Chassis => 'C',
            SystemClass::Body => 'B',
            SystemClass::Network => 'U',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'P' => Some(SystemClass::Powertrain),
            'C' => Some(SystemClass::Chassis),
            'B' => Some(SystemClass::Body),
            'U' => Some(SystemClass::Network),
            _ => None,
        }
    }
}

/// Second character of the code (0-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeType {
    /// 0: SAE generic
    Generic,
    /// 1: manufacturer specific
    ManufacturerSpecific,
    /// 2: SAE generic (extended range)
    GenericExtended,
    /// 3: manufacturer specific or reserved
    ManufacturerExtended,
}

impl CodeType {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => CodeType::Generic,
            1 => CodeType::ManufacturerSpecific,
            2 => CodeType::GenericExtended,
            _ => CodeType::ManufacturerExtended,
        }
    }

    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

/// A five character trouble code such as `P0133`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DtcCode {
    pub system: SystemClass,
    pub code_type: CodeType,
    /// Uppercase hex digits
    pub digits: [char; 3],
}

fn hex_digit(nibble: u8) -> char {
    char::from_digit((nibble & 0x0F) as u32, 16)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('0')
}

impl DtcCode {
    /// Unpack the two code bytes
    pub fn from_bytes(b1: u8, b2: u8) -> Self {
        Self {
            system: SystemClass::from_bits(b1 >> 6),
            code_type: CodeType::from_bits(b1 >> 4),
            digits: [hex_digit(b1), hex_digit(b2 >> 4), hex_digit(b2)],
        }
    }

    /// Pack back into the two code bytes
    pub fn to_bytes(&self) -> [u8; 2] {
        let nibble = |c: char| c.to_digit(16).unwrap_or(0) as u8;
        let b1 = self.system.bits() << 6 | self.code_type.bits() << 4 | nibble(self.digits[0]);
        let b2 = nibble(self.digits[1]) << 4 | nibble(self.digits[2]);
        [b1, b2]
    }

    /// `P0000` is padding, not a fault
    pub fn is_empty(&self) -> bool {
        self.to_bytes() == [0, 0]
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.system.letter(),
            self.code_type.bits(),
            self.digits[0],
            self.digits[1],
            self.digits[2]
        )
    }
}

impl FromStr for DtcCode {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecodeError::MalformedPayload(format!("invalid trouble code: {}", s));
        let chars: Vec<char> = s.trim().chars().collect();
        if chars.len() != 5 {
            return Err(invalid());
        }

        let system = SystemClass::from_letter(chars[0]).ok_or_else(invalid)?;
        let code_type = chars[1]
            .to_digit(10)
            .filter(|d| *d <= 3)
            .map(|d| CodeType::from_bits(d as u8))
            .ok_or_else(invalid)?;

        let mut digits = ['0'; 3];
        for (slot, c) in digits.iter_mut().zip(&chars[2..]) {
            if !c.is_ascii_hexdigit() {
                return Err(invalid());
            }
            *slot = c.to_ascii_uppercase();
        }

        Ok(Self {
            system,
            code_type,
            digits,
        })
    }
}

/// Decoder for single-code Mode 03 replies (`43 <count> <B1> <B2> 00 00 00`)
pub struct DtcDecoder;

impl DtcDecoder {
    /// Decode the first code of a Mode 03 reply.
    ///
    /// Only the first code slot is read; further slots are ignored.
    pub fn decode(msg: &EcuResponse) -> Result<DtcCode, DecodeError> {
        let bytes = parse_hex_tokens(msg.text())?;

        let mode_echo = *bytes
            .first()
            .ok_or_else(|| DecodeError::MalformedPayload(msg.text().to_string()))?;
        if mode_echo != mode::READ_DTC + mode::RESPONSE_OFFSET {
            return Err(DecodeError::UnsupportedMode(mode_echo));
        }

        if bytes.len() < 4 {
            return Err(DecodeError::TruncatedPayload {
                pid: mode::READ_DTC,
                expected: 3,
                actual: bytes.len().saturating_sub(1),
            });
        }

        Ok(DtcCode::from_bytes(bytes[2], bytes[3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_p0133() {
        let msg = EcuResponse::new("43 01 01 33 00 00 00");
        let code = DtcDecoder::decode(&msg).unwrap();
        assert_eq!(code.system, SystemClass::Powertrain);
        assert_eq!(code.code_type, CodeType::Generic);
        assert_eq!(code.to_string(), "P0133");
    }

    #[test]
    fn test_system_letters() {
        assert_eq!(DtcCode::from_bytes(0x41, 0x23).to_string(), "C0123");
        assert_eq!(DtcCode::from_bytes(0x9A, 0xBC).to_string(), "B1ABC");
        assert_eq!(DtcCode::from_bytes(0xF0, 0x01).to_string(), "U3001");
    }

    #[test]
    fn test_rendering_always_five_chars() {
        for b1 in [0x00u8, 0x3F, 0x80, 0xFF] {
            for b2 in [0x00u8, 0x0F, 0xF0, 0xFF] {
                assert_eq!(DtcCode::from_bytes(b1, b2).to_string().len(), 5);
            }
        }
    }

    #[test]
    fn test_from_str_and_bytes() {
        let code: DtcCode = "p0133".parse().unwrap();
        assert_eq!(code.to_bytes(), [0x01, 0x33]);
        assert_eq!(code, DtcCode::from_bytes(0x01, 0x33));

        assert!("P4133".parse::<DtcCode>().is_err());
        assert!("X0133".parse::<DtcCode>().is_err());
        assert!("P013".parse::<DtcCode>().is_err());
    }

    #[test]
    fn test_padding_code_is_empty() {
        let code = DtcDecoder::decode(&EcuResponse::new("43 00 00 00 00 00 00")).unwrap();
        assert!(code.is_empty());
        assert!(!DtcCode::from_bytes(0x01, 0x33).is_empty());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            DtcDecoder::decode(&EcuResponse::new("41 0C 1A F8")),
            Err(DecodeError::UnsupportedMode(0x41))
        );
        assert_eq!(
            DtcDecoder::decode(&EcuResponse::new("43 00")),
            Err(DecodeError::TruncatedPayload { pid: 0x03, expected: 3, actual: 1 })
        );
        assert!(matches!(
            DtcDecoder::decode(&EcuResponse::new("43 0G 01 33")),
            Err(DecodeError::MalformedPayload(_))
        ));
    }
}
