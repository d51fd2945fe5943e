//! HARDWARE command payloads.
//!
//! A HARDWARE payload is a list of `\0`-separated UTF-8 fields.  The first
//! field is the operation, the second the pin number, and the rest (for
//! writes) are the values:
//!
//! ```text
//! vw\04\0255          virtual write: pin 4 = "255"
//! vr\05               virtual read request for pin 5
//! vr\01\02\03         sync request for pins 1, 2 and 3 (HARDWARE_SYNC)
//! ```
//!
//! Digital/analog pin operations (`dw`, `aw`, `pm`, ...) exist in the wider
//! protocol but are not handled here.

use thiserror::Error;

use crate::protocol::command::{join_fields, FIELD_SEPARATOR};

/// Virtual pin number (V0..V255).
pub type VirtualPin = u8;

/// Reasons a HARDWARE payload could not be interpreted.
///
/// These are not connection-fatal: the frame itself was well formed, only
/// its content is not something this client understands.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HardwareError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("payload has no pin field")]
    MissingPin,

    #[error("invalid virtual pin: {0:?}")]
    InvalidPin(String),

    #[error("unsupported hardware operation: {0:?}")]
    UnsupportedOperation(String),
}

/// A parsed virtual-pin operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCommand {
    /// `vw`: the pin was written with one or more values.
    VirtualWrite { pin: VirtualPin, values: Vec<String> },
    /// `vr`: the pins' current values are requested.
    VirtualRead { pins: Vec<VirtualPin> },
}

impl HardwareCommand {
    /// Parses a HARDWARE or HARDWARE_SYNC payload.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] if the payload is not UTF-8, lacks a pin, has a
    /// non-numeric pin, or names an operation other than `vw`/`vr`.
    pub fn parse(payload: &[u8]) -> Result<Self, HardwareError> {
        let text = std::str::from_utf8(payload).map_err(|_| HardwareError::InvalidUtf8)?;
        let mut fields = text.split(FIELD_SEPARATOR as char);
        let operation = fields.next().unwrap_or_default();

        match operation {
            "vw" => {
                let pin = parse_pin(fields.next())?;
                let values = fields.map(str::to_owned).collect();
                Ok(HardwareCommand::VirtualWrite { pin, values })
            }
            "vr" => {
                let first = parse_pin(fields.next())?;
                let mut pins = vec![first];
                for field in fields {
                    pins.push(parse_pin(Some(field))?);
                }
                Ok(HardwareCommand::VirtualRead { pins })
            }
            other => Err(HardwareError::UnsupportedOperation(other.to_owned())),
        }
    }

    /// Builds the wire payload for this command.
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            HardwareCommand::VirtualWrite { pin, values } => {
                let mut fields = Vec::with_capacity(values.len() + 2);
                fields.push("vw".to_owned());
                fields.push(pin.to_string());
                fields.extend(values.iter().cloned());
                join_fields(&fields)
            }
            HardwareCommand::VirtualRead { pins } => {
                let mut fields = Vec::with_capacity(pins.len() + 1);
                fields.push("vr".to_owned());
                fields.extend(pins.iter().map(u8::to_string));
                join_fields(&fields)
            }
        }
    }
}

fn parse_pin(field: Option<&str>) -> Result<VirtualPin, HardwareError> {
    let field = field.filter(|f| !f.is_empty()).ok_or(HardwareError::MissingPin)?;
    field
        .parse()
        .map_err(|_| HardwareError::InvalidPin(field.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_virtual_write_single_value() {
        // Arrange / Act
        let cmd = HardwareCommand::parse(b"vw\x004\x00255").unwrap();

        // Assert
        assert_eq!(
            cmd,
            HardwareCommand::VirtualWrite {
                pin: 4,
                values: vec!["255".to_owned()]
            }
        );
    }

    #[test]
    fn test_parse_virtual_write_multiple_values() {
        let cmd = HardwareCommand::parse(b"vw\x0012\x001\x002\x003").unwrap();
        assert_eq!(
            cmd,
            HardwareCommand::VirtualWrite {
                pin: 12,
                values: vec!["1".to_owned(), "2".to_owned(), "3".to_owned()]
            }
        );
    }

    #[test]
    fn test_parse_virtual_write_keeps_empty_value() {
        let cmd = HardwareCommand::parse(b"vw\x001\x00").unwrap();
        assert_eq!(
            cmd,
            HardwareCommand::VirtualWrite {
                pin: 1,
                values: vec![String::new()]
            }
        );
    }

    #[test]
    fn test_parse_virtual_read() {
        let cmd = HardwareCommand::parse(b"vr\x005").unwrap();
        assert_eq!(cmd, HardwareCommand::VirtualRead { pins: vec![5] });
    }

    #[test]
    fn test_parse_missing_pin() {
        assert_eq!(HardwareCommand::parse(b"vw"), Err(HardwareError::MissingPin));
        assert_eq!(HardwareCommand::parse(b"vr\x00"), Err(HardwareError::MissingPin));
    }

    #[test]
    fn test_parse_pin_out_of_range() {
        assert_eq!(
            HardwareCommand::parse(b"vw\x00256\x001"),
            Err(HardwareError::InvalidPin("256".to_owned()))
        );
    }

    #[test]
    fn test_parse_digital_write_is_unsupported() {
        assert_eq!(
            HardwareCommand::parse(b"dw\x0013\x001"),
            Err(HardwareError::UnsupportedOperation("dw".to_owned()))
        );
    }

    #[test]
    fn test_parse_invalid_utf8() {
        assert_eq!(
            HardwareCommand::parse(&[b'v', b'w', 0, 0xFF]),
            Err(HardwareError::InvalidUtf8)
        );
    }

    #[test]
    fn test_virtual_write_payload() {
        let cmd = HardwareCommand::VirtualWrite {
            pin: 5,
            values: vec!["42".to_owned()],
        };
        assert_eq!(cmd.to_payload(), b"vw\x005\x0042");
    }

    #[test]
    fn test_sync_payload_lists_all_pins() {
        let cmd = HardwareCommand::VirtualRead { pins: vec![1, 2, 3] };
        assert_eq!(cmd.to_payload(), b"vr\x001\x002\x003");
    }
}
