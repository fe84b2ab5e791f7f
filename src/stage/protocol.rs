// Thorlabs Elliptec ELL7 ASCII protocol
//
// Command frame:  [Address][Opcode][Payload]        e.g. "0ma00000064"
// Response frame: [Address][Tag][Payload] CR LF     e.g. "0PO00000064\r\n"
// Positions travel as 8 uppercase hex digits, 32-bit two's complement.

use std::time::Duration;

/// Line terminator appended to every command and ending every response
pub const TERMINATOR: &[u8; 2] = b"\r\n";

/// Single-device bus: the stage always answers on address 0
pub const DEVICE_ADDRESS: char = '0';

/// Type tag of a position report
pub const POSITION_TAG: &str = "PO";

/// Number of hex digits in a position payload
pub const POSITION_DIGITS: usize = 8;

/// Longest response body the stage sends: address, tag, position payload
pub const MAX_FRAME_LEN: usize = 1 + POSITION_TAG.len() + POSITION_DIGITS;

/// Error types for ELL7 communication
#[derive(Debug, thiserror::Error)]
pub enum Ell7Error {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response {response:?}: expected a {expected} frame")]
    MalformedResponse {
        response: String,
        expected: &'static str,
    },

    #[error("Invalid position payload {payload:?}")]
    InvalidPosition { payload: String },

    #[error("Response is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Timeout after {waited:?} waiting for {awaiting}")]
    Timeout {
        waited: Duration,
        awaiting: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Ell7Error>;

/// Two-letter command mnemonics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Home,
    GetPosition,
    MoveAbsolute,
    MoveRelative,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Home => "ho",
            Opcode::GetPosition => "gp",
            Opcode::MoveAbsolute => "ma",
            Opcode::MoveRelative => "mr",
        }
    }
}

/// A request the stage understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Home,
    GetPosition,
    MoveAbsolute(i32),
    MoveRelative(i32),
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Home => Opcode::Home,
            Command::GetPosition => Opcode::GetPosition,
            Command::MoveAbsolute(_) => Opcode::MoveAbsolute,
            Command::MoveRelative(_) => Opcode::MoveRelative,
        }
    }

    /// Frame body without the terminator, e.g. "0gp"
    pub fn frame(&self) -> String {
        let payload = match *self {
            // Direction byte: 0 = clockwise
            Command::Home => "0".to_string(),
            Command::GetPosition => String::new(),
            Command::MoveAbsolute(pos) | Command::MoveRelative(pos) => encode_position(pos),
        };
        format!("{}{}{}", DEVICE_ADDRESS, self.opcode().mnemonic(), payload)
    }

    /// Bytes as they go on the wire, terminator included
    pub fn to_wire(&self) -> Vec<u8> {
        let mut bytes = self.frame().into_bytes();
        bytes.extend_from_slice(TERMINATOR);
        bytes
    }
}

/// Encode a position as 8 uppercase hex digits (two's complement)
pub fn encode_position(position: i32) -> String {
    format!("{:08X}", position as u32)
}

/// Decode 8 hex digits back into a signed position
pub fn decode_position(digits: &str) -> Result<i32> {
    let invalid = || Ell7Error::InvalidPosition {
        payload: digits.to_string(),
    };

    if digits.len() != POSITION_DIGITS || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let raw = u32::from_str_radix(digits, 16).map_err(|_| invalid())?;
    // Reinterpreting the bits is the same as subtracting 2^32 for raw >= 2^31
    Ok(raw as i32)
}

/// Type tag of a response body (characters 1..3), if the body is long enough
pub fn response_tag(response: &str) -> Option<&str> {
    response.get(1..3)
}

/// Extract the position from a "PO" response body
pub fn extract_position(response: &str) -> Result<i32> {
    if response_tag(response) != Some(POSITION_TAG) {
        return Err(Ell7Error::MalformedResponse {
            response: response.to_string(),
            expected: POSITION_TAG,
        });
    }
    decode_position(&response[3..])
}

/// Reassembles terminated frames from fragmented reads
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet part of a complete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Pop the first complete frame, terminator stripped.
    ///
    /// Bytes after the terminator stay buffered for the next call. A run of
    /// bytes longer than any frame with no terminator in sight is rejected
    /// and dropped.
    pub fn next_frame(&mut self) -> Result<Option<String>> {
        let Some(end) = self
            .buffer
            .windows(TERMINATOR.len())
            .position(|window| window == TERMINATOR)
        else {
            // Room for a full body plus the CR of a split terminator
            if self.buffer.len() > MAX_FRAME_LEN + 1 {
                let response = String::from_utf8_lossy(&self.buffer).into_owned();
                self.buffer.clear();
                return Err(Ell7Error::MalformedResponse {
                    response,
                    expected: "terminated",
                });
            }
            return Ok(None);
        };

        let mut frame: Vec<u8> = self.buffer.drain(..end + TERMINATOR.len()).collect();
        frame.truncate(end);
        Ok(Some(String::from_utf8(frame)?))
    }
}
