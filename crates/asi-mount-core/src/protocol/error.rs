//! Protocol errors

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while talking to the mount
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Opening or configuring the serial port failed
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Reading from or writing to the link failed
    #[error("Link I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The mount sent nothing back (carries the command)
    #[error("No reply from mount to {0}")]
    Timeout(String),

    /// The link is closed or was never opened
    #[error("Not connected to mount")]
    NotConnected,

    /// The network endpoint could not be reached
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The port string names no usable target
    #[error("Invalid link target: {0}")]
    InvalidTarget(String),

    /// The mount answered with something other than the acknowledgement
    #[error("{command} rejected with reply '{reply}'")]
    Rejected {
        /// Wire form of the command
        command: String,
        /// Reply text as received
        reply: String,
    },

    /// The mount reported an `e<code>` error
    #[error("{command} failed: {error}")]
    Device {
        /// Wire form of the command
        command: String,
        /// Decoded error code
        error: DeviceError,
    },

    /// A fixed-format reply did not parse
    #[error("Malformed reply to {command}: {source}")]
    Malformed {
        /// Wire form of the command
        command: String,
        /// What was wrong with the reply
        #[source]
        source: ParseError,
    },

    /// The product is not an AM-series mount
    #[error("Unsupported device: product '{0}'")]
    UnsupportedDevice(String),

    /// A caller-supplied value was rejected before anything was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ProtocolError {
    /// Device-reported error code carried by this error, if any
    pub fn device_error(&self) -> Option<DeviceError> {
        match self {
            ProtocolError::Device { error, .. } => Some(*error),
            _ => None,
        }
    }

    /// True for failures of the byte stream itself. The link should be
    /// considered unusable until it is re-opened.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::SerialError(_) | ProtocolError::IoError(_) | ProtocolError::NotConnected
        )
    }
}

/// Error codes reported by the mount as `e<code>` replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceError {
    /// `e0`
    None,
    /// `e1`
    OutOfRange,
    /// `e2`
    FormatError,
    /// `e3`
    NotInitialized,
    /// `e4`
    MountMoving,
    /// `e5`
    BelowHorizon,
    /// `e6`
    BelowAltitudeLimit,
    /// `e7`
    TimeLocationNotSet,
    /// `e8` and anything not in the table
    Unknown,
}

impl DeviceError {
    /// Map a numeric code to its error. Codes outside the table are `Unknown`.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => DeviceError::None,
            1 => DeviceError::OutOfRange,
            2 => DeviceError::FormatError,
            3 => DeviceError::NotInitialized,
            4 => DeviceError::MountMoving,
            5 => DeviceError::BelowHorizon,
            6 => DeviceError::BelowAltitudeLimit,
            7 => DeviceError::TimeLocationNotSet,
            _ => DeviceError::Unknown,
        }
    }

    /// Numeric code as sent by the mount
    pub fn code(&self) -> u32 {
        match self {
            DeviceError::None => 0,
            DeviceError::OutOfRange => 1,
            DeviceError::FormatError => 2,
            DeviceError::NotInitialized => 3,
            DeviceError::MountMoving => 4,
            DeviceError::BelowHorizon => 5,
            DeviceError::BelowAltitudeLimit => 6,
            DeviceError::TimeLocationNotSet => 7,
            DeviceError::Unknown => 8,
        }
    }

    /// Human-readable message
    pub fn message(&self) -> &'static str {
        match self {
            DeviceError::None => "",
            DeviceError::OutOfRange => "Parameters out of range",
            DeviceError::FormatError => "Format error",
            DeviceError::NotInitialized => "Mount not initialized",
            DeviceError::MountMoving => "Mount is moving",
            DeviceError::BelowHorizon => "Target is below horizon",
            DeviceError::BelowAltitudeLimit => "Target is below the altitude limit",
            DeviceError::TimeLocationNotSet => "Time and location is not set",
            DeviceError::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (e{})", self.message(), self.code())
    }
}

/// Errors from the fixed-format reply tokenizer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing to parse
    #[error("empty reply")]
    Empty,

    /// A sign, delimiter or fraction in the wrong place
    #[error("unexpected character {found:?} at offset {offset} in '{input}'")]
    UnexpectedChar {
        /// Full reply text
        input: String,
        /// Byte offset of the character
        offset: usize,
        /// The character itself
        found: char,
    },

    /// A digit group has the wrong number of digits
    #[error("field {index} has {width} digits in '{input}'")]
    FieldWidth {
        /// Full reply text
        input: String,
        /// Zero-based field index
        index: usize,
        /// Digits found
        width: usize,
    },

    /// Too few or too many digit groups
    #[error("expected {expected} fields, found {found} in '{input}'")]
    FieldCount {
        /// Full reply text
        input: String,
        /// Fields required
        expected: usize,
        /// Fields present
        found: usize,
    },

    /// A field value is outside its range (minutes >= 60, month 13, ...)
    #[error("field {index} out of range in '{input}'")]
    OutOfRange {
        /// Full reply text
        input: String,
        /// Zero-based field index
        index: usize,
    },

    /// Digits that do not form a number
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}
