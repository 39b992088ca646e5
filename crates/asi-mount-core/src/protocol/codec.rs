//! Reply decoding
//!
//! Turns raw reply bytes into typed values and classifies accept,
//! reject and `e<code>` replies.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::commands::{longitude_from_device, BuzzerVolume, Command, TrackRate};
use super::sexagesimal::{parse_angle, parse_triplet, tokenize};
use super::{DeviceError, ParseError, ProtocolError};

/// Product prefix of supported mounts
const PRODUCT_FAMILY: &str = "AM";

/// Side of pier reported by `:Gm#`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PierSide {
    /// `W`
    West,
    /// `E`
    East,
    /// Neutral, e.g. while parked at home
    Unknown,
}

/// Mounting geometry reported by `:GU#`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MountMode {
    /// `G` flag present
    Equatorial,
    /// `Z` flag present
    AltAz,
}

/// Decoded `:GU#` status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountStatus {
    /// `N`: no axis is moving
    pub idle: bool,
    /// Absence of `n`
    pub tracking: bool,
    /// `H`
    pub at_home: bool,
    /// `G` or `Z`
    pub mode: Option<MountMode>,
}

/// Reply bytes as text, for logs and error messages
pub fn reply_text(reply: &[u8]) -> String {
    String::from_utf8_lossy(reply).into_owned()
}

/// Extract the device error from an `e<digits>` reply
pub fn parse_error_code(reply: &[u8]) -> Option<DeviceError> {
    let digits = reply.strip_prefix(b"e")?;
    let end = digits
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let code = std::str::from_utf8(&digits[..end]).ok()?.parse::<u32>().ok();
    // overlong codes are still errors, just not ones in the table
    Some(code.map_or(DeviceError::Unknown, DeviceError::from_code))
}

/// Check a one-byte acknowledgement.
///
/// An empty reply is a timeout, `e<n>` is a device error and anything
/// else not starting with `accept` is a rejection.
pub fn check_reply(command: &Command, reply: &[u8], accept: u8) -> Result<(), ProtocolError> {
    match reply.first() {
        None => Err(ProtocolError::Timeout(command.encode())),
        Some(&b) if b == accept => Ok(()),
        Some(_) => Err(classify_failure(command, reply)),
    }
}

/// Error for a reply that is not the expected acknowledgement
pub fn classify_failure(command: &Command, reply: &[u8]) -> ProtocolError {
    match parse_error_code(reply) {
        Some(error) => ProtocolError::Device {
            command: command.encode(),
            error,
        },
        None => ProtocolError::Rejected {
            command: command.encode(),
            reply: reply_text(reply),
        },
    }
}

/// Right ascension in hours from `HH:MM:SS`
pub fn decode_ra(reply: &str) -> Result<f64, ParseError> {
    parse_angle(reply)
}

/// Declination in degrees from `±DD*MM:SS`
pub fn decode_dec(reply: &str) -> Result<f64, ParseError> {
    parse_angle(reply)
}

/// Site latitude in degrees from `±DD*MM`
pub fn decode_latitude(reply: &str) -> Result<f64, ParseError> {
    parse_angle(reply)
}

/// Site longitude in degrees east from the device's west-positive form
pub fn decode_longitude(reply: &str) -> Result<f64, ParseError> {
    Ok(longitude_from_device(parse_angle(reply)?))
}

/// Sidereal time in hours from `HH:MM:SS`
pub fn decode_sidereal_time(reply: &str) -> Result<f64, ParseError> {
    parse_angle(reply)
}

/// Local date from `MM/DD/YY`. Two-digit years map to 2000-2099.
pub fn decode_date(reply: &str) -> Result<NaiveDate, ParseError> {
    let [month, day, year] = parse_triplet(reply)?;
    NaiveDate::from_ymd_opt(2000 + year as i32, month, day).ok_or_else(|| {
        ParseError::OutOfRange {
            input: reply.to_string(),
            index: if (1..=12).contains(&month) { 1 } else { 0 },
        }
    })
}

/// Local time from `HH:MM:SS`
pub fn decode_local_time(reply: &str) -> Result<NaiveTime, ParseError> {
    let [hour, minute, second] = parse_triplet(reply)?;
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| ParseError::OutOfRange {
        input: reply.to_string(),
        index: if hour > 23 { 0 } else if minute > 59 { 1 } else { 2 },
    })
}

/// UTC offset in hours east. The mount reports the negated value.
pub fn decode_utc_offset(reply: &str) -> Result<i32, ParseError> {
    let parsed = tokenize(reply)?;
    let [field] = parsed.fields.as_slice() else {
        return Err(ParseError::FieldCount {
            input: reply.to_string(),
            expected: 1,
            found: parsed.fields.len(),
        });
    };
    if field.width > 2 || field.whole > 14 {
        return Err(ParseError::OutOfRange {
            input: reply.to_string(),
            index: 0,
        });
    }
    let device = field.whole as i32;
    Ok(if parsed.negative { device } else { -device })
}

/// Daylight saving flag from `:GH#`
pub fn decode_flag(reply: &str) -> Result<bool, ParseError> {
    match reply.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        "" => Err(ParseError::Empty),
        other => Err(ParseError::InvalidNumber(other.to_string())),
    }
}

/// Status letters from `:GU#`
pub fn decode_status(reply: &str) -> MountStatus {
    let mode = if reply.contains('G') {
        Some(MountMode::Equatorial)
    } else if reply.contains('Z') {
        Some(MountMode::AltAz)
    } else {
        None
    };
    MountStatus {
        idle: reply.contains('N'),
        tracking: !reply.contains('n'),
        at_home: reply.contains('H'),
        mode,
    }
}

/// Pier side from `:Gm#`, `None` when no known letter is present
pub fn decode_pier_side(reply: &str) -> Option<PierSide> {
    if reply.contains('W') {
        Some(PierSide::West)
    } else if reply.contains('E') {
        Some(PierSide::East)
    } else if reply.contains('N') {
        Some(PierSide::Unknown)
    } else {
        None
    }
}

/// Tracking rate from `:GT#`: 0 sidereal, 1 lunar, 2 solar
pub fn decode_track_rate(reply: &str) -> Option<TrackRate> {
    if reply.contains('0') {
        Some(TrackRate::Sidereal)
    } else if reply.contains('1') {
        Some(TrackRate::Lunar)
    } else if reply.contains('2') {
        Some(TrackRate::Solar)
    } else {
        None
    }
}

/// Buzzer volume from `:GBu#`. Levels are checked lowest first.
pub fn decode_buzzer(reply: &str) -> Option<BuzzerVolume> {
    [
        ('0', BuzzerVolume::Off),
        ('1', BuzzerVolume::Low),
        ('2', BuzzerVolume::High),
    ]
    .into_iter()
    .find_map(|(digit, volume)| reply.contains(digit).then_some(volume))
}

/// Guide rate in percent of sidereal from a decimal fraction (`0.50`)
pub fn decode_guide_rate(reply: &str) -> Result<u32, ParseError> {
    let text = reply.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    let rate: f64 = text
        .parse()
        .map_err(|_| ParseError::InvalidNumber(text.to_string()))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(ParseError::OutOfRange {
            input: text.to_string(),
            index: 0,
        });
    }
    Ok((rate * 100.0).round() as u32)
}

/// True when the product string names an AM-series mount (`AM` + digit)
pub fn is_supported_product(product: &str) -> bool {
    product
        .strip_prefix(PRODUCT_FAMILY)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_digit())
}
