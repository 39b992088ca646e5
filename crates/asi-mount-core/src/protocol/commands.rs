//! Protocol commands
//!
//! Every logical command of the AM dialect and its exact wire template.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::sexagesimal::{format_ddd_mm, format_dm, format_dms, format_hms};
use super::MAX_REPLY_LEN;

/// Lower bound of the guide rate, percent of sidereal
pub const MIN_GUIDE_RATE: u32 = 10;
/// Upper bound of the guide rate, percent of sidereal
pub const MAX_GUIDE_RATE: u32 = 90;

/// Longest pulse the 4-digit duration field can carry
pub const MAX_PULSE_FIELD_MS: u32 = 9999;

/// Settle time before reading the reply to `:MS#` and `:CM#`
const MOTION_SETTLE: Duration = Duration::from_millis(100);

/// Manual motion direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Declination increasing
    North,
    /// Declination decreasing
    South,
    /// RA axis, `w`
    West,
    /// RA axis, `e`
    East,
}

impl Direction {
    /// Letter used in `:M?#`, `:Q?#` and `:Mg?` commands
    pub fn letter(&self) -> char {
        match self {
            Direction::North => 'n',
            Direction::South => 's',
            Direction::West => 'w',
            Direction::East => 'e',
        }
    }

    /// Axis this direction moves
    pub fn axis(&self) -> Axis {
        match self {
            Direction::North | Direction::South => Axis::Dec,
            Direction::West | Direction::East => Axis::Ra,
        }
    }
}

/// Mount axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Declination
    Dec,
    /// Right ascension
    Ra,
}

impl Axis {
    /// The two directions of this axis, in (first, second) order:
    /// north/south for Dec, west/east for RA
    pub fn directions(&self) -> (Direction, Direction) {
        match self {
            Axis::Dec => (Direction::North, Direction::South),
            Axis::Ra => (Direction::West, Direction::East),
        }
    }
}

/// Tracking rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackRate {
    /// `:TQ#`
    Sidereal,
    /// `:TS#`
    Solar,
    /// `:TL#`
    Lunar,
}

impl TrackRate {
    /// Pick the first active intent; `None` when no switch is on
    pub fn from_flags(sidereal: bool, solar: bool, lunar: bool) -> Option<Self> {
        if sidereal {
            Some(TrackRate::Sidereal)
        } else if solar {
            Some(TrackRate::Solar)
        } else if lunar {
            Some(TrackRate::Lunar)
        } else {
            None
        }
    }

    fn letter(&self) -> char {
        match self {
            TrackRate::Sidereal => 'Q',
            TrackRate::Solar => 'S',
            TrackRate::Lunar => 'L',
        }
    }
}

/// Manual slew rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlewRate {
    /// `:RG#`
    Guide,
    /// `:RC#`
    Centering,
    /// `:RM#`
    Find,
    /// `:RS#`
    Max,
}

impl SlewRate {
    /// Pick the first active intent; `None` when no switch is on
    pub fn from_flags(guide: bool, centering: bool, find: bool, max: bool) -> Option<Self> {
        [
            (guide, SlewRate::Guide),
            (centering, SlewRate::Centering),
            (find, SlewRate::Find),
            (max, SlewRate::Max),
        ]
        .into_iter()
        .find_map(|(on, rate)| on.then_some(rate))
    }

    fn letter(&self) -> char {
        match self {
            SlewRate::Guide => 'G',
            SlewRate::Centering => 'C',
            SlewRate::Find => 'M',
            SlewRate::Max => 'S',
        }
    }
}

/// Buzzer volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuzzerVolume {
    /// Level 0
    Off,
    /// Level 1
    Low,
    /// Level 2
    High,
}

impl BuzzerVolume {
    /// Wire level used by `:SBu`
    pub fn level(&self) -> u8 {
        match self {
            BuzzerVolume::Off => 0,
            BuzzerVolume::Low => 1,
            BuzzerVolume::High => 2,
        }
    }

    /// Inverse of [`BuzzerVolume::level`]
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(BuzzerVolume::Off),
            1 => Some(BuzzerVolume::Low),
            2 => Some(BuzzerVolume::High),
            _ => None,
        }
    }
}

/// Clamp a guide rate request to the range the mount accepts
pub fn clamp_guide_rate(rate: u32) -> u32 {
    rate.clamp(MIN_GUIDE_RATE, MAX_GUIDE_RATE)
}

/// Convert an east-positive longitude to the mount's west-positive form.
///
/// The longitude is normalized into [0, 360) first, then complemented.
pub fn longitude_to_device(longitude: f64) -> f64 {
    (360.0 - longitude.rem_euclid(360.0)).rem_euclid(360.0)
}

/// Inverse of [`longitude_to_device`], returning a value in (0, 360]
pub fn longitude_from_device(device: f64) -> f64 {
    let device = if device < 0.0 { device + 360.0 } else { device };
    360.0 - device
}

/// Commands understood by the mount
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `:SC` local date
    SetDate(NaiveDate),
    /// `:SH` daylight saving flag (only on DST-capable firmware)
    SetDaylightSaving(bool),
    /// `:SG` UTC offset in hours east; sent negated
    SetUtcOffset(i32),
    /// `:SL` local time
    SetLocalTime(NaiveTime),
    /// `:St` site latitude in degrees
    SetLatitude(f64),
    /// `:Sg` site longitude in degrees east
    SetLongitude(f64),
    /// `:Sr` target right ascension in hours
    SetTargetRa(f64),
    /// `:Sd` target declination in degrees
    SetTargetDec(f64),
    /// `:MS` slew to target
    StartSlew,
    /// `:CM` sync to target
    Sync,
    /// `:Rg` guide rate in percent of sidereal
    SetGuideRate(u32),
    /// `:Mg` timed guide pulse
    GuidePulse {
        /// Pulse direction
        direction: Direction,
        /// Pulse length
        duration_ms: u32,
    },
    /// `:M?` start manual motion
    Move(Direction),
    /// `:Q?` stop manual motion
    Halt(Direction),
    /// `:Te`/`:Td`
    Tracking(bool),
    /// `:T?` select tracking rate
    SetTrackRate(TrackRate),
    /// `:R?` select manual slew rate
    SetSlewRate(SlewRate),
    /// `:hC` go home
    Home,
    /// `:Q` stop all motion
    StopAll,
    /// `:SBu` buzzer volume
    SetBuzzer(BuzzerVolume),
    /// `:GR`
    GetRa,
    /// `:GD`
    GetDec,
    /// `:GC`
    GetDate,
    /// `:GL`
    GetLocalTime,
    /// `:GG`
    GetUtcOffset,
    /// `:GH`
    GetDaylightSaving,
    /// `:GS`
    GetSiderealTime,
    /// `:Gt`
    GetLatitude,
    /// `:Gg`
    GetLongitude,
    /// `:GT`
    GetTrackRate,
    /// `:GU`
    GetStatus,
    /// `:Gm`
    GetPierSide,
    /// `:GV`
    GetFirmware,
    /// `:GVP`
    GetProduct,
    /// `:GBu`
    GetBuzzer,
    /// `:Ggr`
    GetGuideRate,
}

impl Command {
    /// Render the full wire form including `:` and `#`
    pub fn encode(&self) -> String {
        match self {
            Command::SetDate(date) => format!(":SC{}#", date.format("%m/%d/%y")),
            Command::SetDaylightSaving(on) => format!(":SH{}#", u8::from(*on)),
            Command::SetUtcOffset(hours) => format!(":SG{:+03}#", -hours),
            Command::SetLocalTime(time) => format!(":SL{}#", time.format("%H:%M:%S")),
            Command::SetLatitude(lat) => format!(":St{}#", format_dm(*lat)),
            Command::SetLongitude(lon) => {
                format!(":Sg{}#", format_ddd_mm(longitude_to_device(*lon)))
            }
            Command::SetTargetRa(ra) => format!(":Sr{}#", format_hms(*ra)),
            Command::SetTargetDec(dec) => format!(":Sd{}#", format_dms(*dec)),
            Command::StartSlew => ":MS#".to_string(),
            Command::Sync => ":CM#".to_string(),
            Command::SetGuideRate(rate) => {
                // single precision keeps the rounding the firmware expects
                format!(":Rg{:.1}#", clamp_guide_rate(*rate) as f32 / 100.0)
            }
            Command::GuidePulse {
                direction,
                duration_ms,
            } => format!(
                ":Mg{}{:04}#",
                direction.letter(),
                (*duration_ms).min(MAX_PULSE_FIELD_MS)
            ),
            Command::Move(direction) => format!(":M{}#", direction.letter()),
            Command::Halt(direction) => format!(":Q{}#", direction.letter()),
            Command::Tracking(true) => ":Te#".to_string(),
            Command::Tracking(false) => ":Td#".to_string(),
            Command::SetTrackRate(rate) => format!(":T{}#", rate.letter()),
            Command::SetSlewRate(rate) => format!(":R{}#", rate.letter()),
            Command::Home => ":hC#".to_string(),
            Command::StopAll => ":Q#".to_string(),
            Command::SetBuzzer(volume) => format!(":SBu{}#", volume.level()),
            Command::GetRa => ":GR#".to_string(),
            Command::GetDec => ":GD#".to_string(),
            Command::GetDate => ":GC#".to_string(),
            Command::GetLocalTime => ":GL#".to_string(),
            Command::GetUtcOffset => ":GG#".to_string(),
            Command::GetDaylightSaving => ":GH#".to_string(),
            Command::GetSiderealTime => ":GS#".to_string(),
            Command::GetLatitude => ":Gt#".to_string(),
            Command::GetLongitude => ":Gg#".to_string(),
            Command::GetTrackRate => ":GT#".to_string(),
            Command::GetStatus => ":GU#".to_string(),
            Command::GetPierSide => ":Gm#".to_string(),
            Command::GetFirmware => ":GV#".to_string(),
            Command::GetProduct => ":GVP#".to_string(),
            Command::GetBuzzer => ":GBu#".to_string(),
            Command::GetGuideRate => ":Ggr#".to_string(),
        }
    }

    /// Maximum reply length, `None` for commands the mount never answers
    pub fn reply_len(&self) -> Option<usize> {
        match self {
            // :SC is followed by free text the next drain discards
            Command::SetDate(_)
            | Command::SetUtcOffset(_)
            | Command::SetLocalTime(_)
            | Command::SetLatitude(_)
            | Command::SetLongitude(_) => Some(1),
            Command::SetDaylightSaving(_)
            | Command::SetGuideRate(_)
            | Command::GuidePulse { .. }
            | Command::Move(_)
            | Command::Halt(_)
            | Command::Tracking(_)
            | Command::SetTrackRate(_)
            | Command::SetSlewRate(_)
            | Command::Home
            | Command::StopAll
            | Command::SetBuzzer(_) => None,
            _ => Some(MAX_REPLY_LEN),
        }
    }

    /// Pause between the write and the first read
    pub fn post_write_delay(&self) -> Duration {
        match self {
            Command::StartSlew | Command::Sync => MOTION_SETTLE,
            _ => Duration::ZERO,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
