//! Mount command set
//!
//! Typed operations built from one or more channel exchanges. Multi-step
//! operations stop at the first unexpected reply.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::state::{AxisMotion, SessionState, Site};
use crate::config::MountConfig;
use crate::protocol::codec::{self, reply_text};
use crate::protocol::commands::{clamp_guide_rate, MAX_PULSE_FIELD_MS};
use crate::protocol::{
    Axis, BuzzerVolume, Channel, Command, Direction, MountMode, MountStatus, ParseError,
    PierSide, ProtocolError, SlewRate, TrackRate,
};

/// Device clocks earlier than 2001-01-01T01:00:00Z mean the mount lost
/// its time and site
const CLOCK_VALID_AFTER: i64 = 978_310_800;

/// Firmware-dependent behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountOptions {
    /// Send `:SH` and read `:GH`
    pub use_dst_commands: bool,
    /// Flag sent with `:SH`
    pub daylight_saving: bool,
}

impl From<&MountConfig> for MountOptions {
    fn from(config: &MountConfig) -> Self {
        Self {
            use_dst_commands: config.use_dst_commands,
            daylight_saving: config.daylight_saving,
        }
    }
}

/// Mount clock as read back from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTime {
    /// Mount clock converted to UTC
    pub utc: DateTime<Utc>,
    /// Hours east of UTC
    pub utc_offset: i32,
    /// Only reported by DST-capable firmware
    pub daylight_saving: Option<bool>,
}

/// What [`Mount::initialize`] learned about the mount
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MountInfo {
    /// Firmware version string
    pub firmware: Option<String>,
    /// Guide rate in percent of sidereal
    pub guide_rate: Option<u32>,
    /// Equatorial or alt-az
    pub mode: Option<MountMode>,
    /// Site stored in the mount
    pub site: Option<Site>,
    /// Mount clock at connect time
    pub device_time: Option<DeviceTime>,
    /// Host time and site were written because the mount clock was unset
    pub clock_reset: bool,
    /// Active tracking rate
    pub track_rate: Option<TrackRate>,
    /// Buzzer volume
    pub buzzer: Option<BuzzerVolume>,
}

/// A connected mount: the command channel plus the local session model
pub struct Mount {
    channel: Channel,
    state: Mutex<SessionState>,
    options: MountOptions,
}

impl Mount {
    /// Wrap an open channel. Nothing is sent until a command is issued.
    pub fn new(channel: Channel, options: MountOptions) -> Self {
        Self {
            channel,
            state: Mutex::new(SessionState::default()),
            options,
        }
    }

    /// The underlying command channel
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Firmware options this mount was opened with
    pub fn options(&self) -> MountOptions {
        self.options
    }

    /// Snapshot of the session model
    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send one command and return the raw reply
    pub fn send(&self, command: &Command) -> Result<Vec<u8>, ProtocolError> {
        let reply_len = command.reply_len();
        self.channel.exchange(
            command.encode().as_bytes(),
            reply_len.is_some(),
            reply_len.unwrap_or(0),
            command.post_write_delay(),
        )
    }

    /// Send a query; an empty reply is a timeout
    fn query(&self, command: &Command) -> Result<String, ProtocolError> {
        let reply = self.send(command)?;
        if reply.is_empty() {
            tracing::warn!("{} got no reply", command);
            return Err(ProtocolError::Timeout(command.encode()));
        }
        Ok(reply_text(&reply))
    }

    /// Query and decode a fixed-format reply
    fn query_parsed<T>(
        &self,
        command: &Command,
        decode: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<T, ProtocolError> {
        let reply = self.query(command)?;
        decode(&reply).map_err(|source| {
            tracing::warn!("{} returned malformed reply '{}': {}", command, reply, source);
            ProtocolError::Malformed {
                command: command.encode(),
                source,
            }
        })
    }

    /// Send a command acknowledged by a single `accept` byte
    fn acknowledge(&self, command: &Command, accept: u8) -> Result<(), ProtocolError> {
        let reply = self.send(command)?;
        codec::check_reply(command, &reply, accept).inspect_err(|e| {
            tracing::warn!("{} failed: {}", command, e);
        })
    }

    // ------------------------------------------------------------------ time

    /// Set the mount clock from a UTC instant and an offset in hours east.
    ///
    /// Sends date, the DST flag (DST-capable firmware only), offset and local
    /// time in that order.
    pub fn set_utc(&self, utc: DateTime<Utc>, offset_hours: i32) -> Result<(), ProtocolError> {
        let local = utc.naive_utc() + ChronoDuration::hours(offset_hours as i64);
        self.acknowledge(&Command::SetDate(local.date()), b'1')?;
        if self.options.use_dst_commands {
            self.send(&Command::SetDaylightSaving(self.options.daylight_saving))?;
        }
        self.acknowledge(&Command::SetUtcOffset(offset_hours), b'1')?;
        self.acknowledge(&Command::SetLocalTime(local.time()), b'1')?;
        self.lock_state().utc_offset = Some(offset_hours);
        Ok(())
    }

    /// Read the mount clock
    pub fn get_utc(&self) -> Result<DeviceTime, ProtocolError> {
        let date = self.query_parsed(&Command::GetDate, codec::decode_date)?;
        let time = self.query_parsed(&Command::GetLocalTime, codec::decode_local_time)?;
        let utc_offset = self.query_parsed(&Command::GetUtcOffset, codec::decode_utc_offset)?;
        let daylight_saving = if self.options.use_dst_commands {
            Some(self.query_parsed(&Command::GetDaylightSaving, codec::decode_flag)?)
        } else {
            None
        };

        let local = NaiveDateTime::new(date, time);
        let utc = (local - ChronoDuration::hours(utc_offset as i64)).and_utc();
        self.lock_state().utc_offset = Some(utc_offset);
        Ok(DeviceTime {
            utc,
            utc_offset,
            daylight_saving,
        })
    }

    /// Local sidereal time in hours
    pub fn sidereal_time(&self) -> Result<f64, ProtocolError> {
        self.query_parsed(&Command::GetSiderealTime, codec::decode_sidereal_time)
    }

    // ------------------------------------------------------------------ site

    /// Site stored in the mount
    pub fn site(&self) -> Result<Site, ProtocolError> {
        let latitude = self.query_parsed(&Command::GetLatitude, codec::decode_latitude)?;
        let longitude = self.query_parsed(&Command::GetLongitude, codec::decode_longitude)?;
        Ok(Site {
            latitude,
            longitude,
        })
    }

    /// Write latitude then longitude. A rejected latitude stops the sequence.
    pub fn set_site(&self, site: Site) -> Result<(), ProtocolError> {
        if !(-90.0..=90.0).contains(&site.latitude) {
            return Err(ProtocolError::InvalidArgument(format!(
                "latitude {} outside [-90, 90]",
                site.latitude
            )));
        }
        self.acknowledge(&Command::SetLatitude(site.latitude), b'1')?;
        self.acknowledge(&Command::SetLongitude(site.longitude), b'1')
    }

    // ------------------------------------------------------------------ pointing

    /// Current RA (hours) and Dec (degrees) in the mount's epoch
    pub fn coordinates(&self) -> Result<(f64, f64), ProtocolError> {
        let ra = self.query_parsed(&Command::GetRa, codec::decode_ra)?;
        let dec = self.query_parsed(&Command::GetDec, codec::decode_dec)?;
        Ok((ra, dec))
    }

    fn set_target(&self, ra: f64, dec: f64) -> Result<(), ProtocolError> {
        self.acknowledge(&Command::SetTargetRa(ra), b'1')?;
        self.acknowledge(&Command::SetTargetDec(dec), b'1')
    }

    /// Slew to RA/Dec. The mount acknowledges `:MS#` with `0`.
    pub fn slew(&self, ra: f64, dec: f64) -> Result<(), ProtocolError> {
        self.set_target(ra, dec)?;
        self.acknowledge(&Command::StartSlew, b'0')
    }

    /// Sync the mount's position to RA/Dec
    pub fn sync(&self, ra: f64, dec: f64) -> Result<(), ProtocolError> {
        self.set_target(ra, dec)?;
        let reply = self.send(&Command::Sync)?;
        if reply.first() == Some(&b'e') {
            let err = codec::classify_failure(&Command::Sync, &reply);
            tracing::warn!("{} failed: {}", Command::Sync, err);
            return Err(err);
        }
        Ok(())
    }

    // ------------------------------------------------------------------ motion

    /// Manual motion on the Dec axis. North wins when both are set.
    pub fn motion_dec(&self, north: bool, south: bool) -> Result<(), ProtocolError> {
        let requested = if north {
            Some(Direction::North)
        } else if south {
            Some(Direction::South)
        } else {
            None
        };
        self.motion(Axis::Dec, requested)
    }

    /// Manual motion on the RA axis. West wins when both are set.
    pub fn motion_ra(&self, west: bool, east: bool) -> Result<(), ProtocolError> {
        let requested = if west {
            Some(Direction::West)
        } else if east {
            Some(Direction::East)
        } else {
            None
        };
        self.motion(Axis::Ra, requested)
    }

    /// Drive `axis` towards `requested`, or stop it with `None`
    pub fn motion(&self, axis: Axis, requested: Option<Direction>) -> Result<(), ProtocolError> {
        if let Some(direction) = requested.filter(|d| d.axis() != axis) {
            return Err(ProtocolError::InvalidArgument(format!(
                "{:?} is not a direction of the {:?} axis",
                direction, axis
            )));
        }

        let mut state = self.lock_state();
        let plan = state.motion(axis).plan(requested);
        if let Some(stop) = plan.stop {
            self.send(&Command::Halt(stop))?;
        }
        *state.motion_mut(axis) = AxisMotion::from_request(requested);
        if let Some(start) = plan.start {
            self.send(&Command::Move(start))?;
        }
        Ok(())
    }

    /// Select a tracking rate. Returns whether a command was sent.
    pub fn select_track_rate(&self, rate: Option<TrackRate>) -> Result<bool, ProtocolError> {
        let Some(rate) = rate else { return Ok(false) };
        let mut state = self.lock_state();
        if state.track_rate == Some(rate) {
            return Ok(false);
        }
        self.send(&Command::SetTrackRate(rate))?;
        state.track_rate = Some(rate);
        Ok(true)
    }

    /// Select a manual slew rate. Returns whether a command was sent.
    pub fn select_slew_rate(&self, rate: Option<SlewRate>) -> Result<bool, ProtocolError> {
        let Some(rate) = rate else { return Ok(false) };
        let mut state = self.lock_state();
        if state.slew_rate == Some(rate) {
            return Ok(false);
        }
        self.send(&Command::SetSlewRate(rate))?;
        state.slew_rate = Some(rate);
        Ok(true)
    }

    /// Start or stop sidereal tracking
    pub fn set_tracking(&self, on: bool) -> Result<(), ProtocolError> {
        self.send(&Command::Tracking(on))?;
        self.lock_state().tracking = Some(on);
        Ok(())
    }

    /// Send the mount home. The next poll that sees `H` reports the arrival
    /// again, even if the mount was already there.
    pub fn home(&self) -> Result<(), ProtocolError> {
        self.send(&Command::Home)?;
        self.lock_state().at_home = false;
        Ok(())
    }

    /// Stop all motion, including manual moves
    pub fn stop(&self) -> Result<(), ProtocolError> {
        let mut state = self.lock_state();
        self.send(&Command::StopAll)?;
        state.dec_motion = AxisMotion::Stopped;
        state.ra_motion = AxisMotion::Stopped;
        Ok(())
    }

    // ------------------------------------------------------------------ guiding

    /// Set the guide rate in percent of sidereal, clamped to [10, 90].
    ///
    /// The mount keeps one rate for both axes; the RA value is sent.
    /// Returns the rate actually applied.
    pub fn set_guide_rate(&self, ra: u32, dec: u32) -> Result<u32, ProtocolError> {
        let ra = clamp_guide_rate(ra);
        let dec = clamp_guide_rate(dec);
        if ra != dec {
            tracing::debug!("Guide rate {} requested for Dec, using RA rate {}", dec, ra);
        }
        self.send(&Command::SetGuideRate(ra))?;
        self.lock_state().guide_rate = Some(ra);
        Ok(ra)
    }

    /// Guide rate in percent of sidereal
    pub fn guide_rate(&self) -> Result<u32, ProtocolError> {
        let rate = self.query_parsed(&Command::GetGuideRate, codec::decode_guide_rate)?;
        self.lock_state().guide_rate = Some(rate);
        Ok(rate)
    }

    /// Issue a timed guide pulse and return its length.
    ///
    /// Exactly one of the two durations must be nonzero: `first_ms` pulses
    /// north (Dec) or west (RA), `second_ms` south or east. The mount does
    /// not report completion; the caller waits out the returned duration.
    pub fn guide_pulse(
        &self,
        axis: Axis,
        first_ms: u32,
        second_ms: u32,
    ) -> Result<Duration, ProtocolError> {
        let (first, second) = axis.directions();
        let (direction, duration_ms) = match (first_ms, second_ms) {
            (ms, 0) if ms > 0 => (first, ms),
            (0, ms) if ms > 0 => (second, ms),
            _ => {
                return Err(ProtocolError::InvalidArgument(format!(
                    "guide pulse on {:?} needs exactly one nonzero duration, got {} and {}",
                    axis, first_ms, second_ms
                )))
            }
        };
        let duration_ms = duration_ms.min(MAX_PULSE_FIELD_MS);
        self.send(&Command::GuidePulse {
            direction,
            duration_ms,
        })?;
        Ok(Duration::from_millis(duration_ms as u64))
    }

    /// Issue a guide pulse and block until it has elapsed
    pub fn pulse_guide(&self, axis: Axis, first_ms: u32, second_ms: u32) -> Result<(), ProtocolError> {
        let duration = self.guide_pulse(axis, first_ms, second_ms)?;
        std::thread::sleep(duration);
        Ok(())
    }

    // ------------------------------------------------------------------ identity and status

    /// Product name (`AM5`, ...). Fails with `UnsupportedDevice` for
    /// anything that is not an AM-series mount.
    pub fn detect(&self) -> Result<String, ProtocolError> {
        let reply = reply_text(&self.send(&Command::GetProduct)?);
        tracing::info!("Product: '{}'", reply);
        if codec::is_supported_product(&reply) {
            Ok(reply)
        } else {
            Err(ProtocolError::UnsupportedDevice(reply))
        }
    }

    /// Firmware version string
    pub fn firmware_version(&self) -> Result<String, ProtocolError> {
        self.query(&Command::GetFirmware)
    }

    /// Decoded `:GU#` status flags
    pub fn status(&self) -> Result<MountStatus, ProtocolError> {
        let status = codec::decode_status(&self.query(&Command::GetStatus)?);
        if status.mode.is_some() {
            self.lock_state().mode = status.mode;
        }
        Ok(status)
    }

    /// Side of the pier the tube is on
    pub fn pier_side(&self) -> Result<PierSide, ProtocolError> {
        let reply = self.query(&Command::GetPierSide)?;
        codec::decode_pier_side(&reply).ok_or(ProtocolError::Rejected {
            command: Command::GetPierSide.encode(),
            reply,
        })
    }

    /// Tracking rate currently used by the mount
    pub fn tracking_rate(&self) -> Result<TrackRate, ProtocolError> {
        let reply = self.query(&Command::GetTrackRate)?;
        codec::decode_track_rate(&reply).ok_or(ProtocolError::Rejected {
            command: Command::GetTrackRate.encode(),
            reply,
        })
    }

    /// Current buzzer volume
    pub fn buzzer(&self) -> Result<BuzzerVolume, ProtocolError> {
        let reply = self.query(&Command::GetBuzzer)?;
        codec::decode_buzzer(&reply).ok_or(ProtocolError::Rejected {
            command: Command::GetBuzzer.encode(),
            reply,
        })
    }

    /// Set the buzzer volume
    pub fn set_buzzer(&self, volume: BuzzerVolume) -> Result<(), ProtocolError> {
        self.send(&Command::SetBuzzer(volume))?;
        Ok(())
    }

    // ------------------------------------------------------------------ setup

    /// Read mount information and repair an unset clock using host time
    pub fn initialize(&self, config: &MountConfig) -> Result<MountInfo, ProtocolError> {
        let offset_hours = Local::now().offset().local_minus_utc() / 3600;
        self.initialize_at(config, Utc::now(), offset_hours)
    }

    /// [`Mount::initialize`] with an explicit host clock.
    ///
    /// Individual reads that fail are logged and skipped; only transport
    /// failures abort.
    pub fn initialize_at(
        &self,
        config: &MountConfig,
        now: DateTime<Utc>,
        offset_hours: i32,
    ) -> Result<MountInfo, ProtocolError> {
        let mut info = MountInfo {
            firmware: optional("read firmware version", self.firmware_version())?,
            ..MountInfo::default()
        };

        info.guide_rate = match optional("read guide rate", self.guide_rate())? {
            Some(rate) => Some(rate),
            None => {
                tracing::debug!("Guide rate can not be read, setting {}", config.guide_rate);
                optional(
                    "set guide rate",
                    self.set_guide_rate(config.guide_rate, config.guide_rate),
                )?
            }
        };

        info.mode = optional("read mount mode", self.status())?.and_then(|s| s.mode);
        info.site = optional("read site", self.site())?;
        info.device_time = optional("read device time", self.get_utc())?;

        let clock_unset = info
            .device_time
            .map_or(true, |t| t.utc.timestamp() < CLOCK_VALID_AFTER);
        if clock_unset {
            tracing::info!("Mount is not initialized, setting host time and site");
            info.clock_reset = optional("set host time", self.set_utc(now, offset_hours))?.is_some();
            match config.site {
                Some(site) => {
                    if optional("set site", self.set_site(site))?.is_some() {
                        info.site = Some(site);
                    }
                }
                None => tracing::warn!("No site configured, mount site left unset"),
            }
        }

        info.track_rate = optional("read tracking rate", self.tracking_rate())?;
        if info.track_rate.is_some() {
            self.lock_state().track_rate = info.track_rate;
        }
        info.buzzer = optional("read buzzer volume", self.buzzer())?;
        Ok(info)
    }
}

/// Keep a failed read as `None` unless the link itself failed
fn optional<T>(what: &str, result: Result<T, ProtocolError>) -> Result<Option<T>, ProtocolError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_transport() => Err(e),
        Err(e) => {
            tracing::warn!("Failed to {}: {}", what, e);
            Ok(None)
        }
    }
}
