//! Local model of the mount session

use serde::{Deserialize, Serialize};

use crate::protocol::{Axis, Direction, MountMode, PierSide, SlewRate, TrackRate};

/// Observing site, degrees. Longitude is east-positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// North-positive
    pub latitude: f64,
    /// East-positive
    pub longitude: f64,
}

/// Motion state of one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AxisMotion {
    /// Not moving
    #[default]
    Stopped,
    /// Moving toward the given direction
    Moving(Direction),
}

/// Wire actions needed to move from one axis state to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionPlan {
    /// Direction to halt first
    pub stop: Option<Direction>,
    /// Direction to start afterwards
    pub start: Option<Direction>,
}

impl MotionPlan {
    /// Nothing to send
    pub fn is_empty(&self) -> bool {
        self.stop.is_none() && self.start.is_none()
    }
}

impl AxisMotion {
    /// Plan the transition to `requested` (`None` means stop).
    ///
    /// Same direction: nothing to send. Different direction: one stop,
    /// then one start. Stopped axis: start only.
    pub fn plan(&self, requested: Option<Direction>) -> MotionPlan {
        match (*self, requested) {
            (AxisMotion::Moving(current), Some(next)) if current == next => MotionPlan::default(),
            (AxisMotion::Moving(current), next) => MotionPlan {
                stop: Some(current),
                start: next,
            },
            (AxisMotion::Stopped, next) => MotionPlan {
                stop: None,
                start: next,
            },
        }
    }

    /// State after a request has been carried out
    pub fn from_request(requested: Option<Direction>) -> Self {
        requested.map_or(AxisMotion::Stopped, AxisMotion::Moving)
    }

    /// Current direction, if moving
    pub fn direction(&self) -> Option<Direction> {
        match self {
            AxisMotion::Stopped => None,
            AxisMotion::Moving(direction) => Some(*direction),
        }
    }
}

/// Health of the coordinate readout after the last poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinateState {
    /// Settled and readable
    #[default]
    Ok,
    /// The mount reports a slew or manual move in progress
    Busy,
    /// The last read failed
    Alert,
}

/// Everything the engine remembers between commands
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Last commanded slew rate
    pub slew_rate: Option<SlewRate>,
    /// Last commanded (or reported) tracking rate
    pub track_rate: Option<TrackRate>,
    /// Guide rate, percent of sidereal
    pub guide_rate: Option<u32>,
    /// Manual motion on the declination axis
    pub dec_motion: AxisMotion,
    /// Manual motion on the RA axis
    pub ra_motion: AxisMotion,
    /// Last polled right ascension, hours
    pub ra: f64,
    /// Last polled declination, degrees
    pub dec: f64,
    /// Hours east of UTC, from the last clock read
    pub utc_offset: Option<i32>,
    /// Last status poll showed the home flag
    pub at_home: bool,
    /// `None` until the first status poll
    pub tracking: Option<bool>,
    /// Last reported pier side
    pub pier_side: Option<PierSide>,
    /// Readout health after the last poll
    pub coordinates: CoordinateState,
    /// Equatorial or alt-az, once known
    pub mode: Option<MountMode>,
}

impl SessionState {
    /// Motion of `axis`
    pub fn motion(&self, axis: Axis) -> AxisMotion {
        match axis {
            Axis::Dec => self.dec_motion,
            Axis::Ra => self.ra_motion,
        }
    }

    /// Mutable motion of `axis`
    pub fn motion_mut(&mut self, axis: Axis) -> &mut AxisMotion {
        match axis {
            Axis::Dec => &mut self.dec_motion,
            Axis::Ra => &mut self.ra_motion,
        }
    }
}
