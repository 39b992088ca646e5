//! State reconciler
//!
//! One poll tick reads coordinates, status, pier side and the clock, folds
//! them into the session model and reports what changed. A tick never
//! fails: read errors become [`CoordinateState::Alert`] or
//! [`MountEvent::TimeUnavailable`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::epoch::{EpochTransform, IdentityEpoch};
use super::operations::{DeviceTime, Mount};
use super::state::CoordinateState;
use crate::protocol::PierSide;

/// Default interval while the mount is settled
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval while the mount is moving
pub const BUSY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polling speed chosen for the next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollCadence {
    /// Nothing is moving
    Idle,
    /// A slew or manual move is in progress
    Busy,
}

/// State change published by the poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MountEvent {
    /// Position snapshot in the reference epoch, sent every tick
    Coordinates {
        /// Right ascension in hours
        ra: f64,
        /// Declination in degrees
        dec: f64,
        /// Slewing or settled
        state: CoordinateState,
    },
    /// Tracking switched on or off
    Tracking {
        /// New tracking state
        on: bool,
    },
    /// Mount arrived at or left the home position
    Home {
        /// True on arrival
        at_home: bool,
    },
    /// Pier side changed
    PierSide {
        /// New side
        side: PierSide,
    },
    /// Mount clock read on the first tick
    Time {
        /// Clock reading
        time: DeviceTime,
    },
    /// The mount clock could not be read
    TimeUnavailable,
}

/// Outcome of one poll tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Cadence for the next tick
    pub cadence: PollCadence,
    /// Changes seen this tick, in publish order
    pub events: Vec<MountEvent>,
}

/// Reconciles the mount's live state with the session model
#[derive(Clone)]
pub struct Reconciler {
    epoch: Arc<dyn EpochTransform>,
    idle_interval: Duration,
    busy_interval: Duration,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Arc::new(IdentityEpoch))
    }
}

impl Reconciler {
    /// Reconciler with the default poll intervals
    pub fn new(epoch: Arc<dyn EpochTransform>) -> Self {
        Self {
            epoch,
            idle_interval: IDLE_POLL_INTERVAL,
            busy_interval: BUSY_POLL_INTERVAL,
        }
    }

    /// Override the idle and busy intervals
    pub fn with_intervals(mut self, idle: Duration, busy: Duration) -> Self {
        self.idle_interval = idle;
        self.busy_interval = busy;
        self
    }

    /// Delay before the next tick
    pub fn interval(&self, cadence: PollCadence) -> Duration {
        match cadence {
            PollCadence::Idle => self.idle_interval,
            PollCadence::Busy => self.busy_interval,
        }
    }

    /// Transform applied to reported coordinates
    pub fn epoch(&self) -> &Arc<dyn EpochTransform> {
        &self.epoch
    }

    /// Run one poll cycle against `mount`
    pub fn poll_tick(&self, mount: &Mount) -> TickReport {
        let mut failed = false;

        let coordinates = match mount.coordinates() {
            Ok((ra, dec)) => Some(self.epoch.to_reference(ra, dec)),
            Err(e) => {
                tracing::warn!("Poll: failed to read coordinates: {}", e);
                failed = true;
                None
            }
        };
        let status = match mount.status() {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!("Poll: failed to read status: {}", e);
                failed = true;
                None
            }
        };
        let pier_side = match mount.pier_side() {
            Ok(side) => Some(side),
            Err(e) => {
                tracing::warn!("Poll: failed to read pier side: {}", e);
                failed = true;
                None
            }
        };

        let busy = status.is_some_and(|s| !s.idle);
        let mut events = Vec::new();
        {
            let mut state = mount.lock_state();
            if let Some((ra, dec)) = coordinates {
                state.ra = ra;
                state.dec = dec;
            }

            if let Some(status) = status {
                if state.tracking != Some(status.tracking) {
                    state.tracking = Some(status.tracking);
                    events.push(MountEvent::Tracking {
                        on: status.tracking,
                    });
                }
                if state.at_home != status.at_home {
                    state.at_home = status.at_home;
                    events.push(MountEvent::Home {
                        at_home: status.at_home,
                    });
                }
            }

            if let Some(side) = pier_side {
                if state.pier_side != Some(side) {
                    state.pier_side = Some(side);
                    events.push(MountEvent::PierSide { side });
                }
            }

            state.coordinates = if failed {
                CoordinateState::Alert
            } else if busy {
                CoordinateState::Busy
            } else {
                CoordinateState::Ok
            };
            events.push(MountEvent::Coordinates {
                ra: state.ra,
                dec: state.dec,
                state: state.coordinates,
            });
        }

        match mount.get_utc() {
            Ok(time) => events.push(MountEvent::Time { time }),
            Err(e) => {
                tracing::warn!("Poll: failed to read time: {}", e);
                events.push(MountEvent::TimeUnavailable);
            }
        }

        TickReport {
            cadence: if busy {
                PollCadence::Busy
            } else {
                PollCadence::Idle
            },
            events,
        }
    }
}
