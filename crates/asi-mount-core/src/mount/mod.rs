//! Mount control
//!
//! Typed command set, the session model and the background reconciler
//! built on top of the protocol channel.

pub mod epoch;
mod operations;
mod poller;
mod reconciler;
mod session;
mod state;

pub use epoch::{EpochTransform, IdentityEpoch};
pub use operations::{DeviceTime, Mount, MountInfo, MountOptions};
pub use poller::Poller;
pub use reconciler::{
    MountEvent, PollCadence, Reconciler, TickReport, BUSY_POLL_INTERVAL, IDLE_POLL_INTERVAL,
};
pub use session::{GuiderRole, LinkOpener, MountRole, Session, SystemLinkOpener};
pub use state::{AxisMotion, CoordinateState, MotionPlan, SessionState, Site};
