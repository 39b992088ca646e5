//! # asi-mount Core Library
//!
//! Command/response engine for ZWO AM-series telescope mounts.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial and TCP links to the mount (`asi://host` or a device path)
//! - A locked command channel for the `#`-terminated LX200-style dialect
//! - Typed commands for time, site, slewing, sync, manual motion and guiding
//! - A background poller publishing tracking, home, pier side and position
//!   changes
//! - A shared session so the mount and guider roles can use one link
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use asi_mount_core::prelude::*;
//!
//! # fn main() -> Result<(), ProtocolError> {
//! let config = MountConfig {
//!     port: "asi://192.168.4.1".to_string(),
//!     ..MountConfig::default()
//! };
//! let session = Arc::new(Session::new(config));
//! let mut mount = session.mount_role();
//! let info = mount.connect()?;
//! println!("firmware {:?}", info.firmware);
//!
//! mount.goto(5.5, -5.4, Some(TrackRate::Sidereal))?;
//! mount.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod mount;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, MountConfig};
    pub use crate::mount::{
        CoordinateState, DeviceTime, EpochTransform, GuiderRole, Mount, MountEvent, MountInfo,
        MountRole, PollCadence, Reconciler, Session, Site,
    };
    pub use crate::protocol::{
        Axis, BuzzerVolume, Channel, DeviceError, Direction, LinkTarget, PierSide, ProtocolError,
        SlewRate, TrackRate,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
