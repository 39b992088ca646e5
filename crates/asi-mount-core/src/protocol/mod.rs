//! Serial Protocol Communication
//!
//! Implements the ASCII, `#`-terminated LX200 dialect spoken by ZWO AM mounts.
//!
//! Every command is a colon-prefixed mnemonic ending in `#`. Replies end in
//! `#` or at a read timeout; there is no binary framing and no checksum.

mod channel;
pub mod codec;
pub mod commands;
mod error;
pub mod sexagesimal;
pub mod serial;
mod stream;

pub use channel::{Channel, ChannelTiming};
pub use codec::{MountMode, MountStatus, PierSide};
pub use commands::{Axis, BuzzerVolume, Command, Direction, SlewRate, TrackRate};
pub use error::{DeviceError, ParseError, ProtocolError};
pub use serial::{open_link, LinkTarget};
pub use stream::{Link, SerialLink, TcpLink};

/// Default baud rate for the mount's serial port
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Well-known TCP port of the mount's network interface
pub const DEFAULT_NETWORK_PORT: u16 = 4030;

/// Byte terminating every command and reply
pub const TERMINATOR: u8 = b'#';

/// Placeholder written in place of bytes with the high bit set
/// (the mount emits a non-ASCII degree sign as a field divider)
pub const DIVIDER_PLACEHOLDER: u8 = b':';

/// Timeout for the first reply byte in milliseconds
pub const DEFAULT_FIRST_READ_TIMEOUT_MS: u64 = 3100;

/// Timeout for each following reply byte in milliseconds
pub const DEFAULT_NEXT_READ_TIMEOUT_MS: u64 = 100;

/// Timeout used while draining stray bytes before a command
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 10;

/// Quiet period required after opening a link before it is ready
pub const DEFAULT_OPEN_SETTLE_MS: u64 = 1000;

/// Maximum reply length accepted from the mount
pub const MAX_REPLY_LEN: usize = 128;
