//! Link opening
//!
//! Classifies a port string as a serial device or a network endpoint and
//! opens the matching byte stream.

use serialport::SerialPort;
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::stream::{read_byte, Link, SerialLink, TcpLink};
use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_NETWORK_PORT};

/// URL schemes recognized as network device notation
const NETWORK_SCHEMES: &[&str] = &["asi://", "tcp://"];

/// Timeout for establishing a TCP connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Quiet period between stray bytes once the first one has been drained
const SETTLE_FOLLOWUP: Duration = Duration::from_millis(100);

/// Where the mount is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Local serial device (e.g. "/dev/ttyACM0" or "COM3")
    Serial {
        /// Device path
        path: String,
        /// Line speed
        baud_rate: u32,
    },
    /// Network endpoint written as `asi://host[:port]`
    Network {
        /// Host name or address
        host: String,
        /// TCP port
        port: u16,
    },
}

impl LinkTarget {
    /// Classify a port string.
    ///
    /// Strings using a network scheme become [`LinkTarget::Network`], with
    /// `default_port` used when none is given. Everything else is a serial
    /// device path.
    pub fn parse(target: &str, baud_rate: u32, default_port: u16) -> Result<Self, ProtocolError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ProtocolError::InvalidTarget("empty port name".to_string()));
        }

        let Some(rest) = NETWORK_SCHEMES
            .iter()
            .find_map(|scheme| strip_prefix_ignore_case(target, scheme))
        else {
            return Ok(LinkTarget::Serial {
                path: target.to_string(),
                baud_rate,
            });
        };

        let rest = rest.trim_end_matches('/');
        let (host, port) = split_host_port(rest)
            .ok_or_else(|| ProtocolError::InvalidTarget(target.to_string()))?;
        if host.is_empty() {
            return Err(ProtocolError::InvalidTarget(target.to_string()));
        }

        Ok(LinkTarget::Network {
            host: host.to_string(),
            port: port.unwrap_or(default_port),
        })
    }

    /// True for network endpoints
    pub fn is_network(&self) -> bool {
        matches!(self, LinkTarget::Network { .. })
    }
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkTarget::Serial { path, baud_rate } => write!(f, "{} @ {} baud", path, baud_rate),
            LinkTarget::Network { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Split `host[:port]`, accepting bracketed IPv6 literals.
/// Returns `None` when a port is present but not a valid u16.
fn split_host_port(s: &str) -> Option<(&str, Option<u16>)> {
    if let Some(inner) = s.strip_prefix('[') {
        let (host, tail) = inner.split_once(']')?;
        return match tail.strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None if tail.is_empty() => Some((host, None)),
            None => None,
        };
    }
    match s.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Some((host, Some(port.parse().ok()?))),
        // bare IPv6 literal without a port
        Some(_) => Some((s, None)),
        None => Some((s, None)),
    }
}

/// Open the link described by `target` and drain any stale bytes.
///
/// The link counts as ready once it has been quiet for `settle`; bytes left
/// over from an earlier session or device chatter are discarded.
pub fn open_link(target: &LinkTarget, settle: Duration) -> Result<Box<dyn Link>, ProtocolError> {
    let mut link: Box<dyn Link> = match target {
        LinkTarget::Serial { path, baud_rate } => {
            let mut port = open_port(path, Some(*baud_rate))?;
            configure_port(port.as_mut())?;
            Box::new(SerialLink::new(port))
        }
        LinkTarget::Network { host, port } => Box::new(TcpLink::new(connect_tcp(host, *port)?)),
    };

    if let Err(e) = settle_link(link.as_mut(), settle) {
        tracing::error!("Failed to settle {}: {}", target, e);
        return Err(e);
    }
    tracing::info!("Connected to {}", target);
    Ok(link)
}

/// Open a serial port with the mount's default settings
fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    serialport::new(name, baud)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| {
            tracing::error!("Failed to connect to {}: {}", name, e);
            ProtocolError::SerialError(e.to_string())
        })
}

/// Configure a serial port for 8N1 without flow control
fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    Ok(())
}

fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, ProtocolError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| ProtocolError::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    let reason = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no addresses resolved".to_string());
    tracing::error!("Failed to connect to {}:{}: {}", host, port, reason);
    Err(ProtocolError::ConnectionFailed(format!(
        "{}:{}: {}",
        host, port, reason
    )))
}

/// Discard buffered bytes until the link has been quiet long enough.
///
/// The first wait is `settle`; after each stray byte the quiet period drops
/// to 100 ms.
pub fn settle_link(link: &mut dyn Link, settle: Duration) -> Result<usize, ProtocolError> {
    let mut wait = settle;
    let mut drained = 0usize;
    while read_byte(link, wait)?.is_some() {
        drained += 1;
        wait = SETTLE_FOLLOWUP;
    }
    if drained > 0 {
        tracing::debug!("Discarded {} stale bytes from {}", drained, link.describe());
    }
    Ok(drained)
}
