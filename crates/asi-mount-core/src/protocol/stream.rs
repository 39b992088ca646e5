use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Byte stream to the mount (serial port or TCP socket)
///
/// Reads honour the timeout set by [`Link::set_timeout`]; an expired timeout
/// surfaces as `ErrorKind::TimedOut` or `ErrorKind::WouldBlock`.
pub trait Link: Read + Write + Send {
    /// Set timeout for read/write operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Human-readable name of the endpoint, used in logs
    fn describe(&self) -> String;
}

/// True if an I/O error only means that no byte arrived in time
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Read a single byte, returning `Ok(None)` when the timeout expires first
pub fn read_byte(link: &mut dyn Link, timeout: Duration) -> io::Result<Option<u8>> {
    link.set_timeout(timeout)?;
    let mut buf = [0u8; 1];
    loop {
        match link.read(&mut buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "link closed by peer",
                ))
            }
            Ok(_) => return Ok(Some(buf[0])),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(ref e) if is_timeout(e) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}

/// Serial port wrapper implementing Link
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Wrap an opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Link for SerialLink {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn describe(&self) -> String {
        self.port
            .name()
            .unwrap_or_else(|| "serial port".to_string())
    }
}

/// TCP stream wrapper implementing Link
pub struct TcpLink {
    stream: TcpStream,
    peer: String,
}

impl TcpLink {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "tcp peer".to_string());
        Self { stream, peer }
    }
}

impl Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Link for TcpLink {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        // A zero duration means "block forever" to the socket API
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.peer.clone()
    }
}
