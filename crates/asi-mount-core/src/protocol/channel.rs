//! Command channel
//!
//! Serializes every command exchange on the link behind a single lock:
//! drain stray input, write, optionally settle, then read until `#`.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::stream::{read_byte, Link};
use super::{
    ProtocolError, DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_FIRST_READ_TIMEOUT_MS,
    DEFAULT_NEXT_READ_TIMEOUT_MS, DIVIDER_PLACEHOLDER, TERMINATOR,
};

/// Read timeouts used by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTiming {
    /// Wait for the first reply byte
    pub first_read: Duration,
    /// Wait for every following reply byte
    pub next_read: Duration,
    /// Wait used to detect an empty input buffer before writing
    pub drain: Duration,
}

impl Default for ChannelTiming {
    fn default() -> Self {
        Self {
            first_read: Duration::from_millis(DEFAULT_FIRST_READ_TIMEOUT_MS),
            next_read: Duration::from_millis(DEFAULT_NEXT_READ_TIMEOUT_MS),
            drain: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
        }
    }
}

/// Exclusive owner of the link to the mount
pub struct Channel {
    /// Link handle, `None` once closed
    link: Mutex<Option<Box<dyn Link>>>,
    /// Endpoint name for logs
    name: String,
    timing: ChannelTiming,
    /// Metrics: cumulative bytes and exchanges
    tx_bytes: AtomicU64,
    rx_bytes: AtomicU64,
    exchanges: AtomicU64,
}

impl Channel {
    /// Wrap an open link
    pub fn new(link: Box<dyn Link>, timing: ChannelTiming) -> Self {
        let name = link.describe();
        Self {
            link: Mutex::new(Some(link)),
            name,
            timing,
            tx_bytes: AtomicU64::new(0),
            rx_bytes: AtomicU64::new(0),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Endpoint name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read timeouts in use
    pub fn timing(&self) -> ChannelTiming {
        self.timing
    }

    /// Check if the link is still held
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Get cumulative tx/rx bytes and exchange count
    pub fn counters(&self) -> (u64, u64, u64) {
        (
            self.tx_bytes.load(Ordering::Relaxed),
            self.rx_bytes.load(Ordering::Relaxed),
            self.exchanges.load(Ordering::Relaxed),
        )
    }

    /// Close the link. Waits for an in-flight exchange to finish.
    pub fn close(&self) {
        if self.lock().take().is_some() {
            tracing::info!("Disconnected from {}", self.name);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Link>>> {
        // A panic mid-exchange leaves the link usable; the next drain
        // discards whatever the interrupted exchange left behind.
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Perform one command exchange.
    ///
    /// With `expect_reply` unset this returns as soon as the command is
    /// written. Otherwise bytes are collected until `#`, a read timeout, or
    /// `max_reply_len` bytes; the terminator is not included in the result.
    pub fn exchange(
        &self,
        command: &[u8],
        expect_reply: bool,
        max_reply_len: usize,
        post_write_delay: Duration,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut guard = self.lock();
        let link = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        let started = Instant::now();

        self.drain(link.as_mut())?;

        link.write_all(command).map_err(|e| {
            tracing::error!("Failed to write to {}: {}", self.name, e);
            ProtocolError::IoError(e)
        })?;
        link.flush()?;
        self.tx_bytes
            .fetch_add(command.len() as u64, Ordering::Relaxed);

        if !post_write_delay.is_zero() {
            std::thread::sleep(post_write_delay);
        }

        let mut reply = Vec::new();
        if expect_reply {
            let mut timeout = self.timing.first_read;
            while reply.len() < max_reply_len {
                let byte = match read_byte(link.as_mut(), timeout) {
                    Ok(Some(byte)) => byte,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Failed to read from {}: {}", self.name, e);
                        return Err(ProtocolError::IoError(e));
                    }
                };
                timeout = self.timing.next_read;
                let byte = if byte & 0x80 != 0 {
                    DIVIDER_PLACEHOLDER
                } else {
                    byte
                };
                if byte == TERMINATOR {
                    break;
                }
                reply.push(byte);
            }
            self.rx_bytes
                .fetch_add(reply.len() as u64, Ordering::Relaxed);
        }
        drop(guard);

        self.exchanges.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command {} -> {}",
            String::from_utf8_lossy(command),
            if expect_reply {
                String::from_utf8_lossy(&reply).into_owned()
            } else {
                "NULL".to_string()
            }
        );
        Ok(reply)
    }

    /// Discard whatever is already waiting on the link
    fn drain(&self, link: &mut dyn Link) -> Result<(), ProtocolError> {
        let mut discarded = 0usize;
        while read_byte(link, self.timing.drain)?.is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::trace!("Drained {} stray bytes from {}", discarded, self.name);
        }
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}
