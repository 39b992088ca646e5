//! Shared link session
//!
//! One physical link can serve two roles at once: the mount (pointing,
//! tracking, polling) and the guider (timed pulses). The [`Session`] opens
//! the link when the first role connects and closes it when the last one
//! disconnects.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use super::epoch::EpochTransform;
use super::operations::{Mount, MountInfo, MountOptions};
use super::poller::Poller;
use super::reconciler::{MountEvent, Reconciler};
use crate::config::MountConfig;
use crate::protocol::commands::MAX_PULSE_FIELD_MS;
use crate::protocol::{open_link, Axis, Channel, Link, ProtocolError, TrackRate};

/// Capacity of the event bus; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 64;

/// Opens the byte stream for a session
pub trait LinkOpener: Send + Sync {
    /// Open the link named by `config.port`
    fn open(&self, config: &MountConfig) -> Result<Box<dyn Link>, ProtocolError>;
}

/// Opens serial ports and TCP endpoints as configured
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLinkOpener;

impl LinkOpener for SystemLinkOpener {
    fn open(&self, config: &MountConfig) -> Result<Box<dyn Link>, ProtocolError> {
        open_link(&config.link_target()?, config.open_settle())
    }
}

#[derive(Default)]
struct Shared {
    count: usize,
    mount: Option<Arc<Mount>>,
}

/// Owner of the configuration, the reference-counted link and the event bus
pub struct Session {
    config: MountConfig,
    opener: Box<dyn LinkOpener>,
    reconciler: Reconciler,
    shared: Mutex<Shared>,
    events: broadcast::Sender<MountEvent>,
}

impl Session {
    /// Session using real serial/TCP links
    pub fn new(config: MountConfig) -> Self {
        Self::with_opener(config, Box::new(SystemLinkOpener))
    }

    /// Session opening links through `opener`
    pub fn with_opener(config: MountConfig, opener: Box<dyn LinkOpener>) -> Self {
        let reconciler =
            Reconciler::default().with_intervals(config.idle_poll(), config.busy_poll());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            opener,
            reconciler,
            shared: Mutex::new(Shared::default()),
            events,
        }
    }

    /// Use `epoch` for coordinate conversion in polls, goto and sync
    pub fn with_epoch(mut self, epoch: Arc<dyn EpochTransform>) -> Self {
        self.reconciler = Reconciler::new(epoch)
            .with_intervals(self.config.idle_poll(), self.config.busy_poll());
        self
    }

    /// Settings the session was created with
    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Receive poll events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MountEvent> {
        self.events.subscribe()
    }

    /// Number of roles currently holding the link
    pub fn open_count(&self) -> usize {
        self.lock().count
    }

    /// The connected mount, if any role holds the link
    pub fn mount(&self) -> Option<Arc<Mount>> {
        self.lock().mount.clone()
    }

    /// New disconnected mount role
    pub fn mount_role(self: &Arc<Self>) -> MountRole {
        MountRole {
            session: Arc::clone(self),
            mount: None,
            poller: None,
            product: None,
            info: None,
        }
    }

    /// New disconnected guider role
    pub fn guider_role(self: &Arc<Self>) -> GuiderRole {
        GuiderRole {
            session: Arc::clone(self),
            mount: None,
            max_pulse_ms: MAX_PULSE_FIELD_MS,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a reference on the link, opening it for the first holder
    fn acquire(&self) -> Result<Arc<Mount>, ProtocolError> {
        let mut shared = self.lock();
        let mount = match &shared.mount {
            Some(mount) => Arc::clone(mount),
            None => {
                let link = self.opener.open(&self.config)?;
                let channel = Channel::new(link, self.config.channel_timing());
                let mount = Arc::new(Mount::new(channel, MountOptions::from(&self.config)));
                shared.mount = Some(Arc::clone(&mount));
                mount
            }
        };
        shared.count += 1;
        Ok(mount)
    }

    /// Drop a reference; the last holder closes the link, sending stop-all
    /// first when `stop_motion` is set
    fn release(&self, stop_motion: bool) {
        let mut shared = self.lock();
        if shared.count == 0 {
            return;
        }
        shared.count -= 1;
        if shared.count > 0 {
            return;
        }
        if let Some(mount) = shared.mount.take() {
            if stop_motion {
                if let Err(e) = mount.stop() {
                    tracing::warn!("Failed to stop mount before closing: {}", e);
                }
            }
            mount.channel().close();
        }
    }
}

/// Pointing, tracking and polling handle
pub struct MountRole {
    session: Arc<Session>,
    mount: Option<Arc<Mount>>,
    poller: Option<Poller>,
    product: Option<String>,
    info: Option<MountInfo>,
}

impl MountRole {
    /// Open (or share) the link, verify the product, initialize and start
    /// polling
    pub fn connect(&mut self) -> Result<MountInfo, ProtocolError> {
        if let Some(info) = &self.info {
            return Ok(info.clone());
        }

        let mount = self.session.acquire()?;
        let product = match mount.detect() {
            Ok(product) => product,
            Err(e) => {
                tracing::error!("Handshake failed, not a ZWO AM mount: {}", e);
                self.session.release(false);
                return Err(match e {
                    ProtocolError::UnsupportedDevice(_) => e,
                    e if e.is_transport() => e,
                    _ => ProtocolError::UnsupportedDevice(String::new()),
                });
            }
        };

        let info = match mount.initialize(self.session.config()) {
            Ok(info) => info,
            Err(e) => {
                self.session.release(false);
                return Err(e);
            }
        };

        let poller = match Poller::start(
            Arc::clone(&mount),
            self.session.reconciler.clone(),
            self.session.events.clone(),
        ) {
            Ok(poller) => poller,
            Err(e) => {
                self.session.release(false);
                return Err(e);
            }
        };

        tracing::info!(
            "Mount {} connected, firmware {}",
            product,
            info.firmware.as_deref().unwrap_or("unknown")
        );
        tracing::debug!(
            "Mount coordinates are in epoch {}",
            self.session.config().epoch
        );
        self.mount = Some(mount);
        self.poller = Some(poller);
        self.product = Some(product);
        self.info = Some(info.clone());
        Ok(info)
    }

    /// Stop polling, then release the link. The last holder stops all
    /// motion and closes it.
    pub fn disconnect(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        if self.mount.take().is_some() {
            self.session.release(true);
            tracing::info!("Mount disconnected");
        }
        self.product = None;
        self.info = None;
    }

    /// True while this role holds the link
    pub fn is_connected(&self) -> bool {
        self.mount.is_some()
    }

    /// Product name reported at connect
    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    /// The mount, or `NotConnected`
    pub fn mount(&self) -> Result<&Arc<Mount>, ProtocolError> {
        self.mount.as_ref().ok_or(ProtocolError::NotConnected)
    }

    /// Slew to reference-epoch coordinates, selecting `track_rate` first
    pub fn goto(&self, ra: f64, dec: f64, track_rate: Option<TrackRate>) -> Result<(), ProtocolError> {
        let mount = self.mount()?;
        mount.select_track_rate(track_rate)?;
        let (ra, dec) = self.session.reconciler.epoch().from_reference(ra, dec);
        mount.slew(ra, dec)
    }

    /// Sync to reference-epoch coordinates
    pub fn sync_to(&self, ra: f64, dec: f64) -> Result<(), ProtocolError> {
        let mount = self.mount()?;
        let (ra, dec) = self.session.reconciler.epoch().from_reference(ra, dec);
        mount.sync(ra, dec)
    }

    /// Stop all motion
    pub fn abort(&self) -> Result<(), ProtocolError> {
        self.mount()?.stop()
    }
}

impl Drop for MountRole {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Guide pulse handle sharing the mount's link
pub struct GuiderRole {
    session: Arc<Session>,
    mount: Option<Arc<Mount>>,
    max_pulse_ms: u32,
}

impl GuiderRole {
    /// Share the session link. Only a transport failure aborts the connect.
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        if self.mount.is_some() {
            return Ok(());
        }
        let mount = self.session.acquire()?;
        match mount.detect() {
            Ok(product) => {
                self.max_pulse_ms = self.session.config().max_guide_pulse_ms;
                tracing::info!("Guider on {}, max pulse {} ms", product, self.max_pulse_ms);
            }
            Err(e) if e.is_transport() => {
                self.session.release(false);
                return Err(e);
            }
            Err(e) => tracing::warn!("Guider product check failed: {}", e),
        }
        self.mount = Some(mount);
        Ok(())
    }

    /// Release the link without stopping the mount
    pub fn disconnect(&mut self) {
        if self.mount.take().is_some() {
            self.session.release(false);
            tracing::info!("Guider disconnected");
        }
    }

    /// True while this role holds the link
    pub fn is_connected(&self) -> bool {
        self.mount.is_some()
    }

    /// Longest pulse accepted; longer requests are clamped
    pub fn max_pulse_ms(&self) -> u32 {
        self.max_pulse_ms
    }

    /// Pulse north or south and wait for it to finish
    pub fn guide_dec(&self, north_ms: u32, south_ms: u32) -> Result<(), ProtocolError> {
        self.pulse(Axis::Dec, north_ms, south_ms)
    }

    /// Pulse west or east and wait for it to finish
    pub fn guide_ra(&self, west_ms: u32, east_ms: u32) -> Result<(), ProtocolError> {
        self.pulse(Axis::Ra, west_ms, east_ms)
    }

    fn pulse(&self, axis: Axis, first_ms: u32, second_ms: u32) -> Result<(), ProtocolError> {
        let mount = self.mount.as_ref().ok_or(ProtocolError::NotConnected)?;
        mount.pulse_guide(
            axis,
            first_ms.min(self.max_pulse_ms),
            second_ms.min(self.max_pulse_ms),
        )
    }
}

impl Drop for GuiderRole {
    fn drop(&mut self) {
        self.disconnect();
    }
}
