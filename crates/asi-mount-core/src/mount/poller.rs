//! Background poll loop

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::broadcast;

use super::operations::Mount;
use super::reconciler::{MountEvent, Reconciler};
use crate::protocol::ProtocolError;

/// Runs [`Reconciler::poll_tick`] on a dedicated thread until stopped
pub struct Poller {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start polling immediately. Events go to `events`; having no
    /// subscribers is fine.
    pub fn start(
        mount: Arc<Mount>,
        reconciler: Reconciler,
        events: broadcast::Sender<MountEvent>,
    ) -> Result<Self, ProtocolError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("mount-poller".to_string())
            .spawn(move || {
                tracing::debug!("Poller started on {}", mount.channel().name());
                loop {
                    let report = reconciler.poll_tick(&mount);
                    for event in report.events {
                        let _ = events.send(event);
                    }
                    // The stop signal doubles as a cancellable sleep
                    match stop_rx.recv_timeout(reconciler.interval(report.cadence)) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("Poller stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// True until the thread exits
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop polling and wait for an in-flight tick to finish
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Poller thread panicked");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
