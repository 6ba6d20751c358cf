use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;

use celestial_shared::protocol::{Direction, ServerSnapshot};
use tokio::sync::{mpsc as tokio_mpsc, watch};

use crate::config::{ClientConfig, ClientError};
use crate::connection::{run_network, NetworkChannels};

/// Handshake outcome as seen by the render side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Status cell written by the network thread, polled once per frame.
#[derive(Debug, Default)]
pub struct StatusCell {
    status: AtomicU8,
    slot: AtomicU32,
}

impl StatusCell {
    const PENDING: u8 = 0;
    const ACCEPTED: u8 = 1;
    const REJECTED: u8 = 2;

    pub fn get(&self) -> SessionStatus {
        match self.status.load(Ordering::Acquire) {
            Self::PENDING => SessionStatus::Pending,
            Self::ACCEPTED => SessionStatus::Accepted,
            // Only the constants above are ever stored
            _ => SessionStatus::Rejected,
        }
    }

    pub(crate) fn accept(&self, slot: u32) {
        self.slot.store(slot, Ordering::Relaxed);
        self.status.store(Self::ACCEPTED, Ordering::Release);
    }

    pub(crate) fn reject(&self) {
        self.status.store(Self::REJECTED, Ordering::Release);
    }

    /// Slot granted by the server, once accepted.
    pub fn slot(&self) -> Option<u32> {
        match self.get() {
            SessionStatus::Accepted => Some(self.slot.load(Ordering::Relaxed)),
            _ => None,
        }
    }
}

/// Receiving end of the snapshot queue. Stale snapshots are worthless, so a
/// read drains everything queued and keeps the newest.
#[derive(Debug)]
pub struct SnapshotMailbox {
    rx: Receiver<ServerSnapshot>,
}

impl SnapshotMailbox {
    pub fn new(rx: Receiver<ServerSnapshot>) -> Self {
        Self { rx }
    }

    pub fn take_latest(&self) -> Option<ServerSnapshot> {
        let mut latest = None;
        while let Ok(snapshot) = self.rx.try_recv() {
            latest = Some(snapshot);
        }
        latest
    }
}

/// One participant's session with the server.
///
/// Networking runs on its own thread with its own tokio runtime; nothing
/// here blocks except `shutdown`, and that only up to `shutdown_timeout`.
pub struct SessionClient {
    player_id: String,
    status: Arc<StatusCell>,
    intent_tx: tokio_mpsc::UnboundedSender<Direction>,
    mailbox: SnapshotMailbox,
    alive_tx: watch::Sender<bool>,
    done_rx: Receiver<()>,
    config: ClientConfig,
    thread: Option<JoinHandle<()>>,
}

impl SessionClient {
    /// Start the network thread and send the connect request. Returns
    /// immediately; poll `status()` for the outcome.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let status = Arc::new(StatusCell::default());
        let (intent_tx, intent_rx) = tokio_mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::channel();
        let (alive_tx, alive_rx) = watch::channel(true);
        let (done_tx, done_rx) = mpsc::channel();

        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_io()
            .enable_time()
            .build()?;

        let channels = NetworkChannels {
            status: Arc::clone(&status),
            intent_rx,
            snapshot_tx,
            alive_rx,
        };
        let net_config = config.clone();
        let thread = std::thread::Builder::new()
            .name("celestial-net".to_string())
            .spawn(move || {
                rt.block_on(run_network(net_config, channels));
                let _ = done_tx.send(());
            })?;

        tracing::info!("Connecting {} to {}", config.player_id, config.server_url);

        Ok(Self {
            player_id: config.player_id.clone(),
            status,
            intent_tx,
            mailbox: SnapshotMailbox::new(snapshot_rx),
            alive_tx,
            done_rx,
            config: config.clone(),
            thread: Some(thread),
        })
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status.get()
    }

    pub fn slot(&self) -> Option<u32> {
        self.status.slot()
    }

    /// Queue one movement intent. Never blocks; dropped if the network
    /// thread is gone.
    pub fn send_move(&self, direction: Direction) {
        let _ = self.intent_tx.send(direction);
    }

    /// Drain the mailbox and keep only the newest snapshot.
    pub fn poll_snapshot(&self) -> Option<ServerSnapshot> {
        self.mailbox.take_latest()
    }

    /// Ask the network thread to disconnect and wait for it, bounded by
    /// `shutdown_timeout`.
    pub fn shutdown(mut self) -> Result<(), ClientError> {
        let _ = self.alive_tx.send(false);

        match self.done_rx.recv_timeout(self.config.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    let _ = thread.join();
                }
                tracing::info!("Session for {} closed", self.player_id);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Network thread for {} still running after {:?}",
                    self.player_id,
                    self.config.shutdown_timeout
                );
                Err(ClientError::ShutdownTimeout(self.config.shutdown_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn snapshot(tick: u64) -> ServerSnapshot {
        ServerSnapshot {
            tick,
            tick_dt: 0.02,
            players: HashMap::new(),
            elapsed_time: 0.0,
            match_started: true,
        }
    }

    #[test]
    fn test_mailbox_keeps_only_newest() {
        let (tx, rx) = mpsc::channel();
        let mailbox = SnapshotMailbox::new(rx);
        assert!(mailbox.take_latest().is_none());

        for tick in 1..=5 {
            tx.send(snapshot(tick)).unwrap();
        }
        assert_eq!(mailbox.take_latest().map(|s| s.tick), Some(5));
        assert!(mailbox.take_latest().is_none());

        tx.send(snapshot(6)).unwrap();
        drop(tx);
        assert_eq!(mailbox.take_latest().map(|s| s.tick), Some(6));
        assert!(mailbox.take_latest().is_none());
    }

    #[test]
    fn test_unknown_status_value_reads_as_rejected() {
        let cell = StatusCell::default();
        cell.status.store(42, Ordering::Release);
        assert_eq!(cell.get(), SessionStatus::Rejected);
    }

    #[test]
    fn test_status_cell_transitions() {
        let cell = StatusCell::default();
        assert_eq!(cell.get(), SessionStatus::Pending);
        assert_eq!(cell.slot(), None);

        cell.accept(2);
        assert_eq!(cell.get(), SessionStatus::Accepted);
        assert_eq!(cell.slot(), Some(2));

        cell.reject();
        assert_eq!(cell.get(), SessionStatus::Rejected);
        assert_eq!(cell.slot(), None);
    }
}
