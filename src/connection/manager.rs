//! # Connection Manager
//!
//! Owns the single live telemetry socket. Runs as one task that processes
//! socket events, the reconnect timer and handle commands one at a time, so
//! every message is fully ingested before the next event is looked at.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{error::Elapsed, sleep_until, timeout, Duration, Instant};
use tracing::{debug, info, warn};

use super::state::{ConnectionMachine, ConnectionStatus, Phase};
use super::transport::{Connector, SocketEvent, TelemetrySocket};
use crate::error::{DashboardError, Result};
use crate::telemetry::TelemetryStore;

/// Default delay between a close and the next connection attempt
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Capacity of the handle command queue
const COMMAND_QUEUE_SIZE: usize = 16;

/// Runtime settings for the manager
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// WebSocket URL of the telemetry endpoint
    pub url: String,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    /// Directory prefix joined to replay file names
    pub replay_dir: String,
}

/// Result of one connection attempt, bounded by the connect timeout
type OpenResult = std::result::Result<Result<Box<dyn TelemetrySocket>>, Elapsed>;

/// Connection attempt in flight, polled by the manager loop
type PendingOpen = Pin<Box<dyn Future<Output = OpenResult> + Send>>;

/// Command sent to the telemetry source as JSON text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OutboundCommand {
    Replay { file: String },
}

#[derive(Debug)]
enum ManagerCommand {
    Connect,
    Replay {
        file: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect,
}

/// Cloneable handle to a running [`ConnectionManager`]
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<ManagerCommand>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ConnectionHandle {
    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Start a connection attempt now
    ///
    /// Ignored while a connection is already opening or open. A pending
    /// reconnect timer is cancelled in favour of this attempt.
    ///
    /// # Errors
    ///
    /// Returns `ManagerStopped` if the manager task has exited
    pub async fn connect(&self) -> Result<()> {
        self.commands
            .send(ManagerCommand::Connect)
            .await
            .map_err(|_| DashboardError::ManagerStopped)
    }

    /// Ask the source to replay `file`
    ///
    /// On success all series are cleared and the mode becomes `Replay(file)`.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if no socket is open
    /// - `Transport` if the frame could not be sent
    /// - `ManagerStopped` if the manager task has exited
    pub async fn replay(&self, file: &str) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ManagerCommand::Replay {
                file: file.to_string(),
                reply,
            })
            .await
            .map_err(|_| DashboardError::ManagerStopped)?;

        response.await.map_err(|_| DashboardError::ManagerStopped)?
    }

    /// Tear down: cancel any pending reconnect, close the socket and stop
    /// the manager. Safe to call when not connected or already stopped.
    pub async fn disconnect(&self) {
        if self.commands.send(ManagerCommand::Disconnect).await.is_err() {
            debug!("Connection manager already stopped");
        }
    }
}

/// Drives one telemetry connection with automatic reconnection
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    settings: ManagerSettings,
    machine: ConnectionMachine,
    store: TelemetryStore,
    socket: Option<Box<dyn TelemetrySocket>>,
    opening: Option<PendingOpen>,
    commands: mpsc::Receiver<ManagerCommand>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.settings.url)
            .field("machine", &self.machine)
            .field("socket_open", &self.socket.is_some())
            .field("opening", &self.opening.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: Connector + 'static> ConnectionManager<C> {
    /// Create a manager and its handle. Nothing connects until [`run`](Self::run).
    pub fn new(connector: C, settings: ManagerSettings, store: TelemetryStore) -> (Self, ConnectionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let machine = ConnectionMachine::new(settings.reconnect_delay);
        let (status_tx, status_rx) = watch::channel(machine.status());

        let manager = Self {
            connector: Arc::new(connector),
            settings,
            machine,
            store,
            socket: None,
            opening: None,
            commands: command_rx,
            status_tx,
        };
        let handle = ConnectionHandle {
            commands: command_tx,
            status: status_rx,
        };
        (manager, handle)
    }

    /// Connect and keep the connection alive until a disconnect is requested
    /// or every handle has been dropped.
    pub async fn run(mut self) {
        info!("Connecting to WebSocket: {}", self.settings.url);
        self.connect();

        loop {
            let deadline = self.machine.reconnect_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ManagerCommand::Connect) => self.connect(),
                    Some(ManagerCommand::Replay { file, reply }) => {
                        let result = self.replay(&file).await;
                        let _ = reply.send(result);
                    }
                    Some(ManagerCommand::Disconnect) | None => {
                        self.teardown().await;
                        break;
                    }
                },

                opened = next_open_result(&mut self.opening) => {
                    self.opening = None;
                    self.finish_open(opened);
                }

                event = next_socket_event(&mut self.socket) => {
                    self.handle_event(event);
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.machine.reconnect_due(Instant::now()) {
                        info!("Attempting to reconnect...");
                        self.start_open();
                    }
                }
            }
        }
    }

    /// Start a connection attempt unless one is already opening or open
    fn connect(&mut self) {
        if !self.machine.connect() {
            debug!("Connect ignored: connection already {:?}", self.machine.phase());
            return;
        }
        self.start_open();
    }

    /// Begin opening the socket for an attempt the state machine has already
    /// started. The loop keeps serving commands while the handshake runs.
    fn start_open(&mut self) {
        self.publish_status();

        let connector = Arc::clone(&self.connector);
        let url = self.settings.url.clone();
        let limit = self.settings.connect_timeout;
        self.opening = Some(Box::pin(async move { timeout(limit, connector.open(&url)).await }));
    }

    fn finish_open(&mut self, opened: OpenResult) {
        match opened {
            Ok(Ok(socket)) => {
                self.socket = Some(socket);
                self.machine.on_open();
                info!("WebSocket connection opened");
            }
            Ok(Err(e)) => {
                warn!("WebSocket error: {}", e);
                self.fail_attempt();
            }
            Err(_) => {
                warn!(
                    "WebSocket connection to {} timed out after {} ms",
                    self.settings.url,
                    self.settings.connect_timeout.as_millis()
                );
                self.fail_attempt();
            }
        }

        self.publish_status();
    }

    /// A failed open reports an error followed by a close
    fn fail_attempt(&mut self) {
        self.machine.on_error();
        self.publish_status();
        self.on_closed();
    }

    fn on_closed(&mut self) {
        self.socket = None;
        info!("WebSocket connection closed");
        if self.machine.on_close(Instant::now()) {
            info!(
                "Reconnecting in {} ms",
                self.machine.reconnect_delay().as_millis()
            );
        }
    }

    fn handle_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Message(text) => {
                // Malformed payloads are logged by the aggregator and dropped
                if let Ok(outcome) = self.store.ingest(&text) {
                    debug!("Message applied as {:?}", outcome);
                }
            }
            SocketEvent::Error(e) => {
                warn!("WebSocket error: {}", e);
                self.machine.on_error();
            }
            SocketEvent::Closed => self.on_closed(),
        }
        self.publish_status();
    }

    async fn replay(&mut self, file: &str) -> Result<()> {
        if self.machine.phase() != Phase::Open {
            return Err(DashboardError::NotConnected(format!(
                "cannot replay {} while status is {}",
                file,
                self.machine.status()
            )));
        }
        let Some(socket) = self.socket.as_mut() else {
            return Err(DashboardError::NotConnected(format!(
                "no open socket to replay {}",
                file
            )));
        };

        let command = OutboundCommand::Replay {
            file: replay_path(&self.settings.replay_dir, file),
        };
        let text = serde_json::to_string(&command)?;
        socket.send_text(text).await?;

        self.store.with(|aggregator| aggregator.start_replay(file));
        info!("Sent replay command for file: {}", file);
        Ok(())
    }

    async fn teardown(&mut self) {
        if self.opening.take().is_some() {
            debug!("Abandoning connection attempt in flight");
        }
        if self.machine.disconnect() {
            debug!("Closing live socket");
        }
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close().await {
                warn!("{}", e);
            }
        }
        self.machine.on_close(Instant::now());
        self.publish_status();
        info!("Connection manager stopped");
    }

    fn publish_status(&self) {
        self.status_tx.send_if_modified(|current| {
            let next = self.machine.status();
            if *current == next {
                return false;
            }
            debug!("Connection status: {} -> {}", current, next);
            *current = next;
            true
        });
    }
}

async fn next_open_result(opening: &mut Option<PendingOpen>) -> OpenResult {
    match opening {
        Some(attempt) => attempt.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_socket_event(socket: &mut Option<Box<dyn TelemetrySocket>>) -> SocketEvent {
    match socket {
        Some(socket) => socket.next_event().await,
        None => std::future::pending().await,
    }
}

/// Join a replay file name onto the configured log directory
pub fn replay_path(dir: &str, file: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", dir, file.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::transport::mocks::MockConnector;
    use crate::telemetry::DashboardMode;

    const DELAY: Duration = Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS);
    const URL: &str = "ws://localhost:1880/ws";
    const ESC_MESSAGE: &str = r#"{"voltage": 12.1, "current": 3.4}"#;

    fn settings() -> ManagerSettings {
        ManagerSettings {
            url: URL.to_string(),
            reconnect_delay: DELAY,
            connect_timeout: Duration::from_millis(1000),
            replay_dir: "/data/logs".to_string(),
        }
    }

    fn start(connector: &MockConnector) -> (tokio::task::JoinHandle<()>, ConnectionHandle, TelemetryStore) {
        start_with(connector, settings())
    }

    fn start_with(
        connector: &MockConnector,
        settings: ManagerSettings,
    ) -> (tokio::task::JoinHandle<()>, ConnectionHandle, TelemetryStore) {
        let store = TelemetryStore::default();
        let (manager, handle) = ConnectionManager::new(connector.clone(), settings, store.clone());
        (tokio::spawn(manager.run()), handle, store)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..60_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached within 60s of virtual time");
    }

    #[test]
    fn test_replay_command_json() {
        let command = OutboundCommand::Replay { file: "/data/logs/a.jsonl".to_string() };
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"action":"replay","file":"/data/logs/a.jsonl"}"#
        );
    }

    #[test]
    fn test_replay_path() {
        assert_eq!(replay_path("/data/logs", "a.jsonl"), "/data/logs/a.jsonl");
        assert_eq!(replay_path("/data/logs/", "/a.jsonl"), "/data/logs/a.jsonl");
        assert_eq!(replay_path("", "a.jsonl"), "a.jsonl");
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_sets_connected_and_ingests_messages() {
        let connector = MockConnector::new();
        let socket = connector.accept_next();
        let (_task, handle, store) = start(&connector);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        assert_eq!(connector.attempts.lock().unwrap()[0].0, URL);

        socket.push(SocketEvent::Message(ESC_MESSAGE.to_string()));
        socket.push(SocketEvent::Message("not json".to_string()));
        socket.push(SocketEvent::Message(r#"{"latitude": 55.7, "longitude": 37.6}"#.to_string()));
        wait_until(|| store.stats().accepted == 2).await;

        assert_eq!(store.esc_series().len(), 1);
        assert_eq!(store.telemetry_series().len(), 1);
        assert_eq!(store.stats().malformed, 1);
        assert_eq!(handle.status(), ConnectionStatus::Connected, "bad payloads do not affect the connection");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_schedules_single_reconnect_after_delay() {
        let connector = MockConnector::new();
        let first = connector.accept_next();
        let _second = connector.accept_next();
        let (_task, handle, _store) = start(&connector);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        let closed_at = Instant::now();
        first.push(SocketEvent::Closed);
        wait_until(|| handle.status() == ConnectionStatus::Disconnected).await;

        tokio::time::sleep(DELAY - Duration::from_millis(10)).await;
        assert_eq!(connector.attempt_count(), 1, "no reconnect before the delay");

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        let times = connector.attempt_times();
        assert_eq!(times.len(), 2);
        let gap = times[1] - closed_at;
        assert!(gap >= DELAY && gap < DELAY + Duration::from_millis(50), "gap was {:?}", gap);

        // Settled on the second socket: no further attempts
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(connector.attempt_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_then_close_reconnects_once() {
        let connector = MockConnector::new();
        let first = connector.accept_next();
        let _second = connector.accept_next();
        let (_task, handle, _store) = start(&connector);
        let mut status = handle.subscribe();

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        let _ = status.borrow_and_update();

        first.push(SocketEvent::Error("connection reset".to_string()));
        status.changed().await.unwrap();
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Error);

        first.push(SocketEvent::Closed);
        status.changed().await.unwrap();
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Disconnected);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(connector.attempt_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connections_retry_indefinitely_at_fixed_delay() {
        let connector = MockConnector::new();
        let (_task, handle, _store) = start(&connector);

        wait_until(|| connector.attempt_count() >= 5).await;
        let times = connector.attempt_times();
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= DELAY && gap < DELAY + Duration::from_millis(50), "gap was {:?}", gap);
        }
        assert_ne!(handle.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_socket_without_reconnect() {
        let connector = MockConnector::new();
        let socket = connector.accept_next();
        let _spare = connector.accept_next();
        let (task, handle, _store) = start(&connector);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        handle.disconnect().await;
        task.await.unwrap();

        assert!(socket.is_closed());
        assert_eq!(handle.status(), ConnectionStatus::Disconnected);
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = MockConnector::new();
        let socket = connector.accept_next();
        let _spare = connector.accept_next();
        let (task, handle, _store) = start(&connector);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        socket.push(SocketEvent::Closed);
        wait_until(|| handle.status() == ConnectionStatus::Disconnected).await;

        handle.disconnect().await;
        task.await.unwrap();

        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(connector.attempt_count(), 1, "teardown must cancel the pending reconnect");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_after_stop_is_safe() {
        let connector = MockConnector::new();
        let (task, handle, _store) = start(&connector);

        handle.disconnect().await;
        task.await.unwrap();
        handle.disconnect().await;

        let result = handle.replay("a.jsonl").await;
        assert!(matches!(result, Err(DashboardError::ManagerStopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_stalled_handshake_returns_immediately() {
        let connector = MockConnector::new();
        connector.stall_opens();
        let slow = ManagerSettings {
            connect_timeout: Duration::from_secs(10),
            ..settings()
        };
        let (task, handle, _store) = start_with(&connector, slow);

        wait_until(|| connector.attempt_count() == 1).await;
        assert_eq!(handle.status(), ConnectionStatus::Connecting);

        let started = Instant::now();
        handle.disconnect().await;
        task.await.unwrap();

        let waited = Instant::now() - started;
        assert!(waited < Duration::from_millis(100), "teardown waited {:?}", waited);
        assert_eq!(handle.status(), ConnectionStatus::Disconnected);

        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(connector.attempt_count(), 1, "no reconnect after teardown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_during_stalled_handshake_is_not_connected() {
        let connector = MockConnector::new();
        connector.stall_opens();
        let (_task, handle, _store) = start(&connector);

        wait_until(|| connector.attempt_count() == 1).await;
        let started = Instant::now();
        let result = handle.replay("flight_01.jsonl").await;

        assert!(matches!(result, Err(DashboardError::NotConnected(_))));
        assert!(Instant::now() - started < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_open_is_ignored() {
        let connector = MockConnector::new();
        let _socket = connector.accept_next();
        let _spare = connector.accept_next();
        let (_task, handle, _store) = start(&connector);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        handle.connect().await.unwrap();
        handle.connect().await.unwrap();
        tokio::time::sleep(DELAY * 2).await;

        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(handle.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connecting_is_ignored() {
        let connector = MockConnector::new();
        connector.stall_opens();
        let (_task, handle, _store) = start(&connector);

        wait_until(|| connector.attempt_count() == 1).await;
        handle.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(handle.status(), ConnectionStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_cancels_pending_reconnect_timer() {
        let connector = MockConnector::new();
        let first = connector.accept_next();
        let _second = connector.accept_next();
        let _spare = connector.accept_next();
        let (_task, handle, _store) = start(&connector);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        let closed_at = Instant::now();
        first.push(SocketEvent::Closed);
        wait_until(|| handle.status() == ConnectionStatus::Disconnected).await;

        handle.connect().await.unwrap();
        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        let times = connector.attempt_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - closed_at < DELAY, "connect must not wait for the timer");

        // The cancelled timer must not fire a second socket
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(connector.attempt_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_stop_fails() {
        let connector = MockConnector::new();
        let (task, handle, _store) = start(&connector);

        handle.disconnect().await;
        task.await.unwrap();
        assert!(matches!(handle.connect().await, Err(DashboardError::ManagerStopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_all_handles_stops_manager() {
        let connector = MockConnector::new();
        let socket = connector.accept_next();
        let (task, handle, _store) = start(&connector);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        drop(handle);
        task.await.unwrap();
        assert!(socket.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_sends_command_and_clears_series() {
        let connector = MockConnector::new();
        let socket = connector.accept_next();
        let (_task, handle, store) = start(&connector);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        socket.push(SocketEvent::Message(ESC_MESSAGE.to_string()));
        socket.push(SocketEvent::Message(r#"{"latitude": 1.5, "longitude": 2.5}"#.to_string()));
        wait_until(|| store.stats().accepted == 2).await;

        handle.replay("flight_01.jsonl").await.unwrap();

        assert_eq!(
            socket.get_sent(),
            vec![r#"{"action":"replay","file":"/data/logs/flight_01.jsonl"}"#.to_string()]
        );
        assert!(store.esc_series().is_empty());
        assert!(store.telemetry_series().is_empty());
        assert_eq!(store.position().latitude, 1.5, "position survives the clear");
        assert_eq!(
            store.with(|agg| agg.mode().clone()),
            DashboardMode::Replay("flight_01.jsonl".to_string())
        );
        assert_eq!(handle.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_send_failure_keeps_series_and_mode() {
        let connector = MockConnector::new();
        let socket = connector.accept_next();
        let (_task, handle, store) = start(&connector);

        wait_until(|| handle.status() == ConnectionStatus::Connected).await;
        socket.push(SocketEvent::Message(ESC_MESSAGE.to_string()));
        wait_until(|| store.stats().accepted == 1).await;

        socket.fail_sends();
        let result = handle.replay("flight_01.jsonl").await;

        assert!(matches!(result, Err(DashboardError::Transport(_))));
        assert_eq!(store.esc_series().len(), 1, "series are cleared only after a successful send");
        assert_eq!(store.with(|agg| agg.mode().clone()), DashboardMode::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_without_connection_fails() {
        let connector = MockConnector::new();
        let (_task, handle, store) = start(&connector);

        wait_until(|| connector.attempt_count() >= 1).await;
        let result = handle.replay("flight_01.jsonl").await;

        assert!(matches!(result, Err(DashboardError::NotConnected(_))));
        assert_eq!(store.with(|agg| agg.mode().clone()), DashboardMode::Live);
    }
}
