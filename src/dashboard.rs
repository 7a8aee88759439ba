//! # Dashboard
//!
//! Read side for the presentation layer: connection status, series
//! snapshots and position, plus the go-live and replay actions.

use serde::Serialize;

use crate::connection::{ConnectionHandle, ConnectionStatus};
use crate::error::Result;
use crate::telemetry::{IngestStats, Position, SeriesSnapshot, TelemetryStore};

/// Everything the presentation layer renders, taken under one lock
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub status: ConnectionStatus,
    pub title: String,
    pub esc: SeriesSnapshot,
    pub telemetry: SeriesSnapshot,
    pub position: Position,
    pub stats: IngestStats,
}

/// Presentation-facing handle over the connection and the telemetry store
#[derive(Debug, Clone)]
pub struct Dashboard {
    connection: ConnectionHandle,
    store: TelemetryStore,
}

impl Dashboard {
    pub fn new(connection: ConnectionHandle, store: TelemetryStore) -> Self {
        Self { connection, store }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn esc_series(&self) -> SeriesSnapshot {
        self.store.esc_series()
    }

    pub fn telemetry_series(&self) -> SeriesSnapshot {
        self.store.telemetry_series()
    }

    pub fn position(&self) -> Position {
        self.store.position()
    }

    /// Consistent view of status, series, position and mode
    pub fn snapshot(&self) -> DashboardSnapshot {
        let status = self.connection.status();
        self.store.with(|aggregator| DashboardSnapshot {
            status,
            title: aggregator.mode().title(),
            esc: aggregator.esc_series(),
            telemetry: aggregator.telemetry_series(),
            position: aggregator.position(),
            stats: aggregator.stats(),
        })
    }

    /// Clear all series and return to live mode; the connection is untouched
    pub fn go_live(&self) {
        self.store.go_live();
    }

    /// Reconnect now instead of waiting for the retry timer
    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    /// Request a replay of `file` from the telemetry source
    pub async fn replay(&self, file: &str) -> Result<()> {
        self.connection.replay(file).await
    }

    /// Tear down the connection
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::transport::mocks::MockConnector;
    use crate::connection::{ConnectionManager, ManagerSettings, SocketEvent};
    use crate::error::DashboardError;
    use tokio::time::Duration;

    fn start(connector: &MockConnector) -> Dashboard {
        let store = TelemetryStore::default();
        let settings = ManagerSettings {
            url: "ws://localhost:1880/ws".to_string(),
            reconnect_delay: Duration::from_millis(5000),
            connect_timeout: Duration::from_millis(1000),
            replay_dir: "/data/logs".to_string(),
        };
        let (manager, handle) = ConnectionManager::new(connector.clone(), settings, store.clone());
        tokio::spawn(manager.run());
        Dashboard::new(handle, store)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reflects_ingested_messages() {
        let connector = MockConnector::new();
        let socket = connector.accept_next();
        let dashboard = start(&connector);

        wait_until(|| dashboard.status() == ConnectionStatus::Connected).await;
        socket.push(SocketEvent::Message(r#"{"voltage": 12.1, "current": 3.4}"#.to_string()));
        socket.push(SocketEvent::Message(
            r#"{"latitude": 55.7, "longitude": 37.6, "altitude_relative": 100}"#.to_string(),
        ));
        wait_until(|| dashboard.snapshot().stats.accepted == 2).await;

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert_eq!(snapshot.title, "Drone Data - Live Mode");
        assert_eq!(snapshot.esc.dataset("RPM"), Some(&[0.0][..]));
        assert_eq!(snapshot.telemetry.dataset("Altitude"), Some(&[100.0][..]));
        assert_eq!(snapshot.position, Position { latitude: 55.7, longitude: 37.6 });
        assert_eq!(dashboard.position(), snapshot.position);
        assert_eq!(dashboard.esc_series(), snapshot.esc);
        assert_eq!(dashboard.telemetry_series(), snapshot.telemetry);
    }

    #[tokio::test(start_paused = true)]
    async fn test_go_live_clears_without_touching_connection() {
        let connector = MockConnector::new();
        let socket = connector.accept_next();
        let dashboard = start(&connector);

        wait_until(|| dashboard.status() == ConnectionStatus::Connected).await;
        socket.push(SocketEvent::Message(r#"{"voltage": 12.1, "current": 3.4}"#.to_string()));
        wait_until(|| !dashboard.esc_series().is_empty()).await;

        dashboard.replay("mission.jsonl").await.unwrap();
        assert_eq!(dashboard.snapshot().title, "Drone Data - Replay: mission.jsonl Mode");

        socket.push(SocketEvent::Message(r#"{"voltage": 15.0, "current": 1.0}"#.to_string()));
        wait_until(|| !dashboard.esc_series().is_empty()).await;

        dashboard.go_live();
        let snapshot = dashboard.snapshot();
        assert!(snapshot.esc.is_empty());
        assert_eq!(snapshot.title, "Drone Data - Live Mode");
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert!(!socket.is_closed());
        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_then_replay_reports_stopped() {
        let connector = MockConnector::new();
        let _socket = connector.accept_next();
        let dashboard = start(&connector);

        wait_until(|| dashboard.status() == ConnectionStatus::Connected).await;
        dashboard.disconnect().await;
        wait_until(|| dashboard.status() == ConnectionStatus::Disconnected).await;

        let result = dashboard.replay("mission.jsonl").await;
        assert!(matches!(
            result,
            Err(DashboardError::ManagerStopped) | Err(DashboardError::NotConnected(_))
        ));
    }

    #[test]
    fn test_snapshot_serializes() {
        let store = TelemetryStore::default();
        store.ingest(r#"{"voltage": 1.0, "current": 2.0}"#).unwrap();
        let snapshot = DashboardSnapshot {
            status: ConnectionStatus::Connected,
            title: "Drone Data - Live Mode".to_string(),
            esc: store.esc_series(),
            telemetry: store.telemetry_series(),
            position: store.position(),
            stats: store.stats(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "Connected");
        assert_eq!(json["esc"]["datasets"][0]["name"], "Voltage");
        assert_eq!(json["esc"]["datasets"][0]["values"][0], 1.0);
        assert_eq!(json["stats"]["accepted"], 1);
    }
}
