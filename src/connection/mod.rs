//! # Connection Module
//!
//! Handles the WebSocket link to the telemetry source.
//!
//! This module handles:
//! - Deriving the endpoint URL from the page origin
//! - The connection lifecycle state machine and status
//! - Fixed-delay automatic reconnection with a single pending timer
//! - Forwarding received text to the telemetry store
//! - Sending replay commands and tearing the connection down

pub mod endpoint;
pub mod manager;
pub mod state;
pub mod transport;

pub use manager::{ConnectionHandle, ConnectionManager, ManagerSettings, OutboundCommand};
pub use state::{ConnectionMachine, ConnectionStatus, Phase};
pub use transport::{Connector, SocketEvent, TelemetrySocket, WsConnector};
