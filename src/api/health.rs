//! Database availability gate and the /health payload.
//! The gate is written by the reconnect loop only; handlers just read it.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Whether database initialization has succeeded. Starts closed.
#[derive(Default)]
pub struct DbGate {
    connected: AtomicBool,
}

impl DbGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate. There is no way back to closed: request failures are
    /// reported per request and do not touch global availability.
    pub fn set_connected(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn label(&self) -> &'static str {
        if self.is_connected() {
            "connected"
        } else {
            "disconnected"
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub port: u16,
    pub database: &'static str,
}

impl HealthResponse {
    /// Snapshot of process state. Never touches the database.
    pub fn snapshot(gate: &DbGate, port: u16) -> Self {
        Self {
            status: "ok",
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            port,
            database: gate.label(),
        }
    }
}
