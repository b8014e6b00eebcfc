// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-wide logging for realisation runs.

use std::sync::OnceLock;

use spiral_config::tracing::{self as config_tracing, InitError};
use tracing::warn;

/// Outcome of the first [`init_tracing`] call in this process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelemetryState {
    /// The `spiral-config` subscriber is active.
    Installed,
    /// Some other subscriber was already global; events go there.
    Foreign,
    /// No subscriber could be configured.
    Unavailable(String),
}

impl TelemetryState {
    fn from_init(result: Result<(), InitError>) -> Self {
        match result {
            Ok(()) => Self::Installed,
            Err(InitError::AlreadyInitialised | InitError::Subscriber(_)) => Self::Foreign,
            Err(err @ InitError::Env(_)) => Self::Unavailable(err.to_string()),
        }
    }

    /// Events emitted under `st_cosmos::*` reach some subscriber.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

static STATE: OnceLock<TelemetryState> = OnceLock::new();

/// Installs the process-wide subscriber once. Later calls return the first
/// outcome. A subscriber installed by the host application is kept and
/// reported as [`TelemetryState::Foreign`].
pub fn init_tracing() -> &'static TelemetryState {
    STATE.get_or_init(|| {
        let state = TelemetryState::from_init(config_tracing::init_tracing());
        if let TelemetryState::Unavailable(reason) = &state {
            warn!(target: "st_cosmos::telemetry", %reason, "tracing subscriber not installed");
        }
        state
    })
}

/// Flushes the Chrome trace file, if one was requested via `SPIRAL_TRACE_CHROME`.
pub fn shutdown_tracing() {
    config_tracing::flush_chrome_trace();
}
