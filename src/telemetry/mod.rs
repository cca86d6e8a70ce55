// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing setup for the runtime.
//!
//! Runtime components log through the `tracing` macros and, with the
//! `telemetry` feature (on by default), open spans on their public async
//! entry points. Hosts install a subscriber once at startup:
//!
//! ```rust,ignore
//! use codi_runtime::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```
//!
//! Logging conventions:
//!
//! 1. `info!` for lifecycle events (backend ready, plan applied, task finished)
//! 2. `warn!` for degradations (backend failed, fallback used, step failed)
//! 3. `debug!` for per-call details (queries, step targets, permit waits)

mod init;

pub use init::{init_telemetry, init_test_telemetry, TelemetryConfig, TelemetryGuard};
