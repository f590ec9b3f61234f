//! Common utilities, types, and configurations shared across fathom crates.
//!
//! - **Configuration**: Strongly typed application configuration (`config`).
//! - **Wire models**: Client/server event envelopes and the `query-response` payload (`models`).
//! - **Telemetry**: Logging subscriber setup (`telemetry`).
pub mod config;
pub mod models;
pub mod telemetry;
