//! Garo Meter Bridge Library
//!
//! Polls a Garo energy meter's `/status/energy-meter` endpoint on a fixed interval
//! and exposes power, energy and per-phase current and voltage as eight cached
//! entities on a host automation platform.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod integration;
pub mod measurement;
pub mod meter_client;
pub mod metric;
pub mod platform;
pub mod sensor;

// Re-export commonly used types for easier access
pub use config::{MeterConfig, MeterOptions};
pub use coordinator::{CoordinatorPhase, CoordinatorStatus, PollCoordinator, PollHandle};
pub use error::{ConfigError, FetchError, SetupError};
pub use integration::Integration;
pub use meter_client::{MeterClient, SnapshotSource};
pub use metric::{MetricKey, MetricSnapshot};
pub use platform::{DeviceInfo, EntityDescription, EntityPlatform, EntityState, LogPlatform};
pub use sensor::MetricView;
