//! Ingestion pipeline for the Hike Alert wearable.
//!
//! Readings arrive either as base64 BLE notifications or as a newline
//! delimited serial stream. Both carry the same comma-separated record,
//! which is decoded, enriched with derived metrics and kept in rolling
//! per-signal series for live dashboards.

pub mod config;
pub mod decoding;
pub mod error;
pub mod metrics;
pub mod models;
pub mod series;
pub mod session;
pub mod transport;
pub mod utils;

pub use config::IngestConfig;
pub use error::{IngestError, RejectedRecord};
pub use models::{FrostbiteRisk, Reading, Signal, TransportKind};
pub use series::RollingSeriesStore;
pub use session::{SessionController, SessionSnapshot, SessionState};
