//! # roulette-observability
//!
//! Observability-Crate fuer Roulette:
//! - Prometheus-kompatible Metriken fuer Paarung, Verhandlung und Abbau
//! - Structured Logging (Text oder JSON) via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::RouletteMetrics;
