//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, EnvFilter)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is set by middleware and shows up in the
//!   request span
//! - Resolution misses log at debug, failures at error, socket trouble at warn

pub mod logging;
pub mod metrics;
