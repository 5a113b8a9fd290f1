//! Try-On Orchestrator Library
//!
//! Core engine of a virtual-clothing-try-on backend: quota-metered
//! generation orchestration over a third-party image-synthesis vendor,
//! with multi-factor anonymous identity, an audit trail, and best-effort
//! permanent storage with an out-of-band upload sweep.

pub mod auth;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod generation;
pub mod metrics;
pub mod quota;
pub mod storage;

pub use config::Config;
pub use error::TryOnError;
