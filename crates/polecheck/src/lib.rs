//! `polecheck`: pole-permission conflict classification engine.
//!
//! Pure engine crate: reads permission records, returns classified conflicts
//! and report renderings. No CLI or path-resolution concerns.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod index;
pub mod loader;
pub mod model;
pub mod report;
pub mod status;

pub use config::AnalysisConfig;
pub use engine::{run, run_path, run_reader};
pub use error::{PolecheckError, Result};
pub use model::{AnalysisResult, ConflictKind, ConflictRecord, PermissionRecord, RiskLevel};
