//
// lib.rs
// Report-Tools-rs
//
// Exposes the crate's modules and re-exports the main entry points for both
// binary and library consumers.
//
// Report-Tools-rs maintainers - October 2026

pub mod aggregator;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod image;
pub mod imagedb;
pub mod models;
pub mod products;
pub mod push;
pub mod repacs;
pub mod report;
pub mod resize;
pub mod scu;
pub mod storage;
pub mod synth;
pub mod uid;
pub mod web;

pub use cli::{run as run_cli, Cli, Commands};
pub use config::ReportConfig;
pub use error::{ReportError, ReportResult};
pub use products::Product;
pub use push::report_push;
pub use report::{convert, convert_film, convert_report, remove_film};
