/*
[INPUT]:  Public API exports for the live data runner
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod printer;

pub use config::{parse_subscription, RunnerConfig};
pub use printer::LogPrinter;
