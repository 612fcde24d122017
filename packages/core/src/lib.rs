// Library root: exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod db;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod services;

// Startup plumbing used by the binary.
pub mod cli;
pub mod config;
pub mod logging;
