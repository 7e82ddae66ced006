// src/core/mod.rs

// Root of the `core` module: everything with domain logic lives below here.

/// Data structures shared across the crate: sites, probe selections, the
/// per-probe result types, and the aggregated site report.
pub mod models;

/// The four network probes (HTTP, TLS, DNS, security headers) and the
/// orchestration that runs them per site and per batch.
pub mod probe;

/// Flattening of a batch into tabular rows and serialization to JSON and CSV.
pub mod report;
