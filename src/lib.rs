//! Purpose: Client library for the geovector vector-product service, shared with the CLI.
//! Exports: `api` (collections, features, jobs, uploads, client) and `core` (errors, geometry).
//! Role: Synchronous SDK; every network call blocks and returns an explicit `Result`.
//! Invariants: `api` is the stable surface; `core` holds plain data and pure helpers.
//! Invariants: No process-global state; configuration flows through `ClientConfig`.
pub mod api;
pub mod core;
