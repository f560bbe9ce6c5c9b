// Core modules: error model, GeoJSON geometry, property filters, JSON-API envelopes, polling.
pub mod error;
pub mod filter;
pub mod geometry;
pub mod jsonapi;
pub mod poll;
