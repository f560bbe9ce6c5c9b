//! Purpose: Define the public Rust API for the geovector vector-product service.
//! Exports: `FeatureCollection`, `Feature`, `VectorClient`, job/upload handles, errors.
//! Role: Public, additive-only surface used by the CLI and embedders.
//! Invariants: Proxies reach the network only through `VectorService`.
//! Invariants: Every fallible call returns `core::error::Error` with a stable `ErrorKind`.

mod collection;
mod config;
mod feature;
mod jobs;
mod service;
mod upload;
mod vector;

#[cfg(test)]
mod testing;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::filter::{Expression, Property, RangeOp};
pub use crate::core::geometry::{GeoInterface, Geometry};
pub use crate::core::poll::{DEFAULT_POLL_INTERVAL, PollOptions};
pub use collection::{ADD_BATCH_SIZE, FeatureCollection, Features};
pub use config::{
    ClientConfig, DEFAULT_BASE_URL, ENV_MAX_RETRIES, ENV_POLL_INTERVAL_MS, ENV_TOKEN, ENV_URL,
};
pub use feature::{Feature, FeatureAttributes};
pub use jobs::{CopyJob, DeleteJob, JobKind};
pub use service::{
    FeaturePage, FeatureQuery, JobState, JobStatus, PRINCIPAL_PREFIXES, Product,
    ProductAttributes, ProductPatch, ProductSpec, ProductUpdate, UploadInfo, UploadResult,
    UploadStatus, VectorService,
};
pub use upload::UploadTask;
pub use vector::VectorClient;
