//! Purpose: Define the remote vector service seam and its request/response types.
//! Exports: `VectorService`, `Product`, `ProductPatch`, `ProductSpec`, `ProductUpdate`,
//! `FeatureQuery`, `FeaturePage`, `JobState`, `JobStatus`, `UploadStatus`, `UploadInfo`,
//! `UploadResult`.
//! Role: `VectorClient` implements this over HTTP; proxies only talk to the trait.
//! Invariants: Access principals carry an `email:`, `user:`, `group:` or `org:` prefix.
//! Invariants: Implementations issue one synchronous request per call (plus retries).
use super::feature::{Feature, FeatureAttributes};
use crate::core::error::{Error, ErrorKind};
use crate::core::filter::Expression;
use crate::core::geometry::Geometry;
use crate::core::poll::DEFAULT_POLL_INTERVAL;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;
use time::OffsetDateTime;

pub const PRINCIPAL_PREFIXES: [&str; 4] = ["email:", "user:", "group:", "org:"];

pub trait VectorService: Send + Sync {
    fn list_products(&self, page: u32) -> Result<Vec<Product>, Error>;

    fn create_product(&self, spec: &ProductSpec) -> Result<Product, Error>;

    fn get_product(&self, product_id: &str) -> Result<ProductPatch, Error>;

    /// Returns only the attributes present in the service's response.
    fn update_product(
        &self,
        product_id: &str,
        update: &ProductUpdate,
    ) -> Result<ProductPatch, Error>;

    fn replace_product(
        &self,
        product_id: &str,
        spec: &ProductSpec,
    ) -> Result<ProductPatch, Error>;

    fn delete_product(&self, product_id: &str) -> Result<(), Error>;

    /// Creates features and returns them with their service-assigned ids, in input order.
    fn create_features(
        &self,
        product_id: &str,
        features: &[FeatureAttributes],
    ) -> Result<Vec<Feature>, Error>;

    fn search_features(
        &self,
        product_id: &str,
        query: &FeatureQuery,
        continuation: Option<&str>,
    ) -> Result<FeaturePage, Error>;

    /// Starts a server-side copy of the query result into a new product.
    fn create_product_from_query(
        &self,
        product_id: &str,
        query: &FeatureQuery,
        spec: &ProductSpec,
    ) -> Result<Product, Error>;

    fn get_product_from_query_status(&self, product_id: &str) -> Result<JobStatus, Error>;

    /// Starts a server-side delete of the matching features; returns the product id the
    /// service echoes back, which is also the key its delete status is polled by.
    fn delete_features_from_query(
        &self,
        product_id: &str,
        query: &FeatureQuery,
    ) -> Result<String, Error>;

    fn get_delete_features_status(&self, product_id: &str) -> Result<JobStatus, Error>;

    /// Uploads newline-delimited GeoJSON for asynchronous ingest; returns the upload id.
    fn upload_features(
        &self,
        product_id: &str,
        source: &mut dyn Read,
        max_errors: u64,
    ) -> Result<String, Error>;

    fn get_upload_results(&self, product_id: &str) -> Result<Vec<UploadInfo>, Error>;

    fn get_upload_result(&self, product_id: &str, upload_id: &str) -> Result<UploadInfo, Error>;

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ProductAttributes {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub readers: Vec<String>,
    #[serde(default)]
    pub writers: Vec<String>,
}

impl ProductAttributes {
    /// Overlays the fields present in `patch`; absent fields keep their current value.
    pub fn merge(&mut self, patch: ProductPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(owners) = patch.owners {
            self.owners = owners;
        }
        if let Some(readers) = patch.readers {
            self.readers = readers;
        }
        if let Some(writers) = patch.writers {
            self.writers = writers;
        }
    }
}

/// Product attributes as a service response carries them; any field may be missing.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owners: Option<Vec<String>>,
    #[serde(default)]
    pub readers: Option<Vec<String>>,
    #[serde(default)]
    pub writers: Option<Vec<String>>,
}

impl From<ProductAttributes> for ProductPatch {
    fn from(attributes: ProductAttributes) -> Self {
        Self {
            name: Some(attributes.name),
            title: Some(attributes.title),
            description: Some(attributes.description),
            owners: Some(attributes.owners),
            readers: Some(attributes.readers),
            writers: Some(attributes.writers),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Product {
    pub id: String,
    pub attributes: ProductAttributes,
}

impl Product {
    pub fn new(id: impl Into<String>, attributes: ProductAttributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

/// Full attribute set for creating or replacing a product.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ProductSpec {
    pub name: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owners: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writers: Option<Vec<String>>,
}

impl ProductSpec {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description: description.into(),
            owners: None,
            readers: None,
            writers: None,
        }
    }

    pub fn with_owners(mut self, owners: Vec<String>) -> Self {
        self.owners = Some(owners);
        self
    }

    pub fn with_readers(mut self, readers: Vec<String>) -> Self {
        self.readers = Some(readers);
        self
    }

    pub fn with_writers(mut self, writers: Vec<String>) -> Self {
        self.writers = Some(writers);
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_name(&self.name)?;
        for principals in [&self.owners, &self.readers, &self.writers]
            .into_iter()
            .flatten()
        {
            validate_principals(principals)?;
        }
        Ok(())
    }
}

/// Partial attribute set; `None` fields are left untouched by the service.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ProductUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owners: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writers: Option<Vec<String>>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.owners.is_none()
            && self.readers.is_none()
            && self.writers.is_none()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("update requires at least one attribute"));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        for principals in [&self.owners, &self.readers, &self.writers]
            .into_iter()
            .flatten()
        {
            validate_principals(principals)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct FeatureQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_expr: Option<Expression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_limit: Option<u64>,
}

impl FeatureQuery {
    pub fn is_unbounded(&self) -> bool {
        self.geometry.is_none() && self.query_expr.is_none() && self.query_limit.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeaturePage {
    pub features: Vec<Feature>,
    /// Size of the full result set, when the service reports it.
    pub total: Option<u64>,
    pub continuation: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Success,
    Failure,
    Other(String),
}

impl JobState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "DONE" => JobState::Done,
            "SUCCESS" => JobState::Success,
            "FAILURE" => JobState::Failure,
            other => JobState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Done => "DONE",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
            JobState::Other(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Success | JobState::Failure)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    pub created: Option<OffsetDateTime>,
    pub started: Option<OffsetDateTime>,
    pub ended: Option<OffsetDateTime>,
    pub errors: Vec<String>,
}

impl JobStatus {
    pub fn new(id: impl Into<String>, state: JobState) -> Self {
        Self {
            id: id.into(),
            state,
            created: None,
            started: None,
            ended: None,
            errors: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UploadStatus {
    Pending,
    Running,
    Success,
    Failure,
    Other(String),
}

impl UploadStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PENDING" => UploadStatus::Pending,
            "RUNNING" => UploadStatus::Running,
            "SUCCESS" => UploadStatus::Success,
            "FAILURE" => UploadStatus::Failure,
            other => UploadStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Running => "RUNNING",
            UploadStatus::Success => "SUCCESS",
            UploadStatus::Failure => "FAILURE",
            UploadStatus::Other(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Failure)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UploadResult {
    pub errors: Vec<String>,
    pub error_rows: u64,
    pub input_features: u64,
    pub input_rows: u64,
    pub job_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UploadInfo {
    pub id: String,
    pub status: UploadStatus,
    pub created: Option<OffsetDateTime>,
    pub result: UploadResult,
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid product name {name:?}"))
            .with_hint("Names are short handles without spaces; put prose in title."));
    }
    Ok(())
}

fn validate_principals(principals: &[String]) -> Result<(), Error> {
    for principal in principals {
        let prefixed = PRINCIPAL_PREFIXES
            .iter()
            .any(|prefix| principal.len() > prefix.len() && principal.starts_with(prefix));
        if !prefixed {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid access principal {principal:?}"))
                .with_hint("Prefix principals with email:, user:, group: or org:."));
        }
    }
    Ok(())
}
