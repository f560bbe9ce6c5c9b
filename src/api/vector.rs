//! Purpose: Provide the HTTP/JSON-API client for the remote vector service.
//! Exports: `VectorClient`.
//! Role: Blocking `VectorService` implementation; one request per call plus bounded retries.
//! Invariants: Requests and responses use JSON-API envelopes (`application/vnd.api+json`).
//! Invariants: Base URL may carry a path prefix; endpoints are appended as path segments.
//! Invariants: Upload bodies go to the signed URL without the service bearer token.
#![allow(clippy::result_large_err)]

use super::config::ClientConfig;
use super::feature::{Feature, FeatureAttributes};
use super::service::{
    FeaturePage, FeatureQuery, JobState, JobStatus, Product, ProductAttributes, ProductPatch,
    ProductSpec, ProductUpdate, UploadInfo, UploadResult, UploadStatus, VectorService,
};
use crate::core::error::{Error, ErrorKind, error_kind_from_status};
use crate::core::jsonapi::{
    Document, ErrorDocument, JSONAPI_MEDIA_TYPE, Resource, jsonapi_collection, jsonapi_document,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use ureq::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use ureq::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use ureq::rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use url::Url;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct VectorClient {
    inner: Arc<VectorClientInner>,
}

#[derive(Clone)]
struct VectorClientInner {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    poll_interval: Duration,
    page_size: u32,
}

#[derive(Debug)]
struct AcceptAllServerCertVerifier;

impl ServerCertVerifier for AcceptAllServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ureq::rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[derive(Deserialize, Default)]
struct SearchMeta {
    total_count: Option<u64>,
    continuation_token: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    data: Vec<Resource<FeatureAttributes>>,
    #[serde(default)]
    meta: Option<SearchMeta>,
}

#[derive(Deserialize)]
struct JobAttributes {
    #[serde(default)]
    state: String,
    created: Option<String>,
    started: Option<String>,
    ended: Option<String>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Deserialize)]
struct UploadAttributes {
    #[serde(default)]
    status: String,
    created: Option<String>,
    #[serde(default)]
    result: Option<UploadResultWire>,
}

#[derive(Deserialize, Default)]
struct UploadResultWire {
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default)]
    error_rows: u64,
    #[serde(default)]
    input_features: u64,
    #[serde(default)]
    input_rows: u64,
    job_id: Option<String>,
}

#[derive(Deserialize)]
struct UploadTarget {
    upload_id: String,
    url: String,
}

#[derive(Serialize)]
struct UploadRequest {
    max_errors: u64,
    multipart: bool,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    #[serde(flatten)]
    query: &'a FeatureQuery,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_token: Option<&'a str>,
}

#[derive(Serialize)]
struct CopyQueryAttributes<'a> {
    #[serde(flatten)]
    query: &'a FeatureQuery,
    #[serde(flatten)]
    spec: &'a ProductSpec,
}

impl VectorClient {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let agent = agent_builder(config.connect_timeout, config.read_timeout).build();
        Ok(Self {
            inner: Arc::new(VectorClientInner {
                base_url,
                token: config.token,
                agent,
                connect_timeout: config.connect_timeout,
                read_timeout: config.read_timeout,
                max_retries: config.max_retries,
                retry_backoff: config.retry_backoff,
                poll_interval: config.poll_interval,
                page_size: config.page_size.max(1),
            }),
        })
    }

    pub fn from_env() -> ApiResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).token = Some(token.into());
        self
    }

    pub fn with_tls_ca_file(self, path: impl AsRef<Path>) -> ApiResult<Self> {
        let path = path.as_ref();
        let cert_bytes = std::fs::read(path).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "failed to read TLS CA/certificate file {}",
                    path.display()
                ))
                .with_source(err)
        })?;
        let mut cert_reader = Cursor::new(cert_bytes);
        let certs = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "failed to parse TLS CA/certificate file {}",
                        path.display()
                    ))
                    .with_source(err)
            })?;
        if certs.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "TLS CA/certificate file {} contains no certificates",
                path.display()
            )));
        }

        let _ = ureq::rustls::crypto::aws_lc_rs::default_provider().install_default();
        let mut root_store = ureq::rustls::RootCertStore::empty();
        let (added, _) = root_store.add_parsable_certificates(certs);
        if added == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "TLS CA/certificate file {} contains no parsable certificates",
                path.display()
            )));
        }

        let tls_config = ureq::rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let agent = agent_builder(self.inner.connect_timeout, self.inner.read_timeout)
            .tls_config(Arc::new(tls_config))
            .build();
        Ok(self.with_agent(agent))
    }

    pub fn with_tls_skip_verify(self) -> Self {
        let _ = ureq::rustls::crypto::aws_lc_rs::default_provider().install_default();
        let tls_config = ureq::rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAllServerCertVerifier))
            .with_no_client_auth();
        let agent = agent_builder(self.inner.connect_timeout, self.inner.read_timeout)
            .tls_config(Arc::new(tls_config))
            .build();
        self.with_agent(agent)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn with_agent(mut self, agent: ureq::Agent) -> Self {
        Arc::make_mut(&mut self.inner).agent = agent;
        self
    }

    fn url(&self, segments: &[&str]) -> ApiResult<Url> {
        build_url(&self.inner.base_url, segments)
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let mut request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", JSONAPI_MEDIA_TYPE);
        if let Some(token) = &self.inner.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
    }

    /// Sends one request, retrying transport failures and 500/502/503/504 responses.
    fn send(&self, method: &str, url: &Url, payload: Option<&str>) -> ApiResult<ureq::Response> {
        let mut attempt: u32 = 0;
        loop {
            tracing::debug!(method, url = %url, attempt, "vector request");
            let request = self.request(method, url);
            let response = match payload {
                Some(payload) => request
                    .set("Content-Type", JSONAPI_MEDIA_TYPE)
                    .send_string(payload),
                None => request.call(),
            };
            let retryable = match &response {
                Ok(_) => false,
                Err(ureq::Error::Status(code, _)) => is_retryable_status(*code),
                Err(ureq::Error::Transport(_)) => true,
            };
            if retryable && attempt < self.inner.max_retries {
                let delay = self
                    .inner
                    .retry_backoff
                    .saturating_mul(1u32 << attempt.min(16));
                tracing::debug!(method, url = %url, attempt, ?delay, "retrying vector request");
                sleep(delay);
                attempt += 1;
                continue;
            }
            return match response {
                Ok(resp) => Ok(resp),
                Err(ureq::Error::Status(code, resp)) => {
                    Err(parse_error_response(method, url, code, resp))
                }
                Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                    .with_message(format!("request failed: {method} {}", url.path()))
                    .with_source(err)),
            };
        }
    }

    fn request_json<T, R>(&self, method: &str, url: &Url, body: Option<&T>) -> ApiResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let payload = body
            .map(|body| {
                serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })
            })
            .transpose()?;
        let response = self.send(method, url, payload.as_deref())?;
        read_json_response(response)
    }

    fn get_json<R: DeserializeOwned>(&self, url: &Url) -> ApiResult<R> {
        self.request_json::<(), R>("GET", url, None)
    }

    fn job_status(&self, product_id: &str, action: &str) -> ApiResult<JobStatus> {
        let url = self.url(&["products", product_id, "search", action])?;
        let document: Document<Resource<JobAttributes>> = self
            .get_json(&url)
            .map_err(|err| err.with_product(product_id))?;
        Ok(job_status_from_remote(document.data))
    }
}

impl VectorService for VectorClient {
    fn list_products(&self, page: u32) -> ApiResult<Vec<Product>> {
        let mut url = self.url(&["products"])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &self.inner.page_size.to_string());
        let document: Document<Vec<Resource<ProductAttributes>>> = self.get_json(&url)?;
        Ok(document.data.into_iter().map(product_from_remote).collect())
    }

    fn create_product(&self, spec: &ProductSpec) -> ApiResult<Product> {
        let url = self.url(&["products"])?;
        let body = jsonapi_document("product", spec, None);
        let document: Document<Resource<ProductAttributes>> =
            self.request_json("POST", &url, Some(&body))?;
        Ok(product_from_remote(document.data))
    }

    fn get_product(&self, product_id: &str) -> ApiResult<ProductPatch> {
        let url = self.url(&["products", product_id])?;
        let document: Document<Resource<ProductPatch>> = self
            .get_json(&url)
            .map_err(|err| err.with_product(product_id))?;
        Ok(document.data.attributes)
    }

    fn update_product(
        &self,
        product_id: &str,
        update: &ProductUpdate,
    ) -> ApiResult<ProductPatch> {
        let url = self.url(&["products", product_id])?;
        let body = jsonapi_document("product", update, Some(product_id.to_string()));
        let document: Document<Resource<ProductPatch>> = self
            .request_json("PATCH", &url, Some(&body))
            .map_err(|err| err.with_product(product_id))?;
        Ok(document.data.attributes)
    }

    fn replace_product(&self, product_id: &str, spec: &ProductSpec) -> ApiResult<ProductPatch> {
        let url = self.url(&["products", product_id])?;
        let body = jsonapi_document("product", spec, Some(product_id.to_string()));
        let document: Document<Resource<ProductPatch>> = self
            .request_json("PUT", &url, Some(&body))
            .map_err(|err| err.with_product(product_id))?;
        Ok(document.data.attributes)
    }

    fn delete_product(&self, product_id: &str) -> ApiResult<()> {
        let url = self.url(&["products", product_id])?;
        self.send("DELETE", &url, None)
            .map_err(|err| err.with_product(product_id))?;
        Ok(())
    }

    fn create_features(
        &self,
        product_id: &str,
        features: &[FeatureAttributes],
    ) -> ApiResult<Vec<Feature>> {
        let url = self.url(&["products", product_id, "features"])?;
        let body = jsonapi_collection("feature", features.iter().collect::<Vec<_>>(), None)?;
        let document: Document<Vec<Resource<FeatureAttributes>>> = self
            .request_json("POST", &url, Some(&body))
            .map_err(|err| err.with_product(product_id))?;
        Ok(document.data.into_iter().map(Feature::from_resource).collect())
    }

    fn search_features(
        &self,
        product_id: &str,
        query: &FeatureQuery,
        continuation: Option<&str>,
    ) -> ApiResult<FeaturePage> {
        let url = self.url(&["products", product_id, "search"])?;
        let body = SearchRequest {
            query,
            page_size: self.inner.page_size,
            continuation_token: continuation,
        };
        let response: SearchResponse = self
            .request_json("POST", &url, Some(&body))
            .map_err(|err| err.with_product(product_id))?;
        let meta = response.meta.unwrap_or_default();
        Ok(FeaturePage {
            features: response
                .data
                .into_iter()
                .map(Feature::from_resource)
                .collect(),
            total: meta.total_count,
            continuation: meta.continuation_token.filter(|token| !token.is_empty()),
        })
    }

    fn create_product_from_query(
        &self,
        product_id: &str,
        query: &FeatureQuery,
        spec: &ProductSpec,
    ) -> ApiResult<Product> {
        let url = self.url(&["products", product_id, "search", "copy"])?;
        let body = jsonapi_document("copy_query", CopyQueryAttributes { query, spec }, None);
        let document: Document<Resource<ProductAttributes>> = self
            .request_json("POST", &url, Some(&body))
            .map_err(|err| err.with_product(product_id))?;
        Ok(product_from_remote(document.data))
    }

    fn get_product_from_query_status(&self, product_id: &str) -> ApiResult<JobStatus> {
        self.job_status(product_id, "copy")
    }

    fn delete_features_from_query(
        &self,
        product_id: &str,
        query: &FeatureQuery,
    ) -> ApiResult<String> {
        let url = self.url(&["products", product_id, "search", "delete"])?;
        let body = jsonapi_document("delete_query", query, None);
        let document: Document<Resource<Value>> = self
            .request_json("POST", &url, Some(&body))
            .map_err(|err| err.with_product(product_id))?;
        Ok(document.data.id)
    }

    fn get_delete_features_status(&self, product_id: &str) -> ApiResult<JobStatus> {
        self.job_status(product_id, "delete")
    }

    fn upload_features(
        &self,
        product_id: &str,
        source: &mut dyn Read,
        max_errors: u64,
    ) -> ApiResult<String> {
        let url = self.url(&["products", product_id, "features", "uploads"])?;
        let body = UploadRequest {
            max_errors,
            multipart: false,
        };
        let target: UploadTarget = self
            .request_json("POST", &url, Some(&body))
            .map_err(|err| err.with_product(product_id))?;

        let upload_url = Url::parse(&target.url).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("service returned an invalid upload url")
                .with_product(product_id)
                .with_source(err)
        })?;
        tracing::debug!(upload_id = %target.upload_id, "uploading feature file");
        let response = self
            .inner
            .agent
            .put(upload_url.as_str())
            .set("Content-Type", "application/octet-stream")
            .send(source);
        match response {
            Ok(_) => Ok(target.upload_id),
            Err(ureq::Error::Status(code, resp)) => {
                Err(parse_error_response("PUT", &upload_url, code, resp)
                    .with_product(product_id)
                    .with_job(target.upload_id))
            }
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("upload failed")
                .with_product(product_id)
                .with_job(target.upload_id)
                .with_source(err)),
        }
    }

    fn get_upload_results(&self, product_id: &str) -> ApiResult<Vec<UploadInfo>> {
        let url = self.url(&["products", product_id, "features", "uploads"])?;
        let document: Document<Vec<Resource<UploadAttributes>>> = self
            .get_json(&url)
            .map_err(|err| err.with_product(product_id))?;
        Ok(document.data.into_iter().map(upload_from_remote).collect())
    }

    fn get_upload_result(&self, product_id: &str, upload_id: &str) -> ApiResult<UploadInfo> {
        let url = self.url(&["products", product_id, "features", "uploads", upload_id])?;
        let document: Document<Resource<UploadAttributes>> = self
            .get_json(&url)
            .map_err(|err| err.with_product(product_id).with_job(upload_id))?;
        Ok(upload_from_remote(document.data))
    }

    fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }
}

fn agent_builder(connect_timeout: Duration, read_timeout: Duration) -> ureq::AgentBuilder {
    ureq::AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .timeout_read(read_timeout)
        .user_agent(concat!("geovector/", env!("CARGO_PKG_VERSION")))
}

fn normalize_base_url(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid service base url {raw:?}"))
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("service base url must use http or https scheme"));
    }
    if url.cannot_be_a_base() {
        return Err(Error::new(ErrorKind::Usage).with_message("service base url cannot be a base"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("service base url cannot be a base")
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

/// Decodes straight from the body stream; ureq caps `into_string` at 10 MB.
fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    serde_json::from_reader(BufReader::new(response.into_reader())).map_err(|err| {
        if err.is_io() {
            Error::new(ErrorKind::Io)
                .with_message("failed to read response body")
                .with_source(err)
        } else {
            Error::new(ErrorKind::Internal)
                .with_message("invalid response json")
                .with_source(err)
        }
    })
}

fn parse_error_response(method: &str, url: &Url, status: u16, response: ureq::Response) -> Error {
    let kind = error_kind_from_status(status);
    let err = Error::new(kind).with_status(status);
    if kind == ErrorKind::GatewayTimeout {
        return err
            .with_message("request timed out on the server")
            .with_hint("Consider reducing the complexity of your request.");
    }
    let mut body = String::new();
    if let Err(read_err) = response.into_reader().read_to_string(&mut body) {
        tracing::debug!(status, error = %read_err, "error response body unreadable");
    }
    let message = serde_json::from_str::<ErrorDocument>(&body)
        .ok()
        .and_then(|document| document.summary())
        .or_else(|| {
            let text = body.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .unwrap_or_else(|| format!("{status} {method} {}", url.path()));
    err.with_message(message)
}

fn parse_timestamp(raw: Option<String>) -> Option<OffsetDateTime> {
    let raw = raw?;
    match OffsetDateTime::parse(&raw, &Rfc3339) {
        Ok(ts) => Some(ts),
        Err(err) => {
            tracing::debug!(timestamp = %raw, error = %err, "ignoring unparsable timestamp");
            None
        }
    }
}

fn error_strings(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| match value {
            Value::String(text) => text,
            other => other.to_string(),
        })
        .collect()
}

fn product_from_remote(resource: Resource<ProductAttributes>) -> Product {
    Product::new(resource.id, resource.attributes)
}

fn job_status_from_remote(resource: Resource<JobAttributes>) -> JobStatus {
    let attributes = resource.attributes;
    JobStatus {
        id: resource.id,
        state: JobState::parse(&attributes.state),
        created: parse_timestamp(attributes.created),
        started: parse_timestamp(attributes.started),
        ended: parse_timestamp(attributes.ended),
        errors: error_strings(attributes.errors),
    }
}

fn upload_from_remote(resource: Resource<UploadAttributes>) -> UploadInfo {
    let attributes = resource.attributes;
    let result = attributes.result.unwrap_or_default();
    UploadInfo {
        id: resource.id,
        status: UploadStatus::parse(&attributes.status),
        created: parse_timestamp(attributes.created),
        result: UploadResult {
            errors: error_strings(result.errors),
            error_rows: result.error_rows,
            input_features: result.input_features,
            input_rows: result.input_rows,
            job_id: result.job_id,
        },
    }
}
