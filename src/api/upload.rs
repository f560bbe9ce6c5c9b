//! Purpose: Track asynchronous feature uploads into a product.
//! Exports: `UploadTask`.
//! Role: Result handle returned by `FeatureCollection::upload` and `list_uploads`.
//! Invariants: A 404 from the result endpoint means "not registered yet", not failure.
//! Invariants: Upload `FAILURE` is reported through the result, never raised.
use super::service::{UploadInfo, UploadResult, UploadStatus, VectorService};
use crate::core::error::{Error, ErrorKind};
use crate::core::poll::{PollOptions, wait_until};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

pub struct UploadTask {
    client: Arc<dyn VectorService>,
    product_id: String,
    upload_id: String,
    info: Option<UploadInfo>,
    poll_interval: Duration,
}

impl std::fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTask")
            .field("product_id", &self.product_id)
            .field("upload_id", &self.upload_id)
            .field("info", &self.info)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl UploadTask {
    pub fn new(
        client: Arc<dyn VectorService>,
        product_id: impl Into<String>,
        upload_id: impl Into<String>,
    ) -> Self {
        let poll_interval = client.poll_interval();
        Self {
            client,
            product_id: product_id.into(),
            upload_id: upload_id.into(),
            info: None,
            poll_interval,
        }
    }

    pub fn from_info(
        client: Arc<dyn VectorService>,
        product_id: impl Into<String>,
        info: UploadInfo,
    ) -> Self {
        let mut task = Self::new(client, product_id, info.id.clone());
        task.info = Some(info);
        task
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn status(&self) -> UploadStatus {
        self.info
            .as_ref()
            .map(|info| info.status.clone())
            .unwrap_or(UploadStatus::Pending)
    }

    pub fn is_ready(&self) -> bool {
        self.info
            .as_ref()
            .is_some_and(|info| info.status.is_terminal())
    }

    pub fn created(&self) -> Option<OffsetDateTime> {
        self.info.as_ref().and_then(|info| info.created)
    }

    /// Last fetched result, terminal or not.
    pub fn result(&self) -> Option<&UploadResult> {
        self.info.as_ref().map(|info| &info.result)
    }

    /// Fetches the latest upload state; returns whether it is terminal.
    pub fn refresh(&mut self) -> Result<bool, Error> {
        match self
            .client
            .get_upload_result(&self.product_id, &self.upload_id)
        {
            Ok(info) => {
                if self.info.as_ref().map(|prev| &prev.status) != Some(&info.status) {
                    tracing::info!(
                        product = %self.product_id,
                        upload = %self.upload_id,
                        status = info.status.as_str(),
                        "upload status"
                    );
                }
                self.info = Some(info);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(upload = %self.upload_id, "upload not registered yet");
            }
            Err(err) => return Err(err),
        }
        Ok(self.is_ready())
    }

    /// Returns the final result, polling when `wait` is set.
    ///
    /// Without `wait`, a single refresh is attempted and `NotReady` is returned if the
    /// upload is still in flight. With `wait`, `timeout` bounds the poll loop.
    pub fn get_result(
        &mut self,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<&UploadResult, Error> {
        if !self.is_ready() {
            if wait {
                let options = PollOptions::new(self.poll_interval).with_timeout(timeout);
                wait_until(|| self.refresh(), options).map_err(|err| {
                    err.with_product(self.product_id.clone())
                        .with_job(self.upload_id.clone())
                })?;
            } else if !self.refresh()? {
                return Err(Error::new(ErrorKind::NotReady)
                    .with_message(format!("upload is {}", self.status().as_str()))
                    .with_product(self.product_id.clone())
                    .with_job(self.upload_id.clone())
                    .with_hint("Retry later, or wait for the result."));
            }
        }
        self.result().ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("upload finished without a result")
        })
    }
}
