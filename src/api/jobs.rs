//! Purpose: Track asynchronous copy and delete jobs running on the vector service.
//! Exports: `CopyJob`, `DeleteJob`, `JobKind`.
//! Role: Wraps the status endpoints in the shared poll loop from `core::poll`.
//! Invariants: Construction fetches status once; each completion check fetches again.
//! Invariants: `DONE`/`SUCCESS` finish cleanly, `FAILURE` becomes a `FailedJob` error.
use super::service::{JobState, JobStatus, VectorService};
use crate::core::error::{Error, ErrorKind};
use crate::core::poll::{PollOptions, wait_until};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobKind {
    Copy,
    Delete,
}

impl JobKind {
    fn label(self) -> &'static str {
        match self {
            JobKind::Copy => "copy",
            JobKind::Delete => "delete",
        }
    }
}

struct AsyncJob {
    client: Arc<dyn VectorService>,
    product_id: String,
    kind: JobKind,
    status: JobStatus,
    poll_interval: Duration,
}

impl AsyncJob {
    fn start(
        client: Arc<dyn VectorService>,
        product_id: String,
        kind: JobKind,
    ) -> Result<Self, Error> {
        let status = fetch_status(client.as_ref(), &product_id, kind)?;
        tracing::info!(
            job = kind.label(),
            product = %product_id,
            state = status.state.as_str(),
            "tracking job"
        );
        let poll_interval = client.poll_interval();
        Ok(Self {
            client,
            product_id,
            kind,
            status,
            poll_interval,
        })
    }

    fn refresh(&mut self) -> Result<&JobStatus, Error> {
        let status = fetch_status(self.client.as_ref(), &self.product_id, self.kind)?;
        if status.state != self.status.state {
            tracing::info!(
                job = self.kind.label(),
                product = %self.product_id,
                from = self.status.state.as_str(),
                to = status.state.as_str(),
                "job state changed"
            );
        }
        self.status = status;
        Ok(&self.status)
    }

    fn check_complete(&mut self) -> Result<bool, Error> {
        self.refresh()?;
        let status = &self.status;
        if !status.state.is_terminal() {
            return Ok(false);
        }
        if status.state == JobState::Failure {
            let mut err = Error::new(ErrorKind::FailedJob)
                .with_message(format!("{} job failed", self.kind.label()))
                .with_product(self.product_id.clone())
                .with_details(status.errors.clone());
            if !status.id.is_empty() {
                err = err.with_job(status.id.clone());
            }
            return Err(err);
        }
        tracing::info!(
            job = self.kind.label(),
            product = %self.product_id,
            state = status.state.as_str(),
            "job complete"
        );
        Ok(true)
    }

    fn wait_for_completion(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        let options = PollOptions::new(self.poll_interval).with_timeout(timeout);
        let product_id = self.product_id.clone();
        wait_until(|| self.check_complete(), options)
            .map_err(|err| match err.kind() {
                ErrorKind::WaitTimeout => err.with_product(product_id),
                _ => err,
            })
    }
}

fn fetch_status(
    client: &dyn VectorService,
    product_id: &str,
    kind: JobKind,
) -> Result<JobStatus, Error> {
    match kind {
        JobKind::Copy => client.get_product_from_query_status(product_id),
        JobKind::Delete => client.get_delete_features_status(product_id),
    }
}

/// A server-side copy of a filtered query into a new product, keyed by the new product id.
///
/// Features are not visible in the target product until the copy finishes.
pub struct CopyJob {
    job: AsyncJob,
}

impl CopyJob {
    pub fn new(
        client: Arc<dyn VectorService>,
        product_id: impl Into<String>,
    ) -> Result<Self, Error> {
        Ok(Self {
            job: AsyncJob::start(client, product_id.into(), JobKind::Copy)?,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.job.poll_interval = interval;
        self
    }

    pub fn product_id(&self) -> &str {
        &self.job.product_id
    }

    pub fn status(&self) -> &JobStatus {
        &self.job.status
    }

    pub fn refresh(&mut self) -> Result<&JobStatus, Error> {
        self.job.refresh()
    }

    /// Blocks until the copy finishes, fails, or `timeout` elapses (`None` waits forever).
    pub fn wait_for_completion(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.job.wait_for_completion(timeout)
    }
}

/// A server-side delete of the features matching a query.
///
/// Only one delete job may run per product at a time; reads stay available meanwhile.
pub struct DeleteJob {
    job: AsyncJob,
}

impl std::fmt::Debug for DeleteJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteJob")
            .field("product_id", &self.job.product_id)
            .field("kind", &self.job.kind)
            .field("poll_interval", &self.job.poll_interval)
            .finish_non_exhaustive()
    }
}

impl DeleteJob {
    pub fn new(
        client: Arc<dyn VectorService>,
        product_id: impl Into<String>,
    ) -> Result<Self, Error> {
        Ok(Self {
            job: AsyncJob::start(client, product_id.into(), JobKind::Delete)?,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.job.poll_interval = interval;
        self
    }

    pub fn product_id(&self) -> &str {
        &self.job.product_id
    }

    pub fn status(&self) -> &JobStatus {
        &self.job.status
    }

    pub fn refresh(&mut self) -> Result<&JobStatus, Error> {
        self.job.refresh()
    }

    pub fn wait_for_completion(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.job.wait_for_completion(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::{CopyJob, DeleteJob};
    use crate::api::service::{JobState, JobStatus};
    use crate::api::testing::{Call, FakeVector};
    use crate::core::error::ErrorKind;
    use std::sync::Arc;
    use std::time::Duration;

    fn status(state: &str) -> JobStatus {
        JobStatus::new("c589d688-3230-4caf-9f9d-18854f71e91d", JobState::parse(state))
    }

    #[test]
    fn copy_wait_polls_until_done() {
        let fake = Arc::new(FakeVector::default());
        fake.script_copy([status("RUNNING"), status("DONE")]);

        let mut job = CopyJob::new(fake.clone(), "foo").expect("job");
        job.wait_for_completion(None).expect("done");

        assert_eq!(fake.count(|call| matches!(call, Call::CopyStatus(id) if id == "foo")), 2);
        assert_eq!(job.status().state, JobState::Done);
    }

    #[test]
    fn copy_failure_is_failed_job_error() {
        let fake = Arc::new(FakeVector::default());
        let mut failed = status("FAILURE");
        failed.errors = vec!["bad geometry on row 3".to_string()];
        fake.script_copy([failed.clone(), failed]);

        let mut job = CopyJob::new(fake.clone(), "foo").expect("job");
        let err = job.wait_for_completion(None).expect_err("failed");

        assert_eq!(err.kind(), ErrorKind::FailedJob);
        assert_eq!(err.product(), Some("foo"));
        assert_eq!(err.details(), ["bad geometry on row 3".to_string()]);
        assert_eq!(fake.count(|call| matches!(call, Call::CopyStatus(_))), 2);
    }

    #[test]
    fn zero_timeout_raises_wait_timeout() {
        let fake = Arc::new(FakeVector::default());
        fake.script_copy([status("RUNNING"), status("RUNNING"), status("RUNNING")]);

        let mut job = CopyJob::new(fake.clone(), "foo").expect("job");
        let err = job
            .wait_for_completion(Some(Duration::ZERO))
            .expect_err("timeout");

        assert_eq!(err.kind(), ErrorKind::WaitTimeout);
        assert_eq!(err.product(), Some("foo"));
        assert_eq!(fake.count(|call| matches!(call, Call::CopyStatus(_))), 2);
    }

    #[test]
    fn unknown_states_keep_polling() {
        let fake = Arc::new(FakeVector::default());
        fake.script_delete([status("PENDING"), status("QUEUED"), status("SUCCESS")]);

        let mut job = DeleteJob::new(fake.clone(), "foo")
            .expect("job")
            .with_poll_interval(Duration::from_millis(1));
        job.wait_for_completion(Some(Duration::from_secs(5)))
            .expect("done");

        assert_eq!(fake.count(|call| matches!(call, Call::DeleteStatus(_))), 3);
        assert_eq!(job.product_id(), "foo");
    }

    #[test]
    fn construction_errors_propagate() {
        let fake = Arc::new(FakeVector::default());
        let err = match DeleteJob::new(fake, "missing") {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
