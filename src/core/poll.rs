//! Purpose: Bounded client-side poll loop for asynchronous server jobs.
//! Exports: `PollOptions`, `wait_until`, `DEFAULT_POLL_INTERVAL`.
//! Role: Shared wait state machine behind copy/delete jobs and upload tasks.
//! Invariants: The check runs before every deadline test, so a zero timeout still polls once.
//! Invariants: No retries, no backoff; errors from the check propagate immediately.
use super::error::{Error, ErrorKind};
use std::thread::sleep;
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl PollOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// Calls `check` until it reports a terminal state, sleeping `interval` between calls.
pub fn wait_until<F>(mut check: F, options: PollOptions) -> Result<(), Error>
where
    F: FnMut() -> Result<bool, Error>,
{
    let started = Instant::now();
    loop {
        if check()? {
            return Ok(());
        }
        if let Some(timeout) = options.timeout {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                tracing::warn!(?elapsed, ?timeout, "wait timed out");
                return Err(Error::new(ErrorKind::WaitTimeout)
                    .with_message(format!(
                        "still not complete after {:.1}s",
                        elapsed.as_secs_f64()
                    ))
                    .with_hint("Call wait again with a longer timeout, or none."));
            }
        }
        sleep(options.interval);
    }
}
