use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    InvalidQuery,
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    RateLimit,
    GatewayTimeout,
    Server,
    Io,
    FailedJob,
    WaitTimeout,
    NotReady,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    status: Option<u16>,
    product: Option<String>,
    job: Option<String>,
    details: Vec<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            status: None,
            product: None,
            job: None,
            details: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// HTTP status of the response that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    pub fn job(&self) -> Option<&str> {
        self.job.as_deref()
    }

    /// Server-reported error strings (failed jobs carry one per failure).
    pub fn details(&self) -> &[String] {
        &self.details
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        if let Some(product) = &self.product {
            write!(f, " (product: {product})")?;
        }
        if let Some(job) = &self.job {
            write!(f, " (job: {job})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Conflict => 4,
        ErrorKind::RateLimit => 5,
        ErrorKind::Unauthorized => 6,
        ErrorKind::BadRequest => 7,
        ErrorKind::Io => 8,
        ErrorKind::InvalidQuery => 9,
        ErrorKind::GatewayTimeout => 10,
        ErrorKind::Server => 11,
        ErrorKind::FailedJob => 12,
        ErrorKind::WaitTimeout => 13,
        ErrorKind::NotReady => 14,
    }
}

/// Maps an HTTP status outside the 2xx/3xx range to an error kind.
pub fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::BadRequest,
        401 | 403 => ErrorKind::Unauthorized,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        429 => ErrorKind::RateLimit,
        504 => ErrorKind::GatewayTimeout,
        _ => ErrorKind::Server,
    }
}
