//! Error types for the AWS backends.

use sitepush_cdn::CdnError;
use sitepush_storage::StorageError;
use thiserror::Error;

/// Error codes AWS services return for conditions worth retrying.
const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "RequestTimeout",
    "ServiceUnavailable",
    "SlowDown",
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
];

/// Errors specific to the AWS SDK clients.
#[derive(Error, Debug)]
pub enum AwsError {
    /// AWS SDK error.
    #[error("AWS {service} error: {message}")]
    SdkError {
        service: &'static str,
        code: Option<String>,
        message: String,
        retryable: bool,
    },

    /// A request could not be assembled.
    #[error("Invalid request: {0}")]
    RequestBuild(String),
}

impl AwsError {
    pub(crate) fn sdk(
        service: &'static str,
        code: Option<&str>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        AwsError::SdkError {
            service,
            code: code.map(str::to_string),
            message: message.into(),
            retryable: retryable || code.map(is_transient_code).unwrap_or(false),
        }
    }
}

/// True for service error codes that indicate a transient condition.
pub(crate) fn is_transient_code(code: &str) -> bool {
    TRANSIENT_CODES.contains(&code)
}

impl From<AwsError> for StorageError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::SdkError {
                message, retryable, ..
            } => StorageError::NetworkError { message, retryable },
            AwsError::RequestBuild(message) => StorageError::Other { message },
        }
    }
}

impl From<AwsError> for CdnError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::SdkError {
                message,
                retryable: true,
                ..
            } => CdnError::NetworkError {
                message,
                retryable: true,
            },
            AwsError::SdkError { message, .. } => CdnError::Rejected { message },
            AwsError::RequestBuild(message) => CdnError::Rejected { message },
        }
    }
}
