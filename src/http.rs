// Shared ureq plumbing for the model clients

use std::time::Duration;

use crate::RagError;

pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Whether a failed request is worth repeating
pub(crate) fn is_retryable(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

/// Map a transport failure onto the crate's model error kinds
pub(crate) fn model_error(error: &ureq::Error, what: &str) -> RagError {
    match error {
        ureq::Error::Timeout(timeout) => {
            RagError::ModelTimeout(format!("{what} timed out ({timeout:?})"))
        }
        ureq::Error::StatusCode(status @ (401 | 403)) => RagError::ModelInvocation(format!(
            "{what} was rejected with HTTP {status}; check the API key"
        )),
        ureq::Error::StatusCode(status) => {
            RagError::ModelInvocation(format!("{what} failed with HTTP {status}"))
        }
        other => RagError::ModelInvocation(format!("{what} failed: {other}")),
    }
}
