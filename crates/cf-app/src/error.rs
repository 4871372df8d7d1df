use std::fmt;

use cf_core::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from submitting, querying, or tracking a job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String, body: String },

    #[error("request rejected: {0}")]
    Rejected(RemoteFailure),

    /// Non-2xx reply without a structured error body.
    #[error("service returned HTTP {status}")]
    HttpStatus { status: u16, body: String },

    #[error("history store: {0}")]
    Store(#[from] StoreError),

    #[error("no job with id '{0}' in history")]
    NotFound(String),

    #[error("invalid service URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] surrealdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error codes the service documents, each with a known remedy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    /// `InvalidParameter.DataInspection`: media download timed out.
    DataInspectionTimeout,
    /// `IPInfringementSuspect`
    IpInfringementSuspect,
    /// `DataInspectionFailed`: sensitive content.
    SensitiveContent,
    /// `InternalError`
    ServiceInternal,
    Unrecognized,
}

impl RemoteErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "InvalidParameter.DataInspection" => Self::DataInspectionTimeout,
            "IPInfringementSuspect" => Self::IpInfringementSuspect,
            "DataInspectionFailed" => Self::SensitiveContent,
            "InternalError" => Self::ServiceInternal,
            _ => Self::Unrecognized,
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::DataInspectionTimeout => Some(
                "The service could not download the input image. Make sure the URL is directly \
                 accessible; links that need a login, such as Google Drive or Dropbox shares, \
                 are not supported.",
            ),
            Self::IpInfringementSuspect => Some(
                "The prompt or image is suspected of infringing intellectual property. \
                 Revise the input.",
            ),
            Self::SensitiveContent => Some(
                "The prompt or image may contain sensitive content. Revise the input.",
            ),
            Self::ServiceInternal => Some("The service hit an internal error. Try submitting again."),
            Self::Unrecognized => None,
        }
    }
}

/// Structured error reported by the service, either on submission or as a task failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub kind: RemoteErrorKind,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl RemoteFailure {
    pub fn classify(code: Option<String>, message: Option<String>) -> Self {
        let code = code.filter(|c| !c.trim().is_empty());
        let message = message.filter(|m| !m.trim().is_empty());
        let kind = code
            .as_deref()
            .map(RemoteErrorKind::from_code)
            .unwrap_or(RemoteErrorKind::Unrecognized);
        Self { kind, code, message }
    }

    /// What to tell the user: the remedy for known codes, the raw code and message otherwise.
    pub fn actionable_message(&self) -> String {
        if let Some(hint) = self.kind.hint() {
            return hint.to_string();
        }
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.actionable_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_remedies() {
        let failure = RemoteFailure::classify(
            Some("IPInfringementSuspect".into()),
            Some("Input data is suspected of being involved in IP infringement.".into()),
        );
        assert_eq!(failure.kind, RemoteErrorKind::IpInfringementSuspect);
        assert_eq!(
            failure.actionable_message(),
            RemoteErrorKind::IpInfringementSuspect.hint().unwrap()
        );

        assert_eq!(
            RemoteErrorKind::from_code("InvalidParameter.DataInspection"),
            RemoteErrorKind::DataInspectionTimeout
        );
        assert_eq!(
            RemoteErrorKind::from_code("DataInspectionFailed"),
            RemoteErrorKind::SensitiveContent
        );
    }

    #[test]
    fn unknown_codes_surface_raw_text() {
        let failure = RemoteFailure::classify(
            Some("Throttling.RateQuota".into()),
            Some("Requests rate limit exceeded".into()),
        );
        assert_eq!(failure.kind, RemoteErrorKind::Unrecognized);
        assert_eq!(
            failure.actionable_message(),
            "Throttling.RateQuota: Requests rate limit exceeded"
        );

        let empty = RemoteFailure::classify(Some(" ".into()), None);
        assert_eq!(empty.code, None);
        assert_eq!(empty.actionable_message(), "unknown error");
    }
}
