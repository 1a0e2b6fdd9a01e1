// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AcoustidError>;

#[derive(Debug, Error)]
pub enum AcoustidError {
    /// The audio could not be decoded or fingerprinted.
    #[error("Fingerprint generation failed: {0}")]
    FingerprintGeneration(String),

    /// Neither libchromaprint nor the `fpcalc` tool is available.
    #[error("No fingerprinting backend available: {0}")]
    NoBackend(String),

    /// Submission data is missing required fields.
    #[error("Invalid fingerprint submission: {0}")]
    FingerprintSubmission(String),

    #[error("AcoustID web service error: {0}")]
    WebService(#[from] WebServiceError),
}

impl AcoustidError {
    /// True for every failure to produce a fingerprint, including a missing backend.
    pub fn is_fingerprint_generation(&self) -> bool {
        matches!(
            self,
            AcoustidError::FingerprintGeneration(_) | AcoustidError::NoBackend(_)
        )
    }

    /// Service-defined error code, when the web service reported one.
    pub fn service_code(&self) -> Option<i64> {
        match self {
            AcoustidError::WebService(err) => err.code,
            _ => None,
        }
    }
}

/// A failed request/response cycle with the web service.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", describe(.code, .message))]
pub struct WebServiceError {
    pub message: String,
    /// Code from the service's `error` object, if it sent one.
    pub code: Option<i64>,
}

fn describe(code: &Option<i64>, message: &str) -> String {
    match code {
        Some(code) => format!("error {}: {}", code, message),
        None => message.to_string(),
    }
}

impl WebServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl From<reqwest::Error> for AcoustidError {
    fn from(err: reqwest::Error) -> Self {
        WebServiceError::new(format!("HTTP request failed: {}", err)).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_service_error_display() {
        let plain = WebServiceError::new("response is not valid JSON");
        assert_eq!(plain.to_string(), "response is not valid JSON");

        let coded = WebServiceError::with_code(4, "invalid API key");
        assert_eq!(coded.to_string(), "error 4: invalid API key");
    }

    #[test]
    fn test_no_backend_is_generation_error() {
        let err = AcoustidError::NoBackend("fpcalc not found".to_string());
        assert!(err.is_fingerprint_generation());

        let err = AcoustidError::FingerprintSubmission("missing duration".to_string());
        assert!(!err.is_fingerprint_generation());
    }

    #[test]
    fn test_service_code() {
        let err: AcoustidError = WebServiceError::with_code(3, "invalid fingerprint").into();
        assert_eq!(err.service_code(), Some(3));
        assert!(err.to_string().contains("invalid fingerprint"));
    }
}
