//! Error kinds for the external collaborators.
//!
//! Plumbing (settings, credential files, document IO) uses `anyhow`; these
//! enums exist where the pipeline branches on the kind of failure.

/// Frame, gateway, or doorway event source failures.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("{source_id} unreachable: {reason}")]
    Unreachable { source_id: String, reason: String },

    #[error("{source_id} returned HTTP {status}")]
    HttpStatus { source_id: String, status: u16 },

    #[error("{source_id} image too small: {bytes} bytes")]
    ImageTooSmall { source_id: String, bytes: usize },

    #[error("{source_id} API error: {message}")]
    Api { source_id: String, message: String },

    #[error("failed to store capture: {reason}")]
    Storage { reason: String },
}

impl AcquisitionError {
    /// Storage failures are local and will not improve with a retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AcquisitionError::Storage { .. })
    }
}

/// Vision-model failures.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// HTTP or network failure; worth retrying.
    #[error("vision model unreachable: {reason}")]
    Transient { reason: String },

    /// The model answered but the response had an unexpected shape.
    #[error("malformed vision model response: {reason}")]
    Malformed { reason: String },
}

impl InferenceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, InferenceError::Transient { .. })
    }
}

/// Notification channel failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("notification channel unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("notification rejected with HTTP {status}")]
    Rejected { status: u16 },

    #[error("no notification channel configured")]
    NotConfigured,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_inference_errors_retry() {
        let transient = InferenceError::Transient {
            reason: "timeout".into(),
        };
        let malformed = InferenceError::Malformed {
            reason: "no candidates".into(),
        };
        assert!(transient.is_retryable());
        assert!(!malformed.is_retryable());
    }

    #[test]
    fn storage_failures_do_not_retry() {
        let storage = AcquisitionError::Storage {
            reason: "disk full".into(),
        };
        let http = AcquisitionError::HttpStatus {
            source_id: "bedroom".into(),
            status: 503,
        };
        assert!(!storage.is_retryable());
        assert!(http.is_retryable());
        assert_eq!(http.to_string(), "bedroom returned HTTP 503");
    }
}
