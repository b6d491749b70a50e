use thiserror::Error;

/// Errors returned by a metering sink for a single send attempt
#[derive(Debug, Error)]
pub enum SinkError {
    /// The service rejected the call with a structured error payload.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// The call never produced a service response.
    #[error("transport failure: {reason}")]
    Transport { reason: String },
}

impl SinkError {
    pub fn transport(reason: impl Into<String>) -> Self {
        SinkError::Transport {
            reason: reason.into(),
        }
    }
}
