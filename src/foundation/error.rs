use std::fmt;

/// Convenience result alias used throughout the crate.
pub type GridmojiResult<T> = Result<T, GridmojiError>;

/// Coarse error category callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid grid/method/quality/config. Caller's fault, never retried.
    Configuration,
    /// Degenerate or undersized media relative to the requested grid.
    Dimension,
    /// Decode/resample failure or resource exhaustion.
    Processing,
    /// Job deadline exceeded.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Dimension => "dimension",
            Self::Processing => "processing",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Top-level error type for the tiling pipeline.
#[derive(thiserror::Error, Debug)]
pub enum GridmojiError {
    /// Invalid request or pipeline configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Media too small or degenerate for the requested grid.
    #[error("dimension error: {0} (try a smaller grid)")]
    Dimension(String),

    /// Decode, resample, or encode failure.
    #[error("processing error: {0}")]
    Processing(String),

    /// The job deadline passed while `stage` was active.
    #[error("timeout error: deadline exceeded during {stage} after {elapsed_ms}ms")]
    Timeout {
        /// Stage that was active (or about to be entered) when the deadline was observed.
        stage: String,
        /// Milliseconds elapsed since the job started.
        elapsed_ms: u64,
    },

    /// Contextual I/O or third-party failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GridmojiError {
    /// Build a [`GridmojiError::Configuration`].
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`GridmojiError::Dimension`].
    pub fn dimension(msg: impl Into<String>) -> Self {
        Self::Dimension(msg.into())
    }

    /// Build a [`GridmojiError::Processing`].
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    /// Build a [`GridmojiError::Timeout`].
    pub fn timeout(stage: impl fmt::Display, elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            stage: stage.to_string(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Category of this error. [`GridmojiError::Other`] counts as processing.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Dimension(_) => ErrorKind::Dimension,
            Self::Processing(_) | Self::Other(_) => ErrorKind::Processing,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether a caller may retry once with a reduced quality level.
    pub fn is_retryable_with_lower_quality(&self) -> bool {
        self.kind() == ErrorKind::Processing
    }

    /// Copy of this error for delivery to other waiters of a shared computation.
    ///
    /// `Other` loses its source chain and becomes `Processing` with the rendered chain as message.
    pub(crate) fn share(&self) -> Self {
        match self {
            Self::Configuration(m) => Self::Configuration(m.clone()),
            Self::Dimension(m) => Self::Dimension(m.clone()),
            Self::Processing(m) => Self::Processing(m.clone()),
            Self::Timeout { stage, elapsed_ms } => Self::Timeout {
                stage: stage.clone(),
                elapsed_ms: *elapsed_ms,
            },
            Self::Other(e) => Self::Processing(format!("{e:#}")),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
