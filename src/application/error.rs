use std::error::Error as StdError;

use thiserror::Error;

use crate::{cache::FetchError, config::LoadError, infra::error::InfraError};

/// Flattened error chain for reporting through tracing.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    /// `outer: inner: innermost`
    pub fn chain(&self) -> String {
        self.messages.join(": ")
    }
}

/// Failure reported by a write collaborator. Logged, never shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server rejected the write with status {status}")]
    Rejected { status: u16 },
}

impl WriteError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Why `submit` did not write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("a submission is already in progress")]
    AlreadyInProgress,
    #[error("nothing to submit")]
    EmptyDraft,
    #[error("sign-in required")]
    Unauthenticated,
    #[error("write failed")]
    WriteFailed(#[source] WriteError),
}

impl SubmissionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionError::AlreadyInProgress => "already_in_progress",
            SubmissionError::EmptyDraft => "empty_draft",
            SubmissionError::Unauthenticated => "unauthenticated",
            SubmissionError::WriteFailed(_) => "write_failed",
        }
    }
}

/// Why `set_draft` refused the new text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("draft is {actual} characters long, the limit is {max}")]
    TooLong { max: usize, actual: usize },
    #[error("draft cannot change while a submission is in progress")]
    Busy,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error("failed to load `{key}`")]
    Fetch {
        key: String,
        #[source]
        source: FetchError,
    },
    #[error("`{key}` not found")]
    NotFound { key: String },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    /// A failed load; a 404 becomes [`AppError::NotFound`].
    pub fn fetch(key: impl ToString, source: FetchError) -> Self {
        let key = key.to_string();
        match source {
            FetchError::Status { status: 404 } => Self::NotFound { key },
            source => Self::Fetch { key, source },
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Draft(_) => 2,
            AppError::Submission(SubmissionError::Unauthenticated) => 3,
            AppError::NotFound { .. } => 4,
            _ => 1,
        }
    }
}
