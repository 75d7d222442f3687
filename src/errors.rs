//! Error types for the studydesk application.
//!
//! This module defines custom error types that categorize different failures
//! that can occur while managing notes, check-ins, books and AI requests.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the studydesk application.
#[derive(Error, Debug)]
pub enum DeskError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to zip operations.
    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// Transport-level failures talking to the AI service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Note was not found when performing an operation.
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// Book was not found in the library.
    #[error("Book not found: {id}")]
    BookNotFound { id: String },

    /// Invalid record format or content.
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// for mutex lock acquisition issues
    #[error("{message}")]
    LockAcquisitionFailed { message: String },

    /// The clipboard could not be read.
    #[error("Clipboard unavailable: {message}")]
    ClipboardUnavailable { message: String },

    /// The AI service rejected or failed a request.
    #[error("AI gateway error: {message}")]
    GatewayError { message: String },

    /// A live audio session failed or was used after closing.
    #[error("Live session error: {message}")]
    SessionError { message: String },

    /// A long-running generation did not finish in time.
    #[error("Operation {name} did not complete after {attempts} polls")]
    OperationTimedOut { name: String, attempts: u32 },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}

impl DeskError {
    /// Short message suitable for showing inline to the user.
    ///
    /// Service and device failures collapse to a fixed status line; local
    /// errors keep their full description.
    pub fn user_message(&self) -> String {
        match self {
            DeskError::Http(_)
            | DeskError::GatewayError { .. }
            | DeskError::OperationTimedOut { .. } => "AI service unavailable".to_string(),
            DeskError::SessionError { .. } => "Live session unavailable".to_string(),
            DeskError::ClipboardUnavailable { .. } => "Clipboard unavailable".to_string(),
            other => other.to_string(),
        }
    }
}
