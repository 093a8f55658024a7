//! Error types for flightguard.
//!
//! Only setup and tooling paths return these. The realtime loops never
//! surface an error: lock timeouts, short sensor reads and missing position
//! fixes are expected outcomes handled in place.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for flightguard operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Model Errors ===
    /// The classifier model could not be loaded.
    #[error("failed to load model from {path}: {message}")]
    ModelLoad {
        /// Path to the model artifact.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// The model does not have the required input/output shape.
    #[error("model shape mismatch: {message}")]
    ModelShape {
        /// Description of the mismatch.
        message: String,
    },

    /// A prediction produced unusable output.
    #[error("inference failed: {0}")]
    Inference(String),

    // === Storage Errors ===
    /// Failed to open or create the flight log database.
    #[error("failed to open flight log at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Device Errors ===
    /// An I2C transfer failed.
    #[error("bus error at device {address:#04x}: {message}")]
    Bus {
        /// Device address on the bus.
        address: u8,
        /// Description of what went wrong.
        message: String,
    },

    /// A sensor device node could not be opened or read.
    #[error("device {path}: {message}")]
    Device {
        /// Path to the device node or attribute file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// File system or stream operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for flightguard operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a model load error.
    #[must_use]
    pub fn model_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a model shape error.
    #[must_use]
    pub fn model_shape(message: impl Into<String>) -> Self {
        Self::ModelShape {
            message: message.into(),
        }
    }

    /// Create an inference error.
    #[must_use]
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Create a bus error for the device at `address`.
    #[must_use]
    pub fn bus(address: u8, message: impl Into<String>) -> Self {
        Self::Bus {
            address,
            message: message.into(),
        }
    }

    /// Create a device error for the node at `path`.
    #[must_use]
    pub fn device(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Device {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error came from the classifier model.
    #[must_use]
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            Self::ModelLoad { .. } | Self::ModelShape { .. } | Self::Inference(_)
        )
    }
}
