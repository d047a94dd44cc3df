use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostBoxError>;

#[derive(Error, Debug)]
pub enum HostBoxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Process time exceeded")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Command error: {0}")]
    Command(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("{}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostBoxError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Path {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "Config",
            Self::Authentication(_) => "Authentication",
            Self::NotFound(_) => "NotFound",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::Timeout(_) => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::Command(_) => "Command",
            Self::Session(_) => "Session",
            Self::Path { .. } => "Path",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
            Self::Toml(_) => "Toml",
            Self::Internal(_) => "Internal",
        }
    }

    /// Diagnostic text for the `additionalInformation` field of an exception
    /// envelope: the error kind followed by its source chain.
    pub fn detail(&self) -> String {
        let mut detail = format!("{}: {}", self.kind(), self);
        if let Self::Timeout(limit) = self {
            detail.push_str(&format!(" (limit {} ms)", limit.as_millis()));
        }
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            detail.push_str("\ncaused by: ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        detail
    }
}
