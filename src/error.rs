//! Error taxonomy for the collection and drafting pipeline.
//!
//! Each failure domain gets its own enum so callers can match on exactly the
//! cases they are able to degrade around: a collector that fails keeps the
//! rest of the run alive, a country whose draft call fails keeps its
//! neighbours' artifacts intact, and only configuration errors abort the
//! process before the first network call.

use thiserror::Error;

/// Failure of a single HTTP fetch, after any retry policy has given up.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS, timeout, or body-read failure from the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The run deadline passed before this fetch was issued.
    #[error("run deadline passed; fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether a retry has any chance of succeeding.
    ///
    /// Timeouts, connect failures, 429 and 5xx responses are transient.
    /// Everything else (4xx, cancellation, malformed requests) is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(e) => e.is_timeout() || e.is_connect(),
            FetchError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            FetchError::Cancelled => false,
        }
    }
}

/// An item had no usable publish date after the secondary-fetch ladder ran
/// out. The item is discarded rather than guessed at.
#[derive(Debug, Error)]
#[error("no publish date found for {url}")]
pub struct DateResolutionFailure {
    pub url: String,
}

/// Failure of a single drafting call against the OpenAI-compatible API.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status from the API, with a truncated body for the log.
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    /// The reply arrived but could not be parsed into the expected shape.
    #[error("malformed reply: {detail} (preview: {preview})")]
    Malformed { detail: String, preview: String },

    /// The API answered with no choices or an empty message.
    #[error("empty reply from model")]
    Empty,
}

impl CollaboratorError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CollaboratorError::Transport(e) => e.is_timeout() || e.is_connect(),
            CollaboratorError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            CollaboratorError::Malformed { .. } | CollaboratorError::Empty => false,
        }
    }
}

/// Invalid or missing configuration. Raised before any fetch is issued.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("countries file {path}: {source}")]
    CountriesFile {
        path: String,
        source: std::io::Error,
    },

    #[error("params file {path}: {detail}")]
    ParamsFile { path: String, detail: String },
}

/// Top-level failure of a phase driver. Per-country and per-source errors are
/// degraded into index rows instead of surfacing here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] FetchError),

    #[error("completion client setup failed: {0}")]
    Collaborator(#[from] CollaboratorError),
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }
}
