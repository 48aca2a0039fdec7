//! Error types for Scorecast

use thiserror::Error;

/// Result type alias using ScorecastError
pub type Result<T> = std::result::Result<T, ScorecastError>;

/// Main error type for Scorecast operations
#[derive(Debug, Error)]
pub enum ScorecastError {
    /// Output container or track could not be created
    #[error("Container error: {0}")]
    Container(String),

    /// Encoder error
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Decoder / demuxer error
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Offline compositing error
    #[error("Compositor error: {0}")]
    Compositor(String),

    /// Timeline file error
    #[error("Timeline error: {0}")]
    Timeline(String),

    /// Recording session not active
    #[error("No active recording session")]
    NoActiveSession,

    /// Session already running
    #[error("Recording session already running")]
    SessionAlreadyRunning,

    /// The processing context has shut down
    #[error("Frame processing context is gone")]
    ProcessingClosed,

    /// Unsupported operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ScorecastError>,
    },
}

impl ScorecastError {
    /// Create a container error
    pub fn container(msg: impl Into<String>) -> Self {
        Self::Container(msg.into())
    }

    /// Create an encoder error
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Create a decoder error
    pub fn decoder(msg: impl Into<String>) -> Self {
        Self::Decoder(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a compositor error
    pub fn compositor(msg: impl Into<String>) -> Self {
        Self::Compositor(msg.into())
    }

    /// Create a timeline error
    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &ScorecastError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error ends a recording session outright.
    ///
    /// Only configuration-time and finalize-time failures qualify; anything
    /// raised for a single frame is recoverable.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self.root(),
            Self::Container(_) | Self::Config(_) | Self::Io(_) | Self::ProcessingClosed
        )
    }

    /// Actionable hint for the user, if there is one
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::Container(_) => Some(
                "Check that the output directory exists and is writable, and that there is free disk space",
            ),
            Self::Encoder(_) | Self::Decoder(_) => {
                Some("Make sure FFmpeg is installed with libx264 and AAC support")
            }
            Self::Config(_) => {
                Some("Check ~/.config/scorecast/config.toml or run `scorecast config init`")
            }
            Self::Timeline(_) => Some("The timeline file must be JSON written by Scorecast"),
            Self::Unsupported(_) => {
                Some("Rebuild with `--features ffmpeg` to enable real recording and compositing")
            }
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for ScorecastError {
    fn from(err: ffmpeg_next::Error) -> Self {
        Self::Encoder(err.to_string())
    }
}
