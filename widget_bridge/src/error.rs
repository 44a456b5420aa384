use crate::session::SessionState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("{operation} rejected: session is {state}")]
    NotReady {
        operation: &'static str,
        state: SessionState,
    },

    #[error("widget failed to initialize: {message}")]
    Initialization { message: String },

    #[error("widget failed to apply css: {error}")]
    ThemeApplication { error: String },

    #[error("widget failed to load sounds: {error}")]
    SoundsApplication { error: String },

    #[error("no launch target is set for this session")]
    MissingLaunchTarget,

    #[error("invalid css command: {0}")]
    InvalidCss(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to fetch {data_type} data: {message}")]
    UserData { data_type: String, message: String },

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
