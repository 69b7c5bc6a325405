use thiserror::Error;

/// Unified error type shared by every integration crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The authentication endpoint refused to issue a token.
    #[error("auth error: {0}")]
    Auth(String),
    /// Network-level failure: connect, timeout, 5xx, unreadable body.
    #[error("transport error: {0}")]
    Transport(String),
    /// A well-formed response carrying a non-zero status code.
    #[error("remote api error ({context}) code={code}: {msg}")]
    RemoteApi {
        context: String,
        code: i64,
        msg: String,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("parsing error: {0}")]
    Parsing(String),
    #[error("store error: {0}")]
    Store(String),
}

impl BridgeError {
    /// Build a [`BridgeError::RemoteApi`] from an operation name and the
    /// `code`/`msg` pair reported by the platform.
    pub fn remote(context: impl Into<String>, code: i64, msg: impl Into<String>) -> Self {
        BridgeError::RemoteApi {
            context: context.into(),
            code,
            msg: msg.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }
}
