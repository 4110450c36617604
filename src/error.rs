//! Error taxonomy for the runtime
//!
//! Misuse errors (bad configuration, unknown slide names) surface at the call
//! site; protocol errors (a reply for a token we never minted) indicate the
//! host and sandbox have desynchronized and are not retried.

use thiserror::Error;

use crate::bridge::CallbackToken;

/// Errors raised by the runtime
#[derive(Debug, Error)]
pub enum StageError {
    /// Navigation target does not exist in the slide registry
    #[error("unknown slide id {0:?}")]
    UnknownSlide(String),

    /// Inbound reply references a callback token this bridge never minted
    #[error("inbound message references unregistered callback token {0}")]
    UnknownToken(CallbackToken),

    /// Inbound message did not match any of the known wire shapes
    #[error("malformed inbound message: {0}")]
    MalformedMessage(String),

    /// Media proxy constructed without a source location
    #[error("media source is empty")]
    EmptyMediaSource,

    /// A load-completion notification arrived twice for the same tracked item
    #[error("duplicate load completion for {0:?}")]
    DuplicateLoad(String),

    /// Slide registry file could not be read
    #[error("failed to read slide file: {0}")]
    Io(#[from] std::io::Error),

    /// Slide registry file could not be parsed
    #[error("failed to parse slide configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, StageError>;
