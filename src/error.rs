use std::fmt;

use futures::channel::{mpsc, oneshot};
use thiserror::Error;

use scriptoxide_types::SerializedError;

pub type Result<T, E = IpcError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum IpcError {
    /// The other side answered the call with an error
    #[error("{0}")]
    Remote(#[from] RemoteError),
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Send(#[from] mpsc::SendError),
    /// The handler was dropped before a response arrived
    #[error("{0}")]
    ChannelClosed(#[from] oneshot::Canceled),
}

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("{0}")]
    Pattern(#[from] PatternError),
    #[error("{0}")]
    Script(#[from] ScriptError),
    #[error("No isolated world ids left after allocating {allocated} worlds")]
    WorldsExhausted { allocated: usize },
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl InjectError {
    /// The form this error is reported in to the host
    pub fn to_serialized(&self) -> SerializedError {
        match self {
            InjectError::Script(err) => err.clone().into(),
            err => SerializedError::new(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Empty match pattern")]
    Empty,
    #[error("Match pattern `{pattern}` failed to compile: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// The underlying message channel failed to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Transport failed: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        TransportError(msg.into())
    }
}

/// Implements the shared parts of the error types that mirror
/// [`SerializedError`] on either side of the process boundary.
macro_rules! structured_error {
    ($name:ident) => {
        impl $name {
            pub fn new(message: impl Into<String>) -> Self {
                Self {
                    message: message.into(),
                    name: None,
                    stack: None,
                }
            }

            pub fn with_name(mut self, name: impl Into<String>) -> Self {
                self.name = Some(name.into());
                self
            }

            pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
                self.stack = Some(stack.into());
                self
            }

            pub fn message(&self) -> &str {
                &self.message
            }

            /// The kind discriminator, like `TypeError`
            pub fn name(&self) -> Option<&str> {
                self.name.as_deref()
            }

            pub fn stack(&self) -> Option<&str> {
                self.stack.as_deref()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if let Some(ref name) = self.name {
                    write!(f, "{}: {}", name, self.message)
                } else {
                    f.write_str(&self.message)
                }
            }
        }

        impl std::error::Error for $name {}

        impl From<SerializedError> for $name {
            fn from(err: SerializedError) -> Self {
                Self {
                    message: err.message,
                    name: err.name,
                    stack: err.stack,
                }
            }
        }

        impl From<$name> for SerializedError {
            fn from(err: $name) -> Self {
                SerializedError {
                    message: err.message,
                    name: err.name,
                    stack: err.stack,
                }
            }
        }
    };
}

/// An error reconstructed from the error slot of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    message: String,
    name: Option<String>,
    stack: Option<String>,
}

structured_error!(RemoteError);

/// The error a call handler fails with. It is serialized into the reply and
/// never raised on the handling side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
    name: Option<String>,
    stack: Option<String>,
}

structured_error!(HandlerError);

impl From<RemoteError> for HandlerError {
    fn from(err: RemoteError) -> Self {
        SerializedError::from(err).into()
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::new(err.to_string()).with_name("TypeError")
    }
}

/// An exception thrown by code running inside an isolated world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    message: String,
    name: Option<String>,
    stack: Option<String>,
}

structured_error!(ScriptError);
