//! Error taxonomy shared between the gateway and backend.
//!
//! The gateway only ever surfaces one of the three-digit codes below to the
//! end client; everything else (protocol parse failures, transport drops)
//! closes the connection instead of replying.

use thiserror::Error;

/// Error codes that appear in an `ERRR~<code>` reply frame.
pub mod code {
    pub const UNKNOWN: &str = "001";
    pub const NOT_AUTHENTICATED: &str = "101";
    pub const BAD_CREDENTIALS: &str = "102";
    pub const NOT_FOUND: &str = "201";
    pub const EXECUTION_TIMEOUT: &str = "202";
    pub const NAME_COLLISION: &str = "301";
    pub const STORAGE_UPDATE_FAILED: &str = "302";
}

/// Failures that originate in the authentication path (§4.A / §7).
///
/// Per DESIGN NOTES open question 3, both "no such user" and "wrong
/// password" must present the same surface to the client; callers should
/// map every variant here to [`code::NOT_AUTHENTICATED`] or
/// [`code::BAD_CREDENTIALS`] without branching on which happened.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session is not authenticated")]
    NotAuthenticated,
    #[error("invalid email or password")]
    BadCredentials,
    #[error("email already registered")]
    AlreadyRegistered,
}

/// Failures from the per-user virtual filesystem (§4.G).
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("path escapes the user's tree or is otherwise invalid: {0}")]
    InvalidPath(String),
    #[error("no such file or folder: {0}")]
    NotFound(String),
    #[error("a node named {0:?} already exists")]
    NameCollision(String),
    #[error("failed to persist tree update")]
    PersistFailed,
}

impl TreeError {
    pub fn client_code(&self) -> &'static str {
        match self {
            TreeError::InvalidPath(_) | TreeError::NotFound(_) => code::NOT_FOUND,
            TreeError::NameCollision(_) => code::NAME_COLLISION,
            TreeError::PersistFailed => code::STORAGE_UPDATE_FAILED,
        }
    }
}

/// Failures reported by the backend RPC envelope (§4.D, §4.F).
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("backend transport failed: {0}")]
    Transport(String),
    #[error("remote error ({error_type}): {message}")]
    Remote { error_type: String, message: String },
}

impl RpcError {
    pub fn client_code(&self) -> &'static str {
        code::UNKNOWN
    }
}
