//! Backend-local error types. Everything that must cross into the RPC
//! envelope goes through [`crate::server::dispatch`], which maps these
//! (and `codebox_protocol::errors::{AuthError, TreeError}`) onto
//! `codebox_protocol::rpc::Response::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("no user found with email {0:?}")]
    UserNotFound(String),
    #[error("no stored file structure for user {0}")]
    NoFileStruct(u64),
    #[error("failed to encode file structure: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode file structure: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
