use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::ProtocolError;

pub type Result<T> = std::result::Result<T, UrSecretError>;

#[derive(Debug, Error)]
pub enum UrSecretError {
    #[error("Cannot determine user:port for ssh access to {0}")]
    NoWorkingEndpoint(String),

    #[error("Cannot determine supported key type on {0}")]
    KeyTypeUnknown(String),

    #[error("key for {marker} found on {remote}: will not replace")]
    EntryExists { remote: String, marker: String },

    #[error("Will not overwrite existing key in {}", .0.display())]
    KeyExists(PathBuf),

    #[error("No ursecret key in {}: run --install first", .0.display())]
    KeyNotFound(PathBuf),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Cannot ssh to {principal}@{host}:{port}: {message}")]
    Transport {
        host: String,
        principal: String,
        port: u16,
        message: String,
    },

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("Could not get secret")]
    CouldNotGetSecret { remote: Vec<String> },

    #[error("Remote handler rejected the request (exit status {0})")]
    RemoteRejected(u32),

    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
