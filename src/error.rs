use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::{Handle, ObjectKind};

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while serving remote calls
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("invalid handle: {0}")]
    InvalidHandle(Handle),

    #[error("handle {handle} refers to a {found}, expected a {expected}")]
    WrongObjectKind {
        handle: Handle,
        expected: ObjectKind,
        found: ObjectKind,
    },

    #[error("engine did not answer within {0:?}")]
    EngineTimeout(Duration),

    #[error("engine task queue is no longer running")]
    EngineStopped,

    #[error("engine initialization failed: {0}")]
    EngineInit(String),

    #[error("engine rejected construction: {0}")]
    Construction(String),

    #[error("session is not negotiated, call connect first")]
    NotConnected,

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid parameters for {method}: {message}")]
    BadParams { method: String, message: String },

    #[error("invalid protocol: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    #[error("remote error [{}]: {}", .0.code, .0.message)]
    Remote(RemoteError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Stable tag sent to the client alongside the message
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::InvalidHandle(_) => ErrorCode::InvalidHandle,
            BridgeError::WrongObjectKind { .. } => ErrorCode::WrongObjectKind,
            BridgeError::EngineTimeout(_) => ErrorCode::EngineTimeout,
            BridgeError::EngineStopped => ErrorCode::EngineStopped,
            BridgeError::EngineInit(_) => ErrorCode::EngineInitFailure,
            BridgeError::Construction(_) => ErrorCode::ConstructionFailure,
            BridgeError::NotConnected => ErrorCode::NotConnected,
            BridgeError::UnknownMethod(_) => ErrorCode::UnknownMethod,
            BridgeError::BadParams { .. } | BridgeError::Deserialization(_) => ErrorCode::BadParams,
            BridgeError::Protocol(_) => ErrorCode::Protocol,
            BridgeError::Transport(_) => ErrorCode::TransportFailure,
            BridgeError::Remote(remote) => remote.code,
            BridgeError::Serialization(_) | BridgeError::Config(_) => ErrorCode::Internal,
        }
    }

    /// Convert into the form carried by an error reply
    pub fn to_remote(&self) -> RemoteError {
        match self {
            BridgeError::Remote(remote) => remote.clone(),
            other => RemoteError {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}

/// Error category as seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidHandle,
    WrongObjectKind,
    EngineTimeout,
    EngineStopped,
    EngineInitFailure,
    ConstructionFailure,
    NotConnected,
    UnknownMethod,
    BadParams,
    Protocol,
    TransportFailure,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Error payload of a failed reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_keeps_code() {
        let err = BridgeError::InvalidHandle(Handle::from_raw(0x0000_0002_0000_0001));
        let remote = err.to_remote();
        assert_eq!(remote.code, ErrorCode::InvalidHandle);
        assert!(remote.message.contains("invalid handle"));

        let wrapped = BridgeError::Remote(remote.clone());
        assert_eq!(wrapped.code(), ErrorCode::InvalidHandle);
        assert_eq!(wrapped.to_remote(), remote);
    }

    #[test]
    fn test_decode_failure_is_bad_params() {
        let err: BridgeError = rmp_serde::from_slice::<String>(&[0xc1])
            .unwrap_err()
            .into();
        assert_eq!(err.code(), ErrorCode::BadParams);
    }
}
