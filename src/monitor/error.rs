// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("transport not connected")]
    NotConnected,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("state store error: {0}")]
    StateStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown log format: {0}")]
    UnknownLogFormat(String),

    #[error("task failed: {0}")]
    Task(String),
}

impl Error {
    /// True for failures that mean the session is unusable and a reconnect is needed.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::ConnectTimeout(_) | Error::NotConnected
        )
    }

    /// Authentication failures stay failed until the connection is reconfigured.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Authentication(_) | Error::Config(_) | Error::UnknownLogFormat(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
