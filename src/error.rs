//! Error types shared by the poller, the ORM walkthrough and the web handler.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unknown column `{column}` on table `{table}`")]
    UnknownColumn { table: &'static str, column: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gave up after {0} consecutive failures")]
    RetriesExhausted(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
