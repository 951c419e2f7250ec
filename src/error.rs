// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Landmark provider failed: {0}")]
    Provider(String),

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("Command executor failed: {0}")]
    Executor(String),
}

pub type Result<T> = std::result::Result<T, Error>;
