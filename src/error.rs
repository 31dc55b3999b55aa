//! Error types and result handling for cdc-dispatch.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use cdc_dispatch::{Error, Result};
//!
//! fn decode_batch() -> Result<()> {
//!     // Simulating a malformed batch
//!     Err(Error::Decode {
//!         message: "truncated entry frame".to_string(),
//!     })
//! }
//!
//! match decode_batch() {
//!     Ok(()) => println!("Decoded"),
//!     Err(Error::Decode { message }) => eprintln!("Decode error: {}", message),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for cdc-dispatch operations.
///
/// Every failure raised while dispatching a batch (decoding,
/// serialization, or delivery) is represented here and funnels into a
/// single rollback decision for the owning batch.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, typically from an invalid config file or
    /// environment override.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed batch payload that cannot be decoded into row-change
    /// records. Fatal for the batch.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of what was malformed
        message: String,
    },

    /// JSON serialization error when encoding flattened messages.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// I/O error, typically from reading batches off stdin.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A dispatch worker task failed to join (panicked or was aborted).
    #[error("Worker task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A convenient Result type alias for cdc-dispatch operations.
///
/// This is equivalent to `std::result::Result<T, cdc_dispatch::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
