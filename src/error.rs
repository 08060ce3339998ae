//! Unified error type.

use thiserror::Error;

/// The error type returned by restify's fallible operations.
///
/// Request-level failures (`no_handler`, validation faults, handler faults)
/// are never `Error`s; they travel to the client as JSON envelopes. This type
/// surfaces startup and infrastructure failures: reading configuration,
/// compiling endpoint patterns, binding a port.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid endpoint pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid bind address `{0}`")]
    Address(String),

    #[error("no service registered under `{0}`")]
    UnknownService(String),
}
