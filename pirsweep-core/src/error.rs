//! Error types.

use std::io;
use std::num::ParseIntError;

use crate::rate::Rate;

pub type Result<T> = core::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(String),

    #[error("toml deserialization error: {0}")]
    TomlDeserError(#[from] toml::de::Error),

    #[error("failed parsing rate: {0}")]
    ParseRateError(String),
    #[error("failed parsing int: {0}")]
    ParseIntError(#[from] ParseIntError),

    #[error("invalid sweep: {0}")]
    InvalidSweep(String),
    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    #[error("invalid routing table: {0}")]
    InvalidRoutingTable(String),

    #[error("simulator run failed for pir = {0}: {1}")]
    SimulatorFailed(Rate, String),
    #[error("interrupted while running simulator for pir = {0}")]
    Interrupted(Rate),

    #[error("other error: {0}")]
    Other(String),
}
