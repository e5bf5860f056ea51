use thiserror::Error;

use crate::core::types::CreatureKind;

#[derive(Error, Debug)]
pub enum CavernError {
    #[error("Cavern grid is not available yet")]
    GridUnavailable,

    #[error("Unknown creature kind: {0}")]
    UnknownCreature(CreatureKind),

    #[error("Failed to spawn {kind}: {reason}")]
    SpawnFailed { kind: CreatureKind, reason: String },

    #[error("Environment service error: {0}")]
    Service(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CavernError>;
