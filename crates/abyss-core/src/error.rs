//! Error types for the abyss engine.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseEntityIdError {
    #[error("entity id must have 32 hex digits, got {0}")] InvalidLength(usize),
    #[error("entity id is not hex: {0}")] InvalidHex(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("backend: {0}")] Backend(String),
    #[error("corrupt record for {entity}: {reason}")] Corrupt { entity: String, reason: String },
    #[error("encode: {0}")] Encode(String),
    #[error("missing column family: {0}")] MissingColumnFamily(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("load: {0}")] Load(String),
    #[error("invalid value for {field}: {reason}")] InvalidValue { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum AbyssError {
    #[error(transparent)] Storage(#[from] StorageError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] EntityId(#[from] ParseEntityIdError),
    #[error("entity not tracked: {0}")] UnknownEntity(String),
}
