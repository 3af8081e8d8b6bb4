use thiserror::Error;

use crate::target::EntityType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Counter catalog unavailable for partition {partition}: {reason}")]
    CatalogUnavailable { partition: String, reason: String },

    #[error("Failed to enumerate {entity_type} instances in partition {partition}: {reason}")]
    EnumerationFailed {
        partition: String,
        entity_type: EntityType,
        reason: String,
    },

    #[error("Failed to fetch {entity_type} summaries in partition {partition}: {reason}")]
    FetchFailed {
        partition: String,
        entity_type: EntityType,
        reason: String,
    },

    #[error("Performance query failed for {entity_type} [{instance}]: {reason}")]
    QueryFailed {
        entity_type: EntityType,
        instance: String,
        reason: String,
    },

    #[error("Unable to find counter ID for [{counter}] of {entity_type}")]
    UnresolvedCounter {
        counter: String,
        entity_type: EntityType,
    },

    #[error("Unrecognized series type {0}")]
    UnrecognizedSeriesType(String),

    #[error("Unrecognized value for [{key}]: {reason}")]
    UnrecognizedValue { key: String, reason: String },

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    #[error("Target error: {0}")]
    Target(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn target<S: Into<String>>(msg: S) -> Self {
        Self::Target(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// The smallest unit of work this error is contained to.
    pub fn scope(&self) -> &'static str {
        match self {
            Self::UnresolvedCounter { .. }
            | Self::UnrecognizedSeriesType(_)
            | Self::UnrecognizedValue { .. } => "value",
            Self::QueryFailed { .. } => "instance",
            Self::EnumerationFailed { .. } | Self::FetchFailed { .. } => "entity_type",
            Self::CatalogUnavailable { .. } => "partition",
            Self::PartitionNotFound(_)
            | Self::Target(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Storage(_) => "pass",
        }
    }
}
