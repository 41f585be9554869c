//! Staging Store Error Types

use thiserror::Error;

use crate::model::{AttributeId, DatabaseId, DatastorageId, IndId, ServerId, UacId};

/// Staging store errors. Any of these is fatal to the current run.
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("unknown server id: {0}")]
    UnknownServer(ServerId),

    #[error("unknown database id: {0}")]
    UnknownDatabase(DatabaseId),

    #[error("unknown datastorage id: {0}")]
    UnknownDatastorage(DatastorageId),

    #[error("unknown attribute id: {0}")]
    UnknownAttribute(AttributeId),

    #[error("unknown UAC id: {0}")]
    UnknownUac(UacId),

    #[error("unknown IND id: {0}")]
    UnknownInd(IndId),

    #[error("attribute {0} has no staged values")]
    NoValues(AttributeId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for staging operations
pub type StagingResult<T> = Result<T, StagingError>;
