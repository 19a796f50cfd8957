use crate::protocol::EntityId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Entity {0} is not registered for synchronization")]
    MissingRegistration(EntityId),

    #[error("Entity {0} is not under local authority")]
    NotAuthoritative(EntityId),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
