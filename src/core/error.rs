use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("No statement '{statement}' mapped for entity '{entity_type}', operation '{operation}'")]
    MissingStatement {
        statement: String,
        entity_type: String,
        operation: String,
    },

    #[error("Unknown entity type '{0}'")]
    UnknownEntityType(String),

    #[error("Malformed filter expression: {0}")]
    MalformedFilter(String),

    #[error("Filter operator '{0}' has no SQL rendering")]
    UnsupportedOperator(String),

    #[error("Prepare failed for statement '{statement}': {message}")]
    PrepareFailed { statement: String, message: String },

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Enlistment rejected: {0}")]
    EnlistFailed(String),

    #[error("Transaction {id} is already {state}")]
    TransactionNotActive { id: u64, state: String },

    #[error("Failed to apply field '{field}' on {entity_type}#{id}: {message}")]
    EntityUpdate {
        entity_type: String,
        id: u64,
        field: String,
        message: String,
    },

    #[error("Identity of {entity_type} entity is already assigned (id {id})")]
    IdentityAlreadyAssigned { entity_type: String, id: u64 },

    #[error("Entity of type '{0}' has no identity assigned")]
    MissingIdentity(String),

    #[error("Counter store error for sequence '{sequence}': {message}")]
    CounterStore { sequence: String, message: String },

    #[error("Backend error on statement '{statement}': {message}")]
    Backend { statement: String, message: String },

    #[error("Session is closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
