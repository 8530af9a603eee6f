use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level outcomes the boundary must be able to tell apart. `NotFound`
/// means no such row; `AccessDenied` means the row exists under another owner.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("email already exists")]
    DuplicateEmail,

    #[error("message has already been sent")]
    AlreadySent,

    #[error("sent messages cannot be modified")]
    CannotModifySent,

    #[error("a message cannot be deleted while it is sending")]
    CannotDeleteSending,

    #[error("database error")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}
