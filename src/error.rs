use thiserror::Error;

/// All story-store errors.
///
/// Every failure is a synchronous failure of the call that triggered it;
/// no operation retries or swallows an error from an external collaborator.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown story or file identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Propagated unmodified from the external import hook.
    #[error("import failed: {0}")]
    Import(anyhow::Error),

    /// The external stories-list provider failed.
    #[error("failed to fetch stories list: {0}")]
    StoriesList(anyhow::Error),

    /// An operation was called before its prerequisites were met.
    #[error("{0}")]
    Precondition(String),

    /// Invalid store configuration (e.g. duplicate story ids in the index).
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for story-store operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this error came from the external import hook.
    pub fn is_import(&self) -> bool {
        matches!(self, Error::Import(_))
    }
}
