use thiserror::Error;

/// Errors surfaced by the storage gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors returned by the assignment engine and the job dispatcher.
///
/// Every variant maps to a distinct response category via [`ReviewError::code`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Pull request {0} is merged, reviewers are frozen")]
    MergeFrozen(String),

    #[error("User {user_id} is not a reviewer of pull request {pull_request_id}")]
    NotAssigned {
        pull_request_id: String,
        user_id: String,
    },

    #[error("User {0} is inactive")]
    UserInactive(String),

    #[error("No active replacement candidate for pull request {0}")]
    NoCandidate(String),

    #[error("Unknown job type: {0}")]
    UnknownOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job queue is full")]
    QueueFull,

    #[error("Request canceled")]
    Canceled,

    #[error("Storage error during {operation}: {source}")]
    Storage {
        operation: &'static str,
        source: StorageError,
    },
}

impl ReviewError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "PR_EXISTS",
            Self::MergeFrozen(_) => "PR_MERGED",
            Self::NotAssigned { .. } => "NOT_ASSIGNED",
            Self::UserInactive(_) => "USER_INACTIVE",
            Self::NoCandidate(_) => "NO_CANDIDATE",
            Self::UnknownOperation(_) => "UNKNOWN_OPERATION",
            Self::InvalidInput(_) => "INVALID",
            Self::QueueFull => "QUEUE_FULL",
            Self::Canceled => "CANCELED",
            Self::Storage { .. } => "ERROR",
        }
    }
}

impl ReviewError {
    /// Wrap a storage failure from `operation`. Missing entities become
    /// `NotFound`.
    pub fn storage(operation: &'static str, err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => Self::NotFound(format!("{} {}", entity, id)),
            source => Self::Storage { operation, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;

/// Attaches the failing operation to a storage result.
pub trait StorageContext<T> {
    fn context(self, operation: &'static str) -> Result<T>;
}

impl<T> StorageContext<T> for StorageResult<T> {
    fn context(self, operation: &'static str) -> Result<T> {
        self.map_err(|e| ReviewError::storage(operation, e))
    }
}
