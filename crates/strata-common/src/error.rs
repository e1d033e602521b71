use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The migration set itself is unusable: unreadable directory, bad
    /// filename, duplicate version.
    #[error("load error: {0}")]
    Load(String),

    /// The version table could not be created or read.
    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("migration {version} failed: {reason}")]
    Apply { version: i64, reason: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Version of the migration this error is attributed to, if any.
    pub fn version(&self) -> Option<i64> {
        match self {
            Error::Apply { version, .. } => Some(*version),
            _ => None,
        }
    }
}
