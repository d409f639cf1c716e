use std::fmt;

use thiserror::Error;

/// Why a budget download failed, as reported by the sync server or by import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadFailure {
    Network,
    FileNotFound,
    DecryptFailure { file_id: String },
    InvalidZipFile,
    InvalidMetaFile,
    NotZipFile,
    Server(String),
}

impl DownloadFailure {
    /// Map a `reason` string from a server error envelope
    pub fn from_reason(reason: &str) -> Self {
        match reason {
            "network" | "download-failure" => DownloadFailure::Network,
            "file-not-found" => DownloadFailure::FileNotFound,
            "not-zip-file" => DownloadFailure::NotZipFile,
            "invalid-zip-file" => DownloadFailure::InvalidZipFile,
            "invalid-meta-file" => DownloadFailure::InvalidMetaFile,
            other => DownloadFailure::Server(other.to_string()),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            DownloadFailure::Network => "network",
            DownloadFailure::FileNotFound => "file-not-found",
            DownloadFailure::DecryptFailure { .. } => "decrypt-failure",
            DownloadFailure::InvalidZipFile => "invalid-zip-file",
            DownloadFailure::InvalidMetaFile => "invalid-meta-file",
            DownloadFailure::NotZipFile => "not-zip-file",
            DownloadFailure::Server(reason) => reason,
        }
    }
}

impl fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadFailure::Network => write!(
                f,
                "Downloading the budget failed. Check your network connection."
            ),
            DownloadFailure::FileNotFound => write!(f, "budget file not found on the server"),
            DownloadFailure::DecryptFailure { file_id } => write!(
                f,
                "unable to decrypt budget file {}, check the budget password",
                file_id
            ),
            DownloadFailure::InvalidZipFile
            | DownloadFailure::InvalidMetaFile
            | DownloadFailure::NotZipFile => {
                write!(f, "downloaded file is invalid ({})", self.reason())
            }
            DownloadFailure::Server(reason) => write!(f, "server rejected the request: {}", reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActualError {
    #[error("no server URL configured")]
    MissingServerUrl,

    #[error("invalid server URL {url}: {message}")]
    InvalidServerUrl { url: String, message: String },

    #[error("session is not open")]
    NotConnected,

    #[error("sign-in rejected by server: {0}")]
    Authentication(String),

    #[error("no budget id provided")]
    MissingBudgetId,

    #[error(
        "Budget \"{0}\" not found. Check the sync id of your budget in the Advanced section of the settings page."
    )]
    BudgetNotFound(String),

    #[error("File {0} is encrypted. Please provide a password.")]
    PasswordRequired(String),

    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0}")]
    Download(DownloadFailure),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ActualError {
    /// Short machine-readable code, matching the server's reason strings where one exists
    pub fn reason(&self) -> &str {
        match self {
            ActualError::MissingServerUrl => "missing-server-url",
            ActualError::InvalidServerUrl { .. } => "invalid-server-url",
            ActualError::NotConnected => "not-connected",
            ActualError::Authentication(reason) => reason,
            ActualError::MissingBudgetId => "missing-budget-id",
            ActualError::BudgetNotFound(_) => "budget-not-found",
            ActualError::PasswordRequired(_) => "password-required",
            ActualError::Network { .. } => "network",
            ActualError::Download(failure) => failure.reason(),
            ActualError::Io(_) => "io",
        }
    }
}

impl From<DownloadFailure> for ActualError {
    fn from(failure: DownloadFailure) -> Self {
        ActualError::Download(failure)
    }
}
