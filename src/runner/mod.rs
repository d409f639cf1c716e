use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use thiserror::Error;

/// Line printed on stdout once the budget is on disk.
pub const SUCCESS_MESSAGE: &str = "Data downloaded successfully.";

/// Everything needed to open a session against the sync server
#[derive(Clone)]
pub struct SessionConfig {
    pub data_dir: PathBuf,
    pub server_url: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("data_dir", &self.data_dir)
            .field("server_url", &self.server_url)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Which budget to download, and the key to open it with
#[derive(Clone, Default)]
pub struct BudgetRef {
    pub budget_id: Option<String>,
    pub budget_password: Option<String>,
}

impl fmt::Debug for BudgetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BudgetRef")
            .field("budget_id", &self.budget_id)
            .field(
                "budget_password",
                &self.budget_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// A budget written to the local data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedBudget {
    /// Directory name under the data dir, taken from the budget metadata
    pub id: String,
    pub name: Option<String>,
    pub budget_dir: PathBuf,
}

/// The three calls the runner makes against a budgeting service.
///
/// `init` opens the session, `shutdown` releases it. The runner guarantees
/// that `shutdown` is called exactly once for every successful `init`.
pub trait BudgetClient {
    async fn init(&mut self, config: &SessionConfig) -> Result<()>;

    async fn download_budget(&mut self, budget: &BudgetRef) -> Result<DownloadedBudget>;

    async fn shutdown(&mut self) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to initialize session: {0:#}")]
    Initialization(anyhow::Error),

    #[error("failed to download budget: {0:#}")]
    Download(anyhow::Error),

    #[error("failed to release session: {0:#}")]
    Shutdown(anyhow::Error),
}

impl FetchError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            FetchError::Initialization(_) => 1,
            FetchError::Download(_) => 2,
            FetchError::Shutdown(_) => 3,
        }
    }
}

/// Open a session, download one budget and release the session.
pub async fn run_sync<C: BudgetClient>(
    client: &mut C,
    config: &SessionConfig,
    budget: &BudgetRef,
) -> Result<DownloadedBudget, FetchError> {
    tracing::info!(data_dir = %config.data_dir.display(), "initializing session");
    client
        .init(config)
        .await
        .map_err(FetchError::Initialization)?;

    // From here on the session is held and must be released on every path.
    tracing::info!(budget_id = ?budget.budget_id, "downloading budget");
    let downloaded = client.download_budget(budget).await;
    let released = client.shutdown().await;

    match (downloaded, released) {
        (Ok(budget), Ok(())) => {
            tracing::info!(budget = %budget.id, dir = %budget.budget_dir.display(), "budget downloaded");
            Ok(budget)
        }
        (Ok(_), Err(e)) => Err(FetchError::Shutdown(e)),
        (Err(e), Ok(())) => Err(FetchError::Download(e)),
        (Err(e), Err(release_err)) => {
            tracing::warn!(error = %release_err, "session release failed after download error");
            Err(FetchError::Download(e))
        }
    }
}

/// Write the outcome of a run to the console sinks.
///
/// A `Shutdown` failure only happens after the budget reached disk, so the
/// success line is printed before the error.
pub fn report<O: Write, E: Write>(
    outcome: &Result<DownloadedBudget, FetchError>,
    out: &mut O,
    err: &mut E,
) -> std::io::Result<()> {
    match outcome {
        Ok(_) => writeln!(out, "{}", SUCCESS_MESSAGE),
        Err(e @ FetchError::Shutdown(_)) => {
            writeln!(out, "{}", SUCCESS_MESSAGE)?;
            writeln!(err, "Error: {}", e)
        }
        Err(e) => writeln!(err, "Error: {}", e),
    }
}
