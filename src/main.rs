use std::io;
use std::process::ExitCode;

use clap::Parser;
use dotenvy::dotenv;

use actual_budget_fetch::actual::ActualClient;
use actual_budget_fetch::runner::{FetchError, report, run_sync};
use actual_budget_fetch::utils::app_config::FetchConfig;
use actual_budget_fetch::utils::logging::init_tracing;

/// Download one budget from an Actual sync server into the local data directory.
#[derive(Parser, Debug)]
#[command(name = "actual-budget-fetch", version)]
struct Cli {
    #[command(flatten)]
    fetch: FetchConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv();
    let mut cli = Cli::parse();
    init_tracing();

    let outcome = match prepare(&mut cli.fetch) {
        Ok(mut client) => {
            run_sync(
                &mut client,
                &cli.fetch.session_config(),
                &cli.fetch.budget_ref(),
            )
            .await
        }
        Err(e) => Err(FetchError::Initialization(e)),
    };

    if let Err(e) = report(&outcome, &mut io::stdout(), &mut io::stderr()) {
        tracing::error!(error = %e, "failed to write outcome");
    }

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => ExitCode::from(e.exit_code()),
    }
}

/// Merge the config file into the CLI values and build the client
fn prepare(fetch: &mut FetchConfig) -> anyhow::Result<ActualClient> {
    let file = fetch.config_file()?;
    fetch.apply_config_file(&file);
    fetch.prompt_if_needed()?;
    ActualClient::new()
}
