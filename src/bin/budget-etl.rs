use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use dotenvy::dotenv;

use actual_budget_fetch::actual::ActualClient;
use actual_budget_fetch::backup::DEFAULT_ARCHIVE_DIR;
use actual_budget_fetch::cli_utils::{
    print_error, print_header, print_info, print_success, print_warning,
};
use actual_budget_fetch::etl::archive::{ArchivePlan, archive_budget};
use actual_budget_fetch::etl::{migrate_to_mysql, write_migration_outcome};
use actual_budget_fetch::runner::{FetchError, report, run_sync};
use actual_budget_fetch::utils::app_config::{FetchConfig, MySqlConfig};
use actual_budget_fetch::utils::logging::init_tracing;

/// Fetch the budget, archive its files and copy the database into MySQL.
#[derive(Parser, Debug)]
#[command(name = "budget-etl", version)]
struct Cli {
    #[command(flatten)]
    fetch: FetchConfig,

    #[command(flatten)]
    mysql: MySqlConfig,

    /// Parent directory of the timestamped archives
    #[arg(long, env = "ACTUAL_ARCHIVE_DIR", default_value = DEFAULT_ARCHIVE_DIR)]
    archive_dir: PathBuf,

    /// Where the latest db.sqlite is copied (default: <data-dir>/db.sqlite)
    #[arg(long, env = "ACTUAL_DEST_FILE")]
    dest_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv();
    let mut cli = Cli::parse();
    init_tracing();

    print_header("Actual Budget ETL");

    let config_file = match cli.fetch.config_file() {
        Ok(file) => file,
        Err(e) => {
            print_error(&format!("Error: {}", e));
            return ExitCode::FAILURE;
        }
    };
    cli.fetch.apply_config_file(&config_file);
    cli.mysql.apply_config_file(&config_file);

    // Fetch
    print_info("Fetching budget from the sync server");
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
    let budget = match outcome {
        Ok(budget) => budget,
        Err(e) => {
            print_error("Fetch failed, ETL stopped");
            return ExitCode::from(e.exit_code());
        }
    };

    // Archive
    let plan = ArchivePlan {
        budget_dir: budget.budget_dir.clone(),
        archive_root: cli.archive_dir.clone(),
        dest_file: cli
            .dest_file
            .clone()
            .unwrap_or_else(|| cli.fetch.data_dir.join("db.sqlite")),
    };
    let archived = match archive_budget(&plan, Local::now().naive_local()) {
        Ok(report) => report,
        Err(e) => {
            print_error(&format!("Error while archiving: {:#}", e));
            return ExitCode::FAILURE;
        }
    };
    for missing in &archived.missing {
        print_warning(&format!("{} not found in {}", missing, plan.budget_dir.display()));
    }
    print_success(&format!(
        "Archived {} file(s) to {}",
        archived.moved.len(),
        archived.archive_dir.display()
    ));

    // Migrate
    let settings = match cli.mysql.settings() {
        Ok(settings) => settings,
        Err(e) => {
            print_error(&format!("Error: {}", e));
            return ExitCode::FAILURE;
        }
    };
    let (Some(settings), Some(db_path)) = (settings, archived.database) else {
        print_info("No MySQL target configured or no database archived, skipping migration");
        return ExitCode::SUCCESS;
    };

    let outcome = migrate_to_mysql(&db_path, &settings).await;
    if let Err(e) = write_migration_outcome(&outcome, &mut io::stdout()) {
        tracing::error!(error = %e, "failed to write migration outcome");
    }
    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

fn prepare(fetch: &mut FetchConfig) -> anyhow::Result<ActualClient> {
    fetch.prompt_if_needed()?;
    ActualClient::new()
}
