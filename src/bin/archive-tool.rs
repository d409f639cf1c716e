use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::Parser;
use dotenvy::dotenv;

use actual_budget_fetch::backup::{
    CompressPlan, DEFAULT_ARCHIVE_DIR, DEFAULT_COMPRESSED_DIR, DEFAULT_LOG_FILE,
    build_backup_message, clear_archives, compress_archives, send_backup,
};
use actual_budget_fetch::cli_utils::{print_error, print_header, print_info, print_success};
use actual_budget_fetch::utils::app_config::SmtpConfig;
use actual_budget_fetch::utils::config_file::ConfigFile;
use actual_budget_fetch::utils::logging::init_tracing;

/// Zip the ETL archives and the update log, then mail the zip.
#[derive(Parser, Debug)]
#[command(name = "archive-tool", version)]
struct Cli {
    #[command(flatten)]
    smtp: SmtpConfig,

    /// Optional key=value configuration file
    #[arg(long, env = "ACTUAL_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "ACTUAL_ARCHIVE_DIR", default_value = DEFAULT_ARCHIVE_DIR)]
    archive_dir: PathBuf,

    #[arg(long, env = "ACTUAL_COMPRESSED_DIR", default_value = DEFAULT_COMPRESSED_DIR)]
    compressed_dir: PathBuf,

    /// Update log bundled into the backup
    #[arg(long, env = "ACTUAL_LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv();
    let mut cli = Cli::parse();
    init_tracing();

    print_header("Actual Budget Archive Backup");

    if let Some(path) = &cli.config {
        match ConfigFile::load(path) {
            Ok(file) => cli.smtp.apply_config_file(&file),
            Err(e) => {
                print_error(&format!("Error: {}", e));
                return ExitCode::FAILURE;
            }
        }
    }

    let plan = CompressPlan {
        archive_dir: cli.archive_dir.clone(),
        compressed_dir: cli.compressed_dir.clone(),
        log_file: cli.log_file.clone(),
    };
    let today = Local::now().date_naive();

    let zip_path = match compress_archives(&plan, today) {
        Ok(path) => path,
        Err(e) => {
            print_error(&format!("Error while compressing archives: {:#}", e));
            return ExitCode::FAILURE;
        }
    };
    print_success(&format!("Compressed archives to {}", zip_path.display()));

    if let Err(e) = clear_archives(&plan) {
        print_error(&format!("Error while clearing archives: {:#}", e));
        return ExitCode::FAILURE;
    }
    print_info("Archives folder and log file cleared");

    match email_backup(&cli.smtp, &zip_path, today).await {
        Ok(()) => {
            println!("Email sent successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Failed to send email: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn email_backup(smtp: &SmtpConfig, zip_path: &Path, date: NaiveDate) -> anyhow::Result<()> {
    let settings = smtp.settings()?;
    let message = build_backup_message(&settings, zip_path, date)?;
    send_backup(&settings, message).await
}
