//! Post-download ETL: archive the fresh budget files and copy the budget
//! database into MySQL.
pub mod archive;
pub mod migrate;
pub mod mysql_target;

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;

use crate::etl::migrate::{SqliteSource, TableReport};
use crate::etl::mysql_target::MySqlTarget;
use crate::utils::app_config::MySqlSettings;

/// Copy the SQLite database at `db_path` into the configured MySQL database.
pub async fn migrate_to_mysql(db_path: &Path, settings: &MySqlSettings) -> Result<Vec<TableReport>> {
    let source = SqliteSource::open(db_path)?;
    let mut target = MySqlTarget::connect(settings).await?;

    let reports = migrate::migrate(&source, &mut target).await?;
    target.disconnect().await?;

    Ok(reports)
}

/// Write the per-table results, or the failure, as stdout status lines.
pub fn write_migration_outcome<W: Write>(
    outcome: &Result<Vec<TableReport>>,
    out: &mut W,
) -> io::Result<()> {
    match outcome {
        Ok(reports) => {
            for report in reports {
                if report.skipped() {
                    writeln!(out, "Skipping table {} (no unique key found).", report.table)?;
                } else {
                    writeln!(
                        out,
                        "Table {} migration completed: {} rows inserted, {} rows updated.",
                        report.table, report.inserted, report.updated
                    )?;
                }
            }
            writeln!(out, "Migration complete!")
        }
        Err(e) => writeln!(out, "Error during migration: {:#}", e),
    }
}
