use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use crate::actual::import::DB_FILE;

/// Files moved out of the budget directory after every download
pub const ARCHIVED_FILES: [&str; 3] = ["db.sqlite", "cache.sqlite", "metadata.json"];

#[derive(Debug, Clone)]
pub struct ArchivePlan {
    /// Directory the budget was downloaded into
    pub budget_dir: PathBuf,
    /// Parent of the timestamped archive directories
    pub archive_root: PathBuf,
    /// Where the latest `db.sqlite` is copied for the migration step
    pub dest_file: PathBuf,
}

#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub archive_dir: PathBuf,
    pub moved: Vec<PathBuf>,
    pub missing: Vec<String>,
    /// Set when `db.sqlite` was copied to the destination
    pub database: Option<PathBuf>,
}

pub fn timestamp_dir_name(at: NaiveDateTime) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // rename cannot cross filesystems
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// Copy the fresh database to its destination and move the budget files
/// into `<archive_root>/<timestamp>/`.
pub fn archive_budget(plan: &ArchivePlan, at: NaiveDateTime) -> Result<ArchiveReport> {
    let archive_dir = plan.archive_root.join(timestamp_dir_name(at));
    fs::create_dir_all(&archive_dir)
        .with_context(|| format!("creating archive directory {}", archive_dir.display()))?;

    tracing::info!(archive = %archive_dir.display(), "archiving budget files");

    let mut report = ArchiveReport {
        archive_dir: archive_dir.clone(),
        ..Default::default()
    };

    for file_name in ARCHIVED_FILES {
        let source = plan.budget_dir.join(file_name);
        if !source.exists() {
            tracing::warn!(file = file_name, dir = %plan.budget_dir.display(), "file not found, skipping");
            report.missing.push(file_name.to_string());
            continue;
        }

        if file_name == DB_FILE {
            if let Some(parent) = plan.dest_file.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &plan.dest_file).with_context(|| {
                format!("copying {} to {}", source.display(), plan.dest_file.display())
            })?;
            tracing::info!(dest = %plan.dest_file.display(), "updated SQLite database");
            report.database = Some(plan.dest_file.clone());
        }

        let target = archive_dir.join(file_name);
        move_file(&source, &target)
            .with_context(|| format!("moving {} to {}", source.display(), target.display()))?;
        tracing::info!(file = file_name, to = %target.display(), "archived");
        report.moved.push(target);
    }

    Ok(report)
}
