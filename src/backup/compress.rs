use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const DEFAULT_ARCHIVE_DIR: &str = "data/archives";
pub const DEFAULT_COMPRESSED_DIR: &str = "data/compressed";
/// Update log written next to the budget data by the scheduled ETL runs
pub const DEFAULT_LOG_FILE: &str = "data/actual-budget-updates.log";

#[derive(Debug, Clone)]
pub struct CompressPlan {
    /// Timestamped archives written by the ETL
    pub archive_dir: PathBuf,
    /// Where the dated zip files are kept
    pub compressed_dir: PathBuf,
    /// Update log bundled into the zip and then removed
    pub log_file: PathBuf,
}

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("actual-budget-{}.zip", date.format("%Y%m%d"))
}

/// Zip name for a path below the archive dir, always `/`-separated
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Zip every archived file plus the update log into `<compressed_dir>/actual-budget-<date>.zip`.
pub fn compress_archives(plan: &CompressPlan, date: NaiveDate) -> Result<PathBuf> {
    fs::create_dir_all(&plan.compressed_dir)?;
    let zip_path = plan.compressed_dir.join(backup_file_name(date));

    let file = File::create(&zip_path)
        .with_context(|| format!("creating {}", zip_path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    if plan.archive_dir.exists() {
        for entry in WalkDir::new(&plan.archive_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&plan.archive_dir)?;
            writer.start_file(entry_name(relative), options)?;
            io::copy(&mut File::open(entry.path())?, &mut writer)?;
        }
    }

    if plan.log_file.exists() {
        let name = plan
            .log_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "updates.log".to_string());
        writer.start_file(name, options)?;
        io::copy(&mut File::open(&plan.log_file)?, &mut writer)?;
        tracing::info!(log = %plan.log_file.display(), "added log file to zip");
    }

    writer.finish()?;
    tracing::info!(zip = %zip_path.display(), "archives compressed");
    Ok(zip_path)
}

/// Empty the archive directory (keeping the directory itself) and drop the update log.
pub fn clear_archives(plan: &CompressPlan) -> Result<()> {
    if plan.archive_dir.exists() {
        for entry in fs::read_dir(&plan.archive_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        tracing::info!(dir = %plan.archive_dir.display(), "cleared archives folder");
    }

    if plan.log_file.exists() {
        fs::remove_file(&plan.log_file)?;
        tracing::info!(log = %plan.log_file.display(), "removed log file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn plan(root: &TempDir) -> CompressPlan {
        CompressPlan {
            archive_dir: root.path().join("archives"),
            compressed_dir: root.path().join("compressed-storage"),
            log_file: root.path().join("actual-budget-updates.log"),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[test]
    fn test_backup_file_name() {
        assert_eq!(backup_file_name(date()), "actual-budget-20261017.zip");
    }

    #[test]
    fn test_compress_then_clear() {
        let root = TempDir::new().unwrap();
        let plan = plan(&root);
        let run = plan.archive_dir.join("20261017_040506");
        fs::create_dir_all(&run).unwrap();
        fs::write(run.join("db.sqlite"), b"db").unwrap();
        fs::write(run.join("metadata.json"), b"{}").unwrap();
        fs::write(&plan.log_file, b"ETL process starting").unwrap();

        let zip_path = compress_archives(&plan, date()).unwrap();
        assert_eq!(zip_path, plan.compressed_dir.join("actual-budget-20261017.zip"));

        let mut archive = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "20261017_040506/db.sqlite".to_string(),
                "20261017_040506/metadata.json".to_string(),
                "actual-budget-updates.log".to_string(),
            ]
        );
        let mut contents = String::new();
        archive
            .by_name("20261017_040506/db.sqlite")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "db");

        clear_archives(&plan).unwrap();
        assert!(plan.archive_dir.is_dir());
        assert_eq!(fs::read_dir(&plan.archive_dir).unwrap().count(), 0);
        assert!(!plan.log_file.exists());
        assert!(zip_path.exists());
    }

    #[test]
    fn test_compress_with_nothing_archived() {
        let root = TempDir::new().unwrap();
        let plan = plan(&root);

        let zip_path = compress_archives(&plan, date()).unwrap();
        let archive = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 0);
        clear_archives(&plan).unwrap();
    }
}
