use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path};

use chrono::Local;
use serde_json::{Map, Value};
use zip::ZipArchive;

use crate::actual::errors::{ActualError, DownloadFailure};
use crate::runner::DownloadedBudget;

pub const DB_FILE: &str = "db.sqlite";
pub const METADATA_FILE: &str = "metadata.json";

/// Where a downloaded archive came from on the server
#[derive(Debug, Clone)]
pub struct RemoteOrigin<'a> {
    pub file_id: &'a str,
    pub group_id: &'a str,
    pub encrypt_key_id: Option<&'a str>,
}

struct BudgetArchive {
    db: Vec<u8>,
    meta: Map<String, Value>,
}

fn read_archive(bytes: &[u8]) -> Result<BudgetArchive, DownloadFailure> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|_| DownloadFailure::NotZipFile)?;

    let mut db = None;
    let mut meta = None;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|_| DownloadFailure::InvalidZipFile)?;
        let name = entry.name().to_string();

        let slot = if name.contains(DB_FILE) && db.is_none() {
            &mut db
        } else if name.contains(METADATA_FILE) && meta.is_none() {
            &mut meta
        } else {
            continue;
        };

        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|_| DownloadFailure::InvalidZipFile)?;
        *slot = Some(contents);
    }

    let (Some(db), Some(meta)) = (db, meta) else {
        return Err(DownloadFailure::InvalidZipFile);
    };

    let meta: Map<String, Value> =
        serde_json::from_slice(&meta).map_err(|_| DownloadFailure::InvalidMetaFile)?;

    Ok(BudgetArchive { db, meta })
}

/// A budget id is used as a directory name and must stay inside the data dir
fn is_safe_dir_name(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !id.contains(['/', '\\'])
}

/// Unpack a downloaded budget archive into `<data_dir>/<metadata id>`.
///
/// Existing `db.sqlite` and `metadata.json` are replaced; anything else in the
/// directory (backups, caches) is left alone.
pub fn import_budget(
    data_dir: &Path,
    origin: &RemoteOrigin<'_>,
    bytes: &[u8],
) -> Result<DownloadedBudget, ActualError> {
    let BudgetArchive { db, mut meta } = read_archive(bytes)?;

    let id = match meta.get("id") {
        Some(Value::String(id)) if is_safe_dir_name(id) => id.clone(),
        _ => return Err(DownloadFailure::InvalidMetaFile.into()),
    };
    let name = meta
        .get("budgetName")
        .and_then(Value::as_str)
        .map(str::to_string);

    meta.insert("cloudFileId".into(), Value::from(origin.file_id));
    meta.insert("groupId".into(), Value::from(origin.group_id));
    meta.insert(
        "lastUploaded".into(),
        Value::from(Local::now().format("%Y-%m-%d").to_string()),
    );
    meta.insert(
        "encryptKeyId".into(),
        origin.encrypt_key_id.map_or(Value::Null, Value::from),
    );

    let budget_dir = data_dir.join(&id);
    if budget_dir.exists() {
        for file in [DB_FILE, METADATA_FILE] {
            let path = budget_dir.join(file);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
    } else {
        fs::create_dir_all(&budget_dir)?;
    }

    fs::write(budget_dir.join(DB_FILE), db)?;
    fs::write(
        budget_dir.join(METADATA_FILE),
        serde_json::to_vec(&meta).map_err(std::io::Error::other)?,
    )?;

    tracing::debug!(budget = %id, dir = %budget_dir.display(), "budget files written");

    Ok(DownloadedBudget {
        id,
        name,
        budget_dir,
    })
}

#[cfg(test)]
pub(crate) fn zip_for_tests(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
        writer.start_file(*name, options).expect("start entry");
        writer.write_all(contents.as_bytes()).expect("write entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const META: &str = r#"{"id":"Budget-6eb48eb","budgetName":"Household"}"#;

    fn origin() -> RemoteOrigin<'static> {
        RemoteOrigin {
            file_id: "file-1",
            group_id: "group-1",
            encrypt_key_id: None,
        }
    }

    fn reason(err: ActualError) -> String {
        err.reason().to_string()
    }

    #[test]
    fn test_import_writes_budget_dir() {
        let dir = TempDir::new().unwrap();
        let bytes = zip_for_tests(&[("db.sqlite", "SQLite format 3"), ("metadata.json", META)]);

        let budget = import_budget(dir.path(), &origin(), &bytes).unwrap();
        assert_eq!(budget.id, "Budget-6eb48eb");
        assert_eq!(budget.name.as_deref(), Some("Household"));
        assert_eq!(budget.budget_dir, dir.path().join("Budget-6eb48eb"));

        let db = fs::read(budget.budget_dir.join("db.sqlite")).unwrap();
        assert_eq!(db, b"SQLite format 3");

        let meta: Value =
            serde_json::from_slice(&fs::read(budget.budget_dir.join("metadata.json")).unwrap())
                .unwrap();
        assert_eq!(meta["cloudFileId"], "file-1");
        assert_eq!(meta["groupId"], "group-1");
        assert_eq!(meta["encryptKeyId"], Value::Null);
        assert_eq!(meta["budgetName"], "Household");
        assert!(meta["lastUploaded"].is_string());
    }

    #[test]
    fn test_reimport_keeps_other_files() {
        let dir = TempDir::new().unwrap();
        let first = zip_for_tests(&[("db.sqlite", "one"), ("metadata.json", META)]);
        let second = zip_for_tests(&[("db.sqlite", "two"), ("metadata.json", META)]);

        let budget = import_budget(dir.path(), &origin(), &first).unwrap();
        fs::write(budget.budget_dir.join("backup-1.sqlite"), b"old").unwrap();

        let again = import_budget(dir.path(), &origin(), &second).unwrap();
        assert_eq!(again.budget_dir, budget.budget_dir);
        assert_eq!(fs::read(again.budget_dir.join("db.sqlite")).unwrap(), b"two");
        assert!(again.budget_dir.join("backup-1.sqlite").exists());
    }

    #[test]
    fn test_rejects_non_zip_payload() {
        let dir = TempDir::new().unwrap();
        let err = import_budget(dir.path(), &origin(), b"<html>nope</html>").unwrap_err();
        assert_eq!(reason(err), "not-zip-file");
    }

    #[test]
    fn test_rejects_archive_without_metadata() {
        let dir = TempDir::new().unwrap();
        let bytes = zip_for_tests(&[("db.sqlite", "x")]);
        let err = import_budget(dir.path(), &origin(), &bytes).unwrap_err();
        assert_eq!(reason(err), "invalid-zip-file");
    }

    #[test]
    fn test_rejects_bad_metadata() {
        let dir = TempDir::new().unwrap();

        let bytes = zip_for_tests(&[("db.sqlite", "x"), ("metadata.json", "{not json")]);
        let err = import_budget(dir.path(), &origin(), &bytes).unwrap_err();
        assert_eq!(reason(err), "invalid-meta-file");

        let bytes = zip_for_tests(&[("db.sqlite", "x"), ("metadata.json", r#"{"budgetName":"x"}"#)]);
        let err = import_budget(dir.path(), &origin(), &bytes).unwrap_err();
        assert_eq!(reason(err), "invalid-meta-file");
    }

    #[test]
    fn test_rejects_escaping_budget_id() {
        let dir = TempDir::new().unwrap();
        for id in ["../evil", "a/b", "..", "/abs"] {
            let meta = format!(r#"{{"id":"{}"}}"#, id);
            let bytes = zip_for_tests(&[("db.sqlite", "x"), ("metadata.json", meta.as_str())]);
            let err = import_budget(dir.path(), &origin(), &bytes).unwrap_err();
            assert_eq!(reason(err), "invalid-meta-file", "id {id}");
        }
    }
}
