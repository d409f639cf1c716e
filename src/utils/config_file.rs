use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file {} not found.", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: expected key=value", .path.display())]
    Parse { path: PathBuf, line: usize },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// `key=value` deployment config (the `Config.txt` next to the scripts).
///
/// Each line is split on its first `=` and the value is taken verbatim, so
/// quotes, `$` and backslashes in passwords survive. Keys are matched
/// case-insensitively and stored lowercase. Blank lines and lines starting
/// with `#` are ignored.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    values: HashMap<String, String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let values = parse_lines(path, &contents)?;

        tracing::debug!(path = %path.display(), keys = values.len(), "configuration file loaded");
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Fill `slot` from the file unless the command line or environment already set it
    pub fn fill(&self, slot: &mut Option<String>, key: &str) {
        if slot.is_none() {
            *slot = self.get(key).map(str::to_string);
        }
    }
}

fn parse_lines(path: &Path, contents: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut values = HashMap::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
        })?;
        values.insert(key.trim().to_lowercase(), value.to_string());
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_and_fill() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "actual_url=http://localhost:5006").unwrap();
        writeln!(file, "BUDGET_ID=6eb48eb-group").unwrap();
        writeln!(file, "actual_password=pa=ss").unwrap();
        file.flush().unwrap();

        let config = ConfigFile::load(file.path()).unwrap();
        assert_eq!(config.get("actual_url"), Some("http://localhost:5006"));
        assert_eq!(config.get("budget_id"), Some("6eb48eb-group"));
        assert_eq!(config.get("actual_password"), Some("pa=ss"));

        let mut from_env = Some("http://override".to_string());
        config.fill(&mut from_env, "actual_url");
        assert_eq!(from_env.as_deref(), Some("http://override"));

        let mut unset = None;
        config.fill(&mut unset, "budget_id");
        assert_eq!(unset.as_deref(), Some("6eb48eb-group"));

        let mut missing = None;
        config.fill(&mut missing, "mysql_host");
        assert!(missing.is_none());
    }

    #[test]
    fn test_values_are_taken_verbatim() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "actual_password=pa$word").unwrap();
        writeln!(file, "budget_password=x\\y'z").unwrap();
        writeln!(file, "mysql_password=\"quoted\" #not-a-comment").unwrap();
        writeln!(file, "email_password=a=b=c").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "# smtp_server=ignored").unwrap();
        file.flush().unwrap();

        let config = ConfigFile::load(file.path()).unwrap();
        assert_eq!(config.get("actual_password"), Some("pa$word"));
        assert_eq!(config.get("budget_password"), Some("x\\y'z"));
        assert_eq!(config.get("mysql_password"), Some("\"quoted\" #not-a-comment"));
        assert_eq!(config.get("email_password"), Some("a=b=c"));
        assert_eq!(config.get("smtp_server"), None);
    }

    #[test]
    fn test_line_without_separator() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "actual_url=http://localhost:5006").unwrap();
        writeln!(file, "budget_id").unwrap();
        file.flush().unwrap();

        let err = ConfigFile::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigFile::load(Path::new("/definitely/not/here/Config.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(err.to_string().contains("not found"));
    }
}
