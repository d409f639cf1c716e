use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, types::ValueRef};

/// A single cell copied between databases
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sqlite_type: String,
}

/// Tables without an `id` first column that still have a natural key
const UNIQUE_KEY_OVERRIDES: &[(&str, &str)] = &[("schedules_json_paths", "schedule_id")];

/// MySQL column type for a declared SQLite type
pub fn map_sqlite_type(sqlite_type: &str) -> &'static str {
    let t = sqlite_type.to_lowercase();
    if t.contains("int") {
        "BIGINT"
    } else if t.contains("char") || t.contains("text") {
        "TEXT"
    } else if t.contains("real") || t.contains("double") || t.contains("float") {
        "FLOAT"
    } else if t.contains("blob") {
        "BLOB"
    } else {
        "TEXT"
    }
}

/// Column used as the upsert key, or `None` if the table cannot be merged
pub fn unique_key_for(table: &str, columns: &[ColumnDef]) -> Option<String> {
    if let Some(first) = columns.first() {
        if first.name.eq_ignore_ascii_case("id") {
            return Some("id".to_string());
        }
    }
    UNIQUE_KEY_OVERRIDES
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, key)| key.to_string())
}

pub fn quote_mysql(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn quote_sqlite(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug, Clone)]
pub struct TablePlan {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub unique_key: String,
}

impl TablePlan {
    fn column_type(&self, column: &ColumnDef) -> &'static str {
        let mapped = map_sqlite_type(&column.sqlite_type);
        // MySQL can only index TEXT/BLOB with a prefix length
        if column.name.eq_ignore_ascii_case(&self.unique_key) && matches!(mapped, "TEXT" | "BLOB") {
            "VARCHAR(255)"
        } else {
            mapped
        }
    }

    pub fn create_table_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_mysql(&c.name), self.column_type(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, UNIQUE({}))",
            quote_mysql(&self.name),
            columns,
            quote_mysql(&self.unique_key)
        )
    }

    pub fn upsert_sql(&self) -> String {
        let names = self
            .columns
            .iter()
            .map(|c| quote_mysql(&c.name))
            .collect::<Vec<_>>();
        let placeholders = vec!["?"; names.len()].join(", ");
        let updates = names
            .iter()
            .map(|n| format!("{}=VALUES({})", n, n))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
            quote_mysql(&self.name),
            names.join(", "),
            placeholders,
            updates
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    /// MySQL reports 1 affected row for an insert and 2 for an update
    pub fn from_affected_rows(rows: u64) -> Self {
        match rows {
            1 => UpsertOutcome::Inserted,
            2 => UpsertOutcome::Updated,
            _ => UpsertOutcome::Unchanged,
        }
    }
}

/// Where migrated rows are written.
pub trait MigrationTarget {
    /// Create the table if needed and open a transaction for its rows
    async fn begin_table(&mut self, plan: &TablePlan) -> Result<()>;

    async fn upsert(&mut self, plan: &TablePlan, row: &[SqlValue]) -> Result<UpsertOutcome>;

    async fn commit(&mut self) -> Result<()>;
}

/// Read side of the migration: a budget `db.sqlite`
pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn columns(&self, table: &str) -> Result<Vec<ColumnDef>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_sqlite(table)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnDef {
                    name: row.get(1)?,
                    sqlite_type: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    pub fn rows(&self, table: &str) -> Result<Vec<Vec<SqlValue>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {}", quote_sqlite(table)))?;
        let width = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(SqlValue::from))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub unique_key: Option<String>,
    pub inserted: u64,
    pub updated: u64,
}

impl TableReport {
    pub fn skipped(&self) -> bool {
        self.unique_key.is_none()
    }
}

/// Copy every keyed table from `source` into `target`, one transaction per table.
pub async fn migrate<T: MigrationTarget>(
    source: &SqliteSource,
    target: &mut T,
) -> Result<Vec<TableReport>> {
    let mut reports = Vec::new();

    for table in source.tables()? {
        tracing::info!(%table, "migrating table");
        let columns = source.columns(&table)?;

        let Some(unique_key) = unique_key_for(&table, &columns) else {
            tracing::info!(%table, "skipping table, no unique key found");
            reports.push(TableReport {
                table,
                ..Default::default()
            });
            continue;
        };
        tracing::debug!(%table, key = %unique_key, "using unique column");

        let plan = TablePlan {
            name: table.clone(),
            columns,
            unique_key: unique_key.clone(),
        };
        target
            .begin_table(&plan)
            .await
            .with_context(|| format!("preparing table {}", table))?;

        let mut report = TableReport {
            table: table.clone(),
            unique_key: Some(unique_key),
            ..Default::default()
        };
        for row in source.rows(&table)? {
            match target.upsert(&plan, &row).await? {
                UpsertOutcome::Inserted => report.inserted += 1,
                UpsertOutcome::Updated => report.updated += 1,
                UpsertOutcome::Unchanged => {}
            }
        }
        target.commit().await?;

        tracing::info!(
            %table,
            inserted = report.inserted,
            updated = report.updated,
            "table migration completed"
        );
        reports.push(report);
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Keeps rows in memory, keyed like MySQL's unique index would
    #[derive(Default)]
    struct MemoryTarget {
        tables: HashMap<String, HashMap<String, Vec<SqlValue>>>,
        created: Vec<String>,
        commits: usize,
    }

    impl MigrationTarget for MemoryTarget {
        async fn begin_table(&mut self, plan: &TablePlan) -> Result<()> {
            self.created.push(plan.create_table_sql());
            self.tables.entry(plan.name.clone()).or_default();
            Ok(())
        }

        async fn upsert(&mut self, plan: &TablePlan, row: &[SqlValue]) -> Result<UpsertOutcome> {
            let key_index = plan
                .columns
                .iter()
                .position(|c| c.name == plan.unique_key)
                .unwrap();
            let key = format!("{:?}", row[key_index]);
            let table = self.tables.get_mut(&plan.name).unwrap();
            Ok(match table.insert(key, row.to_vec()) {
                None => UpsertOutcome::Inserted,
                Some(previous) if previous == row => UpsertOutcome::Unchanged,
                Some(_) => UpsertOutcome::Updated,
            })
        }

        async fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            Ok(())
        }
    }

    fn budget_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE transactions (id TEXT PRIMARY KEY, amount INTEGER, notes TEXT, cleared INTEGER, rate REAL, raw BLOB);
             CREATE TABLE schedules_json_paths (schedule_id TEXT PRIMARY KEY, payee TEXT);
             CREATE TABLE kvcache (key TEXT PRIMARY KEY, value TEXT);
             INSERT INTO transactions VALUES ('t1', -1250, 'groceries', 1, 0.5, x'00ff');
             INSERT INTO transactions VALUES ('t2', 90000, NULL, 0, NULL, NULL);
             INSERT INTO schedules_json_paths VALUES ('s1', 'payee');
             INSERT INTO kvcache VALUES ('k', 'v');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(map_sqlite_type("INTEGER"), "BIGINT");
        assert_eq!(map_sqlite_type("varchar(20)"), "TEXT");
        assert_eq!(map_sqlite_type("TEXT"), "TEXT");
        assert_eq!(map_sqlite_type("DOUBLE PRECISION"), "FLOAT");
        assert_eq!(map_sqlite_type("REAL"), "FLOAT");
        assert_eq!(map_sqlite_type("BLOB"), "BLOB");
        assert_eq!(map_sqlite_type("BOOLEAN"), "TEXT");
        assert_eq!(map_sqlite_type(""), "TEXT");
    }

    #[test]
    fn test_unique_key_detection() {
        let col = |name: &str| ColumnDef {
            name: name.to_string(),
            sqlite_type: "TEXT".to_string(),
        };
        assert_eq!(unique_key_for("accounts", &[col("ID"), col("name")]), Some("id".to_string()));
        assert_eq!(
            unique_key_for("schedules_json_paths", &[col("schedule_id"), col("payee")]),
            Some("schedule_id".to_string())
        );
        assert_eq!(unique_key_for("kvcache", &[col("key"), col("value")]), None);
        assert_eq!(unique_key_for("empty", &[]), None);
    }

    #[test]
    fn test_generated_sql() {
        let plan = TablePlan {
            name: "transactions".to_string(),
            columns: vec![
                ColumnDef { name: "id".to_string(), sqlite_type: "TEXT".to_string() },
                ColumnDef { name: "amount".to_string(), sqlite_type: "INTEGER".to_string() },
            ],
            unique_key: "id".to_string(),
        };
        assert_eq!(
            plan.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS `transactions` (`id` VARCHAR(255), `amount` BIGINT, UNIQUE(`id`))"
        );
        assert_eq!(
            plan.upsert_sql(),
            "INSERT INTO `transactions` (`id`, `amount`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `id`=VALUES(`id`), `amount`=VALUES(`amount`)"
        );
        assert_eq!(quote_mysql("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_affected_rows() {
        assert_eq!(UpsertOutcome::from_affected_rows(1), UpsertOutcome::Inserted);
        assert_eq!(UpsertOutcome::from_affected_rows(2), UpsertOutcome::Updated);
        assert_eq!(UpsertOutcome::from_affected_rows(0), UpsertOutcome::Unchanged);
    }

    #[test]
    fn test_source_reads_values() {
        let source = SqliteSource::from_connection(budget_db());
        let rows = source.rows("transactions").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            vec![
                SqlValue::Text("t1".to_string()),
                SqlValue::Integer(-1250),
                SqlValue::Text("groceries".to_string()),
                SqlValue::Integer(1),
                SqlValue::Real(0.5),
                SqlValue::Blob(vec![0x00, 0xff]),
            ]
        );
        assert_eq!(rows[1][2], SqlValue::Null);
    }

    #[tokio::test]
    async fn test_migrate_skips_unkeyed_tables() {
        let source = SqliteSource::from_connection(budget_db());
        let mut target = MemoryTarget::default();

        let reports = migrate(&source, &mut target).await.unwrap();
        let by_table: HashMap<_, _> = reports.iter().map(|r| (r.table.as_str(), r)).collect();

        assert_eq!(by_table["transactions"].inserted, 2);
        assert_eq!(by_table["schedules_json_paths"].inserted, 1);
        assert!(by_table["kvcache"].skipped());
        assert!(!target.tables.contains_key("kvcache"));
        assert_eq!(target.commits, 2);
        assert_eq!(target.created.len(), 2);
    }

    #[tokio::test]
    async fn test_second_migration_counts_updates() {
        let source = SqliteSource::from_connection(budget_db());
        let mut target = MemoryTarget::default();
        migrate(&source, &mut target).await.unwrap();

        source
            .conn
            .execute("UPDATE transactions SET notes = 'rent' WHERE id = 't2'", [])
            .unwrap();
        let reports = migrate(&source, &mut target).await.unwrap();
        let tx = reports.iter().find(|r| r.table == "transactions").unwrap();
        assert_eq!(tx.inserted, 0);
        assert_eq!(tx.updated, 1);
    }
}
