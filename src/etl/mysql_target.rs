use anyhow::Result;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Params, Value};

use crate::etl::migrate::{MigrationTarget, SqlValue, TablePlan, UpsertOutcome};
use crate::utils::app_config::MySqlSettings;

impl From<&SqlValue> for Value {
    fn from(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => Value::NULL,
            SqlValue::Integer(i) => Value::Int(*i),
            SqlValue::Real(f) => Value::Double(*f),
            SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
            SqlValue::Blob(b) => Value::Bytes(b.clone()),
        }
    }
}

/// MySQL side of the ETL migration
pub struct MySqlTarget {
    conn: Conn,
    upsert_sql: String,
}

impl MySqlTarget {
    pub async fn connect(settings: &MySqlSettings) -> Result<Self> {
        let opts = OptsBuilder::default()
            .ip_or_hostname(settings.host.clone())
            .tcp_port(settings.port)
            .user(Some(settings.user.clone()))
            .pass(settings.password.clone())
            .db_name(Some(settings.database.clone()));

        let conn = Conn::new(opts).await?;
        tracing::info!(host = %settings.host, db = %settings.database, "connected to MySQL");
        Ok(Self {
            conn,
            upsert_sql: String::new(),
        })
    }

    pub async fn disconnect(self) -> Result<()> {
        self.conn.disconnect().await?;
        Ok(())
    }
}

impl MigrationTarget for MySqlTarget {
    async fn begin_table(&mut self, plan: &TablePlan) -> Result<()> {
        // DDL commits implicitly, so it runs before the transaction opens
        self.conn.query_drop(plan.create_table_sql()).await?;
        self.conn.query_drop("START TRANSACTION").await?;
        self.upsert_sql = plan.upsert_sql();
        Ok(())
    }

    async fn upsert(&mut self, _plan: &TablePlan, row: &[SqlValue]) -> Result<UpsertOutcome> {
        let params = Params::Positional(row.iter().map(Value::from).collect());
        self.conn.exec_drop(self.upsert_sql.as_str(), params).await?;
        Ok(UpsertOutcome::from_affected_rows(self.conn.affected_rows()))
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.query_drop("COMMIT").await?;
        Ok(())
    }
}
