//! Data source execution.
//!
//! `DataSourceExecutor` turns a `DataSource` into rows:
//! - a script reference loads the SQL text by name and runs it verbatim
//! - a query definition synthesizes its SELECT and runs that
//! - a data source with neither yields no rows
//!
//! Every statement passes the read-only guard before it reaches the database.
//! Rows are streamed from database-specific pools and decoded to JSON rows in
//! the `mysql`, `postgres` and `sqlite` submodules.

use crate::db::pool::DbPool;
use crate::db::scripts::ScriptSource;
use crate::db::sql_guard::validate_export_sql;
use crate::db::types::RowToJson;
use crate::error::ExportResult;
use crate::models::{DataSource, Row, RowSource};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Runs data sources against one database pool.
#[derive(Clone)]
pub struct DataSourceExecutor {
    pool: DbPool,
    scripts: Arc<dyn ScriptSource>,
}

impl DataSourceExecutor {
    pub fn new(pool: DbPool, scripts: Arc<dyn ScriptSource>) -> Self {
        Self { pool, scripts }
    }

    /// SQL the data source would run, or `None` when it has no row source.
    pub async fn sql_for(&self, data_source: &DataSource) -> ExportResult<Option<String>> {
        let sql = match &data_source.source {
            None => return Ok(None),
            Some(RowSource::Script(name)) => self.scripts.load(name).await?,
            Some(RowSource::Query(query)) => query.to_sql_for(self.pool.db_type())?,
        };
        validate_export_sql(&sql, self.pool.db_type())?;
        Ok(Some(sql))
    }

    /// Fetch all rows for a data source.
    pub async fn fetch(&self, data_source: &DataSource) -> ExportResult<Vec<Row>> {
        let Some(sql) = self.sql_for(data_source).await? else {
            debug!(data_source = %data_source.name, "Data source has no row source");
            return Ok(Vec::new());
        };

        let start = Instant::now();
        debug!(data_source = %data_source.name, sql = %sql, "Executing export SQL");

        let rows = match &self.pool {
            DbPool::MySql(p) => mysql::fetch_rows(p, &sql).await?,
            DbPool::Postgres(p) => postgres::fetch_rows(p, &sql).await?,
            DbPool::SQLite(p) => sqlite::fetch_rows(p, &sql).await?,
        };

        debug!(
            data_source = %data_source.name,
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched rows"
        );
        Ok(rows)
    }
}

async fn collect_rows<R, S>(mut stream: S) -> ExportResult<Vec<Row>>
where
    R: RowToJson,
    S: futures_util::Stream<Item = Result<R, sqlx::Error>> + Unpin,
{
    let mut rows = Vec::new();
    while let Some(row) = stream.next().await {
        rows.push(row?.to_row());
    }
    Ok(rows)
}

// Raw SQL without parameters; scripts may not prepare cleanly on every driver.

mod mysql {
    use super::*;
    use sqlx::{Executor, MySqlPool};

    pub async fn fetch_rows(pool: &MySqlPool, sql: &str) -> ExportResult<Vec<Row>> {
        collect_rows(pool.fetch(sql)).await
    }
}

mod postgres {
    use super::*;
    use sqlx::{Executor, PgPool};

    pub async fn fetch_rows(pool: &PgPool, sql: &str) -> ExportResult<Vec<Row>> {
        collect_rows(pool.fetch(sql)).await
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Executor, SqlitePool};

    pub async fn fetch_rows(pool: &SqlitePool, sql: &str) -> ExportResult<Vec<Row>> {
        collect_rows(pool.fetch(sql)).await
    }
}
