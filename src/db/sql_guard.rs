//! Read-only guard for export SQL.
//!
//! Export scripts are stored outside the catalog and executed verbatim, so the
//! text is parsed with [sqlparser](https://docs.rs/sqlparser/) in the target
//! database's dialect before it reaches the driver. An export must be exactly
//! one query statement (`SELECT`, `WITH ... SELECT`, `VALUES`). Queries that
//! write through `SELECT ... INTO` or take row locks are refused as well.

use crate::db::DatabaseType;
use crate::error::{ExportError, ExportResult};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Leading keyword of a statement, for error messages.
fn statement_keyword(stmt: &Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

fn rejected(what: &str) -> ExportError {
    ExportError::data_fetch(
        format!("{} is not allowed in an export", what),
        "Exports may only read data; use a plain SELECT statement",
    )
}

/// Walk a query and its nested parts looking for writes or row locks.
fn check_query(query: &Query) -> ExportResult<()> {
    if !query.locks.is_empty() {
        return Err(rejected("Row locking (FOR UPDATE/FOR SHARE)"));
    }
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(expr: &SetExpr) -> ExportResult<()> {
    match expr {
        SetExpr::Select(select) => {
            if select.into.is_some() {
                return Err(rejected("SELECT ... INTO"));
            }
            Ok(())
        }
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        other => Err(rejected(&statement_keyword_of(other))),
    }
}

fn statement_keyword_of(expr: &SetExpr) -> String {
    expr.to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

/// Check that `sql` is a single read-only query.
pub fn validate_export_sql(sql: &str, db_type: DatabaseType) -> ExportResult<()> {
    let dialect = dialect_for(db_type);

    let statements = Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| {
        ExportError::data_fetch(
            format!("Failed to parse export SQL: {}", e),
            format!("Check the script syntax for {}", db_type),
        )
    })?;

    match statements.as_slice() {
        [] => Err(ExportError::data_fetch(
            "Export SQL is empty",
            "Add a SELECT statement to the script",
        )),
        [Statement::Query(query)] => check_query(query),
        [other] => Err(rejected(&statement_keyword(other))),
        many => Err(ExportError::data_fetch(
            format!("Export SQL holds {} statements, expected one", many.len()),
            "Split the script so each export runs a single SELECT",
        )),
    }
}
