//! Query-by-example models.
//!
//! A `Query` is a reusable definition made of columns (each owned by a table)
//! and joins connecting those tables. `Query::to_sql` turns the graph into a
//! plain `SELECT ... FROM ... JOIN ...` statement.
//!
//! # Synthesis rules
//!
//! - The owning table of the first declared column is the primary table.
//! - Tables are aliased `t0, t1, ...` in the order they enter the statement.
//! - Joins are emitted in declaration order. Exactly one side of each join
//!   must already be in scope; the other side is the table being joined.
//! - Every selected column is emitted as `tN."column" AS "alias"`, in
//!   declaration order. The alias is the bare column name unless several
//!   tables declare a column with that name, in which case it becomes
//!   `table_column`. Two columns ending up with the same alias is an error.
//! - Table and column names are always quoted for the target database
//!   (backticks on MySQL, double quotes elsewhere), so reserved words such as
//!   `order` work and names match exactly as written.
//!
//! The same `Query` always yields byte-identical SQL.

use crate::db::DatabaseType;
use crate::error::{ExportError, ExportResult};
use crate::models::field::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A table taking part in a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    pub name: String,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A selected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub table: Table,
    #[serde(default)]
    pub field_type: FieldType,
    /// Position within the owning table
    pub index: u32,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            table: Table::new(table),
            field_type: FieldType::String,
            index,
        }
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }
}

/// Join kinds supported by the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
        }
    }

    /// Join type seen from the other side of the relation.
    pub fn mirrored(&self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            other => *other,
        }
    }
}

/// A join between two table columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    #[serde(default)]
    pub join_type: JoinType,
    pub left_table: Table,
    pub left_column: String,
    pub right_table: Table,
    pub right_column: String,
}

impl Join {
    pub fn new(
        join_type: JoinType,
        left: (&str, &str),
        right: (&str, &str),
    ) -> Self {
        Self {
            join_type,
            left_table: Table::new(left.0),
            left_column: left.1.to_string(),
            right_table: Table::new(right.0),
            right_column: right.1.to_string(),
        }
    }
}

/// A query-by-example definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub joins: Vec<Join>,
}

impl Query {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            joins: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Tables referenced by columns or joins, in first-seen order.
    pub fn tables(&self) -> Vec<Table> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .map(|c| &c.table)
            .chain(
                self.joins
                    .iter()
                    .flat_map(|j| [&j.left_table, &j.right_table]),
            )
            .filter(|t| seen.insert(t.name.clone()))
            .cloned()
            .collect()
    }

    /// Output names of the selected columns, in declaration order.
    ///
    /// These are the keys rows produced by the synthesized SQL carry.
    pub fn output_names(&self) -> Vec<String> {
        let mut tables_by_name: HashMap<&str, HashSet<&str>> = HashMap::new();
        for column in &self.columns {
            tables_by_name
                .entry(column.name.as_str())
                .or_default()
                .insert(column.table.name.as_str());
        }

        self.columns
            .iter()
            .map(|c| {
                let shared = tables_by_name
                    .get(c.name.as_str())
                    .is_some_and(|tables| tables.len() > 1);
                if shared {
                    format!("{}_{}", c.table.name, c.name)
                } else {
                    c.name.clone()
                }
            })
            .collect()
    }

    /// Check the graph without keeping the SQL.
    pub fn validate(&self) -> ExportResult<()> {
        self.to_sql().map(|_| ())
    }

    /// Synthesize the SELECT statement with ANSI double-quoted identifiers.
    pub fn to_sql(&self) -> ExportResult<String> {
        self.to_sql_for(DatabaseType::PostgreSQL)
    }

    /// Synthesize the SELECT statement for a target database.
    pub fn to_sql_for(&self, db_type: DatabaseType) -> ExportResult<String> {
        let Some(first) = self.columns.first() else {
            return Err(self.error("query has no columns"));
        };

        self.check_identifiers()?;
        self.check_columns()?;

        // table name -> alias, in join order
        let mut scope: HashMap<&str, String> = HashMap::new();
        scope.insert(first.table.name.as_str(), "t0".to_string());

        let mut join_clauses = Vec::with_capacity(self.joins.len());
        for join in &self.joins {
            let left = join.left_table.name.as_str();
            let right = join.right_table.name.as_str();

            if left == right {
                return Err(self.error(format!("self-referential join on table '{}'", left)));
            }

            let (joined, join_type) = match (scope.contains_key(left), scope.contains_key(right)) {
                (true, false) => (right, join.join_type),
                (false, true) => (left, join.join_type.mirrored()),
                (true, true) => {
                    return Err(self.error(format!(
                        "join between '{}' and '{}' closes a cycle in the join graph",
                        left, right
                    )));
                }
                (false, false) => {
                    return Err(self.error(format!(
                        "join between '{}' and '{}' is not connected to '{}'",
                        left, right, first.table.name
                    )));
                }
            };

            let alias = format!("t{}", scope.len());
            scope.insert(joined, alias.clone());

            join_clauses.push(format!(
                "{} {} AS {} ON {}.{} = {}.{}",
                join_type.keyword(),
                quote_identifier(joined, db_type),
                alias,
                scope[left],
                quote_identifier(&join.left_column, db_type),
                scope[right],
                quote_identifier(&join.right_column, db_type)
            ));
        }

        let names = self.output_names();
        let mut seen = HashSet::new();
        if let Some(name) = names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(self.error(format!(
                "output alias '{}' is ambiguous; two columns would share it",
                name
            )));
        }

        let mut select_list = Vec::with_capacity(self.columns.len());
        for (column, name) in self.columns.iter().zip(&names) {
            let Some(alias) = scope.get(column.table.name.as_str()) else {
                return Err(self.error(format!(
                    "column '{}.{}' belongs to a table that is never joined",
                    column.table.name, column.name
                )));
            };
            select_list.push(format!(
                "{}.{} AS {}",
                alias,
                quote_identifier(&column.name, db_type),
                quote_identifier(name, db_type)
            ));
        }

        let mut sql = format!(
            "SELECT {} FROM {} AS t0",
            select_list.join(", "),
            quote_identifier(&first.table.name, db_type)
        );
        for clause in join_clauses {
            sql.push(' ');
            sql.push_str(&clause);
        }

        Ok(sql)
    }

    fn check_identifiers(&self) -> ExportResult<()> {
        let identifiers = self
            .columns
            .iter()
            .flat_map(|c| [c.table.name.as_str(), c.name.as_str()])
            .chain(self.joins.iter().flat_map(|j| {
                [
                    j.left_table.name.as_str(),
                    j.left_column.as_str(),
                    j.right_table.name.as_str(),
                    j.right_column.as_str(),
                ]
            }));

        for ident in identifiers {
            if !is_identifier(ident) {
                return Err(self.error(format!("'{}' is not a valid SQL identifier", ident)));
            }
        }
        Ok(())
    }

    fn check_columns(&self) -> ExportResult<()> {
        let mut indices = HashSet::new();
        let mut names = HashSet::new();
        for column in &self.columns {
            if !indices.insert((column.table.name.as_str(), column.index)) {
                return Err(self.error(format!(
                    "duplicate column index {} in table '{}'",
                    column.index, column.table.name
                )));
            }
            if !names.insert((column.table.name.as_str(), column.name.as_str())) {
                return Err(self.error(format!(
                    "column '{}.{}' is selected twice",
                    column.table.name, column.name
                )));
            }
        }
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> ExportError {
        ExportError::configuration(message, format!("query '{}'", self.name))
    }
}

/// Quote a checked identifier. Identifiers never contain quote characters.
fn quote_identifier(ident: &str, db_type: DatabaseType) -> String {
    match db_type {
        DatabaseType::MySQL => format!("`{}`", ident),
        DatabaseType::PostgreSQL | DatabaseType::SQLite => format!("\"{}\"", ident),
    }
}

/// Plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
