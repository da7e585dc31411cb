//! Relational persistence
//!
//! Writes a table into a named SQLite table under a conflict policy. Every
//! call runs inside a single IMMEDIATE transaction: writers to the same
//! database serialize, and either all rows commit or none do.

use crate::error::{Result, VisualdataError};
use crate::table::{self, Cell, ColumnKind};
use polars::prelude::DataFrame;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Behavior when the target table already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Error with `ConflictError`
    Fail,
    /// Drop and recreate atomically
    Replace,
    /// Insert after a column-set compatibility check
    Append,
}

impl std::fmt::Display for IfExists {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IfExists::Fail => write!(f, "fail"),
            IfExists::Replace => write!(f, "replace"),
            IfExists::Append => write!(f, "append"),
        }
    }
}

/// SQLite-backed table store
pub struct SqliteStore {
    path: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if absent) the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    VisualdataError::StorageError(format!("cannot create database dir: {e}"))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the frame into `table_name` under the given policy.
    /// Returns the number of rows written.
    pub fn save(&mut self, df: &DataFrame, table_name: &str, if_exists: IfExists) -> Result<usize> {
        if table_name.trim().is_empty() {
            return Err(VisualdataError::SchemaError(
                "table name must not be empty".to_string(),
            ));
        }

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let kinds: Vec<ColumnKind> = df
            .get_columns()
            .iter()
            .map(|c| ColumnKind::of(c.dtype()))
            .collect();
        let columns = table::frame_cells(df)?;
        let n_rows = df.height();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table_name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        match (exists, if_exists) {
            (true, IfExists::Fail) => {
                return Err(VisualdataError::ConflictError(format!(
                    "table '{table_name}' already exists"
                )));
            }
            (true, IfExists::Replace) => {
                tx.execute_batch(&format!("DROP TABLE {}", quote_ident(table_name)))?;
                tx.execute_batch(&create_table_sql(table_name, &names, &kinds))?;
            }
            (true, IfExists::Append) => {
                let mut existing = existing_columns(&tx, table_name)?;
                let mut incoming = names.clone();
                existing.sort();
                incoming.sort();
                if existing != incoming {
                    return Err(VisualdataError::SchemaError(format!(
                        "table '{table_name}' has columns [{}], incoming data has [{}]",
                        existing.join(", "),
                        incoming.join(", ")
                    )));
                }
            }
            (false, _) => {
                tx.execute_batch(&create_table_sql(table_name, &names, &kinds))?;
            }
        }

        {
            let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
            let insert_sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table_name),
                names.iter().map(|n| quote_ident(n)).collect::<Vec<_>>().join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare(&insert_sql)?;
            for i in 0..n_rows {
                let row: Vec<SqlValue> = columns.iter().map(|col| cell_to_sql(&col[i])).collect();
                stmt.execute(params_from_iter(row))?;
            }
        }

        tx.commit()?;
        info!(
            table = table_name,
            rows = n_rows,
            policy = %if_exists,
            db = %self.path.display(),
            "table persisted"
        );
        Ok(n_rows)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Numeric => "REAL",
        ColumnKind::Boolean => "INTEGER",
        ColumnKind::Categorical | ColumnKind::Datetime => "TEXT",
    }
}

fn create_table_sql(table_name: &str, names: &[String], kinds: &[ColumnKind]) -> String {
    let columns: Vec<String> = names
        .iter()
        .zip(kinds.iter())
        .map(|(name, &kind)| format!("{} {}", quote_ident(name), sql_type(kind)))
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        quote_ident(table_name),
        columns.join(", ")
    )
}

fn existing_columns(tx: &rusqlite::Transaction<'_>, table_name: &str) -> Result<Vec<String>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table_name));
    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut names = Vec::new();
    for name in rows {
        names.push(name?);
    }
    Ok(names)
}

fn cell_to_sql(cell: &Cell) -> SqlValue {
    match cell {
        Cell::Null => SqlValue::Null,
        Cell::Float(v) => SqlValue::Real(*v),
        Cell::Int(v) => SqlValue::Integer(*v),
        Cell::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Cell::Str(v) => SqlValue::Text(v.clone()),
        Cell::Datetime(_) => SqlValue::Text(cell.render()),
    }
}
