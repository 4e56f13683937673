//! SQLite sink

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{
    params, params_from_iter, Connection, OpenFlags, OptionalExtension, ToSql, Transaction,
    TransactionBehavior,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabload_common::{Batch, Value, TIMESTAMP_FORMAT};
use tracing::{debug, warn};

use super::{LoadState, LoadStatus, TableSink, WriteMode, RUNS_TABLE};
use crate::error::{IngestError, Result};

/// A single-file SQLite database
pub struct SqliteSink {
    conn: Connection,
    path: Option<PathBuf>,
}

/// First rows of a table, rendered as text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePreview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SqliteSink {
    /// Open (or create) the database at `path`, creating its parent
    /// directory when missing
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                IngestError::sink_write(format!(
                    "cannot create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        init_schema(&conn)?;

        debug!(path = %path.display(), "Opened SQLite sink");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an existing database for inspection. Nothing is created, and the
    /// bookkeeping table may be absent.
    pub fn open_read_only(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;

        debug!(path = %path.display(), "Opened SQLite sink read-only");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Database file, `None` for in-memory sinks
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// First `limit` rows of `table`
    pub fn preview(&self, table: &str, limit: usize) -> Result<TablePreview> {
        let sql = format!("SELECT * FROM {} LIMIT ?1", quote_ident(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(render))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(TablePreview { columns, rows })
    }

    /// Bookkeeping row for `table`, if it was ever loaded
    pub fn load_status(&self, table: &str) -> Result<Option<LoadStatus>> {
        if !self.table_exists(RUNS_TABLE)? {
            return Ok(None);
        }

        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT run_id, state, batches, rows, started_at, updated_at \
                     FROM {} WHERE table_name = ?1",
                    RUNS_TABLE
                ),
                params![table],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(run_id, state, batches, rows, started_at, updated_at)| -> Result<LoadStatus> {
            Ok(LoadStatus {
                table_name: table.to_string(),
                run_id,
                state: state.parse::<LoadState>()?,
                batches: batches.max(0) as u64,
                rows: rows.max(0) as u64,
                started_at,
                updated_at,
            })
        })
        .transpose()
    }
}

impl TableSink for SqliteSink {
    fn claim_table(&mut self, table: &str, run_id: &str, force: bool) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some((owner, state)) = current_owner(&tx, table)? {
            if state == LoadState::Loading && owner != run_id {
                if !force {
                    return Err(IngestError::ConcurrentRun {
                        table: table.to_string(),
                        run_id: owner,
                    });
                }
                warn!(table, previous_run = %owner, "Taking over table left in loading state");
            }
        }

        tx.execute(
            &format!(
                "INSERT INTO {} (table_name, run_id, state, batches, rows, started_at, updated_at) \
                 VALUES (?1, ?2, ?3, 0, 0, datetime('now'), datetime('now')) \
                 ON CONFLICT(table_name) DO UPDATE SET \
                    run_id = excluded.run_id, state = excluded.state, batches = 0, rows = 0, \
                    started_at = excluded.started_at, updated_at = excluded.updated_at",
                RUNS_TABLE
            ),
            params![table, run_id, LoadState::Loading.as_str()],
        )?;
        tx.commit()?;

        debug!(table, run_id, "Claimed table");
        Ok(())
    }

    fn write_batch(
        &mut self,
        table: &str,
        run_id: &str,
        batch: &Batch,
        mode: WriteMode,
    ) -> Result<u64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        ensure_owner(&tx, table, run_id)?;

        let quoted = quote_ident(table);
        let columns: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect();

        if mode == WriteMode::Replace {
            let definitions: Vec<String> = batch
                .schema()
                .fields()
                .iter()
                .map(|f| format!("{} {}", quote_ident(&f.name), f.data_type.sql_type()))
                .collect();
            tx.execute_batch(&format!(
                "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({defs});",
                table = quoted,
                defs = definitions.join(", ")
            ))?;
            debug!(table, schema = %batch.schema(), "Recreated table");
        }

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quoted,
            columns.join(", "),
            placeholders
        );

        let mut written = 0u64;
        {
            let mut stmt = tx.prepare(&insert)?;
            for row in batch.rows() {
                stmt.execute(params_from_iter(row.iter().map(SqlValue)))?;
                written += 1;
            }
        }

        tx.execute(
            &format!(
                "UPDATE {} SET batches = batches + 1, rows = rows + ?1, updated_at = datetime('now') \
                 WHERE table_name = ?2 AND run_id = ?3",
                RUNS_TABLE
            ),
            params![written as i64, table, run_id],
        )?;
        tx.commit()?;

        Ok(written)
    }

    fn count_rows(&self, table: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn mark_load_state(&mut self, table: &str, run_id: &str, state: LoadState) -> Result<()> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET state = ?1, updated_at = datetime('now') \
                 WHERE table_name = ?2 AND run_id = ?3",
                RUNS_TABLE
            ),
            params![state.as_str(), table, run_id],
        )?;

        if updated == 0 {
            return Err(IngestError::sink_write(format!(
                "run {} no longer owns table '{}'",
                run_id, table
            )));
        }

        debug!(table, run_id, state = %state, "Updated load state");
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        &format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                table_name TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                state TEXT NOT NULL,
                batches INTEGER NOT NULL DEFAULT 0,
                rows INTEGER NOT NULL DEFAULT 0,
                started_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            RUNS_TABLE
        ),
        [],
    )?;
    Ok(())
}

fn current_owner(tx: &Transaction<'_>, table: &str) -> Result<Option<(String, LoadState)>> {
    let row = tx
        .query_row(
            &format!("SELECT run_id, state FROM {} WHERE table_name = ?1", RUNS_TABLE),
            params![table],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    row.map(|(run_id, state)| -> Result<(String, LoadState)> {
        Ok((run_id, state.parse::<LoadState>()?))
    })
    .transpose()
}

/// The run must still hold the table in `loading` state
fn ensure_owner(tx: &Transaction<'_>, table: &str, run_id: &str) -> Result<()> {
    match current_owner(tx, table)? {
        Some((owner, LoadState::Loading)) if owner == run_id => Ok(()),
        Some((owner, _)) if owner != run_id => Err(IngestError::ConcurrentRun {
            table: table.to_string(),
            run_id: owner,
        }),
        Some((_, state)) => Err(IngestError::sink_write(format!(
            "table '{}' is {}, not loading",
            table, state
        ))),
        None => Err(IngestError::sink_write(format!(
            "table '{}' was not claimed before writing",
            table
        ))),
    }
}

/// Double-quote an identifier for SQLite
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn render(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

struct SqlValue<'a>(&'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;

        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Integer(v) => ToSqlOutput::Owned(Sql::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(Sql::Real(*v)),
            Value::Boolean(v) => ToSqlOutput::Owned(Sql::Integer(i64::from(*v))),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Timestamp(v) => {
                ToSqlOutput::Owned(Sql::Text(v.format(TIMESTAMP_FORMAT).to_string()))
            }
        })
    }
}
