//! Table dumps: the plaintext content of a backup.
//!
//! Rows are captured column-by-column as typed `Cell`s, so a dump restores
//! byte-for-byte without the backup code knowing any table's shape.

use rusqlite::{
    params_from_iter,
    types::{Value, ValueRef},
    Connection,
};
use serde::{Deserialize, Serialize};

use sealbook_contracts::{
    backup::BackupTable,
    error::{SealError, SealResult},
};
use sealbook_core::StorageResultExt;

/// One stored value.  Blobs travel as hex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(String),
}

impl Cell {
    fn from_ref(value: ValueRef<'_>) -> SealResult<Self> {
        Ok(match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(i) => Cell::Integer(i),
            ValueRef::Real(f) => Cell::Real(f),
            ValueRef::Text(bytes) => Cell::Text(
                std::str::from_utf8(bytes)
                    .map_err(|e| SealError::Serialization {
                        reason: format!("non UTF-8 text in table dump: {e}"),
                    })?
                    .to_string(),
            ),
            ValueRef::Blob(bytes) => Cell::Blob(hex::encode(bytes)),
        })
    }

    fn into_value(self) -> SealResult<Value> {
        Ok(match self {
            Cell::Null => Value::Null,
            Cell::Integer(i) => Value::Integer(i),
            Cell::Real(f) => Value::Real(f),
            Cell::Text(s) => Value::Text(s),
            Cell::Blob(h) => Value::Blob(hex::decode(&h).map_err(|e| {
                SealError::InvalidArtifact {
                    reason: format!("blob cell is not hex: {e}"),
                }
            })?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDump {
    pub table: BackupTable,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Everything a backup carries, in insert order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub schema_version: u32,
    pub tables: Vec<TableDump>,
}

impl Dataset {
    pub fn row_count(&self) -> u64 {
        self.tables.iter().map(|t| t.rows.len() as u64).sum()
    }

    pub fn table_list(&self) -> Vec<BackupTable> {
        self.tables.iter().map(|t| t.table).collect()
    }
}

/// Dump every row of `table` in rowid order.
pub fn dump_table(conn: &Connection, table: BackupTable) -> SealResult<TableDump> {
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {} ORDER BY rowid", table.table_name()))
        .storage()?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([]).storage()?;
    while let Some(row) = cursor.next().storage()? {
        let mut cells = Vec::with_capacity(width);
        for idx in 0..width {
            cells.push(Cell::from_ref(row.get_ref(idx).storage()?)?);
        }
        rows.push(cells);
    }

    Ok(TableDump {
        table,
        columns,
        rows,
    })
}

/// Remove every row of `table`.  The guards must already be lifted.
pub fn clear_table(conn: &Connection, table: BackupTable) -> SealResult<usize> {
    conn.execute(&format!("DELETE FROM {}", table.table_name()), [])
        .storage()
}

/// Insert every row of `dump`.
pub fn load_table(conn: &Connection, dump: TableDump) -> SealResult<usize> {
    let name = dump.table.table_name();
    if dump.columns.is_empty() {
        return Err(SealError::InvalidArtifact {
            reason: format!("dump of {name} has no columns"),
        });
    }

    // Column names come from the artifact and are spliced into SQL.
    if let Some(bad) = dump
        .columns
        .iter()
        .find(|c| c.is_empty() || !c.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_'))
    {
        return Err(SealError::InvalidArtifact {
            reason: format!("dump of {name} has an invalid column name '{bad}'"),
        });
    }

    let placeholders = vec!["?"; dump.columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {name} ({}) VALUES ({placeholders})",
        dump.columns.join(", ")
    );
    let mut stmt = conn.prepare(&sql).storage()?;

    let width = dump.columns.len();
    let mut inserted = 0;
    for (idx, row) in dump.rows.into_iter().enumerate() {
        if row.len() != width {
            return Err(SealError::InvalidArtifact {
                reason: format!(
                    "row {idx} of {name} has {} cells, expected {width}",
                    row.len()
                ),
            });
        }
        let values = row
            .into_iter()
            .map(Cell::into_value)
            .collect::<SealResult<Vec<_>>>()?;
        stmt.execute(params_from_iter(values)).storage()?;
        inserted += 1;
    }
    Ok(inserted)
}
