use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::domain::LedgerRow;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("entry already exists for this date, identifier and item")]
    DuplicateEntry,
}

/// Append-only system of record for submissions. Also serves duplicate
/// lookups, so uniqueness of the dedup key is enforced here rather than
/// in pipeline logic.
pub trait Ledger: Send {
    /// Look up the row matching the dedup key, if any.
    fn find_entry(
        &self,
        entry_date: &str,
        identifier: &str,
        item_category: &str,
    ) -> Result<Option<LedgerRow>, LedgerError>;

    /// Append one row. A dedup-key collision maps to `DuplicateEntry`;
    /// this is the backstop that closes the check-then-append race.
    fn append(&self, row: &LedgerRow) -> Result<(), LedgerError>;

    fn count_entries(&self) -> Result<usize, LedgerError>;
}

pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS receipts (
                id TEXT PRIMARY KEY,
                entry_date TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                submitter_name TEXT NOT NULL,
                identifier TEXT NOT NULL,
                item_category TEXT NOT NULL,
                submitter_email TEXT NOT NULL,
                artifact_filename TEXT NOT NULL,
                artifact_url TEXT NOT NULL,
                content_hash TEXT
            )",
            [],
        )?;

        // The dedup key. Two concurrent submissions can both pass the
        // pre-check; this index decides the winner.
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_dedup_key
             ON receipts(entry_date, identifier, item_category)",
            [],
        )?;

        Ok(())
    }

    fn row_from_sql(row: &rusqlite::Row) -> Result<LedgerRow, rusqlite::Error> {
        Ok(LedgerRow {
            id: row.get(0)?,
            entry_date: row.get(1)?,
            entry_time: row.get(2)?,
            submitter_name: row.get(3)?,
            identifier: row.get(4)?,
            item_category: row.get(5)?,
            submitter_email: row.get(6)?,
            artifact_filename: row.get(7)?,
            artifact_url: row.get(8)?,
            content_hash: row.get(9)?,
        })
    }
}

impl Ledger for SqliteLedger {
    fn find_entry(
        &self,
        entry_date: &str,
        identifier: &str,
        item_category: &str,
    ) -> Result<Option<LedgerRow>, LedgerError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, entry_date, entry_time, submitter_name, identifier,
                        item_category, submitter_email, artifact_filename,
                        artifact_url, content_hash
                 FROM receipts
                 WHERE entry_date = ?1 AND identifier = ?2 AND item_category = ?3",
                params![entry_date, identifier, item_category],
                Self::row_from_sql,
            )
            .optional()?;

        Ok(row)
    }

    fn append(&self, row: &LedgerRow) -> Result<(), LedgerError> {
        match self.conn.execute(
            "INSERT INTO receipts (id, entry_date, entry_time, submitter_name,
                                   identifier, item_category, submitter_email,
                                   artifact_filename, artifact_url, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &row.id,
                &row.entry_date,
                &row.entry_time,
                &row.submitter_name,
                &row.identifier,
                &row.item_category,
                &row.submitter_email,
                &row.artifact_filename,
                &row.artifact_url,
                &row.content_hash,
            ],
        ) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _)) => {
                if err.code == rusqlite::ErrorCode::ConstraintViolation {
                    Err(LedgerError::DuplicateEntry)
                } else {
                    Err(rusqlite::Error::SqliteFailure(err, None).into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn count_entries(&self) -> Result<usize, LedgerError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
