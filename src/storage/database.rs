//! Read-only SQLite access to the faculty table
//!
//! The table is created and filled by the load pipeline; this side only
//! opens the file, checks the table is there, and reads rows.

use crate::error::{FinderError, Result};
use crate::storage::{FacultyDetail, FacultyStore, IndexableText};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params_from_iter, OpenFlags, Row};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// SQLite caps bound parameters per statement; id lookups are split below it
const MAX_IDS_PER_QUERY: usize = 500;

/// Rows with embedding text; blank or whitespace-only text never reaches the model
const HAS_EMBEDDING_TEXT: &str = "bio_text_clean IS NOT NULL
    AND TRIM(bio_text_clean, ' ' || char(9) || char(10) || char(11) || char(12) || char(13)) != ''";

/// Faculty database handle backed by a pool of read-only connections
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open an existing faculty database
    ///
    /// Fails when the file is missing or has no `faculty` table; the store is
    /// a start-up dependency, not something to create here.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(FinderError::StoreUnavailable(format!(
                "Database file not found: {}",
                db_path.display()
            )));
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .with_init(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA query_only = ON;
                    PRAGMA busy_timeout = 5000;
                    ",
                )
            });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| {
                FinderError::StoreUnavailable(format!("Failed to create connection pool: {}", e))
            })?;

        let db = Self { pool };
        db.check_schema()?;

        tracing::debug!("Opened faculty database at {}", db_path.display());

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| FinderError::StoreUnavailable(format!("Failed to get connection: {}", e)))
    }

    fn check_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'faculty'",
            [],
            |row| row.get(0),
        )?;

        if count == 0 {
            return Err(FinderError::StoreUnavailable(
                "Table 'faculty' does not exist".to_string(),
            ));
        }

        Ok(())
    }

    /// Get row counts for status output
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let faculty_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM faculty", [], |row| row.get(0))?;

        drop(conn);

        let indexable_count = self.fetch_indexable()?.len();

        Ok(DbStats {
            faculty_count: faculty_count as usize,
            indexable_count,
        })
    }
}

fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<FacultyDetail> {
    Ok(FacultyDetail {
        id: row.get(0)?,
        name: row.get(1)?,
        department: row.get(2)?,
        bio: row.get(3)?,
        research_interests: row.get(4)?,
        education: row.get(5)?,
        profile_url: row.get(6)?,
        image_url: row.get(7)?,
    })
}

impl FacultyStore for Database {
    fn fetch_indexable(&self) -> Result<Vec<IndexableText>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, bio_text_clean FROM faculty WHERE {} ORDER BY id",
            HAS_EMBEDDING_TEXT
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(IndexableText {
                    id: row.get(0)?,
                    text: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // SQLite's TRIM misses Unicode whitespace; the embedder rejects it too
        Ok(rows
            .into_iter()
            .filter(|row| !row.text.trim().is_empty())
            .collect())
    }

    fn fetch_details(&self, ids: &[i64]) -> Result<Vec<FacultyDetail>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let mut details = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT id, name, department, bio, research_interests, education, profile_url, image_url
                 FROM faculty WHERE id IN ({})",
                placeholders
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), detail_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            details.extend(rows);
        }

        Ok(details)
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub faculty_count: usize,
    pub indexable_count: usize,
}
