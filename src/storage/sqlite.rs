//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::FrontierEntry;
use crate::output::{DomainSummary, ProductMatch};
use crate::state::UrlOutcome;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use crate::url::{CanonicalUrl, Domain};
use crate::ScoutError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ScoutError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ScoutError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, ScoutError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

fn restore_url(raw: &str) -> StorageResult<CanonicalUrl> {
    CanonicalUrl::restore(raw).map_err(|e| StorageError::CorruptRecord(format!("{}: {}", raw, e)))
}

fn restore_optional_url(raw: Option<String>) -> StorageResult<Option<CanonicalUrl>> {
    raw.as_deref().map(restore_url).transpose()
}

fn restore_time(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRecord(format!("timestamp {}: {}", raw, e)))
}

fn write_frontier(conn: &Connection, entries: &[FrontierEntry]) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM frontier", [])?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO frontier
         (url, domain, priority, discovered_at, attempt_count, depth, found_on)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for entry in entries {
        stmt.execute(params![
            entry.url.as_str(),
            entry.domain.as_str(),
            entry.priority,
            entry.discovered_at.to_rfc3339(),
            entry.attempt_count,
            entry.depth,
            entry.found_on.as_ref().map(|url| url.as_str()),
        ])?;
    }
    Ok(())
}

fn write_dedup(conn: &Connection, records: &[(CanonicalUrl, UrlOutcome)]) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM dedup", [])?;
    let mut stmt = conn.prepare("INSERT OR REPLACE INTO dedup (url, outcome) VALUES (?1, ?2)")?;
    for (url, outcome) in records {
        stmt.execute(params![url.as_str(), outcome.to_db_string()])?;
    }
    Ok(())
}

fn write_domain_stats(conn: &Connection, stats: &[DomainSummary]) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM domain_stats", [])?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO domain_stats
         (domain, dispatched, succeeded, failed, blocked, products, pending)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for domain in stats {
        stmt.execute(params![
            domain.domain.as_str(),
            domain.dispatched as i64,
            domain.succeeded as i64,
            domain.failed as i64,
            domain.blocked as i64,
            domain.products as i64,
            domain.pending as i64,
        ])?;
    }
    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Snapshots =====

    fn save_snapshot(
        &mut self,
        entries: &[FrontierEntry],
        records: &[(CanonicalUrl, UrlOutcome)],
        stats: &[DomainSummary],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        write_frontier(&tx, entries)?;
        write_dedup(&tx, records)?;
        write_domain_stats(&tx, stats)?;
        tx.commit()?;
        Ok(())
    }

    fn load_frontier(&self) -> StorageResult<Vec<FrontierEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, domain, priority, discovered_at, attempt_count, depth, found_on
             FROM frontier ORDER BY priority DESC, discovered_at ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, domain, priority, discovered_at, attempt_count, depth, found_on)| {
                Ok(FrontierEntry {
                    url: restore_url(&url)?,
                    domain: Domain::new(domain),
                    priority,
                    discovered_at: restore_time(&discovered_at)?,
                    attempt_count,
                    depth,
                    found_on: restore_optional_url(found_on)?,
                })
            })
            .collect()
    }

    fn load_dedup(&self) -> StorageResult<Vec<(CanonicalUrl, UrlOutcome)>> {
        let mut stmt = self.conn.prepare("SELECT url, outcome FROM dedup")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, outcome)| {
                let outcome = UrlOutcome::from_db_string(&outcome)
                    .ok_or_else(|| StorageError::CorruptRecord(format!("outcome {} for {}", outcome, url)))?;
                Ok((restore_url(&url)?, outcome))
            })
            .collect()
    }

    fn load_domain_stats(&self) -> StorageResult<Vec<DomainSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, dispatched, succeeded, failed, blocked, products, pending
             FROM domain_stats ORDER BY domain",
        )?;

        let stats = stmt
            .query_map([], |row| {
                Ok(DomainSummary {
                    domain: Domain::new(row.get::<_, String>(0)?),
                    dispatched: row.get::<_, i64>(1)? as u64,
                    succeeded: row.get::<_, i64>(2)? as u64,
                    failed: row.get::<_, i64>(3)? as u64,
                    blocked: row.get::<_, i64>(4)? as u64,
                    products: row.get::<_, i64>(5)? as u64,
                    pending: row.get::<_, i64>(6)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stats)
    }

    fn reset_crawl_state(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM frontier;
            DELETE FROM dedup;
            DELETE FROM domain_stats;
        ",
        )?;
        Ok(())
    }

    // ===== Product Log =====

    fn append_product(&mut self, run_id: i64, product: &ProductMatch) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO products (seq, run_id, url, domain, pattern, found_on, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                product.seq as i64,
                run_id,
                product.url.as_str(),
                product.domain.as_str(),
                product.pattern,
                product.found_on.as_ref().map(|url| url.as_str()),
                product.discovered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn products_after(&self, seq: u64) -> StorageResult<Vec<ProductMatch>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, url, domain, pattern, found_on, discovered_at
             FROM products WHERE seq > ?1 ORDER BY seq",
        )?;

        let rows = stmt
            .query_map(params![seq as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, url, domain, pattern, found_on, discovered_at)| {
                Ok(ProductMatch {
                    seq: seq as u64,
                    url: restore_url(&url)?,
                    domain: Domain::new(domain),
                    pattern,
                    found_on: restore_optional_url(found_on)?,
                    discovered_at: restore_time(&discovered_at)?,
                })
            })
            .collect()
    }

    fn last_product_seq(&self) -> StorageResult<u64> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM products", [], |row| row.get(0))?;
        Ok(seq.unwrap_or(0) as u64)
    }

    // ===== Statistics =====

    fn count_by_outcome(&self) -> StorageResult<HashMap<UrlOutcome, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT outcome, COUNT(*) FROM dedup GROUP BY outcome")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (outcome, count) = row?;
            if let Some(outcome) = UrlOutcome::from_db_string(&outcome) {
                counts.insert(outcome, count as u64);
            }
        }

        Ok(counts)
    }

    fn count_frontier(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM frontier", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_products_by_domain(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, COUNT(*) AS n FROM products GROUP BY domain ORDER BY n DESC, domain ASC",
        )?;

        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }
}
