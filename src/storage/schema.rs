//! Database schema definitions
//!
//! Every table is keyed by the canonical URL string (or the domain) so a
//! snapshot can be rewritten wholesale inside one transaction.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Frontier snapshot: URLs waiting to be fetched
CREATE TABLE IF NOT EXISTS frontier (
    url TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    priority INTEGER NOT NULL,
    discovered_at TEXT NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    depth INTEGER NOT NULL DEFAULT 0,
    found_on TEXT
);

CREATE INDEX IF NOT EXISTS idx_frontier_domain ON frontier(domain);

-- Dedup snapshot: every claimed URL and its outcome
CREATE TABLE IF NOT EXISTS dedup (
    url TEXT PRIMARY KEY,
    outcome TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dedup_outcome ON dedup(outcome);

-- Append-only product log; seq is the sink checkpoint
CREATE TABLE IF NOT EXISTS products (
    seq INTEGER PRIMARY KEY,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    url TEXT NOT NULL,
    domain TEXT NOT NULL,
    pattern TEXT NOT NULL,
    found_on TEXT,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_domain ON products(domain);

-- Per-domain counters, carried across resumed runs
CREATE TABLE IF NOT EXISTS domain_stats (
    domain TEXT PRIMARY KEY,
    dispatched INTEGER NOT NULL DEFAULT 0,
    succeeded INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    blocked INTEGER NOT NULL DEFAULT 0,
    products INTEGER NOT NULL DEFAULT 0,
    pending INTEGER NOT NULL DEFAULT 0
);
"#;

/// Initializes the database schema
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
