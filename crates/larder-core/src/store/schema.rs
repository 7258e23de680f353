//! Hot-store schema for the archiver.
//!
//! - `*_raw_data` tables hold raw provider records, one table per provider
//! - `*_aggregated` tables hold derived per-location summaries; the archiver
//!   only reads them
//! - `store_meta` tracks the schema version alongside `PRAGMA user_version`
//!
//! Instants are stored as integer microseconds since the Unix epoch in UTC.
//! Payloads are stored as JSON text and never interpreted by the archiver.

/// Migration v1: raw and aggregate tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS bork_raw_data (
    record_id TEXT PRIMARY KEY,
    endpoint TEXT,
    location_ref TEXT,
    recorded_at_us INTEGER NOT NULL,
    payload_json TEXT NOT NULL CHECK (json_valid(payload_json))
);

CREATE TABLE IF NOT EXISTS eitje_raw_data (
    record_id TEXT PRIMARY KEY,
    endpoint TEXT,
    location_ref TEXT,
    recorded_at_us INTEGER NOT NULL,
    payload_json TEXT NOT NULL CHECK (json_valid(payload_json))
);

CREATE TABLE IF NOT EXISTS bork_sales_aggregated (
    record_id TEXT PRIMARY KEY,
    location_ref TEXT NOT NULL,
    window_date_us INTEGER NOT NULL,
    payload_json TEXT NOT NULL CHECK (json_valid(payload_json))
);

CREATE TABLE IF NOT EXISTS eitje_labor_aggregated (
    record_id TEXT PRIMARY KEY,
    location_ref TEXT NOT NULL,
    window_date_us INTEGER NOT NULL,
    payload_json TEXT NOT NULL CHECK (json_valid(payload_json))
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_archive_run_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, last_archive_run_at_us)
VALUES (1, 1, 0);
";

/// Migration v2: indexes for the locator and the aggregate window fetch.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_bork_raw_recorded
    ON bork_raw_data(recorded_at_us, record_id);

CREATE INDEX IF NOT EXISTS idx_eitje_raw_recorded
    ON eitje_raw_data(recorded_at_us, record_id);

CREATE INDEX IF NOT EXISTS idx_bork_agg_location_date
    ON bork_sales_aggregated(location_ref, window_date_us);

CREATE INDEX IF NOT EXISTS idx_eitje_agg_location_date
    ON eitje_labor_aggregated(location_ref, window_date_us);
";

/// Indexes expected after all migrations have run.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_bork_raw_recorded",
    "idx_eitje_raw_recorded",
    "idx_bork_agg_location_date",
    "idx_eitje_agg_location_date",
];
