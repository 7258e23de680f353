use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params, types::Type};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use super::{DEFAULT_BUSY_TIMEOUT, HotStore, migrations};
use crate::model::{AggregatedRecord, Provider, RawRecord, RecordId};

/// SQLite-backed hot store.
#[derive(Debug)]
pub struct SqliteHotStore {
    conn: Connection,
}

impl SqliteHotStore {
    /// Open (or create) the hot-store database, apply runtime pragmas, and
    /// migrate the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, configuring, or migrating fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create hot store directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("open hot store {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Open an existing hot-store database without creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be migrated.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("hot store {} does not exist", path.display());
        }
        Self::open(path)
    }

    /// Open an existing hot-store database for reading only.
    ///
    /// No pragma is written and no migration runs, so the database file is
    /// left exactly as found. Used for dry runs and previews.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be opened, or its
    /// schema is not at [`migrations::LATEST_SCHEMA_VERSION`].
    pub fn open_read_only(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("hot store {} does not exist", path.display());
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open hot store {} read-only", path.display()))?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
            .context("configure busy timeout")?;

        let version =
            migrations::current_schema_version(&conn).context("read hot store schema version")?;
        if version != migrations::LATEST_SCHEMA_VERSION {
            anyhow::bail!(
                "hot store {} is at schema v{version}, expected v{}; run `larder init` to migrate",
                path.display(),
                migrations::LATEST_SCHEMA_VERSION
            );
        }
        Ok(Self { conn })
    }

    /// In-memory store, used by tests and dry experiments.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory().context("open in-memory hot store")?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply hot store migrations")?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert or replace a raw record. Used by ingestion fixtures.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_raw(&self, record: &RawRecord) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (record_id, endpoint, location_ref, recorded_at_us, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            record.provider.tables().raw
        );
        self.conn
            .execute(
                &sql,
                params![
                    record.id.as_str(),
                    record.endpoint,
                    record.location,
                    record.timestamp.timestamp_micros(),
                    serde_json::to_string(&record.payload)?,
                ],
            )
            .with_context(|| format!("insert raw record {}", record.id))?;
        Ok(())
    }

    /// Insert or replace an aggregate record for `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_aggregate(&self, provider: Provider, record: &AggregatedRecord) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (record_id, location_ref, window_date_us, payload_json)
             VALUES (?1, ?2, ?3, ?4)",
            provider.tables().aggregated
        );
        self.conn
            .execute(
                &sql,
                params![
                    record.id.as_str(),
                    record.location,
                    record.date.timestamp_micros(),
                    serde_json::to_string(&record.payload)?,
                ],
            )
            .with_context(|| format!("insert aggregate record {}", record.id))?;
        Ok(())
    }

    /// Number of raw records currently stored for `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn count_raw(&self, provider: Provider) -> Result<usize> {
        self.count(provider.tables().raw)
    }

    /// Number of aggregate records currently stored for `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn count_aggregates(&self, provider: Provider) -> Result<usize> {
        self.count(provider.tables().aggregated)
    }

    /// Whether a raw record with `id` is still present.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn contains_raw(&self, provider: Provider, id: &RecordId) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE record_id = ?1",
            provider.tables().raw
        );
        let found: Option<i64> = self
            .conn
            .query_row(&sql, [id.as_str()], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Stamp the time of the last completed archive run.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata row cannot be updated.
    pub fn record_run(&self, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE store_meta SET last_archive_run_at_us = ?1 WHERE id = 1",
                [at.timestamp_micros()],
            )
            .context("update store_meta")?;
        Ok(())
    }

    fn count(&self, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .with_context(|| format!("count rows in {table}"))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl HotStore for SqliteHotStore {
    fn find_stale(&self, provider: Provider, cutoff: DateTime<Utc>) -> Result<Vec<RawRecord>> {
        let table = provider.tables().raw;
        debug!(%provider, %cutoff, table, "querying stale raw records");

        let sql = format!(
            "SELECT record_id, endpoint, location_ref, recorded_at_us, payload_json
             FROM {table}
             WHERE recorded_at_us < ?1
             ORDER BY recorded_at_us, record_id"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("prepare stale query on {table}"))?;
        let rows = stmt
            .query_map([cutoff.timestamp_micros()], |row| raw_from_row(provider, row))
            .with_context(|| format!("query stale rows in {table}"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("decode stale rows in {table}"))
    }

    fn find_aggregates(
        &self,
        provider: Provider,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregatedRecord>> {
        let table = provider.tables().aggregated;
        debug!(%provider, location, %start, %end, table, "querying aggregate window");

        let sql = format!(
            "SELECT record_id, location_ref, window_date_us, payload_json
             FROM {table}
             WHERE location_ref = ?1 AND window_date_us BETWEEN ?2 AND ?3
             ORDER BY window_date_us, record_id"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("prepare aggregate query on {table}"))?;
        let rows = stmt
            .query_map(
                params![location, start.timestamp_micros(), end.timestamp_micros()],
                aggregate_from_row,
            )
            .with_context(|| format!("query aggregate rows in {table}"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("decode aggregate rows in {table}"))
    }

    fn delete_raw(&self, provider: Provider, ids: &[RecordId]) -> Result<usize> {
        let table = provider.tables().raw;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin prune transaction")?;

        let mut deleted = 0;
        {
            let sql = format!("DELETE FROM {table} WHERE record_id = ?1");
            let mut stmt = tx
                .prepare(&sql)
                .with_context(|| format!("prepare delete on {table}"))?;
            for id in ids {
                deleted += stmt
                    .execute([id.as_str()])
                    .with_context(|| format!("delete {id} from {table}"))?;
            }
        }

        tx.commit().context("commit prune transaction")?;
        Ok(deleted)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn instant_from_micros(column: usize, us: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp {us}us out of range").into(),
        )
    })
}

fn payload_from_text(column: usize, text: &str) -> rusqlite::Result<Value> {
    serde_json::from_str(text)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

fn raw_from_row(provider: Provider, row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    let id: String = row.get(0)?;
    let payload: String = row.get(4)?;
    Ok(RawRecord {
        id: RecordId::new(id),
        provider,
        endpoint: row.get(1)?,
        location: row.get(2)?,
        timestamp: instant_from_micros(3, row.get(3)?)?,
        payload: payload_from_text(4, &payload)?,
    })
}

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<AggregatedRecord> {
    let id: String = row.get(0)?;
    let payload: String = row.get(3)?;
    Ok(AggregatedRecord {
        id: RecordId::new(id),
        location: row.get(1)?,
        date: instant_from_micros(2, row.get(2)?)?,
        payload: payload_from_text(3, &payload)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 8, 0, 0).unwrap()
    }

    fn raw(id: &str, provider: Provider, ts: DateTime<Utc>) -> RawRecord {
        RawRecord {
            id: RecordId::new(id),
            provider,
            endpoint: Some("shifts".to_string()),
            location: Some("loc-1".to_string()),
            timestamp: ts,
            payload: json!({"id": id, "amount": 12}),
        }
    }

    fn agg(id: &str, location: &str, date: DateTime<Utc>) -> AggregatedRecord {
        AggregatedRecord {
            id: RecordId::new(id),
            location: location.to_string(),
            date,
            payload: json!({"revenue": 100}),
        }
    }

    #[test]
    fn open_sets_wal_and_busy_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteHotStore::open(&dir.path().join("nested/hot.sqlite3")).unwrap();

        let journal_mode: String = store
            .connection()
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = store
            .connection()
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(u128::from(busy_timeout_ms), DEFAULT_BUSY_TIMEOUT.as_millis());
    }

    #[test]
    fn open_existing_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteHotStore::open_existing(&dir.path().join("missing.sqlite3")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn read_only_open_leaves_outdated_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.sqlite3");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE legacy (id INTEGER PRIMARY KEY);")
                .unwrap();
        }
        let before = std::fs::read(&path).unwrap();

        let err = SqliteHotStore::open_read_only(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema v0"));

        assert_eq!(std::fs::read(&path).unwrap(), before);
        let conn = Connection::open(&path).unwrap();
        assert_eq!(migrations::current_schema_version(&conn).unwrap(), 0);
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "delete");
    }

    #[test]
    fn read_only_open_reads_but_cannot_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hot.sqlite3");
        {
            let store = SqliteHotStore::open(&path).unwrap();
            store.insert_raw(&raw("a", Provider::Bork, at(2026, 1, 1))).unwrap();
        }

        let store = SqliteHotStore::open_read_only(&path).unwrap();
        assert_eq!(store.find_stale(Provider::Bork, at(2026, 9, 1)).unwrap().len(), 1);
        assert!(store.delete_raw(Provider::Bork, &[RecordId::new("a")]).is_err());
    }

    #[test]
    fn read_only_open_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteHotStore::open_read_only(&dir.path().join("missing.sqlite3")).is_err());
    }

    #[test]
    fn find_stale_is_strictly_before_cutoff_and_per_provider() {
        let store = SqliteHotStore::open_in_memory().unwrap();
        let cutoff = at(2026, 9, 1);
        store.insert_raw(&raw("old", Provider::Bork, at(2026, 8, 1))).unwrap();
        store.insert_raw(&raw("edge", Provider::Bork, cutoff)).unwrap();
        store.insert_raw(&raw("new", Provider::Bork, at(2026, 9, 15))).unwrap();
        store.insert_raw(&raw("other", Provider::Eitje, at(2026, 8, 1))).unwrap();

        let stale = store.find_stale(Provider::Bork, cutoff).unwrap();
        let ids: Vec<_> = stale.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["old"]);
        assert_eq!(stale[0].provider, Provider::Bork);
        assert_eq!(stale[0].payload, json!({"id": "old", "amount": 12}));
    }

    #[test]
    fn find_aggregates_uses_inclusive_window_and_location() {
        let store = SqliteHotStore::open_in_memory().unwrap();
        let start = at(2026, 8, 1);
        let end = at(2026, 8, 31);
        store.insert_aggregate(Provider::Bork, &agg("a", "loc-1", start)).unwrap();
        store.insert_aggregate(Provider::Bork, &agg("b", "loc-1", end)).unwrap();
        store.insert_aggregate(Provider::Bork, &agg("c", "loc-2", start)).unwrap();
        store.insert_aggregate(Provider::Bork, &agg("d", "loc-1", at(2026, 9, 1))).unwrap();
        store.insert_aggregate(Provider::Eitje, &agg("e", "loc-1", start)).unwrap();

        let found = store.find_aggregates(Provider::Bork, "loc-1", start, end).unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn delete_raw_reports_actual_count() {
        let store = SqliteHotStore::open_in_memory().unwrap();
        store.insert_raw(&raw("a", Provider::Eitje, at(2026, 1, 1))).unwrap();
        store.insert_raw(&raw("b", Provider::Eitje, at(2026, 1, 2))).unwrap();

        let ids = [RecordId::new("a"), RecordId::new("b"), RecordId::new("ghost")];
        assert_eq!(store.delete_raw(Provider::Eitje, &ids).unwrap(), 2);
        assert_eq!(store.delete_raw(Provider::Eitje, &ids).unwrap(), 0);
        assert_eq!(store.count_raw(Provider::Eitje).unwrap(), 0);
    }

    #[test]
    fn record_run_updates_meta() {
        let store = SqliteHotStore::open_in_memory().unwrap();
        let now = at(2026, 10, 18);
        store.record_run(now).unwrap();
        let stamped: i64 = store
            .connection()
            .query_row("SELECT last_archive_run_at_us FROM store_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stamped, now.timestamp_micros());
    }
}
