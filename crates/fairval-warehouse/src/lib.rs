//! # Fairval Warehouse
//!
//! DuckDB-backed persistence for the valuation pipeline.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `tracked_securities` | One row per monitored ticker: assumptions and latest outputs |
//! | `valuation_snapshots` | Append-only dated copies, unique on `(symbol, snapshot_date)` |
//! | `fundamental_cache` | Raw provider payloads with an expiry (epoch milliseconds) |
//! | `schema_migrations` | Applied migration versions |
//!
//! Records cross this boundary as plain strings: decimals in canonical text
//! form, timestamps as `YYYY-MM-DD HH:MM:SS` (UTC), and dates as `YYYY-MM-DD`.
//! Decimal columns are written with `CAST(? AS DECIMAL)` and read back with
//! `CAST(... AS VARCHAR)` so no value ever passes through a binary float.
//!
//! All statements are parameterized; user input is never interpolated into SQL.

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, Row, ToSql};
use serde::Serialize;
use thiserror::Error;

pub use crate::duckdb::{DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A snapshot for the same symbol and date is already stored.
    #[error("snapshot for {symbol} on {snapshot_date} already exists")]
    DuplicateSnapshot {
        symbol: String,
        snapshot_date: String,
    },
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for fairval data.
    pub fairval_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let fairval_home = resolve_fairval_home();
        let db_path = fairval_home.join("warehouse.duckdb");
        Self {
            fairval_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Configuration rooted at an explicit directory.
    pub fn at(fairval_home: impl Into<PathBuf>) -> Self {
        let fairval_home = fairval_home.into();
        let db_path = fairval_home.join("warehouse.duckdb");
        Self {
            fairval_home,
            db_path,
            max_pool_size: 2,
        }
    }
}

/// One row of `tracked_securities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityRecord {
    pub symbol: String,
    pub name: Option<String>,
    pub is_active: bool,
    pub eps_growth_rate: String,
    pub eps_exit_multiple: String,
    pub fcf_growth_rate: String,
    pub fcf_exit_multiple: String,
    pub required_return_rate: String,
    pub projection_years: i32,
    pub preferred_method: String,
    pub current_eps: Option<String>,
    pub intrinsic_value_eps: Option<String>,
    pub current_fcf_per_share: Option<String>,
    pub intrinsic_value_fcf: Option<String>,
    pub last_calculated_at: Option<String>,
}

/// Engine outputs written onto a tracked security in a single statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuationRecord {
    pub current_eps: String,
    pub intrinsic_value_eps: String,
    pub current_fcf_per_share: String,
    pub intrinsic_value_fcf: String,
    pub calculated_at: String,
}

/// One row of `valuation_snapshots`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRecord {
    pub symbol: String,
    pub snapshot_date: String,
    pub captured_at: String,
    pub eps_growth_rate: String,
    pub eps_exit_multiple: String,
    pub fcf_growth_rate: String,
    pub fcf_exit_multiple: String,
    pub required_return_rate: String,
    pub projection_years: i32,
    pub preferred_method: String,
    pub current_eps: String,
    pub intrinsic_value_eps: String,
    pub current_fcf_per_share: String,
    pub intrinsic_value_fcf: String,
    pub calculated_at: String,
}

const SECURITY_COLUMNS: &str = "symbol, name, is_active, \
     CAST(eps_growth_rate AS VARCHAR), CAST(eps_exit_multiple AS VARCHAR), \
     CAST(fcf_growth_rate AS VARCHAR), CAST(fcf_exit_multiple AS VARCHAR), \
     CAST(required_return_rate AS VARCHAR), projection_years, preferred_method, \
     CAST(current_eps AS VARCHAR), CAST(intrinsic_value_eps AS VARCHAR), \
     CAST(current_fcf_per_share AS VARCHAR), CAST(intrinsic_value_fcf AS VARCHAR), \
     strftime(last_calculated_at, '%Y-%m-%d %H:%M:%S')";

const SNAPSHOT_COLUMNS: &str = "symbol, strftime(snapshot_date, '%Y-%m-%d'), \
     strftime(captured_at, '%Y-%m-%d %H:%M:%S'), \
     CAST(eps_growth_rate AS VARCHAR), CAST(eps_exit_multiple AS VARCHAR), \
     CAST(fcf_growth_rate AS VARCHAR), CAST(fcf_exit_multiple AS VARCHAR), \
     CAST(required_return_rate AS VARCHAR), projection_years, preferred_method, \
     CAST(current_eps AS VARCHAR), CAST(intrinsic_value_eps AS VARCHAR), \
     CAST(current_fcf_per_share AS VARCHAR), CAST(intrinsic_value_fcf AS VARCHAR), \
     strftime(calculated_at, '%Y-%m-%d %H:%M:%S')";

/// The warehouse handle. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open (creating if needed) a warehouse and apply pending migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn home(&self) -> &Path {
        self.config.fairval_home.as_path()
    }

    // -------------------------------------------------------------------------
    // tracked_securities
    // -------------------------------------------------------------------------

    /// Insert a security or update its descriptive fields and assumptions.
    ///
    /// Engine outputs on an existing row are left untouched.
    pub fn upsert_security(&self, record: &SecurityRecord) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 10] = [
            &record.symbol,
            &record.name,
            &record.is_active,
            &record.eps_growth_rate,
            &record.eps_exit_multiple,
            &record.fcf_growth_rate,
            &record.fcf_exit_multiple,
            &record.required_return_rate,
            &record.projection_years,
            &record.preferred_method,
        ];
        connection.execute(
            "INSERT INTO tracked_securities \
             (symbol, name, is_active, eps_growth_rate, eps_exit_multiple, fcf_growth_rate, \
              fcf_exit_multiple, required_return_rate, projection_years, preferred_method) \
             VALUES (?, ?, ?, CAST(? AS DECIMAL(38, 8)), CAST(? AS DECIMAL(38, 8)), \
                     CAST(? AS DECIMAL(38, 8)), CAST(? AS DECIMAL(38, 8)), \
                     CAST(? AS DECIMAL(38, 8)), ?, ?) \
             ON CONFLICT (symbol) DO UPDATE SET \
               name = excluded.name, \
               is_active = excluded.is_active, \
               eps_growth_rate = excluded.eps_growth_rate, \
               eps_exit_multiple = excluded.eps_exit_multiple, \
               fcf_growth_rate = excluded.fcf_growth_rate, \
               fcf_exit_multiple = excluded.fcf_exit_multiple, \
               required_return_rate = excluded.required_return_rate, \
               projection_years = excluded.projection_years, \
               preferred_method = excluded.preferred_method, \
               updated_at = now()",
            params.as_slice(),
        )?;
        Ok(())
    }

    pub fn get_security(&self, symbol: &str) -> Result<Option<SecurityRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let sql = format!("SELECT {SECURITY_COLUMNS} FROM tracked_securities WHERE symbol = ?");
        let mut statement = connection.prepare(sql.as_str())?;
        let params: [&dyn ToSql; 1] = [&symbol];
        let mut rows = statement.query(params.as_slice())?;
        match rows.next()? {
            Some(row) => Ok(Some(read_security(row)?)),
            None => Ok(None),
        }
    }

    /// All tracked securities, ordered by symbol.
    pub fn list_securities(&self) -> Result<Vec<SecurityRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let sql = format!("SELECT {SECURITY_COLUMNS} FROM tracked_securities ORDER BY symbol");
        let mut statement = connection.prepare(sql.as_str())?;
        let mut rows = statement.query([] as [&dyn ToSql; 0])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_security(row)?);
        }
        Ok(records)
    }

    /// Write all engine outputs for one security at once.
    ///
    /// Returns `false` when no row exists for `symbol`.
    pub fn record_valuation(
        &self,
        symbol: &str,
        valuation: &ValuationRecord,
    ) -> Result<bool, WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 6] = [
            &valuation.current_eps,
            &valuation.intrinsic_value_eps,
            &valuation.current_fcf_per_share,
            &valuation.intrinsic_value_fcf,
            &valuation.calculated_at,
            &symbol,
        ];
        let changed = connection.execute(
            "UPDATE tracked_securities SET \
               current_eps = CAST(? AS DECIMAL(38, 8)), \
               intrinsic_value_eps = CAST(? AS DECIMAL(38, 8)), \
               current_fcf_per_share = CAST(? AS DECIMAL(38, 8)), \
               intrinsic_value_fcf = CAST(? AS DECIMAL(38, 8)), \
               last_calculated_at = CAST(? AS TIMESTAMP), \
               updated_at = now() \
             WHERE symbol = ?",
            params.as_slice(),
        )?;
        Ok(changed > 0)
    }

    /// Delete a security together with all of its snapshots.
    ///
    /// Returns `false` when the security did not exist.
    pub fn delete_security(&self, symbol: &str) -> Result<bool, WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<bool, WarehouseError> {
            let params: [&dyn ToSql; 1] = [&symbol];
            let snapshots = connection.execute(
                "DELETE FROM valuation_snapshots WHERE symbol = ?",
                params.as_slice(),
            )?;
            let securities = connection.execute(
                "DELETE FROM tracked_securities WHERE symbol = ?",
                params.as_slice(),
            )?;
            tracing::debug!(symbol, snapshots, "deleted tracked security");
            Ok(securities > 0)
        })();

        finalize_transaction(&connection, result)
    }

    // -------------------------------------------------------------------------
    // valuation_snapshots
    // -------------------------------------------------------------------------

    pub fn find_snapshot(
        &self,
        symbol: &str,
        snapshot_date: &str,
    ) -> Result<Option<SnapshotRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM valuation_snapshots \
             WHERE symbol = ? AND snapshot_date = CAST(? AS DATE)"
        );
        let mut statement = connection.prepare(sql.as_str())?;
        let params: [&dyn ToSql; 2] = [&symbol, &snapshot_date];
        let mut rows = statement.query(params.as_slice())?;
        match rows.next()? {
            Some(row) => Ok(Some(read_snapshot(row)?)),
            None => Ok(None),
        }
    }

    /// Insert a new snapshot. Fails with [`WarehouseError::DuplicateSnapshot`]
    /// if one already exists for the same symbol and date.
    pub fn insert_snapshot(&self, record: &SnapshotRecord) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let params: [&dyn ToSql; 2] = [&record.symbol, &record.snapshot_date];
            let existing: i64 = connection.query_row(
                "SELECT COUNT(*) FROM valuation_snapshots \
                 WHERE symbol = ? AND snapshot_date = CAST(? AS DATE)",
                params.as_slice(),
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Err(WarehouseError::DuplicateSnapshot {
                    symbol: record.symbol.clone(),
                    snapshot_date: record.snapshot_date.clone(),
                });
            }

            let params = snapshot_params(record);
            connection.execute(
                "INSERT INTO valuation_snapshots \
                 (symbol, snapshot_date, captured_at, eps_growth_rate, eps_exit_multiple, \
                  fcf_growth_rate, fcf_exit_multiple, required_return_rate, projection_years, \
                  preferred_method, current_eps, intrinsic_value_eps, current_fcf_per_share, \
                  intrinsic_value_fcf, calculated_at) \
                 VALUES (?, CAST(? AS DATE), CAST(? AS TIMESTAMP), \
                         CAST(? AS DECIMAL(38, 8)), CAST(? AS DECIMAL(38, 8)), \
                         CAST(? AS DECIMAL(38, 8)), CAST(? AS DECIMAL(38, 8)), \
                         CAST(? AS DECIMAL(38, 8)), ?, ?, \
                         CAST(? AS DECIMAL(38, 8)), CAST(? AS DECIMAL(38, 8)), \
                         CAST(? AS DECIMAL(38, 8)), CAST(? AS DECIMAL(38, 8)), \
                         CAST(? AS TIMESTAMP))",
                params.as_slice(),
            )?;
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    /// Overwrite every field of an existing snapshot in place.
    ///
    /// Returns `false` when there was nothing to overwrite.
    pub fn replace_snapshot(&self, record: &SnapshotRecord) -> Result<bool, WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 15] = [
            &record.captured_at,
            &record.eps_growth_rate,
            &record.eps_exit_multiple,
            &record.fcf_growth_rate,
            &record.fcf_exit_multiple,
            &record.required_return_rate,
            &record.projection_years,
            &record.preferred_method,
            &record.current_eps,
            &record.intrinsic_value_eps,
            &record.current_fcf_per_share,
            &record.intrinsic_value_fcf,
            &record.calculated_at,
            &record.symbol,
            &record.snapshot_date,
        ];
        let changed = connection.execute(
            "UPDATE valuation_snapshots SET \
               captured_at = CAST(? AS TIMESTAMP), \
               eps_growth_rate = CAST(? AS DECIMAL(38, 8)), \
               eps_exit_multiple = CAST(? AS DECIMAL(38, 8)), \
               fcf_growth_rate = CAST(? AS DECIMAL(38, 8)), \
               fcf_exit_multiple = CAST(? AS DECIMAL(38, 8)), \
               required_return_rate = CAST(? AS DECIMAL(38, 8)), \
               projection_years = ?, \
               preferred_method = ?, \
               current_eps = CAST(? AS DECIMAL(38, 8)), \
               intrinsic_value_eps = CAST(? AS DECIMAL(38, 8)), \
               current_fcf_per_share = CAST(? AS DECIMAL(38, 8)), \
               intrinsic_value_fcf = CAST(? AS DECIMAL(38, 8)), \
               calculated_at = CAST(? AS TIMESTAMP) \
             WHERE symbol = ? AND snapshot_date = CAST(? AS DATE)",
            params.as_slice(),
        )?;
        Ok(changed > 0)
    }

    /// Snapshot history for one symbol, newest first.
    pub fn snapshot_history(&self, symbol: &str) -> Result<Vec<SnapshotRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM valuation_snapshots \
             WHERE symbol = ? ORDER BY snapshot_date DESC"
        );
        let mut statement = connection.prepare(sql.as_str())?;
        let params: [&dyn ToSql; 1] = [&symbol];
        let mut rows = statement.query(params.as_slice())?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_snapshot(row)?);
        }
        Ok(records)
    }

    // -------------------------------------------------------------------------
    // fundamental_cache
    // -------------------------------------------------------------------------

    /// Cached payload for `key` if it has not expired at `now_ms`.
    pub fn cache_get(&self, key: &str, now_ms: i64) -> Result<Option<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT payload FROM fundamental_cache WHERE cache_key = ? AND expires_at_ms > ?",
        )?;
        let params: [&dyn ToSql; 2] = [&key, &now_ms];
        let mut rows = statement.query(params.as_slice())?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn cache_put(
        &self,
        key: &str,
        payload: &str,
        expires_at_ms: i64,
    ) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 3] = [&key, &payload, &expires_at_ms];
        connection.execute(
            "INSERT OR REPLACE INTO fundamental_cache \
             (cache_key, payload, expires_at_ms, stored_at) \
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;
        Ok(())
    }

    pub fn cache_delete(&self, key: &str) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 1] = [&key];
        connection.execute(
            "DELETE FROM fundamental_cache WHERE cache_key = ?",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Remove every entry that expired at or before `now_ms`.
    pub fn cache_purge_expired(&self, now_ms: i64) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 1] = [&now_ms];
        let removed = connection.execute(
            "DELETE FROM fundamental_cache WHERE expires_at_ms <= ?",
            params.as_slice(),
        )?;
        Ok(removed)
    }

    pub fn cache_len(&self) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM fundamental_cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn snapshot_params(record: &SnapshotRecord) -> [&dyn ToSql; 15] {
    [
        &record.symbol,
        &record.snapshot_date,
        &record.captured_at,
        &record.eps_growth_rate,
        &record.eps_exit_multiple,
        &record.fcf_growth_rate,
        &record.fcf_exit_multiple,
        &record.required_return_rate,
        &record.projection_years,
        &record.preferred_method,
        &record.current_eps,
        &record.intrinsic_value_eps,
        &record.current_fcf_per_share,
        &record.intrinsic_value_fcf,
        &record.calculated_at,
    ]
}

fn read_security(row: &Row<'_>) -> Result<SecurityRecord, ::duckdb::Error> {
    Ok(SecurityRecord {
        symbol: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get(2)?,
        eps_growth_rate: row.get(3)?,
        eps_exit_multiple: row.get(4)?,
        fcf_growth_rate: row.get(5)?,
        fcf_exit_multiple: row.get(6)?,
        required_return_rate: row.get(7)?,
        projection_years: row.get(8)?,
        preferred_method: row.get(9)?,
        current_eps: row.get(10)?,
        intrinsic_value_eps: row.get(11)?,
        current_fcf_per_share: row.get(12)?,
        intrinsic_value_fcf: row.get(13)?,
        last_calculated_at: row.get(14)?,
    })
}

fn read_snapshot(row: &Row<'_>) -> Result<SnapshotRecord, ::duckdb::Error> {
    Ok(SnapshotRecord {
        symbol: row.get(0)?,
        snapshot_date: row.get(1)?,
        captured_at: row.get(2)?,
        eps_growth_rate: row.get(3)?,
        eps_exit_multiple: row.get(4)?,
        fcf_growth_rate: row.get(5)?,
        fcf_exit_multiple: row.get(6)?,
        required_return_rate: row.get(7)?,
        projection_years: row.get(8)?,
        preferred_method: row.get(9)?,
        current_eps: row.get(10)?,
        intrinsic_value_eps: row.get(11)?,
        current_fcf_per_share: row.get(12)?,
        intrinsic_value_fcf: row.get(13)?,
        calculated_at: row.get(14)?,
    })
}

/// Commit on success, roll back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn resolve_fairval_home() -> PathBuf {
    if let Some(path) = env::var_os("FAIRVAL_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".fairval");
    }

    PathBuf::from(".fairval")
}
