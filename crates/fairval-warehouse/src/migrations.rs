use ::duckdb::{Connection, ToSql};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

// Decimal columns use DECIMAL(38, 8): wide enough for any per-share figure the
// engine produces while keeping exact decimal storage.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_valuation_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS tracked_securities (
    symbol TEXT PRIMARY KEY,
    name TEXT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    eps_growth_rate DECIMAL(38, 8) NOT NULL,
    eps_exit_multiple DECIMAL(38, 8) NOT NULL,
    fcf_growth_rate DECIMAL(38, 8) NOT NULL,
    fcf_exit_multiple DECIMAL(38, 8) NOT NULL,
    required_return_rate DECIMAL(38, 8) NOT NULL,
    projection_years INTEGER NOT NULL,
    preferred_method TEXT NOT NULL,
    current_eps DECIMAL(38, 8),
    intrinsic_value_eps DECIMAL(38, 8),
    current_fcf_per_share DECIMAL(38, 8),
    intrinsic_value_fcf DECIMAL(38, 8),
    last_calculated_at TIMESTAMP,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS valuation_snapshots (
    symbol TEXT NOT NULL,
    snapshot_date DATE NOT NULL,
    captured_at TIMESTAMP NOT NULL,
    eps_growth_rate DECIMAL(38, 8) NOT NULL,
    eps_exit_multiple DECIMAL(38, 8) NOT NULL,
    fcf_growth_rate DECIMAL(38, 8) NOT NULL,
    fcf_exit_multiple DECIMAL(38, 8) NOT NULL,
    required_return_rate DECIMAL(38, 8) NOT NULL,
    projection_years INTEGER NOT NULL,
    preferred_method TEXT NOT NULL,
    current_eps DECIMAL(38, 8) NOT NULL,
    intrinsic_value_eps DECIMAL(38, 8) NOT NULL,
    current_fcf_per_share DECIMAL(38, 8) NOT NULL,
    intrinsic_value_fcf DECIMAL(38, 8) NOT NULL,
    calculated_at TIMESTAMP NOT NULL,
    UNIQUE (symbol, snapshot_date)
);
"#,
    },
    Migration {
        version: "0002_fundamental_cache",
        sql: r#"
CREATE TABLE IF NOT EXISTS fundamental_cache (
    cache_key TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    expires_at_ms BIGINT NOT NULL,
    stored_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let params: [&dyn ToSql; 1] = [&migration.version];
        let applied: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params.as_slice(),
            |row| row.get(0),
        )?;
        if applied > 0 {
            continue;
        }

        connection.execute_batch(migration.sql)?;
        connection.execute(
            "INSERT INTO schema_migrations (version) VALUES (?)",
            params.as_slice(),
        )?;
        tracing::debug!(version = migration.version, "applied warehouse migration");
    }

    Ok(())
}

/// Versions of every migration known to this build, in application order.
pub fn known_versions() -> impl Iterator<Item = &'static str> {
    MIGRATIONS.iter().map(|migration| migration.version)
}
