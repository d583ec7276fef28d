//! SQL schema for the engine's own bookkeeping tables.
//!
//! The dynamic tables themselves are created on demand; only the registry,
//! audit and backup tables live here. Executed at connection startup when
//! `PRAGMA user_version` is behind [`SCHEMA_VERSION`].

pub const SCHEMA_VERSION: i64 = 2;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per dynamic table the engine has provisioned.
CREATE TABLE IF NOT EXISTS _formtable_tables (
    table_name  TEXT PRIMARY KEY,
    owner_kind  TEXT NOT NULL,   -- 'form' | 'sub_form'
    owner_id    TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

-- Audit trail. Append-only: a rollback inserts a new row with rollback_of set.
CREATE TABLE IF NOT EXISTS _formtable_migrations (
    record_id      TEXT PRIMARY KEY,
    table_name     TEXT NOT NULL,
    field_id       TEXT NOT NULL,
    kind           TEXT NOT NULL,   -- 'ADD' | 'DROP' | 'RENAME' | 'RETYPE'
    old_value      TEXT,
    new_value      TEXT,
    intent_json    TEXT NOT NULL,   -- resolved ChangeIntent
    forward_sql    TEXT NOT NULL,
    rollback_sql   TEXT,
    success        INTEGER NOT NULL,
    error_kind     TEXT,
    error_message  TEXT,
    backup_id      TEXT,
    rollback_of    TEXT,
    job_id         TEXT,
    executed_by    TEXT NOT NULL,
    executed_at    TEXT NOT NULL    -- RFC 3339 UTC, fixed width
);

-- Column snapshots taken before destructive DDL.
CREATE TABLE IF NOT EXISTS _formtable_backups (
    backup_id        TEXT PRIMARY KEY,
    table_name       TEXT NOT NULL,
    column_name      TEXT NOT NULL,
    column_type      TEXT NOT NULL,   -- declared SQL type
    rows_json        TEXT NOT NULL,   -- [{row_id, value}] ordered by row_id
    row_count        INTEGER NOT NULL,
    created_at       TEXT NOT NULL,
    retention_until  TEXT NOT NULL,
    consumed_at      TEXT
);

CREATE INDEX IF NOT EXISTS migrations_table_idx    ON _formtable_migrations(table_name, executed_at);
CREATE INDEX IF NOT EXISTS migrations_rollback_idx ON _formtable_migrations(rollback_of);
CREATE INDEX IF NOT EXISTS migrations_job_idx      ON _formtable_migrations(job_id);
CREATE INDEX IF NOT EXISTS backups_table_idx       ON _formtable_backups(table_name, created_at);
CREATE INDEX IF NOT EXISTS backups_retention_idx   ON _formtable_backups(retention_until);

PRAGMA user_version = 2;
";
