//! Database schema constants for the report metadata store.

/// SQL schema for creating the reports table.
pub const CREATE_REPORTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    report_id VARCHAR(64) PRIMARY KEY,
    owner_id VARCHAR(255) NOT NULL,
    report_type VARCHAR(32) NOT NULL,
    status VARCHAR(32) NOT NULL,
    title TEXT NOT NULL,
    format VARCHAR(16) NOT NULL,
    requested_by VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    completed_at TIMESTAMPTZ,
    export_urls JSONB NOT NULL DEFAULT '{}'::jsonb,
    rollup JSONB NOT NULL DEFAULT '{}'::jsonb,
    error_message TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// SQL for creating indexes on the reports table.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_reports_owner_type_created
    ON reports(owner_id, report_type, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status);
CREATE INDEX IF NOT EXISTS idx_reports_created_at ON reports(created_at DESC)
"#;

/// Returns all schema creation statements in order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_REPORTS_TABLE, CREATE_INDEXES]
}

/// Table names used in the schema.
pub mod tables {
    pub const REPORTS: &str = "reports";
    pub const MIGRATIONS: &str = "_migrations";
}

/// Columns selected when loading a full record.
pub const REPORT_COLUMNS: &str = "report_id, owner_id, report_type, status, title, format, \
     requested_by, created_at, completed_at, export_urls, rollup, error_message";
