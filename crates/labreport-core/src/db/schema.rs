//! SQLite schema definition.

/// Complete database schema for labreport.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Test Templates (panel catalog)
-- ============================================================================

CREATE TABLE IF NOT EXISTS test_templates (
    template_id TEXT PRIMARY KEY,
    template_name TEXT NOT NULL,
    fields TEXT NOT NULL DEFAULT '[]',            -- JSON array of FieldDefinition
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- FTS5 virtual table for panel name search
CREATE VIRTUAL TABLE IF NOT EXISTS test_templates_fts USING fts5(
    template_id,
    template_name,
    content='test_templates',
    content_rowid='rowid'
);

-- Triggers to keep FTS5 in sync with main table
CREATE TRIGGER IF NOT EXISTS test_templates_ai AFTER INSERT ON test_templates BEGIN
    INSERT INTO test_templates_fts(rowid, template_id, template_name)
    VALUES (new.rowid, new.template_id, new.template_name);
END;

CREATE TRIGGER IF NOT EXISTS test_templates_ad AFTER DELETE ON test_templates BEGIN
    INSERT INTO test_templates_fts(test_templates_fts, rowid, template_id, template_name)
    VALUES ('delete', old.rowid, old.template_id, old.template_name);
END;

CREATE TRIGGER IF NOT EXISTS test_templates_au AFTER UPDATE ON test_templates BEGIN
    INSERT INTO test_templates_fts(test_templates_fts, rowid, template_id, template_name)
    VALUES ('delete', old.rowid, old.template_id, old.template_name);
    INSERT INTO test_templates_fts(rowid, template_id, template_name)
    VALUES (new.rowid, new.template_id, new.template_name);
END;

CREATE INDEX IF NOT EXISTS idx_templates_name ON test_templates(template_name);

-- ============================================================================
-- Test Reports (append-only after submit)
-- ============================================================================

CREATE TABLE IF NOT EXISTS test_reports (
    report_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    invoice_id TEXT NOT NULL,
    template_id TEXT NOT NULL REFERENCES test_templates(template_id),
    comment TEXT NOT NULL DEFAULT '',
    complete_status INTEGER NOT NULL DEFAULT 1,
    repeat_status INTEGER NOT NULL DEFAULT 0,
    out_of_range_status INTEGER NOT NULL DEFAULT 0,
    results TEXT NOT NULL DEFAULT '[]',           -- JSON array of ResultEntry
    fingerprint TEXT NOT NULL,                    -- SHA-256 of canonical submission JSON
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_reports_patient ON test_reports(patient_id);
CREATE INDEX IF NOT EXISTS idx_reports_invoice ON test_reports(invoice_id);
CREATE INDEX IF NOT EXISTS idx_reports_template ON test_reports(template_id);
"#;
