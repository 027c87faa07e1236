//! Template catalog database operations.

use rusqlite::{params, OptionalExtension};
use strsim::{jaro_winkler, normalized_levenshtein};

use super::{Database, DbError, DbResult};
use crate::models::TestTemplate;

impl Database {
    /// Insert or update a test template.
    pub fn upsert_template(&self, template: &TestTemplate) -> DbResult<()> {
        let fields_json = serde_json::to_string(&template.fields)?;

        self.conn.execute(
            r#"
            INSERT INTO test_templates (
                template_id, template_name, fields, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
            ON CONFLICT(template_id) DO UPDATE SET
                template_name = excluded.template_name,
                fields = excluded.fields,
                active = excluded.active,
                updated_at = datetime('now')
            "#,
            params![
                template.template_id,
                template.template_name,
                fields_json,
                template.active,
                template.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a template by ID.
    pub fn get_template(&self, template_id: &str) -> DbResult<Option<TestTemplate>> {
        self.conn
            .query_row(
                r#"
                SELECT template_id, template_name, fields, active, created_at, updated_at
                FROM test_templates
                WHERE template_id = ?
                "#,
                [template_id],
                |row| {
                    Ok(TemplateRow {
                        template_id: row.get(0)?,
                        template_name: row.get(1)?,
                        fields: row.get(2)?,
                        active: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Search active templates by panel name using FTS5 (BM25 ranking).
    pub fn search_templates(&self, query: &str, limit: usize) -> DbResult<Vec<TestTemplate>> {
        let escaped_query = escape_fts_query(query);

        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.template_id, t.template_name, t.fields, t.active, t.created_at, t.updated_at,
                   bm25(test_templates_fts) as rank
            FROM test_templates t
            JOIN test_templates_fts fts ON t.rowid = fts.rowid
            WHERE test_templates_fts MATCH ?
            AND t.active = 1
            ORDER BY rank
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![escaped_query, limit as i64], |row| {
            Ok(TemplateRow {
                template_id: row.get(0)?,
                template_name: row.get(1)?,
                fields: row.get(2)?,
                active: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?;

        let mut templates = Vec::new();
        for row in rows {
            templates.push(row?.try_into()?);
        }
        Ok(templates)
    }

    /// Resolve a free-typed panel name to the closest active template.
    ///
    /// Invoices carry panel names typed by reception staff, so the lookup
    /// tolerates typos: exact name match wins outright, otherwise the best
    /// fuzzy score at or above `min_score` is returned with its score.
    pub fn find_template_fuzzy(
        &self,
        name: &str,
        min_score: f64,
    ) -> DbResult<Option<(TestTemplate, f64)>> {
        let name_lower = name.trim().to_lowercase();
        if name_lower.is_empty() {
            return Ok(None);
        }

        let mut best: Option<(TestTemplate, f64)> = None;
        for template in self.list_templates(true)? {
            let candidate_lower = template.template_name.to_lowercase();
            let score = if candidate_lower == name_lower {
                1.0
            } else {
                fuzzy_score(&name_lower, &candidate_lower)
            };
            if score >= min_score && best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((template, score));
            }
        }
        Ok(best)
    }

    /// Get all templates, optionally only active ones.
    pub fn list_templates(&self, active_only: bool) -> DbResult<Vec<TestTemplate>> {
        let sql = if active_only {
            r#"
            SELECT template_id, template_name, fields, active, created_at, updated_at
            FROM test_templates
            WHERE active = 1
            ORDER BY template_name
            "#
        } else {
            r#"
            SELECT template_id, template_name, fields, active, created_at, updated_at
            FROM test_templates
            ORDER BY template_name
            "#
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(TemplateRow {
                template_id: row.get(0)?,
                template_name: row.get(1)?,
                fields: row.get(2)?,
                active: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?;

        let mut templates = Vec::new();
        for row in rows {
            templates.push(row?.try_into()?);
        }
        Ok(templates)
    }

    /// Delete a template.
    pub fn delete_template(&self, template_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM test_templates WHERE template_id = ?", [template_id])?;
        Ok(rows_affected > 0)
    }

    /// Mark template as inactive (soft delete).
    pub fn deactivate_template(&self, template_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE test_templates SET active = 0, updated_at = datetime('now') WHERE template_id = ?",
            [template_id],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct TemplateRow {
    template_id: String,
    template_name: String,
    fields: String,
    active: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TemplateRow> for TestTemplate {
    type Error = DbError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(TestTemplate {
            template_id: row.template_id,
            template_name: row.template_name,
            fields: serde_json::from_str(&row.fields)?,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Escape special FTS5 characters and prepare query for prefix matching.
fn escape_fts_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| format!("{}*", word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Combined fuzzy similarity: Jaro-Winkler favors shared prefixes, which
/// panel names usually have; Levenshtein covers overall shape.
fn fuzzy_score(a: &str, b: &str) -> f64 {
    jaro_winkler(a, b) * 0.6 + normalized_levenshtein(a, b) * 0.4
}
