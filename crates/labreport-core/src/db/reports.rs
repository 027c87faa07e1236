//! Report store database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{ResultEntry, StoredReport};

impl Database {
    /// Insert a submitted report.
    pub fn insert_report(&self, report: &StoredReport) -> DbResult<()> {
        let results_json = serde_json::to_string(&report.results)?;

        self.conn.execute(
            r#"
            INSERT INTO test_reports (
                report_id, patient_id, invoice_id, template_id, comment,
                complete_status, repeat_status, out_of_range_status,
                results, fingerprint, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                report.report_id,
                report.patient_id,
                report.invoice_id,
                report.template_id,
                report.comment,
                report.complete_status,
                report.repeat_status,
                report.out_of_range_status,
                results_json,
                report.fingerprint,
                report.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a report by ID.
    pub fn get_report(&self, report_id: &str) -> DbResult<Option<StoredReport>> {
        self.conn
            .query_row(
                &format!("{} WHERE report_id = ?", SELECT_REPORT),
                [report_id],
                map_report_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all reports, newest first.
    pub fn list_reports(&self) -> DbResult<Vec<StoredReport>> {
        self.query_reports(&format!("{} ORDER BY created_at DESC", SELECT_REPORT), [])
    }

    /// List all reports for a patient, newest first.
    pub fn list_reports_for_patient(&self, patient_id: &str) -> DbResult<Vec<StoredReport>> {
        self.query_reports(
            &format!(
                "{} WHERE patient_id = ? ORDER BY created_at DESC",
                SELECT_REPORT
            ),
            [patient_id],
        )
    }

    /// List all reports billed against an invoice, newest first.
    pub fn list_reports_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<StoredReport>> {
        self.query_reports(
            &format!(
                "{} WHERE invoice_id = ? ORDER BY created_at DESC",
                SELECT_REPORT
            ),
            [invoice_id],
        )
    }

    /// Delete a report.
    pub fn delete_report(&self, report_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM test_reports WHERE report_id = ?", [report_id])?;
        Ok(rows_affected > 0)
    }

    /// Recompute a stored report's fingerprint and compare with the stored
    /// one. `false` means the row was altered after submission.
    pub fn verify_report_fingerprint(&self, report_id: &str) -> DbResult<bool> {
        let report = self
            .get_report(report_id)?
            .ok_or_else(|| DbError::NotFound(format!("report {}", report_id)))?;
        let recomputed = crate::submit::submission_fingerprint(&report.to_submission())?;
        Ok(recomputed == report.fingerprint)
    }

    fn query_reports<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> DbResult<Vec<StoredReport>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map_report_row)?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?.try_into()?);
        }
        Ok(reports)
    }
}

const SELECT_REPORT: &str = r#"
    SELECT report_id, patient_id, invoice_id, template_id, comment,
           complete_status, repeat_status, out_of_range_status,
           results, fingerprint, created_at
    FROM test_reports
"#;

/// Intermediate row struct for database mapping.
struct ReportRow {
    report_id: String,
    patient_id: String,
    invoice_id: String,
    template_id: String,
    comment: String,
    complete_status: bool,
    repeat_status: bool,
    out_of_range_status: bool,
    results: String,
    fingerprint: String,
    created_at: String,
}

fn map_report_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        report_id: row.get(0)?,
        patient_id: row.get(1)?,
        invoice_id: row.get(2)?,
        template_id: row.get(3)?,
        comment: row.get(4)?,
        complete_status: row.get(5)?,
        repeat_status: row.get(6)?,
        out_of_range_status: row.get(7)?,
        results: row.get(8)?,
        fingerprint: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl TryFrom<ReportRow> for StoredReport {
    type Error = DbError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let results: Vec<ResultEntry> = serde_json::from_str(&row.results)?;

        Ok(StoredReport {
            report_id: row.report_id,
            patient_id: row.patient_id,
            invoice_id: row.invoice_id,
            template_id: row.template_id,
            comment: row.comment,
            complete_status: row.complete_status,
            repeat_status: row.repeat_status,
            out_of_range_status: row.out_of_range_status,
            results,
            fingerprint: row.fingerprint,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldDefinition, ReportSubmission, ResultValue, TestTemplate};

    fn setup_db() -> (Database, TestTemplate) {
        let db = Database::open_in_memory().unwrap();
        let mut template = TestTemplate::new("Basic Metabolic".into());
        template.fields = vec![FieldDefinition::numeric("Glucose", "mg/dL").with_variable("glu")];
        db.upsert_template(&template).unwrap();
        (db, template)
    }

    fn make_report(template: &TestTemplate, patient: &str, invoice: &str) -> StoredReport {
        let mut entry =
            crate::models::ResultEntry::from_definition(&template.fields[0]);
        entry.result = ResultValue::Number(92.0);

        let submission = ReportSubmission {
            patient_id: patient.into(),
            invoice_id: invoice.into(),
            template_id: template.template_id.clone(),
            comment: String::new(),
            complete_status: true,
            repeat_status: false,
            out_of_range_status: false,
            results: vec![entry],
        };
        let fingerprint = crate::submit::submission_fingerprint(&submission).unwrap();
        StoredReport::from_submission(submission, fingerprint)
    }

    #[test]
    fn test_insert_and_get_report() {
        let (db, template) = setup_db();
        let report = make_report(&template, "patient-1", "invoice-1");
        db.insert_report(&report).unwrap();

        let retrieved = db.get_report(&report.report_id).unwrap().unwrap();
        assert_eq!(retrieved, report);
    }

    #[test]
    fn test_list_reports_by_patient_and_invoice() {
        let (db, template) = setup_db();
        db.insert_report(&make_report(&template, "patient-1", "invoice-1"))
            .unwrap();
        db.insert_report(&make_report(&template, "patient-1", "invoice-2"))
            .unwrap();
        db.insert_report(&make_report(&template, "patient-2", "invoice-3"))
            .unwrap();

        assert_eq!(db.list_reports().unwrap().len(), 3);
        assert_eq!(db.list_reports_for_patient("patient-1").unwrap().len(), 2);
        assert_eq!(db.list_reports_for_invoice("invoice-3").unwrap().len(), 1);
        assert!(db.list_reports_for_patient("patient-9").unwrap().is_empty());
    }

    #[test]
    fn test_delete_report() {
        let (db, template) = setup_db();
        let report = make_report(&template, "patient-1", "invoice-1");
        db.insert_report(&report).unwrap();

        assert!(db.delete_report(&report.report_id).unwrap());
        assert!(db.get_report(&report.report_id).unwrap().is_none());
    }

    #[test]
    fn test_fingerprint_verification_detects_tampering() {
        let (db, template) = setup_db();
        let report = make_report(&template, "patient-1", "invoice-1");
        db.insert_report(&report).unwrap();

        assert!(db.verify_report_fingerprint(&report.report_id).unwrap());

        // Tamper with the stored results
        db.conn()
            .execute(
                "UPDATE test_reports SET results = '[]' WHERE report_id = ?",
                [report.report_id.as_str()],
            )
            .unwrap();
        assert!(!db.verify_report_fingerprint(&report.report_id).unwrap());
    }
}
