//! Report export as JSON and CSV.

use serde::{Deserialize, Serialize};

use crate::db::{Database, DbError, DbResult};
use crate::models::StoredReport;

/// Export of a single report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportExport {
    /// Export metadata
    pub metadata: ReportMetadata,
    /// One row per panel field
    pub rows: Vec<ReportRow>,
}

/// Report export metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report ID for traceability
    pub report_id: String,
    /// Patient the report belongs to
    pub patient_id: String,
    /// Invoice the report bills against
    pub invoice_id: String,
    /// Template the report was entered from
    pub template_id: String,
    /// Technician notes
    pub comment: String,
    /// Whether the panel must be re-run
    pub repeat_status: bool,
    /// Whether any result fell outside its reference range
    pub out_of_range_status: bool,
    /// Submission timestamp
    pub submitted_at: String,
    /// Export timestamp
    pub exported_at: String,
    /// Integrity fingerprint
    pub fingerprint: String,
}

/// Single exported result row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    /// Test label
    pub test_name: String,
    /// Display value
    pub result: String,
    /// Display unit
    pub unit: String,
    /// Display reference range
    pub normal_range: String,
    /// Whether this row's result is outside its reference range
    pub flagged: bool,
}

impl ReportExport {
    /// Flatten a stored report for export.
    pub fn from_stored(report: &StoredReport) -> Self {
        let rows = report
            .results
            .iter()
            .map(|entry| ReportRow {
                test_name: entry.test_name.clone(),
                result: entry.result.display(),
                unit: entry.unit.clone(),
                normal_range: entry.normal_range.clone(),
                flagged: entry.is_out_of_range(),
            })
            .collect();

        Self {
            metadata: ReportMetadata {
                report_id: report.report_id.clone(),
                patient_id: report.patient_id.clone(),
                invoice_id: report.invoice_id.clone(),
                template_id: report.template_id.clone(),
                comment: report.comment.clone(),
                repeat_status: report.repeat_status,
                out_of_range_status: report.out_of_range_status,
                submitted_at: report.created_at.clone(),
                exported_at: chrono::Utc::now().to_rfc3339(),
                fingerprint: report.fingerprint.clone(),
            },
            rows,
        }
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV format.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str(CSV_HEADER);
        push_csv_rows(&mut csv, self);
        csv
    }
}

/// Batch report export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReportExport {
    /// Export timestamp
    pub exported_at: String,
    /// Individual report exports
    pub reports: Vec<ReportExport>,
    /// Total row count
    pub total_rows: usize,
}

impl BatchReportExport {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV format.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str(CSV_HEADER);
        for report in &self.reports {
            push_csv_rows(&mut csv, report);
        }
        csv
    }
}

const CSV_HEADER: &str =
    "report_id,patient_id,invoice_id,test_name,result,unit,normal_range,flagged,submitted_at,fingerprint\n";

fn push_csv_rows(csv: &mut String, export: &ReportExport) {
    for row in &export.rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            escape_csv(&export.metadata.report_id),
            escape_csv(&export.metadata.patient_id),
            escape_csv(&export.metadata.invoice_id),
            escape_csv(&row.test_name),
            escape_csv(&row.result),
            escape_csv(&row.unit),
            escape_csv(&row.normal_range),
            row.flagged,
            escape_csv(&export.metadata.submitted_at),
            escape_csv(&export.metadata.fingerprint),
        ));
    }
}

/// Report exporter over the report store.
pub struct ReportExporter<'a> {
    db: &'a Database,
}

impl<'a> ReportExporter<'a> {
    /// Create a new report exporter.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Export a single report.
    pub fn export_by_id(&self, report_id: &str) -> DbResult<ReportExport> {
        let report = self
            .db
            .get_report(report_id)?
            .ok_or_else(|| DbError::NotFound(format!("report {}", report_id)))?;
        Ok(ReportExport::from_stored(&report))
    }

    /// Export all reports.
    pub fn export_all(&self) -> DbResult<BatchReportExport> {
        Ok(batch(self.db.list_reports()?))
    }

    /// Export all reports for a patient.
    pub fn export_for_patient(&self, patient_id: &str) -> DbResult<BatchReportExport> {
        Ok(batch(self.db.list_reports_for_patient(patient_id)?))
    }
}

fn batch(reports: Vec<StoredReport>) -> BatchReportExport {
    let exports: Vec<ReportExport> = reports.iter().map(ReportExport::from_stored).collect();
    let total_rows = exports.iter().map(|e| e.rows.len()).sum();

    BatchReportExport {
        exported_at: chrono::Utc::now().to_rfc3339(),
        reports: exports,
        total_rows,
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
