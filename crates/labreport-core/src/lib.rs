//! Labreport Core Library
//!
//! Local-first result entry for a medical testing laboratory.
//!
//! # Architecture
//!
//! ```text
//! Template Catalog ──▶ Report Session (entries + variable table)
//!                              │
//!                      technician types a value
//!                              │
//!                  ┌───────────▼───────────┐
//!                  │    Evaluator Pass     │
//!                  │  dependency-ordered,  │
//!                  │  every derived field  │
//!                  │  recomputed in place  │
//!                  └───────────┬───────────┘
//!                              │
//!                        (on submit)
//!                              │
//!                  ┌───────────▼───────────┐
//!                  │  Submission Assembler │
//!                  │  validate · freeze ·  │
//!                  │  fingerprint · store  │
//!                  └───────────┬───────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!          Report          CSV/JSON         Billing
//!          Lookup           Export          Systems
//! ```
//!
//! # Core Principle
//!
//! **Derived fields are never typed.** A field with a formula only ever
//! holds evaluator output, recomputed after every input in an order that
//! respects inter-field dependencies.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer with FTS5 template search
//! - [`models`]: Domain types (TestTemplate, ResultEntry, StoredReport, etc.)
//! - [`engine`]: Report session, variable table, formula evaluator
//! - [`submit`]: Submission validation, fingerprinting and storage
//! - [`export`]: JSON/CSV report export

pub mod db;
pub mod engine;
pub mod export;
pub mod models;
pub mod submit;

// Re-export commonly used types
pub use db::Database;
pub use engine::{ReportSession, SessionError, VariableTable};
pub use models::{
    FieldDefinition, InputKind, NormalRange, ReportSubmission, ResultEntry, ResultValue,
    StoredReport, TemplateIssue, TestTemplate,
};
pub use submit::{SubmissionDraft, Submitter};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum LabReportError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Missing context: {0}")]
    MissingContext(String),
}

impl From<db::DbError> for LabReportError {
    fn from(e: db::DbError) -> Self {
        LabReportError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for LabReportError {
    fn from(e: serde_json::Error) -> Self {
        LabReportError::SerializationError(e.to_string())
    }
}

impl From<engine::SessionError> for LabReportError {
    fn from(e: engine::SessionError) -> Self {
        LabReportError::InvalidInput(e.to_string())
    }
}

impl From<submit::SubmitError> for LabReportError {
    fn from(e: submit::SubmitError) -> Self {
        match e {
            submit::SubmitError::MissingContext(what) => {
                LabReportError::MissingContext(what.to_string())
            }
            submit::SubmitError::Database(db) => LabReportError::DatabaseError(db.to_string()),
            submit::SubmitError::Json(json) => LabReportError::SerializationError(json.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for LabReportError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        LabReportError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<LabReportCore>, LabReportError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(LabReportCore {
        db: Arc::new(Mutex::new(db)),
        sessions: Mutex::new(HashMap::new()),
    }))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<LabReportCore>, LabReportError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(LabReportCore {
        db: Arc::new(Mutex::new(db)),
        sessions: Mutex::new(HashMap::new()),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe core wrapper for FFI.
///
/// Report sessions live only in this map; they are dropped on submit or
/// discard and never persisted.
#[derive(uniffi::Object)]
pub struct LabReportCore {
    db: Arc<Mutex<Database>>,
    sessions: Mutex<HashMap<String, ReportSession>>,
}

#[uniffi::export]
impl LabReportCore {
    // =========================================================================
    // Template Operations
    // =========================================================================

    /// Add or update a test template.
    pub fn upsert_template(&self, template: FfiTestTemplate) -> Result<(), LabReportError> {
        let db = self.db.lock()?;
        let template: TestTemplate = template.into();
        db.upsert_template(&template)?;
        Ok(())
    }

    /// Get a template by ID.
    pub fn get_template(
        &self,
        template_id: String,
    ) -> Result<Option<FfiTestTemplate>, LabReportError> {
        let db = self.db.lock()?;
        let template = db.get_template(&template_id)?;
        Ok(template.map(|t| t.into()))
    }

    /// List templates, optionally only active ones.
    pub fn list_templates(&self, active_only: bool) -> Result<Vec<FfiTestTemplate>, LabReportError> {
        let db = self.db.lock()?;
        let templates = db.list_templates(active_only)?;
        Ok(templates.into_iter().map(|t| t.into()).collect())
    }

    /// Search active templates by panel name.
    pub fn search_templates(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiTestTemplate>, LabReportError> {
        let db = self.db.lock()?;
        let templates = db.search_templates(&query, limit as usize)?;
        Ok(templates.into_iter().map(|t| t.into()).collect())
    }

    /// Mark a template inactive.
    pub fn deactivate_template(&self, template_id: String) -> Result<bool, LabReportError> {
        let db = self.db.lock()?;
        Ok(db.deactivate_template(&template_id)?)
    }

    /// Lint a template for authoring mistakes; returns human-readable issues.
    pub fn validate_template(&self, template: FfiTestTemplate) -> Vec<String> {
        let template: TestTemplate = template.into();
        template.validate().iter().map(|i| i.to_string()).collect()
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Start a report-editing session from a stored template.
    pub fn start_session(&self, template_id: String) -> Result<FfiSessionState, LabReportError> {
        let template = {
            let db = self.db.lock()?;
            db.get_template(&template_id)?
                .ok_or_else(|| LabReportError::NotFound(format!("template {}", template_id)))?
        };

        let session = ReportSession::new(&template);
        let session_id = uuid::Uuid::new_v4().to_string();
        let state = FfiSessionState::new(&session_id, &session);

        let mut sessions = self.sessions.lock()?;
        sessions.insert(session_id, session);
        Ok(state)
    }

    /// Record raw input for one field and recompute derived fields.
    pub fn set_result(
        &self,
        session_id: String,
        index: u32,
        value: String,
    ) -> Result<FfiSessionState, LabReportError> {
        let mut sessions = self.sessions.lock()?;
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| LabReportError::NotFound(format!("session {}", session_id)))?;

        session.set_raw_value(index as usize, &value)?;
        Ok(FfiSessionState::new(&session_id, session))
    }

    /// Drop a session without submitting.
    pub fn discard_session(&self, session_id: String) -> Result<bool, LabReportError> {
        let mut sessions = self.sessions.lock()?;
        Ok(sessions.remove(&session_id).is_some())
    }

    // =========================================================================
    // Submission Operations
    // =========================================================================

    /// Validate, freeze and store a session as a report.
    ///
    /// The session is kept alive on failure so the caller can fix the
    /// context and resubmit; it is dropped once the report is stored.
    pub fn submit_report(
        &self,
        session_id: String,
        request: FfiSubmitRequest,
    ) -> Result<FfiStoredReport, LabReportError> {
        let mut sessions = self.sessions.lock()?;
        let session = sessions
            .get(&session_id)
            .ok_or_else(|| LabReportError::NotFound(format!("session {}", session_id)))?;

        let stored = {
            let db = self.db.lock()?;
            Submitter::new(&db).submit(session, request.into())?
        };

        sessions.remove(&session_id);
        Ok(stored.into())
    }

    // =========================================================================
    // Report Operations
    // =========================================================================

    /// Get a stored report by ID.
    pub fn get_report(&self, report_id: String) -> Result<Option<FfiStoredReport>, LabReportError> {
        let db = self.db.lock()?;
        let report = db.get_report(&report_id)?;
        Ok(report.map(|r| r.into()))
    }

    /// List all reports for a patient, newest first.
    pub fn list_reports_for_patient(
        &self,
        patient_id: String,
    ) -> Result<Vec<FfiStoredReport>, LabReportError> {
        let db = self.db.lock()?;
        let reports = db.list_reports_for_patient(&patient_id)?;
        Ok(reports.into_iter().map(|r| r.into()).collect())
    }

    /// Verify a stored report against its fingerprint.
    pub fn verify_report(&self, report_id: String) -> Result<bool, LabReportError> {
        let db = self.db.lock()?;
        Ok(db.verify_report_fingerprint(&report_id)?)
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    /// Export one report as JSON.
    pub fn export_report_json(&self, report_id: String) -> Result<String, LabReportError> {
        let db = self.db.lock()?;
        let exporter = export::ReportExporter::new(&db);
        let export = exporter.export_by_id(&report_id)?;
        Ok(export.to_json()?)
    }

    /// Export all reports as CSV.
    pub fn export_reports_csv(&self) -> Result<String, LabReportError> {
        let db = self.db.lock()?;
        let exporter = export::ReportExporter::new(&db);
        let batch = exporter.export_all()?;
        Ok(batch.to_csv())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe field definition.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFieldDefinition {
    pub test_name: String,
    pub unit: String,
    pub normal_range: String,
    pub input_kind: String,
    pub options: Vec<String>,
    pub variable: Option<String>,
    pub formula: Option<String>,
}

impl From<FieldDefinition> for FfiFieldDefinition {
    fn from(def: FieldDefinition) -> Self {
        Self {
            test_name: def.test_name,
            unit: def.unit,
            normal_range: def.normal_range,
            input_kind: def.input_kind.as_str().to_string(),
            options: def.options,
            variable: def.variable,
            formula: def.formula,
        }
    }
}

impl From<FfiFieldDefinition> for FieldDefinition {
    fn from(def: FfiFieldDefinition) -> Self {
        FieldDefinition {
            test_name: def.test_name,
            unit: def.unit,
            normal_range: def.normal_range,
            input_kind: InputKind::parse(&def.input_kind).unwrap_or(InputKind::Text),
            options: def.options,
            variable: def.variable,
            formula: def.formula,
        }
    }
}

/// FFI-safe test template.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestTemplate {
    /// Empty to have an ID assigned on creation
    pub template_id: String,
    pub template_name: String,
    pub fields: Vec<FfiFieldDefinition>,
    pub active: bool,
}

impl From<TestTemplate> for FfiTestTemplate {
    fn from(template: TestTemplate) -> Self {
        Self {
            template_id: template.template_id,
            template_name: template.template_name,
            fields: template.fields.into_iter().map(|f| f.into()).collect(),
            active: template.active,
        }
    }
}

impl From<FfiTestTemplate> for TestTemplate {
    fn from(template: FfiTestTemplate) -> Self {
        let mut result = TestTemplate::new(template.template_name);
        if !template.template_id.is_empty() {
            result.template_id = template.template_id;
        }
        result.fields = template.fields.into_iter().map(|f| f.into()).collect();
        result.active = template.active;
        result
    }
}

/// FFI-safe result entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiResultEntry {
    pub test_name: String,
    /// Display form of the value; empty while unset
    pub result: String,
    pub unit: String,
    pub normal_range: String,
    pub input_kind: String,
    pub options: Vec<String>,
    pub variable: Option<String>,
    pub formula: Option<String>,
    pub derived: bool,
    pub out_of_range: bool,
}

impl From<&ResultEntry> for FfiResultEntry {
    fn from(entry: &ResultEntry) -> Self {
        Self {
            test_name: entry.test_name.clone(),
            result: entry.result.display(),
            unit: entry.unit.clone(),
            normal_range: entry.normal_range.clone(),
            input_kind: entry.input_kind.as_str().to_string(),
            options: entry.options.clone(),
            variable: entry.variable.clone(),
            formula: entry.formula.clone(),
            derived: entry.is_derived(),
            out_of_range: entry.is_out_of_range(),
        }
    }
}

/// FFI-safe session snapshot returned after every mutation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSessionState {
    pub session_id: String,
    pub template_id: String,
    pub template_name: String,
    pub entries: Vec<FfiResultEntry>,
    pub any_out_of_range: bool,
}

impl FfiSessionState {
    fn new(session_id: &str, session: &ReportSession) -> Self {
        Self {
            session_id: session_id.to_string(),
            template_id: session.template_id().to_string(),
            template_name: session.template_name().to_string(),
            entries: session.entries().iter().map(|e| e.into()).collect(),
            any_out_of_range: session.any_out_of_range(),
        }
    }
}

/// FFI-safe submission request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSubmitRequest {
    pub patient_id: Option<String>,
    pub invoice_id: Option<String>,
    pub comment: String,
    pub repeat_status: bool,
    /// Computed from the session's reference ranges when not supplied
    pub out_of_range_status: Option<bool>,
}

impl From<FfiSubmitRequest> for SubmissionDraft {
    fn from(request: FfiSubmitRequest) -> Self {
        SubmissionDraft {
            patient_id: request.patient_id,
            invoice_id: request.invoice_id,
            comment: request.comment,
            repeat_status: request.repeat_status,
            out_of_range_status: request.out_of_range_status,
        }
    }
}

/// FFI-safe stored report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStoredReport {
    pub report_id: String,
    pub patient_id: String,
    pub invoice_id: String,
    pub template_id: String,
    pub comment: String,
    pub complete_status: bool,
    pub repeat_status: bool,
    pub out_of_range_status: bool,
    pub results: Vec<FfiResultEntry>,
    pub fingerprint: String,
    pub created_at: String,
}

impl From<StoredReport> for FfiStoredReport {
    fn from(report: StoredReport) -> Self {
        Self {
            report_id: report.report_id,
            patient_id: report.patient_id,
            invoice_id: report.invoice_id,
            template_id: report.template_id,
            comment: report.comment,
            complete_status: report.complete_status,
            repeat_status: report.repeat_status,
            out_of_range_status: report.out_of_range_status,
            results: report.results.iter().map(|e| e.into()).collect(),
            fingerprint: report.fingerprint,
            created_at: report.created_at,
        }
    }
}
