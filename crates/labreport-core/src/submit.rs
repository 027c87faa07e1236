//! Submission assembly: validate context, freeze the session, store.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db::Database;
use crate::engine::ReportSession;
use crate::models::{ReportSubmission, StoredReport};

/// Submission errors.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("missing submission context: {0}")]
    MissingContext(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DbError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SubmitResult<T> = Result<T, SubmitError>;

/// Caller-provided context and flags for one submission.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDraft {
    /// Patient the report belongs to; required
    pub patient_id: Option<String>,
    /// Invoice the report bills against; required
    pub invoice_id: Option<String>,
    /// Technician notes
    pub comment: String,
    /// Whether the panel must be re-run
    pub repeat_status: bool,
    /// Out-of-range flag; computed from the session's reference ranges
    /// when not supplied
    pub out_of_range_status: Option<bool>,
}

/// Assembles and stores report submissions.
pub struct Submitter<'a> {
    db: &'a Database,
}

impl<'a> Submitter<'a> {
    /// Create a new submitter.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Validate, freeze and store the session as a report.
    ///
    /// Validation failures leave the store untouched and the session
    /// intact, so the technician can fix the context and resubmit.
    pub fn submit(
        &self,
        session: &ReportSession,
        draft: SubmissionDraft,
    ) -> SubmitResult<StoredReport> {
        let submission = assemble(session, draft)?;
        let fingerprint = submission_fingerprint(&submission)?;
        let stored = StoredReport::from_submission(submission, fingerprint);

        self.db.insert_report(&stored)?;
        tracing::debug!(
            report_id = %stored.report_id,
            template_id = %stored.template_id,
            "report submitted"
        );
        Ok(stored)
    }
}

/// Freeze a session into a submission, validating required context.
pub fn assemble(session: &ReportSession, draft: SubmissionDraft) -> SubmitResult<ReportSubmission> {
    let patient_id = require(draft.patient_id, "patient id")?;
    let invoice_id = require(draft.invoice_id, "invoice id")?;
    if session.template_id().trim().is_empty() {
        return Err(SubmitError::MissingContext("template id"));
    }

    Ok(ReportSubmission {
        patient_id,
        invoice_id,
        template_id: session.template_id().to_string(),
        comment: draft.comment,
        complete_status: true,
        repeat_status: draft.repeat_status,
        out_of_range_status: draft
            .out_of_range_status
            .unwrap_or_else(|| session.any_out_of_range()),
        results: session.entries().to_vec(),
    })
}

/// SHA-256 hex fingerprint of the canonical submission JSON.
pub fn submission_fingerprint(submission: &ReportSubmission) -> Result<String, serde_json::Error> {
    let canonical = submission.to_canonical_json()?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn require(value: Option<String>, what: &'static str) -> SubmitResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SubmitError::MissingContext(what)),
    }
}
