//! Report models: working entries, frozen submissions, stored reports.

use serde::{Deserialize, Serialize};

use super::range::NormalRange;
use super::template::{FieldDefinition, InputKind};

/// The value of one result entry.
///
/// Serializes untagged: `null` while empty, a JSON number for numeric
/// results, a JSON string for text/select results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResultValue {
    Empty,
    Number(f64),
    Text(String),
}

impl ResultValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResultValue::Empty)
    }

    /// Numeric view of the value, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResultValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Display form: empty string, bare number, or the text itself.
    pub fn display(&self) -> String {
        match self {
            ResultValue::Empty => String::new(),
            ResultValue::Number(n) => format!("{}", n),
            ResultValue::Text(s) => s.clone(),
        }
    }
}

/// One working row of a report session; mirrors its field definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultEntry {
    /// Display label
    pub test_name: String,
    /// Raw or computed value
    pub result: ResultValue,
    /// Display unit
    pub unit: String,
    /// Display reference range
    pub normal_range: String,
    /// Input widget kind
    pub input_kind: InputKind,
    /// Choices for select fields
    pub options: Vec<String>,
    /// Published variable name
    pub variable: Option<String>,
    /// Formula for derived fields
    pub formula: Option<String>,
}

impl ResultEntry {
    /// Blank entry for a field definition.
    pub fn from_definition(def: &FieldDefinition) -> Self {
        Self {
            test_name: def.test_name.clone(),
            result: ResultValue::Empty,
            unit: def.unit.clone(),
            normal_range: def.normal_range.clone(),
            input_kind: def.input_kind,
            options: def.options.clone(),
            variable: def.variable.clone(),
            formula: def.formula.clone(),
        }
    }

    /// Entries with a formula never accept direct input.
    pub fn is_derived(&self) -> bool {
        self.formula.is_some()
    }

    /// Whether the numeric result falls outside the parsed reference range.
    ///
    /// Empty results, text results, and unparseable ranges never flag.
    pub fn is_out_of_range(&self) -> bool {
        match (self.result.as_number(), NormalRange::parse(&self.normal_range)) {
            (Some(value), Some(range)) => !range.contains(value),
            _ => false,
        }
    }
}

/// A frozen report, assembled once at submit time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSubmission {
    /// Patient the report belongs to
    pub patient_id: String,
    /// Invoice the report bills against
    pub invoice_id: String,
    /// Template the report was entered from
    pub template_id: String,
    /// Technician notes
    pub comment: String,
    /// Always true for submitted reports
    pub complete_status: bool,
    /// Whether the panel must be re-run
    pub repeat_status: bool,
    /// Whether any result fell outside its reference range
    pub out_of_range_status: bool,
    /// Final entries, in template order
    pub results: Vec<ResultEntry>,
}

impl ReportSubmission {
    /// Serialize to canonical JSON for fingerprinting.
    ///
    /// Field order is struct order, so equal submissions hash equally.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A submission persisted to the report store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredReport {
    /// Unique report ID
    pub report_id: String,
    /// Patient the report belongs to
    pub patient_id: String,
    /// Invoice the report bills against
    pub invoice_id: String,
    /// Template the report was entered from
    pub template_id: String,
    /// Technician notes
    pub comment: String,
    /// Always true for submitted reports
    pub complete_status: bool,
    /// Whether the panel must be re-run
    pub repeat_status: bool,
    /// Whether any result fell outside its reference range
    pub out_of_range_status: bool,
    /// Final entries, in template order
    pub results: Vec<ResultEntry>,
    /// SHA-256 of the canonical submission JSON
    pub fingerprint: String,
    /// Storage timestamp
    pub created_at: String,
}

impl StoredReport {
    /// Wrap a submission for storage.
    pub fn from_submission(submission: ReportSubmission, fingerprint: String) -> Self {
        Self {
            report_id: uuid::Uuid::new_v4().to_string(),
            patient_id: submission.patient_id,
            invoice_id: submission.invoice_id,
            template_id: submission.template_id,
            comment: submission.comment,
            complete_status: submission.complete_status,
            repeat_status: submission.repeat_status,
            out_of_range_status: submission.out_of_range_status,
            results: submission.results,
            fingerprint,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild the submission this report was stored from.
    pub fn to_submission(&self) -> ReportSubmission {
        ReportSubmission {
            patient_id: self.patient_id.clone(),
            invoice_id: self.invoice_id.clone(),
            template_id: self.template_id.clone(),
            comment: self.comment.clone(),
            complete_status: self.complete_status,
            repeat_status: self.repeat_status,
            out_of_range_status: self.out_of_range_status,
            results: self.results.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::template::FieldDefinition;

    fn hemoglobin_entry(value: f64) -> ResultEntry {
        let def = FieldDefinition::numeric("Hemoglobin", "g/dL")
            .with_variable("hgb")
            .with_normal_range("13.5 - 17.5");
        let mut entry = ResultEntry::from_definition(&def);
        entry.result = ResultValue::Number(value);
        entry
    }

    #[test]
    fn test_entry_from_definition_starts_empty() {
        let def = FieldDefinition::numeric("Glucose", "mg/dL").with_variable("glu");
        let entry = ResultEntry::from_definition(&def);

        assert!(entry.result.is_empty());
        assert_eq!(entry.variable.as_deref(), Some("glu"));
        assert!(!entry.is_derived());
    }

    #[test]
    fn test_result_value_serialization() {
        assert_eq!(serde_json::to_string(&ResultValue::Empty).unwrap(), "null");
        assert_eq!(serde_json::to_string(&ResultValue::Number(3.1)).unwrap(), "3.1");
        assert_eq!(
            serde_json::to_string(&ResultValue::Text("Positive".into())).unwrap(),
            "\"Positive\""
        );

        let back: ResultValue = serde_json::from_str("14.2").unwrap();
        assert_eq!(back, ResultValue::Number(14.2));
        let back: ResultValue = serde_json::from_str("null").unwrap();
        assert_eq!(back, ResultValue::Empty);
    }

    #[test]
    fn test_result_value_display() {
        assert_eq!(ResultValue::Empty.display(), "");
        assert_eq!(ResultValue::Number(10.0).display(), "10");
        assert_eq!(ResultValue::Number(3.1).display(), "3.1");
        assert_eq!(ResultValue::Text("Negative".into()).display(), "Negative");
    }

    #[test]
    fn test_out_of_range_detection() {
        assert!(!hemoglobin_entry(14.0).is_out_of_range());
        assert!(hemoglobin_entry(11.2).is_out_of_range());
        assert!(hemoglobin_entry(19.0).is_out_of_range());

        // No parseable range: never flags
        let mut entry = hemoglobin_entry(99.0);
        entry.normal_range = "see note".into();
        assert!(!entry.is_out_of_range());
    }

    #[test]
    fn test_canonical_json_deterministic() {
        let submission = ReportSubmission {
            patient_id: "patient-1".into(),
            invoice_id: "invoice-1".into(),
            template_id: "template-1".into(),
            comment: String::new(),
            complete_status: true,
            repeat_status: false,
            out_of_range_status: false,
            results: vec![hemoglobin_entry(14.0)],
        };

        let json1 = submission.to_canonical_json().unwrap();
        let json2 = submission.to_canonical_json().unwrap();
        assert_eq!(json1, json2);
    }

    #[test]
    fn test_stored_report_round_trip() {
        let submission = ReportSubmission {
            patient_id: "patient-1".into(),
            invoice_id: "invoice-1".into(),
            template_id: "template-1".into(),
            comment: "hemolyzed sample".into(),
            complete_status: true,
            repeat_status: true,
            out_of_range_status: false,
            results: vec![hemoglobin_entry(14.0)],
        };

        let stored = StoredReport::from_submission(submission.clone(), "abc123".into());
        assert_eq!(stored.report_id.len(), 36);
        assert_eq!(stored.fingerprint, "abc123");
        assert_eq!(stored.to_submission(), submission);
    }
}
