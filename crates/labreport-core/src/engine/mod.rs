//! Report-editing session and the dependency-ordered formula evaluator.
//!
//! Pipeline: raw input → Result Store mutation → full evaluator pass →
//! entries and variable table updated in place → (on submit) frozen
//! submission handed to the report store.

pub mod expr;

mod evaluator;
mod order;

pub use evaluator::{parse_numeric_input, round_to_tenth, run_pass};
pub use order::evaluation_order;

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{InputKind, ResultEntry, ResultValue, TestTemplate};

/// Session errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("no field at index {0}")]
    UnknownField(usize),

    #[error("'{0}' is derived and does not accept direct input")]
    DerivedField(String),
}

/// Published variable values for one editing session.
///
/// An explicit value object owned by the session and passed to the
/// evaluator, so the core carries no hidden module-level state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableTable {
    values: HashMap<String, f64>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The working state of one report: entries plus variable table.
///
/// Exclusively owned by one editing session; discarded on submit or when
/// the technician navigates away. Never shared across sessions.
#[derive(Debug, Clone)]
pub struct ReportSession {
    template_id: String,
    template_name: String,
    entries: Vec<ResultEntry>,
    variables: VariableTable,
}

impl ReportSession {
    /// Initialize a session with one blank entry per field definition.
    pub fn new(template: &TestTemplate) -> Self {
        Self {
            template_id: template.template_id.clone(),
            template_name: template.template_name.clone(),
            entries: template.fields.iter().map(ResultEntry::from_definition).collect(),
            variables: VariableTable::new(),
        }
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Record raw input for a non-derived field, then recompute.
    ///
    /// Numeric fields store the parsed value (zero on parse failure),
    /// rounded to one decimal. Text and select fields keep the raw string
    /// but still publish their numeric interpretation when the field has a
    /// variable, so formulas over such fields keep working.
    pub fn set_raw_value(&mut self, index: usize, raw: &str) -> Result<(), SessionError> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(SessionError::UnknownField(index))?;
        if entry.is_derived() {
            return Err(SessionError::DerivedField(entry.test_name.clone()));
        }

        let numeric = round_to_tenth(parse_numeric_input(raw));
        entry.result = match entry.input_kind {
            InputKind::Number => ResultValue::Number(numeric),
            InputKind::Text | InputKind::Select => ResultValue::Text(raw.to_string()),
        };
        if let Some(variable) = entry.variable.clone() {
            self.variables.set(&variable, numeric);
        }

        self.recompute();
        Ok(())
    }

    /// Run one full evaluator pass over the entries.
    pub fn recompute(&mut self) {
        run_pass(&mut self.entries, &mut self.variables);
    }

    /// Indices of entries whose numeric result falls outside their parsed
    /// reference range.
    pub fn out_of_range_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_out_of_range())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn any_out_of_range(&self) -> bool {
        self.entries.iter().any(|entry| entry.is_out_of_range())
    }
}
