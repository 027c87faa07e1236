//! Test template (panel) models.

use serde::{Deserialize, Serialize};

/// A test template describing one lab panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestTemplate {
    /// Unique template ID
    pub template_id: String,
    /// Panel display name (e.g., "Complete Blood Count")
    pub template_name: String,
    /// Ordered field definitions for the panel
    pub fields: Vec<FieldDefinition>,
    /// Whether this template is offered for new reports
    pub active: bool,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

/// One row of a test template, either directly entered or formula-derived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    /// Display label, not unique within the panel
    pub test_name: String,
    /// Display unit (e.g., "g/dL")
    pub unit: String,
    /// Display reference range (e.g., "13.5 - 17.5")
    pub normal_range: String,
    /// Input widget kind; does not affect evaluation
    pub input_kind: InputKind,
    /// Choices for `select` fields
    pub options: Vec<String>,
    /// Name under which this field's value is published to other formulas
    pub variable: Option<String>,
    /// Arithmetic expression over published variables; makes the field derived
    pub formula: Option<String>,
}

/// Input widget kind for a field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Number,
    Text,
    Select,
}

impl InputKind {
    /// Lowercase wire name, also used across the FFI boundary.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Number => "number",
            InputKind::Text => "text",
            InputKind::Select => "select",
        }
    }

    /// Parse a lowercase wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "number" => Some(InputKind::Number),
            "text" => Some(InputKind::Text),
            "select" => Some(InputKind::Select),
            _ => None,
        }
    }
}

impl FieldDefinition {
    /// Create a directly-entered numeric field.
    pub fn numeric(test_name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            unit: unit.into(),
            normal_range: String::new(),
            input_kind: InputKind::Number,
            options: Vec::new(),
            variable: None,
            formula: None,
        }
    }

    /// Attach a published variable name.
    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    /// Attach a formula, making the field derived.
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Attach a display reference range.
    pub fn with_normal_range(mut self, range: impl Into<String>) -> Self {
        self.normal_range = range.into();
        self
    }

    /// A field with a formula never accepts direct input.
    pub fn is_derived(&self) -> bool {
        self.formula.is_some()
    }
}

impl TestTemplate {
    /// Create a new template with required fields.
    pub fn new(template_name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            template_id: uuid::Uuid::new_v4().to_string(),
            template_name,
            fields: Vec::new(),
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Names published by any field of the template.
    pub fn published_variables(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter_map(|f| f.variable.as_deref())
            .collect()
    }

    /// Lint the template for authoring mistakes.
    ///
    /// Non-blocking: storage accepts templates with issues, the UI decides
    /// what to surface.
    pub fn validate(&self) -> Vec<TemplateIssue> {
        let mut issues = Vec::new();
        let published = self.published_variables();

        let mut seen = std::collections::HashSet::new();
        for var in &published {
            if !seen.insert(*var) {
                issues.push(TemplateIssue::DuplicateVariable {
                    variable: (*var).to_string(),
                });
            }
        }

        for field in &self.fields {
            if field.input_kind == InputKind::Select && field.options.is_empty() {
                issues.push(TemplateIssue::SelectWithoutOptions {
                    test_name: field.test_name.clone(),
                });
            }
            if field.is_derived() && field.input_kind == InputKind::Select {
                issues.push(TemplateIssue::DerivedSelect {
                    test_name: field.test_name.clone(),
                });
            }
            if let Some(formula) = &field.formula {
                match crate::engine::expr::referenced_variables(formula) {
                    Ok(refs) => {
                        for name in refs {
                            if !published.contains(&name.as_str()) {
                                issues.push(TemplateIssue::UnknownVariable {
                                    test_name: field.test_name.clone(),
                                    variable: name,
                                });
                            }
                        }
                    }
                    Err(err) => issues.push(TemplateIssue::InvalidFormula {
                        test_name: field.test_name.clone(),
                        message: err.to_string(),
                    }),
                }
            }
        }

        issues
    }
}

/// Authoring problem found while linting a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TemplateIssue {
    /// Formula does not parse
    InvalidFormula { test_name: String, message: String },
    /// Formula references a variable no field publishes
    UnknownVariable { test_name: String, variable: String },
    /// Two fields publish the same variable name
    DuplicateVariable { variable: String },
    /// Select field with an empty option list
    SelectWithoutOptions { test_name: String },
    /// Derived fields cannot be select inputs
    DerivedSelect { test_name: String },
}

impl std::fmt::Display for TemplateIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateIssue::InvalidFormula { test_name, message } => {
                write!(f, "{}: formula does not parse ({})", test_name, message)
            }
            TemplateIssue::UnknownVariable {
                test_name,
                variable,
            } => write!(f, "{}: formula references unknown variable '{}'", test_name, variable),
            TemplateIssue::DuplicateVariable { variable } => {
                write!(f, "variable '{}' is published by more than one field", variable)
            }
            TemplateIssue::SelectWithoutOptions { test_name } => {
                write!(f, "{}: select field has no options", test_name)
            }
            TemplateIssue::DerivedSelect { test_name } => {
                write!(f, "{}: derived field cannot be a select input", test_name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cbc_like_template() -> TestTemplate {
        let mut template = TestTemplate::new("Differential".into());
        template.fields = vec![
            FieldDefinition::numeric("WBC", "10^3/uL").with_variable("wbc"),
            FieldDefinition::numeric("Neutrophils", "%").with_variable("neut_pct"),
            FieldDefinition::numeric("ANC", "10^3/uL")
                .with_variable("anc")
                .with_formula("wbc * neut_pct / 100"),
        ];
        template
    }

    #[test]
    fn test_template_new() {
        let template = TestTemplate::new("Lipid Panel".into());
        assert_eq!(template.template_name, "Lipid Panel");
        assert!(template.active);
        assert_eq!(template.template_id.len(), 36);
    }

    #[test]
    fn test_published_variables_ordered() {
        let template = cbc_like_template();
        assert_eq!(template.published_variables(), vec!["wbc", "neut_pct", "anc"]);
    }

    #[test]
    fn test_validate_clean_template() {
        assert!(cbc_like_template().validate().is_empty());
    }

    #[test]
    fn test_validate_unknown_variable() {
        let mut template = cbc_like_template();
        template.fields[2].formula = Some("wbc * lymph_pct / 100".into());

        let issues = template.validate();
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            &issues[0],
            TemplateIssue::UnknownVariable { variable, .. } if variable == "lymph_pct"
        ));
    }

    #[test]
    fn test_validate_bad_formula_and_duplicate() {
        let mut template = cbc_like_template();
        template.fields[1].variable = Some("wbc".into());
        template.fields[2].formula = Some("wbc * * 2".into());

        let issues = template.validate();
        assert!(issues
            .iter()
            .any(|i| matches!(i, TemplateIssue::DuplicateVariable { variable } if variable == "wbc")));
        assert!(issues
            .iter()
            .any(|i| matches!(i, TemplateIssue::InvalidFormula { .. })));
    }

    #[test]
    fn test_validate_select_without_options() {
        let mut template = TestTemplate::new("Serology".into());
        template.fields = vec![FieldDefinition {
            test_name: "HBsAg".into(),
            unit: String::new(),
            normal_range: String::new(),
            input_kind: InputKind::Select,
            options: Vec::new(),
            variable: None,
            formula: None,
        }];

        let issues = template.validate();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], TemplateIssue::SelectWithoutOptions { .. }));
    }

    #[test]
    fn test_input_kind_wire_names() {
        assert_eq!(InputKind::Number.as_str(), "number");
        assert_eq!(InputKind::parse("select"), Some(InputKind::Select));
        assert_eq!(InputKind::parse("radio"), None);

        let json = serde_json::to_string(&InputKind::Number).unwrap();
        assert_eq!(json, "\"number\"");
    }
}
