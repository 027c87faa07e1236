//! Golden tests for the formula evaluator.
//!
//! These tests run real panel definitions through a full editing session
//! and verify derived values against hand-computed results.

use labreport_core::engine::ReportSession;
use labreport_core::models::{FieldDefinition, ResultValue, TestTemplate};

/// Test case: one panel, a series of raw inputs, expected derived values.
struct GoldenCase {
    id: &'static str,
    /// (test_name, variable, formula) per field, in panel order
    fields: &'static [(&'static str, Option<&'static str>, Option<&'static str>)],
    /// (field index, raw input) applied in order
    inputs: &'static [(usize, &'static str)],
    /// (field index, expected numeric result) after the final input
    expected: &'static [(usize, f64)],
}

fn get_golden_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            id: "anion-gap",
            fields: &[
                ("Sodium", Some("na"), None),
                ("Chloride", Some("cl"), None),
                ("Bicarbonate", Some("hco3"), None),
                ("Anion Gap", Some("ag"), Some("na - (cl + hco3)")),
            ],
            inputs: &[(0, "140"), (1, "104"), (2, "24")],
            expected: &[(3, 12.0)],
        },
        GoldenCase {
            id: "friedewald-ldl",
            fields: &[
                ("Total Cholesterol", Some("tc"), None),
                ("HDL Cholesterol", Some("hdl"), None),
                ("Triglycerides", Some("tg"), None),
                ("LDL (calculated)", Some("ldl"), Some("tc - hdl - tg / 5")),
            ],
            inputs: &[(0, "200"), (1, "50"), (2, "100")],
            expected: &[(3, 130.0)],
        },
        GoldenCase {
            // Globulin is itself derived and feeds the ratio: a two-step
            // chain that must resolve in a single pass
            id: "albumin-globulin-ratio",
            fields: &[
                ("A/G Ratio", Some("ag_ratio"), Some("alb / glob")),
                ("Total Protein", Some("tp"), None),
                ("Albumin", Some("alb"), None),
                ("Globulin", Some("glob"), Some("tp - alb")),
            ],
            inputs: &[(1, "7.5"), (2, "4.5")],
            expected: &[(3, 3.0), (0, 1.5)],
        },
        GoldenCase {
            id: "absolute-neutrophil-count",
            fields: &[
                ("WBC", Some("wbc"), None),
                ("Neutrophils", Some("neut_pct"), None),
                ("ANC", Some("anc"), Some("wbc * neut_pct / 100")),
            ],
            inputs: &[(0, "6"), (1, "55")],
            expected: &[(2, 3.3)],
        },
        GoldenCase {
            // Raw input is rounded before publication, so the derived
            // value is computed from 7.2, not 7.23
            id: "anc-rounded-input",
            fields: &[
                ("WBC", Some("wbc"), None),
                ("Neutrophils", Some("neut_pct"), None),
                ("ANC", Some("anc"), Some("wbc * neut_pct / 100")),
            ],
            inputs: &[(0, "7.23"), (1, "33")],
            expected: &[(0, 7.2), (2, 2.4)],
        },
        GoldenCase {
            id: "mchc",
            fields: &[
                ("Hemoglobin", Some("hgb"), None),
                ("Hematocrit", Some("hct"), None),
                ("MCHC", Some("mchc"), Some("hgb / hct * 100")),
            ],
            inputs: &[(0, "15"), (1, "45")],
            expected: &[(2, 33.3)],
        },
        GoldenCase {
            // Corrected calcium, standard 0.8 adjustment per g/dL albumin
            id: "corrected-calcium",
            fields: &[
                ("Calcium", Some("ca"), None),
                ("Albumin", Some("alb"), None),
                ("Corrected Calcium", Some("ca_corr"), Some("ca + 0.8 * (4 - alb)")),
            ],
            inputs: &[(0, "8.2"), (1, "2.5")],
            expected: &[(2, 9.4)],
        },
    ]
}

fn build_template(case: &GoldenCase) -> TestTemplate {
    let mut template = TestTemplate::new(case.id.to_string());
    template.fields = case
        .fields
        .iter()
        .map(|(name, variable, formula)| {
            let mut def = FieldDefinition::numeric(*name, "");
            def.variable = variable.map(|v| v.to_string());
            def.formula = formula.map(|f| f.to_string());
            def
        })
        .collect();
    template
}

#[test]
fn test_golden_panels() {
    for case in get_golden_cases() {
        let template = build_template(&case);
        let mut session = ReportSession::new(&template);

        for (index, raw) in case.inputs {
            session
                .set_raw_value(*index, raw)
                .unwrap_or_else(|e| panic!("case {}: input failed: {}", case.id, e));
        }

        for (index, expected) in case.expected {
            let actual = session.entries()[*index].result.as_number();
            assert_eq!(
                actual,
                Some(*expected),
                "case {}: field {} expected {:?}, got {:?}",
                case.id,
                index,
                expected,
                actual
            );
        }
    }
}

#[test]
fn test_golden_panels_are_stable_under_recompute() {
    for case in get_golden_cases() {
        let template = build_template(&case);
        let mut session = ReportSession::new(&template);
        for (index, raw) in case.inputs {
            session.set_raw_value(*index, raw).unwrap();
        }

        let snapshot = session.entries().to_vec();
        session.recompute();
        session.recompute();
        assert_eq!(
            session.entries(),
            snapshot.as_slice(),
            "case {}: recompute drifted",
            case.id
        );
    }
}

#[test]
fn test_partial_panel_leaves_derived_fields_empty() {
    let cases = get_golden_cases();
    let anion_gap = &cases[0];
    let template = build_template(anion_gap);
    let mut session = ReportSession::new(&template);

    // Only sodium entered: the gap cannot be computed yet
    session.set_raw_value(0, "140").unwrap();
    assert_eq!(session.entries()[3].result, ResultValue::Empty);

    // Remaining inputs arrive, the gap fills in
    session.set_raw_value(1, "104").unwrap();
    session.set_raw_value(2, "24").unwrap();
    assert_eq!(session.entries()[3].result, ResultValue::Number(12.0));
}
