//! The evaluator pass: one full recomputation of all derived fields.

use crate::models::{ResultEntry, ResultValue};

use super::order::evaluation_order;
use super::{expr, VariableTable};

/// Stored precision for every numeric result: one decimal place.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Parse raw user input as a number, substituting zero for anything that
/// does not parse to a finite value.
pub fn parse_numeric_input(raw: &str) -> f64 {
    let parsed = raw.trim().parse::<f64>().unwrap_or(0.0);
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

/// Recompute every derived field in dependency order.
///
/// Idempotent over stable inputs: each field is computed exactly once per
/// pass, and a field's formula never observes a stale value of another
/// derived field it depends on. A failing formula is logged and skipped,
/// leaving that field's previous result in place; independent fields still
/// update.
pub fn run_pass(entries: &mut [ResultEntry], variables: &mut VariableTable) {
    for index in evaluation_order(entries) {
        let Some(formula) = entries[index].formula.clone() else {
            continue;
        };

        match expr::evaluate(&formula, variables) {
            Ok(value) => {
                let rounded = round_to_tenth(value);
                entries[index].result = ResultValue::Number(rounded);
                if let Some(variable) = entries[index].variable.clone() {
                    variables.set(&variable, rounded);
                }
            }
            Err(err) => {
                tracing::warn!(
                    field = %entries[index].test_name,
                    error = %err,
                    "formula evaluation failed, field skipped"
                );
            }
        }
    }
}
