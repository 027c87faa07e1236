//! Dependency-ordered evaluation order for formula fields.

use std::collections::BTreeSet;

use crate::models::ResultEntry;

use super::expr;

/// Linearize all field indices so every field comes after the fields it
/// depends on.
///
/// Field A depends on field B when A's formula references B's published
/// variable as a whole identifier. The walk is a depth-first visit over the
/// indices in original list order; the visited set guarantees termination,
/// so a dependency cycle degrades to list order instead of erroring, and
/// the fields in it evaluate against whatever values are already published.
pub fn evaluation_order(entries: &[ResultEntry]) -> Vec<usize> {
    // Resolve each formula's identifier set once up front; a malformed
    // formula contributes no edges and fails later, during evaluation.
    let references: Vec<Option<BTreeSet<String>>> = entries
        .iter()
        .map(|entry| {
            entry
                .formula
                .as_deref()
                .map(|formula| expr::referenced_variables(formula).unwrap_or_default())
        })
        .collect();

    let mut order = Vec::with_capacity(entries.len());
    let mut visited = vec![false; entries.len()];

    for index in 0..entries.len() {
        visit(index, entries, &references, &mut visited, &mut order);
    }

    order
}

fn visit(
    index: usize,
    entries: &[ResultEntry],
    references: &[Option<BTreeSet<String>>],
    visited: &mut [bool],
    order: &mut Vec<usize>,
) {
    if visited[index] {
        return;
    }
    visited[index] = true;

    if let Some(refs) = &references[index] {
        for (dep, candidate) in entries.iter().enumerate() {
            if let Some(variable) = &candidate.variable {
                if refs.contains(variable) {
                    visit(dep, entries, references, visited, order);
                }
            }
        }
    }

    order.push(index);
}
