//! Partial interface updates.
//!
//! # Responsibility
//! - Merge a statement diff into a stored statement set.
//!
//! # Invariants
//! - Every diff statement is retained verbatim.
//! - A `(subject, predicate)` pair present in the diff replaces the whole
//!   value set of that pair in the original; values are not merged.
//! - Pairs absent from the diff keep all of their original statements.
//! - Applying the same diff twice yields the same result as applying it once.

use crate::model::statement::{force_context, Statement, Term};
use std::collections::HashSet;

/// Merges `diff` into `original` with replace-by-attribute semantics.
///
/// Output order is the diff first, then the surviving original statements,
/// with exact duplicates dropped.
pub fn patch(original: &[Statement], diff: &[Statement]) -> Vec<Statement> {
    let replaced: HashSet<(&Term, &str)> = diff.iter().map(Statement::attribute).collect();
    let survivors = original
        .iter()
        .filter(|statement| !replaced.contains(&statement.attribute()));

    let mut seen = HashSet::new();
    diff.iter()
        .chain(survivors)
        .filter(|statement| seen.insert(*statement))
        .cloned()
        .collect()
}

/// Replaces a whole statement set, placing every statement into `graph`.
///
/// Used for configuration updates: unlike [`patch`], nothing from the
/// previous set survives, whatever predicates the new set uses.
pub fn replace_all(statements: Vec<Statement>, graph: &str) -> Vec<Statement> {
    force_context(statements, graph)
}
