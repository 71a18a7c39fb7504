//! AR-007: Structural and reference checks on a text artifact.
//!
//! Runs on both the transformed and the optimized text. Never fails: an
//! artifact that cannot be scanned is reported as an error diagnostic.

use super::analyzer::find_symbol_uses;
use super::lexer::TokenKind;
use super::parser::{scan, ScannedTemplate};
use super::types::*;
use regex::Regex;
use rustc_hash::FxHashSet;

/// Validate an artifact against the plan that produced it.
pub fn validate(text: &str, plan: &[PlanEntry]) -> ValidationResult {
    let mut result = ValidationResult::default();
    let scanned = match scan(text) {
        Ok(s) => s,
        Err(e) => {
            result.push(Diagnostic::error(
                DiagnosticCode::UnscannableArtifact,
                format!("artifact no longer scans: {}", e.message),
                Location::new(e.line, e.column),
            ));
            return result;
        }
    };

    let residual = check_residual_declarations(&scanned, plan, &mut result);
    check_module_blocks(&scanned, plan, &mut result);
    check_dangling_references(&scanned, plan, &residual, &mut result);

    tracing::debug!(
        errors = result.errors,
        warnings = result.warnings,
        "artifact validated"
    );
    result
}

/// `resource <symbol> '<type>@<version>'` must not survive for a planned
/// resource. Only matches that start on a real token count, so the same
/// words inside comments or strings are ignored.
fn check_residual_declarations(
    scanned: &ScannedTemplate<'_>,
    plan: &[PlanEntry],
    result: &mut ValidationResult,
) -> FxHashSet<String> {
    let token_starts: FxHashSet<usize> = scanned
        .tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Ident)
        .map(|t| t.span.start)
        .collect();
    let mut residual = FxHashSet::default();

    for entry in plan {
        let pattern = format!(
            r"\bresource\s+{}\s+'{}@{}'",
            regex::escape(&entry.symbol),
            regex::escape(&entry.resource_type),
            regex::escape(&entry.api_version)
        );
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        let found = re
            .find_iter(scanned.source)
            .find(|m| token_starts.contains(&m.start()));
        if let Some(m) = found {
            let (line, column) = line_column(scanned.source, m.start());
            result.push(Diagnostic::error(
                DiagnosticCode::ResidualDeclaration,
                format!(
                    "resource '{}' ({}) is still declared after transformation",
                    entry.symbol, entry.resource_type
                ),
                Location::new(line, column).in_symbol(&entry.symbol),
            ));
            residual.insert(entry.symbol.clone());
        }
    }
    residual
}

/// Each planned module block exists with the right locator and a structured
/// body.
fn check_module_blocks(
    scanned: &ScannedTemplate<'_>,
    plan: &[PlanEntry],
    result: &mut ValidationResult,
) {
    for entry in plan {
        let Some(stmt) = scanned.find(StatementKind::Module, &entry.new_symbol) else {
            result.push(Diagnostic::error(
                DiagnosticCode::MissingModuleBlock,
                format!(
                    "module '{}' replacing '{}' is missing",
                    entry.new_symbol, entry.symbol
                ),
                Location::default().in_symbol(&entry.new_symbol),
            ));
            continue;
        };
        let location = Location::new(stmt.line, 1).in_symbol(&entry.new_symbol);
        if stmt.target.as_deref() != Some(entry.module.as_str()) {
            result.push(Diagnostic::error(
                DiagnosticCode::MissingModuleBlock,
                format!(
                    "module '{}' points at {:?}, expected '{}'",
                    entry.new_symbol,
                    stmt.target.as_deref().unwrap_or_default(),
                    entry.module
                ),
                location,
            ));
            continue;
        }
        let closed = stmt.text(scanned.source).trim_end().ends_with('}');
        if stmt.body.is_none() || !closed {
            result.push(Diagnostic::error(
                DiagnosticCode::UnbalancedBlock,
                format!("module '{}' body is not a closed object", entry.new_symbol),
                location,
            ));
        }
    }
}

/// No identifier use of a replaced symbol may remain.
fn check_dangling_references(
    scanned: &ScannedTemplate<'_>,
    plan: &[PlanEntry],
    residual: &FxHashSet<String>,
    result: &mut ValidationResult,
) {
    let old: FxHashSet<&str> = plan
        .iter()
        .map(|e| e.symbol.as_str())
        .filter(|s| !residual.contains(*s))
        .collect();
    for reference in find_symbol_uses(&scanned.tokens, scanned.source, &old) {
        result.push(Diagnostic::error(
            DiagnosticCode::DanglingReference,
            format!("'{}' refers to a replaced resource", reference.dotted()),
            Location::new(reference.line, reference.column).in_symbol(&reference.symbol),
        ));
    }
}

/// 1-based line and column of a byte offset.
pub fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;
    (line, column)
}
