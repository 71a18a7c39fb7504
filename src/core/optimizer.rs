//! AR-008: Optimizer. Elides module params equal to documented defaults.
//!
//! Only literals are compared. A param whose value is an expression is kept
//! and reported as an info diagnostic when a default exists for it. A block
//! with nothing removed is copied byte for byte, so a second pass is a no-op.

use super::codegen::{render_module, Edit, ModuleCall, Splicer};
use super::parser::scan;
use super::types::*;
use crate::catalog::{ModuleCatalog, ModuleMapping};

/// Optimized text, the removed `(module symbol, input path)` pairs, and
/// skip notices.
#[derive(Debug, Clone, Default)]
pub struct OptimizeOutput {
    pub bicep_code: String,
    pub removed: Vec<(String, String)>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Prune default-valued params from every planned module block.
pub fn optimize(text: &str, plan: &[PlanEntry], catalog: &ModuleCatalog) -> OptimizeOutput {
    let mut out = OptimizeOutput::default();
    let scanned = match scan(text) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "optimizer skipped: artifact does not scan");
            out.bicep_code = text.to_string();
            return out;
        }
    };
    let splicer = Splicer::identity(text);
    let mut edits = Vec::new();

    for entry in plan {
        let Some(mapping) = catalog.mapping(entry.mapping_index) else {
            continue;
        };
        if mapping.defaults.is_empty() {
            continue;
        }
        let Some(stmt) = scanned.find(StatementKind::Module, &entry.new_symbol) else {
            continue;
        };
        let Some(mut body) = stmt.body.clone() else {
            continue;
        };
        let Some(Value::Object(params)) = body.get_mut("params") else {
            continue;
        };

        let mut removed = Vec::new();
        prune(
            params,
            "",
            mapping,
            &entry.new_symbol,
            &mut removed,
            &mut out.diagnostics,
        );
        if removed.is_empty() {
            continue;
        }

        tracing::debug!(
            module = %entry.new_symbol,
            removed = removed.len(),
            "default-valued params elided"
        );
        let call = ModuleCall {
            decorators: stmt.decorators.iter().map(|d| d.raw.clone()).collect(),
            symbol: entry.new_symbol.clone(),
            locator: entry.module.clone(),
            condition: stmt.condition.as_ref().map(|c| c.raw.clone()),
            body,
        };
        edits.push(Edit::new(stmt.span.clone(), render_module(&call, &splicer)));
        out.removed.extend(
            removed
                .into_iter()
                .map(|path| (entry.new_symbol.clone(), path)),
        );
    }

    out.bicep_code = Splicer::new(text, edits).apply();
    out
}

/// Remove entries of `obj` equal to their default. Objects with defaults
/// below them are pruned recursively; an object emptied that way is dropped.
fn prune(
    obj: &mut ObjectLit,
    prefix: &str,
    mapping: &ModuleMapping,
    module: &str,
    removed: &mut Vec<String>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    obj.entries.retain_mut(|prop| {
        let path = if prefix.is_empty() {
            prop.key.clone()
        } else {
            format!("{}.{}", prefix, prop.key)
        };

        if let Some(default) = mapping.defaults.get(&path) {
            return match prop.value.literal_eq(default) {
                Some(true) => {
                    removed.push(path);
                    false
                }
                Some(false) => true,
                None => {
                    diagnostics.push(Diagnostic::info(
                        DiagnosticCode::OptimizationSkipped,
                        format!(
                            "'{}' has a default but its value is an expression; kept",
                            path
                        ),
                        Location::new(prop.line, 1).in_symbol(module),
                    ));
                    true
                }
            };
        }

        if let Value::Object(child) = &mut prop.value {
            if has_defaults_under(mapping, &path) {
                let before = removed.len();
                prune(child, &path, mapping, module, removed, diagnostics);
                if child.is_empty() && removed.len() > before {
                    return false;
                }
            }
        }
        true
    });
}

fn has_defaults_under(mapping: &ModuleMapping, path: &str) -> bool {
    mapping.defaults.keys().any(|k| {
        k.len() > path.len() && k.starts_with(path) && k.as_bytes()[path.len()] == b'.'
    })
}
