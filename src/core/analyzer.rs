//! AR-004: Analyzer. Matches resource statements against the module catalog.
//!
//! Produces the transformation plan, the reference rewrites implied by each
//! plan entry's output table, and the table of `symbol.path` accesses to
//! planned symbols. Nothing here touches the template text.

use super::lexer::{Token, TokenKind};
use super::parser::ScannedTemplate;
use super::types::*;
use crate::catalog::{ModuleCatalog, ModuleMapping};
use rustc_hash::FxHashSet;

/// Keys lifted from the resource body to the module block itself.
pub const HOISTED_KEYS: &[&str] = &["dependsOn", "scope"];

/// Keywords that introduce a symbol declaration.
const DECLARING_KEYWORDS: &[&str] = &["resource", "module", "param", "var", "output", "type", "func"];

/// Everything the transformer needs, computed from the scanned template.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub plan: Vec<PlanEntry>,
    pub rewrites: Vec<ReferenceRewrite>,
    /// Accesses to planned symbols outside their declaring statements
    pub references: Vec<SymbolReference>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    pub fn entry_for(&self, symbol: &str) -> Option<&PlanEntry> {
        self.plan.iter().find(|e| e.symbol == symbol)
    }
}

/// A resource body split against a mapping's input table.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// `(property path, module input, value)` in source order
    pub translated: Vec<(String, String, Value)>,
    /// Unmapped properties with nesting preserved
    pub residual: Vec<Property>,
    /// `dependsOn` and `scope`
    pub hoisted: Vec<Property>,
    /// `(property path, line)` of every unmapped leaf
    pub unmapped: Vec<(String, usize)>,
}

/// Split a resource body into translated inputs, residual properties and
/// hoisted module-level keys.
pub fn partition_properties(body: &ObjectLit, mapping: &ModuleMapping) -> Partition {
    let mut partition = Partition::default();
    for prop in &body.entries {
        if HOISTED_KEYS.contains(&prop.key.as_str()) {
            partition.hoisted.push(prop.clone());
            continue;
        }
        if let Some(kept) = split_property(prop, "", mapping, &mut partition) {
            partition.residual.push(kept);
        }
    }
    partition
}

/// Route one property. Returns what remains for the residual tree.
fn split_property(
    prop: &Property,
    prefix: &str,
    mapping: &ModuleMapping,
    partition: &mut Partition,
) -> Option<Property> {
    let path = if prefix.is_empty() {
        prop.key.clone()
    } else {
        format!("{}.{}", prefix, prop.key)
    };

    if let Some(input) = mapping.inputs.get(&path) {
        partition
            .translated
            .push((path, input.clone(), prop.value.clone()));
        return None;
    }

    if let Value::Object(obj) = &prop.value {
        if mapping.has_inputs_under(&path) {
            let mut rest = ObjectLit::default();
            for child in &obj.entries {
                if let Some(kept) = split_property(child, &path, mapping, partition) {
                    rest.entries.push(kept);
                }
            }
            if rest.is_empty() {
                return None;
            }
            return Some(Property {
                value: Value::Object(rest),
                ..prop.clone()
            });
        }
    }

    partition.unmapped.push((path, prop.line));
    Some(prop.clone())
}

/// `<old>Module`, then `<old>Module2`, `<old>Module3`, ... until unused.
pub fn derive_symbol(old: &str, taken: &FxHashSet<String>) -> String {
    let base = format!("{}Module", old);
    if !taken.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}

/// Build the plan for a scanned template.
pub fn analyze(scanned: &ScannedTemplate<'_>, catalog: &ModuleCatalog) -> Analysis {
    let mut analysis = Analysis::default();
    let mut taken: FxHashSet<String> = scanned
        .statements
        .iter()
        .filter_map(|s| s.symbol.clone())
        .collect();

    for (index, stmt) in scanned.statements.iter().enumerate() {
        if stmt.kind != StatementKind::Resource {
            continue;
        }
        let (Some(symbol), Some((resource_type, api_version))) =
            (stmt.symbol.as_deref(), stmt.type_and_version())
        else {
            continue;
        };
        let Some(mapping_index) = catalog.find_index(resource_type, api_version) else {
            continue;
        };
        let location = Location::new(stmt.line, 1).in_symbol(symbol);

        if stmt.existing {
            tracing::debug!(symbol, resource_type, "existing resource left in place");
            continue;
        }
        if stmt.looped {
            analysis.diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnsupportedConstruct,
                format!(
                    "'{}' is declared in a [for] loop; {} is passed through unchanged",
                    symbol, resource_type
                ),
                location,
            ));
            continue;
        }
        let (Some(body), Some(mapping)) = (stmt.body.as_ref(), catalog.mapping(mapping_index))
        else {
            analysis.diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnsupportedConstruct,
                format!("body of '{}' is not an object literal; passed through", symbol),
                location,
            ));
            continue;
        };

        let new_symbol = derive_symbol(symbol, &taken);
        taken.insert(new_symbol.clone());

        let partition = partition_properties(body, mapping);
        for (path, line) in &partition.unmapped {
            analysis.diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnsupportedProperty,
                format!(
                    "property '{}' has no input on {}; retained verbatim",
                    path, mapping.module
                ),
                Location::new(*line, 1).in_symbol(symbol),
            ));
        }

        for (path, output) in &mapping.outputs {
            analysis.rewrites.push(ReferenceRewrite {
                old_symbol: symbol.to_string(),
                path: path.clone(),
                new_symbol: new_symbol.clone(),
                output: output.clone(),
            });
        }

        tracing::debug!(
            symbol,
            new_symbol = %new_symbol,
            module = %mapping.module,
            translated = partition.translated.len(),
            unmapped = partition.unmapped.len(),
            "resource planned"
        );

        analysis.plan.push(PlanEntry {
            symbol: symbol.to_string(),
            new_symbol,
            resource_type: resource_type.to_string(),
            api_version: api_version.to_string(),
            module: mapping.module.clone(),
            mapping_index,
            statement_index: index,
            translated: partition
                .translated
                .into_iter()
                .map(|(path, input, _)| (path, input))
                .collect(),
            unmapped: partition.unmapped.into_iter().map(|(path, _)| path).collect(),
        });
    }

    let planned: FxHashSet<&str> = analysis.plan.iter().map(|e| e.symbol.as_str()).collect();
    let declared_in: Vec<Span> = analysis
        .plan
        .iter()
        .map(|e| scanned.statements[e.statement_index].span.clone())
        .collect();
    analysis.references = find_symbol_uses(&scanned.tokens, scanned.source, &planned)
        .into_iter()
        .filter(|r| {
            !analysis
                .plan
                .iter()
                .zip(&declared_in)
                .any(|(e, span)| e.symbol == r.symbol && span.contains(&r.span.start))
        })
        .collect();

    analysis
}

/// Find every use of `symbols` as a value: not a member name (`x.sa`), not
/// an object key (`sa: 1`), not the name being declared (`var sa = ...`).
/// Each use carries its `.member` chain.
pub fn find_symbol_uses(
    tokens: &[Token],
    source: &str,
    symbols: &FxHashSet<&str>,
) -> Vec<SymbolReference> {
    let mut uses = Vec::new();
    if symbols.is_empty() {
        return uses;
    }

    for (i, tok) in tokens.iter().enumerate() {
        if tok.kind != TokenKind::Ident || !symbols.contains(tok.text(source)) {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        let next = tokens.get(i + 1);

        if matches!(prev, Some(p) if p.kind == TokenKind::Dot) {
            continue;
        }
        let key_position = matches!(
            prev.map(|p| p.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::LBrace) | Some(TokenKind::Comma)
        );
        if key_position && matches!(next, Some(n) if n.kind == TokenKind::Colon) {
            continue;
        }
        if matches!(prev, Some(p) if p.kind == TokenKind::Ident
            && DECLARING_KEYWORDS.contains(&p.text(source)))
        {
            continue;
        }

        let mut path = Vec::new();
        let mut end = tok.span.end;
        let mut j = i + 1;
        while let (Some(dot), Some(member)) = (tokens.get(j), tokens.get(j + 1)) {
            if dot.kind != TokenKind::Dot || member.kind != TokenKind::Ident {
                break;
            }
            path.push(member.text(source).to_string());
            end = member.span.end;
            j += 2;
        }

        let depends_on = path.is_empty() && is_depends_on_element(tokens, source, i);
        uses.push(SymbolReference {
            symbol: tok.text(source).to_string(),
            path,
            depends_on,
            span: tok.span.start..end,
            line: tok.line,
            column: tok.column,
        });
    }
    uses
}

/// Whether token `i` is a whole element of a `dependsOn: [...]` array.
fn is_depends_on_element(tokens: &[Token], source: &str, i: usize) -> bool {
    let separator = |t: Option<&Token>, close: TokenKind| {
        matches!(
            t.map(|t| t.kind),
            Some(k) if k == close || k == TokenKind::Comma || k == TokenKind::Newline
        )
    };
    let prev = i.checked_sub(1).and_then(|p| tokens.get(p));
    if !separator(prev, TokenKind::LBracket) || !separator(tokens.get(i + 1), TokenKind::RBracket) {
        return false;
    }

    let mut depth = 0isize;
    for j in (0..i).rev() {
        depth += tokens[j].kind.depth_delta();
        if depth > 0 {
            return tokens[j].kind == TokenKind::LBracket
                && j >= 2
                && tokens[j - 1].kind == TokenKind::Colon
                && tokens[j - 2].is_ident(source, "dependsOn");
        }
    }
    false
}
