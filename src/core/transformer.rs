//! AR-006: Transformer. Splices module calls into the template and repairs
//! references to the replaced resources.

use super::analyzer::{partition_properties, Analysis};
use super::codegen::{quote, render_module, Edit, ModuleCall, Splicer};
use super::parser::ScannedTemplate;
use super::types::*;
use crate::catalog::{ModuleCatalog, ModuleMapping};

/// Resource decorators a module declaration also accepts.
const CARRIED_DECORATORS: &[&str] = &["@description(", "@sys.description("];

/// Rewritten text plus the reference failures found while producing it.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub bicep_code: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Apply an analysis to its scanned template.
pub fn transform(
    scanned: &ScannedTemplate<'_>,
    analysis: &Analysis,
    catalog: &ModuleCatalog,
) -> TransformOutput {
    let mut diagnostics = Vec::new();
    let mut edits = Vec::new();

    for reference in &analysis.references {
        let Some(entry) = analysis.entry_for(&reference.symbol) else {
            continue;
        };
        let Some(mapping) = catalog.mapping(entry.mapping_index) else {
            continue;
        };
        match rewrite_reference(reference, entry, mapping) {
            Some(replacement) => edits.push(Edit::new(reference.span.clone(), replacement)),
            None => diagnostics.push(Diagnostic::error(
                DiagnosticCode::ReferenceResolution,
                unresolved_message(reference, entry),
                Location::new(reference.line, reference.column).in_symbol(&reference.symbol),
            )),
        }
    }

    let references = Splicer::new(scanned.source, edits.clone());
    for entry in &analysis.plan {
        let stmt = &scanned.statements[entry.statement_index];
        let (Some(body), Some(mapping)) = (stmt.body.as_ref(), catalog.mapping(entry.mapping_index))
        else {
            continue;
        };
        let call = module_call(entry, stmt, body, mapping, &references);
        edits.push(Edit::new(stmt.span.clone(), render_module(&call, &references)));
    }

    tracing::debug!(
        modules = analysis.plan.len(),
        references = analysis.references.len(),
        unresolved = diagnostics.len(),
        "template transformed"
    );

    TransformOutput {
        bicep_code: Splicer::new(scanned.source, edits).apply(),
        diagnostics,
    }
}

/// Module block for one plan entry: deployment name, hoisted `scope`,
/// `params` (translated inputs first, then residual properties), hoisted
/// `dependsOn`.
fn module_call(
    entry: &PlanEntry,
    stmt: &Statement,
    body: &ObjectLit,
    mapping: &ModuleMapping,
    splicer: &Splicer<'_>,
) -> ModuleCall {
    let partition = partition_properties(body, mapping);

    let mut params = ObjectLit::default();
    for (_, input, value) in partition.translated {
        params.entries.push(Property::new(input, value));
    }
    params.entries.extend(partition.residual);

    let hoisted = |key: &str| partition.hoisted.iter().find(|p| p.key == key).cloned();

    let mut module_body = ObjectLit::default();
    module_body.entries.push(Property::new(
        "name",
        Value::Str(Fragment::synthetic(quote(&entry.new_symbol))),
    ));
    if let Some(scope) = hoisted("scope") {
        module_body.entries.push(scope);
    }
    module_body
        .entries
        .push(Property::new("params", Value::Object(params)));
    if let Some(depends_on) = hoisted("dependsOn") {
        module_body.entries.push(depends_on);
    }

    let decorators = stmt
        .decorators
        .iter()
        .filter(|d| CARRIED_DECORATORS.iter().any(|p| d.raw.starts_with(p)))
        .map(|d| splicer.fragment(d))
        .collect();

    ModuleCall {
        decorators,
        symbol: entry.new_symbol.clone(),
        locator: mapping.module.clone(),
        condition: stmt.condition.as_ref().map(|c| splicer.fragment(c)),
        body: module_body,
    }
}

/// Longest output-table prefix of the member path; any remainder is kept.
/// A bare `dependsOn` element becomes the module symbol.
pub fn rewrite_reference(
    reference: &SymbolReference,
    entry: &PlanEntry,
    mapping: &ModuleMapping,
) -> Option<String> {
    if reference.path.is_empty() {
        return reference.depends_on.then(|| entry.new_symbol.clone());
    }
    (1..=reference.path.len()).rev().find_map(|len| {
        let prefix = reference.path[..len].join(".");
        let output = mapping.outputs.get(&prefix)?;
        let mut replacement = format!("{}.outputs.{}", entry.new_symbol, output);
        for rest in &reference.path[len..] {
            replacement.push('.');
            replacement.push_str(rest);
        }
        Some(replacement)
    })
}

fn unresolved_message(reference: &SymbolReference, entry: &PlanEntry) -> String {
    if reference.path.is_empty() {
        format!(
            "bare reference to '{}' cannot be mapped onto module '{}'",
            reference.symbol, entry.new_symbol
        )
    } else {
        format!(
            "'{}' has no matching output on {}",
            reference.dotted(),
            entry.module
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogFormat;
    use crate::core::analyzer::analyze;
    use crate::core::parser::scan;

    const CATALOG: &str = r#"
modules:
  - resourceType: Microsoft.Storage/storageAccounts
    module: br:avm/storage:latest
    inputs:
      name: name
      kind: kind
      sku.name: skuName
    outputs:
      id: id
      name: name
      properties.primaryEndpoints: endpoints
"#;

    fn run(src: &str) -> TransformOutput {
        let catalog = ModuleCatalog::parse(CATALOG, CatalogFormat::Yaml).unwrap();
        let scanned = scan(src).unwrap();
        let analysis = analyze(&scanned, &catalog);
        transform(&scanned, &analysis, &catalog)
    }

    #[test]
    fn test_ar006_block_replaced() {
        let src = "// header\n@description('x')\nresource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n  kind: 'StorageV2'\n  sku: {\n    name: 'Standard_LRS'\n  }\n}\n\nvar after = 1\n";
        let out = run(src);
        assert_eq!(
            out.bicep_code,
            "// header\n@description('x')\nmodule saModule 'br:avm/storage:latest' = {\n  name: 'saModule'\n  params: {\n    name: 'st1'\n    kind: 'StorageV2'\n    skuName: 'Standard_LRS'\n  }\n}\n\nvar after = 1\n"
        );
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_ar006_only_description_decorators_carried() {
        let src = "@sys.description('primary ${env}')\n@minLength(3)\nresource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n}\n";
        let out = run(src);
        assert!(out.bicep_code.starts_with(
            "@sys.description('primary ${env}')\nmodule saModule 'br:avm/storage:latest' = {\n"
        ));
        assert!(!out.bicep_code.contains("@minLength"));
    }

    #[test]
    fn test_ar006_passthrough_byte_identical() {
        let src = "param p string\n\n/* c */ resource w 'Microsoft.Web/sites@2022-03-01' = {\n  name: p   // trailing\n}\n";
        assert_eq!(run(src).bicep_code, src);
    }

    #[test]
    fn test_ar006_references_rewritten_with_remainder() {
        let src = "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n}\noutput id string = sa.id\noutput blob string = sa.properties.primaryEndpoints.blob\noutput n string = '${sa.name}-x'\n";
        let out = run(src);
        assert!(out
            .bicep_code
            .contains("output id string = saModule.outputs.id\n"));
        assert!(out
            .bicep_code
            .contains("output blob string = saModule.outputs.endpoints.blob\n"));
        assert!(out
            .bicep_code
            .contains("output n string = '${saModule.outputs.name}-x'\n"));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_ar006_unmapped_reference_is_error() {
        let src = "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n}\noutput k string = sa.properties.creationTime\nvar all = sa\n";
        let out = run(src);
        assert_eq!(out.diagnostics.len(), 2);
        assert!(out
            .diagnostics
            .iter()
            .all(|d| d.code == DiagnosticCode::ReferenceResolution
                && d.severity == Severity::Error));
        assert!(out.bicep_code.contains("sa.properties.creationTime"));
        assert!(out.bicep_code.contains("var all = sa\n"));
        assert_eq!(out.diagnostics[0].location.line, 4);
    }

    #[test]
    fn test_ar006_reference_inside_other_transformed_block() {
        let src = "resource a 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'a'\n}\nresource b 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: '${a.name}-b'\n  dependsOn: [\n    a\n  ]\n}\n";
        let out = run(src);
        assert!(out.bicep_code.contains("name: '${aModule.outputs.name}-b'"));
        assert!(out.bicep_code.contains("  dependsOn: [\n    aModule\n  ]\n"));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_ar006_depends_on_element_becomes_module_symbol() {
        let src = "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n}\nresource site 'Microsoft.Web/sites@2022-03-01' = {\n  name: 'app'\n  dependsOn: [\n    sa\n  ]\n}\nresource plan 'Microsoft.Web/serverfarms@2022-03-01' = {\n  name: 'p'\n  dependsOn: [site, sa]\n}\n";
        let out = run(src);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert!(out.bicep_code.contains("  dependsOn: [\n    saModule\n  ]\n"));
        assert!(out.bicep_code.contains("  dependsOn: [site, saModule]\n"));
    }

    #[test]
    fn test_ar006_bare_use_outside_depends_on_still_error() {
        let src = "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n}\nvar deps = [\n  sa\n]\nresource site 'Microsoft.Web/sites@2022-03-01' = {\n  name: 'app'\n  dependsOn: [\n    flag ? sa : other\n  ]\n}\n";
        let out = run(src);
        assert_eq!(out.diagnostics.len(), 2);
        assert!(out.bicep_code.contains("var deps = [\n  sa\n]\n"));
        assert!(out.bicep_code.contains("    flag ? sa : other\n"));
    }

    #[test]
    fn test_ar006_condition_and_scope_carried() {
        let src = "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = if (deploy) {\n  scope: resourceGroup('rg')\n  name: 'st1'\n  tags: {\n    env: 'dev'\n  }\n}\n";
        let out = run(src);
        assert_eq!(
            out.bicep_code,
            "module saModule 'br:avm/storage:latest' = if (deploy) {\n  name: 'saModule'\n  scope: resourceGroup('rg')\n  params: {\n    name: 'st1'\n    tags: {\n      env: 'dev'\n    }\n  }\n}\n"
        );
    }

    #[test]
    fn test_ar006_rewrite_longest_prefix() {
        let catalog = ModuleCatalog::parse(CATALOG, CatalogFormat::Yaml).unwrap();
        let mapping = catalog.mapping(0).unwrap();
        let entry = PlanEntry {
            symbol: "sa".into(),
            new_symbol: "saModule".into(),
            resource_type: "Microsoft.Storage/storageAccounts".into(),
            api_version: "2023-01-01".into(),
            module: mapping.module.clone(),
            mapping_index: 0,
            statement_index: 0,
            translated: vec![],
            unmapped: vec![],
        };
        let reference = SymbolReference {
            symbol: "sa".into(),
            path: vec!["id".into(), "extra".into()],
            depends_on: false,
            span: 0..0,
            line: 1,
            column: 1,
        };
        assert_eq!(
            rewrite_reference(&reference, &entry, mapping).as_deref(),
            Some("saModule.outputs.id.extra")
        );
    }
}
