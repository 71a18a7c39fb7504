//! AR-009: Resolver. Runs the stages in order and validates both artifacts.
//!
//! The catalog is injected at construction and shared read-only, so one
//! `Resolver` can serve any number of concurrent `resolve` calls.

use super::analyzer::analyze;
use super::fingerprint;
use super::optimizer::optimize;
use super::parser::scan;
use super::transformer::transform;
use super::types::*;
use super::validator::validate;
use crate::catalog::ModuleCatalog;
use crate::error::ParseError;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Resolver {
    catalog: Arc<ModuleCatalog>,
}

impl Resolver {
    pub fn new(catalog: Arc<ModuleCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Run the full pipeline. Only an unscannable template is an `Err`;
    /// every other problem is a diagnostic in the result.
    pub fn resolve(
        &self,
        source: &str,
        options: &ResolveOptions,
    ) -> Result<PipelineResult, ParseError> {
        let span = tracing::info_span!(
            "resolve",
            template = %options.template_name,
            environment = %options.optimization_context.environment,
        );
        let _guard = span.enter();

        let scanned = scan(source)?;
        let analysis = analyze(&scanned, &self.catalog);
        let transformed = transform(&scanned, &analysis, &self.catalog);

        let mut transform_validation = ValidationResult::from_diagnostics(
            analysis.diagnostics.iter().cloned(),
        );
        transform_validation.extend(validate(&transformed.bicep_code, &analysis.plan).diagnostics);

        let optimized = optimize(&transformed.bicep_code, &analysis.plan, &self.catalog);

        let mut output_validation = ValidationResult::from_diagnostics(
            analysis.diagnostics.iter().cloned(),
        );
        output_validation.extend(validate(&optimized.bicep_code, &analysis.plan).diagnostics);
        output_validation.extend(optimized.diagnostics);

        let summary = Summary {
            transformed: analysis.plan.len(),
            errors: output_validation.errors,
            warnings: output_validation.warnings,
        };

        let mut stage_diagnostics = analysis.diagnostics;
        stage_diagnostics.extend(transformed.diagnostics);

        tracing::info!(
            statements = scanned.statements.len(),
            transformed = summary.transformed,
            elided = optimized.removed.len(),
            errors = summary.errors,
            warnings = summary.warnings,
            "template resolved"
        );
        if summary.errors > 0 {
            tracing::warn!(errors = summary.errors, "resolved template has errors");
        }

        Ok(PipelineResult {
            template_name: options.template_name.clone(),
            transformation: Transformation {
                bicep_code: transformed.bicep_code,
                plan: analysis.plan,
                rewrites: analysis.rewrites,
                diagnostics: stage_diagnostics,
            },
            transform_validation,
            output_hash: fingerprint::hash_string(&optimized.bicep_code),
            output_bicep_code: optimized.bicep_code,
            output_validation,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> Resolver {
        Resolver::new(Arc::new(ModuleCatalog::bundled().unwrap()))
    }

    const STORAGE: &str = r#"param location string = resourceGroup().location

resource storageAccount 'Microsoft.Storage/storageAccounts@2023-01-01' = {
  name: 'stdemo001'
  location: location
  kind: 'StorageV2'
  sku: {
    name: 'Standard_LRS'
  }
  properties: {
    accessTier: 'Hot'
  }
}

output storageId string = storageAccount.id
"#;

    #[test]
    fn test_ar009_storage_scenario() {
        let r = resolver()
            .resolve(STORAGE, &ResolveOptions::new("storage.bicep"))
            .unwrap();
        assert_eq!(r.summary.errors, 0, "{:?}", r.output_validation.diagnostics);
        assert_eq!(r.summary.transformed, 1);
        let code = &r.transformation.bicep_code;
        assert!(code.contains("module storageAccountModule 'br:avm/storage:latest'"));
        assert!(!code.contains("resource storageAccount 'Microsoft.Storage/storageAccounts"));
        let out = &r.output_bicep_code;
        assert!(out.contains("output storageId string = storageAccountModule.outputs.id"));
        assert!(!out.contains("kind: 'StorageV2'"));
        assert!(!out.contains("accessTier: 'Hot'"));
        assert!(out.contains("skuName: 'Standard_LRS'"));
        assert!(r.output_hash.starts_with("blake3:"));
    }

    #[test]
    fn test_ar009_passthrough() {
        let src = "resource site 'Microsoft.Web/sites@2022-03-01' = {\n  name: 'app'\n}\n";
        let r = resolver().resolve(src, &ResolveOptions::default()).unwrap();
        assert_eq!(r.transformation.bicep_code, src);
        assert_eq!(r.output_bicep_code, src);
        assert_eq!(r.summary, Summary::default());
    }

    #[test]
    fn test_ar009_parse_error_short_circuits() {
        let err = resolver()
            .resolve("resource a 'x@1' = {\n", &ResolveOptions::default())
            .unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_ar009_warnings_counted_in_both_validations() {
        let src = "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n  properties: {\n    encryption: {\n      keySource: 'Microsoft.Storage'\n    }\n  }\n}\n";
        let r = resolver().resolve(src, &ResolveOptions::default()).unwrap();
        assert_eq!(r.transform_validation.warnings, 1);
        assert_eq!(r.output_validation.warnings, 1);
        assert_eq!(r.summary.warnings, 1);
        assert_eq!(r.summary.errors, 0);
        assert!(r
            .output_bicep_code
            .contains("    properties: {\n      encryption: {\n        keySource: 'Microsoft.Storage'\n      }\n    }\n"));
    }

    #[test]
    fn test_ar009_unresolved_reference_counts_as_error() {
        let src = "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n}\noutput t string = sa.properties.creationTime\n";
        let r = resolver().resolve(src, &ResolveOptions::default()).unwrap();
        assert_eq!(
            r.transformation
                .diagnostics
                .iter()
                .filter(|d| d.code == DiagnosticCode::ReferenceResolution)
                .count(),
            1
        );
        assert_eq!(r.summary.errors, 1);
        assert_eq!(
            r.output_validation
                .with_code(DiagnosticCode::DanglingReference)
                .count(),
            1
        );
    }

    #[test]
    fn test_ar009_byte_order_mark_and_nbsp_resolve() {
        let passthrough = "\u{feff}resource w 'Microsoft.Web/sites@2022-03-01' = {\n  name: 'app'\n}\n";
        let r = resolver().resolve(passthrough, &ResolveOptions::default()).unwrap();
        assert_eq!(r.output_bicep_code, passthrough);

        let r = resolver()
            .resolve("param p string\u{a0}= 'x'\n", &ResolveOptions::default())
            .unwrap();
        assert_eq!(r.summary, Summary::default());

        let src = format!("\u{feff}{}", STORAGE);
        let r = resolver().resolve(&src, &ResolveOptions::default()).unwrap();
        assert_eq!(r.summary.transformed, 1);
        assert_eq!(r.summary.errors, 0, "{:?}", r.output_validation.diagnostics);
        assert!(r.output_bicep_code.starts_with("\u{feff}param location string"));
    }

    #[test]
    fn test_ar009_depends_on_resource_follows_module() {
        let src = format!(
            "{}resource site 'Microsoft.Web/sites@2022-03-01' = {{\n  name: 'app'\n  dependsOn: [\n    storageAccount\n  ]\n}}\n",
            STORAGE
        );
        let r = resolver().resolve(&src, &ResolveOptions::default()).unwrap();
        assert_eq!(r.summary.transformed, 1);
        assert_eq!(r.summary.errors, 0, "{:?}", r.output_validation.diagnostics);
        assert!(r
            .output_bicep_code
            .contains("  dependsOn: [\n    storageAccountModule\n  ]\n"));
    }

    #[test]
    fn test_ar009_rerun_is_stable() {
        let resolver = resolver();
        let a = resolver.resolve(STORAGE, &ResolveOptions::default()).unwrap();
        let b = resolver
            .resolve(STORAGE, &ResolveOptions::default().with_environment("prod"))
            .unwrap();
        assert_eq!(a.output_bicep_code, b.output_bicep_code);
        assert_eq!(a.output_hash, b.output_hash);
    }

    #[test]
    fn test_ar009_result_serializes_camel_case() {
        let r = resolver().resolve(STORAGE, &ResolveOptions::default()).unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert!(json["transformation"]["bicepCode"].is_string());
        assert!(json["outputBicepCode"].is_string());
        assert_eq!(json["summary"]["transformed"], 1);
    }
}
