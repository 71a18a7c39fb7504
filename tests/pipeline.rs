//! End-to-end pipeline tests against the bundled catalog.

use avm_resolve::core::optimizer::optimize;
use avm_resolve::core::types::{DiagnosticCode, ResolveOptions, Severity};
use avm_resolve::{ModuleCatalog, Resolver};
use proptest::prelude::*;
use std::sync::Arc;

fn resolver() -> Resolver {
    Resolver::new(Arc::new(ModuleCatalog::bundled().unwrap()))
}

const APP: &str = r#"targetScope = 'resourceGroup'

@description('Deployment region')
param location string = resourceGroup().location
param prefix string

var tags = {
  env: 'dev'
  owner: 'platform'
}

// Diagnostics sink
resource law 'Microsoft.OperationalInsights/workspaces@2022-10-01' = {
  name: '${prefix}-law'
  location: location
  tags: tags
  properties: {
    sku: {
      name: 'PerGB2018'
    }
    retentionInDays: 30
  }
}

resource storageAccount 'Microsoft.Storage/storageAccounts@2023-01-01' = {
  name: toLower('${prefix}st001')
  location: location
  tags: tags
  kind: 'StorageV2'
  sku: {
    name: 'Standard_LRS'
  }
  properties: {
    accessTier: 'Hot'
    minimumTlsVersion: 'TLS1_2'
    supportsHttpsTrafficOnly: true
    networkAcls: {
      defaultAction: 'Deny'
      bypass: 'AzureServices'
    }
  }
}

resource site 'Microsoft.Web/sites@2022-09-01' = {
  name: '${prefix}-app'
  location: location
  properties: {
    siteConfig: {
      appSettings: [
        {
          name: 'BLOB_ENDPOINT'
          value: storageAccount.properties.primaryEndpoints.blob
        }
        {
          name: 'WORKSPACE'
          value: '${law.properties.customerId}'
        }
      ]
    }
  }
}

output storageId string = storageAccount.id
output storageName string = storageAccount.name
output workspaceId string = law.id
"#;

#[test]
fn test_ar015_multi_resource_template() {
    let r = resolver()
        .resolve(APP, &ResolveOptions::new("app.bicep").with_environment("dev"))
        .unwrap();
    assert_eq!(r.summary.transformed, 2);
    assert_eq!(r.summary.errors, 0, "{:#?}", r.output_validation.diagnostics);
    assert_eq!(r.summary.warnings, 0);

    let out = &r.output_bicep_code;
    assert!(out.starts_with("targetScope = 'resourceGroup'\n\n@description('Deployment region')\n"));
    assert!(out.contains("// Diagnostics sink\nmodule lawModule 'br:avm/log-analytics-workspace:latest' = {"));
    assert!(out.contains("    dataRetention: 30\n"));
    assert!(!out.contains("skuName: 'PerGB2018'"));

    assert!(out.contains("value: storageAccountModule.outputs.primaryBlobEndpoint"));
    assert!(out.contains("value: '${lawModule.outputs.logAnalyticsWorkspaceId}'"));
    assert!(out.contains("output storageId string = storageAccountModule.outputs.id"));
    assert!(out.contains("output storageName string = storageAccountModule.outputs.name"));
    assert!(out.contains("output workspaceId string = lawModule.outputs.id"));

    // Every storage param equal to its default is gone.
    for elided in [
        "kind: 'StorageV2'",
        "accessTier: 'Hot'",
        "minimumTlsVersion",
        "supportsHttpsTrafficOnly",
        "networkAcls",
    ] {
        assert!(!out.contains(elided), "{} should be elided", elided);
    }
    assert!(out.contains("skuName: 'Standard_LRS'"));
    assert!(out.contains("resource site 'Microsoft.Web/sites@2022-09-01' = {"));
}

#[test]
fn test_ar015_plan_and_rewrites_exposed() {
    let r = resolver().resolve(APP, &ResolveOptions::default()).unwrap();
    let symbols: Vec<(&str, &str)> = r
        .transformation
        .plan
        .iter()
        .map(|e| (e.symbol.as_str(), e.new_symbol.as_str()))
        .collect();
    assert_eq!(
        symbols,
        vec![("law", "lawModule"), ("storageAccount", "storageAccountModule")]
    );
    assert!(r
        .transformation
        .rewrites
        .iter()
        .any(|rw| rw.old_symbol == "law" && rw.output == "logAnalyticsWorkspaceId"));
}

#[test]
fn test_ar015_transform_keeps_defaults_until_optimized() {
    let r = resolver().resolve(APP, &ResolveOptions::default()).unwrap();
    assert!(r.transformation.bicep_code.contains("    kind: 'StorageV2'\n"));
    assert!(r
        .transformation
        .bicep_code
        .contains("    networkAcls: {\n      defaultAction: 'Deny'\n      bypass: 'AzureServices'\n    }\n"));
    assert!(r.transform_validation.is_valid());
}

#[test]
fn test_ar015_expression_against_default_is_info() {
    let src = "param tier string\nresource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n  properties: {\n    accessTier: tier\n  }\n}\n";
    let r = resolver().resolve(src, &ResolveOptions::default()).unwrap();
    assert!(r.output_bicep_code.contains("accessTier: tier"));
    let infos: Vec<_> = r
        .output_validation
        .with_code(DiagnosticCode::OptimizationSkipped)
        .collect();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].severity, Severity::Info);
    assert_eq!(r.summary.errors, 0);
    assert_eq!(r.summary.warnings, 0);
}

#[test]
fn test_ar015_conditional_resource() {
    let src = "param deployVault bool\nresource kv 'Microsoft.KeyVault/vaults@2023-02-01' = if (deployVault) {\n  name: 'kv1'\n  properties: {\n    sku: {\n      family: 'A'\n      name: 'standard'\n    }\n    tenantId: subscription().tenantId\n  }\n}\n";
    let r = resolver().resolve(src, &ResolveOptions::default()).unwrap();
    assert!(r
        .output_bicep_code
        .contains("module kvModule 'br:avm/key-vault:latest' = if (deployVault) {"));
    // `sku.family` and `tenantId` have no module input.
    assert_eq!(r.summary.warnings, 2);
    assert!(r.output_bicep_code.contains("    sku: 'standard'\n"));
}

#[test]
fn test_ar015_non_ascii_outside_strings_is_not_fatal() {
    let src = "\u{feff}// r\u{e9}seau\nparam p string\u{a0}= 'x'\nvar v = p \u{2260} 'y'\n";
    let r = resolver().resolve(src, &ResolveOptions::default()).unwrap();
    assert_eq!(r.output_bicep_code, src);
    assert_eq!(r.summary.errors, 0);
}

#[test]
fn test_ar015_unbalanced_template_is_err() {
    let err = resolver()
        .resolve("var a = [\n  1\n", &ResolveOptions::default())
        .unwrap_err();
    assert!(err.message.contains("unclosed"));
}

// =============================================================================
// Properties
// =============================================================================

prop_compose! {
    fn arb_ident()(s in "[a-z][a-zA-Z0-9]{0,8}") -> String {
        s
    }
}

prop_compose! {
    /// A scalar value as it would be written in a template.
    fn arb_scalar()(choice in 0..5u8, n in 0..1000u32, s in "[a-zA-Z0-9 _{}()\\[\\]-]{0,12}") -> String {
        match choice {
            0 => n.to_string(),
            1 => "true".to_string(),
            2 => format!("'{}'", s),
            3 => format!("'{}${{p}}'", s),
            _ => "resourceGroup().location".to_string(),
        }
    }
}

prop_compose! {
    /// A statement that no bundled mapping covers.
    fn arb_statement()(
        kind in 0..4u8,
        name in arb_ident(),
        a in arb_scalar(),
        b in arb_scalar(),
        comment in "[ -~]{0,20}",
        block in "[ -)+-~]{0,20}",
    ) -> String {
        match kind {
            0 => format!("param {} string = {}\n", name, a),
            1 => format!("var {} = {{\n  a: {}\n  b: [\n    {}\n  ]\n}}\n", name, a, b),
            2 => format!(
                "// {}\nresource {} 'Microsoft.Web/sites@2022-09-01' = {{\n  name: {}\n  properties: {{ x: {}, y: {} }}\n}}\n",
                comment, name, a, a, b
            ),
            _ => format!("\n/* {} */\noutput {} string = {}\n", block, name, a),
        }
    }
}

prop_compose! {
    /// A storage template whose values are either the default or something else.
    fn arb_storage()(
        kind in prop::sample::select(vec!["'StorageV2'", "'BlobStorage'", "kindParam"]),
        tier in prop::sample::select(vec!["'Hot'", "'Cool'"]),
        https in prop::bool::ANY,
        acl in prop::sample::select(vec!["'Deny'", "'Allow'"]),
    ) -> String {
        format!(
            "param kindParam string\nresource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {{\n  name: 'st1'\n  kind: {}\n  properties: {{\n    accessTier: {}\n    supportsHttpsTrafficOnly: {}\n    networkAcls: {{ defaultAction: {}, bypass: 'AzureServices' }}\n  }}\n}}\noutput id string = sa.id\n",
            kind, tier, https, acl
        )
    }
}

proptest! {
    #[test]
    fn prop_no_match_round_trips(stmts in prop::collection::vec(arb_statement(), 0..8)) {
        let src: String = stmts.concat();
        let r = resolver().resolve(&src, &ResolveOptions::default()).unwrap();
        prop_assert_eq!(&r.transformation.bicep_code, &src);
        prop_assert_eq!(&r.output_bicep_code, &src);
        prop_assert_eq!(r.summary.transformed, 0);
        prop_assert_eq!(r.summary.errors, 0);
    }

    #[test]
    fn prop_optimizer_idempotent(src in arb_storage()) {
        let catalog = ModuleCatalog::bundled().unwrap();
        let r = Resolver::new(Arc::new(catalog.clone()))
            .resolve(&src, &ResolveOptions::default())
            .unwrap();
        prop_assert_eq!(r.summary.errors, 0);
        let again = optimize(&r.output_bicep_code, &r.transformation.plan, &catalog);
        prop_assert_eq!(&again.bicep_code, &r.output_bicep_code);
        prop_assert!(again.removed.is_empty());
        prop_assert!(!r.output_bicep_code.contains("resource sa '"));
        prop_assert!(r.output_bicep_code.contains("output id string = saModule.outputs.id"));
    }

    #[test]
    fn prop_scanner_never_panics(src in "[ -~\n\t\u{a0}\u{feff}\u{2003}é€中😀]{0,200}") {
        let _ = resolver().resolve(&src, &ResolveOptions::default());
    }
}
