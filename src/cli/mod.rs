//! AR-014: CLI subcommands.

use crate::catalog::source::{load_shared, source_for};
use crate::catalog::{document_schema, ModuleCatalog};
use crate::core::batch::{resolve_batch, BatchItem, BatchOutcome};
use crate::core::resolver::Resolver;
use crate::core::{analyzer, parser, types};
use clap::Subcommand;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rewrite resources into module calls, validate, and elide defaults
    Resolve {
        /// Template files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Module catalog (YAML, JSON or TOML); bundled catalog if omitted
        #[arg(short, long, env = "AVM_CATALOG")]
        catalog: Option<PathBuf>,

        /// Environment label recorded in logs
        #[arg(short, long, default_value = "default")]
        environment: String,

        /// Write resolved templates here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print full pipeline results as JSON
        #[arg(long)]
        json: bool,

        /// Exit non-zero on warnings as well as errors
        #[arg(long)]
        deny_warnings: bool,

        /// Per-template timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Scan a template and show what would be transformed
    Check {
        /// Template file
        file: PathBuf,

        /// Module catalog; bundled catalog if omitted
        #[arg(short, long, env = "AVM_CATALOG")]
        catalog: Option<PathBuf>,
    },

    /// Find the module mapping for a resource type
    Lookup {
        /// Resource type (`Microsoft.Storage/storageAccounts`)
        resource_type: String,

        /// API version; best mapping for any version if omitted
        #[arg(long)]
        version: Option<String>,

        /// Module catalog; bundled catalog if omitted
        #[arg(short, long, env = "AVM_CATALOG")]
        catalog: Option<PathBuf>,
    },

    /// Inspect module catalogs
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogAction {
    /// List mappings in the active catalog
    List {
        #[arg(short, long, env = "AVM_CATALOG")]
        catalog: Option<PathBuf>,
    },

    /// Print the JSON Schema for catalog documents
    Schema,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Resolve {
            files,
            catalog,
            environment,
            out,
            json,
            deny_warnings,
            timeout,
        } => cmd_resolve(&ResolveArgs {
            files: &files,
            catalog: catalog.as_deref(),
            environment: &environment,
            out: out.as_deref(),
            json,
            deny_warnings,
            timeout: timeout.map(Duration::from_secs),
        }),
        Commands::Check { file, catalog } => cmd_check(&file, catalog.as_deref()),
        Commands::Lookup {
            resource_type,
            version,
            catalog,
        } => cmd_lookup(&resource_type, version.as_deref(), catalog.as_deref()),
        Commands::Catalog { action } => match action {
            CatalogAction::List { catalog } => cmd_catalog_list(catalog.as_deref()),
            CatalogAction::Schema => cmd_catalog_schema(),
        },
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("cannot start runtime: {}", e))
}

fn load_catalog(
    rt: &tokio::runtime::Runtime,
    path: Option<&Path>,
) -> Result<Arc<ModuleCatalog>, String> {
    let source = source_for(path);
    rt.block_on(load_shared(source.as_ref()))
        .map_err(|e| e.to_string())
}

fn read_template(file: &Path) -> Result<String, String> {
    std::fs::read_to_string(file).map_err(|e| format!("cannot read {}: {}", file.display(), e))
}

struct ResolveArgs<'a> {
    files: &'a [PathBuf],
    catalog: Option<&'a Path>,
    environment: &'a str,
    out: Option<&'a Path>,
    json: bool,
    deny_warnings: bool,
    timeout: Option<Duration>,
}

fn cmd_resolve(args: &ResolveArgs<'_>) -> Result<(), String> {
    if let Some(dir) = args.out {
        check_output_clash(dir, args.files)?;
    }
    let rt = runtime()?;
    let catalog = load_catalog(&rt, args.catalog)?;
    let resolver = Arc::new(Resolver::new(catalog));

    let items = args
        .files
        .iter()
        .map(|f| Ok(BatchItem::new(f.display().to_string(), read_template(f)?)))
        .collect::<Result<Vec<_>, String>>()?;

    let outcomes = rt.block_on(resolve_batch(
        resolver,
        items,
        args.environment,
        args.timeout,
    ));

    if let Some(dir) = args.out {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
    }

    let mut reports = Vec::new();
    for (outcome, file) in outcomes.iter().zip(args.files) {
        match &outcome.result {
            Ok(result) => {
                let s = &result.summary;
                if args.json {
                    reports.push(serde_json::to_value(result).map_err(|e| e.to_string())?);
                    continue;
                }
                for d in &result.output_validation.diagnostics {
                    eprintln!("{}: {}", outcome.name, d);
                }
                for d in result
                    .transformation
                    .diagnostics
                    .iter()
                    .filter(|d| d.code == types::DiagnosticCode::ReferenceResolution)
                {
                    eprintln!("{}: {}", outcome.name, d);
                }
                match args.out {
                    Some(dir) => {
                        let target = output_path(dir, file);
                        std::fs::write(&target, &result.output_bicep_code).map_err(|e| {
                            format!("cannot write {}: {}", target.display(), e)
                        })?;
                        println!(
                            "{}: {} transformed, {} error(s), {} warning(s) -> {}",
                            outcome.name,
                            s.transformed,
                            s.errors,
                            s.warnings,
                            target.display()
                        );
                    }
                    None => print!("{}", result.output_bicep_code),
                }
            }
            Err(e) => {
                if args.json {
                    reports.push(serde_json::json!({
                        "templateName": outcome.name,
                        "error": e.to_string(),
                    }));
                } else {
                    eprintln!("{}: {}", outcome.name, e);
                }
            }
        }
    }

    if args.json {
        let text = serde_json::to_string_pretty(&reports).map_err(|e| e.to_string())?;
        println!("{}", text);
    }

    let failed = batch_failures(&outcomes, args.deny_warnings);
    if failed > 0 {
        return Err(format!(
            "{} of {} template(s) failed",
            failed,
            outcomes.len()
        ));
    }
    Ok(())
}

/// `<dir>/<file name>`, keeping the template's own name.
fn output_path(dir: &Path, file: &Path) -> PathBuf {
    let name = file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "main.bicep".into());
    dir.join(name)
}

/// Two templates with the same file name would overwrite each other in `dir`.
fn check_output_clash(dir: &Path, files: &[PathBuf]) -> Result<(), String> {
    let mut targets: FxHashMap<PathBuf, &Path> = FxHashMap::default();
    for file in files {
        if let Some(first) = targets.insert(output_path(dir, file), file.as_path()) {
            return Err(format!(
                "{} and {} would both be written to {}",
                first.display(),
                file.display(),
                output_path(dir, file).display()
            ));
        }
    }
    Ok(())
}

/// Templates that failed to resolve or whose result is not clean enough.
fn batch_failures(outcomes: &[BatchOutcome], deny_warnings: bool) -> usize {
    outcomes
        .iter()
        .filter(|o| match &o.result {
            Ok(r) => r.summary.errors > 0 || (deny_warnings && r.summary.warnings > 0),
            Err(_) => true,
        })
        .count()
}

fn cmd_check(file: &Path, catalog: Option<&Path>) -> Result<(), String> {
    let rt = runtime()?;
    let catalog = load_catalog(&rt, catalog)?;
    let source = read_template(file)?;
    let scanned = parser::scan(&source).map_err(|e| format!("{}: {}", file.display(), e))?;
    let analysis = analyzer::analyze(&scanned, &catalog);

    println!(
        "{}: {} statement(s), {} to transform",
        file.display(),
        scanned.statements.len(),
        analysis.plan.len()
    );
    for (index, stmt) in scanned.statements.iter().enumerate() {
        let planned = analysis.plan.iter().find(|e| e.statement_index == index);
        let marker = if planned.is_some() { "~" } else { " " };
        let mut line = format!(
            "  {} {:>4}  {:<8} {}",
            marker,
            stmt.line,
            stmt.kind.to_string(),
            stmt.symbol.as_deref().unwrap_or("-")
        );
        if let Some(target) = &stmt.target {
            line.push_str(&format!("  {}", target));
        }
        if let Some(entry) = planned {
            line.push_str(&format!("  -> {} ({})", entry.module, entry.new_symbol));
        }
        println!("{}", line);
    }
    for d in &analysis.diagnostics {
        println!("  {}", d);
    }
    Ok(())
}

fn cmd_lookup(
    resource_type: &str,
    version: Option<&str>,
    catalog: Option<&Path>,
) -> Result<(), String> {
    let rt = runtime()?;
    let catalog = load_catalog(&rt, catalog)?;
    let report = lookup_report(&catalog, resource_type, version);
    let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

/// `{"status":"ok","match":...}` or `{"status":"not-found",...}`.
fn lookup_report(
    catalog: &ModuleCatalog,
    resource_type: &str,
    version: Option<&str>,
) -> serde_json::Value {
    let found = match version {
        Some(v) => catalog.find(resource_type, v),
        None => catalog.find_any_version(resource_type),
    };
    match found {
        Some(mapping) => serde_json::json!({ "status": "ok", "match": mapping }),
        None => serde_json::json!({
            "status": "not-found",
            "resourceType": resource_type,
            "version": version,
        }),
    }
}

fn cmd_catalog_list(catalog: Option<&Path>) -> Result<(), String> {
    let rt = runtime()?;
    let catalog = load_catalog(&rt, catalog)?;
    println!(
        "{} module mapping(s), {}",
        catalog.len(),
        catalog.fingerprint()
    );
    for mapping in catalog.iter() {
        let versions = mapping
            .versions
            .to_range()
            .map(|r| r.to_string())
            .unwrap_or_default();
        println!(
            "  {} [{}] -> {} ({} inputs, {} outputs, {} defaults)",
            mapping.resource_type,
            versions,
            mapping.module,
            mapping.inputs.len(),
            mapping.outputs.len(),
            mapping.defaults.len()
        );
    }
    Ok(())
}

fn cmd_catalog_schema() -> Result<(), String> {
    let text = serde_json::to_string_pretty(&document_schema()).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORAGE: &str = "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n  kind: 'StorageV2'\n}\noutput id string = sa.id\n";

    fn args<'a>(files: &'a [PathBuf], out: Option<&'a Path>) -> ResolveArgs<'a> {
        ResolveArgs {
            files,
            catalog: None,
            environment: "test",
            out,
            json: false,
            deny_warnings: false,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    #[test]
    fn test_ar014_resolve_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("storage.bicep");
        std::fs::write(&file, STORAGE).unwrap();
        let out = dir.path().join("out");
        let files = vec![file];
        cmd_resolve(&args(&files, Some(&out))).unwrap();
        let written = std::fs::read_to_string(out.join("storage.bicep")).unwrap();
        assert!(written.contains("module saModule 'br:avm/storage:latest'"));
        assert!(written.contains("saModule.outputs.id"));
        assert!(!written.contains("kind: 'StorageV2'"));
    }

    #[test]
    fn test_ar014_resolve_multiple_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bicep");
        let b = dir.path().join("b.bicep");
        std::fs::write(&a, STORAGE).unwrap();
        std::fs::write(&b, "var x = 1\n").unwrap();
        let out = dir.path().join("out");
        let files = vec![a, b];
        cmd_resolve(&args(&files, Some(&out))).unwrap();
        assert_eq!(
            std::fs::read_to_string(out.join("b.bicep")).unwrap(),
            "var x = 1\n"
        );
    }

    #[test]
    fn test_ar014_resolve_same_file_name_refused() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a").join("main.bicep");
        let b = dir.path().join("b").join("main.bicep");
        for f in [&a, &b] {
            std::fs::create_dir_all(f.parent().unwrap()).unwrap();
            std::fs::write(f, "var x = 1\n").unwrap();
        }
        let out = dir.path().join("out");
        let files = vec![a, b];
        let err = cmd_resolve(&args(&files, Some(&out))).unwrap_err();
        assert!(err.contains("would both be written to"), "{}", err);
        assert!(!out.join("main.bicep").exists());
        // Without --out the results go to stdout and cannot collide.
        cmd_resolve(&args(&files, None)).unwrap();
    }

    #[test]
    fn test_ar014_resolve_errors_fail() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.bicep");
        std::fs::write(
            &file,
            "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n}\noutput t string = sa.properties.creationTime\n",
        )
        .unwrap();
        let files = vec![file];
        let out = dir.path().join("out");
        let err = cmd_resolve(&args(&files, Some(&out))).unwrap_err();
        assert!(err.contains("1 of 1"));
    }

    #[test]
    fn test_ar014_resolve_deny_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("w.bicep");
        std::fs::write(
            &file,
            "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01' = {\n  name: 'st1'\n  properties: {\n    encryption: {}\n  }\n}\n",
        )
        .unwrap();
        let files = vec![file];
        let out = dir.path().join("out");
        cmd_resolve(&args(&files, Some(&out))).unwrap();
        let mut strict = args(&files, Some(&out));
        strict.deny_warnings = true;
        assert!(cmd_resolve(&strict).is_err());
    }

    #[test]
    fn test_ar014_resolve_parse_error_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.bicep");
        std::fs::write(&file, "var a = {\n").unwrap();
        let files = vec![file];
        assert!(cmd_resolve(&args(&files, None)).is_err());
    }

    #[test]
    fn test_ar014_resolve_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![dir.path().join("nope.bicep")];
        let err = cmd_resolve(&args(&files, None)).unwrap_err();
        assert!(err.contains("cannot read"));
    }

    #[test]
    fn test_ar014_resolve_custom_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("catalog.json");
        std::fs::write(
            &catalog,
            r#"{"modules":[{"resourceType":"Microsoft.Web/sites","module":"br:avm/web-site:latest","inputs":{"name":"name"},"outputs":{"id":"id"}}]}"#,
        )
        .unwrap();
        let file = dir.path().join("site.bicep");
        std::fs::write(
            &file,
            "resource site 'Microsoft.Web/sites@2022-03-01' = {\n  name: 'app'\n}\n",
        )
        .unwrap();
        let out = dir.path().join("out");
        let files = vec![file];
        let mut a = args(&files, Some(&out));
        a.catalog = Some(&catalog);
        cmd_resolve(&a).unwrap();
        let written = std::fs::read_to_string(out.join("site.bicep")).unwrap();
        assert!(written.starts_with("module siteModule 'br:avm/web-site:latest'"));
    }

    #[test]
    fn test_ar014_check() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("storage.bicep");
        std::fs::write(&file, STORAGE).unwrap();
        cmd_check(&file, None).unwrap();
    }

    #[test]
    fn test_ar014_lookup_report() {
        let catalog = ModuleCatalog::bundled().unwrap();
        let hit = lookup_report(
            &catalog,
            "Microsoft.KeyVault/vaults",
            Some("2023-02-01"),
        );
        assert_eq!(hit["status"], "ok");
        assert_eq!(hit["match"]["module"], "br:avm/key-vault:latest");

        let miss = lookup_report(&catalog, "Microsoft.Fake/things", None);
        assert_eq!(miss["status"], "not-found");
        assert_eq!(miss["resourceType"], "Microsoft.Fake/things");
    }

    #[test]
    fn test_ar014_catalog_commands() {
        cmd_catalog_list(None).unwrap();
        cmd_catalog_schema().unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_catalog_list(Some(&dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn test_ar014_output_path_keeps_name() {
        assert_eq!(
            output_path(Path::new("/out"), Path::new("/src/infra/main.bicep")),
            PathBuf::from("/out/main.bicep")
        );
    }
}
