//! AR-011: Module catalog: declarative resource-type → module mappings.
//!
//! The catalog is data, not code: each entry is a `{typePattern, versions}`
//! key plus input/output/default tables. One generic lookup applies the
//! precedence rule when several entries match:
//!
//! 1. an exact type pattern beats a glob pattern
//! 2. the narrower version range wins ([`VersionRange::specificity`])
//! 3. ties go to the entry declared first
//!
//! A compiled [`ModuleCatalog`] is immutable and meant to be shared behind an
//! `Arc` across concurrent pipeline runs.

pub mod source;
pub mod version;

use crate::error::CatalogError;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use version::{ApiVersion, VersionRange};

/// Bundled catalog compiled into the binary.
pub const BUNDLED_CATALOG: &str = include_str!("bundled.yaml");

// ============================================================================
// Document schema
// ============================================================================

/// A catalog file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    /// Schema version
    #[serde(default = "default_schema_version")]
    pub version: String,

    /// Mappings in declaration order
    #[serde(default)]
    pub modules: Vec<ModuleMapping>,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

/// How one resource type (and version range) maps onto a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMapping {
    /// Resource type or glob pattern (`Microsoft.Storage/storageAccounts`)
    pub resource_type: String,

    /// `*`, an exact API version, a list of versions, or `>=A <=B`
    #[serde(default)]
    pub versions: VersionSpec,

    /// Module locator (`br:avm/storage:latest`)
    pub module: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Resource property path → module input name
    #[serde(default)]
    pub inputs: IndexMap<String, String>,

    /// Resource property path → module output name
    #[serde(default)]
    pub outputs: IndexMap<String, String>,

    /// Module input path → documented default value
    #[serde(default)]
    pub defaults: IndexMap<String, serde_json::Value>,
}

impl ModuleMapping {
    /// Whether any input path lies strictly below `path`.
    pub fn has_inputs_under(&self, path: &str) -> bool {
        self.inputs
            .keys()
            .any(|k| k.len() > path.len() && k.starts_with(path) && k.as_bytes()[path.len()] == b'.')
    }
}

/// Version selector as written in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum VersionSpec {
    One(String),
    Many(Vec<String>),
}

impl Default for VersionSpec {
    fn default() -> Self {
        Self::One("*".to_string())
    }
}

impl VersionSpec {
    pub fn to_range(&self) -> Result<VersionRange, String> {
        match self {
            Self::One(s) => VersionRange::parse(s),
            Self::Many(list) => VersionRange::parse_list(list),
        }
    }
}

/// Serialization format of a catalog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Yaml,
    Json,
    Toml,
}

impl CatalogFormat {
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            other => Err(CatalogError::UnknownFormat(other.to_string())),
        }
    }
}

/// Parse a catalog document from text.
pub fn parse_document(text: &str, format: CatalogFormat) -> Result<CatalogDocument, CatalogError> {
    Ok(match format {
        CatalogFormat::Yaml => serde_yaml_ng::from_str(text)?,
        CatalogFormat::Json => serde_json::from_str(text)?,
        CatalogFormat::Toml => toml::from_str(text)?,
    })
}

/// JSON Schema for catalog documents.
pub fn document_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(CatalogDocument)
}

// ============================================================================
// Compiled catalog
// ============================================================================

#[derive(Debug, Clone)]
enum TypePattern {
    /// Lowercased exact type
    Exact(String),
    Glob(glob::Pattern),
}

impl TypePattern {
    fn compile(pattern: &str) -> Result<Self, String> {
        if pattern.contains(['*', '?', '[']) {
            glob::Pattern::new(pattern)
                .map(Self::Glob)
                .map_err(|e| format!("invalid type pattern '{}': {}", pattern, e))
        } else {
            Ok(Self::Exact(pattern.to_ascii_lowercase()))
        }
    }

    fn matches(&self, resource_type: &str) -> bool {
        match self {
            Self::Exact(t) => t.eq_ignore_ascii_case(resource_type),
            Self::Glob(p) => p.matches_with(
                resource_type,
                glob::MatchOptions {
                    case_sensitive: false,
                    require_literal_separator: true,
                    require_literal_leading_dot: false,
                },
            ),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Exact(_) => 0,
            Self::Glob(_) => 1,
        }
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    mapping: ModuleMapping,
    pattern: TypePattern,
    range: VersionRange,
}

/// Immutable, indexed module catalog.
#[derive(Debug, Clone)]
pub struct ModuleCatalog {
    entries: Vec<CatalogEntry>,
    exact: FxHashMap<String, Vec<usize>>,
    globs: Vec<usize>,
    fingerprint: String,
}

impl ModuleCatalog {
    /// A catalog with no mappings. Every resource passes through.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            exact: FxHashMap::default(),
            globs: Vec::new(),
            fingerprint: crate::core::fingerprint::hash_string(""),
        }
    }

    /// The catalog bundled with this crate.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::parse(BUNDLED_CATALOG, CatalogFormat::Yaml)
    }

    /// Parse and compile catalog text.
    pub fn parse(text: &str, format: CatalogFormat) -> Result<Self, CatalogError> {
        Self::from_document(parse_document(text, format)?)
    }

    /// Validate and index a parsed document.
    pub fn from_document(doc: CatalogDocument) -> Result<Self, CatalogError> {
        let fingerprint = crate::core::fingerprint::hash_json(&doc)?;
        let mut entries = Vec::with_capacity(doc.modules.len());
        let mut exact: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut globs = Vec::new();

        for (index, mapping) in doc.modules.into_iter().enumerate() {
            let invalid = |message: String| CatalogError::InvalidEntry {
                index,
                resource_type: mapping.resource_type.clone(),
                message,
            };
            validate_mapping(&mapping).map_err(&invalid)?;
            let pattern = TypePattern::compile(&mapping.resource_type).map_err(&invalid)?;
            let range = mapping.versions.to_range().map_err(&invalid)?;

            match &pattern {
                TypePattern::Exact(key) => exact.entry(key.clone()).or_default().push(index),
                TypePattern::Glob(_) => globs.push(index),
            }
            entries.push(CatalogEntry {
                mapping,
                pattern,
                range,
            });
        }

        Ok(Self {
            entries,
            exact,
            globs,
            fingerprint,
        })
    }

    /// Look up the mapping for a resource type and API version.
    pub fn find(&self, resource_type: &str, version: &str) -> Option<&ModuleMapping> {
        self.find_index(resource_type, version)
            .map(|i| &self.entries[i].mapping)
    }

    /// Index of the winning mapping, for callers that keep plan references.
    pub fn find_index(&self, resource_type: &str, version: &str) -> Option<usize> {
        let version: ApiVersion = version.trim().parse().ok()?;
        self.candidates(resource_type)
            .into_iter()
            .find(|&i| self.entries[i].range.contains(&version))
    }

    /// Best mapping for a type regardless of version.
    pub fn find_any_version(&self, resource_type: &str) -> Option<&ModuleMapping> {
        self.candidates(resource_type)
            .first()
            .map(|&i| &self.entries[i].mapping)
    }

    /// All entries matching a type, in precedence order.
    pub fn candidates(&self, resource_type: &str) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .exact
            .get(&resource_type.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default();
        found.extend(
            self.globs
                .iter()
                .copied()
                .filter(|&i| self.entries[i].pattern.matches(resource_type)),
        );
        found.sort_by_key(|&i| {
            let e = &self.entries[i];
            (e.pattern.rank(), e.range.specificity(), i)
        });
        found
    }

    pub fn mapping(&self, index: usize) -> Option<&ModuleMapping> {
        self.entries.get(index).map(|e| &e.mapping)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleMapping> {
        self.entries.iter().map(|e| &e.mapping)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// BLAKE3 fingerprint of the catalog content, independent of file format.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn validate_mapping(mapping: &ModuleMapping) -> Result<(), String> {
    if mapping.resource_type.trim().is_empty() {
        return Err("resourceType is empty".to_string());
    }
    if mapping.module.trim().is_empty() {
        return Err("module locator is empty".to_string());
    }
    if mapping.module.contains('\'') {
        return Err(format!("module locator '{}' contains a quote", mapping.module));
    }
    for (path, input) in &mapping.inputs {
        if !is_property_path(path) {
            return Err(format!("input path '{}' is not a property path", path));
        }
        if !is_identifier(input) {
            return Err(format!("input name '{}' is not an identifier", input));
        }
    }
    for (path, output) in &mapping.outputs {
        if !is_property_path(path) {
            return Err(format!("output path '{}' is not a property path", path));
        }
        if !is_identifier(output) {
            return Err(format!("output name '{}' is not an identifier", output));
        }
    }
    for path in mapping.defaults.keys() {
        if !is_property_path(path) {
            return Err(format!("default path '{}' is not a property path", path));
        }
    }
    Ok(())
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Dot-separated identifiers.
pub fn is_property_path(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}
