//! AR-001: Pipeline data model.
//!
//! Statements and property trees produced by the scanner, the transformation
//! plan, diagnostics, and the final pipeline result. Result types derive
//! Serialize so they can be emitted as JSON by the CLI.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Byte range into a template or artifact.
pub type Span = Range<usize>;

// ============================================================================
// Statements
// ============================================================================

/// Kind of a top-level template statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Param,
    Var,
    Resource,
    Module,
    Output,
    Other,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param => write!(f, "param"),
            Self::Var => write!(f, "var"),
            Self::Resource => write!(f, "resource"),
            Self::Module => write!(f, "module"),
            Self::Output => write!(f, "output"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A top-level unit of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,

    /// Declared symbol (`storageAccount` in `resource storageAccount ...`)
    pub symbol: Option<String>,

    /// Unquoted `type@version` for resources, module locator for modules
    pub target: Option<String>,

    /// Full span including leading decorators
    pub span: Span,

    /// Leading `@...` decorators, in source order
    pub decorators: Vec<Fragment>,

    /// 1-based line of the first token
    pub line: usize,

    /// Object-literal body for resource and module statements
    pub body: Option<ObjectLit>,

    /// `if (...)` condition between `=` and the body
    pub condition: Option<Fragment>,

    /// `resource x '...' existing = {...}`
    pub existing: bool,

    /// `= [for ...]` loop body
    pub looped: bool,
}

impl Statement {
    /// Split a resource target into `(type, version)`.
    pub fn type_and_version(&self) -> Option<(&str, &str)> {
        self.target.as_deref().and_then(|t| t.rsplit_once('@'))
    }

    /// Raw source text of this statement.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }
}

// ============================================================================
// Property trees
// ============================================================================

/// Source text of a value, with its span when it came from scanned input.
///
/// Synthesized fragments (e.g. a generated deployment name) carry no span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub raw: String,
    pub span: Option<Span>,
}

impl Fragment {
    pub fn synthetic(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            span: None,
        }
    }
}

/// Ordered object literal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectLit {
    pub entries: Vec<Property>,
}

impl ObjectLit {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|p| p.key == key).map(|p| &p.value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|p| p.key == key)
            .map(|p| &mut p.value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// `key: value` inside an object literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,

    /// Key was written as a quoted string (`'x-ms-tag': ...`)
    pub quoted_key: bool,

    pub value: Value,

    /// 1-based line of the key
    pub line: usize,
}

impl Property {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            quoted_key: false,
            value,
            line: 0,
        }
    }
}

/// Property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Plain quoted string, quotes included in `raw`
    Str(Fragment),
    /// Quoted string containing `${...}` holes
    Interpolated(Fragment),
    Number(String),
    Bool(bool),
    Null,
    Object(ObjectLit),
    Array(Vec<Value>),
    /// Anything else: symbol access, function call, operator expression
    Expr(Fragment),
}

impl Value {
    /// Compare against a catalog default. Returns `None` when the value is not
    /// a literal (expressions, interpolation) and so cannot be proven equal.
    pub fn literal_eq(&self, default: &serde_json::Value) -> Option<bool> {
        use serde_json::Value as J;
        match (self, default) {
            (Self::Expr(_) | Self::Interpolated(_), _) => None,
            (Self::Str(f), J::String(d)) => Some(string_content(&f.raw)? == *d),
            (Self::Number(n), J::Number(d)) => Some(numbers_equal(n, &d.to_string())),
            (Self::Bool(b), J::Bool(d)) => Some(b == d),
            (Self::Null, J::Null) => Some(true),
            (Self::Array(items), J::Array(defaults)) => {
                if items.len() != defaults.len() {
                    return self.is_literal().then_some(false);
                }
                let mut equal = true;
                for (item, d) in items.iter().zip(defaults) {
                    equal &= item.literal_eq(d)?;
                }
                Some(equal)
            }
            (Self::Object(obj), J::Object(defaults)) => {
                if !self.is_literal() {
                    return None;
                }
                if obj.len() != defaults.len() {
                    return Some(false);
                }
                for prop in &obj.entries {
                    match defaults.get(&prop.key) {
                        Some(d) => {
                            if !prop.value.literal_eq(d)? {
                                return Some(false);
                            }
                        }
                        None => return Some(false),
                    }
                }
                Some(true)
            }
            _ => self.is_literal().then_some(false),
        }
    }

    /// True when the value contains no expressions or interpolation.
    pub fn is_literal(&self) -> bool {
        match self {
            Self::Expr(_) | Self::Interpolated(_) => false,
            Self::Array(items) => items.iter().all(Value::is_literal),
            Self::Object(obj) => obj.entries.iter().all(|p| p.value.is_literal()),
            _ => true,
        }
    }
}

/// Decode the content of a quoted string literal (`'it\'s'` → `it's`).
/// Multi-line `'''` strings are verbatim. Returns `None` for non-literals.
pub fn string_content(raw: &str) -> Option<String> {
    if let Some(inner) = raw
        .strip_prefix("'''")
        .and_then(|s| s.strip_suffix("'''"))
    {
        return Some(inner.to_string());
    }
    let inner = raw.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            other => out.push(other),
        }
    }
    Some(out)
}

fn numbers_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

// ============================================================================
// Options
// ============================================================================

/// Per-call options for [`crate::core::resolver::Resolver::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Template name, used in diagnostics and logs only
    pub template_name: String,

    #[serde(default)]
    pub optimization_context: OptimizationContext,
}

impl ResolveOptions {
    pub fn new(template_name: impl Into<String>) -> Self {
        Self {
            template_name: template_name.into(),
            optimization_context: OptimizationContext::default(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.optimization_context.environment = environment.into();
        self
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::new("main.bicep")
    }
}

/// Optimization context. Default tables are environment-invariant; the
/// environment label is carried for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationContext {
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for OptimizationContext {
    fn default() -> Self {
        Self {
            environment: default_environment(),
        }
    }
}

fn default_environment() -> String {
    "default".to_string()
}

// ============================================================================
// Plan
// ============================================================================

/// One matched resource bound to one catalog mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    /// Original resource symbol
    pub symbol: String,

    /// Module symbol that replaces it
    pub new_symbol: String,

    pub resource_type: String,
    pub api_version: String,

    /// Module locator (`br:avm/storage:latest`)
    pub module: String,

    /// Index of the mapping in the catalog
    pub mapping_index: usize,

    /// Index of the resource statement in scan order
    pub statement_index: usize,

    /// Property path → module input, in source order
    pub translated: Vec<(String, String)>,

    /// Property paths with no module input, retained verbatim
    pub unmapped: Vec<String>,
}

/// `oldSymbol.path` → `newSymbol.outputs.output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRewrite {
    pub old_symbol: String,
    pub path: String,
    pub new_symbol: String,
    pub output: String,
}

impl ReferenceRewrite {
    pub fn replacement(&self) -> String {
        format!("{}.outputs.{}", self.new_symbol, self.output)
    }
}

/// A `symbol.a.b` access found in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolReference {
    pub symbol: String,
    /// Member path after the symbol; empty for a bare symbol use
    pub path: Vec<String>,
    /// Bare element of a `dependsOn` array
    pub depends_on: bool,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

impl SymbolReference {
    pub fn dotted(&self) -> String {
        if self.path.is_empty() {
            self.symbol.clone()
        } else {
            format!("{}.{}", self.symbol, self.path.join("."))
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Warning => write!(f, "WARNING"),
            Self::Info => write!(f, "INFO"),
        }
    }
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    UnsupportedProperty,
    UnsupportedConstruct,
    ReferenceResolution,
    DanglingReference,
    ResidualDeclaration,
    MissingModuleBlock,
    UnbalancedBlock,
    UnscannableArtifact,
    OptimizationSkipped,
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnsupportedProperty => "unsupported-property",
            Self::UnsupportedConstruct => "unsupported-construct",
            Self::ReferenceResolution => "reference-resolution",
            Self::DanglingReference => "dangling-reference",
            Self::ResidualDeclaration => "residual-declaration",
            Self::MissingModuleBlock => "missing-module-block",
            Self::UnbalancedBlock => "unbalanced-block",
            Self::UnscannableArtifact => "unscannable-artifact",
            Self::OptimizationSkipped => "optimization-skipped",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            symbol: None,
        }
    }

    pub fn in_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)?;
        if let Some(ref s) = self.symbol {
            write!(f, " ({})", s)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            location,
        }
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            location,
        }
    }

    pub fn info(code: DiagnosticCode, message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Info,
            code,
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.code, self.location, self.message
        )
    }
}

/// Counts plus the diagnostics behind them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn from_diagnostics(diagnostics: impl IntoIterator<Item = Diagnostic>) -> Self {
        let mut result = Self::default();
        result.extend(diagnostics);
        result
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Info => self.infos += 1,
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.push(d);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors == 0
    }

    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }
}

// ============================================================================
// Results
// ============================================================================

/// Transformer artifact: rewritten text plus what produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    pub bicep_code: String,
    pub plan: Vec<PlanEntry>,
    pub rewrites: Vec<ReferenceRewrite>,
    /// Analyzer and transformer diagnostics
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub transformed: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// Everything a `resolve` call returns. Owned by the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub template_name: String,
    pub transformation: Transformation,
    /// Validation of `transformation.bicep_code`
    pub transform_validation: ValidationResult,
    pub output_bicep_code: String,
    /// Validation of `output_bicep_code`
    pub output_validation: ValidationResult,
    pub summary: Summary,
    /// BLAKE3 fingerprint of `output_bicep_code`
    pub output_hash: String,
}

// ============================================================================
// Tests
// ============================================================================
