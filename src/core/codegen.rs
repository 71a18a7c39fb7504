//! AR-005: Span splicing and module-block rendering.
//!
//! Untouched text is copied byte for byte; only edited spans change.
//! Generated module blocks use two-space indentation, one property per line
//! and no separators.

use super::types::*;

const INDENT: &str = "  ";

/// Replace `span` of the source with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Span,
    pub replacement: String,
}

impl Edit {
    pub fn new(span: Span, replacement: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
        }
    }
}

/// Applies a set of edits to a source text.
///
/// Edits may nest: an outer edit (a whole statement) wins over the inner
/// edits it contains when splicing the full text, while [`Splicer::text`] on
/// an inner span still applies the inner edits.
#[derive(Debug, Clone)]
pub struct Splicer<'a> {
    source: &'a str,
    edits: Vec<Edit>,
}

impl<'a> Splicer<'a> {
    pub fn new(source: &'a str, mut edits: Vec<Edit>) -> Self {
        edits.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then(b.span.end.cmp(&a.span.end))
        });
        Self { source, edits }
    }

    pub fn identity(source: &'a str) -> Self {
        Self::new(source, Vec::new())
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Source text of `span` with every edit inside it applied.
    pub fn text(&self, span: &Span) -> String {
        let mut out = String::with_capacity(span.len());
        let mut cursor = span.start;
        for edit in &self.edits {
            if edit.span.start < cursor || edit.span.end > span.end {
                continue;
            }
            out.push_str(&self.source[cursor..edit.span.start]);
            out.push_str(&edit.replacement);
            cursor = edit.span.end;
        }
        out.push_str(&self.source[cursor..span.end]);
        out
    }

    /// Whole source with all edits applied.
    pub fn apply(&self) -> String {
        self.text(&(0..self.source.len()))
    }

    /// Render a value fragment, splicing edits when it came from this source.
    pub fn fragment(&self, fragment: &Fragment) -> String {
        match &fragment.span {
            Some(span) => self.text(span),
            None => fragment.raw.clone(),
        }
    }
}

/// A module-call declaration ready to render.
#[derive(Debug, Clone)]
pub struct ModuleCall {
    /// Decorator lines written above the declaration
    pub decorators: Vec<String>,
    pub symbol: String,
    pub locator: String,
    pub condition: Option<String>,
    pub body: ObjectLit,
}

/// `module <symbol> '<locator>' = [if (<cond>) ]{ ... }`
pub fn render_module(call: &ModuleCall, splicer: &Splicer<'_>) -> String {
    let mut out = String::new();
    for decorator in &call.decorators {
        out.push_str(decorator);
        out.push('\n');
    }
    out.push_str(&format!("module {} '{}' = ", call.symbol, call.locator));
    if let Some(ref cond) = call.condition {
        out.push_str(&format!("if ({}) ", cond));
    }
    render_object(&call.body, 0, splicer, &mut out);
    out
}

fn render_object(obj: &ObjectLit, depth: usize, splicer: &Splicer<'_>, out: &mut String) {
    if obj.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    for prop in &obj.entries {
        push_indent(depth + 1, out);
        out.push_str(&render_key(prop));
        out.push_str(": ");
        render_value(&prop.value, depth + 1, splicer, out);
        out.push('\n');
    }
    push_indent(depth, out);
    out.push('}');
}

/// Render a value at the given nesting depth.
pub fn render_value(value: &Value, depth: usize, splicer: &Splicer<'_>, out: &mut String) {
    match value {
        Value::Str(f) | Value::Interpolated(f) | Value::Expr(f) => {
            out.push_str(&splicer.fragment(f))
        }
        Value::Number(n) => out.push_str(n),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
        Value::Object(obj) => render_object(obj, depth, splicer, out),
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Array(items) => {
            out.push_str("[\n");
            for item in items {
                push_indent(depth + 1, out);
                render_value(item, depth + 1, splicer, out);
                out.push('\n');
            }
            push_indent(depth, out);
            out.push(']');
        }
    }
}

fn render_key(prop: &Property) -> String {
    if prop.quoted_key {
        quote(&prop.key)
    } else {
        prop.key.clone()
    }
}

/// Single-quoted string literal with `\` and `'` escaped.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '$' => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn push_indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
