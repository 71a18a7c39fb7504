//! AR-003: Source scanner: template text to top-level statements.
//!
//! Statements are delimited by depth counting over the token stream: a
//! statement ends at the first newline outside any bracket, interpolation
//! hole, or string. Resource and module bodies are additionally parsed into
//! ordered property trees by recursive descent.
//!
//! Anything the structured parse cannot represent (loops, exotic
//! expressions) falls back to an opaque statement with no body. That is
//! never an error: the only fatal condition is imbalance, which the lexer
//! reports.

use super::lexer::{tokenize, Token, TokenKind};
use super::types::*;
use crate::error::ParseError;

/// A scanned template: source, tokens, and statements in source order.
#[derive(Debug, Clone)]
pub struct ScannedTemplate<'a> {
    pub source: &'a str,
    pub tokens: Vec<Token>,
    pub statements: Vec<Statement>,
}

impl ScannedTemplate<'_> {
    /// Find a statement by kind and symbol.
    pub fn find(&self, kind: StatementKind, symbol: &str) -> Option<&Statement> {
        self.statements
            .iter()
            .find(|s| s.kind == kind && s.symbol.as_deref() == Some(symbol))
    }
}

/// Scan template text into statements.
pub fn scan(source: &str) -> Result<ScannedTemplate<'_>, ParseError> {
    let tokens = tokenize(source)?;
    let statements = Parser::new(source, &tokens).statements();
    Ok(ScannedTemplate {
        source,
        tokens,
        statements,
    })
}

/// Marker for constructs the structured parse does not cover.
struct Unstructured;

type Structured<T> = Result<T, Unstructured>;

struct Parser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            src,
            tokens,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn expect(&mut self, kind: TokenKind) -> Structured<&'a Token> {
        match self.peek() {
            Some(t) if t.kind == kind => {
                self.pos += 1;
                Ok(t)
            }
            _ => Err(Unstructured),
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek_kind() == Some(TokenKind::Newline) {
            self.pos += 1;
        }
    }

    /// Advance to the next newline at depth zero (not consumed).
    fn skip_to_line_end(&mut self) {
        let mut depth = 0isize;
        while let Some(t) = self.peek() {
            if t.kind == TokenKind::Newline && depth <= 0 {
                break;
            }
            depth += t.kind.depth_delta();
            self.pos += 1;
        }
    }

    fn statements(mut self) -> Vec<Statement> {
        let mut out = Vec::new();
        loop {
            self.skip_newlines();
            if self.peek().is_none() {
                break;
            }
            out.push(self.statement());
        }
        out
    }

    fn statement(&mut self) -> Statement {
        let start = self.pos;

        // Decorators belong to the statement they precede.
        let mut decorators = Vec::new();
        while self.peek_kind() == Some(TokenKind::At) {
            let at = self.pos;
            self.skip_to_line_end();
            let span = self.tokens[at].span.start..self.tokens[self.pos - 1].span.end;
            decorators.push(self.fragment(span));
            self.skip_newlines();
        }

        let keyword_pos = self.pos;
        let kind = match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => match t.text(self.src) {
                "param" => StatementKind::Param,
                "var" => StatementKind::Var,
                "resource" => StatementKind::Resource,
                "module" => StatementKind::Module,
                "output" => StatementKind::Output,
                _ => StatementKind::Other,
            },
            _ => StatementKind::Other,
        };

        let mut stmt = match kind {
            StatementKind::Resource | StatementKind::Module => {
                match self.declaration(kind) {
                    Ok(stmt) => stmt,
                    Err(Unstructured) => {
                        self.pos = keyword_pos;
                        self.opaque(kind)
                    }
                }
            }
            _ => self.opaque(kind),
        };

        // `self.pos` now sits on the terminating newline or end of input.
        if self.pos == start {
            // Guard against a statement that consumed nothing.
            self.pos += 1;
        }
        let first = &self.tokens[start];
        let last = &self.tokens[self.pos - 1];
        stmt.span = first.span.start..last.span.end;
        stmt.line = first.line;
        stmt.decorators = decorators;
        stmt
    }

    fn opaque(&mut self, kind: StatementKind) -> Statement {
        let symbol = match kind {
            StatementKind::Other => None,
            _ => self
                .tokens
                .get(self.pos + 1)
                .filter(|t| t.kind == TokenKind::Ident)
                .map(|t| t.text(self.src).to_string()),
        };
        let target = match kind {
            StatementKind::Resource | StatementKind::Module => self.literal_at(self.pos + 2),
            _ => None,
        };
        let looped = target.is_some() && self.loop_follows(self.pos + 2);
        self.skip_to_line_end();
        Statement {
            kind,
            symbol,
            target,
            span: 0..0,
            decorators: Vec::new(),
            line: 0,
            body: None,
            condition: None,
            existing: false,
            looped,
        }
    }

    /// Whether `= [for` appears on the statement after `from`.
    fn loop_follows(&self, from: usize) -> bool {
        let mut i = from;
        while let Some(t) = self.tokens.get(i) {
            match t.kind {
                TokenKind::Newline => return false,
                TokenKind::Assign => {
                    let next = self.tokens.get(i + 1);
                    let after = self.tokens.get(i + 2);
                    return matches!(next, Some(n) if n.kind == TokenKind::LBracket)
                        && matches!(after, Some(a) if a.is_ident(self.src, "for"));
                }
                _ => i += 1,
            }
        }
        false
    }

    /// Content of a non-interpolated single-line string starting at `at`.
    fn literal_at(&self, at: usize) -> Option<String> {
        let open = self.tokens.get(at)?;
        if open.kind != TokenKind::StringStart {
            return None;
        }
        let (text, close) = match self.tokens.get(at + 1)? {
            t if t.kind == TokenKind::StringText => (t.text(self.src), self.tokens.get(at + 2)?),
            t => ("", t),
        };
        if close.kind != TokenKind::StringEnd {
            return None;
        }
        string_content(&format!("'{}'", text))
    }

    /// `resource|module <symbol> '<target>' [existing] = [if (...)] { ... }`
    fn declaration(&mut self, kind: StatementKind) -> Structured<Statement> {
        self.pos += 1;
        let symbol = self.expect(TokenKind::Ident)?.text(self.src).to_string();
        let target = self.literal_at(self.pos).ok_or(Unstructured)?;
        while self.peek_kind() != Some(TokenKind::StringEnd) {
            self.pos += 1;
        }
        self.pos += 1;

        let existing = match self.peek() {
            Some(t) if t.is_ident(self.src, "existing") => {
                self.pos += 1;
                true
            }
            _ => false,
        };
        self.expect(TokenKind::Assign)?;

        let mut stmt = Statement {
            kind,
            symbol: Some(symbol),
            target: Some(target),
            span: 0..0,
            decorators: Vec::new(),
            line: 0,
            body: None,
            condition: None,
            existing,
            looped: false,
        };

        match self.peek() {
            Some(t) if t.kind == TokenKind::LBracket => {
                stmt.looped = self
                    .tokens
                    .get(self.pos + 1)
                    .is_some_and(|n| n.is_ident(self.src, "for"));
                self.skip_to_line_end();
                return Ok(stmt);
            }
            Some(t) if t.is_ident(self.src, "if") => {
                self.pos += 1;
                stmt.condition = Some(self.parenthesized()?);
            }
            _ => {}
        }

        if self.peek_kind() != Some(TokenKind::LBrace) {
            return Err(Unstructured);
        }
        stmt.body = Some(self.object()?);
        if !matches!(self.peek_kind(), None | Some(TokenKind::Newline)) {
            return Err(Unstructured);
        }
        Ok(stmt)
    }

    /// `( expr )`, returning the inner expression as a fragment.
    fn parenthesized(&mut self) -> Structured<Fragment> {
        self.expect(TokenKind::LParen)?;
        let mut depth = 1isize;
        let inner_start = self.pos;
        while let Some(t) = self.peek() {
            depth += t.kind.depth_delta();
            if depth == 0 {
                break;
            }
            self.pos += 1;
        }
        self.expect(TokenKind::RParen)?;
        if inner_start == self.pos - 1 {
            return Err(Unstructured);
        }
        let span = self.tokens[inner_start].span.start..self.tokens[self.pos - 2].span.end;
        Ok(self.fragment(span))
    }

    fn fragment(&self, span: Span) -> Fragment {
        Fragment {
            raw: self.src[span.clone()].to_string(),
            span: Some(span),
        }
    }

    fn object(&mut self) -> Structured<ObjectLit> {
        self.expect(TokenKind::LBrace)?;
        let mut obj = ObjectLit::default();
        loop {
            while matches!(
                self.peek_kind(),
                Some(TokenKind::Newline) | Some(TokenKind::Comma)
            ) {
                self.pos += 1;
            }
            if self.peek_kind() == Some(TokenKind::RBrace) {
                self.pos += 1;
                return Ok(obj);
            }
            let key_token = self.peek().ok_or(Unstructured)?;
            let (key, quoted_key) = match key_token.kind {
                TokenKind::Ident => {
                    self.pos += 1;
                    (key_token.text(self.src).to_string(), false)
                }
                TokenKind::StringStart => {
                    let key = self.literal_at(self.pos).ok_or(Unstructured)?;
                    while self.peek_kind() != Some(TokenKind::StringEnd) {
                        self.pos += 1;
                    }
                    self.pos += 1;
                    (key, true)
                }
                _ => return Err(Unstructured),
            };
            self.expect(TokenKind::Colon)?;
            let value = self.value()?;
            obj.entries.push(Property {
                key,
                quoted_key,
                value,
                line: key_token.line,
            });
            if !self.at_element_end() {
                return Err(Unstructured);
            }
        }
    }

    fn array(&mut self) -> Structured<Vec<Value>> {
        self.expect(TokenKind::LBracket)?;
        let mut items = Vec::new();
        loop {
            while matches!(
                self.peek_kind(),
                Some(TokenKind::Newline) | Some(TokenKind::Comma)
            ) {
                self.pos += 1;
            }
            if self.peek_kind() == Some(TokenKind::RBracket) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.value()?);
            if !self.at_element_end() {
                return Err(Unstructured);
            }
        }
    }

    fn at_element_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            None | Some(TokenKind::Newline)
                | Some(TokenKind::Comma)
                | Some(TokenKind::RBrace)
                | Some(TokenKind::RBracket)
        )
    }

    fn value(&mut self) -> Structured<Value> {
        let start = self.pos;
        let structured = match self.peek_kind() {
            Some(TokenKind::LBrace) => Some(self.object().map(Value::Object)),
            Some(TokenKind::LBracket) if !self.loop_at(self.pos) => {
                Some(self.array().map(Value::Array))
            }
            _ => None,
        };
        if let Some(Ok(value)) = structured {
            if self.at_element_end() {
                return Ok(value);
            }
        }

        // Expression: consume to the end of the element at depth zero.
        self.pos = start;
        let mut depth = 0isize;
        while let Some(t) = self.peek() {
            if depth == 0
                && matches!(
                    t.kind,
                    TokenKind::Newline
                        | TokenKind::Comma
                        | TokenKind::RBrace
                        | TokenKind::RBracket
                )
            {
                break;
            }
            depth += t.kind.depth_delta();
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Unstructured);
        }
        Ok(self.classify(start, self.pos))
    }

    fn loop_at(&self, at: usize) -> bool {
        self.tokens
            .get(at + 1)
            .is_some_and(|t| t.is_ident(self.src, "for"))
    }

    /// Classify the tokens `[from, to)` of a scalar value.
    fn classify(&self, from: usize, to: usize) -> Value {
        let toks = &self.tokens[from..to];
        let span = toks[0].span.start..toks[toks.len() - 1].span.end;
        let text = &self.src[span.clone()];

        match toks {
            [t] if t.kind == TokenKind::Number => return Value::Number(text.to_string()),
            [t] if t.kind == TokenKind::MultilineString => return Value::Str(self.fragment(span)),
            [t] if t.kind == TokenKind::Ident => match text {
                "true" => return Value::Bool(true),
                "false" => return Value::Bool(false),
                "null" => return Value::Null,
                _ => {}
            },
            [op, n] if op.kind == TokenKind::Op
                && op.text(self.src) == "-"
                && n.kind == TokenKind::Number
                && op.span.end == n.span.start =>
            {
                return Value::Number(text.to_string())
            }
            _ => {}
        }

        if toks[0].kind == TokenKind::StringStart && self.single_string(toks) {
            let interpolated = toks.iter().any(|t| t.kind == TokenKind::InterpStart);
            let fragment = self.fragment(span);
            return if interpolated {
                Value::Interpolated(fragment)
            } else {
                Value::Str(fragment)
            };
        }
        Value::Expr(self.fragment(span))
    }

    /// True when the tokens form exactly one string literal.
    fn single_string(&self, toks: &[Token]) -> bool {
        let mut strings = 0isize;
        for (i, t) in toks.iter().enumerate() {
            match t.kind {
                TokenKind::StringStart => strings += 1,
                TokenKind::StringEnd => {
                    strings -= 1;
                    if strings == 0 {
                        return i == toks.len() - 1;
                    }
                }
                _ => {}
            }
        }
        false
    }
}
