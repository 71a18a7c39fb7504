//! AR-002: Tokenizer for the template language.
//!
//! Produces a flat token stream with byte spans. String literals are split
//! into text and interpolation tokens so identifiers inside `${...}` holes are
//! visible to reference analysis while brackets inside literal text are not.
//! Comments, `#` pragmas and horizontal whitespace are skipped; newlines are
//! kept because they terminate statements and separate object properties.
//!
//! Bracket balance is enforced here. An unbalanced or unterminated construct
//! is the only fatal error in the pipeline: a leading byte-order mark and
//! Unicode whitespace are skipped, and any other unknown character becomes an
//! `Op` token.

use super::types::Span;
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    /// Opening `'` of a single-line string
    StringStart,
    /// Literal text between quotes and holes
    StringText,
    /// `${`
    InterpStart,
    /// `}` closing an interpolation hole
    InterpEnd,
    /// Closing `'`
    StringEnd,
    /// `'''...'''`, never interpolated
    MultilineString,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Dot,
    Question,
    At,
    Assign,
    Op,
    Newline,
}

impl TokenKind {
    /// Change in bracket depth caused by this token.
    pub fn depth_delta(self) -> isize {
        match self {
            Self::LBrace | Self::LBracket | Self::LParen | Self::InterpStart => 1,
            Self::RBrace | Self::RBracket | Self::RParen | Self::InterpEnd => -1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }

    pub fn is_ident(&self, source: &str, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text(source) == word
    }
}

/// Tokenize a template. Fails only on unbalanced or unterminated input.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

#[derive(Debug, Clone, Copy)]
struct Open {
    byte: u8,
    line: usize,
    column: usize,
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    opens: Vec<Open>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        let bom = if source.starts_with('\u{feff}') { 3 } else { 0 };
        Self {
            src: source,
            bytes: source.as_bytes(),
            pos: bom,
            line: 1,
            line_start: bom,
            opens: Vec::new(),
            tokens: Vec::new(),
        }
    }

    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, self.column(), message)
    }

    fn push(&mut self, kind: TokenKind, len: usize) {
        self.tokens.push(Token {
            kind,
            span: self.pos..self.pos + len,
            line: self.line,
            column: self.column(),
        });
        self.pos += len;
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.pos;
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(c) = self.peek(0) {
            match c {
                b'\n' => {
                    self.push(TokenKind::Newline, 1);
                    self.newline();
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'/' if self.peek(1) == Some(b'/') => self.skip_line(),
                b'#' => self.skip_line(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment()?,
                b'\'' => {
                    if self.bytes[self.pos..].starts_with(b"'''") {
                        self.multiline_string()?;
                    } else {
                        self.push(TokenKind::StringStart, 1);
                        self.string_body()?;
                    }
                }
                b'{' => self.open(TokenKind::LBrace),
                b'[' => self.open(TokenKind::LBracket),
                b'(' => self.open(TokenKind::LParen),
                b'}' => {
                    if matches!(self.opens.last(), Some(o) if o.byte == b'$') {
                        self.opens.pop();
                        self.push(TokenKind::InterpEnd, 1);
                        self.string_body()?;
                    } else {
                        self.close(b'{', TokenKind::RBrace)?;
                    }
                }
                b']' => self.close(b'[', TokenKind::RBracket)?,
                b')' => self.close(b'(', TokenKind::RParen)?,
                b':' => self.push(TokenKind::Colon, 1),
                b',' => self.push(TokenKind::Comma, 1),
                b'.' => self.push(TokenKind::Dot, 1),
                b'@' => self.push(TokenKind::At, 1),
                b'?' => {
                    if self.peek(1) == Some(b'?') {
                        self.push(TokenKind::Op, 2);
                    } else {
                        self.push(TokenKind::Question, 1);
                    }
                }
                b'=' => match self.peek(1) {
                    Some(b'=') | Some(b'~') => self.push(TokenKind::Op, 2),
                    _ => self.push(TokenKind::Assign, 1),
                },
                b'!' | b'<' | b'>' => {
                    let len = if matches!(self.peek(1), Some(b'=') | Some(b'~')) {
                        2
                    } else {
                        1
                    };
                    self.push(TokenKind::Op, len);
                }
                b'&' | b'|' => {
                    let len = if self.peek(1) == Some(c) { 2 } else { 1 };
                    self.push(TokenKind::Op, len);
                }
                b'+' | b'-' | b'*' | b'/' | b'%' => self.push(TokenKind::Op, 1),
                b'0'..=b'9' => self.number(),
                c if c == b'_' || c.is_ascii_alphabetic() => self.ident(),
                _ => match self.src.get(self.pos..).and_then(|s| s.chars().next()) {
                    Some(ch) if ch.is_whitespace() => self.pos += ch.len_utf8(),
                    Some(ch) => self.push(TokenKind::Op, ch.len_utf8()),
                    None => self.push(TokenKind::Op, 1),
                },
            }
        }

        if let Some(open) = self.opens.last() {
            let what = match open.byte {
                b'$' => "interpolation '${'".to_string(),
                b => format!("'{}'", b as char),
            };
            return Err(ParseError::new(
                open.line,
                open.column,
                format!("unclosed {}", what),
            ));
        }
        Ok(self.tokens)
    }

    fn open(&mut self, kind: TokenKind) {
        self.opens.push(Open {
            byte: self.bytes[self.pos],
            line: self.line,
            column: self.column(),
        });
        self.push(kind, 1);
    }

    fn close(&mut self, expected: u8, kind: TokenKind) -> Result<(), ParseError> {
        let found = self.bytes[self.pos] as char;
        match self.opens.pop() {
            Some(open) if open.byte == expected => {
                self.push(kind, 1);
                Ok(())
            }
            Some(open) => Err(self.error(format!(
                "mismatched '{}' (opened '{}' at {}:{})",
                found,
                if open.byte == b'$' { '$' } else { open.byte as char },
                open.line,
                open.column
            ))),
            None => Err(self.error(format!("unexpected '{}'", found))),
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column());
        self.pos += 2;
        loop {
            match self.peek(0) {
                None => return Err(ParseError::new(line, column, "unterminated block comment")),
                Some(b'*') if self.peek(1) == Some(b'/') => {
                    self.pos += 2;
                    return Ok(());
                }
                Some(b'\n') => {
                    self.pos += 1;
                    self.newline();
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Lex string text after an opening quote or a closing interpolation brace.
    /// Returns after the closing quote, or after `${` with the hole pushed.
    fn string_body(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column());
        let start = self.pos;
        let flush = |lexer: &mut Self| {
            if lexer.pos > start {
                lexer.tokens.push(Token {
                    kind: TokenKind::StringText,
                    span: start..lexer.pos,
                    line,
                    column,
                });
            }
        };
        loop {
            match self.peek(0) {
                None | Some(b'\n') => {
                    return Err(ParseError::new(line, column, "unterminated string literal"))
                }
                Some(b'\\') => match self.peek(1) {
                    None | Some(b'\n') => {
                        return Err(ParseError::new(line, column, "unterminated string literal"))
                    }
                    Some(_) => self.pos += 2,
                },
                Some(b'\'') => {
                    flush(self);
                    self.push(TokenKind::StringEnd, 1);
                    return Ok(());
                }
                Some(b'$') if self.peek(1) == Some(b'{') => {
                    flush(self);
                    self.opens.push(Open {
                        byte: b'$',
                        line: self.line,
                        column: self.column(),
                    });
                    self.push(TokenKind::InterpStart, 2);
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn multiline_string(&mut self) -> Result<(), ParseError> {
        let (start, line, column) = (self.pos, self.line, self.column());
        self.pos += 3;
        loop {
            if self.bytes[self.pos..].starts_with(b"'''") {
                self.pos += 3;
                break;
            }
            match self.peek(0) {
                None => {
                    return Err(ParseError::new(
                        line,
                        column,
                        "unterminated multi-line string",
                    ))
                }
                Some(b'\n') => {
                    self.pos += 1;
                    self.newline();
                }
                Some(_) => self.pos += 1,
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::MultilineString,
            span: start..self.pos,
            line,
            column,
        });
        Ok(())
    }

    fn number(&mut self) {
        let mut len = 0;
        while let Some(c) = self.peek(len) {
            let fraction = c == b'.' && matches!(self.peek(len + 1), Some(b'0'..=b'9'));
            if c.is_ascii_digit() || fraction {
                len += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, len);
    }

    fn ident(&mut self) {
        let mut len = 0;
        while let Some(c) = self.peek(len) {
            if c == b'_' || c.is_ascii_alphanumeric() {
                len += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Ident, len);
    }
}
