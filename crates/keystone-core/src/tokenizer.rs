//! Statement splitting and placeholder scanning.
//!
//! The tokenizer only knows enough SQL to find top-level `;` separators and
//! `:name` placeholders: string literals, quoted identifiers and comments
//! are skipped as opaque tokens. It never fails; an unterminated literal or
//! comment runs to the end of the input.

use tracing::warn;

use crate::params::Params;
use crate::value::SqlValue;

/// A byte range of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the spanned slice of `input`.
    #[must_use]
    pub fn slice<'a>(&self, input: &'a str) -> &'a str {
        &input[self.start..self.end]
    }
}

/// Lexical features that differ between dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlSyntax {
    /// `#` starts a line comment (MySQL).
    pub hash_comments: bool,
    /// `$tag$ ... $tag$` string literals (PostgreSQL).
    pub dollar_quotes: bool,
    /// `[name]` identifiers (SQL Server).
    pub bracket_identifiers: bool,
    /// Backslash escapes inside string literals (MySQL).
    pub backslash_escapes: bool,
}

impl SqlSyntax {
    /// Plain ANSI lexing: quotes, double quotes, backticks, `--` and `/* */`.
    pub const ANSI: Self = Self {
        hash_comments: false,
        dollar_quotes: false,
        bracket_identifiers: false,
        backslash_escapes: false,
    };
}

impl Default for SqlSyntax {
    fn default() -> Self {
        Self::ANSI
    }
}

/// How bound parameters are written in the SQL handed to a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` for every occurrence (SQLite, MySQL).
    Question,
    /// `$1`, `$2`, ... numbered by first occurrence (PostgreSQL).
    Dollar,
    /// `@p1`, `@p2`, ... (SQL Server).
    AtP,
    /// `:1`, `:2`, ... (Oracle).
    ColonNumber,
}

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A top-level `;`.
    Semicolon,
    /// A named placeholder such as `:qp0`.
    Placeholder,
    /// A positional `?` placeholder.
    Positional,
    /// A string literal or quoted identifier.
    Quoted,
    /// A comment.
    Comment,
    /// Whitespace.
    Whitespace,
    /// Anything else.
    Text,
}

/// A token with its location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// A lexer over one SQL string.
pub struct Lexer<'a> {
    input: &'a str,
    syntax: SqlSyntax,
    pos: usize,
    start: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a str, syntax: SqlSyntax) -> Self {
        Self {
            input,
            syntax,
            pos: 0,
            start: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            span: Span::new(self.start, self.pos),
        }
    }

    fn skip_line(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // /
        self.advance(); // *
        loop {
            match self.advance() {
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    break;
                }
                None => break,
                _ => {}
            }
        }
    }

    /// Skips a literal delimited by `close`, where a doubled `close` is an
    /// escaped quote.
    fn skip_quoted(&mut self, close: char, backslash: bool) {
        self.advance(); // opening quote
        loop {
            match self.advance() {
                Some('\\') if backslash => {
                    self.advance();
                }
                Some(c) if c == close => {
                    if self.peek() == Some(close) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                None => break,
                _ => {}
            }
        }
    }

    /// Tries to read a `$tag$` opener at the current position.
    fn dollar_tag(&self) -> Option<&'a str> {
        let rest = &self.input[self.pos..];
        let body = rest.strip_prefix('$')?;
        let len = body
            .char_indices()
            .take_while(|&(i, c)| c == '_' || c.is_alphabetic() || (i > 0 && c.is_ascii_digit()))
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .unwrap_or(0);
        body[len..].starts_with('$').then(|| &rest[..len + 2])
    }

    fn skip_dollar_quoted(&mut self, tag: &str) {
        self.pos += tag.len();
        match self.input[self.pos..].find(tag) {
            Some(offset) => self.pos += offset + tag.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn is_text_char(&self, c: char) -> bool {
        !(c.is_whitespace()
            || matches!(c, ';' | ':' | '?' | '\'' | '"' | '`' | '-' | '/')
            || (c == '[' && self.syntax.bracket_identifiers)
            || (c == '#' && self.syntax.hash_comments)
            || (c == '$' && self.syntax.dollar_quotes))
    }

    /// Scans the next token.
    pub fn next_token(&mut self) -> Option<Token> {
        self.start = self.pos;
        let c = self.peek()?;
        let kind = match c {
            ';' => {
                self.advance();
                TokenKind::Semicolon
            }
            '?' => {
                self.advance();
                TokenKind::Positional
            }
            '\'' => {
                self.skip_quoted('\'', self.syntax.backslash_escapes);
                TokenKind::Quoted
            }
            '"' => {
                self.skip_quoted('"', self.syntax.backslash_escapes);
                TokenKind::Quoted
            }
            '`' => {
                self.skip_quoted('`', false);
                TokenKind::Quoted
            }
            '[' if self.syntax.bracket_identifiers => {
                self.skip_quoted(']', false);
                TokenKind::Quoted
            }
            '-' if self.peek_next() == Some('-') => {
                self.skip_line();
                TokenKind::Comment
            }
            '#' if self.syntax.hash_comments => {
                self.skip_line();
                TokenKind::Comment
            }
            '/' if self.peek_next() == Some('*') => {
                self.skip_block_comment();
                TokenKind::Comment
            }
            '$' if self.syntax.dollar_quotes => {
                if let Some(tag) = self.dollar_tag() {
                    self.skip_dollar_quoted(tag);
                    TokenKind::Quoted
                } else {
                    self.advance();
                    TokenKind::Text
                }
            }
            ':' => {
                self.advance();
                if self.peek() == Some(':') {
                    // `::type` cast
                    self.advance();
                    TokenKind::Text
                } else if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                        self.advance();
                    }
                    TokenKind::Placeholder
                } else {
                    TokenKind::Text
                }
            }
            c if c.is_whitespace() => {
                while self.peek().is_some_and(char::is_whitespace) {
                    self.advance();
                }
                TokenKind::Whitespace
            }
            _ => {
                self.advance();
                while self.peek().is_some_and(|c| self.is_text_char(c)) {
                    self.advance();
                }
                TokenKind::Text
            }
        };
        Some(self.make_token(kind))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Tokenizes `sql`.
#[must_use]
pub fn tokenize(sql: &str, syntax: SqlSyntax) -> Vec<Token> {
    Lexer::new(sql, syntax).collect()
}

/// Returns the spans of the top-level statements in `sql`.
///
/// Statements holding only whitespace and comments are dropped, so a
/// trailing `;` does not produce a second statement. Each span is trimmed
/// of surrounding whitespace.
#[must_use]
pub fn split_statements(sql: &str, syntax: SqlSyntax) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut first: Option<usize> = None;
    let mut last = 0;
    for token in Lexer::new(sql, syntax) {
        match token.kind {
            TokenKind::Semicolon => {
                if let Some(start) = first.take() {
                    spans.push(Span::new(start, last));
                }
            }
            TokenKind::Whitespace | TokenKind::Comment => {}
            _ => {
                first.get_or_insert(token.span.start);
                last = token.span.end;
            }
        }
    }
    if let Some(start) = first {
        spans.push(Span::new(start, last));
    }
    spans
}

/// Returns the names (with their colon) of the placeholders in `sql`, in
/// order of first occurrence.
#[must_use]
pub fn placeholder_names(sql: &str, syntax: SqlSyntax) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for token in Lexer::new(sql, syntax) {
        if token.kind == TokenKind::Placeholder {
            let name = token.span.slice(sql);
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// One statement of a split SQL string with the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStatement {
    pub sql: String,
    pub params: Params,
}

/// Splits `sql` into statements, giving each exactly the parameters it
/// references.
///
/// A placeholder with no entry in `params` is left as literal text.
/// Positional `?` values are handed out in order: each statement receives
/// as many as it has `?` markers, renumbered from 1.
#[must_use]
pub fn split_with_params(sql: &str, params: &Params, syntax: SqlSyntax) -> Vec<SplitStatement> {
    let mut positional = params.positional().into_iter();
    let statements: Vec<SplitStatement> = split_statements(sql, syntax)
        .into_iter()
        .map(|span| {
            let text = span.slice(sql);
            let mut own = Params::new();
            for name in placeholder_names(text, syntax) {
                if let Some(value) = params.get(name) {
                    own.insert(name, value);
                }
            }
            let markers = Lexer::new(text, syntax)
                .filter(|token| token.kind == TokenKind::Positional)
                .count();
            for (index, value) in positional.by_ref().take(markers).enumerate() {
                own.insert(&(index + 1).to_string(), value);
            }
            SplitStatement {
                sql: text.to_string(),
                params: own,
            }
        })
        .collect();

    let leftover = positional.count();
    if leftover > 0 {
        warn!(leftover, "Positional values exceed the `?` markers of the statements");
    }
    for (name, _) in params.iter() {
        if !name.starts_with(':') {
            continue;
        }
        if !statements.iter().any(|s| s.params.contains(name)) {
            warn!(param = name, "Parameter is not referenced by any statement");
        }
    }
    statements
}

/// Rewrites named placeholders into the driver's positional form and
/// returns the values in binding order.
///
/// Named placeholders missing from `params` are left untouched. Positional
/// `?` placeholders are bound from the numeric keys of `params`, in order.
#[must_use]
pub fn bind_positional(
    sql: &str,
    params: &Params,
    style: PlaceholderStyle,
    syntax: SqlSyntax,
) -> (String, Vec<SqlValue>) {
    let positional = params.positional();
    let mut next_positional = positional.into_iter();
    let mut out = String::with_capacity(sql.len());
    let mut values: Vec<SqlValue> = Vec::new();
    let mut numbered: Vec<(&str, usize)> = Vec::new();

    for token in Lexer::new(sql, syntax) {
        let text = token.span.slice(sql);
        match token.kind {
            TokenKind::Placeholder => {
                let Some(value) = params.get(text) else {
                    warn!(placeholder = text, "No value bound for placeholder");
                    out.push_str(text);
                    continue;
                };
                let index = match style {
                    PlaceholderStyle::Question => {
                        values.push(value.clone());
                        values.len()
                    }
                    _ => {
                        if let Some(&(_, index)) = numbered.iter().find(|(n, _)| *n == text) {
                            index
                        } else {
                            values.push(value.clone());
                            numbered.push((text, values.len()));
                            values.len()
                        }
                    }
                };
                push_placeholder(&mut out, style, index);
            }
            TokenKind::Positional => match next_positional.next() {
                Some(value) => {
                    values.push(value.clone());
                    push_placeholder(&mut out, style, values.len());
                }
                None => out.push('?'),
            },
            _ => out.push_str(text),
        }
    }
    (out, values)
}

fn push_placeholder(out: &mut String, style: PlaceholderStyle, index: usize) {
    match style {
        PlaceholderStyle::Question => out.push('?'),
        PlaceholderStyle::Dollar => out.push_str(&format!("${index}")),
        PlaceholderStyle::AtP => out.push_str(&format!("@p{index}")),
        PlaceholderStyle::ColonNumber => out.push_str(&format!(":{index}")),
    }
}
