//! Minimal SQL tokenizer.
//!
//! Recognizes just enough of PostgreSQL's lexical structure to find
//! keywords, identifiers and clause boundaries outside string literals.
//! It is deliberately not exhaustive: any input it cannot classify with
//! confidence is an error, and callers treat errors as rejection.

use std::fmt;

/// Kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword.
    Word,
    /// Double-quoted identifier.
    QuotedIdent,
    /// Single-quoted string literal.
    StringLiteral,
    /// Numeric literal.
    Number,
    /// Positional parameter such as `$1`.
    Param,
    Comma,
    Dot,
    LParen,
    RParen,
    Semicolon,
    /// Any operator character (`=`, `<`, `::`, `||`, ...), one char per token.
    Operator,
}

/// A token with its byte span in the source and its parenthesis depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// Nesting depth; both parentheses of a pair carry the outer depth.
    pub depth: usize,
}

impl Token {
    /// Returns the source text of this token.
    pub fn text<'a>(&self, sql: &'a str) -> &'a str {
        &sql[self.start..self.end]
    }

    /// Returns true if this is a bare word equal to `keyword` ignoring case.
    pub fn is_keyword(&self, sql: &str, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text(sql).eq_ignore_ascii_case(keyword)
    }

    /// Returns true if this token can name a table or alias.
    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }
}

/// Input the tokenizer refuses to classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeError {
    pub message: String,
    pub offset: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for TokenizeError {}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_operator_char(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '<' | '>' | '=' | '!' | '|' | '%' | '^' | '~' | '&' | '#' | '@'
            | ':' | '?' | '[' | ']'
    )
}

/// Splits SQL text into tokens.
pub fn tokenize(sql: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut depth: usize = 0;

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }

        let kind = if is_word_start(c) {
            while let Some(&(_, next)) = chars.peek() {
                if !is_word_char(next) {
                    break;
                }
                chars.next();
            }
            TokenKind::Word
        } else if c.is_ascii_digit() {
            while let Some(&(_, next)) = chars.peek() {
                if !(next.is_ascii_alphanumeric() || next == '.') {
                    break;
                }
                chars.next();
            }
            TokenKind::Number
        } else {
            match c {
                '\'' => {
                    // E'..', B'..', X'..' and U&'..' change escaping rules.
                    let prefixed = sql[..start]
                        .chars()
                        .next_back()
                        .is_some_and(|prev| is_word_char(prev) || prev == '&');
                    if prefixed {
                        return Err(TokenizeError::new(
                            "prefixed string literals are not supported",
                            start,
                        ));
                    }
                    consume_quoted(&mut chars, '\'')
                        .ok_or_else(|| TokenizeError::new("unterminated string literal", start))?;
                    TokenKind::StringLiteral
                }
                '"' => {
                    let len = consume_quoted(&mut chars, '"').ok_or_else(|| {
                        TokenizeError::new("unterminated quoted identifier", start)
                    })?;
                    if len == 0 {
                        return Err(TokenizeError::new("empty quoted identifier", start));
                    }
                    TokenKind::QuotedIdent
                }
                '$' => {
                    let mut digits = 0;
                    while let Some(&(_, next)) = chars.peek() {
                        if !next.is_ascii_digit() {
                            break;
                        }
                        chars.next();
                        digits += 1;
                    }
                    if digits == 0 {
                        return Err(TokenizeError::new(
                            "dollar-quoted strings are not supported",
                            start,
                        ));
                    }
                    TokenKind::Param
                }
                ',' => TokenKind::Comma,
                '.' => TokenKind::Dot,
                ';' => TokenKind::Semicolon,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                c if is_operator_char(c) => TokenKind::Operator,
                other => {
                    return Err(TokenizeError::new(
                        format!("unexpected character '{}'", other),
                        start,
                    ))
                }
            }
        };

        let end = chars.peek().map(|&(i, _)| i).unwrap_or(sql.len());

        let token_depth = match kind {
            TokenKind::LParen => {
                depth += 1;
                depth - 1
            }
            TokenKind::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| TokenizeError::new("unbalanced parenthesis", start))?;
                depth
            }
            _ => depth,
        };

        tokens.push(Token {
            kind,
            start,
            end,
            depth: token_depth,
        });
    }

    if depth != 0 {
        return Err(TokenizeError::new("unbalanced parenthesis", sql.len()));
    }

    Ok(tokens)
}

/// Consumes a quoted run up to and including the closing quote.
///
/// A doubled quote is an escaped quote. Returns the number of chars between
/// the quotes, or None if the input ends first.
fn consume_quoted(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
) -> Option<usize> {
    let mut len = 0;
    while let Some((_, c)) = chars.next() {
        if c == quote {
            if chars.peek().is_some_and(|&(_, next)| next == quote) {
                chars.next();
                len += 2;
                continue;
            }
            return Some(len);
        }
        len += 1;
    }
    None
}

/// Returns the identifier named by a Word or QuotedIdent token.
///
/// Bare words fold to lower case; quoted identifiers keep their case and
/// have doubled quotes collapsed.
pub fn identifier_name(sql: &str, token: &Token) -> String {
    let text = token.text(sql);
    match token.kind {
        TokenKind::QuotedIdent => text[1..text.len() - 1].replace("\"\"", "\""),
        _ => text.to_lowercase(),
    }
}
