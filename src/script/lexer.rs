//! Two-mode tokenizer for SmartScript sources.
//!
//! The lexer never decides on its own when to switch modes: the caller (the
//! parser) flips it into [`LexerState::Directive`] after receiving a
//! [`Token::TagOpen`] and back into [`LexerState::Basic`] after a
//! [`Token::TagClose`]. Tokens are produced one at a time and the lexer never
//! backtracks past a token it already returned.

use std::fmt;
use thiserror::Error;

/// Marker that opens a directive (`{$`).
pub const TAG_OPEN: &str = "{$";
/// Marker that closes a directive (`$}`).
pub const TAG_CLOSE: &str = "$}";

const OPERATORS: [char; 6] = ['+', '-', '*', '/', '^', '='];

/// Tokenization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexerState {
    /// Literal text up to the next directive-open marker.
    #[default]
    Basic,
    /// Inside a `{$ ... $}` directive.
    Directive,
}

/// Kind of a [`Token`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    TagOpen,
    TagClose,
    Text,
    Variable,
    Integer,
    Double,
    String,
    Function,
    Operator,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::TagOpen => "tag-open",
            TokenKind::TagClose => "tag-close",
            TokenKind::Text => "text",
            TokenKind::Variable => "variable",
            TokenKind::Integer => "integer",
            TokenKind::Double => "double",
            TokenKind::String => "string",
            TokenKind::Function => "function",
            TokenKind::Operator => "operator",
            TokenKind::Eof => "end-of-input",
        };
        f.write_str(name)
    }
}

/// A single immutable token with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    TagOpen,
    TagClose,
    /// Literal text with escapes already resolved.
    Text(String),
    Variable(String),
    Integer(i64),
    Double(f64),
    /// String literal with escapes already resolved.
    Str(String),
    /// Function name without the leading `@`.
    Function(String),
    Operator(char),
    Eof,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::TagOpen => TokenKind::TagOpen,
            Token::TagClose => TokenKind::TagClose,
            Token::Text(_) => TokenKind::Text,
            Token::Variable(_) => TokenKind::Variable,
            Token::Integer(_) => TokenKind::Integer,
            Token::Double(_) => TokenKind::Double,
            Token::Str(_) => TokenKind::String,
            Token::Function(_) => TokenKind::Function,
            Token::Operator(_) => TokenKind::Operator,
            Token::Eof => TokenKind::Eof,
        }
    }
}

/// Fatal lexical errors. Positions are character offsets into the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerError {
    #[error("no more tokens: end of input was already returned")]
    Exhausted,
    #[error("invalid escape sequence `\\{ch}` at offset {position}")]
    InvalidEscape { ch: char, position: usize },
    #[error("dangling backslash at offset {position}")]
    TrailingBackslash { position: usize },
    #[error("directive opened but input ended at offset {position} before `$}}`")]
    UnterminatedDirective { position: usize },
    #[error("string literal starting at offset {position} is never closed")]
    UnterminatedString { position: usize },
    #[error("integer literal `{literal}` at offset {position} does not fit in 64 bits")]
    IntegerOverflow { literal: String, position: usize },
    #[error("`@` at offset {position} is not followed by a function name")]
    InvalidFunctionName { position: usize },
    #[error("unexpected character `{ch}` at offset {position}")]
    UnexpectedChar { ch: char, position: usize },
}

/// Stateful SmartScript lexer.
pub struct Lexer {
    data: Vec<char>,
    pos: usize,
    state: LexerState,
    token: Option<Token>,
}

impl Lexer {
    pub fn new(text: &str) -> Self {
        Self {
            data: text.chars().collect(),
            pos: 0,
            state: LexerState::Basic,
            token: None,
        }
    }

    pub fn state(&self) -> LexerState {
        self.state
    }

    /// Switch the mode used for the next token request.
    pub fn set_state(&mut self, state: LexerState) {
        self.state = state;
    }

    /// The most recently produced token.
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Produce the next token according to the current state.
    ///
    /// # Errors
    ///
    /// Fails after [`Token::Eof`] has already been returned, on malformed
    /// escapes, and when input ends inside a directive.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        if matches!(self.token, Some(Token::Eof)) {
            return Err(LexerError::Exhausted);
        }
        let token = match self.state {
            LexerState::Basic => self.next_basic()?,
            LexerState::Directive => self.next_directive()?,
        };
        self.token = Some(token.clone());
        Ok(token)
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.data.get(self.pos + offset).copied()
    }

    fn at_tag_open(&self) -> bool {
        self.peek(0) == Some('{') && self.peek(1) == Some('$')
    }

    fn next_basic(&mut self) -> Result<Token, LexerError> {
        if self.pos >= self.data.len() {
            return Ok(Token::Eof);
        }
        if self.at_tag_open() {
            self.pos += 2;
            return Ok(Token::TagOpen);
        }

        let mut text = String::new();
        while let Some(ch) = self.peek(0) {
            if self.at_tag_open() {
                break;
            }
            if ch == '\\' {
                match self.peek(1) {
                    Some(escaped @ ('\\' | '{')) => {
                        text.push(escaped);
                        self.pos += 2;
                    }
                    Some(other) => {
                        return Err(LexerError::InvalidEscape {
                            ch: other,
                            position: self.pos,
                        })
                    }
                    None => return Err(LexerError::TrailingBackslash { position: self.pos }),
                }
            } else {
                text.push(ch);
                self.pos += 1;
            }
        }
        Ok(Token::Text(text))
    }

    fn next_directive(&mut self) -> Result<Token, LexerError> {
        while self.peek(0).is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        let Some(ch) = self.peek(0) else {
            return Err(LexerError::UnterminatedDirective { position: self.pos });
        };

        if ch == '$' && self.peek(1) == Some('}') {
            self.pos += 2;
            return Ok(Token::TagClose);
        }
        if ch.is_ascii_alphabetic() {
            let name = self.read_name();
            if name.eq_ignore_ascii_case("end") {
                return Ok(Token::Variable("END".to_string()));
            }
            return Ok(Token::Variable(name));
        }
        if ch == '@' {
            if !self.peek(1).is_some_and(|c| c.is_ascii_alphabetic()) {
                return Err(LexerError::InvalidFunctionName { position: self.pos });
            }
            self.pos += 1;
            return Ok(Token::Function(self.read_name()));
        }
        if ch == '-' && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            return self.read_number();
        }
        if OPERATORS.contains(&ch) {
            self.pos += 1;
            return Ok(Token::Operator(ch));
        }
        if ch.is_ascii_digit() {
            return self.read_number();
        }
        if ch == '"' {
            return self.read_string();
        }
        Err(LexerError::UnexpectedChar {
            ch,
            position: self.pos,
        })
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        name
    }

    fn read_digits(&mut self, into: &mut String) {
        while let Some(c) = self.peek(0).filter(char::is_ascii_digit) {
            into.push(c);
            self.pos += 1;
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start = self.pos;
        let mut literal = String::new();
        if self.peek(0) == Some('-') {
            literal.push('-');
            self.pos += 1;
        }
        self.read_digits(&mut literal);

        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            literal.push('.');
            self.pos += 1;
            self.read_digits(&mut literal);
            // digits '.' digits always parses
            let value = literal.parse::<f64>().unwrap_or_default();
            return Ok(Token::Double(value));
        }

        literal
            .parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| LexerError::IntegerOverflow {
                literal,
                position: start,
            })
    }

    fn read_string(&mut self) -> Result<Token, LexerError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(ch) = self.peek(0) else {
                return Err(LexerError::UnterminatedString { position: start });
            };
            match ch {
                '"' => {
                    self.pos += 1;
                    return Ok(Token::Str(value));
                }
                '\\' => {
                    let resolved = match self.peek(1) {
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some(other) => {
                            return Err(LexerError::InvalidEscape {
                                ch: other,
                                position: self.pos,
                            })
                        }
                        None => return Err(LexerError::UnterminatedString { position: start }),
                    };
                    value.push(resolved);
                    self.pos += 2;
                }
                _ => {
                    value.push(ch);
                    self.pos += 1;
                }
            }
        }
    }
}

/// Re-apply BASIC-mode escapes to literal text.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '\\' || ch == '{' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Re-apply string literal escapes, without the surrounding quotes.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}
