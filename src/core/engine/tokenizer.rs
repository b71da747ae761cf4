//! Formula tokenizer for the expression engine
//!
//! Converts bound formula text like `{{ 5 > 3 }} * ( 120.5 )` into tokens.
//! Characters outside the formula alphabet (`$`, `^`, `#`, stray braces, ...)
//! are dropped rather than rejected.

use std::iter::Peekable;
use std::str::Chars;

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, 1.5e10)
    Number(f64),
    /// A string literal (e.g., "hello" or 'world')
    Text(String),
    /// An identifier, keyword or dotted `source.field` reference
    Identifier(String),
    /// Arithmetic, comparison and logical operators
    Operator(String),
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Comma,
    /// `?` of a ternary
    Question,
    /// `:` of a ternary
    Colon,
    /// `{{` opening a conditional block
    BlockOpen,
    /// `}}` closing a conditional block
    BlockClose,
}

impl Token {
    /// Source text of the token, with string quotes removed
    pub fn raw_text(&self) -> String {
        match self {
            Token::Number(n) => crate::types::format_number(*n),
            Token::Text(s) | Token::Identifier(s) | Token::Operator(s) => s.clone(),
            Token::OpenParen => "(".to_string(),
            Token::CloseParen => ")".to_string(),
            Token::OpenBracket => "[".to_string(),
            Token::CloseBracket => "]".to_string(),
            Token::Comma => ",".to_string(),
            Token::Question => "?".to_string(),
            Token::Colon => ":".to_string(),
            Token::BlockOpen => "{{".to_string(),
            Token::BlockClose => "}}".to_string(),
        }
    }
}

/// Error during tokenization
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokenize error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TokenizeError {}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(formula: &'a str) -> Self {
        Self {
            chars: formula.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire formula into a vector of tokens
    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Get the next token, or None if at end of input
    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        loop {
            self.skip_whitespace();

            let c = match self.peek() {
                None => return Ok(None),
                Some(c) => c,
            };

            let token = match c {
                '"' | '\'' => self.read_string()?,

                '(' => self.single(Token::OpenParen),
                ')' => self.single(Token::CloseParen),
                '[' => self.single(Token::OpenBracket),
                ']' => self.single(Token::CloseBracket),
                ',' => self.single(Token::Comma),
                '?' => self.single(Token::Question),
                ':' => self.single(Token::Colon),

                '{' | '}' => match self.read_brace() {
                    Some(token) => token,
                    None => continue,
                },

                '+' | '-' | '*' | '/' | '%' => {
                    self.advance();
                    Token::Operator(c.to_string())
                }

                '<' | '>' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        Token::Operator(format!("{}=", c))
                    } else {
                        Token::Operator(c.to_string())
                    }
                }

                '=' | '!' => self.read_equality(c),

                '&' | '|' => {
                    self.advance();
                    if self.peek() == Some(c) {
                        self.advance();
                        Token::Operator(format!("{}{}", c, c))
                    } else {
                        // Bitwise forms are not part of the language; the parser rejects them
                        Token::Operator(c.to_string())
                    }
                }

                c if c.is_ascii_digit() => self.read_number()?,

                '.' if self.peek_second().is_some_and(|n| n.is_ascii_digit()) => {
                    self.read_number()?
                }

                c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(),

                c => {
                    tracing::debug!(character = %c, position = self.position, "dropping character");
                    self.advance();
                    continue;
                }
            };

            return Ok(Some(token));
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// `{{` / `}}` delimit blocks; a lone brace is dropped
    fn read_brace(&mut self) -> Option<Token> {
        let brace = self.advance()?;
        if self.peek() == Some(brace) {
            self.advance();
            return Some(if brace == '{' {
                Token::BlockOpen
            } else {
                Token::BlockClose
            });
        }
        tracing::debug!(character = %brace, position = self.position, "dropping lone brace");
        None
    }

    /// Read `=`, `==`, `===`, `!`, `!=`, `!==`
    fn read_equality(&mut self, first: char) -> Token {
        self.advance();
        let mut op = first.to_string();
        if self.peek() == Some('=') {
            self.advance();
            op.push('=');
            if self.peek() == Some('=') {
                self.advance();
                op.push('=');
            }
        }
        Token::Operator(op)
    }

    /// Read a string literal (double or single quoted, doubled quote escapes)
    fn read_string(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        let quote = match self.advance() {
            Some(q) => q,
            None => return Err(TokenizeError::new("Expected string literal", start_pos)),
        };
        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(TokenizeError::new("Unterminated string literal", start_pos));
                }
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        value.push(quote);
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => value.push(c),
            }
        }

        Ok(Token::Text(value))
    }

    fn push_digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        let mut num_str = String::new();

        self.push_digits(&mut num_str);

        if self.peek() == Some('.') {
            num_str.push('.');
            self.advance();
            self.push_digits(&mut num_str);
        }

        if matches!(self.peek(), Some('e') | Some('E'))
            && self
                .peek_second()
                .is_some_and(|n| n.is_ascii_digit() || n == '+' || n == '-')
        {
            num_str.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.advance();
            }
            self.push_digits(&mut num_str);
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    /// Read an identifier (keyword, variable, or source.field reference)
    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        Token::Identifier(ident)
    }
}

/// Convenience function to tokenize a formula string
pub fn tokenize(formula: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer::new(formula).tokenize()
}
