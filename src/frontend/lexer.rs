//! Lexical analysis: source text to token stream.
//!
//! The lexer consumes a character stream and produces a vector of tokens
//! terminated by exactly one `Eof` token. Whitespace and comments (`//` to
//! line end, non-nesting `/* ... */`) are skipped. Identifiers that match a
//! keyword lexeme are reclassified as keywords. Two-character operators are
//! greedy-matched before their one-character prefixes.

use crate::common::source::SourceLocation;
use thiserror::Error;

/// Token kinds for the C-- language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Int,
    Void,
    If,
    Else,
    While,
    Return,
    Input,
    Output,
    // Identifiers and literals
    Identifier,
    Number,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Equal,
    EqualEqual,
    NotEqual,
    Not,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    // Delimiters
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    // End of stream
    Eof,
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::Int
                | TokenKind::Void
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::Return
                | TokenKind::Input
                | TokenKind::Output
        )
    }
}

/// A single token: kind, original lexeme, and source position.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

/// Lexical error. Any character outside the language's alphabet is fatal
/// for the run.
#[derive(Debug, Error)]
#[error("Unexpected character: {ch}")]
pub struct LexError {
    pub ch: char,
    pub line: u32,
    pub column: u32,
}

/// The lexer: turns raw source into a sequence of tokens.
pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire input. The result always ends with one `Eof`
    /// token; the first unrecognized character aborts the run.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let at_end = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if at_end {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        let line = self.line;
        let column = self.column;

        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(self.make_token(TokenKind::Eof, String::new(), line, column)),
        };

        if c.is_ascii_digit() {
            return Ok(self.read_number(line, column));
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(self.read_identifier(line, column));
        }

        // Two-character operators are matched before their one-character
        // prefixes.
        let kind = match c {
            '=' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(self.make_token(TokenKind::EqualEqual, "==".into(), line, column));
                }
                TokenKind::Equal
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(self.make_token(TokenKind::NotEqual, "!=".into(), line, column));
                }
                TokenKind::Not
            }
            '<' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(self.make_token(TokenKind::LessEqual, "<=".into(), line, column));
                }
                TokenKind::Less
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(self.make_token(TokenKind::GreaterEqual, ">=".into(), line, column));
                }
                TokenKind::Greater
            }
            '+' => {
                self.advance();
                TokenKind::Plus
            }
            '-' => {
                self.advance();
                TokenKind::Minus
            }
            '*' => {
                self.advance();
                TokenKind::Star
            }
            '/' => {
                self.advance();
                TokenKind::Slash
            }
            '{' => {
                self.advance();
                TokenKind::LBrace
            }
            '}' => {
                self.advance();
                TokenKind::RBrace
            }
            '(' => {
                self.advance();
                TokenKind::LParen
            }
            ')' => {
                self.advance();
                TokenKind::RParen
            }
            '[' => {
                self.advance();
                TokenKind::LBracket
            }
            ']' => {
                self.advance();
                TokenKind::RBracket
            }
            ';' => {
                self.advance();
                TokenKind::Semicolon
            }
            ',' => {
                self.advance();
                TokenKind::Comma
            }
            other => {
                return Err(LexError {
                    ch: other,
                    line,
                    column,
                })
            }
        };

        Ok(self.make_token(kind, c.to_string(), line, column))
    }

    fn make_token(&self, kind: TokenKind, lexeme: String, line: u32, column: u32) -> Token {
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.source.get(self.pos).map(|&b| b as char)
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).map(|&b| b as char)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_char_at(1) == Some('/') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_char_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    // Block comments do not nest; an unterminated comment
                    // runs to end of input.
                    while let Some(c) = self.peek_char() {
                        if c == '*' && self.peek_char_at(1) == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Numbers are maximal runs of digits. Leading zeros are preserved in
    /// the lexeme; overflow is not detected here.
    fn read_number(&mut self, line: u32, column: u32) -> Token {
        let mut lexeme = String::new();
        while let Some(c) = self.peek_char() {
            if !c.is_ascii_digit() {
                break;
            }
            lexeme.push(c);
            self.advance();
        }
        self.make_token(TokenKind::Number, lexeme, line, column)
    }

    /// Identifiers match `[A-Za-z_][A-Za-z0-9_]*`; identifiers equal to a
    /// keyword lexeme are reclassified.
    fn read_identifier(&mut self, line: u32, column: u32) -> Token {
        let mut lexeme = String::new();
        while let Some(c) = self.peek_char() {
            if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            lexeme.push(c);
            self.advance();
        }
        let kind = match lexeme.as_str() {
            "int" => TokenKind::Int,
            "void" => TokenKind::Void,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "input" => TokenKind::Input,
            "output" => TokenKind::Output,
            _ => TokenKind::Identifier,
        };
        self.make_token(kind, lexeme, line, column)
    }
}
