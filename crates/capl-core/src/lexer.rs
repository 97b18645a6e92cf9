//! Lightweight CAPL scanner.
//!
//! Produces just enough structure for outline extraction: keywords,
//! identifiers, literals, punctuation and brace depth. There is no grammar
//! validation and no failure mode. Unterminated strings stop at the end of
//! their line, an unterminated block comment swallows the rest of the input,
//! and any unrecognized character becomes an [`TokenKind::Unknown`] token.
//!
//! Positions are maintained incrementally while scanning, so a full pass is
//! linear in the input length.

use crate::text::is_line_break;
use tower_lsp_server::ls_types::{Position, Range};

/// Words with structural meaning for the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// `on`: introduces an event handler.
    On,
    /// `variables`: global variable block.
    Variables,
    /// `includes`: include block.
    Includes,
    Struct,
    Enum,
    /// `testcase`, `testfunction`, `export`.
    FunctionMarker,
    /// Built-in data types and qualifiers (`int`, `msTimer`, `message`, `const`, ...).
    Type,
}

impl Keyword {
    /// Looks up the keyword table.
    ///
    /// # Examples
    ///
    /// ```
    /// use capl_core::lexer::Keyword;
    ///
    /// assert_eq!(Keyword::from_word("on"), Some(Keyword::On));
    /// assert_eq!(Keyword::from_word("msTimer"), Some(Keyword::Type));
    /// assert_eq!(Keyword::from_word("write"), None);
    /// ```
    pub fn from_word(word: &str) -> Option<Self> {
        let keyword = match word {
            "on" => Self::On,
            "variables" => Self::Variables,
            "includes" => Self::Includes,
            "struct" => Self::Struct,
            "enum" => Self::Enum,
            "testcase" | "testfunction" | "export" => Self::FunctionMarker,
            "void" | "int" | "long" | "dword" | "word" | "byte" | "char" | "float" | "double"
            | "int64" | "qword" | "const" | "static" | "message" | "multiplexed_message"
            | "msTimer" | "timer" | "signal" | "diagRequest" | "diagResponse" | "sysvar"
            | "envVar" | "frFrame" | "frPDU" | "linFrame" | "ethernetPacket" | "mostMessage"
            | "gmLanMessage" | "pg" | "a429word" | "j1587Message" => Self::Type,
            _ => return None,
        };
        Some(keyword)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier,
    Number,
    String,
    Char,
    /// Preprocessor word such as `#include` or `#pragma`.
    Directive,
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Semicolon,
    Comma,
    /// `=` (but not `==`).
    Assign,
    /// Any other operator; `::` and `==` are single tokens.
    Punct,
    Unknown,
}

/// One scanned token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte range of `text` in the scanned source.
    pub span: std::ops::Range<usize>,
    pub start: Position,
    pub end: Position,
    /// Brace depth outside the token: for `{` the depth before it, for `}`
    /// the depth after it.
    pub depth: u32,
}

impl Token<'_> {
    pub fn range(&self) -> Range {
        Range::new(self.start, self.end)
    }

    /// Identifiers and keywords.
    pub fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Identifier | TokenKind::Keyword(_))
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }
}

/// Lazy token stream over CAPL source.
///
/// # Examples
///
/// ```
/// use capl_core::lexer::{Keyword, Lexer, TokenKind};
///
/// let kinds: Vec<_> = Lexer::new("on start { }").map(|t| t.kind).collect();
/// assert_eq!(
///     kinds,
///     vec![
///         TokenKind::Keyword(Keyword::On),
///         TokenKind::Identifier,
///         TokenKind::OpenBrace,
///         TokenKind::CloseBrace,
///     ]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    offset: usize,
    line: u32,
    character: u32,
    depth: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            offset: 0,
            line: 0,
            character: 0,
            depth: 0,
        }
    }

    /// Current scan position; the end of the document once exhausted.
    pub fn current_position(&self) -> Position {
        Position::new(self.line, self.character)
    }

    /// Current brace depth.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn peek(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        let next = self.src.as_bytes().get(self.offset).copied();
        if c.is_ascii() && is_line_break(c as u8, next) {
            self.line += 1;
            self.character = 0;
        } else {
            self.character += c.len_utf16() as u32;
        }
        Some(c)
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) {
        while let Some(c) = self.bump() {
            if c == '*' && self.peek() == Some('/') {
                self.bump();
                return;
            }
        }
    }

    /// Consumes a quoted literal after its opening quote.
    fn quoted(&mut self, quote: char) {
        while let Some(c) = self.peek() {
            match c {
                '\n' | '\r' => return,
                '\\' => {
                    self.bump();
                    if self.peek().is_some_and(|next| !matches!(next, '\n' | '\r')) {
                        self.bump();
                    }
                }
                c if c == quote => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.bump_while(char::is_whitespace);

            let start_offset = self.offset;
            let start = self.current_position();
            let c = self.bump()?;

            let kind = match c {
                '/' if self.peek() == Some('/') => {
                    self.bump_while(|c| !matches!(c, '\n' | '\r'));
                    continue;
                }
                '/' if self.peek() == Some('*') => {
                    self.bump();
                    self.skip_block_comment();
                    continue;
                }
                '"' => {
                    self.quoted('"');
                    TokenKind::String
                }
                '\'' => {
                    self.quoted('\'');
                    TokenKind::Char
                }
                '#' if self.peek().is_some_and(is_ident_start) => {
                    self.bump_while(is_ident_continue);
                    TokenKind::Directive
                }
                c if is_ident_start(c) => {
                    self.bump_while(is_ident_continue);
                    Keyword::from_word(&self.src[start_offset..self.offset])
                        .map_or(TokenKind::Identifier, TokenKind::Keyword)
                }
                c if c.is_ascii_digit() => {
                    self.bump_while(|c| is_ident_continue(c) || c == '.');
                    TokenKind::Number
                }
                '{' => TokenKind::OpenBrace,
                '}' => TokenKind::CloseBrace,
                '(' => TokenKind::OpenParen,
                ')' => TokenKind::CloseParen,
                '[' => TokenKind::OpenBracket,
                ']' => TokenKind::CloseBracket,
                ';' => TokenKind::Semicolon,
                ',' => TokenKind::Comma,
                '=' if self.peek() == Some('=') => {
                    self.bump();
                    TokenKind::Punct
                }
                '=' => TokenKind::Assign,
                ':' if self.peek() == Some(':') => {
                    self.bump();
                    TokenKind::Punct
                }
                c if c.is_ascii_punctuation() => TokenKind::Punct,
                _ => TokenKind::Unknown,
            };

            let depth = match kind {
                TokenKind::OpenBrace => {
                    let depth = self.depth;
                    self.depth = self.depth.saturating_add(1);
                    depth
                }
                TokenKind::CloseBrace => {
                    self.depth = self.depth.saturating_sub(1);
                    self.depth
                }
                _ => self.depth,
            };

            return Some(Token {
                kind,
                text: &self.src[start_offset..self.offset],
                span: start_offset..self.offset,
                start,
                end: self.current_position(),
                depth,
            });
        }
    }
}
