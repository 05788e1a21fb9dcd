//! Line tokenizer.
//!
//! Splits one source line into typed tokens. Nothing is dropped: spaces, commas and comments
//! come out as tokens too, so concatenating every token's text gives back the line.

use crate::isa::riscv::catalog::{Catalog, Register};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    Instruction,
    Int(i128),
    Float(f64),
    Register(Register),
    /// `%name`
    Variable,
    /// `name:`
    Label,
    /// `.name`
    Directive,
    /// Anything else, usually a symbol reference.
    Unknown,
    Str,
    Char,
    InvalidString,
    InvalidChar,
    Comment,
    /// A run of whitespace and commas.
    Space,
    OpenParen,
    CloseParen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Raw text, quotes and trailing `:` included.
    pub text: &'a str,
}

/// Lazy token stream over one line. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a str,
    catalog: &'a Catalog,
}

pub fn tokenize<'a>(line: &'a str, catalog: &'a Catalog) -> Tokens<'a> {
    Tokens {
        rest: line,
        catalog,
    }
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn ends_word(c: char) -> bool {
    is_space(c) || matches!(c, '(' | ')' | '"' | '\'' | '#')
}

/// Integer literal: decimal, `0x`, `0b` or `0o`, optionally signed.
pub(crate) fn parse_int(text: &str) -> Option<i128> {
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };

    let (radix, digits) = match body.get(..2) {
        Some("0x" | "0X") => (16, &body[2..]),
        Some("0b" | "0B") => (2, &body[2..]),
        Some("0o" | "0O") => (8, &body[2..]),
        _ => (10, body),
    };

    // from_str_radix would accept a second sign
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let value = i128::from_str_radix(digits, radix).ok()?;
    Some(if negative { -value } else { value })
}

/// Float literal: digits with a point and/or exponent, `NaN` or `Infinity`.
pub(crate) fn parse_float(text: &str) -> Option<f64> {
    match text {
        "NaN" => return Some(f64::NAN),
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    if !text.chars().any(|c| c.is_ascii_digit())
        || !text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }
    text.parse().ok()
}

impl<'a> Tokens<'a> {
    fn identify(&self, word: &str) -> TokenKind {
        if self.catalog.is_instruction(word) {
            TokenKind::Instruction
        } else if let Some(value) = parse_int(word) {
            TokenKind::Int(value)
        } else if let Some(value) = parse_float(word) {
            TokenKind::Float(value)
        } else if let Some(reg) = self.catalog.register(word) {
            TokenKind::Register(reg)
        } else if word.starts_with('%') {
            TokenKind::Variable
        } else if word.ends_with(':') {
            TokenKind::Label
        } else if word.starts_with('.') {
            TokenKind::Directive
        } else {
            TokenKind::Unknown
        }
    }

    /// Length of the quoted literal at the start of `rest` and whether it is closed.
    fn scan_quoted(&self, quote: char) -> (usize, bool) {
        let mut chars = self.rest.char_indices().skip(1);
        while let Some((idx, c)) = chars.next() {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                return (idx + c.len_utf8(), true);
            }
        }
        (self.rest.len(), false)
    }

    fn take(&mut self, len: usize, kind: TokenKind) -> Token<'a> {
        let (text, rest) = self.rest.split_at(len);
        self.rest = rest;
        Token { kind, text }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let first = self.rest.chars().next()?;

        let token = match first {
            '"' | '\'' => {
                let (len, closed) = self.scan_quoted(first);
                let kind = match (first, closed) {
                    ('"', true) => TokenKind::Str,
                    ('"', false) => TokenKind::InvalidString,
                    (_, true) => TokenKind::Char,
                    (_, false) => TokenKind::InvalidChar,
                };
                self.take(len, kind)
            }
            '#' => self.take(self.rest.len(), TokenKind::Comment),
            '(' => self.take(1, TokenKind::OpenParen),
            ')' => self.take(1, TokenKind::CloseParen),
            c if is_space(c) => {
                let len = self.rest.find(|c| !is_space(c)).unwrap_or(self.rest.len());
                self.take(len, TokenKind::Space)
            }
            _ => {
                let len = self.rest.find(ends_word).unwrap_or(self.rest.len());
                let kind = self.identify(&self.rest[..len]);
                self.take(len, kind)
            }
        };

        Some(token)
    }
}
