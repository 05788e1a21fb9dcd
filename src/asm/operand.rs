//! Operands: tokens with literals decoded, variables substituted and parentheses grouped.

use std::{collections::HashMap, iter::Peekable, rc::Rc};

use super::{
    error::AssemblyErrorKind,
    token::{TokenKind, Tokens},
};
use crate::isa::riscv::catalog::{RegClass, Register};

type KindResult<T> = Result<T, AssemblyErrorKind>;

pub(crate) type Vars = Rc<HashMap<String, Operand>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(i128),
    Float(f64),
    /// Unescaped string contents.
    Str(String),
    /// A label definition, without the `:`.
    Label(String),
    /// A directive name, without the `.`.
    Directive(String),
    Instruction(String),
    Register(Register),
    /// An unbound `%name`.
    Variable(String),
    /// A bare word: label reference or macro name.
    Symbol(String),
    Group(Vec<Operand>),
}

impl Operand {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Operand::Int(_) => "an integer",
            Operand::Float(_) => "a float",
            Operand::Str(_) => "a string",
            Operand::Label(_) => "a label definition",
            Operand::Directive(_) => "a directive",
            Operand::Instruction(_) => "an instruction",
            Operand::Register(_) => "a register",
            Operand::Variable(_) => "a variable",
            Operand::Symbol(_) => "a label",
            Operand::Group(_) => "parentheses",
        }
    }

    /// Source-like rendering for error messages.
    pub(crate) fn render(&self) -> String {
        match self {
            Operand::Int(v) => v.to_string(),
            Operand::Float(v) => v.to_string(),
            Operand::Str(s) => format!("{s:?}"),
            Operand::Label(name) => format!("{name}:"),
            Operand::Directive(name) => format!(".{name}"),
            Operand::Variable(name) => format!("%{name}"),
            Operand::Instruction(name) | Operand::Symbol(name) => name.clone(),
            Operand::Register(reg) => format!("{reg:?}"),
            Operand::Group(items) => {
                let inner: Vec<String> = items.iter().map(Operand::render).collect();
                format!("({})", inner.join(", "))
            }
        }
    }
}

/// Decodes the escapes of a quoted literal's inner text.
pub(crate) fn unescape(raw: &str) -> KindResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some(c @ ('\\' | '\'' | '"')) => c,
            Some(other) => return Err(AssemblyErrorKind::InvalidEscape(other)),
            None => return Err(AssemblyErrorKind::InvalidEscape('\\')),
        };
        out.push(escaped);
    }
    Ok(out)
}

fn quoted_inner(text: &str) -> &str {
    &text[1..text.len() - 1]
}

/// Pulls operands off one line.
pub(crate) struct LineReader<'a> {
    tokens: Peekable<Tokens<'a>>,
    vars: Vars,
}

impl<'a> LineReader<'a> {
    pub(crate) fn new(tokens: Tokens<'a>, vars: Vars) -> Self {
        Self {
            tokens: tokens.peekable(),
            vars,
        }
    }

    fn skip_trivia(&mut self) {
        while self
            .tokens
            .next_if(|t| matches!(t.kind, TokenKind::Space | TokenKind::Comment))
            .is_some()
        {}
    }

    pub(crate) fn next_operand(&mut self) -> KindResult<Option<Operand>> {
        self.skip_trivia();
        let Some(token) = self.tokens.next() else {
            return Ok(None);
        };

        let operand = match token.kind {
            TokenKind::Instruction => Operand::Instruction(token.text.to_owned()),
            TokenKind::Int(v) => Operand::Int(v),
            TokenKind::Float(v) => Operand::Float(v),
            TokenKind::Register(reg) => Operand::Register(reg),
            TokenKind::Variable => {
                let name = &token.text[1..];
                match self.vars.get(name) {
                    Some(bound) => bound.clone(),
                    None => Operand::Variable(name.to_owned()),
                }
            }
            TokenKind::Label => Operand::Label(token.text[..token.text.len() - 1].to_owned()),
            TokenKind::Directive => Operand::Directive(token.text[1..].to_owned()),
            TokenKind::Unknown => Operand::Symbol(token.text.to_owned()),
            TokenKind::Str => Operand::Str(unescape(quoted_inner(token.text))?),
            TokenKind::Char => {
                let value = unescape(quoted_inner(token.text))?;
                if value.chars().count() != 1 {
                    return Err(AssemblyErrorKind::CharLength);
                }
                // first UTF-8 byte of the character
                Operand::Int(i128::from(value.as_bytes()[0]))
            }
            TokenKind::InvalidString => return Err(AssemblyErrorKind::InvalidString),
            TokenKind::InvalidChar => return Err(AssemblyErrorKind::InvalidChar),
            TokenKind::OpenParen => self.group()?,
            TokenKind::CloseParen => return Err(AssemblyErrorKind::UnmatchedParen),
            TokenKind::Space | TokenKind::Comment => {
                unreachable!("trivia is skipped before reading an operand")
            }
        };

        Ok(Some(operand))
    }

    fn group(&mut self) -> KindResult<Operand> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.tokens.peek().map(|t| t.kind) {
                None => return Err(AssemblyErrorKind::UnmatchedParen),
                Some(TokenKind::CloseParen) => {
                    self.tokens.next();
                    return Ok(Operand::Group(items));
                }
                Some(_) => {
                    if let Some(item) = self.next_operand()? {
                        items.push(item);
                    }
                }
            }
        }
    }

    /// Every operand left on the line.
    pub(crate) fn rest(&mut self) -> KindResult<Vec<Operand>> {
        let mut out = Vec::new();
        while let Some(operand) = self.next_operand()? {
            out.push(operand);
        }
        Ok(out)
    }

    pub(crate) fn required(&mut self) -> KindResult<Operand> {
        self.next_operand()?
            .ok_or(AssemblyErrorKind::TooFewArguments)
    }

    pub(crate) fn assert_clear(&mut self) -> KindResult<()> {
        match self.next_operand()? {
            None => Ok(()),
            Some(_) => Err(AssemblyErrorKind::TooManyArguments),
        }
    }

    pub(crate) fn expect_reg(&mut self, class: RegClass) -> KindResult<u8> {
        match self.required()? {
            Operand::Register(reg) if reg.class == class => Ok(reg.index),
            _ => Err(match class {
                RegClass::Int => AssemblyErrorKind::ExpectedIntRegister,
                RegClass::Float => AssemblyErrorKind::ExpectedFloatRegister,
            }),
        }
    }

    pub(crate) fn expect_int(&mut self) -> KindResult<i128> {
        match self.required()? {
            Operand::Int(v) => Ok(v),
            other => Err(AssemblyErrorKind::ExpectedInt(other.describe())),
        }
    }

    pub(crate) fn expect_label(&mut self) -> KindResult<String> {
        match self.required()? {
            Operand::Symbol(name) => Ok(name),
            other => Err(AssemblyErrorKind::ExpectedLabel(other.describe())),
        }
    }

    /// Signed 12-bit immediate.
    pub(crate) fn expect_imm12(&mut self) -> KindResult<i128> {
        let v = self.expect_int()?;
        if fits_imm12(v) {
            Ok(v)
        } else {
            Err(AssemblyErrorKind::OutOfRange12Bit(v))
        }
    }

    /// Unsigned 5-bit shift amount.
    pub(crate) fn expect_imm5(&mut self) -> KindResult<i128> {
        let v = self.expect_int()?;
        if (0..=31).contains(&v) {
            Ok(v)
        } else {
            Err(AssemblyErrorKind::OutOfRange5Bit(v))
        }
    }
}

pub(crate) fn fits_imm12(v: i128) -> bool {
    (-2048..=2047).contains(&v)
}
