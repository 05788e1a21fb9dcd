use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyErrorKind {
    // lexical
    #[error("unterminated string literal")]
    InvalidString,
    #[error("unterminated character literal")]
    InvalidChar,
    #[error("a character literal holds exactly one character")]
    CharLength,
    #[error("unknown escape sequence `\\{0}`")]
    InvalidEscape(char),
    #[error("unmatched parenthesis")]
    UnmatchedParen,
    #[error("too many values inside parentheses")]
    TooManyInParens,
    #[error("nothing inside parentheses")]
    TooFewInParens,
    #[error("parentheses outside of an operand")]
    StrayParenthesis,

    // directives and data
    #[error("unknown directive `.{0}`")]
    UnknownDirective(String),
    #[error("`.{0}` can only be used in the data segment")]
    DataDirectiveInText(String),
    #[error("`{0}` cannot be placed in the text segment")]
    DataInText(String),
    #[error("`.ascii` and `.asciz` take strings, found {0}")]
    NotAString(&'static str),
    #[error("strings can only be placed with `.ascii` or `.asciz`")]
    StringOutsideDirective,
    #[error("floating point values need `.float` or `.double`")]
    WrongDirectiveFloat,
    #[error("a label address cannot be stored as a floating point value")]
    LabelCantFloat,
    #[error("`.{0}` takes at least one label")]
    GlobalWithoutLabel(String),
    #[error("`.{0}` only takes labels")]
    GlobalNonLabel(String),

    // operands
    #[error("register `{0}` outside of an instruction")]
    LoneRegister(String),
    #[error("`%{0}` is not bound here")]
    UnboundVariable(String),
    #[error("expected an integer register")]
    ExpectedIntRegister,
    #[error("expected a floating point register")]
    ExpectedFloatRegister,
    #[error("expected an integer, found {0}")]
    ExpectedInt(&'static str),
    #[error("expected a label, found {0}")]
    ExpectedLabel(&'static str),
    #[error("expected `offset(register)` or a label")]
    ExpectedOffReg,
    #[error("expected a label inside the parentheses")]
    ExpectedLabelInParens,
    #[error("expected a label, `%modifier(label)` or an integer")]
    UOperandType,
    #[error("{0} does not fit in 5 bits")]
    OutOfRange5Bit(i128),
    #[error("{0} does not fit in 12 bits")]
    OutOfRange12Bit(i128),
    #[error("{0} does not fit in 20 bits")]
    OutOfRange20Bit(i128),
    #[error("offset {0} does not fit in 12 bits")]
    OutOfRangeOffset(i128),
    #[error("`li` only loads 32-bit values, {0} is out of range")]
    LiOutOfRange(i128),
    #[error("too many arguments")]
    TooManyArguments,
    #[error("not enough arguments")]
    TooFewArguments,

    // macros
    #[error("`{name}` takes {expected} arguments, {found} given")]
    TooManyMacroArgs {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("`{name}` takes {expected} arguments, {found} given")]
    TooFewMacroArgs {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("expected a macro name after `.macro`")]
    MacroName,
    #[error("macro parameters are written `%name`")]
    MacroParameter,
    #[error("`.macro` without a matching `.end_macro`")]
    UnterminatedMacro,
    #[error("`.end_macro` without a matching `.macro`")]
    StrayEndMacro,
    #[error("`.macro` has to start its line")]
    MisplacedMacro,
    #[error("expansions nested more than {0} deep")]
    ExpansionTooDeep(usize),

    // linking
    #[error("label `{0}` is never defined")]
    UnresolvedLabel(String),
    #[error("jump target is not 2-byte aligned")]
    EvilJump,
    #[error("{kind} target {offset} bytes away is out of range")]
    TargetOutOfRange { kind: &'static str, offset: i64 },
    #[error("the {0} segment is full")]
    SegmentOverflow(&'static str),
}

/// One macro call site an error was raised through, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub line: usize,
    pub file: String,
}

/// An assembly failure with the 1-based line it was raised on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}:{line}: {kind}{}", render_trace(.trace))]
pub struct AssemblyError {
    #[source]
    pub kind: AssemblyErrorKind,
    pub line: usize,
    pub file: String,
    pub trace: Vec<TraceFrame>,
}

fn render_trace(trace: &[TraceFrame]) -> String {
    trace
        .iter()
        .map(|frame| format!("\n  in expansion at {}:{}", frame.file, frame.line))
        .collect()
}

impl AssemblyError {
    pub fn new(kind: AssemblyErrorKind, line: usize, file: &str) -> Self {
        Self {
            kind,
            line,
            file: file.to_owned(),
            trace: Vec::new(),
        }
    }

    pub fn add_trace(&mut self, line: usize, file: &str) {
        self.trace.push(TraceFrame {
            line,
            file: file.to_owned(),
        });
    }
}
