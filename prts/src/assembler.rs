// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! Two-pass assembler from PixelRTS assembly text to a [`Grid`].
//!
//! ```text
//! ; sum 1..=10 into r2
//!         LDI r1, 10
//!         LDI r2, 0
//! loop:   ADD r2, r2, r1
//!         SUBI r1, r1, 1
//!         BEQ r1, r0, done
//!         JMP loop
//! done:   HALT
//! ```
//!
//! The first pass binds every label to the Hilbert distance of the
//! instruction that follows it and counts instructions. The second pass
//! resolves operands against [`isa::INSTRUCTION_SET`] and lays the encoded
//! words out along the curve.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    arch::{Distance, Register, Word, REGISTER_COUNT},
    grid::Grid,
    isa::{self, Role},
    op::{Op, OPERAND_SLOTS},
};

/// The source could not be split into labels, mnemonics and operands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("`{0}` is not a valid label name")]
    InvalidLabel(String),
    #[error("`{mnemonic}` takes {expected} operand(s), found {found}")]
    OperandCount {
        mnemonic: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("expected a register, found `{0}`")]
    ExpectedRegister(String),
    #[error("expected a number or label, found register `{0}`")]
    ExpectedValue(String),
    #[error("malformed operand `{0}`")]
    MalformedOperand(String),
}

/// The source parsed, but an operand does not name anything encodable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("undefined label `{0}`")]
    UndefinedLabel(String),
    #[error("label `{label}` is already defined on line {first_line}")]
    DuplicateLabel { label: String, first_line: usize },
    #[error("immediate `{0}` does not fit in a byte (0-255)")]
    ImmediateOutOfRange(String),
    #[error("label `{label}` resolves to distance {distance}, which does not fit in a byte")]
    LabelOutOfRange { label: String, distance: Distance },
    #[error("register `{0}` is outside r0-r31")]
    RegisterOutOfRange(String),
    #[error("{0} instructions do not fit in the largest grid")]
    ProgramTooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyErrorKind {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Assembly failed on the given (1-based) source line. Nothing is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct AssemblyError {
    pub line: usize,
    pub kind: AssemblyErrorKind,
}

impl AssemblyError {
    fn new(line: usize, kind: impl Into<AssemblyErrorKind>) -> Self {
        Self {
            line,
            kind: kind.into(),
        }
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

pub type AssemblyResult<T> = Result<T, AssemblyError>;

/// Compiles assembly source into a program image.
pub fn assemble(source: &str) -> AssemblyResult<Grid> {
    Assembler::parse(source)?.assemble()
}

/// One instruction line left over after the first pass.
#[derive(Debug, Clone, Copy)]
struct Statement<'src> {
    line: usize,
    mnemonic: &'src str,
    operands: &'src str,
}

struct LabelDefinition {
    distance: Distance,
    line: usize,
}

/// A program after the first pass: instructions in order plus the label
/// table.
pub struct Assembler<'src> {
    statements: Vec<Statement<'src>>,
    labels: HashMap<&'src str, LabelDefinition>,
    last_line: usize,
}

impl<'src> Assembler<'src> {
    /// First pass: splits off comments, binds labels and counts
    /// instructions.
    pub fn parse(source: &'src str) -> AssemblyResult<Self> {
        let mut statements = vec![];
        let mut labels: HashMap<&'src str, LabelDefinition> = HashMap::new();
        let mut last_line = 0;

        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            last_line = line;

            let mut code = strip_comment(raw).trim();
            if code.is_empty() {
                continue;
            }

            if let Some((label, rest)) = split_label(code) {
                if !is_label_name(label) {
                    return Err(AssemblyError::new(
                        line,
                        SyntaxError::InvalidLabel(label.to_owned()),
                    ));
                }
                if let Some(previous) = labels.get(label) {
                    return Err(AssemblyError::new(
                        line,
                        ResolutionError::DuplicateLabel {
                            label: label.to_owned(),
                            first_line: previous.line,
                        },
                    ));
                }

                let distance = statements.len() as Distance;
                trace!(label, distance, "bound label");
                labels.insert(label, LabelDefinition { distance, line });
                code = rest.trim();
                if code.is_empty() {
                    continue;
                }
            }

            let (mnemonic, operands) = match code.split_once(char::is_whitespace)
            {
                Some((mnemonic, operands)) => (mnemonic, operands.trim()),
                None => (code, ""),
            };
            statements.push(Statement {
                line,
                mnemonic,
                operands,
            });
        }

        Ok(Self {
            statements,
            labels,
            last_line,
        })
    }

    pub fn instruction_count(&self) -> usize {
        self.statements.len()
    }

    /// The label table built by the first pass.
    pub fn labels(&self) -> impl Iterator<Item = (&'src str, Distance)> + '_ {
        self.labels
            .iter()
            .map(|(&label, definition)| (label, definition.distance))
    }

    pub fn label(&self, name: &str) -> Option<Distance> {
        self.labels.get(name).map(|definition| definition.distance)
    }

    /// Second pass: resolves every instruction, in distance order.
    pub fn resolve(&self) -> AssemblyResult<Vec<Op>> {
        self.statements
            .iter()
            .map(|statement| self.resolve_statement(statement))
            .collect()
    }

    /// Runs the second pass and lays the program out on a grid.
    pub fn assemble(&self) -> AssemblyResult<Grid> {
        let words: Vec<Word> =
            self.resolve()?.iter().map(Op::encode_packed).collect();

        // the only way a freshly sized grid fails is by being too large
        let grid = Grid::from_program(&words).map_err(|_| {
            AssemblyError::new(
                self.last_line,
                ResolutionError::ProgramTooLarge(words.len()),
            )
        })?;

        debug!(
            instructions = words.len(),
            labels = self.labels.len(),
            side = grid.side(),
            "assembled program"
        );
        Ok(grid)
    }

    fn resolve_statement(&self, statement: &Statement<'src>) -> AssemblyResult<Op> {
        let line = statement.line;
        let info = isa::by_mnemonic(statement.mnemonic).ok_or_else(|| {
            AssemblyError::new(
                line,
                SyntaxError::UnknownMnemonic(statement.mnemonic.to_owned()),
            )
        })?;

        let tokens = split_operands(statement.operands)
            .map_err(|error| AssemblyError::new(line, error))?;
        if tokens.len() != info.arity() {
            return Err(AssemblyError::new(
                line,
                SyntaxError::OperandCount {
                    mnemonic: info.mnemonic,
                    expected: info.arity(),
                    found: tokens.len(),
                },
            ));
        }

        let mut values = [0u8; OPERAND_SLOTS];
        for ((value, token), operand) in
            values.iter_mut().zip(&tokens).zip(info.operands)
        {
            *value = match operand.role {
                Role::Source | Role::Destination => parse_register(token),
                Role::Immediate | Role::Target => self.resolve_value(token),
            }
            .map_err(|kind| AssemblyError::new(line, kind))?;
        }

        Op::from_operands(info.opcode, values).ok_or_else(|| {
            AssemblyError::new(
                line,
                SyntaxError::UnknownMnemonic(statement.mnemonic.to_owned()),
            )
        })
    }

    /// A byte literal or a label.
    fn resolve_value(&self, token: &str) -> Result<u8, AssemblyErrorKind> {
        if register_token(token).is_some() {
            return Err(SyntaxError::ExpectedValue(token.to_owned()).into());
        }
        if token.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+')
        {
            return parse_literal(token);
        }
        if !is_label_name(token) {
            return Err(SyntaxError::MalformedOperand(token.to_owned()).into());
        }

        let distance = self.label(token).ok_or_else(|| {
            ResolutionError::UndefinedLabel(token.to_owned())
        })?;
        u8::try_from(distance).map_err(|_| {
            ResolutionError::LabelOutOfRange {
                label: token.to_owned(),
                distance,
            }
            .into()
        })
    }
}

fn strip_comment(line: &str) -> &str {
    line.split_once(';').map_or(line, |(code, _)| code)
}

/// `name: rest` splits into `("name", "rest")`. Lines whose text before the
/// colon contains whitespace are not label lines.
fn split_label(code: &str) -> Option<(&str, &str)> {
    let (label, rest) = code.split_once(':')?;
    let label = label.trim_end();
    (!label.contains(char::is_whitespace)).then_some((label, rest))
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && register_token(name).is_none()
}

fn split_operands(operands: &str) -> Result<Vec<&str>, SyntaxError> {
    if operands.is_empty() {
        return Ok(vec![]);
    }
    let tokens: Vec<&str> = operands.split(',').map(str::trim).collect();
    if tokens.iter().any(|token| token.is_empty()) {
        return Err(SyntaxError::MalformedOperand(operands.to_owned()));
    }
    Ok(tokens)
}

/// Register syntax: `rN`/`RN` with decimal `N`, or an alias. Yields the
/// unchecked index, or `None` when the token is not register-shaped.
fn register_token(token: &str) -> Option<u64> {
    if let Some(register) = isa::register_alias(token) {
        return Some(register as u64);
    }
    let digits = token.strip_prefix(['r', 'R'])?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().unwrap_or(u64::MAX))
}

fn parse_register(token: &str) -> Result<Register, AssemblyErrorKind> {
    match register_token(token) {
        Some(index) if index < REGISTER_COUNT as u64 => Ok(index as Register),
        Some(_) => {
            Err(ResolutionError::RegisterOutOfRange(token.to_owned()).into())
        }
        None => Err(SyntaxError::ExpectedRegister(token.to_owned()).into()),
    }
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_literal(token: &str) -> Result<u8, AssemblyErrorKind> {
    let out_of_range =
        || AssemblyErrorKind::from(ResolutionError::ImmediateOutOfRange(token.to_owned()));
    let malformed =
        || AssemblyErrorKind::from(SyntaxError::MalformedOperand(token.to_owned()));

    let (negative, magnitude) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };

    let (digits, radix) = match magnitude
        .strip_prefix("0x")
        .or_else(|| magnitude.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (magnitude, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(malformed());
    }

    let value = u64::from_str_radix(digits, radix).map_err(|_| out_of_range())?;
    if negative && value != 0 {
        return Err(out_of_range());
    }
    u8::try_from(value).map_err(|_| out_of_range())
}
