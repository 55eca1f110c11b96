//! Fatal analysis findings

use crate::error_codes::{format_error_code, get_error_code};
use diagnostics::{Diagnostic, DiagnosticBuilder};
use parser::LineNumber;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum SemanticErrorKind {
    ConflictingOptionBase {
        first_line: LineNumber,
        first_value: u32,
        line: LineNumber,
        value: u32,
    },
    InvalidOptionBase { value: u32 },
    ArrayRedimensioned { name: String, first_line: LineNumber },
    NonConstantDimension { name: String, extent: String },
    NegativeDimension { name: String, value: i64 },
    DimensionBelowBase { name: String, value: i64, base: u32 },
    DimensionTooLarge { name: String, extent: String },
    FunctionRedefined { name: String, first_line: LineNumber },
    UndefinedFunction { name: String },
    FunctionArity { name: String, expected: usize, found: usize },
    UndefinedLine { target: LineNumber, statement: String },
    NextWithoutFor,
    NextMismatch { expected: String, found: String },
    WendWithoutWhile,
    FlatteningSkipped { name: String },
    UnsupportedCommand { name: String },
    UnsupportedStatement { name: String },
}

impl SemanticErrorKind {
    pub fn code(&self) -> u16 {
        match self {
            SemanticErrorKind::ConflictingOptionBase { .. } => 2001,
            SemanticErrorKind::InvalidOptionBase { .. } => 2002,
            SemanticErrorKind::ArrayRedimensioned { .. } => 2003,
            SemanticErrorKind::NonConstantDimension { .. } => 2004,
            SemanticErrorKind::NegativeDimension { .. } => 2005,
            SemanticErrorKind::DimensionBelowBase { .. } => 2006,
            SemanticErrorKind::DimensionTooLarge { .. } => 2007,
            SemanticErrorKind::FunctionRedefined { .. } => 2010,
            SemanticErrorKind::UndefinedFunction { .. } => 2011,
            SemanticErrorKind::FunctionArity { .. } => 2012,
            SemanticErrorKind::UndefinedLine { .. } => 4001,
            SemanticErrorKind::NextWithoutFor => 4002,
            SemanticErrorKind::NextMismatch { .. } => 4003,
            SemanticErrorKind::WendWithoutWhile => 4004,
            SemanticErrorKind::FlatteningSkipped { .. } => 5001,
            SemanticErrorKind::UnsupportedCommand { .. } => 8001,
            SemanticErrorKind::UnsupportedStatement { .. } => 8002,
        }
    }
}

impl fmt::Display for SemanticErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticErrorKind::ConflictingOptionBase {
                first_line,
                first_value,
                line,
                value,
            } => write!(
                f,
                "Conflicting OPTION BASE: {} at line {}, {} at line {}",
                first_value, first_line, value, line
            ),
            SemanticErrorKind::InvalidOptionBase { value } => {
                write!(f, "OPTION BASE {} is invalid (must be 0 or 1)", value)
            }
            SemanticErrorKind::ArrayRedimensioned { name, first_line } => write!(
                f,
                "Array {} already dimensioned at line {}",
                name, first_line
            ),
            SemanticErrorKind::NonConstantDimension { name, extent } => write!(
                f,
                "Array {} dimension `{}` is not a compile-time constant",
                name, extent
            ),
            SemanticErrorKind::NegativeDimension { name, value } => {
                write!(f, "Array {} has negative dimension {}", name, value)
            }
            SemanticErrorKind::DimensionBelowBase { name, value, base } => write!(
                f,
                "Array {} dimension {} is below OPTION BASE {}",
                name, value, base
            ),
            SemanticErrorKind::DimensionTooLarge { name, extent } => write!(
                f,
                "Array {} dimension {} is too large to allocate",
                name, extent
            ),
            SemanticErrorKind::FunctionRedefined { name, first_line } => write!(
                f,
                "Function {} already defined at line {}",
                name, first_line
            ),
            SemanticErrorKind::UndefinedFunction { name } => {
                write!(f, "Undefined user function {}", name)
            }
            SemanticErrorKind::FunctionArity {
                name,
                expected,
                found,
            } => write!(
                f,
                "Function {} takes {} argument(s) but {} were given",
                name, expected, found
            ),
            SemanticErrorKind::UndefinedLine { target, statement } => {
                write!(f, "{} to undefined line {}", statement, target)
            }
            SemanticErrorKind::NextWithoutFor => write!(f, "NEXT without FOR"),
            SemanticErrorKind::NextMismatch { expected, found } => write!(
                f,
                "NEXT {} does not match FOR {}",
                found, expected
            ),
            SemanticErrorKind::WendWithoutWhile => write!(f, "WEND without WHILE"),
            SemanticErrorKind::FlatteningSkipped { name } => write!(
                f,
                "Cannot flatten array {}: OPTION BASE is unresolved",
                name
            ),
            SemanticErrorKind::UnsupportedCommand { name } => {
                write!(f, "{} is an interactive command and cannot appear in a program", name)
            }
            SemanticErrorKind::UnsupportedStatement { name } => {
                write!(f, "{} is not supported by the compiler", name)
            }
        }
    }
}

/// A fatal finding; `analyze()` fails if any is recorded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticError {
    #[serde(flatten)]
    pub kind: SemanticErrorKind,
    pub line: Option<LineNumber>,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, line: LineNumber) -> Self {
        Self {
            kind,
            line: Some(line),
        }
    }

    pub fn code(&self) -> String {
        format_error_code(self.kind.code())
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut builder = DiagnosticBuilder::error(self.kind.to_string())
            .code(self.code())
            .maybe_line(self.line);

        match &self.kind {
            SemanticErrorKind::ConflictingOptionBase { first_line, first_value, .. } => {
                builder = builder
                    .secondary_label(*first_line, format!("OPTION BASE {} first set here", first_value));
            }
            SemanticErrorKind::ArrayRedimensioned { first_line, .. }
            | SemanticErrorKind::FunctionRedefined { first_line, .. } => {
                builder = builder.secondary_label(*first_line, "first definition");
            }
            _ => {}
        }

        if let Some(help) = get_error_code(self.kind.code()).and_then(|c| c.help) {
            builder = builder.help(help);
        }
        builder.build()
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for SemanticError {}
