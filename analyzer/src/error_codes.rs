//! Error code registry for MBASIC analysis
//!
//! Every fatal finding carries a stable code so that tooling can match on it
//! independently of the message text.
//!
//! # Error Code Ranges
//!
//! - E0001-E0999: Parse errors (reported by the `parser` crate)
//! - E2000-E2999: Symbol, declaration and array errors
//! - E4000-E4999: Control flow and line reference errors
//! - E5000-E5999: Optimization and storage layout errors
//! - E8000-E8999: Compiler target restrictions
//! - E9000-E9999: Internal analyzer errors

use std::collections::HashMap;
use std::fmt;

/// A registered error code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// The numeric error code (e.g., 2001)
    pub code: u16,
    pub category: &'static str,
    pub description: &'static str,
    /// Suggestion shown under the diagnostic
    pub help: Option<&'static str>,
}

impl ErrorCode {
    pub const fn new(
        code: u16,
        category: &'static str,
        description: &'static str,
        help: Option<&'static str>,
    ) -> Self {
        Self {
            code,
            category,
            description,
            help,
        }
    }

    /// Format the error code as "E{code:04}" (e.g., "E2001")
    pub fn format_code(&self) -> String {
        format_error_code(self.code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.format_code(),
            self.category,
            self.description
        )
    }
}

/// Registry containing all defined error codes
pub struct ErrorCodeRegistry {
    codes: HashMap<u16, ErrorCode>,
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorCodeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            codes: HashMap::new(),
        };
        registry.register_all_codes();
        registry
    }

    pub fn get(&self, code: u16) -> Option<&ErrorCode> {
        self.codes.get(&code)
    }

    /// Look up a formatted code such as "E4001"
    pub fn get_by_string(&self, code_str: &str) -> Option<&ErrorCode> {
        parse_error_code(code_str).and_then(|code| self.get(code))
    }

    fn register(&mut self, error_code: ErrorCode) {
        self.codes.insert(error_code.code, error_code);
    }

    fn register_all_codes(&mut self) {
        // ===== PARSE ERRORS (E0001-E0999) =====
        self.register(ErrorCode::new(
            1,
            "Parser",
            "Expected line number",
            Some("Every program line must start with a line number"),
        ));
        self.register(ErrorCode::new(
            2,
            "Parser",
            "Syntax error",
            Some("Check the statement against the MBASIC syntax"),
        ));

        // ===== SYMBOL ERRORS (E2000-E2999) =====
        self.register(ErrorCode::new(
            2001,
            "Symbol",
            "Conflicting OPTION BASE",
            Some("Use a single OPTION BASE value for the whole program"),
        ));
        self.register(ErrorCode::new(
            2002,
            "Symbol",
            "Invalid OPTION BASE value",
            Some("OPTION BASE accepts only 0 or 1"),
        ));
        self.register(ErrorCode::new(
            2003,
            "Symbol",
            "Array already dimensioned",
            Some("Remove the second DIM or ERASE the array first"),
        ));
        self.register(ErrorCode::new(
            2004,
            "Symbol",
            "Array dimension is not constant",
            Some("Compiled programs need DIM extents known before execution"),
        ));
        self.register(ErrorCode::new(
            2005,
            "Symbol",
            "Negative array dimension",
            None,
        ));
        self.register(ErrorCode::new(
            2006,
            "Symbol",
            "Array dimension below OPTION BASE",
            Some("With OPTION BASE 1 every extent must be at least 1"),
        ));
        self.register(ErrorCode::new(
            2007,
            "Symbol",
            "Array dimension too large",
            Some("The element count must fit in memory; extents are limited to 2147483647"),
        ));
        self.register(ErrorCode::new(
            2010,
            "Symbol",
            "Function redefined",
            Some("Each DEF FN name may be defined once"),
        ));
        self.register(ErrorCode::new(
            2011,
            "Symbol",
            "Undefined user function",
            Some("Define the function with DEF FN before calling it"),
        ));
        self.register(ErrorCode::new(
            2012,
            "Symbol",
            "Wrong number of function arguments",
            None,
        ));

        // ===== CONTROL FLOW ERRORS (E4000-E4999) =====
        self.register(ErrorCode::new(
            4001,
            "ControlFlow",
            "Undefined line number",
            Some("The target line does not exist in the program"),
        ));
        self.register(ErrorCode::new(
            4002,
            "ControlFlow",
            "NEXT without FOR",
            None,
        ));
        self.register(ErrorCode::new(
            4003,
            "ControlFlow",
            "NEXT variable does not match FOR",
            Some("Close inner loops before outer ones"),
        ));
        self.register(ErrorCode::new(
            4004,
            "ControlFlow",
            "WEND without WHILE",
            None,
        ));

        // ===== LAYOUT ERRORS (E5000-E5999) =====
        self.register(ErrorCode::new(
            5001,
            "Layout",
            "Array flattening skipped",
            Some("Array layout needs a single resolved OPTION BASE"),
        ));

        // ===== TARGET ERRORS (E8000-E8999) =====
        self.register(ErrorCode::new(
            8001,
            "Target",
            "Command not supported in compiled programs",
            Some("Interactive commands such as LIST or SAVE only work in the interpreter"),
        ));
        self.register(ErrorCode::new(
            8002,
            "Target",
            "Statement not supported by the compiler",
            None,
        ));

        // ===== INTERNAL (E9000-E9999) =====
        self.register(ErrorCode::new(
            9999,
            "Internal",
            "Unknown error",
            Some("An unexpected condition was hit during analysis"),
        ));
    }

    /// All codes in `start..=end`, sorted
    pub fn get_range(&self, start: u16, end: u16) -> Vec<&ErrorCode> {
        let mut codes: Vec<&ErrorCode> = self
            .codes
            .values()
            .filter(|code| code.code >= start && code.code <= end)
            .collect();
        codes.sort_by_key(|code| code.code);
        codes
    }

    pub fn get_symbol_errors(&self) -> Vec<&ErrorCode> {
        self.get_range(2000, 2999)
    }

    pub fn get_control_flow_errors(&self) -> Vec<&ErrorCode> {
        self.get_range(4000, 4999)
    }

    pub fn is_valid_code(&self, code: u16) -> bool {
        self.codes.contains_key(&code)
    }
}

static REGISTRY: std::sync::OnceLock<ErrorCodeRegistry> = std::sync::OnceLock::new();

/// The process-wide registry
pub fn error_registry() -> &'static ErrorCodeRegistry {
    REGISTRY.get_or_init(ErrorCodeRegistry::new)
}

pub fn get_error_code(code: u16) -> Option<&'static ErrorCode> {
    error_registry().get(code)
}

/// 2001 -> "E2001"
pub fn format_error_code(code: u16) -> String {
    format!("E{:04}", code)
}

/// "E2001" -> Some(2001)
pub fn parse_error_code(code_str: &str) -> Option<u16> {
    code_str.strip_prefix('E')?.parse::<u16>().ok()
}
