//! Diagnostics for line-numbered BASIC programs
//!
//! Diagnostics are anchored to *program* line numbers rather than byte spans:
//! an analysis finding names the BASIC line it concerns, and the formatter
//! looks that line up in the [`SourceMap`] to quote it.
//! - Severity levels (Error, Warning, Info, Hint)
//! - Secondary labels pointing at other program lines
//! - Suggestions, notes and help text
//! - Optional ANSI colours

use std::fmt;

pub use source_map::{FileId, SourceFile, SourceMap, SourcePosition};

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Error => write!(f, "error"),
            DiagnosticSeverity::Warning => write!(f, "warning"),
            DiagnosticSeverity::Info => write!(f, "info"),
            DiagnosticSeverity::Hint => write!(f, "hint"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    Primary,
    Secondary,
}

/// A label attached to a program line
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub line: u32,
    pub message: String,
    pub style: LabelStyle,
}

impl Label {
    pub fn primary(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
            style: LabelStyle::Primary,
        }
    }

    pub fn secondary(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
            style: LabelStyle::Secondary,
        }
    }
}

/// A proposed rewrite of a program line fragment
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub message: String,
    pub replacement: String,
}

/// A diagnostic message with severity, location, labels and suggestions
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub code: Option<String>,
    pub message: String,
    /// BASIC line number the finding belongs to, if any
    pub line: Option<u32>,
    /// Physical line/column, used when no program line exists (parse errors)
    pub position: Option<SourcePosition>,
    pub labels: Vec<Label>,
    pub suggestions: Vec<Suggestion>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.severity)?;
        if let Some(code) = &self.code {
            write!(f, "[{}]", code)?;
        }
        match self.line {
            Some(line) => write!(f, ": line {}: {}", line, self.message),
            None => write!(f, ": {}", self.message),
        }
    }
}

/// Collection of diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.with_severity(DiagnosticSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.with_severity(DiagnosticSeverity::Warning)
    }

    fn with_severity(&self, severity: DiagnosticSeverity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.severity == severity)
    }

    /// Stable order: by program line, then severity, preserving insertion order otherwise
    pub fn sort_by_line(&mut self) {
        self.diagnostics
            .sort_by_key(|d| (d.line.unwrap_or(u32::MAX), d.severity));
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self {
            diagnostics: iter.into_iter().collect(),
        }
    }
}

/// Builder for creating diagnostics
pub struct DiagnosticBuilder {
    diagnostic: Diagnostic,
}

impl DiagnosticBuilder {
    fn new(severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            diagnostic: Diagnostic {
                severity,
                code: None,
                message: message.into(),
                line: None,
                position: None,
                labels: vec![],
                suggestions: vec![],
                notes: vec![],
                help: vec![],
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Info, message)
    }

    pub fn hint(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Hint, message)
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.diagnostic.code = Some(code.into());
        self
    }

    pub fn line(mut self, line: u32) -> Self {
        self.diagnostic.line = Some(line);
        self
    }

    pub fn maybe_line(mut self, line: Option<u32>) -> Self {
        self.diagnostic.line = line;
        self
    }

    pub fn position(mut self, position: SourcePosition) -> Self {
        self.diagnostic.position = Some(position);
        self
    }

    pub fn label(mut self, line: u32, message: impl Into<String>) -> Self {
        self.diagnostic.labels.push(Label::primary(line, message));
        self
    }

    pub fn secondary_label(mut self, line: u32, message: impl Into<String>) -> Self {
        self.diagnostic.labels.push(Label::secondary(line, message));
        self
    }

    pub fn suggestion(mut self, message: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.diagnostic.suggestions.push(Suggestion {
            message: message.into(),
            replacement: replacement.into(),
        });
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.diagnostic.notes.push(note.into());
        self
    }

    pub fn help(mut self, help_msg: impl Into<String>) -> Self {
        self.diagnostic.help.push(help_msg.into());
        self
    }

    pub fn build(self) -> Diagnostic {
        self.diagnostic
    }
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const BRIGHT_CYAN: &str = "\x1b[96m";
const BOLD_WHITE: &str = "\x1b[1;97m";
const RESET: &str = "\x1b[0m";

/// Formatter for displaying diagnostics
pub struct ErrorFormatter {
    use_colors: bool,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self { use_colors: false }
    }

    pub fn with_colors() -> Self {
        Self { use_colors: true }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{}{}{}", color, text, RESET)
        } else {
            text.to_string()
        }
    }

    pub fn format_diagnostics(
        &self,
        diagnostics: &Diagnostics,
        source_map: &SourceMap,
        file_id: FileId,
    ) -> String {
        let mut output = String::new();
        for (i, diagnostic) in diagnostics.diagnostics.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            output.push_str(&self.format_diagnostic(diagnostic, source_map, file_id));
        }
        output
    }

    pub fn format_diagnostic(
        &self,
        diagnostic: &Diagnostic,
        source_map: &SourceMap,
        file_id: FileId,
    ) -> String {
        let mut output = String::new();

        let color = match diagnostic.severity {
            DiagnosticSeverity::Error => RED,
            DiagnosticSeverity::Warning => YELLOW,
            DiagnosticSeverity::Info => CYAN,
            DiagnosticSeverity::Hint => GREEN,
        };
        let mut header = diagnostic.severity.to_string();
        if let Some(code) = &diagnostic.code {
            header.push_str(&format!("[{}]", code));
        }
        output.push_str(&self.paint(color, &header));
        output.push_str(": ");
        output.push_str(&self.paint(BOLD_WHITE, &diagnostic.message));
        output.push('\n');

        let file = source_map.get_file(file_id);
        let physical = diagnostic
            .line
            .and_then(|line| file.and_then(|f| f.physical_line(line)))
            .or(diagnostic.position.map(|p| p.line));

        if let (Some(file), Some(physical)) = (file, physical) {
            let arrow = self.paint(BRIGHT_CYAN, "-->");
            match diagnostic.line {
                Some(line) => output.push_str(&format!("  {} {}:{} (line {})\n", arrow, file.name, physical, line)),
                None => output.push_str(&format!("  {} {}:{}\n", arrow, file.name, physical)),
            }

            if let Some(text) = file.get_line(physical) {
                let gutter_width = physical.to_string().len();
                let bar = self.paint(BRIGHT_CYAN, "|");
                output.push_str(&format!("{:w$} {}\n", "", bar, w = gutter_width));
                output.push_str(&format!(
                    "{} {} {}\n",
                    self.paint(BRIGHT_CYAN, &physical.to_string()),
                    bar,
                    text
                ));

                if let Some(position) = diagnostic.position {
                    let padding = " ".repeat(position.column.saturating_sub(1));
                    output.push_str(&format!(
                        "{:w$} {} {}{}\n",
                        "",
                        bar,
                        padding,
                        self.paint(RED, "^"),
                        w = gutter_width
                    ));
                }
            }
        } else if let Some(line) = diagnostic.line {
            output.push_str(&format!("  {} line {}\n", self.paint(BRIGHT_CYAN, "-->"), line));
        }

        for label in &diagnostic.labels {
            let marker = match label.style {
                LabelStyle::Primary => "=",
                LabelStyle::Secondary => "-",
            };
            output.push_str(&format!("  {} line {}: {}\n", marker, label.line, label.message));
        }

        for suggestion in &diagnostic.suggestions {
            output.push_str(&format!(
                "{}: {} `{}`\n",
                self.paint(YELLOW, "suggestion"),
                suggestion.message,
                suggestion.replacement
            ));
        }

        for help_msg in &diagnostic.help {
            output.push_str(&format!("     {}: {}\n", self.paint(GREEN, "help"), help_msg));
        }

        for note in &diagnostic.notes {
            output.push_str(&format!("{}: {}\n", self.paint(CYAN, "note"), note));
        }

        output
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Result type that includes diagnostics
pub type DiagnosticResult<T> = Result<T, Diagnostics>;
