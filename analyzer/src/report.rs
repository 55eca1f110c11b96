//! Analysis report: structured for JSON, sectioned text for people

use crate::analysis::uninitialized::UninitializedWarning;
use crate::analysis::validation::RequiredSwitch;
use crate::analyzer::SemanticAnalyzer;
use crate::optimization::constant_folding::FoldedExpression;
use crate::optimization::cse::CommonSubexpression;
use crate::optimization::forward_substitution::ForwardSubstitution;
use crate::optimization::integer_range::IntegerRange;
use crate::optimization::loop_analysis::LoopInfo;
use crate::optimization::strength_reduction::StrengthReduction;
use crate::optimization::value_range::RangeInfo;
use crate::symbols::SymbolTable;
use diagnostics::Diagnostic;
use parser::{format_number, LineNumber};
use serde::Serialize;
use std::fmt::{self, Write};

/// Text section titles, in output order
pub const SECTION_TITLES: [&str; 15] = [
    "Symbol Table Summary",
    "Variables",
    "Functions",
    "Constant Folding",
    "Strength Reductions",
    "Common Subexpressions",
    "Forward Substitutions",
    "Dead Stores",
    "Loops",
    "Integer Ranges",
    "Conditional Ranges",
    "Uninitialized Variables",
    "Required Compilation Switches",
    "Warnings",
    "Errors",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportMessage {
    pub code: Option<String>,
    pub line: Option<LineNumber>,
    pub message: String,
}

impl From<&Diagnostic> for ReportMessage {
    fn from(diagnostic: &Diagnostic) -> Self {
        Self {
            code: diagnostic.code.clone(),
            line: diagnostic.line,
            message: diagnostic.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub success: bool,
    pub array_base: u32,
    pub symbols: SymbolTable,
    pub folded_expressions: Vec<FoldedExpression>,
    pub strength_reductions: Vec<StrengthReduction>,
    pub common_subexpressions: Vec<CommonSubexpression>,
    pub forward_substitutions: Vec<ForwardSubstitution>,
    pub loops: Vec<LoopInfo>,
    pub integer_ranges: Vec<IntegerRange>,
    pub range_info: Vec<RangeInfo>,
    pub uninitialized_warnings: Vec<UninitializedWarning>,
    pub required_switches: Vec<RequiredSwitch>,
    pub warnings: Vec<ReportMessage>,
    pub errors: Vec<ReportMessage>,
}

impl AnalysisReport {
    pub fn from_analyzer(analyzer: &SemanticAnalyzer) -> Self {
        Self {
            success: analyzer.errors.is_empty(),
            array_base: analyzer.array_base,
            symbols: analyzer.symbols.clone(),
            folded_expressions: analyzer.folded_expressions.clone(),
            strength_reductions: analyzer.strength_reductions.clone(),
            common_subexpressions: analyzer.common_subexpressions.clone(),
            forward_substitutions: analyzer.forward_substitutions.clone(),
            loops: analyzer.loops.clone(),
            integer_ranges: analyzer.integer_ranges.clone(),
            range_info: analyzer.range_info.clone(),
            uninitialized_warnings: analyzer.uninitialized_warnings.clone(),
            required_switches: analyzer.required_switches.clone(),
            warnings: analyzer.warnings.iter().map(ReportMessage::from).collect(),
            errors: analyzer
                .errors
                .iter()
                .map(|e| ReportMessage::from(&e.to_diagnostic()))
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn dead_stores(&self) -> impl Iterator<Item = &ForwardSubstitution> {
        self.forward_substitutions.iter().filter(|f| f.is_dead_store)
    }

    fn write_section(&self, out: &mut String, title: &str) -> fmt::Result {
        writeln!(out)?;
        writeln!(out, "{}:", title)?;
        let before = out.len();
        match title {
            "Symbol Table Summary" => self.summary(out)?,
            "Variables" => self.variables(out)?,
            "Functions" => {
                for f in self.symbols.functions.values() {
                    writeln!(
                        out,
                        "  {}({}) = {}  [line {}]",
                        f.display_name,
                        f.parameters.join(", "),
                        f.body,
                        f.definition_line
                    )?;
                }
            }
            "Constant Folding" => {
                for f in &self.folded_expressions {
                    writeln!(out, "  Line {}: {} -> {}", f.line, f.expression, f.value)?;
                }
            }
            "Strength Reductions" => {
                for r in &self.strength_reductions {
                    writeln!(
                        out,
                        "  Line {}: {} -> {} ({}; {})",
                        r.line, r.original_expr, r.reduced_expr, r.kind, r.savings
                    )?;
                }
            }
            "Common Subexpressions" => {
                for cse in &self.common_subexpressions {
                    let later: Vec<String> = cse.occurrences.iter().map(|l| l.to_string()).collect();
                    writeln!(
                        out,
                        "  {}: first at line {}, recomputed at line(s) {}",
                        cse.expression,
                        cse.first_line,
                        later.join(", ")
                    )?;
                    if let Some(index) = &cse.flattened_index {
                        writeln!(out, "    flattened index: {}", index)?;
                    }
                    if !cse.variables.is_empty() {
                        writeln!(out, "    variables: {}", cse.variables.join(", "))?;
                    }
                }
            }
            "Forward Substitutions" => {
                for f in self.forward_substitutions.iter().filter(|f| !f.is_dead_store) {
                    let verdict = if f.can_substitute { "substitute" } else { "keep" };
                    writeln!(
                        out,
                        "  Line {}: {} = {} ({} use(s)) {}: {}",
                        f.line, f.variable, f.expression, f.use_count, verdict, f.reason
                    )?;
                }
            }
            "Dead Stores" => {
                for f in self.dead_stores() {
                    writeln!(out, "  Line {}: {} = {} is never read", f.line, f.variable, f.expression)?;
                }
            }
            "Loops" => self.loops(out)?,
            "Integer Ranges" => {
                for r in &self.integer_ranges {
                    writeln!(out, "  {}: {}..{} ({})", r.variable, r.min, r.max, r.width)?;
                }
            }
            "Conditional Ranges" => {
                for r in &self.range_info {
                    write!(out, "  {} {} in {}", r.variable, r.range, r.context)?;
                    if let Some(opt) = &r.enabled_optimization {
                        write!(out, " [{}]", opt)?;
                    }
                    writeln!(out)?;
                }
            }
            "Uninitialized Variables" => {
                for w in &self.uninitialized_warnings {
                    writeln!(out, "  Line {}: {} {}", w.line, w.variable, w.context)?;
                }
            }
            "Required Compilation Switches" => {
                for s in &self.required_switches {
                    writeln!(out, "  {} (first needed at line {}): {}", s.switch, s.first_line, s.reason)?;
                }
            }
            "Warnings" => write_messages(out, &self.warnings)?,
            "Errors" => write_messages(out, &self.errors)?,
            _ => {}
        }
        if out.len() == before {
            writeln!(out, "  (none)")?;
        }
        Ok(())
    }

    fn summary(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "  Variables: {}", self.symbols.variables.len())?;
        writeln!(out, "  Arrays: {}", self.symbols.arrays.len())?;
        writeln!(out, "  Functions: {}", self.symbols.functions.len())?;
        match self.symbols.base_line {
            Some(line) => writeln!(out, "  OPTION BASE: {} (line {})", self.array_base, line),
            None => writeln!(out, "  OPTION BASE: {} (default)", self.array_base),
        }
    }

    fn variables(&self, out: &mut String) -> fmt::Result {
        for v in self.symbols.variables.values() {
            write!(out, "  {} ({})", v.display_name, v.var_type)?;
            if let Some(line) = v.first_use_line {
                write!(out, " first used at line {}", line)?;
            }
            writeln!(out)?;
        }
        for a in self.symbols.arrays.values() {
            let dims: Vec<String> = a.dimensions.iter().map(|d| d.to_string()).collect();
            write!(out, "  {}({}) ({})", a.display_name, dims.join(", "), a.var_type)?;
            if let Some(size) = a.flattened_size {
                let strides: Vec<String> = a.strides.iter().map(|s| s.to_string()).collect();
                write!(out, " flattened to {} elements, strides [{}]", size, strides.join(", "))?;
            }
            if !a.explicitly_dimensioned {
                write!(out, " (implicit)")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn loops(&self, out: &mut String) -> fmt::Result {
        let bound = |v: Option<f64>| v.map_or("?".to_string(), format_number);
        for l in &self.loops {
            write!(
                out,
                "  FOR {} = {} TO {} STEP {} (lines {}-{})",
                l.variable,
                bound(l.start),
                bound(l.end),
                bound(l.step),
                l.start_line,
                l.end_line
            )?;
            match l.iteration_count {
                Some(n) => write!(out, ": {} iterations", n)?,
                None => write!(out, ": iteration count unknown")?,
            }
            if l.nesting_depth > 0 {
                write!(out, ", nested depth {}", l.nesting_depth)?;
            }
            writeln!(out)?;
            for inv in &l.invariants {
                let hoist = if inv.hoistable { "hoistable" } else { "not hoistable" };
                writeln!(
                    out,
                    "    invariant: {} (line {}, {}x, {})",
                    inv.expression, inv.first_line, inv.occurrences, hoist
                )?;
            }
            for iv in l.induction_variables.iter().filter(|iv| !iv.is_primary()) {
                let base = iv.base.as_deref().unwrap_or(&l.variable);
                writeln!(
                    out,
                    "    induction: {} = {} * {} + {} (line {})",
                    iv.variable,
                    base,
                    format_number(iv.multiplier),
                    format_number(iv.offset),
                    iv.line
                )?;
            }
            for r in &l.subscript_reductions {
                writeln!(
                    out,
                    "    subscript {} in {}() at line {}: step by {} instead of multiplying",
                    r.term,
                    r.array,
                    r.line,
                    format_number(r.multiplier)
                )?;
            }
        }
        Ok(())
    }
}

fn write_messages(out: &mut String, messages: &[ReportMessage]) -> fmt::Result {
    for m in messages {
        write!(out, "  ")?;
        if let Some(line) = m.line {
            write!(out, "Line {}: ", line)?;
        }
        if let Some(code) = &m.code {
            write!(out, "[{}] ", code)?;
        }
        writeln!(out, "{}", m.message)?;
    }
    Ok(())
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        writeln!(out, "MBASIC Semantic Analysis Report")?;
        writeln!(out, "===============================")?;
        if self.success {
            writeln!(out, "Result: OK")?;
        } else {
            writeln!(out, "Result: FAILED ({} error(s))", self.errors.len())?;
        }
        for title in SECTION_TITLES {
            self.write_section(&mut out, title)?;
        }
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::AnalyzerConfig;
    use parser::parse_program;

    fn report(source: &str) -> String {
        let program = parse_program(source).unwrap();
        let mut analyzer = SemanticAnalyzer::new(AnalyzerConfig::default());
        analyzer.analyze(&program);
        analyzer.get_report()
    }

    #[test]
    fn test_sections_in_order() {
        let text = report("10 X = 1\n20 PRINT X\n");
        let mut last = 0;
        for title in SECTION_TITLES {
            let at = text.find(&format!("\n{}:\n", title)).unwrap();
            assert!(at > last, "{} out of order", title);
            last = at;
        }
        assert!(text.starts_with("MBASIC Semantic Analysis Report"));
    }

    #[test]
    fn test_findings_are_listed() {
        let text = report("10 DIM A(10, 20)\n20 X = A * 2\n30 PRINT Y\n40 X = X + 1\n");
        assert!(text.contains("A(10, 20) (SINGLE) flattened to 231 elements"));
        assert!(text.contains("Line 20: A * 2 -> A + A"));
        assert!(text.contains("Line 30: Y used in PRINT"));
    }

    #[test]
    fn test_errors_fail_the_report() {
        let text = report("10 OPTION BASE 0\n20 OPTION BASE 1\n");
        assert!(text.contains("Result: FAILED (1 error(s))"));
        assert!(text.contains("[E2001] Conflicting OPTION BASE"));
    }

    #[test]
    fn test_json_round_trips_through_serde_json() {
        let program = parse_program("10 FOR I = 1 TO 10\n20 NEXT I\n").unwrap();
        let mut analyzer = SemanticAnalyzer::new(AnalyzerConfig::default());
        analyzer.analyze(&program);
        let json = analyzer.report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["loops"][0]["iteration_count"], 10);
        assert_eq!(value["success"], true);
    }
}
