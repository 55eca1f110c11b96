//! Source text to analysis report
//!
//! 1. Parse the program text
//! 2. Build the symbol table and resolve `OPTION BASE`
//! 3. Run the analysis passes over one shared control-flow graph
//! 4. Collect diagnostics and assemble the report

use crate::analyzer::SemanticAnalyzer;
use crate::report::AnalysisReport;
use diagnostics::{Diagnostics, FileId, SourceMap};
use log::{debug, info};
use std::time::Instant;

/// Which analyses to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Detect repeated computations
    pub enable_cse: bool,

    /// Record algebraic identities and multiply/divide strength reductions
    pub enable_strength_reduction: bool,

    /// Also apply the boolean rules (relational inversion, De Morgan, absorption)
    pub enable_boolean_simplification: bool,

    /// Find single-use temporaries and dead stores
    pub enable_forward_substitution: bool,

    /// Infer 8/16/32-bit widths for integer-valued scalars
    pub enable_integer_ranges: bool,

    /// Warn about reads before definite assignment
    pub enable_uninitialized_detection: bool,

    /// Trip counts, invariants and induction variables for FOR loops
    pub enable_loop_analysis: bool,

    /// Deepest static GOSUB nesting accepted without a warning
    pub max_gosub_depth: usize,

    /// Rounds of range propagation before a growing variable is given up on
    pub max_range_iterations: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enable_cse: true,
            enable_strength_reduction: true,
            enable_boolean_simplification: true,
            enable_forward_substitution: true,
            enable_integer_ranges: true,
            enable_uninitialized_detection: true,
            enable_loop_analysis: true,
            max_gosub_depth: 32,
            max_range_iterations: 10,
        }
    }
}

impl AnalyzerConfig {
    /// Validation and warnings only, no optimization facts
    pub fn diagnostics_only() -> Self {
        Self {
            enable_cse: false,
            enable_strength_reduction: false,
            enable_boolean_simplification: false,
            enable_forward_substitution: false,
            enable_integer_ranges: false,
            enable_uninitialized_detection: true,
            enable_loop_analysis: false,
            ..Self::default()
        }
    }
}

/// Timings and counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Program lines parsed
    pub lines: usize,

    /// Statements, including those in IF arms
    pub statements: usize,

    /// Parse time in microseconds
    pub parse_time_us: u64,

    /// Analysis time in microseconds
    pub analysis_time_us: u64,

    pub error_count: usize,

    pub warning_count: usize,
}

/// Everything produced for one source file
pub struct AnalysisResult {
    pub source_map: SourceMap,
    pub file_id: FileId,
    /// Parse errors, semantic errors and warnings, ordered by line
    pub diagnostics: Diagnostics,
    /// `None` when the program did not parse
    pub report: Option<AnalysisReport>,
    pub stats: PipelineStats,
}

impl AnalysisResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

fn count_statements(statements: &[parser::Statement]) -> usize {
    statements
        .iter()
        .map(|stmt| {
            1 + match &stmt.kind {
                parser::StatementKind::If {
                    then_branch,
                    else_branch,
                    ..
                } => [Some(then_branch), else_branch.as_ref()]
                    .into_iter()
                    .flatten()
                    .map(|branch| match branch {
                        parser::Branch::Statements(nested) => count_statements(nested),
                        parser::Branch::Line(_) => 0,
                    })
                    .sum(),
                _ => 0,
            }
        })
        .sum()
}

/// Parse and analyze `source`
pub fn analyze_source(name: &str, source: &str, config: AnalyzerConfig) -> AnalysisResult {
    let mut source_map = SourceMap::new();
    let file_id = source_map.add_file(name, source);
    let mut stats = PipelineStats::default();

    info!("parsing {}", name);
    let parse_start = Instant::now();
    let parsed = parser::parse_program(source);
    stats.parse_time_us = parse_start.elapsed().as_micros() as u64;

    let program = match parsed {
        Ok(program) => program,
        Err(diagnostics) => {
            stats.error_count = diagnostics.errors().count();
            debug!("{}: {} parse errors", name, stats.error_count);
            return AnalysisResult {
                source_map,
                file_id,
                diagnostics,
                report: None,
                stats,
            };
        }
    };
    stats.lines = program.lines.len();
    stats.statements = program.lines.iter().map(|l| count_statements(&l.statements)).sum();

    info!("analyzing {} ({} lines)", name, stats.lines);
    let analysis_start = Instant::now();
    let mut analyzer = SemanticAnalyzer::new(config);
    let success = analyzer.analyze(&program);
    stats.analysis_time_us = analysis_start.elapsed().as_micros() as u64;

    let diagnostics = analyzer.diagnostics();
    stats.error_count = diagnostics.errors().count();
    stats.warning_count = diagnostics.warnings().count();
    debug!(
        "{}: success={}, {} errors, {} warnings in {}us",
        name, success, stats.error_count, stats.warning_count, stats.analysis_time_us
    );

    AnalysisResult {
        source_map,
        file_id,
        diagnostics,
        report: Some(analyzer.report()),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let config = AnalyzerConfig::default();
        assert!(config.enable_cse && config.enable_loop_analysis);
        assert_eq!(config.max_gosub_depth, 32);

        let quiet = AnalyzerConfig::diagnostics_only();
        assert!(!quiet.enable_cse);
        assert!(quiet.enable_uninitialized_detection);
    }

    #[test]
    fn test_parse_failure_has_no_report() {
        let result = analyze_source("bad.bas", "PRINT 1\n", AnalyzerConfig::default());
        assert!(result.has_errors());
        assert!(result.report.is_none());
    }

    #[test]
    fn test_counts_nested_statements() {
        let source = "10 IF A THEN PRINT 1 : PRINT 2 ELSE PRINT 3\n20 END\n";
        let result = analyze_source("t.bas", source, AnalyzerConfig::default());
        assert_eq!(result.stats.lines, 2);
        assert_eq!(result.stats.statements, 5);
    }
}
