//! The analyzer entry point

use crate::analysis::uninitialized::UninitializedWarning;
use crate::analysis::validation::RequiredSwitch;
use crate::errors::SemanticError;
use crate::optimization::constant_folding::FoldedExpression;
use crate::optimization::cse::CommonSubexpression;
use crate::optimization::forward_substitution::ForwardSubstitution;
use crate::optimization::integer_range::IntegerRange;
use crate::optimization::loop_analysis::LoopInfo;
use crate::optimization::strength_reduction::StrengthReduction;
use crate::optimization::value_range::RangeInfo;
use crate::pass_manager::{AnalysisContext, PassManager, PassResult};
use crate::pipeline::AnalyzerConfig;
use crate::report::AnalysisReport;
use crate::symbols::{SymbolTable, SymbolTableBuilder};
use diagnostics::{Diagnostic, Diagnostics};
use parser::Program;

/// Runs every analysis over a program and keeps the results
///
/// Each call to [`analyze`](Self::analyze) starts from scratch, so one
/// instance can be reused across programs and repeated runs give the same
/// results.
#[derive(Debug, Clone, Default)]
pub struct SemanticAnalyzer {
    config: AnalyzerConfig,
    pub errors: Vec<SemanticError>,
    pub warnings: Vec<Diagnostic>,
    pub symbols: SymbolTable,
    pub array_base: u32,
    pub folded_expressions: Vec<FoldedExpression>,
    pub strength_reductions: Vec<StrengthReduction>,
    pub common_subexpressions: Vec<CommonSubexpression>,
    pub forward_substitutions: Vec<ForwardSubstitution>,
    pub uninitialized_warnings: Vec<UninitializedWarning>,
    pub loops: Vec<LoopInfo>,
    pub integer_ranges: Vec<IntegerRange>,
    pub range_info: Vec<RangeInfo>,
    pub required_switches: Vec<RequiredSwitch>,
    pub pass_stats: PassResult,
}

impl SemanticAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze `program`; false if any error was recorded
    pub fn analyze(&mut self, program: &Program) -> bool {
        *self = Self::new(self.config.clone());

        let build = SymbolTableBuilder::new().build(program);
        self.errors = build.errors;
        self.warnings = build.warnings;

        let mut ctx = AnalysisContext::new(program, build.table, self.config.clone());
        self.pass_stats = PassManager::standard().run(&mut ctx);

        let AnalysisContext {
            symbols,
            errors,
            warnings,
            findings,
            ..
        } = ctx;
        self.errors.extend(errors);
        self.warnings.extend(warnings);
        self.array_base = symbols.array_base;
        self.symbols = symbols;

        self.folded_expressions = findings.folded_expressions;
        self.strength_reductions = findings.strength_reductions;
        self.common_subexpressions = findings.common_subexpressions;
        self.forward_substitutions = findings.forward_substitutions;
        self.uninitialized_warnings = findings.uninitialized_warnings;
        self.loops = findings.loops;
        self.integer_ranges = findings.integer_ranges;
        self.range_info = findings.range_info;
        self.required_switches = findings.required_switches;

        log::info!(
            "analysis finished: {} errors, {} warnings",
            self.errors.len(),
            self.warnings.len() + self.uninitialized_warnings.len()
        );
        self.errors.is_empty()
    }

    /// Errors and warnings of the last run, ordered by line
    pub fn diagnostics(&self) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        for error in &self.errors {
            diagnostics.push(error.to_diagnostic());
        }
        for warning in &self.warnings {
            diagnostics.push(warning.clone());
        }
        for warning in &self.uninitialized_warnings {
            diagnostics.push(warning.to_diagnostic());
        }
        diagnostics.sort_by_line();
        diagnostics
    }

    pub fn report(&self) -> AnalysisReport {
        AnalysisReport::from_analyzer(self)
    }

    /// The text report for the last run
    pub fn get_report(&self) -> String {
        self.report().to_string()
    }
}
