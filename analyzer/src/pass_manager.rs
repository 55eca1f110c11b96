//! Analysis passes and the manager that sequences them
//!
//! Every pass reads the same [`AnalysisContext`]: the program, its symbol
//! table, one control-flow graph and the per-statement effects derived from
//! it. Passes never rebuild the graph, so all of them agree on what a path is.

use crate::analysis::uninitialized::{UninitializedVariablePass, UninitializedWarning};
use crate::analysis::validation::{RequiredSwitch, ValidationPass};
use crate::errors::SemanticError;
use crate::optimization::constant_folding::{ConstantFoldingPass, FoldedExpression};
use crate::optimization::cse::{CommonSubexpression, CsePass};
use crate::optimization::forward_substitution::{ForwardSubstitution, ForwardSubstitutionPass};
use crate::optimization::integer_range::{IntegerRange, IntegerRangePass};
use crate::optimization::loop_analysis::{LoopAnalysisPass, LoopInfo};
use crate::optimization::strength_reduction::{StrengthReduction, StrengthReductionPass};
use crate::optimization::value_range::{RangeInfo, ValueRangePass};
use crate::pipeline::AnalyzerConfig;
use crate::semantic_graph::{compute_effects, ControlFlowGraph, NodeEffects};
use crate::symbols::SymbolTable;
use diagnostics::Diagnostic;
use parser::Program;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything the passes have found so far
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Findings {
    pub folded_expressions: Vec<FoldedExpression>,
    pub strength_reductions: Vec<StrengthReduction>,
    pub common_subexpressions: Vec<CommonSubexpression>,
    pub forward_substitutions: Vec<ForwardSubstitution>,
    pub uninitialized_warnings: Vec<UninitializedWarning>,
    pub loops: Vec<LoopInfo>,
    pub integer_ranges: Vec<IntegerRange>,
    pub range_info: Vec<RangeInfo>,
    pub required_switches: Vec<RequiredSwitch>,
}

/// Shared state for one analysis run
pub struct AnalysisContext<'p> {
    pub program: &'p Program,
    pub config: AnalyzerConfig,
    pub symbols: SymbolTable,
    pub cfg: ControlFlowGraph<'p>,
    /// Indexed by cfg node id
    pub effects: Vec<NodeEffects<'p>>,
    pub errors: Vec<SemanticError>,
    pub warnings: Vec<Diagnostic>,
    pub findings: Findings,
}

impl<'p> AnalysisContext<'p> {
    pub fn new(program: &'p Program, symbols: SymbolTable, config: AnalyzerConfig) -> Self {
        let cfg = ControlFlowGraph::build(program);
        let effects = compute_effects(&cfg, &symbols);
        Self {
            program,
            config,
            symbols,
            cfg,
            effects,
            errors: Vec::new(),
            warnings: Vec::new(),
            findings: Findings::default(),
        }
    }
}

/// A single analysis over the shared context
pub trait AnalysisPass {
    /// Get the name of this pass
    fn name(&self) -> &'static str;

    /// Whether the configuration asks for this pass
    fn is_enabled(&self, _config: &AnalyzerConfig) -> bool {
        true
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult;
}

/// What a pass reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassResult {
    /// Number of findings recorded
    pub findings: usize,

    /// Other statistics
    pub stats: BTreeMap<String, usize>,
}

impl PassResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_findings(findings: usize) -> Self {
        Self {
            findings,
            stats: BTreeMap::new(),
        }
    }

    pub fn with_stat(mut self, key: &str, value: usize) -> Self {
        *self.stats.entry(key.to_string()).or_insert(0) += value;
        self
    }

    /// Combine results
    pub fn combine(mut self, other: PassResult) -> Self {
        self.findings += other.findings;
        for (key, value) in other.stats {
            *self.stats.entry(key).or_insert(0) += value;
        }
        self
    }
}

/// Runs passes in registration order
pub struct PassManager {
    passes: Vec<Box<dyn AnalysisPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Add a pass to the manager
    pub fn add_pass<P: AnalysisPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    /// Every pass, in dependency order
    ///
    /// Folding comes before the rewrites so they see folded literals, and
    /// loop analysis before integer ranges so FOR bounds are known.
    pub fn standard() -> Self {
        let mut manager = Self::new();
        manager.add_pass(ValidationPass::new());
        manager.add_pass(ConstantFoldingPass::new());
        manager.add_pass(StrengthReductionPass::new());
        manager.add_pass(CsePass::new());
        manager.add_pass(ForwardSubstitutionPass::new());
        manager.add_pass(UninitializedVariablePass::new());
        manager.add_pass(LoopAnalysisPass::new());
        manager.add_pass(IntegerRangePass::new());
        manager.add_pass(ValueRangePass::new());
        manager
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run each enabled pass once
    ///
    /// Passes only record facts, so unlike a rewriting pipeline there is no
    /// fixpoint to iterate to.
    pub fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        let mut total = PassResult::empty();
        for pass in &mut self.passes {
            if !pass.is_enabled(&ctx.config) {
                log::debug!("skipping disabled pass {}", pass.name());
                continue;
            }
            log::info!("running pass {}", pass.name());
            let result = pass.run(ctx);
            log::debug!("{}: {} findings", pass.name(), result.findings);
            total = total.combine(result.with_stat(pass.name(), 0));
        }
        total
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_sums_stats() {
        let a = PassResult::with_findings(2).with_stat("folds", 2);
        let b = PassResult::with_findings(3).with_stat("folds", 1).with_stat("kills", 4);
        let total = a.combine(b);
        assert_eq!(total.findings, 5);
        assert_eq!(total.stats["folds"], 3);
        assert_eq!(total.stats["kills"], 4);
    }

    #[test]
    fn test_standard_order() {
        let names = PassManager::standard().pass_names();
        assert_eq!(names.first(), Some(&"validation"));
        let fold = names.iter().position(|n| *n == "constant-folding").unwrap();
        let reduce = names.iter().position(|n| *n == "strength-reduction").unwrap();
        let loops = names.iter().position(|n| *n == "loop-analysis").unwrap();
        let ranges = names.iter().position(|n| *n == "integer-range").unwrap();
        assert!(fold < reduce);
        assert!(loops < ranges);
    }
}
