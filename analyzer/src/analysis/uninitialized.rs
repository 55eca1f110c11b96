//! Use of scalar variables before definite assignment
//!
//! A must-analysis over the shared graph: a variable is definitely assigned
//! at a point only if every path from the entry assigns it. `INPUT`,
//! `LINE INPUT`, `READ`, `SWAP` and `FOR` all assign. Array elements start
//! out as zero and are never reported.

use crate::logging;
use crate::pass_manager::{AnalysisContext, AnalysisPass, PassResult};
use crate::pipeline::AnalyzerConfig;
use crate::semantic_graph::{solve_forward, CfgNode, ControlFlowGraph, ForwardAnalysis, NodeEffects};
use diagnostics::{Diagnostic, DiagnosticBuilder};
use parser::LineNumber;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UninitializedWarning {
    pub line: LineNumber,
    pub variable: String,
    /// How the variable is read, e.g. "used in expression"
    pub context: String,
}

impl UninitializedWarning {
    pub fn to_diagnostic(&self) -> Diagnostic {
        DiagnosticBuilder::warning(format!(
            "Variable {} {} before it is assigned",
            self.variable, self.context
        ))
        .line(self.line)
        .help("MBASIC initializes it to zero; assign it explicitly to make the intent clear")
        .build()
    }
}

pub struct DefiniteAssignment<'e, 'p> {
    effects: &'e [NodeEffects<'p>],
}

impl<'e, 'p> DefiniteAssignment<'e, 'p> {
    pub fn new(effects: &'e [NodeEffects<'p>]) -> Self {
        Self { effects }
    }
}

impl<'p> ForwardAnalysis<'p> for DefiniteAssignment<'_, 'p> {
    type Fact = BTreeSet<String>;

    fn name(&self) -> &'static str {
        "definite-assignment"
    }

    fn entry_fact(&self) -> Self::Fact {
        BTreeSet::new()
    }

    fn meet(&self, left: &Self::Fact, right: &Self::Fact) -> Self::Fact {
        left.intersection(right).cloned().collect()
    }

    fn transfer(&self, node: &CfgNode<'p>, input: &Self::Fact) -> Self::Fact {
        let mut out = input.clone();
        if let Some(fx) = self.effects.get(node.id) {
            out.extend(fx.defs.iter().cloned());
        }
        out
    }
}

pub fn find_uninitialized(
    cfg: &ControlFlowGraph<'_>,
    effects: &[NodeEffects<'_>],
) -> Vec<UninitializedWarning> {
    let solution = solve_forward(cfg, &DefiniteAssignment::new(effects));

    let mut warnings = Vec::new();
    for node in cfg.nodes() {
        let (Some(assigned), Some(fx)) = (solution.before(node.id), effects.get(node.id)) else {
            continue;
        };
        let _line = logging::at_line(node.line);
        let mut reported = BTreeSet::new();
        for read in &fx.uses {
            if assigned.contains(&read.name) || !reported.insert(read.name.as_str()) {
                continue;
            }
            let context = match &read.via_function {
                Some(function) => format!("read by {}", function),
                None => read.context.to_string(),
            };
            log::trace!("{} {} before assignment", read.name, context);
            warnings.push(UninitializedWarning {
                line: node.line,
                variable: read.name.clone(),
                context,
            });
        }
    }
    warnings
}

pub struct UninitializedVariablePass;

impl UninitializedVariablePass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UninitializedVariablePass {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPass for UninitializedVariablePass {
    fn name(&self) -> &'static str {
        "uninitialized-variables"
    }

    fn is_enabled(&self, config: &AnalyzerConfig) -> bool {
        config.enable_uninitialized_detection
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        let warnings = find_uninitialized(&ctx.cfg, &ctx.effects);
        let count = warnings.len();
        ctx.findings.uninitialized_warnings = warnings;
        PassResult::with_findings(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_graph::compute_effects;
    use crate::symbols::SymbolTableBuilder;
    use parser::parse_program;

    fn flagged(source: &str) -> Vec<(LineNumber, String)> {
        let program = parse_program(source).unwrap();
        let symbols = SymbolTableBuilder::new().build(&program).table;
        let cfg = ControlFlowGraph::build(&program);
        let effects = compute_effects(&cfg, &symbols);
        find_uninitialized(&cfg, &effects)
            .into_iter()
            .map(|w| (w.line, w.variable))
            .collect()
    }

    #[test]
    fn test_use_before_assignment() {
        assert_eq!(flagged("10 PRINT X\n20 X = 10\n"), vec![(10, "X".to_string())]);
        assert!(flagged("10 INPUT A\n20 PRINT A\n").is_empty());
        assert!(flagged("10 FOR I = 1 TO 10\n20 PRINT I\n30 NEXT I\n").is_empty());
    }

    #[test]
    fn test_each_offending_use_is_reported() {
        let found = flagged("10 Y = X + Z\n20 PRINT X\n30 X = 10\n40 Z = 20\n");
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_arrays_are_exempt() {
        assert!(flagged("10 DIM A(10)\n20 PRINT A(5)\n").is_empty());
    }

    #[test]
    fn test_goto_paths() {
        let both = "10 INPUT A\n20 IF A > 0 THEN GOTO 50\n30 X = 10\n40 GOTO 60\n50 X = 20\n60 PRINT X\n";
        assert!(flagged(both).is_empty());
        let one = "10 INPUT A\n20 IF A > 0 THEN X = 10\n30 PRINT X\n";
        assert_eq!(flagged(one), vec![(30, "X".to_string())]);
    }

    #[test]
    fn test_subroutine_called_twice() {
        let source = "10 GOSUB 100\n20 X = 1\n30 GOSUB 100\n40 PRINT X\n50 END\n100 RETURN\n";
        assert!(flagged(source).is_empty());

        // The first call reaches the body before X is assigned
        let source = "10 GOSUB 100\n20 X = 1\n30 GOSUB 100\n40 END\n100 PRINT X\n110 RETURN\n";
        assert_eq!(flagged(source), vec![(100, "X".to_string())]);
    }

    #[test]
    fn test_on_gosub_returns_to_its_own_statement() {
        let source = "10 INPUT K\n20 ON K GOSUB 100, 200\n30 X = 1\n40 GOSUB 100\n50 PRINT X\n60 END\n\
                      100 RETURN\n200 RETURN\n";
        assert!(flagged(source).is_empty());

        // An out-of-range selector skips both subroutines
        let source = "10 INPUT K\n20 ON K GOSUB 100, 200\n30 PRINT X\n40 END\n\
                      100 X = 1\n110 RETURN\n200 X = 2\n210 RETURN\n";
        assert_eq!(flagged(source), vec![(30, "X".to_string())]);
    }

    #[test]
    fn test_function_body_reads_globals() {
        let found = flagged("10 DEF FNT(A) = A + B\n20 PRINT FNT(5)\n30 B = 10\n");
        assert_eq!(found, vec![(20, "B".to_string())]);
    }
}
