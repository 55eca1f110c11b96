//! Single-use temporaries and dead stores
//!
//! Built on reaching definitions over the shared graph: every read of `V`
//! is charged to each assignment of `V` that may reach it. An assignment
//! with exactly one such read can be substituted into it, one with none is
//! a dead store.

use crate::optimization::constant_folding::evaluate_constant;
use crate::pass_manager::{AnalysisContext, AnalysisPass, PassResult};
use crate::pipeline::AnalyzerConfig;
use crate::semantic_graph::{
    solve_forward, CfgNode, ControlFlowGraph, DataflowSolution, ForwardAnalysis, NodeEffects, NodeId,
};
use fxhash::FxHashMap;
use parser::{Expr, ExprKind, LValue, LineNumber, StatementKind};
use serde::Serialize;
use std::collections::BTreeSet;

/// `(variable, defining node)` pairs that may reach a point
pub type Definitions = BTreeSet<(String, NodeId)>;

pub struct ReachingDefinitions<'e, 'p> {
    effects: &'e [NodeEffects<'p>],
}

impl<'e, 'p> ReachingDefinitions<'e, 'p> {
    pub fn new(effects: &'e [NodeEffects<'p>]) -> Self {
        Self { effects }
    }
}

impl<'p> ForwardAnalysis<'p> for ReachingDefinitions<'_, 'p> {
    type Fact = Definitions;

    fn name(&self) -> &'static str {
        "reaching-definitions"
    }

    fn entry_fact(&self) -> Self::Fact {
        Definitions::new()
    }

    fn meet(&self, left: &Self::Fact, right: &Self::Fact) -> Self::Fact {
        left.union(right).cloned().collect()
    }

    fn transfer(&self, node: &CfgNode<'p>, input: &Self::Fact) -> Self::Fact {
        let Some(fx) = self.effects.get(node.id) else {
            return input.clone();
        };
        if fx.defs.is_empty() {
            return input.clone();
        }
        let mut out: Definitions = input
            .iter()
            .filter(|(var, _)| !fx.defines(var))
            .cloned()
            .collect();
        for var in &fx.defs {
            out.insert((var.clone(), node.id));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardSubstitution {
    pub line: LineNumber,
    pub variable: String,
    pub expression: String,
    pub use_count: usize,
    pub use_lines: Vec<LineNumber>,
    pub can_substitute: bool,
    pub is_dead_store: bool,
    pub reason: String,
}

/// Reads of each definition, with the node doing the reading
fn charge_uses(
    cfg: &ControlFlowGraph<'_>,
    effects: &[NodeEffects<'_>],
    solution: &DataflowSolution<Definitions>,
) -> FxHashMap<NodeId, Vec<NodeId>> {
    let mut uses: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
    for node in cfg.nodes() {
        let Some(before) = solution.before(node.id) else {
            continue;
        };
        let Some(fx) = effects.get(node.id) else {
            continue;
        };
        for read in &fx.uses {
            for (_, def) in before.range((read.name.clone(), 0)..=(read.name.clone(), NodeId::MAX)) {
                uses.entry(*def).or_default().push(node.id);
            }
        }
    }
    uses
}

/// Scalar operands of `expr`
fn operands(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        if let ExprKind::Variable(id) = &e.kind {
            names.insert(id.key.clone());
        }
        stack.extend(e.children());
    }
    names
}

fn first_user_function(expr: &Expr) -> Option<String> {
    if let ExprKind::FnCall { name, .. } = &expr.kind {
        return Some(name.key.clone());
    }
    expr.children().into_iter().find_map(first_user_function)
}

pub fn find_forward_substitutions(
    cfg: &ControlFlowGraph<'_>,
    effects: &[NodeEffects<'_>],
) -> Vec<ForwardSubstitution> {
    let analysis = ReachingDefinitions::new(effects);
    let solution = solve_forward(cfg, &analysis);
    let uses = charge_uses(cfg, effects, &solution);

    let mut records = Vec::new();
    for (node, stmt) in cfg.statement_nodes() {
        let StatementKind::Let {
            target: LValue::Scalar(var),
            value,
        } = &stmt.kind
        else {
            continue;
        };
        // Literals and plain copies are left to constant and copy propagation
        if evaluate_constant(value).is_some() || matches!(value.kind, ExprKind::Variable(_)) {
            continue;
        }
        let Some(def_before) = solution.before(node.id) else {
            continue;
        };

        let readers = uses.get(&node.id).cloned().unwrap_or_default();
        let use_lines: Vec<LineNumber> = readers.iter().map(|&r| cfg.node(r).line).collect();
        let use_count = readers.len();
        let function = first_user_function(value);
        let impure = value.has_side_effects();

        let changed_operand = match readers.as_slice() {
            [reader] => solution.before(*reader).and_then(|at_use| {
                operands(value).into_iter().find(|operand| {
                    let reaching = |fact: &Definitions| -> Vec<NodeId> {
                        fact.iter().filter(|(v, _)| v == operand).map(|&(_, d)| d).collect()
                    };
                    // The assignment itself redefines its own operand in `V = V + 1`
                    operand == &var.key || reaching(def_before) != reaching(at_use)
                })
            }),
            _ => None,
        };

        let (can_substitute, reason) = match (use_count, &function, impure) {
            (_, Some(name), _) => (false, format!("right-hand side calls user-defined function {}", name)),
            (_, None, true) => (false, "right-hand side has side effects".to_string()),
            (0, _, _) => (false, "assigned but never used".to_string()),
            (1, _, _) => match &changed_operand {
                Some(operand) => (
                    false,
                    format!("operand {} may change before the use at line {}", operand, use_lines[0]),
                ),
                None => (true, format!("used once at line {}; substitute the expression there", use_lines[0])),
            },
            (n, _, _) => (false, format!("used {} times", n)),
        };

        records.push(ForwardSubstitution {
            line: stmt.line,
            variable: var.key.clone(),
            expression: value.to_string(),
            use_count,
            use_lines,
            can_substitute,
            is_dead_store: use_count == 0 && !impure,
            reason,
        });
    }

    log::debug!(
        "forward substitution: {} candidates, {} substitutable, {} dead stores",
        records.len(),
        records.iter().filter(|r| r.can_substitute).count(),
        records.iter().filter(|r| r.is_dead_store).count()
    );
    records
}

pub struct ForwardSubstitutionPass;

impl ForwardSubstitutionPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ForwardSubstitutionPass {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPass for ForwardSubstitutionPass {
    fn name(&self) -> &'static str {
        "forward-substitution"
    }

    fn is_enabled(&self, config: &AnalyzerConfig) -> bool {
        config.enable_forward_substitution
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        let records = find_forward_substitutions(&ctx.cfg, &ctx.effects);
        let dead = records.iter().filter(|r| r.is_dead_store).count();
        let count = records.len();
        ctx.findings.forward_substitutions = records;
        PassResult::with_findings(count).with_stat("dead-stores", dead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_graph::compute_effects;
    use crate::symbols::SymbolTableBuilder;
    use parser::parse_program;

    fn substitutions(source: &str) -> Vec<ForwardSubstitution> {
        let program = parse_program(source).unwrap();
        let symbols = SymbolTableBuilder::new().build(&program).table;
        let cfg = ControlFlowGraph::build(&program);
        let effects = compute_effects(&cfg, &symbols);
        find_forward_substitutions(&cfg, &effects)
    }

    #[test]
    fn test_single_use_temporary() {
        let found = substitutions("10 A = 10\n20 B = 20\n30 TEMP = A + B\n40 PRINT TEMP\n");
        assert_eq!(found.len(), 1);
        assert!(found[0].can_substitute);
        assert_eq!(found[0].use_lines, vec![40]);
    }

    #[test]
    fn test_dead_store_and_multiple_uses() {
        let found = substitutions("10 TEMP = A * 2\n20 PRINT A\n");
        assert!(found[0].is_dead_store);
        assert_eq!(found[0].use_count, 0);

        let found = substitutions("10 TEMP = A * 2\n20 PRINT TEMP\n30 PRINT TEMP\n");
        assert!(!found[0].can_substitute);
        assert_eq!(found[0].use_count, 2);
    }

    #[test]
    fn test_operand_change_blocks_substitution() {
        let found = substitutions("10 T = A + B\n20 A = 5\n30 PRINT T\n");
        assert_eq!(found[0].use_count, 1);
        assert!(!found[0].can_substitute);
        assert!(found[0].reason.contains("operand A"));
    }

    #[test]
    fn test_uses_after_a_second_call_see_only_its_caller() {
        let found = substitutions(
            "10 INPUT A, B\n20 T = A + B\n30 GOSUB 100\n40 T = A * B\n50 GOSUB 100\n60 PRINT T\n70 END\n\
             100 PRINT 1\n110 RETURN\n",
        );
        let at = |line: LineNumber| found.iter().find(|f| f.line == line).unwrap();
        assert!(at(20).is_dead_store);
        assert_eq!(at(40).use_lines, vec![60]);
        assert!(at(40).can_substitute);
    }

    #[test]
    fn test_reads_in_every_on_gosub_target() {
        let found = substitutions(
            "10 INPUT A, B, K\n20 T = A + B\n30 ON K GOSUB 100, 200\n40 END\n\
             100 PRINT T\n110 RETURN\n200 PRINT T * 2\n210 RETURN\n",
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].use_lines, vec![100, 200]);
        assert!(!found[0].can_substitute);
    }

    #[test]
    fn test_branch_uses_are_counted_per_path() {
        let found = substitutions("10 T = A * B\n20 IF C THEN PRINT T ELSE PRINT T\n");
        assert_eq!(found[0].use_count, 2);
    }
}
