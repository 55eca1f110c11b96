//! `FOR ... NEXT` loop facts: trip counts, invariants, induction variables

use crate::analysis::uninitialized::DefiniteAssignment;
use crate::logging;
use crate::optimization::constant_folding::{evaluate_constant, evaluate_with};
use crate::pass_manager::{AnalysisContext, AnalysisPass, PassResult};
use crate::pipeline::AnalyzerConfig;
use crate::semantic_graph::{
    solve_forward, ControlFlowGraph, DataflowSolution, EdgeKind, ForLoopRegion, NodeEffects, NodeId,
};
use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexMap;
use parser::{BinaryOp, Expr, ExprKind, LValue, LineNumber, StatementKind};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopInvariant {
    pub expression: String,
    pub first_line: LineNumber,
    pub occurrences: usize,
    /// Evaluated on every iteration and safe to compute once before the loop
    pub hoistable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InductionVariable {
    pub variable: String,
    /// Primary variable it is derived from, `None` for the loop's own counter
    pub base: Option<String>,
    /// `variable = base * multiplier + offset`
    pub multiplier: f64,
    pub offset: f64,
    pub line: LineNumber,
}

impl InductionVariable {
    pub fn is_primary(&self) -> bool {
        self.base.is_none()
    }
}

/// A subscript term that could be maintained by addition instead of multiplication
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptReduction {
    pub line: LineNumber,
    pub array: String,
    pub term: String,
    pub variable: String,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopInfo {
    pub start_line: LineNumber,
    pub end_line: LineNumber,
    pub variable: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub step: Option<f64>,
    pub iteration_count: Option<u64>,
    /// Enclosing FOR loops
    pub nesting_depth: usize,
    pub contains_gosub: bool,
    pub invariants: Vec<LoopInvariant>,
    pub induction_variables: Vec<InductionVariable>,
    pub subscript_reductions: Vec<SubscriptReduction>,
}

/// Relative slack when a fractional step lands on the bound
const STEP_TOLERANCE: f64 = 1e-9;

/// `floor((end - start) / step) + 1`, never negative; `None` for a zero step
///
/// A quotient within rounding error of a whole number counts as that number,
/// so `FOR X = 0 TO 1 STEP 0.1` runs eleven times.
pub fn iteration_count(start: f64, end: f64, step: f64) -> Option<u64> {
    if step == 0.0 || !(start.is_finite() && end.is_finite() && step.is_finite()) {
        return None;
    }
    let quotient = (end - start) / step;
    let nearest = quotient.round();
    let steps = if (quotient - nearest).abs() <= STEP_TOLERANCE * nearest.abs().max(1.0) {
        nearest
    } else {
        quotient.floor()
    };
    let trips = steps + 1.0;
    Some(if trips <= 0.0 { 0 } else { trips as u64 })
}

/// Scalars assigned exactly once in the whole program, from a literal expression
///
/// Such a scalar holds its value wherever it is definitely assigned, because
/// its only assignment then runs on every path there. Loop bounds like
/// `FOR I = 1 TO N` use it only at those points.
pub fn program_constants(cfg: &ControlFlowGraph<'_>, effects: &[NodeEffects<'_>]) -> FxHashMap<String, f64> {
    let mut def_counts: FxHashMap<&str, usize> = FxHashMap::default();
    for fx in effects {
        for def in &fx.defs {
            *def_counts.entry(def.as_str()).or_insert(0) += 1;
        }
    }

    let mut constants = FxHashMap::default();
    for (node, stmt) in cfg.statement_nodes().filter(|(node, _)| node.depth == 0) {
        if let StatementKind::Let {
            target: LValue::Scalar(id),
            value,
        } = &stmt.kind
        {
            if def_counts.get(id.key.as_str()) == Some(&1) {
                if let Some(v) = evaluate_constant(value).and_then(|v| v.as_number()) {
                    let _line = logging::at_line(node.line);
                    log::trace!("{} is constant {}", id.key, v);
                    constants.insert(id.key.clone(), v);
                }
            }
        }
    }
    constants
}

struct LoopAnalyzer<'a, 'p> {
    cfg: &'a ControlFlowGraph<'p>,
    effects: &'a [NodeEffects<'p>],
    constants: &'a FxHashMap<String, f64>,
    assigned: &'a DataflowSolution<BTreeSet<String>>,
}

impl<'a, 'p> LoopAnalyzer<'a, 'p> {
    /// Value of `expr` when control reaches node `at`
    fn constant(&self, expr: &Expr, at: NodeId) -> Option<f64> {
        let assigned = self.assigned.before(at);
        let lookup = |name: &str| {
            assigned.filter(|vars| vars.contains(name))?;
            self.constants.get(name).copied()
        };
        evaluate_with(expr, &lookup).and_then(|v| v.as_number())
    }

    fn body(&self, region: &ForLoopRegion) -> Vec<NodeId> {
        region
            .body()
            .filter(|&id| self.cfg.node(id).statement.is_some())
            .collect()
    }

    fn analyze(&self, region: &ForLoopRegion) -> Option<LoopInfo> {
        let for_node = self.cfg.node(region.for_node);
        let StatementKind::For {
            start, end, step, ..
        } = &for_node.statement?.kind
        else {
            return None;
        };
        let body = self.body(region);

        let start = self.constant(start, region.for_node);
        let end = self.constant(end, region.for_node);
        let step = match step {
            Some(step) => self.constant(step, region.for_node),
            None => Some(1.0),
        };
        let iteration_count = match (start, end, step) {
            (Some(s), Some(e), Some(st)) => iteration_count(s, e, st),
            _ => None,
        };

        let contains_gosub = body.iter().any(|&id| {
            self.cfg
                .node(id)
                .successors
                .iter()
                .any(|&(_, kind)| kind == EdgeKind::Call)
        });

        let written: FxHashSet<String> = body
            .iter()
            .flat_map(|&id| {
                let fx = &self.effects[id];
                fx.defs
                    .iter()
                    .cloned()
                    .chain(fx.array_defs.iter().map(|a| format!("{}()", a)))
            })
            .collect();

        let invariants = self.invariants(region, &body, &written, contains_gosub);
        let induction_variables = self.induction_variables(region, &body);
        let subscript_reductions = self.subscript_reductions(&body, &induction_variables);

        Some(LoopInfo {
            start_line: for_node.line,
            end_line: self.cfg.node(region.next_node).line,
            variable: region.var.clone(),
            start,
            end,
            step,
            iteration_count,
            nesting_depth: self
                .cfg
                .for_loops
                .iter()
                .filter(|outer| outer.contains(region.for_node))
                .count(),
            contains_gosub,
            invariants,
            induction_variables,
            subscript_reductions,
        })
    }

    fn invariants(
        &self,
        region: &ForLoopRegion,
        body: &[NodeId],
        written: &FxHashSet<String>,
        contains_gosub: bool,
    ) -> Vec<LoopInvariant> {
        let loop_depth = self.cfg.node(region.for_node).depth;
        let mut found: IndexMap<String, LoopInvariant> = IndexMap::new();

        for &id in body {
            let node = self.cfg.node(id);
            // Inside an IF arm the expression may not run on every iteration
            let unconditional = node.depth == loop_depth;
            let mut roots: Vec<&Expr> = self.effects[id].roots.clone();
            while let Some(expr) = roots.pop() {
                if self.is_invariant(expr, written) {
                    let entry = found.entry(expr.normalized_key()).or_insert_with(|| LoopInvariant {
                        expression: expr.to_string(),
                        first_line: node.line,
                        occurrences: 0,
                        hoistable: true,
                    });
                    entry.occurrences += 1;
                    entry.first_line = entry.first_line.min(node.line);
                    entry.hoistable &= unconditional && !contains_gosub;
                } else {
                    roots.extend(expr.children());
                }
            }
        }
        found.into_values().collect()
    }

    fn is_invariant(&self, expr: &Expr, written: &FxHashSet<String>) -> bool {
        let worth = match &expr.kind {
            ExprKind::Binary { .. } => true,
            ExprKind::Builtin { args, .. } => !args.is_empty(),
            ExprKind::Unary { operand, .. } => !operand.is_trivial(),
            _ => false,
        };
        if !worth || expr.has_side_effects() || evaluate_constant(expr).is_some() {
            return false;
        }
        let mut stack = vec![expr];
        while let Some(e) = stack.pop() {
            match &e.kind {
                ExprKind::Variable(id) if written.contains(&id.key) => return false,
                ExprKind::ArrayElement { name, .. } if written.contains(&format!("{}()", name.key)) => {
                    return false
                }
                _ => stack.extend(e.children()),
            }
        }
        true
    }

    fn induction_variables(&self, region: &ForLoopRegion, body: &[NodeId]) -> Vec<InductionVariable> {
        let mut result = vec![InductionVariable {
            variable: region.var.clone(),
            base: None,
            multiplier: 1.0,
            offset: 0.0,
            line: self.cfg.node(region.for_node).line,
        }];

        let mut def_counts: FxHashMap<&str, usize> = FxHashMap::default();
        for &id in body {
            for def in &self.effects[id].defs {
                *def_counts.entry(def.as_str()).or_insert(0) += 1;
            }
        }

        for &id in body {
            let node = self.cfg.node(id);
            let Some(StatementKind::Let {
                target: LValue::Scalar(target),
                value,
            }) = node.statement.map(|s| &s.kind)
            else {
                continue;
            };
            if target.key == region.var || def_counts.get(target.key.as_str()) != Some(&1) {
                continue;
            }
            if let Some((multiplier, offset)) = linear_in(value, &region.var) {
                let _line = logging::at_line(node.line);
                log::trace!("{} derived from {}", target.key, region.var);
                result.push(InductionVariable {
                    variable: target.key.clone(),
                    base: Some(region.var.clone()),
                    multiplier,
                    offset,
                    line: node.line,
                });
            }
        }
        result
    }

    fn subscript_reductions(&self, body: &[NodeId], ivs: &[InductionVariable]) -> Vec<SubscriptReduction> {
        let Some(primary) = ivs.iter().find(|iv| iv.is_primary()) else {
            return Vec::new();
        };
        let derived: FxHashMap<&str, f64> = ivs
            .iter()
            .filter(|iv| !iv.is_primary() && iv.multiplier != 1.0)
            .map(|iv| (iv.variable.as_str(), iv.multiplier))
            .collect();

        let mut found = Vec::new();
        for &id in body {
            let node = self.cfg.node(id);
            let mut stack: Vec<&Expr> = self.effects[id].roots.clone();
            let mut subscripts: Vec<(&str, &Expr)> = Vec::new();
            if let Some(stmt) = node.statement {
                let targets: Vec<&LValue> = match &stmt.kind {
                    StatementKind::Let { target, .. } | StatementKind::LineInput { target, .. } => vec![target],
                    StatementKind::Input { targets, .. } | StatementKind::Read { targets } => targets.iter().collect(),
                    _ => Vec::new(),
                };
                for target in targets {
                    if let LValue::Element { name, indices } = target {
                        subscripts.extend(indices.iter().map(|i| (name.key.as_str(), i)));
                    }
                }
            }
            // Subscripts of the targets were already pushed as roots; skip them there
            stack.retain(|root| !subscripts.iter().any(|(_, s)| std::ptr::eq(*s, *root)));
            while let Some(expr) = stack.pop() {
                if let ExprKind::ArrayElement { name, indices } = &expr.kind {
                    subscripts.extend(indices.iter().map(|i| (name.key.as_str(), i)));
                }
                stack.extend(expr.children());
            }

            for (array, index) in subscripts {
                let mut terms = vec![index];
                while let Some(term) = terms.pop() {
                    let hit = match &term.kind {
                        ExprKind::Binary {
                            op: BinaryOp::Mul,
                            left,
                            right,
                        } => scaled_variable(left, right)
                            .filter(|(var, c)| *var == primary.variable && *c != 1.0),
                        ExprKind::Variable(id) => derived.get(id.key.as_str()).map(|&m| (id.key.clone(), m)),
                        _ => None,
                    };
                    match hit {
                        Some((variable, multiplier)) => found.push(SubscriptReduction {
                            line: node.line,
                            array: array.to_string(),
                            term: term.to_string(),
                            variable,
                            multiplier,
                        }),
                        None => terms.extend(term.children()),
                    }
                }
            }
        }
        found
    }
}

/// `(V, c)` for `V * c` or `c * V`
fn scaled_variable(left: &Expr, right: &Expr) -> Option<(String, f64)> {
    match (&left.kind, &right.kind) {
        (ExprKind::Variable(id), _) => right.as_number().map(|c| (id.key.clone(), c)),
        (_, ExprKind::Variable(id)) => left.as_number().map(|c| (id.key.clone(), c)),
        _ => None,
    }
}

/// `(multiplier, offset)` when `expr` is `V`, `V * c`, `c * V`, `V + c` or `V - c`
fn linear_in(expr: &Expr, var: &str) -> Option<(f64, f64)> {
    let is_var = |e: &Expr| matches!(&e.kind, ExprKind::Variable(id) if id.key == var);
    match &expr.kind {
        ExprKind::Variable(id) if id.key == var => Some((1.0, 0.0)),
        ExprKind::Binary { op, left, right } => match op {
            BinaryOp::Mul => scaled_variable(left, right)
                .filter(|(v, _)| v == var)
                .map(|(_, c)| (c, 0.0)),
            BinaryOp::Add if is_var(left) => right.as_number().map(|c| (1.0, c)),
            BinaryOp::Add if is_var(right) => left.as_number().map(|c| (1.0, c)),
            BinaryOp::Sub if is_var(left) => right.as_number().map(|c| (1.0, -c)),
            _ => None,
        },
        _ => None,
    }
}

pub fn analyze_loops(cfg: &ControlFlowGraph<'_>, effects: &[NodeEffects<'_>]) -> Vec<LoopInfo> {
    let constants = program_constants(cfg, effects);
    let assigned = solve_forward(cfg, &DefiniteAssignment::new(effects));
    let analyzer = LoopAnalyzer {
        cfg,
        effects,
        constants: &constants,
        assigned: &assigned,
    };
    let mut loops: Vec<LoopInfo> = cfg
        .for_loops
        .iter()
        .filter(|region| cfg.is_reachable(region.for_node))
        .filter_map(|region| analyzer.analyze(region))
        .collect();
    loops.sort_by_key(|l| (l.start_line, l.end_line));
    loops
}

pub struct LoopAnalysisPass;

impl LoopAnalysisPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoopAnalysisPass {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPass for LoopAnalysisPass {
    fn name(&self) -> &'static str {
        "loop-analysis"
    }

    fn is_enabled(&self, config: &AnalyzerConfig) -> bool {
        config.enable_loop_analysis
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        let loops = analyze_loops(&ctx.cfg, &ctx.effects);
        let invariants = loops.iter().map(|l| l.invariants.len()).sum();
        let count = loops.len();
        ctx.findings.loops = loops;
        PassResult::with_findings(count).with_stat("invariants", invariants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_graph::compute_effects;
    use crate::symbols::SymbolTableBuilder;
    use parser::parse_program;

    fn loops(source: &str) -> Vec<LoopInfo> {
        let program = parse_program(source).unwrap();
        let symbols = SymbolTableBuilder::new().build(&program).table;
        let cfg = ControlFlowGraph::build(&program);
        let effects = compute_effects(&cfg, &symbols);
        analyze_loops(&cfg, &effects)
    }

    #[test]
    fn test_iteration_counts() {
        assert_eq!(iteration_count(1.0, 10.0, 1.0), Some(10));
        assert_eq!(iteration_count(0.0, 20.0, 2.0), Some(11));
        assert_eq!(iteration_count(10.0, 1.0, -3.0), Some(4));
        assert_eq!(iteration_count(5.0, 1.0, 1.0), Some(0));
        assert_eq!(iteration_count(1.0, 5.0, 0.0), None);
    }

    #[test]
    fn test_fractional_steps_reach_the_bound() {
        assert_eq!(iteration_count(0.0, 1.0, 0.1), Some(11));
        assert_eq!(iteration_count(0.0, 0.3, 0.1), Some(4));
        assert_eq!(iteration_count(1.0, 0.0, -0.1), Some(11));
        assert_eq!(iteration_count(0.0, 1.0, 0.3), Some(4));

        let found = loops("10 FOR X = 0 TO 1 STEP 0.1\n20 PRINT X\n30 NEXT X\n");
        assert_eq!(found[0].iteration_count, Some(11));
    }

    #[test]
    fn test_bounds_through_program_constants() {
        let found = loops("10 N = 20\n20 FOR I = 1 TO N\n30 PRINT I\n40 NEXT I\n");
        assert_eq!(found[0].iteration_count, Some(20));

        let found = loops("10 INPUT N\n20 FOR I = 1 TO N\n30 NEXT I\n");
        assert_eq!(found[0].iteration_count, None);
    }

    #[test]
    fn test_constants_assigned_after_the_loop_are_ignored() {
        // N is still zero when line 10 runs
        let found = loops("10 FOR I = 1 TO N\n20 PRINT I\n30 NEXT I\n40 N = 5\n");
        assert_eq!(found[0].end, None);
        assert_eq!(found[0].iteration_count, None);

        // Assigned on one path only
        let found = loops("10 INPUT C\n20 IF C THEN 40\n30 N = 5\n40 FOR I = 1 TO N\n50 NEXT I\n");
        assert_eq!(found[0].iteration_count, None);

        let found = loops("10 GOSUB 100\n20 FOR I = 1 TO N\n30 NEXT I\n40 END\n100 N = 3\n110 RETURN\n");
        assert_eq!(found[0].iteration_count, Some(3));
    }

    #[test]
    fn test_invariants() {
        let found = loops("10 FOR I = 1 TO 10\n20 X = A * B + I\n30 IF I > 5 THEN Y = C * D\n40 NEXT I\n");
        let inv = &found[0].invariants;
        assert_eq!(inv.len(), 2);
        let ab = inv.iter().find(|i| i.expression == "A * B").unwrap();
        assert!(ab.hoistable);
        let cd = inv.iter().find(|i| i.expression == "C * D").unwrap();
        assert!(!cd.hoistable);
    }

    #[test]
    fn test_nested_depth() {
        let found = loops("10 FOR I = 1 TO 3\n20 FOR J = 1 TO 4\n30 NEXT J\n40 NEXT I\n");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].nesting_depth, 0);
        assert_eq!(found[1].nesting_depth, 1);
        assert_eq!(found[1].iteration_count, Some(4));
    }
}
