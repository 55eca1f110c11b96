//! Generic forward dataflow over the statement graph
//!
//! Available expressions, reaching definitions and definite assignment all
//! run through [`solve_forward`], so they agree on what a path is. Facts of
//! nodes not yet reached from the entry stay `None` and do not take part in
//! the meet, which keeps must-analyses precise at loop headers.
//!
//! Facts are kept per call string: a `GOSUB` pushes its node, and a
//! `RETURN` pops it and continues only at the statement after that call.
//! Call strings are limited to [`CALL_STRING_LIMIT`] sites; a `RETURN` whose
//! call site was dropped, or that runs with no `GOSUB` active, falls back to
//! the graph's return edges. The per-node facts of a [`DataflowSolution`]
//! are the meet over every call string that reached the node.

use super::cfg::{CfgNode, ControlFlowGraph, EdgeKind, NodeId, ENTRY};
use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexSet;
use parser::StatementKind;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;

/// Innermost call sites remembered per context
pub const CALL_STRING_LIMIT: usize = 4;

/// Active `GOSUB` nodes, outermost first
type CallString = SmallVec<[NodeId; CALL_STRING_LIMIT]>;

/// A node under one interned call string
type ContextNode = (NodeId, usize);

/// A forward analysis: a fact lattice, its meet, and a per-node transfer
pub trait ForwardAnalysis<'p> {
    type Fact: Clone + PartialEq + fmt::Debug;

    fn name(&self) -> &'static str;

    /// Fact holding before the first statement
    fn entry_fact(&self) -> Self::Fact;

    /// Combine facts arriving over two edges
    fn meet(&self, left: &Self::Fact, right: &Self::Fact) -> Self::Fact;

    fn transfer(&self, node: &CfgNode<'p>, input: &Self::Fact) -> Self::Fact;
}

#[derive(Debug, Clone)]
pub struct DataflowSolution<F> {
    pub before: Vec<Option<F>>,
    pub after: Vec<Option<F>>,
    /// Node visits until the fixpoint
    pub iterations: usize,
    /// Distinct call strings seen
    pub contexts: usize,
}

impl<F> DataflowSolution<F> {
    pub fn before(&self, node: NodeId) -> Option<&F> {
        self.before.get(node).and_then(Option::as_ref)
    }

    pub fn after(&self, node: NodeId) -> Option<&F> {
        self.after.get(node).and_then(Option::as_ref)
    }
}

/// Where control goes after `id` completes under call string `context`
fn context_successors(
    cfg: &ControlFlowGraph<'_>,
    id: NodeId,
    context: usize,
    contexts: &mut IndexSet<CallString>,
) -> SmallVec<[ContextNode; 4]> {
    let node = cfg.node(id);
    let calls = contexts.get_index(context).cloned().unwrap_or_default();
    let mut targets = SmallVec::new();

    if matches!(node.statement.map(|s| &s.kind), Some(StatementKind::Return)) {
        match calls.split_last() {
            Some((&site, outer)) => {
                let (caller, _) = contexts.insert_full(CallString::from(outer));
                targets.push((cfg.fallthrough(site), caller));
            }
            None => targets.extend(node.successors.iter().map(|&(to, _)| (to, context))),
        }
        return targets;
    }

    for &(to, kind) in &node.successors {
        if kind == EdgeKind::Call {
            let mut callee = calls.clone();
            if callee.len() == CALL_STRING_LIMIT {
                callee.remove(0);
            }
            callee.push(id);
            let (inner, _) = contexts.insert_full(callee);
            targets.push((to, inner));
        } else {
            targets.push((to, context));
        }
    }
    targets
}

/// Meet of the facts a node holds under each call string
fn merge_contexts<'p, A>(analysis: &A, len: usize, facts: &FxHashMap<ContextNode, A::Fact>) -> Vec<Option<A::Fact>>
where
    A: ForwardAnalysis<'p>,
{
    let mut merged: Vec<Option<A::Fact>> = vec![None; len];
    for (&(id, _), fact) in facts {
        merged[id] = Some(match merged[id].take() {
            Some(acc) => analysis.meet(&acc, fact),
            None => fact.clone(),
        });
    }
    merged
}

/// Worklist iteration to a fixpoint
pub fn solve_forward<'p, A>(cfg: &ControlFlowGraph<'p>, analysis: &A) -> DataflowSolution<A::Fact>
where
    A: ForwardAnalysis<'p>,
{
    let mut contexts: IndexSet<CallString> = IndexSet::new();
    let (top, _) = contexts.insert_full(CallString::new());

    let mut inputs: FxHashMap<ContextNode, A::Fact> = FxHashMap::default();
    let mut outputs: FxHashMap<ContextNode, A::Fact> = FxHashMap::default();
    let mut queued: FxHashSet<ContextNode> = FxHashSet::default();
    let mut worklist = VecDeque::from([(ENTRY, top)]);
    inputs.insert((ENTRY, top), analysis.entry_fact());
    queued.insert((ENTRY, top));
    let mut iterations = 0;

    while let Some(key) = worklist.pop_front() {
        queued.remove(&key);
        iterations += 1;
        let (id, context) = key;

        let output = match inputs.get(&key) {
            Some(input) => analysis.transfer(cfg.node(id), input),
            None => continue,
        };
        if outputs.get(&key) == Some(&output) {
            continue;
        }

        for target in context_successors(cfg, id, context, &mut contexts) {
            let merged = match inputs.get(&target) {
                Some(existing) => analysis.meet(existing, &output),
                None => output.clone(),
            };
            if inputs.get(&target) != Some(&merged) {
                inputs.insert(target, merged);
                if queued.insert(target) {
                    worklist.push_back(target);
                }
            }
        }
        outputs.insert(key, output);
    }

    log::debug!(
        "{}: fixpoint after {} visits over {} nodes in {} call contexts",
        analysis.name(),
        iterations,
        cfg.len(),
        contexts.len()
    );

    DataflowSolution {
        before: merge_contexts(analysis, cfg.len(), &inputs),
        after: merge_contexts(analysis, cfg.len(), &outputs),
        iterations,
        contexts: contexts.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::{parse_program, StatementKind};
    use std::collections::BTreeSet;

    /// Lines whose statements run on every path to a node
    struct MustVisit;

    impl<'p> ForwardAnalysis<'p> for MustVisit {
        type Fact = BTreeSet<u32>;

        fn name(&self) -> &'static str {
            "must-visit"
        }

        fn entry_fact(&self) -> Self::Fact {
            BTreeSet::new()
        }

        fn meet(&self, left: &Self::Fact, right: &Self::Fact) -> Self::Fact {
            left.intersection(right).copied().collect()
        }

        fn transfer(&self, node: &CfgNode<'p>, input: &Self::Fact) -> Self::Fact {
            let mut out = input.clone();
            if node.statement.is_some() {
                out.insert(node.line);
            }
            out
        }
    }

    #[test]
    fn test_join_intersects_both_arms() {
        let program = parse_program(
            "10 INPUT C\n20 IF C THEN 50\n30 PRINT 1\n40 GOTO 60\n50 PRINT 2\n60 END\n",
        )
        .unwrap();
        let cfg = ControlFlowGraph::build(&program);
        let solution = solve_forward(&cfg, &MustVisit);

        let end = cfg.line_entry(60).unwrap();
        let seen = solution.before(end).unwrap();
        assert!(seen.contains(&10) && seen.contains(&20));
        assert!(!seen.contains(&30) && !seen.contains(&50));
    }

    #[test]
    fn test_unreachable_nodes_have_no_fact() {
        let program = parse_program("10 END\n20 PRINT 1\n").unwrap();
        let cfg = ControlFlowGraph::build(&program);
        let solution = solve_forward(&cfg, &MustVisit);
        let dead = cfg.line_entry(20).unwrap();
        assert!(solution.before(dead).is_none());
        assert!(matches!(
            cfg.node(dead).statement.map(|s| &s.kind),
            Some(StatementKind::Print { .. })
        ));
    }

    #[test]
    fn test_return_resumes_at_own_call_site() {
        let program = parse_program(
            "10 GOSUB 100\n20 PRINT 1\n30 GOSUB 100\n40 PRINT 2\n50 END\n100 PRINT 3\n110 RETURN\n",
        )
        .unwrap();
        let cfg = ControlFlowGraph::build(&program);
        let solution = solve_forward(&cfg, &MustVisit);

        let second = cfg.line_entry(40).unwrap();
        let seen = solution.before(second).unwrap();
        assert!(seen.contains(&20) && seen.contains(&30) && seen.contains(&110));

        // Both calls share the subroutine, so only the first call is certain there
        let body = cfg.line_entry(100).unwrap();
        let seen = solution.before(body).unwrap();
        assert!(seen.contains(&10));
        assert!(!seen.contains(&20));
        assert_eq!(solution.contexts, 3);
    }

    #[test]
    fn test_deep_and_recursive_calls_terminate() {
        let mut source = String::from("10 GOSUB 100\n20 END\n");
        for depth in 1..=6 {
            source.push_str(&format!("{} GOSUB {}\n{} RETURN\n", depth * 100, depth * 100 + 100, depth * 100 + 10));
        }
        source.push_str("700 PRINT 1\n710 RETURN\n");
        let program = parse_program(&source).unwrap();
        let cfg = ControlFlowGraph::build(&program);
        let solution = solve_forward(&cfg, &MustVisit);
        let end = cfg.line_entry(20).unwrap();
        assert!(solution.before(end).unwrap().contains(&700));
        assert!(solution.contexts <= 1 + CALL_STRING_LIMIT * 7);

        let program =
            parse_program("10 INPUT N\n20 GOSUB 100\n30 END\n100 IF N > 0 THEN N = N - 1 : GOSUB 100\n110 RETURN\n")
                .unwrap();
        let cfg = ControlFlowGraph::build(&program);
        let solution = solve_forward(&cfg, &MustVisit);
        let end = cfg.line_entry(30).unwrap();
        assert!(solution.before(end).unwrap().contains(&110));
    }

    #[test]
    fn test_loop_converges() {
        let program = parse_program("10 FOR I = 1 TO 10\n20 X = X + I\n30 NEXT I\n40 PRINT X\n").unwrap();
        let cfg = ControlFlowGraph::build(&program);
        let solution = solve_forward(&cfg, &MustVisit);
        let print = cfg.line_entry(40).unwrap();
        assert!(solution.before(print).unwrap().contains(&30));
        assert!(solution.iterations < 50);
    }
}
