//! Statement-level control flow graph for a BASIC program
//!
//! One node per statement occurrence, numbered in pre-order so that the
//! statements of an `IF` arm follow the `IF` itself, plus synthetic entry
//! and exit nodes. Edges model:
//!
//! - fall-through between statements and lines
//! - `GOTO`, `ON ... GOTO` and the two arms of `IF ... THEN ... ELSE`
//! - `GOSUB` as a call edge, with `RETURN` leading back to every statement
//!   that follows a `GOSUB`; the dataflow solver narrows this to the
//!   statement after the active call
//! - `FOR ... NEXT` and `WHILE ... WEND` back edges, loop exits, and the
//!   zero-trip edge around a `FOR` body whose bounds are not known to run
//! - `ON ERROR GOTO` handler entry and `RESUME`
//!
//! A jump to a line that does not exist leads to the exit node; validation
//! reports it separately.

use crate::optimization::constant_folding::evaluate_constant;
use fxhash::FxHashMap;
use parser::{Branch, LineNumber, Program, ResumeTarget, Statement, StatementKind};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

pub type NodeId = usize;

pub const ENTRY: NodeId = 0;
pub const EXIT: NodeId = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Normal,
    Then,
    Else,
    Jump,
    Call,
    Return,
    LoopBack,
    LoopExit,
    /// `FOR` whose body may run zero times
    LoopSkip,
    ErrorHandler,
    Resume,
}

#[derive(Debug, Clone)]
pub struct CfgNode<'p> {
    pub id: NodeId,
    /// `None` for entry and exit
    pub statement: Option<&'p Statement>,
    pub line: LineNumber,
    /// Number of enclosing `IF` arms
    pub depth: usize,
    pub successors: SmallVec<[(NodeId, EdgeKind); 2]>,
    pub predecessors: SmallVec<[NodeId; 2]>,
}

impl<'p> CfgNode<'p> {
    fn new(id: NodeId, statement: Option<&'p Statement>, line: LineNumber, depth: usize) -> Self {
        Self {
            id,
            statement,
            line,
            depth,
            successors: SmallVec::new(),
            predecessors: SmallVec::new(),
        }
    }
}

/// A matched `FOR ... NEXT` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForLoopRegion {
    pub for_node: NodeId,
    pub next_node: NodeId,
    pub var: String,
}

impl ForLoopRegion {
    /// Pre-order numbering puts the body between the two nodes
    pub fn contains(&self, node: NodeId) -> bool {
        node > self.for_node && node <= self.next_node
    }

    pub fn body(&self) -> std::ops::RangeInclusive<NodeId> {
        (self.for_node + 1)..=self.next_node
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhileLoopRegion {
    pub while_node: NodeId,
    pub wend_node: NodeId,
}

/// Loop nesting problems found while matching loop statements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureIssue {
    NextWithoutFor { node: NodeId },
    NextMismatch { node: NodeId, expected: String, found: String },
    WendWithoutWhile { node: NodeId },
    UnclosedFor { node: NodeId, var: String },
    UnclosedWhile { node: NodeId },
}

enum OpenLoop {
    For { node: NodeId, var: String },
    While { node: NodeId },
}

#[derive(Debug, Clone)]
pub struct ControlFlowGraph<'p> {
    nodes: Vec<CfgNode<'p>>,
    line_entries: BTreeMap<LineNumber, NodeId>,
    fallthrough: Vec<NodeId>,
    branches: FxHashMap<NodeId, (Vec<NodeId>, Vec<NodeId>)>,
    pub for_loops: Vec<ForLoopRegion>,
    pub while_loops: Vec<WhileLoopRegion>,
    loops_closed_by: FxHashMap<NodeId, Vec<usize>>,
    pub issues: Vec<StructureIssue>,
    return_points: BTreeSet<NodeId>,
    resume_points: BTreeSet<NodeId>,
    reachable: Vec<bool>,
}

impl<'p> ControlFlowGraph<'p> {
    pub fn build(program: &'p Program) -> Self {
        let mut cfg = Self {
            nodes: vec![
                CfgNode::new(ENTRY, None, 0, 0),
                CfgNode::new(EXIT, None, LineNumber::MAX, 0),
            ],
            line_entries: BTreeMap::new(),
            fallthrough: Vec::new(),
            branches: FxHashMap::default(),
            for_loops: Vec::new(),
            while_loops: Vec::new(),
            loops_closed_by: FxHashMap::default(),
            issues: Vec::new(),
            return_points: BTreeSet::new(),
            resume_points: BTreeSet::new(),
            reachable: Vec::new(),
        };

        let mut top = Vec::new();
        let mut firsts = Vec::with_capacity(program.lines.len());
        for line in &program.lines {
            let ids = cfg.allocate(&line.statements, 0);
            firsts.push((line.number, ids.first().copied()));
            top.extend(ids);
        }

        // An empty line continues at the next line that has statements
        let mut next_entry = EXIT;
        for (number, first) in firsts.into_iter().rev() {
            if let Some(first) = first {
                next_entry = first;
            }
            cfg.line_entries.insert(number, next_entry);
        }

        cfg.fallthrough = vec![EXIT; cfg.nodes.len()];
        cfg.match_loops();

        cfg.add_edge(ENTRY, top.first().copied().unwrap_or(EXIT), EdgeKind::Normal);
        cfg.connect_list(&top, EXIT);
        cfg.connect_deferred();
        cfg.compute_reachability();

        log::debug!(
            "cfg: {} nodes, {} FOR loops, {} WHILE loops, {} structure issues",
            cfg.nodes.len(),
            cfg.for_loops.len(),
            cfg.while_loops.len(),
            cfg.issues.len()
        );
        cfg
    }

    fn allocate(&mut self, stmts: &'p [Statement], depth: usize) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            let id = self.nodes.len();
            self.nodes.push(CfgNode::new(id, Some(stmt), stmt.line, depth));
            ids.push(id);

            if let StatementKind::If {
                then_branch,
                else_branch,
                ..
            } = &stmt.kind
            {
                let then_ids = match then_branch {
                    Branch::Statements(inner) => self.allocate(inner, depth + 1),
                    Branch::Line(_) => Vec::new(),
                };
                let else_ids = match else_branch {
                    Some(Branch::Statements(inner)) => self.allocate(inner, depth + 1),
                    _ => Vec::new(),
                };
                self.branches.insert(id, (then_ids, else_ids));
            }
        }
        ids
    }

    fn match_loops(&mut self) {
        let mut open: Vec<OpenLoop> = Vec::new();

        for id in 2..self.nodes.len() {
            let Some(stmt) = self.nodes[id].statement else {
                continue;
            };
            match &stmt.kind {
                StatementKind::For { var, .. } => open.push(OpenLoop::For {
                    node: id,
                    var: var.key.clone(),
                }),
                StatementKind::While { .. } => open.push(OpenLoop::While { node: id }),
                StatementKind::Wend => match open.last() {
                    Some(&OpenLoop::While { node }) => {
                        open.pop();
                        self.while_loops.push(WhileLoopRegion {
                            while_node: node,
                            wend_node: id,
                        });
                    }
                    _ => self.issues.push(StructureIssue::WendWithoutWhile { node: id }),
                },
                StatementKind::Next { vars } if vars.is_empty() => match open.pop() {
                    Some(OpenLoop::For { node, var }) => self.close_for(node, id, var),
                    Some(other) => {
                        open.push(other);
                        self.issues.push(StructureIssue::NextWithoutFor { node: id });
                    }
                    None => self.issues.push(StructureIssue::NextWithoutFor { node: id }),
                },
                StatementKind::Next { vars } => {
                    for var in vars {
                        if !self.close_named(&mut open, id, &var.key) {
                            break;
                        }
                    }
                }
                _ => {}
            }
        }

        for pending in open {
            self.issues.push(match pending {
                OpenLoop::For { node, var } => StructureIssue::UnclosedFor { node, var },
                OpenLoop::While { node } => StructureIssue::UnclosedWhile { node },
            });
        }
    }

    /// Close the innermost open `FOR var`; inner loops left open are abandoned
    fn close_named(&mut self, open: &mut Vec<OpenLoop>, next: NodeId, name: &str) -> bool {
        let target = open
            .iter()
            .rposition(|o| matches!(o, OpenLoop::For { var, .. } if var == name));
        let innermost = match open.last() {
            Some(OpenLoop::For { var, .. }) => Some(var.clone()),
            _ => None,
        };
        let crosses_while = |from: usize| {
            open[from..]
                .iter()
                .any(|o| matches!(o, OpenLoop::While { .. }))
        };

        match (target, innermost) {
            (Some(pos), _) if pos + 1 == open.len() => {
                if let Some(OpenLoop::For { node, var }) = open.pop() {
                    self.close_for(node, next, var);
                }
                true
            }
            (Some(pos), Some(expected)) if !crosses_while(pos) => {
                self.issues.push(StructureIssue::NextMismatch {
                    node: next,
                    expected,
                    found: name.to_string(),
                });
                open.truncate(pos + 1);
                if let Some(OpenLoop::For { node, var }) = open.pop() {
                    self.close_for(node, next, var);
                }
                true
            }
            (_, Some(expected)) => {
                self.issues.push(StructureIssue::NextMismatch {
                    node: next,
                    expected,
                    found: name.to_string(),
                });
                false
            }
            _ => {
                self.issues.push(StructureIssue::NextWithoutFor { node: next });
                false
            }
        }
    }

    fn close_for(&mut self, for_node: NodeId, next_node: NodeId, var: String) {
        let index = self.for_loops.len();
        self.for_loops.push(ForLoopRegion {
            for_node,
            next_node,
            var,
        });
        self.loops_closed_by.entry(next_node).or_default().push(index);
    }

    fn target(&self, line: LineNumber) -> NodeId {
        self.line_entries.get(&line).copied().unwrap_or(EXIT)
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        if self.nodes[from].successors.contains(&(to, kind)) {
            return;
        }
        self.nodes[from].successors.push((to, kind));
        if !self.nodes[to].predecessors.contains(&from) {
            self.nodes[to].predecessors.push(from);
        }
    }

    fn connect_list(&mut self, ids: &[NodeId], fallthrough: NodeId) {
        for (k, &id) in ids.iter().enumerate() {
            let next = ids.get(k + 1).copied().unwrap_or(fallthrough);
            self.fallthrough[id] = next;
            self.connect(id, next);
        }
    }

    fn connect(&mut self, id: NodeId, next: NodeId) {
        let Some(stmt) = self.nodes[id].statement else {
            return;
        };
        match &stmt.kind {
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let (then_ids, else_ids) = self.branches.get(&id).cloned().unwrap_or_default();
                self.connect_branch(id, Some(then_branch), &then_ids, next, EdgeKind::Then);
                self.connect_branch(id, else_branch.as_ref(), &else_ids, next, EdgeKind::Else);
            }
            StatementKind::Goto { target } => {
                let to = self.target(*target);
                self.add_edge(id, to, EdgeKind::Jump);
            }
            StatementKind::Gosub { target } => {
                let to = self.target(*target);
                self.add_edge(id, to, EdgeKind::Call);
                self.return_points.insert(next);
            }
            StatementKind::OnGoto { targets, .. } => {
                for target in targets {
                    let to = self.target(*target);
                    self.add_edge(id, to, EdgeKind::Jump);
                }
                self.add_edge(id, next, EdgeKind::Normal);
            }
            StatementKind::OnGosub { targets, .. } => {
                for target in targets {
                    let to = self.target(*target);
                    self.add_edge(id, to, EdgeKind::Call);
                }
                self.add_edge(id, next, EdgeKind::Normal);
                self.return_points.insert(next);
            }
            StatementKind::End | StatementKind::Stop => self.add_edge(id, EXIT, EdgeKind::Normal),
            StatementKind::OnErrorGoto { target } => {
                self.add_edge(id, next, EdgeKind::Normal);
                if *target != 0 {
                    let handler = self.target(*target);
                    self.add_edge(id, handler, EdgeKind::ErrorHandler);
                    self.resume_points.insert(next);
                }
            }
            StatementKind::Resume {
                target: ResumeTarget::Line(line),
            } => {
                let to = self.target(*line);
                self.add_edge(id, to, EdgeKind::Resume);
            }
            StatementKind::Next { .. } if self.loops_closed_by.contains_key(&id) => {
                self.add_edge(id, next, EdgeKind::LoopExit);
            }
            StatementKind::Wend if self.while_loops.iter().any(|w| w.wend_node == id) => {}
            // Edges that need every fall-through resolved first
            StatementKind::Return | StatementKind::Resume { .. } => {}
            _ => self.add_edge(id, next, EdgeKind::Normal),
        }
    }

    fn connect_branch(
        &mut self,
        id: NodeId,
        branch: Option<&Branch>,
        ids: &[NodeId],
        next: NodeId,
        kind: EdgeKind,
    ) {
        match branch {
            Some(Branch::Line(line)) => {
                let to = self.target(*line);
                self.add_edge(id, to, kind);
            }
            Some(Branch::Statements(_)) if !ids.is_empty() => {
                self.add_edge(id, ids[0], kind);
                self.connect_list(ids, next);
            }
            _ => self.add_edge(id, next, kind),
        }
    }

    fn connect_deferred(&mut self) {
        for region in self.for_loops.clone() {
            let body = self.fallthrough[region.for_node];
            self.add_edge(region.next_node, body, EdgeKind::LoopBack);
            let runs = self.nodes[region.for_node]
                .statement
                .is_some_and(always_iterates);
            if !runs {
                let after = self.fallthrough[region.next_node];
                self.add_edge(region.for_node, after, EdgeKind::LoopSkip);
            }
        }

        for region in self.while_loops.clone() {
            let after = self.fallthrough[region.wend_node];
            self.add_edge(region.while_node, after, EdgeKind::LoopExit);
            self.add_edge(region.wend_node, region.while_node, EdgeKind::LoopBack);
        }

        let returns: Vec<NodeId> = self.return_points.iter().copied().collect();
        let resumes: Vec<NodeId> = self.resume_points.iter().copied().collect();
        for id in 2..self.nodes.len() {
            let (targets, kind) = match self.nodes[id].statement.map(|s| &s.kind) {
                Some(StatementKind::Return) => (&returns, EdgeKind::Return),
                Some(StatementKind::Resume {
                    target: ResumeTarget::Retry | ResumeTarget::Next,
                }) => (&resumes, EdgeKind::Resume),
                _ => continue,
            };
            if targets.is_empty() {
                self.add_edge(id, EXIT, kind);
            }
            for &to in targets {
                self.add_edge(id, to, kind);
            }
        }
    }

    fn compute_reachability(&mut self) {
        self.reachable = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([ENTRY]);
        self.reachable[ENTRY] = true;
        while let Some(id) = queue.pop_front() {
            for &(succ, _) in &self.nodes[id].successors {
                if !self.reachable[succ] {
                    self.reachable[succ] = true;
                    queue.push_back(succ);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 2
    }

    pub fn node(&self, id: NodeId) -> &CfgNode<'p> {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[CfgNode<'p>] {
        &self.nodes
    }

    /// Statement nodes in pre-order, skipping entry and exit
    pub fn statement_nodes(&self) -> impl Iterator<Item = (&CfgNode<'p>, &'p Statement)> + '_ {
        self.nodes
            .iter()
            .filter_map(|node| node.statement.map(|stmt| (node, stmt)))
    }

    /// First node executed when control reaches `line`, `None` if the line does not exist
    pub fn line_entry(&self, line: LineNumber) -> Option<NodeId> {
        self.line_entries.get(&line).copied()
    }

    /// Where control goes when the statement completes normally
    pub fn fallthrough(&self, id: NodeId) -> NodeId {
        self.fallthrough.get(id).copied().unwrap_or(EXIT)
    }

    pub fn is_reachable(&self, id: NodeId) -> bool {
        self.reachable.get(id).copied().unwrap_or(false)
    }

    /// Loops closed by a `NEXT` node, innermost first
    pub fn loops_closed_by(&self, next_node: NodeId) -> impl Iterator<Item = &ForLoopRegion> + '_ {
        self.loops_closed_by
            .get(&next_node)
            .into_iter()
            .flatten()
            .map(|&index| &self.for_loops[index])
    }

    pub fn for_loop_at(&self, for_node: NodeId) -> Option<&ForLoopRegion> {
        self.for_loops.iter().find(|r| r.for_node == for_node)
    }

    /// Every `FOR` region whose body holds `node`
    pub fn loops_containing(&self, node: NodeId) -> impl Iterator<Item = &ForLoopRegion> + '_ {
        self.for_loops.iter().filter(move |r| r.contains(node))
    }

    pub fn in_any_loop(&self, node: NodeId) -> bool {
        self.loops_containing(node).next().is_some()
            || self
                .while_loops
                .iter()
                .any(|w| node > w.while_node && node <= w.wend_node)
    }
}

/// True if a `FOR` with literal bounds runs its body at least once
fn always_iterates(stmt: &Statement) -> bool {
    let StatementKind::For {
        start, end, step, ..
    } = &stmt.kind
    else {
        return false;
    };
    let value = |e: &parser::Expr| evaluate_constant(e).and_then(|v| v.as_number());
    let step = match step {
        Some(step) => value(step),
        None => Some(1.0),
    };
    match (value(start), value(end), step) {
        (Some(start), Some(end), Some(step)) if step > 0.0 => start <= end,
        (Some(start), Some(end), Some(step)) if step < 0.0 => start >= end,
        (Some(_), Some(_), Some(_)) => true,
        _ => false,
    }
}

impl fmt::Display for ControlFlowGraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            let label = match node.statement {
                Some(stmt) => format!("line {} {}", node.line, stmt.keyword()),
                None if node.id == ENTRY => "entry".to_string(),
                None => "exit".to_string(),
            };
            let succs: Vec<String> = node
                .successors
                .iter()
                .map(|(to, kind)| format!("n{} ({:?})", to, kind))
                .collect();
            writeln!(f, "n{} [{}] -> {}", node.id, label, succs.join(", "))?;
        }
        Ok(())
    }
}
