//! Whole-program checks that do not depend on dataflow
//!
//! Line references, loop nesting, constructs the compiler rejects, user
//! function calls, required compiler switches, GOSUB nesting depth and code
//! that can never run.

use crate::errors::{SemanticError, SemanticErrorKind};
use crate::pass_manager::{AnalysisContext, AnalysisPass, PassResult};
use crate::semantic_graph::{ControlFlowGraph, EdgeKind, NodeId, StructureIssue, ENTRY};
use crate::symbols::SymbolTable;
use diagnostics::{Diagnostic, DiagnosticBuilder};
use fxhash::{FxHashMap, FxHashSet};
use parser::{
    walk_expr, walk_program, walk_statement, Branch, Expr, ExprKind, LineNumber, Program, ResumeTarget,
    Statement, StatementKind, Visitor,
};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// A compiler switch the program cannot be built without
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredSwitch {
    pub switch: String,
    pub reason: String,
    pub first_line: LineNumber,
}

fn switch_for(stmt: &Statement) -> Option<(&'static str, &'static str)> {
    match &stmt.kind {
        StatementKind::OnErrorGoto { .. } => Some(("/E", "ON ERROR GOTO needs error trapping")),
        StatementKind::Resume {
            target: ResumeTarget::Retry | ResumeTarget::Next,
        } => Some(("/X", "RESUME and RESUME NEXT need statement-level error recovery")),
        StatementKind::Tron | StatementKind::Troff => Some(("/D", "TRON/TROFF need debug line tracing")),
        _ => None,
    }
}

/// Statement-level checks over every statement, including those in `IF` arms
struct ProgramChecker<'a> {
    program: &'a Program,
    symbols: &'a SymbolTable,
    errors: Vec<SemanticError>,
    switches: BTreeMap<&'static str, RequiredSwitch>,
    line: LineNumber,
}

impl ProgramChecker<'_> {
    fn target(&mut self, target: LineNumber, statement: &str) {
        if self.program.line(target).is_none() {
            self.errors.push(SemanticError::new(
                SemanticErrorKind::UndefinedLine {
                    target,
                    statement: statement.to_string(),
                },
                self.line,
            ));
        }
    }

    fn branch(&mut self, branch: &Branch, keyword: &str) {
        if let Branch::Line(target) = branch {
            self.target(*target, keyword);
        }
    }
}

impl Visitor for ProgramChecker<'_> {
    fn visit_statement(&mut self, stmt: &Statement) {
        self.line = stmt.line;
        match &stmt.kind {
            StatementKind::Goto { target } => self.target(*target, "GOTO"),
            StatementKind::Gosub { target } => self.target(*target, "GOSUB"),
            StatementKind::OnGoto { targets, .. } => {
                for &target in targets {
                    self.target(target, "ON GOTO");
                }
            }
            StatementKind::OnGosub { targets, .. } => {
                for &target in targets {
                    self.target(target, "ON GOSUB");
                }
            }
            // `ON ERROR GOTO 0` turns trapping off
            StatementKind::OnErrorGoto { target } if *target != 0 => self.target(*target, "ON ERROR GOTO"),
            StatementKind::Restore { line: Some(target) } => self.target(*target, "RESTORE"),
            StatementKind::Resume {
                target: ResumeTarget::Line(target),
            } => self.target(*target, "RESUME"),
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.branch(then_branch, "THEN");
                if let Some(else_branch) = else_branch {
                    self.branch(else_branch, "ELSE");
                }
            }
            StatementKind::Command { name, .. } => self.errors.push(SemanticError::new(
                SemanticErrorKind::UnsupportedCommand { name: name.clone() },
                stmt.line,
            )),
            StatementKind::Common { .. } | StatementKind::Erase { .. } => self.errors.push(SemanticError::new(
                SemanticErrorKind::UnsupportedStatement {
                    name: stmt.keyword().to_string(),
                },
                stmt.line,
            )),
            _ => {}
        }

        if let Some((switch, reason)) = switch_for(stmt) {
            self.switches.entry(switch).or_insert_with(|| RequiredSwitch {
                switch: switch.to_string(),
                reason: reason.to_string(),
                first_line: stmt.line,
            });
        }

        walk_statement(self, stmt);
        // Nested arms reset the line; restore it for later checks on this statement
        self.line = stmt.line;
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if let ExprKind::FnCall { name, args } = &expr.kind {
            match self.symbols.function(&name.key) {
                None => self.errors.push(SemanticError::new(
                    SemanticErrorKind::UndefinedFunction { name: name.key.clone() },
                    self.line,
                )),
                Some(function) if function.parameters.len() != args.len() => {
                    self.errors.push(SemanticError::new(
                        SemanticErrorKind::FunctionArity {
                            name: name.key.clone(),
                            expected: function.parameters.len(),
                            found: args.len(),
                        },
                        self.line,
                    ))
                }
                Some(_) => {}
            }
        }
        walk_expr(self, expr);
    }
}

fn structure_findings(cfg: &ControlFlowGraph<'_>) -> (Vec<SemanticError>, Vec<Diagnostic>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for issue in &cfg.issues {
        match issue {
            StructureIssue::NextWithoutFor { node } => {
                errors.push(SemanticError::new(SemanticErrorKind::NextWithoutFor, cfg.node(*node).line))
            }
            StructureIssue::NextMismatch { node, expected, found } => errors.push(SemanticError::new(
                SemanticErrorKind::NextMismatch {
                    expected: expected.clone(),
                    found: found.clone(),
                },
                cfg.node(*node).line,
            )),
            StructureIssue::WendWithoutWhile { node } => {
                errors.push(SemanticError::new(SemanticErrorKind::WendWithoutWhile, cfg.node(*node).line))
            }
            StructureIssue::UnclosedFor { node, var } => warnings.push(
                DiagnosticBuilder::warning(format!("FOR {} has no matching NEXT", var))
                    .line(cfg.node(*node).line)
                    .build(),
            ),
            StructureIssue::UnclosedWhile { node } => warnings.push(
                DiagnosticBuilder::warning("WHILE has no matching WEND")
                    .line(cfg.node(*node).line)
                    .build(),
            ),
        }
    }
    (errors, warnings)
}

/// One `GOSUB` edge of the subroutine call graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CallSite {
    line: LineNumber,
    target: LineNumber,
}

enum Visit {
    InProgress,
    Done(usize),
}

/// Static GOSUB nesting, treating every `GOSUB` target line as a subroutine entry
struct CallGraph<'a, 'p> {
    cfg: &'a ControlFlowGraph<'p>,
    calls: FxHashMap<NodeId, Vec<CallSite>>,
    state: FxHashMap<LineNumber, Visit>,
    recursive: Vec<CallSite>,
}

impl<'a, 'p> CallGraph<'a, 'p> {
    fn new(cfg: &'a ControlFlowGraph<'p>) -> Self {
        Self {
            cfg,
            calls: FxHashMap::default(),
            state: FxHashMap::default(),
            recursive: Vec::new(),
        }
    }

    /// `GOSUB`s executed from `start` before its `RETURN`
    fn calls_from(&mut self, start: NodeId) -> Vec<CallSite> {
        if let Some(calls) = self.calls.get(&start) {
            return calls.clone();
        }
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([start]);
        let mut calls = Vec::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.cfg.node(id);
            if matches!(node.statement.map(|s| &s.kind), Some(StatementKind::Return)) {
                continue;
            }
            for &(to, kind) in &node.successors {
                match kind {
                    EdgeKind::Call => {
                        calls.push(CallSite {
                            line: node.line,
                            target: self.cfg.node(to).line,
                        });
                        queue.push_back(self.cfg.fallthrough(id));
                    }
                    EdgeKind::Return => {}
                    _ => queue.push_back(to),
                }
            }
        }
        calls.dedup();
        self.calls.insert(start, calls.clone());
        calls
    }

    fn depth(&mut self, subroutine: LineNumber) -> usize {
        match self.state.get(&subroutine) {
            Some(Visit::Done(depth)) => return *depth,
            Some(Visit::InProgress) => return 0,
            None => {}
        }
        let Some(entry) = self.cfg.line_entry(subroutine) else {
            return 0;
        };
        self.state.insert(subroutine, Visit::InProgress);
        let mut deepest = 0;
        for call in self.calls_from(entry) {
            if matches!(self.state.get(&call.target), Some(Visit::InProgress)) {
                self.recursive.push(call);
                continue;
            }
            deepest = deepest.max(self.depth(call.target));
        }
        let depth = deepest + 1;
        self.state.insert(subroutine, Visit::Done(depth));
        depth
    }
}

fn gosub_findings(cfg: &ControlFlowGraph<'_>, max_depth: usize) -> Vec<Diagnostic> {
    let mut graph = CallGraph::new(cfg);
    let mut warnings = Vec::new();
    let mut deepest: Option<(usize, CallSite)> = None;
    for call in graph.calls_from(ENTRY) {
        let depth = graph.depth(call.target);
        if deepest.map_or(true, |(d, _)| depth > d) {
            deepest = Some((depth, call));
        }
    }
    log::debug!("GOSUB nesting depth {}", deepest.map_or(0, |(d, _)| d));

    graph.recursive.sort_by_key(|c| (c.line, c.target));
    graph.recursive.dedup();
    for call in &graph.recursive {
        warnings.push(
            DiagnosticBuilder::warning(format!("Recursive GOSUB {}", call.target))
                .line(call.line)
                .note(format!("the subroutine at line {} can call itself again before it returns", call.target))
                .help(format!("recursion depth is limited to {} nested GOSUBs", max_depth))
                .build(),
        );
    }
    if let Some((depth, call)) = deepest.filter(|(d, _)| *d > max_depth) {
        warnings.push(
            DiagnosticBuilder::warning(format!(
                "GOSUB nesting depth {} exceeds the limit of {}",
                depth, max_depth
            ))
            .line(call.line)
            .build(),
        );
    }
    warnings
}

fn executable(stmt: &Statement) -> bool {
    !matches!(
        stmt.kind,
        StatementKind::Rem { .. }
            | StatementKind::Data { .. }
            | StatementKind::DefFn { .. }
            | StatementKind::DefType { .. }
            | StatementKind::OptionBase { .. }
    )
}

/// Runs of consecutive program lines that no path from the start reaches
fn unreachable_lines(program: &Program, cfg: &ControlFlowGraph<'_>) -> Vec<Diagnostic> {
    let mut runs: Vec<(LineNumber, LineNumber)> = Vec::new();
    let mut open: Option<(LineNumber, LineNumber)> = None;
    for line in &program.lines {
        let dead = line.statements.iter().any(executable)
            && cfg.line_entry(line.number).map_or(false, |id| !cfg.is_reachable(id));
        open = match (open, dead) {
            (Some((first, _)), true) => Some((first, line.number)),
            (None, true) => Some((line.number, line.number)),
            (Some(run), false) => {
                runs.push(run);
                None
            }
            (None, false) => None,
        };
    }
    runs.extend(open);

    runs.into_iter()
        .map(|(first, last)| {
            let message = if first == last {
                format!("Line {} is unreachable", first)
            } else {
                format!("Lines {}-{} are unreachable", first, last)
            };
            DiagnosticBuilder::warning(message).line(first).build()
        })
        .collect()
}

pub struct ValidationPass;

impl ValidationPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ValidationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPass for ValidationPass {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        let mut checker = ProgramChecker {
            program: ctx.program,
            symbols: &ctx.symbols,
            errors: Vec::new(),
            switches: BTreeMap::new(),
            line: 0,
        };
        walk_program(&mut checker, ctx.program);
        let (structure_errors, structure_warnings) = structure_findings(&ctx.cfg);

        let mut warnings = structure_warnings;
        warnings.extend(gosub_findings(&ctx.cfg, ctx.config.max_gosub_depth));
        warnings.extend(unreachable_lines(ctx.program, &ctx.cfg));

        let mut errors = checker.errors;
        errors.extend(structure_errors);
        errors.sort_by_key(|e| e.line);

        let switches: Vec<RequiredSwitch> = checker.switches.into_values().collect();
        let count = errors.len() + warnings.len();
        let result = PassResult::with_findings(count)
            .with_stat("errors", errors.len())
            .with_stat("switches", switches.len());

        ctx.errors.extend(errors);
        ctx.warnings.extend(warnings);
        ctx.findings.required_switches = switches;
        result
    }
}
