//! Value ranges learned from `IF` conditions
//!
//! Inside the `THEN` arm of `IF X > 5` the analyzer knows `X > 5`; inside the
//! `ELSE` arm it knows `X <= 5`. Facts from enclosing arms intersect, and an
//! assignment to the variable later in the same arm drops its fact.

use crate::logging;
use crate::optimization::constant_folding::evaluate_constant;
use crate::pass_manager::{AnalysisContext, AnalysisPass, PassResult};
use fxhash::FxHashMap;
use parser::{format_number, BinaryOp, Branch, Expr, ExprKind, LValue, LineNumber, Program, Statement, StatementKind, UnaryOp};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ValueRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_exclusive: bool,
    pub max_exclusive: bool,
}

impl ValueRange {
    pub fn exactly(value: f64) -> Self {
        Self {
            min: Some(value),
            max: Some(value),
            ..Self::default()
        }
    }

    pub fn above(value: f64, exclusive: bool) -> Self {
        Self {
            min: Some(value),
            min_exclusive: exclusive,
            ..Self::default()
        }
    }

    pub fn below(value: f64, exclusive: bool) -> Self {
        Self {
            max: Some(value),
            max_exclusive: exclusive,
            ..Self::default()
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!((self.min, self.max), (Some(lo), Some(hi)) if lo == hi && !self.min_exclusive && !self.max_exclusive)
    }

    /// No value satisfies both bounds
    pub fn is_empty(&self) -> bool {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => lo > hi || (lo == hi && (self.min_exclusive || self.max_exclusive)),
            _ => false,
        }
    }

    pub fn intersect(&self, other: &ValueRange) -> ValueRange {
        let (min, min_exclusive) = match (self.min, other.min) {
            (Some(a), Some(b)) if a == b => (Some(a), self.min_exclusive || other.min_exclusive),
            (Some(a), Some(b)) if a > b => (Some(a), self.min_exclusive),
            (Some(_), Some(b)) => (Some(b), other.min_exclusive),
            (Some(a), None) => (Some(a), self.min_exclusive),
            (None, b) => (b, other.min_exclusive),
        };
        let (max, max_exclusive) = match (self.max, other.max) {
            (Some(a), Some(b)) if a == b => (Some(a), self.max_exclusive || other.max_exclusive),
            (Some(a), Some(b)) if a < b => (Some(a), self.max_exclusive),
            (Some(_), Some(b)) => (Some(b), other.max_exclusive),
            (Some(a), None) => (Some(a), self.max_exclusive),
            (None, b) => (b, other.max_exclusive),
        };
        ValueRange {
            min,
            max,
            min_exclusive,
            max_exclusive,
        }
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_constant() {
            if let Some(v) = self.min {
                return write!(f, "= {}", format_number(v));
            }
        }
        let open = if self.min_exclusive { '(' } else { '[' };
        let close = if self.max_exclusive { ')' } else { ']' };
        let lo = self.min.map_or("-inf".to_string(), format_number);
        let hi = self.max.map_or("+inf".to_string(), format_number);
        let open = if self.min.is_none() { '(' } else { open };
        let close = if self.max.is_none() { ')' } else { close };
        write!(f, "in {}{}, {}{}", open, lo, hi, close)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeInfo {
    pub variable: String,
    pub line: LineNumber,
    /// e.g. "THEN branch of line 20"
    pub context: String,
    pub range: ValueRange,
    pub enabled_optimization: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Arm {
    Then,
    Else,
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arm::Then => write!(f, "THEN"),
            Arm::Else => write!(f, "ELSE"),
        }
    }
}

/// `V op c` with the variable on the left, or `None`
fn comparison(op: BinaryOp, left: &Expr, right: &Expr) -> Option<(String, BinaryOp, f64)> {
    let constant = |e: &Expr| evaluate_constant(e).and_then(|v| v.as_number());
    match (&left.kind, &right.kind) {
        (ExprKind::Variable(id), _) => constant(right).map(|c| (id.key.clone(), op, c)),
        (_, ExprKind::Variable(id)) => {
            let op = op.swapped()?;
            constant(left).map(|c| (id.key.clone(), op, c))
        }
        _ => None,
    }
}

/// Facts that hold when `cond` evaluates to `holds`
pub fn constraints(cond: &Expr, holds: bool) -> Vec<(String, ValueRange)> {
    match &cond.kind {
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => constraints(operand, !holds),
        ExprKind::Binary { op, left, right } if op.is_relational() => {
            let Some((var, op, c)) = comparison(*op, left, right) else {
                return Vec::new();
            };
            let op = if holds { Some(op) } else { op.inverted() };
            let range = match op {
                Some(BinaryOp::Eq) => ValueRange::exactly(c),
                Some(BinaryOp::Lt) => ValueRange::below(c, true),
                Some(BinaryOp::Le) => ValueRange::below(c, false),
                Some(BinaryOp::Gt) => ValueRange::above(c, true),
                Some(BinaryOp::Ge) => ValueRange::above(c, false),
                _ => return Vec::new(),
            };
            vec![(var, range)]
        }
        // Both sides hold when AND is true, neither holds when OR is false
        ExprKind::Binary {
            op: BinaryOp::And,
            left,
            right,
        } if holds => {
            let mut facts = constraints(left, true);
            facts.extend(constraints(right, true));
            facts
        }
        ExprKind::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } if !holds => {
            let mut facts = constraints(left, false);
            facts.extend(constraints(right, false));
            facts
        }
        _ => Vec::new(),
    }
}

type Facts = FxHashMap<String, ValueRange>;

fn scalar(target: &LValue) -> Option<&str> {
    match target {
        LValue::Scalar(id) => Some(id.key.as_str()),
        LValue::Element { .. } => None,
    }
}

fn assigned_scalars(stmt: &Statement) -> Vec<&str> {
    match &stmt.kind {
        StatementKind::Let { target, .. } | StatementKind::LineInput { target, .. } => {
            scalar(target).into_iter().collect()
        }
        StatementKind::Input { targets, .. } | StatementKind::Read { targets } => {
            targets.iter().filter_map(scalar).collect()
        }
        StatementKind::Swap { left, right } => scalar(left).into_iter().chain(scalar(right)).collect(),
        StatementKind::For { var, .. } => vec![var.key.as_str()],
        StatementKind::Next { vars } => vars.iter().map(|v| v.key.as_str()).collect(),
        _ => Vec::new(),
    }
}

#[derive(Default)]
struct RangeCollector {
    found: Vec<RangeInfo>,
}

impl RangeCollector {
    fn statement(&mut self, stmt: &Statement, facts: &Facts) {
        let StatementKind::If {
            condition,
            then_branch,
            else_branch,
        } = &stmt.kind
        else {
            return;
        };
        self.arm(stmt.line, condition, then_branch, Arm::Then, facts);
        if let Some(else_branch) = else_branch {
            self.arm(stmt.line, condition, else_branch, Arm::Else, facts);
        }
    }

    fn arm(&mut self, line: LineNumber, condition: &Expr, branch: &Branch, arm: Arm, outer: &Facts) {
        let Branch::Statements(statements) = branch else {
            return;
        };
        let mut facts = outer.clone();
        for (var, range) in constraints(condition, arm == Arm::Then) {
            let range = match facts.get(&var) {
                Some(known) => known.intersect(&range),
                None => range,
            };
            if range.is_empty() {
                let _line = logging::at_line(line);
                log::debug!("{} arm is unreachable for {}", arm, var);
            }
            let enabled_optimization = range
                .is_constant()
                .then(|| range.min.map(|v| format!("Constant propagation: {} = {}", var, format_number(v))))
                .flatten();
            self.found.push(RangeInfo {
                variable: var.clone(),
                line,
                context: format!("{} branch of line {}", arm, line),
                range,
                enabled_optimization,
            });
            facts.insert(var, range);
        }

        for stmt in statements {
            self.statement(stmt, &facts);
            for var in assigned_scalars(stmt) {
                facts.remove(var);
            }
        }
    }
}

pub fn find_value_ranges(program: &Program) -> Vec<RangeInfo> {
    let mut collector = RangeCollector::default();
    let empty = Facts::default();
    for stmt in program.statements() {
        collector.statement(stmt, &empty);
    }
    collector.found
}

pub struct ValueRangePass;

impl ValueRangePass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ValueRangePass {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPass for ValueRangePass {
    fn name(&self) -> &'static str {
        "value-range"
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        let found = find_value_ranges(ctx.program);
        let constants = found.iter().filter(|r| r.enabled_optimization.is_some()).count();
        let count = found.len();
        ctx.findings.range_info = found;
        PassResult::with_findings(count).with_stat("constant-propagations", constants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::parse_program;

    fn ranges(source: &str) -> Vec<RangeInfo> {
        find_value_ranges(&parse_program(source).unwrap())
    }

    #[test]
    fn test_then_and_else_ranges() {
        let found = ranges("10 INPUT X\n20 IF X > 5 THEN PRINT 1 ELSE PRINT 2\n");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].context, "THEN branch of line 20");
        assert_eq!(found[0].range, ValueRange::above(5.0, true));
        assert_eq!(found[1].context, "ELSE branch of line 20");
        assert_eq!(found[1].range, ValueRange::below(5.0, false));
    }

    #[test]
    fn test_reversed_operands_and_not_equal() {
        let found = ranges("10 IF 10 < X THEN PRINT X\n");
        assert_eq!(found[0].range, ValueRange::above(10.0, true));

        assert!(ranges("10 IF X <> 5 THEN PRINT X\n").is_empty());
        let found = ranges("10 IF X <> 5 THEN PRINT 1 ELSE PRINT X\n");
        assert!(found[0].range.is_constant());
    }

    #[test]
    fn test_equality_enables_constant_propagation() {
        let found = ranges("10 INPUT X\n20 IF X = 10 THEN Y = X + 5\n");
        assert_eq!(
            found[0].enabled_optimization.as_deref(),
            Some("Constant propagation: X = 10")
        );
    }

    #[test]
    fn test_nested_conditions_intersect() {
        let found = ranges("10 IF X > 10 THEN IF X < 20 THEN PRINT X\n");
        assert_eq!(found.len(), 2);
        let inner = &found[1].range;
        assert_eq!((inner.min, inner.max), (Some(10.0), Some(20.0)));
        assert!(inner.min_exclusive && inner.max_exclusive);
        assert_eq!(inner.to_string(), "in (10, 20)");
    }

    #[test]
    fn test_conjunctions_and_reassignment() {
        let found = ranges("10 IF X >= 1 AND Y <= 9 THEN PRINT X\n");
        assert_eq!(found.len(), 2);
        assert!(ranges("10 IF X >= 1 OR Y <= 9 THEN PRINT X\n").is_empty());

        let found = ranges("10 IF X > 5 THEN X = 0 : IF X < 3 THEN PRINT X\n");
        assert_eq!(found[1].range, ValueRange::below(3.0, true));
    }

    #[test]
    fn test_arrays_never_get_ranges() {
        assert!(ranges("10 IF A(1) > 5 THEN PRINT 1\n").is_empty());
    }
}
