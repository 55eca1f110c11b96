//! Algebraic simplification
//!
//! Expressions are rewritten bottom-up, so a rewrite that exposes another
//! pattern is seen on the way back up and recorded as its own step. Literal
//! subtrees are folded without a record; constant folding already reports
//! them.
//!
//! Boolean identities only fire on constant `0` / `-1` operands or on two
//! textually identical pure operands. A variable never stands in for a
//! boolean constant, even when it provably holds one.

use crate::logging;
use crate::optimization::constant_folding::{apply_binary, apply_unary, evaluate_constant};
use crate::pass_manager::{AnalysisContext, AnalysisPass, PassResult};
use crate::pipeline::AnalyzerConfig;
use crate::symbols::serialize_display;
use parser::{walk_program, BinaryOp, Expr, ExprKind, LineNumber, UnaryOp, Visitor};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReductionKind {
    MultiplyToAdd,
    EliminateMultiply,
    MultiplyIdentity,
    MultiplyToShift,
    DivideIdentity,
    DivideToShift,
    AddIdentity,
    SubtractIdentity,
    SelfSubtract,
    PowerZero,
    PowerIdentity,
    PowerToMultiply,
    BooleanIdentity,
    BooleanConstant,
    DoubleNegation,
    ConstantNot,
    DoubleNegate,
    NegateZero,
    RelationalInversion,
    DeMorgan,
    Absorption,
}

impl ReductionKind {
    /// Rough cost difference, for the report
    pub fn savings(self) -> &'static str {
        match self {
            ReductionKind::MultiplyToAdd => "1 multiply replaced by 1 add",
            ReductionKind::EliminateMultiply => "1 multiply eliminated",
            ReductionKind::MultiplyIdentity => "1 multiply eliminated",
            ReductionKind::MultiplyToShift => "multiply by power of 2 can use shift",
            ReductionKind::DivideIdentity => "1 division eliminated",
            ReductionKind::DivideToShift => "integer division by power of 2 can use shift",
            ReductionKind::AddIdentity | ReductionKind::SubtractIdentity => "1 add eliminated",
            ReductionKind::SelfSubtract => "1 subtraction eliminated",
            ReductionKind::PowerZero | ReductionKind::PowerIdentity => "1 exponentiation eliminated",
            ReductionKind::PowerToMultiply => "exponentiation replaced by multiplication",
            ReductionKind::BooleanIdentity | ReductionKind::BooleanConstant => {
                "1 logical operation eliminated"
            }
            ReductionKind::DoubleNegation | ReductionKind::DoubleNegate => "2 negations eliminated",
            ReductionKind::ConstantNot | ReductionKind::NegateZero => "1 negation eliminated",
            ReductionKind::RelationalInversion => "NOT eliminated",
            ReductionKind::DeMorgan => "NOT pushed into operands",
            ReductionKind::Absorption => "2 logical operations eliminated",
        }
    }
}

impl fmt::Display for ReductionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReductionKind::MultiplyToAdd => "multiply→add",
            ReductionKind::EliminateMultiply => "eliminate multiply",
            ReductionKind::MultiplyIdentity => "multiply identity",
            ReductionKind::MultiplyToShift => "multiply→shift",
            ReductionKind::DivideIdentity => "divide identity",
            ReductionKind::DivideToShift => "divide→shift",
            ReductionKind::AddIdentity => "add identity",
            ReductionKind::SubtractIdentity => "subtract identity",
            ReductionKind::SelfSubtract => "self subtraction",
            ReductionKind::PowerZero => "power zero",
            ReductionKind::PowerIdentity => "power identity",
            ReductionKind::PowerToMultiply => "power→multiply",
            ReductionKind::BooleanIdentity => "boolean identity",
            ReductionKind::BooleanConstant => "boolean constant",
            ReductionKind::DoubleNegation => "double negation",
            ReductionKind::ConstantNot => "constant NOT",
            ReductionKind::DoubleNegate => "double negate",
            ReductionKind::NegateZero => "negate zero",
            ReductionKind::RelationalInversion => "relational inversion",
            ReductionKind::DeMorgan => "De Morgan",
            ReductionKind::Absorption => "absorption",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrengthReduction {
    pub line: LineNumber,
    pub original_expr: String,
    pub reduced_expr: String,
    #[serde(serialize_with = "serialize_display")]
    pub kind: ReductionKind,
    pub savings: String,
}

/// Rewrites one expression tree, collecting a record per rewrite
pub struct StrengthReducer {
    boolean: bool,
    records: Vec<StrengthReduction>,
}

impl StrengthReducer {
    pub fn new(boolean: bool) -> Self {
        Self {
            boolean,
            records: Vec::new(),
        }
    }

    pub fn into_records(self) -> Vec<StrengthReduction> {
        self.records
    }

    pub fn reduce(&mut self, expr: &Expr) -> Expr {
        match &expr.kind {
            ExprKind::Unary { op, .. } => self.reduce_unary_chain(expr, *op),
            ExprKind::Binary { op, left, right } => {
                let left = self.reduce(left);
                let right = self.reduce(right);
                if let (Some(a), Some(b)) = (evaluate_constant(&left), evaluate_constant(&right)) {
                    if let Some(value) = apply_binary(*op, &a, &b) {
                        return value.to_expr(expr.line);
                    }
                }
                self.rewrite_binary(binary(*op, left, right, expr.line))
            }
            ExprKind::ArrayElement { name, indices } => Expr::new(
                ExprKind::ArrayElement {
                    name: name.clone(),
                    indices: indices.iter().map(|i| self.reduce(i)).collect(),
                },
                expr.line,
            ),
            ExprKind::Builtin { name, args } => {
                let rebuilt = Expr::new(
                    ExprKind::Builtin {
                        name: name.clone(),
                        args: args.iter().map(|a| self.reduce(a)).collect(),
                    },
                    expr.line,
                );
                match evaluate_constant(&rebuilt) {
                    Some(value) => value.to_expr(expr.line),
                    None => rebuilt,
                }
            }
            ExprKind::FnCall { name, args } => Expr::new(
                ExprKind::FnCall {
                    name: name.clone(),
                    args: args.iter().map(|a| self.reduce(a)).collect(),
                },
                expr.line,
            ),
            ExprKind::Number { .. } | ExprKind::Str(_) | ExprKind::Variable(_) => expr.clone(),
        }
    }

    fn record(&mut self, line: LineNumber, before: &Expr, after: impl fmt::Display, kind: ReductionKind) {
        let _line = logging::at_line(line);
        log::trace!("{} -> {} ({})", before, after, kind);
        self.records.push(StrengthReduction {
            line,
            original_expr: before.to_string(),
            reduced_expr: after.to_string(),
            kind,
            savings: kind.savings().to_string(),
        });
    }

    /// `NOT NOT ... X` and `- - ... X`: one record per adjacent pair
    fn reduce_unary_chain(&mut self, expr: &Expr, op: UnaryOp) -> Expr {
        let mut depth = 0;
        let mut inner = expr;
        while let ExprKind::Unary { op: inner_op, operand } = &inner.kind {
            if *inner_op != op {
                break;
            }
            depth += 1;
            inner = operand;
        }

        let base = self.reduce(inner);
        let kind = match op {
            UnaryOp::Not => ReductionKind::DoubleNegation,
            UnaryOp::Neg => ReductionKind::DoubleNegate,
        };
        for level in (2..=depth).rev() {
            let before = wrap(op, level, &base);
            let after = wrap(op, level - 2, &base);
            self.record(expr.line, &before, &after, kind);
        }

        if depth % 2 == 0 {
            base
        } else {
            self.simplify_unary(op, base, expr.line)
        }
    }

    /// Rules for a single unary operator over an already reduced operand
    fn simplify_unary(&mut self, op: UnaryOp, operand: Expr, line: LineNumber) -> Expr {
        let constant = constant_of(&operand);
        let before = Expr::unary(op, operand.clone());

        match (op, constant) {
            (UnaryOp::Neg, Some(v)) if v == 0.0 => {
                self.record(line, &before, "0", ReductionKind::NegateZero);
                return Expr::number(0.0, line);
            }
            (UnaryOp::Not, Some(v)) if v == 0.0 => {
                self.record(line, &before, "-1", ReductionKind::ConstantNot);
                return Expr::number(-1.0, line);
            }
            (UnaryOp::Not, Some(v)) if v == -1.0 => {
                self.record(line, &before, "0", ReductionKind::ConstantNot);
                return Expr::number(0.0, line);
            }
            (_, Some(v)) => {
                return match apply_unary(op, v) {
                    Some(folded) => Expr::number(folded, line),
                    None => before,
                };
            }
            _ => {}
        }

        if op != UnaryOp::Not || !self.boolean {
            return before;
        }

        let ExprKind::Binary {
            op: inner,
            left,
            right,
        } = &operand.kind
        else {
            return before;
        };

        if let Some(inverted) = inner.inverted() {
            let after = binary(inverted, (**left).clone(), (**right).clone(), line);
            self.record(line, &before, &after, ReductionKind::RelationalInversion);
            return after;
        }

        let dual = match inner {
            BinaryOp::And => BinaryOp::Or,
            BinaryOp::Or => BinaryOp::And,
            _ => return before,
        };
        let slot = self.records.len();
        let left = self.simplify_unary(UnaryOp::Not, (**left).clone(), line);
        let right = self.simplify_unary(UnaryOp::Not, (**right).clone(), line);
        let after = binary(dual, left, right, line);
        self.record(line, &before, &after, ReductionKind::DeMorgan);
        // Keep the De Morgan step ahead of the rewrites it exposed
        if let Some(rec) = self.records.pop() {
            self.records.insert(slot, rec);
        }
        after
    }

    fn rewrite_binary(&mut self, expr: Expr) -> Expr {
        let ExprKind::Binary { op, left, right } = &expr.kind else {
            return expr;
        };
        let (op, line) = (*op, expr.line);
        let lc = constant_of(left);
        let rc = constant_of(right);
        let same = is_pure(left) && is_pure(right) && left.normalized_key() == right.normalized_key();
        let is = |c: Option<f64>, v: f64| c == Some(v);

        let (after, kind) = match op {
            BinaryOp::Mul if is(rc, 0.0) && is_pure(left) => (zero(line), ReductionKind::EliminateMultiply),
            BinaryOp::Mul if is(lc, 0.0) && is_pure(right) => (zero(line), ReductionKind::EliminateMultiply),
            BinaryOp::Mul if is(rc, 1.0) => ((**left).clone(), ReductionKind::MultiplyIdentity),
            BinaryOp::Mul if is(lc, 1.0) => ((**right).clone(), ReductionKind::MultiplyIdentity),
            BinaryOp::Mul if is(rc, 2.0) && is_pure(left) => (
                binary(BinaryOp::Add, (**left).clone(), (**left).clone(), line),
                ReductionKind::MultiplyToAdd,
            ),
            BinaryOp::Mul if is(lc, 2.0) && is_pure(right) => (
                binary(BinaryOp::Add, (**right).clone(), (**right).clone(), line),
                ReductionKind::MultiplyToAdd,
            ),
            BinaryOp::Mul => {
                let shift = rc
                    .and_then(shift_amount)
                    .map(|n| (left, n))
                    .or_else(|| lc.and_then(shift_amount).map(|n| (right, n)));
                if let Some((operand, n)) = shift.filter(|&(_, n)| n > 1) {
                    let note = format!("{} << {}", operand, n);
                    self.record(line, &expr, note, ReductionKind::MultiplyToShift);
                }
                return expr;
            }
            BinaryOp::Div | BinaryOp::IntDiv if is(rc, 1.0) => {
                ((**left).clone(), ReductionKind::DivideIdentity)
            }
            BinaryOp::IntDiv => {
                if let Some(n) = rc.and_then(shift_amount).filter(|&n| n >= 1) {
                    let note = format!("{} >> {}", left, n);
                    self.record(line, &expr, note, ReductionKind::DivideToShift);
                }
                return expr;
            }
            BinaryOp::Add if is(rc, 0.0) => ((**left).clone(), ReductionKind::AddIdentity),
            BinaryOp::Add if is(lc, 0.0) => ((**right).clone(), ReductionKind::AddIdentity),
            BinaryOp::Sub if is(rc, 0.0) => ((**left).clone(), ReductionKind::SubtractIdentity),
            BinaryOp::Sub if same => (zero(line), ReductionKind::SelfSubtract),
            BinaryOp::Pow if is(rc, 0.0) && is_pure(left) => {
                (Expr::number(1.0, line), ReductionKind::PowerZero)
            }
            BinaryOp::Pow if is(rc, 1.0) => ((**left).clone(), ReductionKind::PowerIdentity),
            BinaryOp::Pow if is_pure(left) && matches!(rc, Some(n) if n == 2.0 || n == 3.0 || n == 4.0) => {
                let times = rc.map(|n| n as usize).unwrap_or(2);
                let product = (1..times).fold((**left).clone(), |acc, _| {
                    binary(BinaryOp::Mul, acc, (**left).clone(), line)
                });
                (product, ReductionKind::PowerToMultiply)
            }
            BinaryOp::And if (is(rc, 0.0) && is_pure(left)) || (is(lc, 0.0) && is_pure(right)) => {
                (zero(line), ReductionKind::BooleanConstant)
            }
            BinaryOp::And if is(rc, -1.0) => ((**left).clone(), ReductionKind::BooleanIdentity),
            BinaryOp::And if is(lc, -1.0) => ((**right).clone(), ReductionKind::BooleanIdentity),
            BinaryOp::Or if (is(rc, -1.0) && is_pure(left)) || (is(lc, -1.0) && is_pure(right)) => {
                (Expr::number(-1.0, line), ReductionKind::BooleanConstant)
            }
            BinaryOp::Or if is(rc, 0.0) => ((**left).clone(), ReductionKind::BooleanIdentity),
            BinaryOp::Or if is(lc, 0.0) => ((**right).clone(), ReductionKind::BooleanIdentity),
            BinaryOp::And | BinaryOp::Or if same => ((**left).clone(), ReductionKind::BooleanIdentity),
            BinaryOp::And | BinaryOp::Or if self.boolean => match absorb(op, left, right) {
                Some(kept) => (kept.clone(), ReductionKind::Absorption),
                None => return expr,
            },
            BinaryOp::Xor if is(rc, 0.0) => ((**left).clone(), ReductionKind::BooleanIdentity),
            BinaryOp::Xor if is(lc, 0.0) => ((**right).clone(), ReductionKind::BooleanIdentity),
            BinaryOp::Xor if same => (zero(line), ReductionKind::BooleanConstant),
            _ => return expr,
        };

        self.record(line, &expr, &after, kind);
        after
    }
}

/// `(A AND B) OR A`, `A OR (A AND B)` and their duals reduce to `A`
fn absorb<'e>(op: BinaryOp, left: &'e Expr, right: &'e Expr) -> Option<&'e Expr> {
    let dual = match op {
        BinaryOp::Or => BinaryOp::And,
        BinaryOp::And => BinaryOp::Or,
        _ => return None,
    };
    let absorbs = |compound: &Expr, single: &Expr| match &compound.kind {
        ExprKind::Binary { op: inner, left, right } if *inner == dual => {
            let key = single.normalized_key();
            is_pure(compound) && (left.normalized_key() == key || right.normalized_key() == key)
        }
        _ => false,
    };
    if !is_pure(left) || !is_pure(right) {
        return None;
    }
    if absorbs(left, right) {
        Some(right)
    } else if absorbs(right, left) {
        Some(left)
    } else {
        None
    }
}

fn constant_of(expr: &Expr) -> Option<f64> {
    evaluate_constant(expr).and_then(|v| v.as_number())
}

fn is_pure(expr: &Expr) -> bool {
    !expr.has_side_effects()
}

/// `n` when `value == 2^n`
fn shift_amount(value: f64) -> Option<u32> {
    if value < 1.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return None;
    }
    let v = value as u64;
    v.is_power_of_two().then(|| v.trailing_zeros())
}

fn zero(line: LineNumber) -> Expr {
    Expr::number(0.0, line)
}

fn binary(op: BinaryOp, left: Expr, right: Expr, line: LineNumber) -> Expr {
    let mut expr = Expr::binary(op, left, right);
    expr.line = line;
    expr
}

fn wrap(op: UnaryOp, times: usize, base: &Expr) -> Expr {
    (0..times).fold(base.clone(), |acc, _| Expr::unary(op, acc))
}

/// Reduce one expression with a fresh reducer
pub fn reduce_expression(expr: &Expr, boolean: bool) -> (Expr, Vec<StrengthReduction>) {
    let mut reducer = StrengthReducer::new(boolean);
    let reduced = reducer.reduce(expr);
    (reduced, reducer.into_records())
}

pub struct StrengthReductionPass {
    boolean: bool,
    records: Vec<StrengthReduction>,
}

impl StrengthReductionPass {
    pub fn new() -> Self {
        Self {
            boolean: true,
            records: Vec::new(),
        }
    }
}

impl Default for StrengthReductionPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for StrengthReductionPass {
    // Each root is reduced as a whole; the reducer does its own descent
    fn visit_expr(&mut self, expr: &Expr) {
        let (_, mut records) = reduce_expression(expr, self.boolean);
        self.records.append(&mut records);
    }
}

impl AnalysisPass for StrengthReductionPass {
    fn name(&self) -> &'static str {
        "strength-reduction"
    }

    fn is_enabled(&self, config: &AnalyzerConfig) -> bool {
        config.enable_strength_reduction
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        self.records.clear();
        self.boolean = ctx.config.enable_boolean_simplification;
        walk_program(self, ctx.program);
        let count = self.records.len();
        ctx.findings.strength_reductions.append(&mut self.records);
        PassResult::with_findings(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::variable(name, 10)
    }

    fn num(v: f64) -> Expr {
        Expr::number(v, 10)
    }

    fn kinds(expr: &Expr) -> Vec<ReductionKind> {
        reduce_expression(expr, true).1.iter().map(|r| r.kind).collect()
    }

    #[test]
    fn test_multiply_by_two_becomes_add() {
        let (reduced, records) = reduce_expression(&Expr::binary(BinaryOp::Mul, var("A"), num(2.0)), true);
        assert_eq!(reduced.to_string(), "A + A");
        assert_eq!(records[0].kind.to_string(), "multiply→add");
        assert_eq!(records[0].original_expr, "A * 2");
    }

    #[test]
    fn test_shift_candidates_are_detected_not_rewritten() {
        let expr = Expr::binary(BinaryOp::Mul, var("A"), num(8.0));
        let (reduced, records) = reduce_expression(&expr, true);
        assert_eq!(reduced, expr);
        assert_eq!(records[0].kind, ReductionKind::MultiplyToShift);
        assert_eq!(records[0].reduced_expr, "A << 3");

        assert_eq!(kinds(&Expr::binary(BinaryOp::IntDiv, var("B"), num(2.0))), vec![ReductionKind::DivideToShift]);
    }

    #[test]
    fn test_nested_not_chains() {
        let two = Expr::unary(UnaryOp::Not, Expr::unary(UnaryOp::Not, var("A")));
        let (reduced, records) = reduce_expression(&two, true);
        assert_eq!(reduced.to_string(), "A");
        assert_eq!(records.len(), 1);

        let three = Expr::unary(UnaryOp::Not, two);
        let (reduced, records) = reduce_expression(&three, true);
        assert_eq!(reduced.to_string(), "NOT A");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.kind == ReductionKind::DoubleNegation));
    }

    #[test]
    fn test_variable_never_acts_as_boolean_constant() {
        let expr = Expr::binary(BinaryOp::And, var("A"), var("FLAG"));
        assert!(kinds(&expr).is_empty());
        let expr = Expr::binary(BinaryOp::And, var("A"), Expr::unary(UnaryOp::Neg, num(1.0)));
        assert_eq!(kinds(&expr), vec![ReductionKind::BooleanIdentity]);
    }

    #[test]
    fn test_chained_identities_each_recorded() {
        // (A AND -1) OR 0
        let inner = Expr::binary(BinaryOp::And, var("A"), Expr::unary(UnaryOp::Neg, num(1.0)));
        let expr = Expr::binary(BinaryOp::Or, inner, num(0.0));
        let (reduced, records) = reduce_expression(&expr, true);
        assert_eq!(reduced.to_string(), "A");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_boolean_rules_respect_switch() {
        let expr = Expr::unary(UnaryOp::Not, Expr::binary(BinaryOp::Gt, var("A"), var("B")));
        let (reduced, records) = reduce_expression(&expr, true);
        assert_eq!(reduced.to_string(), "A <= B");
        assert_eq!(records[0].kind, ReductionKind::RelationalInversion);

        let (reduced, records) = reduce_expression(&expr, false);
        assert_eq!(reduced, expr);
        assert!(records.is_empty());
    }

    #[test]
    fn test_impure_operands_are_kept() {
        let rnd = Expr::new(ExprKind::Builtin { name: "RND".into(), args: vec![num(1.0)] }, 10);
        assert!(kinds(&Expr::binary(BinaryOp::Sub, rnd.clone(), rnd.clone())).is_empty());
        assert!(kinds(&Expr::binary(BinaryOp::Mul, rnd, num(0.0))).is_empty());
    }
}
