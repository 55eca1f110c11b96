//! Integer width inference for scalars
//!
//! A flow-insensitive interval analysis: every scalar's range is the hull of
//! the values of all its reachable assignments, iterated to a fixpoint. A
//! variable assigned from input, a string, a fractional value or anything
//! without a static bound is dropped. Ranges that keep growing past the
//! iteration limit are dropped as well.

use crate::pass_manager::{AnalysisContext, AnalysisPass, PassResult};
use crate::pipeline::AnalyzerConfig;
use crate::semantic_graph::ControlFlowGraph;
use crate::symbols::SymbolTable;
use fxhash::FxHashMap;
use parser::{BinaryOp, Expr, ExprKind, LValue, StatementKind, UnaryOp};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum IntegerWidth {
    UInt8,
    Int8,
    UInt16,
    Int16,
    Int32,
}

impl IntegerWidth {
    /// Narrowest class holding `[min, max]`
    pub fn for_range(min: i64, max: i64) -> Option<Self> {
        let fits = |lo: i64, hi: i64| min >= lo && max <= hi;
        if fits(0, 255) {
            Some(IntegerWidth::UInt8)
        } else if fits(-128, 127) {
            Some(IntegerWidth::Int8)
        } else if fits(0, 65_535) {
            Some(IntegerWidth::UInt16)
        } else if fits(-32_768, 32_767) {
            Some(IntegerWidth::Int16)
        } else if fits(i32::MIN as i64, i32::MAX as i64) {
            Some(IntegerWidth::Int32)
        } else {
            None
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            IntegerWidth::UInt8 | IntegerWidth::Int8 => 8,
            IntegerWidth::UInt16 | IntegerWidth::Int16 => 16,
            IntegerWidth::Int32 => 32,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IntegerWidth::Int8 | IntegerWidth::Int16 | IntegerWidth::Int32)
    }
}

impl fmt::Display for IntegerWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_signed() { "signed" } else { "unsigned" };
        write!(f, "{}-bit {}", self.bits(), sign)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegerRange {
    pub variable: String,
    pub min: i64,
    pub max: i64,
    pub width: IntegerWidth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    lo: i64,
    hi: i64,
}

impl Interval {
    const BYTE: Interval = Interval { lo: 0, hi: 255 };
    const WORD: Interval = Interval { lo: -32_768, hi: 32_767 };
    const TRUTH: Interval = Interval { lo: -1, hi: 0 };

    fn point(v: i64) -> Self {
        Interval { lo: v, hi: v }
    }

    fn hull(self, other: Interval) -> Interval {
        Interval {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    fn checked(lo: i64, hi: i64) -> Option<Interval> {
        let limit = i32::MAX as i64 + 1;
        (lo >= -limit && hi <= limit).then_some(Interval { lo, hi })
    }

    fn within(self, outer: Interval) -> bool {
        self.lo >= outer.lo && self.hi <= outer.hi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unassigned,
    Bounded(Interval),
    Unknown,
}

impl State {
    fn join(self, value: Option<Interval>) -> State {
        match (self, value) {
            (State::Unknown, _) | (_, None) => State::Unknown,
            (State::Unassigned, Some(v)) => State::Bounded(v),
            (State::Bounded(a), Some(b)) => State::Bounded(a.hull(b)),
        }
    }
}

/// Builtins whose result always fits in a byte
const BYTE_BUILTINS: &[&str] = &["LEN", "ASC", "PEEK", "INP", "INSTR", "POS", "LPOS", "CSRLIN"];

fn integral(v: f64) -> Option<i64> {
    (v.fract() == 0.0 && v.abs() <= i32::MAX as f64 + 1.0).then_some(v as i64)
}

struct RangeEvaluator<'s> {
    states: &'s FxHashMap<String, State>,
}

impl RangeEvaluator<'_> {
    fn eval(&self, expr: &Expr) -> Option<Interval> {
        match &expr.kind {
            ExprKind::Number { value, .. } => integral(*value).map(Interval::point),
            ExprKind::Variable(id) => match self.states.get(&id.key) {
                // Never assigned: the interpreter reads zero
                None | Some(State::Unassigned) => Some(Interval::point(0)),
                Some(State::Bounded(range)) => Some(*range),
                Some(State::Unknown) => None,
            },
            ExprKind::Builtin { name, args } => self.builtin(name, args),
            ExprKind::Unary { op, operand } => {
                let v = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => Interval::checked(-v.hi, -v.lo),
                    UnaryOp::Not if v.within(Interval::TRUTH) => Some(Interval::TRUTH),
                    UnaryOp::Not => Interval::checked(!v.hi, !v.lo).filter(|r| r.within(Interval::WORD)),
                }
            }
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right),
            _ => None,
        }
    }

    fn builtin(&self, name: &str, args: &[Expr]) -> Option<Interval> {
        if BYTE_BUILTINS.contains(&name) {
            return Some(Interval::BYTE);
        }
        match (name, args) {
            ("SGN", _) => Some(Interval { lo: -1, hi: 1 }),
            ("INT" | "FIX" | "CINT", [arg]) => self.eval(arg),
            ("ABS", [arg]) => {
                let v = self.eval(arg)?;
                let hi = v.lo.abs().max(v.hi.abs());
                let lo = if v.lo <= 0 && v.hi >= 0 { 0 } else { v.lo.abs().min(v.hi.abs()) };
                Some(Interval { lo, hi })
            }
            _ => None,
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Option<Interval> {
        if op.is_relational() {
            return Some(Interval::TRUTH);
        }
        let a = self.eval(left)?;
        let b = self.eval(right)?;
        match op {
            BinaryOp::Add => Interval::checked(a.lo + b.lo, a.hi + b.hi),
            BinaryOp::Sub => Interval::checked(a.lo - b.hi, a.hi - b.lo),
            BinaryOp::Mul => {
                let products = [a.lo * b.lo, a.lo * b.hi, a.hi * b.lo, a.hi * b.hi];
                let lo = products.iter().copied().min()?;
                let hi = products.iter().copied().max()?;
                Interval::checked(lo, hi)
            }
            BinaryOp::IntDiv if b.lo == b.hi && b.lo > 0 => {
                let d = b.lo;
                Some(Interval {
                    lo: a.lo / d,
                    hi: a.hi / d,
                })
            }
            BinaryOp::Mod if b.lo == b.hi && b.lo > 0 => {
                let m = b.lo - 1;
                let lo = if a.lo >= 0 { 0 } else { -m };
                let hi = if a.hi <= 0 { 0 } else { m };
                Some(Interval { lo, hi })
            }
            op if op.is_logical() => {
                if a.within(Interval::TRUTH) && b.within(Interval::TRUTH) {
                    Some(Interval::TRUTH)
                } else if op == BinaryOp::And && a.lo >= 0 && b.lo >= 0 {
                    Some(Interval { lo: 0, hi: a.hi.min(b.hi) })
                } else if a.within(Interval::WORD) && b.within(Interval::WORD) {
                    Some(Interval::WORD)
                } else {
                    None
                }
            }
            // `/` and `^` produce fractions or overflow
            _ => None,
        }
    }
}

enum Assignment<'p> {
    Value(&'p Expr),
    Counter {
        start: &'p Expr,
        end: &'p Expr,
        step: Option<&'p Expr>,
    },
    Opaque,
}

fn assignments<'p>(cfg: &ControlFlowGraph<'p>) -> Vec<(String, Assignment<'p>)> {
    let mut out = Vec::new();
    for (node, stmt) in cfg.statement_nodes() {
        if !cfg.is_reachable(node.id) {
            continue;
        }
        let scalars = |targets: &[LValue]| -> Vec<String> {
            targets
                .iter()
                .filter_map(|t| match t {
                    LValue::Scalar(id) => Some(id.key.clone()),
                    LValue::Element { .. } => None,
                })
                .collect()
        };
        match &stmt.kind {
            StatementKind::Let {
                target: LValue::Scalar(id),
                value,
            } => out.push((id.key.clone(), Assignment::Value(value))),
            StatementKind::For { var, start, end, step } => out.push((
                var.key.clone(),
                Assignment::Counter {
                    start,
                    end,
                    step: step.as_ref(),
                },
            )),
            StatementKind::Input { targets, .. } | StatementKind::Read { targets } => {
                out.extend(scalars(targets).into_iter().map(|v| (v, Assignment::Opaque)));
            }
            StatementKind::LineInput { target, .. } => {
                out.extend(scalars(std::slice::from_ref(target)).into_iter().map(|v| (v, Assignment::Opaque)));
            }
            StatementKind::Swap { left, right } => {
                out.extend(scalars(&[left.clone(), right.clone()]).into_iter().map(|v| (v, Assignment::Opaque)));
            }
            _ => {}
        }
    }
    out
}

fn evaluate(assignment: &Assignment<'_>, evaluator: &RangeEvaluator<'_>) -> Option<Interval> {
    match assignment {
        Assignment::Value(expr) => evaluator.eval(expr),
        Assignment::Counter { start, end, step } => {
            let step = match step {
                Some(step) => evaluator.eval(step).filter(|s| s.lo == s.hi && s.lo != 0)?.lo,
                None => 1,
            };
            let end = evaluator.eval(end)?;
            // The counter leaves the loop one step past its bound
            let exit = Interval::checked(end.lo + step, end.hi + step)?;
            Some(evaluator.eval(start)?.hull(end).hull(exit))
        }
        Assignment::Opaque => None,
    }
}

/// Infers ranges and returns them sorted by variable name
pub fn infer_integer_ranges(
    cfg: &ControlFlowGraph<'_>,
    symbols: &SymbolTable,
    max_iterations: usize,
) -> Vec<IntegerRange> {
    let assignments = assignments(cfg);
    let mut states: FxHashMap<String, State> = FxHashMap::default();
    for (var, _) in &assignments {
        let numeric = symbols.variable(var).map_or(true, |info| info.var_type.is_numeric());
        let state = if numeric { State::Unassigned } else { State::Unknown };
        states.insert(var.clone(), state);
    }

    let mut rounds = 0;
    loop {
        let mut next = states.clone();
        {
            let evaluator = RangeEvaluator { states: &states };
            for (var, assignment) in &assignments {
                if let Some(state) = next.get_mut(var) {
                    *state = state.join(evaluate(assignment, &evaluator));
                }
            }
        }
        let changed: Vec<String> = next
            .iter()
            .filter(|(var, state)| states.get(*var) != Some(state))
            .map(|(var, _)| var.clone())
            .collect();
        states = next;
        if changed.is_empty() {
            break;
        }
        rounds += 1;
        if rounds >= max_iterations {
            // Still growing: no static bound
            log::debug!("integer ranges: {} variables did not converge", changed.len());
            for var in changed {
                states.insert(var, State::Unknown);
            }
            rounds = 0;
        }
    }

    let sorted: BTreeMap<String, State> = states.into_iter().collect();
    sorted
        .into_iter()
        .filter_map(|(variable, state)| match state {
            State::Bounded(range) => IntegerWidth::for_range(range.lo, range.hi).map(|width| IntegerRange {
                variable,
                min: range.lo,
                max: range.hi,
                width,
            }),
            _ => None,
        })
        .collect()
}

pub struct IntegerRangePass;

impl IntegerRangePass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IntegerRangePass {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPass for IntegerRangePass {
    fn name(&self) -> &'static str {
        "integer-range"
    }

    fn is_enabled(&self, config: &AnalyzerConfig) -> bool {
        config.enable_integer_ranges
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        let ranges = infer_integer_ranges(&ctx.cfg, &ctx.symbols, ctx.config.max_range_iterations.max(1));
        for range in &ranges {
            if let Some(info) = ctx.symbols.variables.get_mut(&range.variable) {
                info.integer_range = Some(range.clone());
            }
        }
        let narrow = ranges.iter().filter(|r| r.width.bits() == 8).count();
        let count = ranges.len();
        ctx.findings.integer_ranges = ranges;
        PassResult::with_findings(count).with_stat("8-bit", narrow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolTableBuilder;
    use parser::parse_program;

    fn ranges(source: &str) -> Vec<IntegerRange> {
        let program = parse_program(source).unwrap();
        let symbols = SymbolTableBuilder::new().build(&program).table;
        let cfg = ControlFlowGraph::build(&program);
        infer_integer_ranges(&cfg, &symbols, 10)
    }

    fn width_of(found: &[IntegerRange], var: &str) -> Option<IntegerWidth> {
        found.iter().find(|r| r.variable == var).map(|r| r.width)
    }

    #[test]
    fn test_loop_counters() {
        let found = ranges("100 FOR I = 0 TO 254\n110 PRINT I\n120 NEXT I\n");
        assert_eq!(width_of(&found, "I"), Some(IntegerWidth::UInt8));

        let found = ranges("100 FOR I = -50 TO 50\n120 NEXT I\n");
        assert_eq!(width_of(&found, "I"), Some(IntegerWidth::Int8));

        let found = ranges("100 FOR I = 1 TO 1000\n120 NEXT I\n");
        assert_eq!(width_of(&found, "I"), Some(IntegerWidth::UInt16));
    }

    #[test]
    fn test_counter_keeps_its_exit_value() {
        // I is 256 once the loop finishes
        let found = ranges("10 FOR I = 0 TO 255\n20 NEXT I\n30 PRINT I\n");
        let i = found.iter().find(|r| r.variable == "I").unwrap();
        assert_eq!((i.min, i.max), (0, 256));
        assert_eq!(i.width, IntegerWidth::UInt16);

        let found = ranges("10 FOR I = 10 TO 0 STEP -1\n20 NEXT I\n");
        let i = found.iter().find(|r| r.variable == "I").unwrap();
        assert_eq!((i.min, i.max), (-1, 10));
        assert_eq!(i.width, IntegerWidth::Int8);

        let found = ranges("10 FOR I = 0 TO 100 STEP 30\n20 NEXT I\n");
        assert_eq!(found[0].max, 130);
    }

    #[test]
    fn test_byte_builtins_and_arithmetic() {
        let found = ranges("10 C = ASC(\"A\")\n20 D = C * 2 + 1\n");
        assert_eq!(width_of(&found, "C"), Some(IntegerWidth::UInt8));
        let d = found.iter().find(|r| r.variable == "D").unwrap();
        assert_eq!((d.min, d.max), (1, 511));
    }

    #[test]
    fn test_ineligible_variables() {
        let found = ranges("10 INPUT N\n20 X = 1 / 3\n30 A$ = \"HI\"\n40 Y = N + 1\n");
        assert!(found.is_empty());
    }

    #[test]
    fn test_unbounded_growth_is_dropped() {
        let found = ranges("10 X = 0\n20 X = X + 1\n30 GOTO 20\n");
        assert_eq!(width_of(&found, "X"), None);
    }

    #[test]
    fn test_width_classes() {
        assert_eq!(IntegerWidth::for_range(0, 255), Some(IntegerWidth::UInt8));
        assert_eq!(IntegerWidth::for_range(-1, 0), Some(IntegerWidth::Int8));
        assert_eq!(IntegerWidth::for_range(-1000, 1000), Some(IntegerWidth::Int16));
        assert_eq!(IntegerWidth::for_range(0, 100_000), Some(IntegerWidth::Int32));
        assert_eq!(IntegerWidth::Int16.to_string(), "16-bit signed");
    }
}
