//! Compile-time evaluation of literal subtrees
//!
//! Arithmetic follows the interpreter: relational results are `-1`/`0`,
//! logical operators work on 16-bit integers, and `\`/`MOD` round their
//! operands first. Anything that would raise a runtime error (division by
//! zero, overflow, type mismatch) is left unfolded.

use crate::pass_manager::{AnalysisContext, AnalysisPass, PassResult};
use parser::{
    format_number, walk_expr, walk_program, BinaryOp, Expr, ExprKind, LineNumber, UnaryOp, Visitor,
};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConstValue {
    Number(f64),
    Str(String),
}

impl ConstValue {
    pub fn truth(value: bool) -> Self {
        ConstValue::Number(if value { -1.0 } else { 0.0 })
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ConstValue::Number(n) => Some(*n),
            ConstValue::Str(_) => None,
        }
    }

    pub fn to_expr(&self, line: LineNumber) -> Expr {
        match self {
            ConstValue::Number(n) => Expr::number(*n, line),
            ConstValue::Str(s) => Expr::new(ExprKind::Str(s.clone()), line),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Number(n) => write!(f, "{}", format_number(*n)),
            ConstValue::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// One folded subtree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldedExpression {
    pub line: LineNumber,
    pub expression: String,
    pub value: ConstValue,
}

/// Evaluate an expression built only from literals
pub fn evaluate_constant(expr: &Expr) -> Option<ConstValue> {
    evaluate_with(expr, &|_| None)
}

/// Evaluate with scalar variables resolved through `lookup`
pub fn evaluate_with(expr: &Expr, lookup: &dyn Fn(&str) -> Option<f64>) -> Option<ConstValue> {
    match &expr.kind {
        ExprKind::Number { value, .. } => Some(ConstValue::Number(*value)),
        ExprKind::Str(s) => Some(ConstValue::Str(s.clone())),
        ExprKind::Variable(id) => lookup(&id.key).map(ConstValue::Number),
        ExprKind::Unary { op, operand } => {
            let value = evaluate_with(operand, lookup)?.as_number()?;
            apply_unary(*op, value).map(ConstValue::Number)
        }
        ExprKind::Binary { op, left, right } => {
            let left = evaluate_with(left, lookup)?;
            let right = evaluate_with(right, lookup)?;
            apply_binary(*op, &left, &right)
        }
        ExprKind::Builtin { name, args } => {
            let args = args
                .iter()
                .map(|arg| evaluate_with(arg, lookup))
                .collect::<Option<Vec<_>>>()?;
            apply_builtin(name, &args)
        }
        ExprKind::ArrayElement { .. } | ExprKind::FnCall { .. } => None,
    }
}

/// True for expressions that fold, other than plain literals and negated literals
pub fn is_foldable(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Number { .. } | ExprKind::Str(_) | ExprKind::Variable(_) => false,
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } if operand.as_number().is_some() => false,
        _ => evaluate_constant(expr).is_some(),
    }
}

/// Round to a 16-bit integer the way logical operators and `\` do
fn to_int(value: f64) -> Option<i64> {
    let rounded = value.round();
    if (-32768.0..=32767.0).contains(&rounded) {
        Some(rounded as i64)
    } else {
        None
    }
}

pub fn apply_unary(op: UnaryOp, value: f64) -> Option<f64> {
    match op {
        UnaryOp::Neg => Some(-value),
        UnaryOp::Not => to_int(value).map(|v| !v as f64),
    }
}

pub fn apply_binary(op: BinaryOp, left: &ConstValue, right: &ConstValue) -> Option<ConstValue> {
    match (left, right) {
        (ConstValue::Number(a), ConstValue::Number(b)) => apply_numeric(op, *a, *b),
        (ConstValue::Str(a), ConstValue::Str(b)) => match op {
            BinaryOp::Add => Some(ConstValue::Str(format!("{}{}", a, b))),
            BinaryOp::Eq => Some(ConstValue::truth(a == b)),
            BinaryOp::Ne => Some(ConstValue::truth(a != b)),
            BinaryOp::Lt => Some(ConstValue::truth(a < b)),
            BinaryOp::Le => Some(ConstValue::truth(a <= b)),
            BinaryOp::Gt => Some(ConstValue::truth(a > b)),
            BinaryOp::Ge => Some(ConstValue::truth(a >= b)),
            _ => None,
        },
        _ => None,
    }
}

fn apply_numeric(op: BinaryOp, a: f64, b: f64) -> Option<ConstValue> {
    let number = |v: f64| {
        if v.is_finite() {
            Some(ConstValue::Number(v))
        } else {
            None
        }
    };
    match op {
        BinaryOp::Add => number(a + b),
        BinaryOp::Sub => number(a - b),
        BinaryOp::Mul => number(a * b),
        BinaryOp::Div if b == 0.0 => None,
        BinaryOp::Div => number(a / b),
        BinaryOp::Pow => number(a.powf(b)),
        BinaryOp::IntDiv => {
            let (a, b) = (to_int(a)?, to_int(b)?);
            if b == 0 {
                None
            } else {
                number((a / b) as f64)
            }
        }
        BinaryOp::Mod => {
            let (a, b) = (to_int(a)?, to_int(b)?);
            if b == 0 {
                None
            } else {
                number((a % b) as f64)
            }
        }
        BinaryOp::Eq => Some(ConstValue::truth(a == b)),
        BinaryOp::Ne => Some(ConstValue::truth(a != b)),
        BinaryOp::Lt => Some(ConstValue::truth(a < b)),
        BinaryOp::Le => Some(ConstValue::truth(a <= b)),
        BinaryOp::Gt => Some(ConstValue::truth(a > b)),
        BinaryOp::Ge => Some(ConstValue::truth(a >= b)),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Eqv | BinaryOp::Imp => {
            let (a, b) = (to_int(a)?, to_int(b)?);
            let bits = match op {
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
                BinaryOp::Eqv => !(a ^ b),
                _ => !a | b,
            };
            number(bits as f64)
        }
    }
}

fn apply_builtin(name: &str, args: &[ConstValue]) -> Option<ConstValue> {
    let num = |i: usize| args.get(i).and_then(ConstValue::as_number);
    let text = |i: usize| match args.get(i) {
        Some(ConstValue::Str(s)) => Some(s.as_str()),
        _ => None,
    };
    let number = |v: f64| {
        if v.is_finite() {
            Some(ConstValue::Number(v))
        } else {
            None
        }
    };

    match (name, args.len()) {
        ("ABS", 1) => number(num(0)?.abs()),
        ("INT", 1) => number(num(0)?.floor()),
        ("FIX", 1) => number(num(0)?.trunc()),
        ("CINT", 1) => to_int(num(0)?).map(|v| ConstValue::Number(v as f64)),
        ("SGN", 1) => {
            let v = num(0)?;
            number(if v > 0.0 { 1.0 } else if v < 0.0 { -1.0 } else { 0.0 })
        }
        ("SQR", 1) => {
            let v = num(0)?;
            if v >= 0.0 { number(v.sqrt()) } else { None }
        }
        ("LOG", 1) => {
            let v = num(0)?;
            if v > 0.0 { number(v.ln()) } else { None }
        }
        ("EXP", 1) => number(num(0)?.exp()),
        ("SIN", 1) => number(num(0)?.sin()),
        ("COS", 1) => number(num(0)?.cos()),
        ("TAN", 1) => number(num(0)?.tan()),
        ("ATN", 1) => number(num(0)?.atan()),
        ("LEN", 1) => number(text(0)?.chars().count() as f64),
        ("ASC", 1) => text(0)?.chars().next().map(|c| ConstValue::Number(c as u32 as f64)),
        ("CHR$", 1) => {
            let code = to_int(num(0)?)?;
            let c = char::from_u32(u32::try_from(code).ok()?)?;
            Some(ConstValue::Str(c.to_string()))
        }
        ("LEFT$", 2) => {
            let n = usize::try_from(to_int(num(1)?)?).ok()?;
            Some(ConstValue::Str(text(0)?.chars().take(n).collect()))
        }
        ("RIGHT$", 2) => {
            let s = text(0)?;
            let n = usize::try_from(to_int(num(1)?)?).ok()?;
            let len = s.chars().count();
            Some(ConstValue::Str(s.chars().skip(len.saturating_sub(n)).collect()))
        }
        _ => None,
    }
}

/// Records every maximal foldable subtree in the program
pub struct ConstantFoldingPass {
    folded: Vec<FoldedExpression>,
}

impl ConstantFoldingPass {
    pub fn new() -> Self {
        Self { folded: Vec::new() }
    }
}

impl Default for ConstantFoldingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for ConstantFoldingPass {
    fn visit_expr(&mut self, expr: &Expr) {
        if is_foldable(expr) {
            if let Some(value) = evaluate_constant(expr) {
                self.folded.push(FoldedExpression {
                    line: expr.line,
                    expression: expr.source_text(),
                    value,
                });
            }
            return;
        }
        walk_expr(self, expr);
    }
}

impl AnalysisPass for ConstantFoldingPass {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        self.folded.clear();
        walk_program(self, ctx.program);
        let count = self.folded.len();
        ctx.findings.folded_expressions.append(&mut self.folded);
        PassResult::with_findings(count)
    }
}
