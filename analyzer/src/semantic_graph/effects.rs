//! Per-statement variable reads and writes
//!
//! Reads are listed in evaluation order and always precede the statement's
//! writes. A call `FNX(...)` reads its arguments and every global variable
//! its body refers to.

use super::cfg::{ControlFlowGraph, NodeId};
use crate::symbols::SymbolTable;
use parser::{Expr, ExprKind, LValue, PrintItem, Statement, StatementKind};
use serde::Serialize;
use std::fmt;

/// Where a variable is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UseContext {
    Expression,
    Condition,
    Output,
    Subscript,
    LoopBound,
    Increment,
    Argument,
    Swap,
    /// Read by a `DEF FN` body at a call site
    FunctionBody,
}

impl fmt::Display for UseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UseContext::Expression => "used in expression",
            UseContext::Condition => "used in condition",
            UseContext::Output => "used in PRINT",
            UseContext::Subscript => "used as array subscript",
            UseContext::LoopBound => "used in FOR bounds",
            UseContext::Increment => "incremented by NEXT",
            UseContext::Argument => "passed as argument",
            UseContext::Swap => "used in SWAP",
            UseContext::FunctionBody => "read by function body",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarUse {
    pub name: String,
    pub context: UseContext,
    /// Function whose body performs the read
    pub via_function: Option<String>,
}

/// What one statement reads and writes
#[derive(Debug, Clone, Default)]
pub struct NodeEffects<'p> {
    pub uses: Vec<VarUse>,
    /// Scalars written, in order
    pub defs: Vec<String>,
    pub array_defs: Vec<String>,
    /// Top-level expressions the statement evaluates
    pub roots: Vec<&'p Expr>,
}

impl NodeEffects<'_> {
    pub fn defines(&self, name: &str) -> bool {
        self.defs.iter().any(|d| d == name)
    }

    pub fn uses_var(&self, name: &str) -> bool {
        self.uses.iter().any(|u| u.name == name)
    }
}

/// Effects of every node, indexed by node id
pub fn compute_effects<'p>(
    cfg: &ControlFlowGraph<'p>,
    symbols: &SymbolTable,
) -> Vec<NodeEffects<'p>> {
    cfg.nodes()
        .iter()
        .map(|node| match node.statement {
            Some(stmt) => statement_effects(cfg, node.id, stmt, symbols),
            None => NodeEffects::default(),
        })
        .collect()
}

fn statement_effects<'p>(
    cfg: &ControlFlowGraph<'p>,
    id: NodeId,
    stmt: &'p Statement,
    symbols: &SymbolTable,
) -> NodeEffects<'p> {
    let mut fx = EffectCollector {
        effects: NodeEffects::default(),
        symbols,
    };

    match &stmt.kind {
        StatementKind::Let { target, value } => {
            fx.root(value, UseContext::Expression);
            fx.target_subscripts(target);
            fx.write(target);
        }
        StatementKind::Print { channel, items } => {
            if let Some(channel) = channel {
                fx.root(channel, UseContext::Expression);
            }
            for item in items {
                if let PrintItem::Expr(expr) = item {
                    fx.root(expr, UseContext::Output);
                }
            }
        }
        StatementKind::Input {
            channel, targets, ..
        } => {
            if let Some(channel) = channel {
                fx.root(channel, UseContext::Expression);
            }
            for target in targets {
                fx.target_subscripts(target);
            }
            for target in targets {
                fx.write(target);
            }
        }
        StatementKind::LineInput {
            channel, target, ..
        } => {
            if let Some(channel) = channel {
                fx.root(channel, UseContext::Expression);
            }
            fx.target_subscripts(target);
            fx.write(target);
        }
        StatementKind::Read { targets } => {
            for target in targets {
                fx.target_subscripts(target);
            }
            for target in targets {
                fx.write(target);
            }
        }
        StatementKind::Dim { arrays } => {
            for array in arrays {
                for extent in &array.extents {
                    fx.collect(extent, UseContext::Expression);
                }
            }
        }
        StatementKind::If { condition, .. } => fx.root(condition, UseContext::Condition),
        StatementKind::While { condition } => fx.root(condition, UseContext::Condition),
        StatementKind::For {
            var,
            start,
            end,
            step,
        } => {
            fx.root(start, UseContext::LoopBound);
            fx.root(end, UseContext::LoopBound);
            if let Some(step) = step {
                fx.root(step, UseContext::LoopBound);
            }
            fx.effects.defs.push(var.key.clone());
        }
        StatementKind::Next { vars } => {
            let names: Vec<String> = if vars.is_empty() {
                cfg.loops_closed_by(id).map(|r| r.var.clone()).collect()
            } else {
                vars.iter().map(|v| v.key.clone()).collect()
            };
            for name in &names {
                fx.read(name, UseContext::Increment, None);
            }
            fx.effects.defs.extend(names);
        }
        StatementKind::OnGoto { selector, .. } | StatementKind::OnGosub { selector, .. } => {
            fx.root(selector, UseContext::Expression);
        }
        StatementKind::Swap { left, right } => {
            for target in [left, right] {
                fx.target_subscripts(target);
                if let LValue::Scalar(id) = target {
                    fx.read(&id.key, UseContext::Swap, None);
                }
            }
            fx.write(left);
            fx.write(right);
        }
        StatementKind::Randomize { seed: Some(seed) } => fx.root(seed, UseContext::Expression),
        StatementKind::Other { args, .. } => {
            for arg in args {
                fx.root(arg, UseContext::Expression);
            }
        }
        _ => {}
    }

    fx.effects
}

struct EffectCollector<'p, 's> {
    effects: NodeEffects<'p>,
    symbols: &'s SymbolTable,
}

impl<'p> EffectCollector<'p, '_> {
    fn root(&mut self, expr: &'p Expr, context: UseContext) {
        self.effects.roots.push(expr);
        self.collect(expr, context);
    }

    fn read(&mut self, name: &str, context: UseContext, via: Option<&str>) {
        self.effects.uses.push(VarUse {
            name: name.to_string(),
            context,
            via_function: via.map(str::to_string),
        });
    }

    fn collect(&mut self, expr: &'p Expr, context: UseContext) {
        let mut visiting = Vec::new();
        self.collect_inner(expr, context, &mut visiting);
    }

    fn collect_inner(&mut self, expr: &Expr, context: UseContext, visiting: &mut Vec<String>) {
        match &expr.kind {
            ExprKind::Variable(id) => self.read(&id.key, context, None),
            ExprKind::ArrayElement { indices, .. } => {
                for index in indices {
                    self.collect_inner(index, UseContext::Subscript, visiting);
                }
            }
            ExprKind::FnCall { name, args } => {
                for arg in args {
                    self.collect_inner(arg, UseContext::Argument, visiting);
                }
                // Recursive definitions are not expanded twice
                if visiting.contains(&name.key) {
                    return;
                }
                let Some(function) = self.symbols.function(&name.key) else {
                    return;
                };
                for free in function.free_variables() {
                    self.read(&free, UseContext::FunctionBody, Some(&name.key));
                }
                visiting.push(name.key.clone());
                let body = function.body.clone();
                self.collect_nested_calls(&body, visiting);
                visiting.pop();
            }
            _ => {
                for child in expr.children() {
                    self.collect_inner(child, context, visiting);
                }
            }
        }
    }

    /// Follow calls made from inside a function body
    fn collect_nested_calls(&mut self, body: &Expr, visiting: &mut Vec<String>) {
        if let ExprKind::FnCall { name, .. } = &body.kind {
            if !visiting.contains(&name.key) {
                if let Some(function) = self.symbols.function(&name.key) {
                    for free in function.free_variables() {
                        self.read(&free, UseContext::FunctionBody, Some(&name.key));
                    }
                    visiting.push(name.key.clone());
                    let inner = function.body.clone();
                    self.collect_nested_calls(&inner, visiting);
                    visiting.pop();
                }
            }
        }
        for child in body.children() {
            self.collect_nested_calls(child, visiting);
        }
    }

    fn target_subscripts(&mut self, target: &'p LValue) {
        if let LValue::Element { indices, .. } = target {
            for index in indices {
                self.effects.roots.push(index);
                self.collect(index, UseContext::Subscript);
            }
        }
    }

    fn write(&mut self, target: &LValue) {
        match target {
            LValue::Scalar(id) => self.effects.defs.push(id.key.clone()),
            LValue::Element { name, .. } => self.effects.array_defs.push(name.key.clone()),
        }
    }
}
