//! Exhaustive traversal over statements and expressions
//!
//! Override a `visit_*` method to observe a node kind, and call the matching
//! `walk_*` function from it to keep descending.

use crate::ast::*;

pub trait Visitor {
    fn visit_statement(&mut self, stmt: &Statement) {
        walk_statement(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_lvalue(&mut self, target: &LValue) {
        walk_lvalue(self, target);
    }

    fn visit_branch(&mut self, branch: &Branch) {
        walk_branch(self, branch);
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Number { .. } | ExprKind::Str(_) | ExprKind::Variable(_) => {}
        ExprKind::ArrayElement { indices, .. } => {
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Binary { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        ExprKind::Builtin { args, .. } | ExprKind::FnCall { args, .. } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
    }
}

pub fn walk_lvalue<V: Visitor + ?Sized>(visitor: &mut V, target: &LValue) {
    if let LValue::Element { indices, .. } = target {
        for index in indices {
            visitor.visit_expr(index);
        }
    }
}

pub fn walk_branch<V: Visitor + ?Sized>(visitor: &mut V, branch: &Branch) {
    if let Branch::Statements(stmts) = branch {
        for stmt in stmts {
            visitor.visit_statement(stmt);
        }
    }
}

pub fn walk_statement<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Statement) {
    match &stmt.kind {
        StatementKind::Let { target, value } => {
            visitor.visit_lvalue(target);
            visitor.visit_expr(value);
        }
        StatementKind::Print { channel, items } => {
            if let Some(channel) = channel {
                visitor.visit_expr(channel);
            }
            for item in items {
                if let PrintItem::Expr(expr) = item {
                    visitor.visit_expr(expr);
                }
            }
        }
        StatementKind::Input { channel, targets, .. } => {
            if let Some(channel) = channel {
                visitor.visit_expr(channel);
            }
            for target in targets {
                visitor.visit_lvalue(target);
            }
        }
        StatementKind::LineInput { channel, target, .. } => {
            if let Some(channel) = channel {
                visitor.visit_expr(channel);
            }
            visitor.visit_lvalue(target);
        }
        StatementKind::Read { targets } => {
            for target in targets {
                visitor.visit_lvalue(target);
            }
        }
        StatementKind::Dim { arrays } => {
            for array in arrays {
                for extent in &array.extents {
                    visitor.visit_expr(extent);
                }
            }
        }
        StatementKind::DefFn { body, .. } => visitor.visit_expr(body),
        StatementKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_branch(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_branch(else_branch);
            }
        }
        StatementKind::For { start, end, step, .. } => {
            visitor.visit_expr(start);
            visitor.visit_expr(end);
            if let Some(step) = step {
                visitor.visit_expr(step);
            }
        }
        StatementKind::While { condition } => visitor.visit_expr(condition),
        StatementKind::OnGoto { selector, .. } | StatementKind::OnGosub { selector, .. } => {
            visitor.visit_expr(selector)
        }
        StatementKind::Swap { left, right } => {
            visitor.visit_lvalue(left);
            visitor.visit_lvalue(right);
        }
        StatementKind::Randomize { seed: Some(seed) } => visitor.visit_expr(seed),
        StatementKind::Other { args, .. } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        StatementKind::Data { .. }
        | StatementKind::Restore { .. }
        | StatementKind::OptionBase { .. }
        | StatementKind::DefType { .. }
        | StatementKind::Next { .. }
        | StatementKind::Wend
        | StatementKind::Goto { .. }
        | StatementKind::Gosub { .. }
        | StatementKind::Return
        | StatementKind::OnErrorGoto { .. }
        | StatementKind::Resume { .. }
        | StatementKind::End
        | StatementKind::Stop
        | StatementKind::Randomize { seed: None }
        | StatementKind::Tron
        | StatementKind::Troff
        | StatementKind::Common { .. }
        | StatementKind::Erase { .. }
        | StatementKind::Rem { .. }
        | StatementKind::Command { .. } => {}
    }
}

/// Walk every statement of a program, including those nested in `IF` arms
pub fn walk_program<V: Visitor + ?Sized>(visitor: &mut V, program: &Program) {
    for stmt in program.statements() {
        visitor.visit_statement(stmt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct VariableCollector {
        names: Vec<String>,
    }

    impl Visitor for VariableCollector {
        fn visit_expr(&mut self, expr: &Expr) {
            if let ExprKind::Variable(id) = &expr.kind {
                self.names.push(id.key.clone());
            }
            walk_expr(self, expr);
        }
    }

    #[test]
    fn test_collects_nested_variables() {
        let cond = Expr::binary(BinaryOp::Gt, Expr::variable("a", 10), Expr::number(0.0, 10));
        let inner = Statement::new(
            StatementKind::Print {
                channel: None,
                items: vec![PrintItem::Expr(Expr::variable("b", 10))],
            },
            10,
            15,
        );
        let stmt = Statement::new(
            StatementKind::If {
                condition: cond,
                then_branch: Branch::Statements(vec![inner]),
                else_branch: Some(Branch::Line(100)),
            },
            10,
            4,
        );

        let mut collector = VariableCollector::default();
        collector.visit_statement(&stmt);
        assert_eq!(collector.names, vec!["A", "B"]);
    }
}
