//! Symbol table construction
//!
//! Three sweeps over the program in textual order:
//!
//! 1. program-wide directives: `OPTION BASE`, `DEFtype`, `DEF FN`
//! 2. variable and array discovery, `DIM` evaluation against the scalars
//!    assigned constant values so far
//! 3. array layout, once the base is known for the whole program
//!
//! `OPTION BASE` applies to the entire program no matter where it appears,
//! so layouts are only computed after the first sweep has seen every one.

use crate::errors::{SemanticError, SemanticErrorKind};
use crate::optimization::array_flattening::ArrayLayout;
use crate::optimization::constant_folding::evaluate_with;
use crate::optimization::integer_range::IntegerRange;
use diagnostics::{Diagnostic, DiagnosticBuilder};
use fxhash::FxHashMap;
use parser::{
    walk_expr, walk_lvalue, Branch, Expr, ExprKind, Identifier, LValue, LineNumber, Program,
    Statement, StatementKind, VarType, Visitor,
};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Extent assumed per dimension for arrays used without `DIM`
pub const IMPLICIT_EXTENT: i64 = 10;

/// Largest upper bound a DIM may declare
pub const MAX_EXTENT: i64 = i32::MAX as i64;

pub(crate) fn serialize_display<T: fmt::Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableInfo {
    /// Upper-cased key
    pub name: String,
    /// Spelling at the first occurrence
    pub display_name: String,
    #[serde(serialize_with = "serialize_display")]
    pub var_type: VarType,
    pub is_array: bool,
    /// Declared inclusive upper bounds
    pub dimensions: Vec<i64>,
    pub explicitly_dimensioned: bool,
    pub dim_line: Option<LineNumber>,
    pub first_use_line: Option<LineNumber>,
    pub flattened_size: Option<u64>,
    pub strides: Vec<u64>,
    pub integer_range: Option<IntegerRange>,
}

impl VariableInfo {
    fn new(id: &Identifier, var_type: VarType, is_array: bool, line: LineNumber) -> Self {
        Self {
            name: id.key.clone(),
            display_name: id.text.clone(),
            var_type,
            is_array,
            dimensions: Vec::new(),
            explicitly_dimensioned: false,
            dim_line: None,
            first_use_line: Some(line),
            flattened_size: None,
            strides: Vec::new(),
            integer_range: None,
        }
    }

    /// Storage plan, once the array has been laid out
    pub fn layout(&self, base: u32) -> Option<ArrayLayout> {
        self.flattened_size?;
        ArrayLayout::new(&self.dimensions, base)
    }
}

/// A `DEF FN` definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    pub display_name: String,
    #[serde(serialize_with = "serialize_display")]
    pub return_type: VarType,
    pub parameters: Vec<String>,
    pub definition_line: LineNumber,
    #[serde(serialize_with = "serialize_display")]
    pub body: Expr,
}

impl FunctionInfo {
    /// Scalar variables the body reads that are not parameters, in order of appearance
    pub fn free_variables(&self) -> Vec<String> {
        struct Free<'f> {
            params: &'f [String],
            names: Vec<String>,
        }
        impl Visitor for Free<'_> {
            fn visit_expr(&mut self, expr: &Expr) {
                if let ExprKind::Variable(id) = &expr.kind {
                    if !self.params.contains(&id.key) && !self.names.contains(&id.key) {
                        self.names.push(id.key.clone());
                    }
                }
                walk_expr(self, expr);
            }
        }

        let mut free = Free {
            params: &self.parameters,
            names: Vec::new(),
        };
        free.visit_expr(&self.body);
        free.names
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SymbolTable {
    pub variables: BTreeMap<String, VariableInfo>,
    /// Arrays live in their own namespace: `A` and `A()` are distinct
    pub arrays: BTreeMap<String, VariableInfo>,
    pub functions: BTreeMap<String, FunctionInfo>,
    pub array_base: u32,
    pub base_line: Option<LineNumber>,
    /// False after conflicting `OPTION BASE` statements
    pub base_resolved: bool,
    #[serde(skip)]
    def_types: BTreeMap<char, VarType>,
}

impl SymbolTable {
    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.get(name)
    }

    pub fn array(&self, name: &str) -> Option<&VariableInfo> {
        self.arrays.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    pub fn array_layout(&self, name: &str) -> Option<ArrayLayout> {
        if !self.base_resolved {
            return None;
        }
        self.arrays.get(name)?.layout(self.array_base)
    }

    /// Suffix first, then `DEFtype`, then SINGLE
    pub fn resolve_type(&self, id: &Identifier) -> VarType {
        id.suffix()
            .or_else(|| self.def_types.get(&id.initial()).copied())
            .unwrap_or(VarType::Single)
    }

    fn function_type(&self, id: &Identifier) -> VarType {
        id.suffix()
            .or_else(|| {
                let letter = id.key.chars().nth(2)?;
                self.def_types.get(&letter).copied()
            })
            .unwrap_or(VarType::Single)
    }
}

/// Output of [`SymbolTableBuilder::build`]
pub struct SymbolBuild {
    pub table: SymbolTable,
    pub errors: Vec<SemanticError>,
    pub warnings: Vec<Diagnostic>,
}

pub struct SymbolTableBuilder {
    table: SymbolTable,
    errors: Vec<SemanticError>,
    warnings: Vec<Diagnostic>,
    /// Scalars holding a known constant at the current point of the textual sweep
    constants: FxHashMap<String, f64>,
    implicit_ranks: FxHashMap<String, usize>,
    line: LineNumber,
    depth: usize,
}

impl SymbolTableBuilder {
    pub fn new() -> Self {
        Self {
            table: SymbolTable {
                base_resolved: true,
                ..SymbolTable::default()
            },
            errors: Vec::new(),
            warnings: Vec::new(),
            constants: FxHashMap::default(),
            implicit_ranks: FxHashMap::default(),
            line: 0,
            depth: 0,
        }
    }

    pub fn build(mut self, program: &Program) -> SymbolBuild {
        for stmt in program.statements() {
            self.scan_directives(stmt);
        }
        for stmt in program.statements() {
            self.visit_statement(stmt);
        }
        self.finish_arrays();

        log::debug!(
            "symbol table: {} variables, {} arrays, {} functions, base {}",
            self.table.variables.len(),
            self.table.arrays.len(),
            self.table.functions.len(),
            self.table.array_base
        );

        SymbolBuild {
            table: self.table,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    fn scan_directives(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StatementKind::OptionBase { base } => self.option_base(*base, stmt.line),
            StatementKind::DefType { var_type, ranges } => {
                for &(from, to) in ranges {
                    for letter in from.to_ascii_uppercase()..=to.to_ascii_uppercase() {
                        self.table.def_types.insert(letter, *var_type);
                    }
                }
            }
            StatementKind::DefFn { name, params, body } => {
                if let Some(existing) = self.table.functions.get(&name.key) {
                    self.errors.push(SemanticError::new(
                        SemanticErrorKind::FunctionRedefined {
                            name: name.key.clone(),
                            first_line: existing.definition_line,
                        },
                        stmt.line,
                    ));
                    return;
                }
                let info = FunctionInfo {
                    name: name.key.clone(),
                    display_name: name.text.clone(),
                    return_type: VarType::Single,
                    parameters: params.iter().map(|p| p.key.clone()).collect(),
                    definition_line: stmt.line,
                    body: body.clone(),
                };
                self.table.functions.insert(name.key.clone(), info);
            }
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                for branch in std::iter::once(then_branch).chain(else_branch.iter()) {
                    if let Branch::Statements(stmts) = branch {
                        for inner in stmts {
                            self.scan_directives(inner);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn option_base(&mut self, base: u32, line: LineNumber) {
        if base > 1 {
            self.errors.push(SemanticError::new(
                SemanticErrorKind::InvalidOptionBase { value: base },
                line,
            ));
            return;
        }
        match self.table.base_line {
            None => {
                self.table.array_base = base;
                self.table.base_line = Some(line);
            }
            Some(first_line) if self.table.array_base != base => {
                self.errors.push(SemanticError::new(
                    SemanticErrorKind::ConflictingOptionBase {
                        first_line,
                        first_value: self.table.array_base,
                        line,
                        value: base,
                    },
                    line,
                ));
                self.table.base_resolved = false;
            }
            Some(_) => {}
        }
    }

    fn touch_scalar(&mut self, id: &Identifier) {
        if !self.table.variables.contains_key(&id.key) {
            let var_type = self.table.resolve_type(id);
            let info = VariableInfo::new(id, var_type, false, self.line);
            self.table.variables.insert(id.key.clone(), info);
        }
    }

    fn touch_array(&mut self, id: &Identifier, rank: usize) {
        if !self.table.arrays.contains_key(&id.key) {
            let var_type = self.table.resolve_type(id);
            let info = VariableInfo::new(id, var_type, true, self.line);
            self.table.arrays.insert(id.key.clone(), info);
        }
        self.implicit_ranks.entry(id.key.clone()).or_insert(rank);
    }

    fn assign(&mut self, target: &LValue) {
        match target {
            LValue::Scalar(id) => {
                self.touch_scalar(id);
                self.constants.remove(&id.key);
            }
            LValue::Element { name, indices } => self.touch_array(name, indices.len()),
        }
    }

    fn declare(&mut self, name: &Identifier, extents: &[Expr]) {
        let line = self.line;
        if let Some(existing) = self.table.arrays.get(&name.key) {
            if let Some(first_line) = existing.dim_line {
                self.errors.push(SemanticError::new(
                    SemanticErrorKind::ArrayRedimensioned {
                        name: name.key.clone(),
                        first_line,
                    },
                    line,
                ));
                return;
            }
        }

        let constants = &self.constants;
        let lookup = |key: &str| constants.get(key).copied();
        let mut dimensions = Vec::with_capacity(extents.len());
        let mut valid = true;
        for extent in extents {
            match evaluate_with(extent, &lookup).and_then(|v| v.as_number()) {
                Some(value) if value.round() < 0.0 => {
                    self.errors.push(SemanticError::new(
                        SemanticErrorKind::NegativeDimension {
                            name: name.key.clone(),
                            value: value.round() as i64,
                        },
                        line,
                    ));
                    valid = false;
                }
                Some(value) if !value.is_finite() || value.round() > MAX_EXTENT as f64 => {
                    self.errors.push(SemanticError::new(
                        SemanticErrorKind::DimensionTooLarge {
                            name: name.key.clone(),
                            extent: extent.source_text(),
                        },
                        line,
                    ));
                    valid = false;
                }
                Some(value) => dimensions.push(value.round() as i64),
                None => {
                    self.errors.push(SemanticError::new(
                        SemanticErrorKind::NonConstantDimension {
                            name: name.key.clone(),
                            extent: extent.source_text(),
                        },
                        line,
                    ));
                    valid = false;
                }
            }
        }

        self.touch_array(name, extents.len());
        if let Some(info) = self.table.arrays.get_mut(&name.key) {
            info.explicitly_dimensioned = true;
            info.dim_line = Some(line);
            if valid {
                info.dimensions = dimensions;
            }
        }
    }

    fn finish_arrays(&mut self) {
        let base = self.table.array_base;
        let resolved = self.table.base_resolved;

        for info in self.table.arrays.values_mut() {
            if !info.explicitly_dimensioned {
                let rank = self.implicit_ranks.get(&info.name).copied().unwrap_or(1);
                info.dimensions = vec![IMPLICIT_EXTENT; rank];
                self.warnings.push(
                    DiagnosticBuilder::warning(format!(
                        "Array {} used without DIM; assuming extent {} per dimension",
                        info.name, IMPLICIT_EXTENT
                    ))
                    .maybe_line(info.first_use_line)
                    .build(),
                );
            }
            if info.dimensions.is_empty() {
                continue;
            }
            if !resolved {
                if info.explicitly_dimensioned {
                    self.errors.push(SemanticError {
                        kind: SemanticErrorKind::FlatteningSkipped {
                            name: info.name.clone(),
                        },
                        line: info.dim_line,
                    });
                }
                continue;
            }
            match ArrayLayout::new(&info.dimensions, base) {
                Some(layout) => {
                    info.flattened_size = Some(layout.size);
                    info.strides = layout.strides;
                }
                None => {
                    let kind = match info.dimensions.iter().find(|&&d| d < i64::from(base)) {
                        Some(&value) => SemanticErrorKind::DimensionBelowBase {
                            name: info.name.clone(),
                            value,
                            base,
                        },
                        // Every extent fits, so the element count overflowed
                        None => SemanticErrorKind::DimensionTooLarge {
                            name: info.name.clone(),
                            extent: info
                                .dimensions
                                .iter()
                                .map(i64::to_string)
                                .collect::<Vec<_>>()
                                .join(", "),
                        },
                    };
                    self.errors.push(SemanticError {
                        kind,
                        line: info.dim_line.or(info.first_use_line),
                    });
                }
            }
        }

        let function_types: Vec<(String, VarType)> = self
            .table
            .functions
            .values()
            .map(|f| (f.name.clone(), self.table.function_type(&Identifier::new(f.name.clone()))))
            .collect();
        for (name, ty) in function_types {
            if let Some(f) = self.table.functions.get_mut(&name) {
                f.return_type = ty;
            }
        }
    }
}

impl Default for SymbolTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for SymbolTableBuilder {
    fn visit_statement(&mut self, stmt: &Statement) {
        self.line = stmt.line;
        match &stmt.kind {
            StatementKind::Let { target, value } => {
                self.visit_expr(value);
                walk_lvalue(self, target);
                let constants = &self.constants;
                let lookup = |key: &str| constants.get(key).copied();
                let known = evaluate_with(value, &lookup).and_then(|v| v.as_number());
                self.assign(target);
                if let (LValue::Scalar(id), Some(known), 0) = (target, known, self.depth) {
                    self.constants.insert(id.key.clone(), known);
                }
            }
            StatementKind::Input { targets, .. } | StatementKind::Read { targets } => {
                parser::walk_statement(self, stmt);
                for target in targets {
                    self.assign(target);
                }
            }
            StatementKind::LineInput { target, .. } => {
                parser::walk_statement(self, stmt);
                self.assign(target);
            }
            StatementKind::Swap { left, right } => {
                parser::walk_statement(self, stmt);
                self.assign(left);
                self.assign(right);
            }
            StatementKind::For { var, .. } => {
                parser::walk_statement(self, stmt);
                self.touch_scalar(var);
                self.constants.remove(&var.key);
            }
            StatementKind::Next { vars } => {
                for var in vars {
                    self.constants.remove(&var.key);
                }
            }
            StatementKind::Dim { arrays } => {
                parser::walk_statement(self, stmt);
                for array in arrays {
                    self.declare(&array.name, &array.extents);
                }
            }
            StatementKind::DefFn { params, body, .. } => {
                let mut collector = FreeVariableTouch {
                    builder: self,
                    params,
                };
                collector.visit_expr(body);
            }
            StatementKind::If { .. } => {
                self.depth += 1;
                parser::walk_statement(self, stmt);
                self.depth -= 1;
            }
            _ => parser::walk_statement(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Variable(id) => self.touch_scalar(id),
            ExprKind::ArrayElement { name, indices } => self.touch_array(name, indices.len()),
            _ => {}
        }
        walk_expr(self, expr);
    }
}

/// Registers globals referenced from a `DEF FN` body, skipping its parameters
struct FreeVariableTouch<'b> {
    builder: &'b mut SymbolTableBuilder,
    params: &'b [Identifier],
}

impl Visitor for FreeVariableTouch<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Variable(id) if self.params.iter().any(|p| p.key == id.key) => {}
            ExprKind::Variable(id) => self.builder.touch_scalar(id),
            ExprKind::ArrayElement { name, indices } => self.builder.touch_array(name, indices.len()),
            _ => {}
        }
        walk_expr(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::parse_program;

    fn build(source: &str) -> SymbolBuild {
        let program = parse_program(source).expect("program should parse");
        SymbolTableBuilder::new().build(&program)
    }

    #[test]
    fn test_option_base_sizes() {
        let result = build("10 DIM A(10, 20)\n20 DIM B(5, 3, 4)\n");
        assert!(result.errors.is_empty());
        assert_eq!(result.table.array("A").unwrap().flattened_size, Some(231));
        assert_eq!(result.table.array("B").unwrap().flattened_size, Some(120));

        let result = build("10 DIM A(10, 20)\n20 DIM B(5, 3, 4)\n30 OPTION BASE 1\n");
        assert!(result.errors.is_empty());
        assert_eq!(result.table.array_base, 1);
        assert_eq!(result.table.array("A").unwrap().flattened_size, Some(200));
        assert_eq!(result.table.array("B").unwrap().flattened_size, Some(60));
    }

    #[test]
    fn test_conflicting_option_base() {
        let result = build("10 OPTION BASE 0\n20 DIM A(5)\n30 OPTION BASE 1\n");
        let conflicts: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.to_string().contains("Conflicting OPTION BASE"))
            .collect();
        assert_eq!(conflicts.len(), 1);
        assert!(!result.table.base_resolved);
        assert_eq!(result.table.array("A").unwrap().flattened_size, None);

        let result = build("10 OPTION BASE 1\n20 OPTION BASE 1\n30 DIM A(5)\n");
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_dim_with_runtime_constants() {
        let result = build("10 N = 5\n20 DIM A(N * 2)\n30 INPUT M\n40 DIM B(M)\n50 DIM C(-1)\n");
        assert_eq!(result.table.array("A").unwrap().dimensions, vec![10]);
        let kinds: Vec<u16> = result.errors.iter().map(|e| e.kind.code()).collect();
        assert_eq!(kinds, vec![2004, 2005]);
    }

    #[test]
    fn test_oversized_dimensions_are_errors() {
        let result = build("10 DIM A(1E19)\n20 A(1) = 2\n");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind.code(), 2007);
        assert_eq!(result.errors[0].line, Some(10));
        assert_eq!(result.table.array("A").unwrap().flattened_size, None);

        // Each extent fits but the element count does not
        let result = build("10 DIM B(2000000000, 2000000000, 2000000000)\n");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].to_string().contains("too large"));
        assert_eq!(result.table.array("B").unwrap().flattened_size, None);
    }

    #[test]
    fn test_redimension_is_an_error() {
        let result = build("10 DIM A(5)\n20 DIM A(6)\n");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].to_string().contains("already dimensioned at line 10"));
    }

    #[test]
    fn test_implicit_array_gets_default_extent() {
        let result = build("10 X = A(3, 4)\n");
        let a = result.table.array("A").unwrap();
        assert_eq!(a.dimensions, vec![10, 10]);
        assert_eq!(a.flattened_size, Some(121));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_type_resolution() {
        let result = build("10 DEFINT I-K\n20 I = 1 : X = 2 : N$ = \"A\" : Z# = 1\n");
        let table = &result.table;
        assert_eq!(table.variable("I").unwrap().var_type, VarType::Integer);
        assert_eq!(table.variable("X").unwrap().var_type, VarType::Single);
        assert_eq!(table.variable("N$").unwrap().var_type, VarType::String);
        assert_eq!(table.variable("Z#").unwrap().var_type, VarType::Double);
    }

    #[test]
    fn test_scalar_and_array_namespaces_are_separate() {
        let result = build("10 DIM A(3)\n20 A = 1\n");
        assert!(result.table.variable("A").is_some());
        assert!(result.table.array("A").unwrap().is_array);
        assert!(!result.table.variable("A").unwrap().is_array);
    }

    #[test]
    fn test_function_table() {
        let result = build("10 DEF FNA(X) = X * K + 1\n20 DEF FNA(Y) = Y\n");
        let f = result.table.function("FNA").unwrap();
        assert_eq!(f.parameters, vec!["X"]);
        assert_eq!(f.free_variables(), vec!["K"]);
        assert!(result.table.variable("K").is_some());
        assert!(result.table.variable("X").is_none());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind.code(), 2010);
    }

    #[test]
    fn test_first_use_preserves_spelling() {
        let result = build("10 total = 1\n20 PRINT TOTAL\n");
        let v = result.table.variable("TOTAL").unwrap();
        assert_eq!(v.display_name, "total");
        assert_eq!(v.first_use_line, Some(10));
    }
}
