//! MBASIC abstract syntax tree
//!
//! Identifiers are case-insensitive but case-preserving: every [`Identifier`]
//! carries an upper-cased `key` used for identity and lookup, plus the `text`
//! exactly as typed at that occurrence. `Display` renders the canonical form
//! (keys, normalized numbers, minimal parentheses) that analysis passes use to
//! compare expressions; [`Expr::source_text`] reproduces the original spelling.

use std::fmt;

/// A BASIC program line number (`10`, `20`, ...)
pub type LineNumber = u32;

/// Storage type of a variable, chosen by suffix or `DEFtype`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarType {
    Integer,
    Single,
    Double,
    String,
}

impl VarType {
    pub fn from_suffix(suffix: char) -> Option<VarType> {
        match suffix {
            '%' => Some(VarType::Integer),
            '!' => Some(VarType::Single),
            '#' => Some(VarType::Double),
            '$' => Some(VarType::String),
            _ => None,
        }
    }

    pub fn suffix(self) -> char {
        match self {
            VarType::Integer => '%',
            VarType::Single => '!',
            VarType::Double => '#',
            VarType::String => '$',
        }
    }

    pub fn is_numeric(self) -> bool {
        self != VarType::String
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarType::Integer => "INTEGER",
            VarType::Single => "SINGLE",
            VarType::Double => "DOUBLE",
            VarType::String => "STRING",
        };
        write!(f, "{}", name)
    }
}

/// A variable, array or function name occurrence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    /// Upper-cased identity
    pub key: String,
    /// Spelling as typed
    pub text: String,
}

impl Identifier {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            key: text.to_ascii_uppercase(),
            text,
        }
    }

    /// Explicit type suffix, if the name carries one
    pub fn suffix(&self) -> Option<VarType> {
        self.key.chars().last().and_then(VarType::from_suffix)
    }

    /// First letter, used for `DEFtype` resolution
    pub fn initial(&self) -> char {
        self.key.chars().next().unwrap_or('A')
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "NOT ",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            UnaryOp::Not => 6,
            UnaryOp::Neg => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Pow,
    Mul,
    Div,
    IntDiv,
    Mod,
    Add,
    Sub,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
    Eqv,
    Imp,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Pow => "^",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::IntDiv => "\\",
            BinaryOp::Mod => "MOD",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
            BinaryOp::Eqv => "EQV",
            BinaryOp::Imp => "IMP",
        }
    }

    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Imp => 1,
            BinaryOp::Eqv => 2,
            BinaryOp::Xor => 3,
            BinaryOp::Or => 4,
            BinaryOp::And => 5,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
            BinaryOp::Add | BinaryOp::Sub => 8,
            BinaryOp::Mod => 9,
            BinaryOp::IntDiv => 10,
            BinaryOp::Mul | BinaryOp::Div => 11,
            BinaryOp::Pow => 13,
        }
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Mul
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Xor
                | BinaryOp::Eqv
        )
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(
            self,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Eqv | BinaryOp::Imp
        )
    }

    /// Relational operator with the opposite truth value
    pub fn inverted(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Ne),
            BinaryOp::Ne => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::Ge),
            BinaryOp::Ge => Some(BinaryOp::Lt),
            BinaryOp::Gt => Some(BinaryOp::Le),
            BinaryOp::Le => Some(BinaryOp::Gt),
            _ => None,
        }
    }

    /// Relational operator with its operands exchanged (`A < B` == `B > A`)
    pub fn swapped(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq | BinaryOp::Ne => Some(self),
            BinaryOp::Lt => Some(BinaryOp::Gt),
            BinaryOp::Gt => Some(BinaryOp::Lt),
            BinaryOp::Le => Some(BinaryOp::Ge),
            BinaryOp::Ge => Some(BinaryOp::Le),
            _ => None,
        }
    }
}

/// Intrinsic functions whose result may differ between two identical calls
pub const IMPURE_BUILTINS: &[&str] = &[
    "RND", "INKEY$", "INPUT$", "PEEK", "INP", "FRE", "POS", "LPOS", "EOF", "LOC", "LOF", "USR",
    "VARPTR", "TIMER", "ERR", "ERL",
];

/// Intrinsic function names recognized in expressions
pub const BUILTINS: &[&str] = &[
    "ABS", "ASC", "ATN", "CDBL", "CHR$", "CINT", "COS", "CSNG", "CVD", "CVI", "CVS", "EOF", "EXP",
    "ERL", "ERR", "FIX", "FRE", "HEX$", "INKEY$", "INP", "INPUT$", "INSTR", "INT", "LEFT$", "LEN", "LOC", "LOF",
    "LOG", "LPOS", "MID$", "MKD$", "MKI$", "MKS$", "OCT$", "PEEK", "POS", "RIGHT$", "RND", "SGN",
    "SIN", "SPACE$", "SPC", "SQR", "STR$", "STRING$", "TAB", "TAN", "TIMER", "USR", "VAL", "VARPTR",
];

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number { value: f64, text: String },
    Str(String),
    Variable(Identifier),
    ArrayElement { name: Identifier, indices: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    /// Intrinsic call, name stored upper-cased
    Builtin { name: String, args: Vec<Expr> },
    /// User function defined with `DEF FN`
    FnCall { name: Identifier, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: LineNumber,
}

impl Expr {
    pub fn new(kind: ExprKind, line: LineNumber) -> Self {
        Self { kind, line }
    }

    pub fn number(value: f64, line: LineNumber) -> Self {
        Self::new(
            ExprKind::Number {
                value,
                text: format_number(value),
            },
            line,
        )
    }

    pub fn variable(name: &str, line: LineNumber) -> Self {
        Self::new(ExprKind::Variable(Identifier::new(name)), line)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let line = operand.line;
        Self::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            line,
        )
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let line = left.line;
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            line,
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match &self.kind {
            ExprKind::Number { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Number { .. } | ExprKind::Str(_))
    }

    /// Variables and literals: nothing worth reusing
    pub fn is_trivial(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Number { .. } | ExprKind::Str(_) | ExprKind::Variable(_)
        )
    }

    /// Direct operands, in evaluation order
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Number { .. } | ExprKind::Str(_) | ExprKind::Variable(_) => Vec::new(),
            ExprKind::ArrayElement { indices, .. } => indices.iter().collect(),
            ExprKind::Unary { operand, .. } => vec![operand.as_ref()],
            ExprKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            ExprKind::Builtin { args, .. } | ExprKind::FnCall { args, .. } => args.iter().collect(),
        }
    }

    /// True if evaluating the expression can observe or cause more than its operands
    pub fn has_side_effects(&self) -> bool {
        match &self.kind {
            ExprKind::FnCall { .. } => true,
            ExprKind::Builtin { name, args } => {
                IMPURE_BUILTINS.contains(&name.as_str()) || args.iter().any(Expr::has_side_effects)
            }
            _ => self.children().into_iter().any(Expr::has_side_effects),
        }
    }

    /// Canonical text with operands of commutative operators put in a fixed order
    pub fn normalized_key(&self) -> String {
        match &self.kind {
            ExprKind::Binary { op, left, right } if op.is_commutative() => {
                let (l, r) = (left.normalized_key(), right.normalized_key());
                let (l, r) = if l <= r { (l, r) } else { (r, l) };
                format!("({} {} {})", l, op.symbol(), r)
            }
            ExprKind::Binary { op, left, right } => {
                format!("({} {} {})", left.normalized_key(), op.symbol(), right.normalized_key())
            }
            ExprKind::Unary { op, operand } => format!("({}{})", op.symbol(), operand.normalized_key()),
            ExprKind::ArrayElement { name, indices } => {
                let parts: Vec<String> = indices.iter().map(Expr::normalized_key).collect();
                format!("{}({})", name.key, parts.join(", "))
            }
            ExprKind::Builtin { name, args } => {
                let parts: Vec<String> = args.iter().map(Expr::normalized_key).collect();
                format!("{}({})", name, parts.join(", "))
            }
            ExprKind::FnCall { name, args } => {
                let parts: Vec<String> = args.iter().map(Expr::normalized_key).collect();
                format!("{}({})", name.key, parts.join(", "))
            }
            _ => self.to_string(),
        }
    }

    /// Text with identifiers and numbers spelled as typed
    pub fn source_text(&self) -> String {
        let mut out = String::new();
        render(self, true, &mut out);
        out
    }

    fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::Unary { op, .. } => op.precedence(),
            ExprKind::Binary { op, .. } => op.precedence(),
            _ => 14,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        render(self, false, &mut out);
        write!(f, "{}", out)
    }
}

fn render(expr: &Expr, original: bool, out: &mut String) {
    let name = |id: &Identifier| if original { id.text.clone() } else { id.key.clone() };
    let list = |items: &[Expr], out: &mut String| {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            render(item, original, out);
        }
    };

    match &expr.kind {
        ExprKind::Number { value, text } => {
            if original {
                out.push_str(text);
            } else {
                out.push_str(&format_number(*value));
            }
        }
        ExprKind::Str(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        ExprKind::Variable(id) => out.push_str(&name(id)),
        ExprKind::ArrayElement { name: id, indices } => {
            out.push_str(&name(id));
            out.push('(');
            list(indices, out);
            out.push(')');
        }
        ExprKind::Builtin { name: builtin, args } => {
            out.push_str(builtin);
            if !args.is_empty() {
                out.push('(');
                list(args, out);
                out.push(')');
            }
        }
        ExprKind::FnCall { name: id, args } => {
            out.push_str(&name(id));
            if !args.is_empty() {
                out.push('(');
                list(args, out);
                out.push(')');
            }
        }
        ExprKind::Unary { op, operand } => {
            out.push_str(op.symbol());
            render_operand(operand, op.precedence(), false, original, out);
        }
        ExprKind::Binary { op, left, right } => {
            let prec = op.precedence();
            render_operand(left, prec, false, original, out);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            render_operand(right, prec, true, original, out);
        }
    }
}

fn render_operand(operand: &Expr, parent: u8, right: bool, original: bool, out: &mut String) {
    let child = operand.precedence();
    let needs_parens = child < parent || (right && child == parent);
    if needs_parens {
        out.push('(');
    }
    render(operand, original, out);
    if needs_parens {
        out.push(')');
    }
}

/// Render a numeric value the way listings show it (`2`, `0.5`, `-3`)
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Assignment target
#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    Scalar(Identifier),
    Element { name: Identifier, indices: Vec<Expr> },
}

impl LValue {
    pub fn name(&self) -> &Identifier {
        match self {
            LValue::Scalar(name) | LValue::Element { name, .. } => name,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, LValue::Element { .. })
    }

    /// The target read back as an expression
    pub fn to_expr(&self, line: LineNumber) -> Expr {
        match self {
            LValue::Scalar(name) => Expr::new(ExprKind::Variable(name.clone()), line),
            LValue::Element { name, indices } => Expr::new(
                ExprKind::ArrayElement {
                    name: name.clone(),
                    indices: indices.clone(),
                },
                line,
            ),
        }
    }
}

impl fmt::Display for LValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr(0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrintItem {
    Expr(Expr),
    /// `,` advances to the next print zone
    Comma,
    /// `;` suppresses spacing
    Semicolon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDecl {
    pub name: Identifier,
    /// Inclusive upper bounds as written
    pub extents: Vec<Expr>,
}

/// One `THEN`/`ELSE` arm
#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    /// `THEN 100` / `ELSE 200`
    Line(LineNumber),
    Statements(Vec<Statement>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeTarget {
    /// `RESUME` / `RESUME 0`: retry the failing statement
    Retry,
    Next,
    Line(LineNumber),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Let { target: LValue, value: Expr },
    Print { channel: Option<Expr>, items: Vec<PrintItem> },
    Input { channel: Option<Expr>, prompt: Option<String>, targets: Vec<LValue> },
    LineInput { channel: Option<Expr>, prompt: Option<String>, target: LValue },
    Read { targets: Vec<LValue> },
    Data { items: Vec<String> },
    Restore { line: Option<LineNumber> },
    Dim { arrays: Vec<ArrayDecl> },
    OptionBase { base: u32 },
    /// `DEFINT A-C, X` and friends
    DefType { var_type: VarType, ranges: Vec<(char, char)> },
    DefFn { name: Identifier, params: Vec<Identifier>, body: Expr },
    If { condition: Expr, then_branch: Branch, else_branch: Option<Branch> },
    For { var: Identifier, start: Expr, end: Expr, step: Option<Expr> },
    Next { vars: Vec<Identifier> },
    While { condition: Expr },
    Wend,
    Goto { target: LineNumber },
    Gosub { target: LineNumber },
    Return,
    OnGoto { selector: Expr, targets: Vec<LineNumber> },
    OnGosub { selector: Expr, targets: Vec<LineNumber> },
    /// `ON ERROR GOTO 0` disables trapping
    OnErrorGoto { target: LineNumber },
    Resume { target: ResumeTarget },
    End,
    Stop,
    Swap { left: LValue, right: LValue },
    Randomize { seed: Option<Expr> },
    Tron,
    Troff,
    Common { names: Vec<Identifier> },
    Erase { names: Vec<Identifier> },
    Rem { text: String },
    /// Interactive-only command such as `LIST` or `SAVE`
    Command { name: String, text: String },
    /// Statement with no analysis significance beyond its argument expressions
    Other { keyword: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: LineNumber,
    /// 1-based column of the statement's first character in its physical line
    pub column: usize,
}

impl Statement {
    pub fn new(kind: StatementKind, line: LineNumber, column: usize) -> Self {
        Self { kind, line, column }
    }

    /// Keyword naming the statement, for messages
    pub fn keyword(&self) -> &str {
        match &self.kind {
            StatementKind::Let { .. } => "LET",
            StatementKind::Print { .. } => "PRINT",
            StatementKind::Input { .. } => "INPUT",
            StatementKind::LineInput { .. } => "LINE INPUT",
            StatementKind::Read { .. } => "READ",
            StatementKind::Data { .. } => "DATA",
            StatementKind::Restore { .. } => "RESTORE",
            StatementKind::Dim { .. } => "DIM",
            StatementKind::OptionBase { .. } => "OPTION BASE",
            StatementKind::DefType { .. } => "DEFtype",
            StatementKind::DefFn { .. } => "DEF FN",
            StatementKind::If { .. } => "IF",
            StatementKind::For { .. } => "FOR",
            StatementKind::Next { .. } => "NEXT",
            StatementKind::While { .. } => "WHILE",
            StatementKind::Wend => "WEND",
            StatementKind::Goto { .. } => "GOTO",
            StatementKind::Gosub { .. } => "GOSUB",
            StatementKind::Return => "RETURN",
            StatementKind::OnGoto { .. } => "ON GOTO",
            StatementKind::OnGosub { .. } => "ON GOSUB",
            StatementKind::OnErrorGoto { .. } => "ON ERROR GOTO",
            StatementKind::Resume { .. } => "RESUME",
            StatementKind::End => "END",
            StatementKind::Stop => "STOP",
            StatementKind::Swap { .. } => "SWAP",
            StatementKind::Randomize { .. } => "RANDOMIZE",
            StatementKind::Tron => "TRON",
            StatementKind::Troff => "TROFF",
            StatementKind::Common { .. } => "COMMON",
            StatementKind::Erase { .. } => "ERASE",
            StatementKind::Rem { .. } => "REM",
            StatementKind::Command { name, .. } => name,
            StatementKind::Other { keyword, .. } => keyword,
        }
    }
}

/// One numbered program line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramLine {
    pub number: LineNumber,
    pub statements: Vec<Statement>,
    /// Physical line in the loaded text (1-based)
    pub source_line: usize,
}

/// A parsed program, lines in ascending line-number order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub lines: Vec<ProgramLine>,
}

impl Program {
    pub fn new(lines: Vec<ProgramLine>) -> Self {
        Self { lines }
    }

    pub fn line(&self, number: LineNumber) -> Option<&ProgramLine> {
        self.lines
            .binary_search_by_key(&number, |l| l.number)
            .ok()
            .map(|i| &self.lines[i])
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.lines.iter().flat_map(|l| l.statements.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::variable(name, 10)
    }

    #[test]
    fn test_identifier_key_and_text() {
        let id = Identifier::new("total%");
        assert_eq!(id.key, "TOTAL%");
        assert_eq!(id.text, "total%");
        assert_eq!(id.suffix(), Some(VarType::Integer));
        assert_eq!(id.initial(), 'T');
        assert_eq!(Identifier::new("x").suffix(), None);
    }

    #[test]
    fn test_display_minimal_parens() {
        let sum = Expr::binary(BinaryOp::Add, var("a"), var("b"));
        let product = Expr::binary(BinaryOp::Mul, sum.clone(), var("c"));
        assert_eq!(product.to_string(), "(A + B) * C");
        assert_eq!(product.source_text(), "(a + b) * c");

        let left_assoc = Expr::binary(BinaryOp::Sub, Expr::binary(BinaryOp::Sub, var("a"), var("b")), var("c"));
        assert_eq!(left_assoc.to_string(), "A - B - C");
        let right_nested = Expr::binary(BinaryOp::Sub, var("a"), Expr::binary(BinaryOp::Sub, var("b"), var("c")));
        assert_eq!(right_nested.to_string(), "A - (B - C)");

        let not_and = Expr::unary(UnaryOp::Not, Expr::binary(BinaryOp::And, var("a"), var("b")));
        assert_eq!(not_and.to_string(), "NOT (A AND B)");
    }

    #[test]
    fn test_normalized_key_orders_commutative_operands() {
        let ab = Expr::binary(BinaryOp::Add, var("A"), var("B"));
        let ba = Expr::binary(BinaryOp::Add, var("b"), var("a"));
        assert_eq!(ab.normalized_key(), ba.normalized_key());

        let amb = Expr::binary(BinaryOp::Sub, var("A"), var("B"));
        let bma = Expr::binary(BinaryOp::Sub, var("B"), var("A"));
        assert_ne!(amb.normalized_key(), bma.normalized_key());
    }

    #[test]
    fn test_side_effects() {
        let rnd = Expr::new(ExprKind::Builtin { name: "RND".into(), args: vec![] }, 10);
        let sqr = Expr::new(ExprKind::Builtin { name: "SQR".into(), args: vec![var("X")] }, 10);
        let fn_call = Expr::new(ExprKind::FnCall { name: Identifier::new("FNA"), args: vec![] }, 10);
        assert!(rnd.has_side_effects());
        assert!(!sqr.has_side_effects());
        assert!(fn_call.has_side_effects());
        assert!(Expr::binary(BinaryOp::Add, var("X"), rnd).has_side_effects());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.5), "0.5");
    }

    #[test]
    fn test_relational_inversion() {
        assert_eq!(BinaryOp::Lt.inverted(), Some(BinaryOp::Ge));
        assert_eq!(BinaryOp::Le.swapped(), Some(BinaryOp::Ge));
        assert_eq!(BinaryOp::Add.inverted(), None);
    }
}
