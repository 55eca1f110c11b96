//! Line parser for MBASIC programs
//!
//! Each physical line holds one numbered program line made of `:`-separated
//! statements. Keywords are case-insensitive; identifiers keep their typed
//! spelling. Parsers take a [`LineContext`] so nodes can record their program
//! line and column.

use std::collections::BTreeMap;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{char, digit1, hex_digit1, one_of, satisfy, space0},
    combinator::{map, map_res, opt, recognize},
    error::{Error, ErrorKind},
    multi::{separated_list0, separated_list1},
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};

use diagnostics::{DiagnosticBuilder, Diagnostics, SourcePosition};

use crate::ast::*;

pub type PResult<'a, T> = IResult<&'a str, T, Error<&'a str>>;

/// Position information threaded through the parsers of one physical line
#[derive(Debug, Clone, Copy)]
pub struct LineContext<'a> {
    pub full: &'a str,
    pub line: LineNumber,
}

impl<'a> LineContext<'a> {
    pub fn new(full: &'a str, line: LineNumber) -> Self {
        Self { full, line }
    }

    /// 1-based column of `input` within the physical line
    pub fn column(&self, input: &str) -> usize {
        self.full.len() - input.len() + 1
    }
}

fn fail<T>(input: &str, kind: ErrorKind) -> PResult<'_, T> {
    Err(nom::Err::Error(Error::new(input, kind)))
}

// =============================================================================
// Lexical helpers
// =============================================================================

/// Skip blanks (MBASIC lines never contain comments other than REM and `'`)
pub fn ws(input: &str) -> PResult<'_, &str> {
    space0(input)
}

fn word_no_case<'a>(word: &'static str, input: &'a str) -> PResult<'a, &'a str> {
    tag_no_case(word).parse(input)
}

/// Parse a case-insensitive keyword that is not the start of a longer name
pub fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input| {
        let (input, _) = ws(input)?;
        let (rest, word) = word_no_case(kw, input)?;
        if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return fail(input, ErrorKind::Tag);
        }
        Ok((rest, word))
    }
}

/// Parse a punctuation symbol with leading blanks
pub fn symbol<'a>(sym: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input| {
        let (input, _) = ws(input)?;
        tag(sym).parse(input)
    }
}

fn operator<'a>(op: &'static str, input: &'a str) -> PResult<'a, &'a str> {
    if op.starts_with(|c: char| c.is_ascii_alphabetic()) {
        keyword(op)(input)
    } else {
        symbol(op)(input)
    }
}

/// Words that can never be variable names
const RESERVED: &[&str] = &[
    "AND", "OR", "NOT", "XOR", "EQV", "IMP", "MOD", "TO", "STEP", "THEN", "ELSE", "GOTO", "GOSUB",
    "PRINT", "IF", "FOR", "NEXT", "LET", "INPUT", "READ", "DATA", "DIM", "REM", "END", "STOP",
    "RETURN", "ON", "ERROR", "RESUME", "WHILE", "WEND", "USING", "LINE", "SWAP", "DEF", "OPTION",
    "BASE",
];

fn raw_name(input: &str) -> PResult<'_, &str> {
    recognize((
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '.'),
        opt(one_of("%!#$")),
    ))
    .parse(input)
}

/// Parse a variable or array name
pub fn identifier(input: &str) -> PResult<'_, Identifier> {
    let (input, _) = ws(input)?;
    let (rest, name) = raw_name(input)?;
    let upper = name.to_ascii_uppercase();
    if RESERVED.contains(&upper.as_str()) || upper.starts_with("FN") {
        return fail(input, ErrorKind::Verify);
    }
    Ok((rest, Identifier::new(name)))
}

/// Parse a program line number reference
pub fn line_number(input: &str) -> PResult<'_, LineNumber> {
    preceded(ws, map_res(digit1, |digits: &str| digits.parse::<LineNumber>())).parse(input)
}

fn string_literal(input: &str) -> PResult<'_, String> {
    // a string may run to the end of the line without a closing quote
    map(
        preceded(ws, delimited(char('"'), take_while(|c| c != '"'), opt(char('"')))),
        |body: &str| body.to_string(),
    )
    .parse(input)
}

/// True at `:`, end of line, a `'` remark or `ELSE`
fn at_statement_end(input: &str) -> bool {
    let trimmed = input.trim_start();
    trimmed.is_empty()
        || trimmed.starts_with(':')
        || trimmed.starts_with('\'')
        || keyword("ELSE")(trimmed).is_ok()
}

// =============================================================================
// Expressions
// =============================================================================

/// Parse any expression
pub fn expression<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    imp_expr(ctx, input)
}

type Level<'a> = fn(LineContext<'a>, &'a str) -> PResult<'a, Expr>;

/// Left-associative run of `operand (op operand)*`
fn binary_level<'a>(
    ctx: LineContext<'a>,
    input: &'a str,
    operand: Level<'a>,
    ops: &[(&'static str, BinaryOp)],
) -> PResult<'a, Expr> {
    let (mut input, mut left) = operand(ctx, input)?;
    loop {
        let matched = ops
            .iter()
            .find_map(|&(text, op)| operator(text, input).ok().map(|(rest, _)| (rest, op)));
        match matched {
            Some((rest, op)) => {
                let (rest, right) = operand(ctx, rest)?;
                left = Expr::binary(op, left, right);
                input = rest;
            }
            None => return Ok((input, left)),
        }
    }
}

fn imp_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(ctx, input, eqv_expr, &[("IMP", BinaryOp::Imp)])
}

fn eqv_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(ctx, input, xor_expr, &[("EQV", BinaryOp::Eqv)])
}

fn xor_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(ctx, input, or_expr, &[("XOR", BinaryOp::Xor)])
}

fn or_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(ctx, input, and_expr, &[("OR", BinaryOp::Or)])
}

fn and_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(ctx, input, not_expr, &[("AND", BinaryOp::And)])
}

fn not_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    if let Ok((rest, _)) = keyword("NOT")(input) {
        let (rest, operand) = not_expr(ctx, rest)?;
        return Ok((rest, Expr::unary(UnaryOp::Not, operand)));
    }
    relational_expr(ctx, input)
}

fn relational_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(
        ctx,
        input,
        additive_expr,
        &[
            ("<>", BinaryOp::Ne),
            ("><", BinaryOp::Ne),
            ("<=", BinaryOp::Le),
            ("=<", BinaryOp::Le),
            (">=", BinaryOp::Ge),
            ("=>", BinaryOp::Ge),
            ("<", BinaryOp::Lt),
            (">", BinaryOp::Gt),
            ("=", BinaryOp::Eq),
        ],
    )
}

fn additive_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(ctx, input, mod_expr, &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)])
}

fn mod_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(ctx, input, int_div_expr, &[("MOD", BinaryOp::Mod)])
}

fn int_div_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(ctx, input, multiplicative_expr, &[("\\", BinaryOp::IntDiv)])
}

fn multiplicative_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_level(ctx, input, negation_expr, &[("*", BinaryOp::Mul), ("/", BinaryOp::Div)])
}

fn negation_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    if let Ok((rest, _)) = symbol("-")(input) {
        let (rest, operand) = negation_expr(ctx, rest)?;
        return Ok((rest, Expr::unary(UnaryOp::Neg, operand)));
    }
    if let Ok((rest, _)) = symbol("+")(input) {
        return negation_expr(ctx, rest);
    }
    power_expr(ctx, input)
}

fn power_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    let (mut input, mut left) = atom(ctx, input)?;
    while let Ok((rest, _)) = symbol("^")(input) {
        let (rest, right) = exponent(ctx, rest)?;
        left = Expr::binary(BinaryOp::Pow, left, right);
        input = rest;
    }
    Ok((input, left))
}

/// `2^-1` is accepted, so the exponent may carry its own sign
fn exponent<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    if let Ok((rest, _)) = symbol("-")(input) {
        let (rest, operand) = exponent(ctx, rest)?;
        return Ok((rest, Expr::unary(UnaryOp::Neg, operand)));
    }
    atom(ctx, input)
}

fn atom<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    alt((
        |i| number_literal(ctx, i),
        |i| string_literal(i).map(|(rest, s)| (rest, Expr::new(ExprKind::Str(s), ctx.line))),
        |i| delimited(symbol("("), |j| expression(ctx, j), symbol(")")).parse(i),
        |i| fn_call(ctx, i),
        |i| named_expr(ctx, i),
    ))
    .parse(input)
}

fn decimal_number(input: &str) -> PResult<'_, &str> {
    if !input.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return fail(input, ErrorKind::Float);
    }
    recognize(pair(recognize_float, opt(one_of("%!#")))).parse(input)
}

fn number_literal<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    let (input, _) = ws(input)?;

    if let Ok((rest, digits)) = preceded(word_no_case_parser("&H"), hex_digit1).parse(input) {
        let value = i64::from_str_radix(digits, 16).unwrap_or(0) as f64;
        let text = &input[..input.len() - rest.len()];
        let kind = ExprKind::Number {
            value,
            text: text.to_string(),
        };
        return Ok((rest, Expr::new(kind, ctx.line)));
    }

    let (rest, text) = decimal_number(input)?;
    let numeric = text.trim_end_matches(['%', '!', '#']);
    let value = match numeric.parse::<f64>() {
        Ok(value) => value,
        Err(_) => return fail(input, ErrorKind::Float),
    };
    let kind = ExprKind::Number {
        value,
        text: text.to_string(),
    };
    Ok((rest, Expr::new(kind, ctx.line)))
}

fn word_no_case_parser<'a>(word: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input| word_no_case(word, input)
}

fn argument_list<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Vec<Expr>> {
    delimited(
        symbol("("),
        separated_list1(symbol(","), |i| expression(ctx, i)),
        symbol(")"),
    )
    .parse(input)
}

/// `FN` name: `FNA`, `FN A`, `fnTotal%`
fn fn_name(input: &str) -> PResult<'_, Identifier> {
    let (input, _) = ws(input)?;
    let (rest, fn_word) = word_no_case("FN", input)?;
    let (rest, _) = ws(rest)?;
    let (rest, name) = raw_name(rest)?;
    Ok((rest, Identifier::new(format!("{}{}", fn_word, name))))
}

fn fn_call<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    let (rest, name) = fn_name(input)?;
    let (rest, args) = opt(|i| argument_list(ctx, i)).parse(rest)?;
    let kind = ExprKind::FnCall {
        name,
        args: args.unwrap_or_default(),
    };
    Ok((rest, Expr::new(kind, ctx.line)))
}

/// Variable, array element or intrinsic call
fn named_expr<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Expr> {
    let (input, _) = ws(input)?;
    let (rest, name) = raw_name(input)?;
    let upper = name.to_ascii_uppercase();

    if BUILTINS.contains(&upper.as_str()) {
        let (rest, args) = opt(|i| argument_list(ctx, i)).parse(rest)?;
        let kind = ExprKind::Builtin {
            name: upper,
            args: args.unwrap_or_default(),
        };
        return Ok((rest, Expr::new(kind, ctx.line)));
    }

    let (rest, name) = identifier(input)?;
    if rest.trim_start().starts_with('(') {
        let (rest, indices) = argument_list(ctx, rest)?;
        return Ok((rest, Expr::new(ExprKind::ArrayElement { name, indices }, ctx.line)));
    }
    Ok((rest, Expr::new(ExprKind::Variable(name), ctx.line)))
}

/// Assignment target: `X`, `A$(I, J)`
pub fn lvalue<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, LValue> {
    let (rest, name) = identifier(input)?;
    if rest.trim_start().starts_with('(') {
        let (rest, indices) = argument_list(ctx, rest)?;
        return Ok((rest, LValue::Element { name, indices }));
    }
    Ok((rest, LValue::Scalar(name)))
}

// =============================================================================
// Statements
// =============================================================================

fn let_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = opt(keyword("LET")).parse(input)?;
    let (input, target) = lvalue(ctx, input)?;
    let (input, _) = symbol("=").parse(input)?;
    let (input, value) = expression(ctx, input)?;
    Ok((input, StatementKind::Let { target, value }))
}

/// `#n,` file channel prefix
fn channel<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Option<Expr>> {
    opt(delimited(symbol("#"), |i| expression(ctx, i), symbol(","))).parse(input)
}

fn print_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = alt((keyword("PRINT"), keyword("LPRINT"), symbol("?"))).parse(input)?;
    let (input, channel) = channel(ctx, input)?;
    let (mut input, _) = opt(keyword("USING")).parse(input)?;

    let mut items = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        if at_statement_end(rest) {
            return Ok((rest, StatementKind::Print { channel, items }));
        }
        if let Some(rest) = rest.strip_prefix(',') {
            items.push(PrintItem::Comma);
            input = rest;
        } else if let Some(rest) = rest.strip_prefix(';') {
            items.push(PrintItem::Semicolon);
            input = rest;
        } else {
            let (rest, expr) = expression(ctx, rest)?;
            items.push(PrintItem::Expr(expr));
            input = rest;
        }
    }
}

/// Optional `"prompt";` before an INPUT variable list
fn input_prompt<'a>(input: &'a str) -> PResult<'a, Option<String>> {
    let (input, _) = opt(symbol(";")).parse(input)?;
    opt(|i: &'a str| -> PResult<'a, String> {
        let (i, prompt) = string_literal(i)?;
        let (i, _) = alt((symbol(";"), symbol(","))).parse(i)?;
        Ok((i, prompt))
    })
    .parse(input)
}

fn input_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("INPUT")(input)?;
    let (input, channel) = channel(ctx, input)?;
    let (input, prompt) = input_prompt(input)?;
    let (input, targets) = separated_list1(symbol(","), |i| lvalue(ctx, i)).parse(input)?;
    Ok((input, StatementKind::Input { channel, prompt, targets }))
}

fn line_input_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("LINE")(input)?;
    let (input, _) = keyword("INPUT")(input)?;
    let (input, channel) = channel(ctx, input)?;
    let (input, prompt) = input_prompt(input)?;
    let (input, target) = lvalue(ctx, input)?;
    Ok((input, StatementKind::LineInput { channel, prompt, target }))
}

fn read_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("READ")(input)?;
    let (input, targets) = separated_list1(symbol(","), |i| lvalue(ctx, i)).parse(input)?;
    Ok((input, StatementKind::Read { targets }))
}

/// DATA runs to the next `:` outside quotes
fn data_stmt(input: &str) -> PResult<'_, StatementKind> {
    let (input, _) = keyword("DATA")(input)?;
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut end = input.len();
    for (i, c) in input.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ':' if !quoted => {
                end = i;
                break;
            }
            ',' if !quoted => {
                items.push(current.trim().trim_matches('"').to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() || !items.is_empty() {
        items.push(current.trim().trim_matches('"').to_string());
    }
    Ok((&input[end..], StatementKind::Data { items }))
}

fn restore_stmt(input: &str) -> PResult<'_, StatementKind> {
    let (input, _) = keyword("RESTORE")(input)?;
    let (input, line) = opt(line_number).parse(input)?;
    Ok((input, StatementKind::Restore { line }))
}

fn dim_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("DIM")(input)?;
    let (input, arrays) = separated_list1(symbol(","), |i: &'a str| -> PResult<'a, ArrayDecl> {
        let (i, name) = identifier(i)?;
        let (i, extents) = argument_list(ctx, i)?;
        Ok((i, ArrayDecl { name, extents }))
    })
    .parse(input)?;
    Ok((input, StatementKind::Dim { arrays }))
}

fn option_base_stmt(input: &str) -> PResult<'_, StatementKind> {
    let (input, _) = keyword("OPTION")(input)?;
    let (input, _) = keyword("BASE")(input)?;
    let (input, base) = preceded(ws, map_res(digit1, |d: &str| d.parse::<u32>())).parse(input)?;
    Ok((input, StatementKind::OptionBase { base }))
}

fn letter(input: &str) -> PResult<'_, char> {
    preceded(ws, satisfy(|c| c.is_ascii_alphabetic()))
        .parse(input)
        .map(|(rest, c)| (rest, c.to_ascii_uppercase()))
}

fn def_type_stmt<'a>(input: &'a str) -> PResult<'a, StatementKind> {
    let (input, var_type) = alt((
        map(keyword("DEFINT"), |_| VarType::Integer),
        map(keyword("DEFSNG"), |_| VarType::Single),
        map(keyword("DEFDBL"), |_| VarType::Double),
        map(keyword("DEFSTR"), |_| VarType::String),
    ))
    .parse(input)?;
    let (input, ranges) = separated_list1(symbol(","), |i: &'a str| -> PResult<'a, (char, char)> {
        let (i, first) = letter(i)?;
        let (i, last) = opt(preceded(symbol("-"), letter)).parse(i)?;
        Ok((i, (first, last.unwrap_or(first))))
    })
    .parse(input)?;
    Ok((input, StatementKind::DefType { var_type, ranges }))
}

fn def_fn_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("DEF")(input)?;
    let (input, name) = fn_name(input)?;
    let (input, params) = opt(delimited(
        symbol("("),
        separated_list0(symbol(","), identifier),
        symbol(")"),
    ))
    .parse(input)?;
    let (input, _) = symbol("=").parse(input)?;
    let (input, body) = expression(ctx, input)?;
    Ok((
        input,
        StatementKind::DefFn {
            name,
            params: params.unwrap_or_default(),
            body,
        },
    ))
}

/// `THEN 100`, `THEN PRINT X : GOTO 20`
fn branch<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Branch> {
    if let Ok((rest, target)) = line_number(input) {
        if at_statement_end(rest) {
            return Ok((rest, Branch::Line(target)));
        }
    }
    let (rest, stmts) = statement_list(ctx, input)?;
    Ok((rest, Branch::Statements(stmts)))
}

fn if_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("IF")(input)?;
    let (input, condition) = expression(ctx, input)?;
    let (input, then_branch) = alt((
        preceded(keyword("THEN"), |i| branch(ctx, i)),
        map(preceded(keyword("GOTO"), line_number), Branch::Line),
    ))
    .parse(input)?;
    let (input, else_branch) = opt(preceded(keyword("ELSE"), |i| branch(ctx, i))).parse(input)?;
    Ok((
        input,
        StatementKind::If {
            condition,
            then_branch,
            else_branch,
        },
    ))
}

fn for_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("FOR")(input)?;
    let (input, var) = identifier(input)?;
    let (input, _) = symbol("=").parse(input)?;
    let (input, start) = expression(ctx, input)?;
    let (input, _) = keyword("TO")(input)?;
    let (input, end) = expression(ctx, input)?;
    let (input, step) = opt(preceded(keyword("STEP"), |i| expression(ctx, i))).parse(input)?;
    Ok((input, StatementKind::For { var, start, end, step }))
}

fn next_stmt(input: &str) -> PResult<'_, StatementKind> {
    let (input, _) = keyword("NEXT")(input)?;
    let (input, vars) = separated_list0(symbol(","), identifier).parse(input)?;
    Ok((input, StatementKind::Next { vars }))
}

fn while_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("WHILE")(input)?;
    let (input, condition) = expression(ctx, input)?;
    Ok((input, StatementKind::While { condition }))
}

fn jump_stmt(input: &str) -> PResult<'_, StatementKind> {
    alt((
        map(preceded(keyword("GOTO"), line_number), |target| StatementKind::Goto { target }),
        map(preceded(keyword("GOSUB"), line_number), |target| StatementKind::Gosub { target }),
        map(keyword("RETURN"), |_| StatementKind::Return),
    ))
    .parse(input)
}

fn on_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("ON")(input)?;
    if let Ok((rest, _)) = keyword("ERROR")(input) {
        let (rest, _) = keyword("GOTO")(rest)?;
        let (rest, target) = line_number(rest)?;
        return Ok((rest, StatementKind::OnErrorGoto { target }));
    }
    let (input, selector) = expression(ctx, input)?;
    let (input, is_gosub) = alt((map(keyword("GOTO"), |_| false), map(keyword("GOSUB"), |_| true)))
        .parse(input)?;
    let (input, targets) = separated_list1(symbol(","), line_number).parse(input)?;
    let kind = if is_gosub {
        StatementKind::OnGosub { selector, targets }
    } else {
        StatementKind::OnGoto { selector, targets }
    };
    Ok((input, kind))
}

fn resume_stmt(input: &str) -> PResult<'_, StatementKind> {
    let (input, _) = keyword("RESUME")(input)?;
    if let Ok((rest, _)) = keyword("NEXT")(input) {
        return Ok((rest, StatementKind::Resume { target: ResumeTarget::Next }));
    }
    let (input, line) = opt(line_number).parse(input)?;
    let target = match line {
        None | Some(0) => ResumeTarget::Retry,
        Some(line) => ResumeTarget::Line(line),
    };
    Ok((input, StatementKind::Resume { target }))
}

fn simple_stmt(input: &str) -> PResult<'_, StatementKind> {
    alt((
        map(keyword("END"), |_| StatementKind::End),
        map(keyword("STOP"), |_| StatementKind::Stop),
        map(keyword("WEND"), |_| StatementKind::Wend),
        map(keyword("TRON"), |_| StatementKind::Tron),
        map(keyword("TROFF"), |_| StatementKind::Troff),
    ))
    .parse(input)
}

fn swap_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("SWAP")(input)?;
    let (input, left) = lvalue(ctx, input)?;
    let (input, _) = symbol(",").parse(input)?;
    let (input, right) = lvalue(ctx, input)?;
    Ok((input, StatementKind::Swap { left, right }))
}

fn randomize_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (input, _) = keyword("RANDOMIZE")(input)?;
    if at_statement_end(input) {
        return Ok((input, StatementKind::Randomize { seed: None }));
    }
    let (input, seed) = expression(ctx, input)?;
    Ok((input, StatementKind::Randomize { seed: Some(seed) }))
}

/// `COMMON A, B()` / `ERASE A, B`
fn name_list<'a>(input: &'a str) -> PResult<'a, Vec<Identifier>> {
    separated_list1(symbol(","), |i: &'a str| -> PResult<'a, Identifier> {
        let (i, name) = identifier(i)?;
        let (i, _) = opt(pair(symbol("("), symbol(")"))).parse(i)?;
        Ok((i, name))
    })
    .parse(input)
}

fn common_erase_stmt(input: &str) -> PResult<'_, StatementKind> {
    alt((
        map(preceded(keyword("COMMON"), name_list), |names| StatementKind::Common { names }),
        map(preceded(keyword("ERASE"), name_list), |names| StatementKind::Erase { names }),
    ))
    .parse(input)
}

fn rem_stmt(input: &str) -> PResult<'_, StatementKind> {
    let (input, _) = ws(input)?;
    let (input, _) = alt((word_no_case_parser("REM"), tag("'"))).parse(input)?;
    let text = input.trim();
    Ok(("", StatementKind::Rem { text: text.to_string() }))
}

const COMMANDS: &[&str] = &["LIST", "LOAD", "SAVE", "MERGE", "NEW", "CONT", "DELETE", "RENUM"];

fn command_stmt(input: &str) -> PResult<'_, StatementKind> {
    let (input, _) = ws(input)?;
    for name in COMMANDS {
        if let Ok((rest, _)) = keyword(*name)(input) {
            let (text, rest) = rest.split_at(rest.find(':').unwrap_or(rest.len()));
            return Ok((
                rest,
                StatementKind::Command {
                    name: (*name).to_string(),
                    text: text.trim().to_string(),
                },
            ));
        }
    }
    fail(input, ErrorKind::Tag)
}

const OTHER_KEYWORDS: &[&str] = &[
    "CLS", "BEEP", "POKE", "OUT", "WIDTH", "CLOSE", "OPEN", "KILL", "WAIT", "CLEAR", "CALL", "CHAIN",
    "RUN", "SYSTEM", "WRITE", "FIELD", "GET", "PUT", "LSET", "RSET",
];

/// Keyword followed by loosely separated argument expressions
fn other_stmt<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    let (mut input, _) = ws(input)?;
    let keyword_name = OTHER_KEYWORDS
        .iter()
        .find(|kw| keyword(**kw)(input).is_ok())
        .copied();
    let Some(keyword_name) = keyword_name else {
        return fail(input, ErrorKind::Tag);
    };
    input = keyword(keyword_name)(input)?.0;

    let mut args = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        if at_statement_end(rest) {
            return Ok((
                rest,
                StatementKind::Other {
                    keyword: keyword_name.to_string(),
                    args,
                },
            ));
        }
        if let Some(rest) = rest.strip_prefix([',', ';', '#']) {
            input = rest;
            continue;
        }
        if let Ok((rest, _)) = keyword("AS")(rest) {
            input = rest;
            continue;
        }
        let (rest, expr) = expression(ctx, rest)?;
        args.push(expr);
        input = rest;
    }
}

fn statement_kind<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, StatementKind> {
    alt((
        rem_stmt,
        |i| print_stmt(ctx, i),
        |i| if_stmt(ctx, i),
        |i| for_stmt(ctx, i),
        next_stmt,
        |i| while_stmt(ctx, i),
        jump_stmt,
        |i| on_stmt(ctx, i),
        resume_stmt,
        |i| line_input_stmt(ctx, i),
        |i| input_stmt(ctx, i),
        |i| read_stmt(ctx, i),
        data_stmt,
        restore_stmt,
        |i| dim_stmt(ctx, i),
        option_base_stmt,
        def_type_stmt,
        |i| def_fn_stmt(ctx, i),
        simple_stmt,
        alt((
            |i| swap_stmt(ctx, i),
            |i| randomize_stmt(ctx, i),
            common_erase_stmt,
            command_stmt,
            |i| other_stmt(ctx, i),
            |i| let_stmt(ctx, i),
        )),
    ))
    .parse(input)
}

/// Parse a single statement, recording its line and column
pub fn statement<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Statement> {
    let (input, _) = ws(input)?;
    let column = ctx.column(input);
    let (rest, kind) = statement_kind(ctx, input)?;
    Ok((rest, Statement::new(kind, ctx.line, column)))
}

/// `stmt : stmt : ...`, stopping before `ELSE` or end of line
pub fn statement_list<'a>(ctx: LineContext<'a>, input: &'a str) -> PResult<'a, Vec<Statement>> {
    let mut statements = Vec::new();
    let mut input = input;
    loop {
        let (rest, _) = ws(input)?;
        // empty statements between colons are legal
        if let Some(after) = rest.strip_prefix(':') {
            input = after;
            continue;
        }
        if rest.is_empty() || keyword("ELSE")(rest).is_ok() {
            return Ok((rest, statements));
        }
        let (rest, stmt) = statement(ctx, rest)?;
        statements.push(stmt);
        let (rest, _) = ws(rest)?;
        if !rest.starts_with(':') && !rest.starts_with('\'') {
            return Ok((rest, statements));
        }
        input = rest;
    }
}

/// Parse one physical line into a numbered program line
pub fn program_line(full: &str, source_line: usize) -> PResult<'_, ProgramLine> {
    let (input, number) = line_number(full)?;
    let ctx = LineContext::new(full, number);
    let (input, statements) = statement_list(ctx, input)?;
    let (input, _) = ws(input)?;
    if !input.is_empty() {
        return fail(input, ErrorKind::Eof);
    }
    Ok((
        input,
        ProgramLine {
            number,
            statements,
            source_line,
        },
    ))
}

/// Parse a whole program text.
///
/// Lines are ordered by line number; a retyped line number replaces the
/// earlier line. Blank lines are ignored. Every unparsable line becomes an
/// error diagnostic.
pub fn parse_program(source: &str) -> Result<Program, Diagnostics> {
    let mut lines = BTreeMap::new();
    let mut diagnostics = Diagnostics::new();
    let mut offset = 0;

    for (index, text) in source.lines().enumerate() {
        let source_line = index + 1;
        let line_offset = offset;
        offset += text.len() + 1;

        if text.trim().is_empty() {
            continue;
        }

        match program_line(text, source_line) {
            Ok((_, line)) => {
                lines.insert(line.number, line);
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let column = text.len() - e.input.len() + 1;
                let message = if column == 1 || text.trim_start().starts_with(|c: char| !c.is_ascii_digit()) {
                    "expected line number".to_string()
                } else {
                    format!("syntax error near `{}`", e.input.trim())
                };
                diagnostics.push(
                    DiagnosticBuilder::error(message)
                        .code(if column == 1 { "E0001" } else { "E0002" })
                        .position(SourcePosition::new(source_line, column, line_offset + column - 1))
                        .build(),
                );
            }
            Err(nom::Err::Incomplete(_)) => {
                diagnostics.push(
                    DiagnosticBuilder::error("unexpected end of line")
                        .code("E0002")
                        .position(SourcePosition::new(source_line, text.len() + 1, line_offset + text.len()))
                        .build(),
                );
            }
        }
    }

    if diagnostics.has_errors() {
        return Err(diagnostics);
    }
    Ok(Program::new(lines.into_values().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(text: &str) -> Expr {
        let ctx = LineContext::new(text, 10);
        let (rest, e) = expression(ctx, text).unwrap();
        assert!(rest.trim().is_empty(), "unparsed input: {:?}", rest);
        e
    }

    #[test]
    fn test_precedence() {
        assert_eq!(expr("a + b * c").to_string(), "A + B * C");
        assert_eq!(expr("(a + b) * c").to_string(), "(A + B) * C");
        assert_eq!(expr("-2 ^ 2").to_string(), "-2 ^ 2");
        assert!(matches!(expr("-2 ^ 2").kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
        assert_eq!(expr("NOT a = b AND c").to_string(), "NOT A = B AND C");
        assert_eq!(expr("a MOD b \\ c").to_string(), "A MOD B \\ C");
        assert!(matches!(expr("a MOD b \\ c").kind, ExprKind::Binary { op: BinaryOp::Mod, .. }));
        assert!(matches!(expr("a OR b XOR c").kind, ExprKind::Binary { op: BinaryOp::Xor, .. }));
    }

    #[test]
    fn test_atoms() {
        assert!(matches!(expr("3.5").kind, ExprKind::Number { value, .. } if value == 3.5));
        assert!(matches!(expr("&HFF").kind, ExprKind::Number { value, .. } if value == 255.0));
        assert!(matches!(expr("\"hi\"").kind, ExprKind::Str(ref s) if s == "hi"));
        assert!(matches!(expr("a(1, 2)").kind, ExprKind::ArrayElement { ref indices, .. } if indices.len() == 2));
        assert!(matches!(expr("LEFT$(a$, 3)").kind, ExprKind::Builtin { ref name, .. } if name == "LEFT$"));
        assert!(matches!(expr("rnd").kind, ExprKind::Builtin { ref args, .. } if args.is_empty()));
        assert!(matches!(expr("FN a(x)").kind, ExprKind::FnCall { ref name, .. } if name.key == "FNA"));
    }

    #[test]
    fn test_identifier_keeps_spelling() {
        let e = expr("Total% + 1");
        assert_eq!(e.source_text(), "Total% + 1");
        assert_eq!(e.to_string(), "TOTAL% + 1");
    }

    #[test]
    fn test_keyword_boundaries() {
        assert!(keyword("TO")("TOTAL").is_err());
        assert!(keyword("GOTO")("goto100").is_ok());
        assert!(identifier("ELSE").is_err());
        assert!(identifier("FNA").is_err());
    }

    #[test]
    fn test_if_then_else_statements() {
        let (_, line) = program_line("30 IF X > 0 THEN Y = 1 : Z = 2 ELSE 100", 1).unwrap();
        assert_eq!(line.statements.len(), 1);
        match &line.statements[0].kind {
            StatementKind::If {
                then_branch: Branch::Statements(stmts),
                else_branch: Some(Branch::Line(100)),
                ..
            } => assert_eq!(stmts.len(), 2),
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_statement_columns() {
        let (_, line) = program_line("10 A = 1: PRINT A", 1).unwrap();
        assert_eq!(line.statements[0].column, 4);
        assert_eq!(line.statements[1].column, 11);
    }

    #[test]
    fn test_data_stops_at_colon() {
        let (_, line) = program_line("10 DATA 1, \"A:B\", x : END", 1).unwrap();
        match &line.statements[0].kind {
            StatementKind::Data { items } => assert_eq!(items, &vec!["1", "A:B", "x"]),
            other => panic!("unexpected statement: {:?}", other),
        }
        assert_eq!(line.statements[1].kind, StatementKind::End);
    }
}
