//! Whole-program parsing tests

use parser::{parse_program, Branch, ExprKind, LValue, ResumeTarget, StatementKind, VarType};

#[test]
fn test_empty_program() {
    let program = parse_program("").expect("empty text is an empty program");
    assert!(program.is_empty());
}

#[test]
fn test_lines_sorted_and_replaced() {
    let source = "30 END\n10 PRINT \"A\"\n20 X = 1\n10 PRINT \"B\"\n";
    match parse_program(source) {
        Ok(program) => {
            let numbers: Vec<u32> = program.lines.iter().map(|l| l.number).collect();
            assert_eq!(numbers, vec![10, 20, 30]);
            assert_eq!(program.line(10).unwrap().source_line, 4);
        }
        Err(e) => panic!("program should parse, got: {:?}", e),
    }
}

#[test]
fn test_statement_kinds() {
    let source = r#"
10 DEFINT I-K, N
20 OPTION BASE 1
30 DIM A(10, 20), B$(5)
40 DEF FNSQ(X) = X * X
50 FOR I = 1 TO 10 STEP 2
60 NEXT I
70 WHILE K < 5: K = K + 1: WEND
80 ON N GOSUB 100, 200
90 ON ERROR GOTO 300
100 RESUME NEXT
110 INPUT "Value"; V, A(1, 2)
120 LINE INPUT L$
130 SWAP X, Y
140 READ P, Q
150 DATA 1, 2
160 RESTORE 150
170 REM anything: goes
180 LIST 10-20
190 CLS
"#;
    let program = parse_program(source).expect("program should parse");
    let kinds: Vec<&StatementKind> = program.statements().map(|s| &s.kind).collect();

    assert!(matches!(kinds[0], StatementKind::DefType { var_type: VarType::Integer, ranges } if ranges == &vec![('I', 'K'), ('N', 'N')]));
    assert!(matches!(kinds[1], StatementKind::OptionBase { base: 1 }));
    assert!(matches!(kinds[2], StatementKind::Dim { arrays } if arrays.len() == 2 && arrays[0].extents.len() == 2));
    assert!(matches!(kinds[3], StatementKind::DefFn { name, params, .. } if name.key == "FNSQ" && params.len() == 1));
    assert!(matches!(kinds[4], StatementKind::For { step: Some(_), .. }));
    assert!(matches!(kinds[5], StatementKind::Next { vars } if vars[0].key == "I"));
    assert!(matches!(kinds[6], StatementKind::While { .. }));
    assert!(matches!(kinds[7], StatementKind::Let { .. }));
    assert!(matches!(kinds[8], StatementKind::Wend));
    assert!(matches!(kinds[9], StatementKind::OnGosub { targets, .. } if targets == &vec![100, 200]));
    assert!(matches!(kinds[10], StatementKind::OnErrorGoto { target: 300 }));
    assert!(matches!(kinds[11], StatementKind::Resume { target: ResumeTarget::Next }));
    assert!(matches!(kinds[12], StatementKind::Input { prompt: Some(p), targets, .. } if p == "Value" && targets.len() == 2 && matches!(targets[1], LValue::Element { .. })));
    assert!(matches!(kinds[13], StatementKind::LineInput { .. }));
    assert!(matches!(kinds[14], StatementKind::Swap { .. }));
    assert!(matches!(kinds[15], StatementKind::Read { targets } if targets.len() == 2));
    assert!(matches!(kinds[16], StatementKind::Data { items } if items.len() == 2));
    assert!(matches!(kinds[17], StatementKind::Restore { line: Some(150) }));
    assert!(matches!(kinds[18], StatementKind::Rem { text } if text.contains("goes")));
    assert!(matches!(kinds[19], StatementKind::Command { name, .. } if name == "LIST"));
    assert!(matches!(kinds[20], StatementKind::Other { keyword, .. } if keyword == "CLS"));
}

#[test]
fn test_if_forms() {
    let source = "10 IF A THEN 100\n20 IF B GOTO 200\n30 IF C THEN X = 1 ELSE Y = 2: Z = 3\n";
    let program = parse_program(source).expect("program should parse");
    let ifs: Vec<&StatementKind> = program.statements().map(|s| &s.kind).collect();

    assert!(matches!(ifs[0], StatementKind::If { then_branch: Branch::Line(100), else_branch: None, .. }));
    assert!(matches!(ifs[1], StatementKind::If { then_branch: Branch::Line(200), .. }));
    match ifs[2] {
        StatementKind::If { then_branch: Branch::Statements(then), else_branch: Some(Branch::Statements(els)), .. } => {
            assert_eq!(then.len(), 1);
            assert_eq!(els.len(), 2);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_case_preserved_per_occurrence() {
    let program = parse_program("10 Total = 1\n20 PRINT TOTAL + total\n").expect("program should parse");
    let stmt = &program.line(20).unwrap().statements[0];
    if let StatementKind::Print { items, .. } = &stmt.kind {
        if let parser::PrintItem::Expr(e) = &items[0] {
            assert_eq!(e.source_text(), "TOTAL + total");
            if let ExprKind::Binary { left, right, .. } = &e.kind {
                assert_eq!(left.to_string(), right.to_string());
            }
            return;
        }
    }
    panic!("expected PRINT with an expression");
}

#[test]
fn test_errors_report_physical_line() {
    let err = parse_program("10 PRINT 1\nPRINT 2\n30 X = (1 +\n").unwrap_err();
    assert_eq!(err.len(), 2);
    let lines: Vec<usize> = err.diagnostics.iter().filter_map(|d| d.position.map(|p| p.line)).collect();
    assert_eq!(lines, vec![2, 3]);
    assert_eq!(err.diagnostics[0].code.as_deref(), Some("E0001"));
    assert_eq!(err.diagnostics[1].code.as_deref(), Some("E0002"));
}
