//! End-to-end properties of the analyzer over whole programs
//!
//! Each test parses a small program, runs every pass with the default
//! configuration and checks the findings the analyzer instance exposes.

use analyzer::optimization::strength_reduction::ReductionKind;
use analyzer::report::SECTION_TITLES;
use analyzer::{analyze_source, AnalyzerConfig, SemanticAnalyzer};
use parser::parse_program;

fn analyze(source: &str) -> SemanticAnalyzer {
    analyzer::logging::init_test();
    let program = parse_program(source).unwrap();
    let mut analyzer = SemanticAnalyzer::new(AnalyzerConfig::default());
    analyzer.analyze(&program);
    analyzer
}

fn flattened_size(analyzer: &SemanticAnalyzer, name: &str) -> Option<u64> {
    analyzer.symbols.array(name).and_then(|info| info.flattened_size)
}

#[test]
fn test_flattened_sizes_follow_base() {
    let base0 = analyze("10 DIM A(10, 20)\n20 DIM B(5, 3, 4)\n");
    assert_eq!(base0.array_base, 0);
    assert_eq!(flattened_size(&base0, "A"), Some(231));
    assert_eq!(flattened_size(&base0, "B"), Some(120));

    let base1 = analyze("10 OPTION BASE 1\n20 DIM A(10, 20)\n30 DIM B(5, 3, 4)\n");
    assert_eq!(base1.array_base, 1);
    assert_eq!(flattened_size(&base1, "A"), Some(200));
    assert_eq!(flattened_size(&base1, "B"), Some(60));
}

#[test]
fn test_oversized_dim_is_reported_not_fatal() {
    let program = parse_program("10 DIM A(1E19)\n20 A(1) = 2\n").unwrap();
    let mut analyzer = SemanticAnalyzer::default();
    assert!(!analyzer.analyze(&program));
    assert_eq!(analyzer.errors.len(), 1);
    assert_eq!(analyzer.errors[0].code(), "E2007");
    assert_eq!(flattened_size(&analyzer, "A"), None);
}

#[test]
fn test_base_applies_to_earlier_dims() {
    let analyzer = analyze("10 DIM A(10, 20)\n20 OPTION BASE 1\n");
    assert!(analyzer.errors.is_empty());
    assert_eq!(flattened_size(&analyzer, "A"), Some(200));
}

#[test]
fn test_option_base_conflicts() {
    let analyzer = analyze("10 OPTION BASE 0\n20 DIM A(5)\n30 OPTION BASE 1\n");
    let conflicts = analyzer
        .errors
        .iter()
        .filter(|e| e.to_string().contains("Conflicting OPTION BASE"))
        .count();
    assert_eq!(conflicts, 1);
    // Without a resolved base the array is left unflattened
    assert_eq!(flattened_size(&analyzer, "A"), None);

    let program = parse_program("10 OPTION BASE 1\n20 OPTION BASE 1\n").unwrap();
    let mut repeated = SemanticAnalyzer::default();
    assert!(repeated.analyze(&program));
    assert!(repeated.errors.is_empty());
}

#[test]
fn test_cse_across_branches() {
    let analyzer = analyze("10 X = A + B\n20 IF C THEN Y = 10\n30 Z = A + B\n");
    assert_eq!(analyzer.common_subexpressions.len(), 1);
    let cse = &analyzer.common_subexpressions[0];
    assert_eq!(cse.expression, "A + B");
    assert_eq!(cse.first_line, 10);
    assert_eq!(cse.occurrences, vec![30]);

    let killed = analyze("10 X = A + B\n20 IF C THEN A = 10\n30 Z = A + B\n");
    assert!(killed.common_subexpressions.is_empty());
}

#[test]
fn test_cse_in_both_arms_and_after_join() {
    let analyzer = analyze("10 IF C THEN X = A * B ELSE Y = A * B\n20 Z = A * B\n");
    assert_eq!(analyzer.common_subexpressions.len(), 1);
    let cse = &analyzer.common_subexpressions[0];
    assert_eq!(cse.first_line, 10);
    assert_eq!(cse.occurrences.len(), 2);
    assert!(cse.occurrences.contains(&20));
}

#[test]
fn test_strength_reduction_kinds() {
    let count = |analyzer: &SemanticAnalyzer, kind: ReductionKind| {
        analyzer
            .strength_reductions
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    };

    let doubled = analyze("10 X = A * 2\n20 Y = 2 * B\n");
    assert!(count(&doubled, ReductionKind::MultiplyToAdd) >= 2);
    assert!(doubled
        .strength_reductions
        .iter()
        .all(|r| r.kind.to_string() == "multiply→add"));

    let zeroed = analyze("10 X = A * 0\n20 Y = 0 * B\n");
    assert!(count(&zeroed, ReductionKind::EliminateMultiply) >= 2);

    let double = analyze("10 X = NOT (NOT A)\n");
    assert_eq!(count(&double, ReductionKind::DoubleNegation), 1);

    let triple = analyze("10 X = NOT (NOT (NOT A))\n");
    assert_eq!(count(&triple, ReductionKind::DoubleNegation), 2);
}

#[test]
fn test_forward_substitution() {
    let find = |analyzer: &SemanticAnalyzer, var: &str| {
        analyzer
            .forward_substitutions
            .iter()
            .find(|f| f.variable == var)
            .cloned()
            .unwrap()
    };

    let once = analyze("10 INPUT A, B\n20 T = A + B\n30 PRINT T\n");
    let record = find(&once, "T");
    assert_eq!(record.use_count, 1);
    assert!(record.can_substitute);

    let twice = analyze("10 INPUT A, B\n20 T = A + B\n30 PRINT T\n40 PRINT T * 2\n");
    let record = find(&twice, "T");
    assert_eq!(record.use_count, 2);
    assert!(!record.can_substitute);

    let dead = analyze("10 INPUT A, B\n20 T = A + B\n30 PRINT A\n");
    let record = find(&dead, "T");
    assert_eq!(record.use_count, 0);
    assert!(record.is_dead_store);
    assert_eq!(dead.report().dead_stores().count(), 1);

    let function = analyze("10 DEF FNF(X) = X * 2\n20 INPUT A\n30 T = FNF(A)\n40 PRINT T\n");
    let record = find(&function, "T");
    assert_eq!(record.use_count, 1);
    assert!(!record.can_substitute);
    assert!(!record.is_dead_store);
}

#[test]
fn test_uninitialized_variables() {
    let warned = |analyzer: &SemanticAnalyzer, var: &str| {
        analyzer
            .uninitialized_warnings
            .iter()
            .filter(|w| w.variable == var)
            .count()
    };

    let before = analyze("10 PRINT X\n20 X = 10\n");
    assert_eq!(warned(&before, "X"), 1);
    assert_eq!(before.uninitialized_warnings[0].line, 10);

    let input = analyze("10 INPUT A\n20 PRINT A\n");
    assert!(input.uninitialized_warnings.is_empty());

    let both = analyze("10 INPUT C\n20 IF C THEN X = 1 ELSE X = 2\n30 PRINT X\n");
    assert!(both.uninitialized_warnings.is_empty());

    let then_only = analyze("10 INPUT C\n20 IF C THEN X = 1\n30 PRINT X\n");
    assert_eq!(warned(&then_only, "X"), 1);
    assert_eq!(then_only.uninitialized_warnings[0].line, 30);

    // Array elements start at zero
    let array = analyze("10 DIM A(5)\n20 PRINT A(1)\n");
    assert!(array.uninitialized_warnings.is_empty());
}

#[test]
fn test_uninitialized_follows_jumps() {
    let skipped = analyze("10 GOTO 30\n20 X = 1\n30 PRINT X\n");
    assert_eq!(skipped.uninitialized_warnings.len(), 1);

    let subroutine = analyze("10 GOSUB 100\n20 PRINT X\n30 END\n100 X = 5\n110 RETURN\n");
    assert!(subroutine.uninitialized_warnings.is_empty());
}

#[test]
fn test_subroutines_return_to_their_callers() {
    let twice = analyze("10 GOSUB 100\n20 X = 1\n30 GOSUB 100\n40 PRINT X\n50 END\n100 RETURN\n");
    assert!(twice.uninitialized_warnings.is_empty());

    let selected = analyze(
        "10 INPUT K\n20 ON K GOSUB 100, 200\n30 X = 1\n40 GOSUB 200\n50 PRINT X\n60 END\n\
         100 RETURN\n200 RETURN\n",
    );
    assert!(selected.uninitialized_warnings.is_empty());

    let reused = analyze(
        "10 INPUT A, B\n20 GOSUB 100\n30 T = A + B\n40 GOSUB 100\n50 U = A + B\n60 PRINT T, U\n70 END\n\
         100 PRINT 0\n110 RETURN\n",
    );
    assert_eq!(reused.common_subexpressions.len(), 1);
    assert_eq!(reused.common_subexpressions[0].first_line, 30);
    assert_eq!(reused.common_subexpressions[0].occurrences, vec![50]);
    let t = reused
        .forward_substitutions
        .iter()
        .find(|f| f.variable == "T")
        .unwrap();
    assert_eq!(t.use_lines, vec![60]);
}

#[test]
fn test_warnings_do_not_fail_analysis() {
    let program = parse_program("10 PRINT X\n").unwrap();
    let mut analyzer = SemanticAnalyzer::default();
    assert!(analyzer.analyze(&program));
    assert_eq!(analyzer.uninitialized_warnings.len(), 1);
}

#[test]
fn test_analysis_is_idempotent() {
    let source = "10 DIM A(10, 10)\n20 FOR I = 0 TO 10\n30 A(I, I) = I * 2\n40 NEXT I\n\
                  50 X = A(1, 1) + A(1, 1)\n60 IF X > 5 THEN PRINT X ELSE PRINT Y\n70 END\n";
    let program = parse_program(source).unwrap();
    let mut analyzer = SemanticAnalyzer::default();

    analyzer.analyze(&program);
    let first = analyzer.get_report();
    let first_json = analyzer.report().to_json().unwrap();

    analyzer.analyze(&program);
    assert_eq!(analyzer.get_report(), first);
    assert_eq!(analyzer.report().to_json().unwrap(), first_json);
}

#[test]
fn test_report_sections_in_order() {
    let report = analyze("10 X = 2 * 3\n20 PRINT X\n").get_report();
    assert!(report.starts_with("MBASIC Semantic Analysis Report"));

    let mut last = 0;
    for title in SECTION_TITLES {
        let heading = format!("\n{}:\n", title);
        let at = report[last..]
            .find(&heading)
            .map(|offset| last + offset)
            .unwrap_or_else(|| panic!("section {} missing or out of order", title));
        last = at + heading.len();
    }
}

#[test]
fn test_pipeline_renders_diagnostics() {
    let result = analyze_source("conflict.bas", "10 OPTION BASE 0\n20 OPTION BASE 1\n", AnalyzerConfig::default());
    assert!(result.has_errors());
    assert_eq!(result.stats.error_count, 1);

    let formatter = diagnostics::ErrorFormatter::new();
    let text = formatter.format_diagnostics(&result.diagnostics, &result.source_map, result.file_id);
    assert!(text.contains("E2001"));
    assert!(text.contains("OPTION BASE 1"));
}
