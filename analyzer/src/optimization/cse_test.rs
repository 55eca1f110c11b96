//! Common subexpressions across branches, subroutines and loops

use super::cse::*;
use crate::semantic_graph::{compute_effects, ControlFlowGraph};
use crate::symbols::SymbolTableBuilder;
use parser::parse_program;

fn cse(source: &str) -> Vec<CommonSubexpression> {
    let program = parse_program(source).unwrap();
    let symbols = SymbolTableBuilder::new().build(&program).table;
    let cfg = ControlFlowGraph::build(&program);
    let effects = compute_effects(&cfg, &symbols);
    find_common_subexpressions(&cfg, &effects, &symbols)
}

#[test]
fn test_available_through_both_arms() {
    let found = cse("10 X = A + B\n20 IF C THEN Y = A + B ELSE Z = A + B\n30 W = A + B\n");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].first_line, 10);
    assert_eq!(found[0].occurrences, vec![20, 20, 30]);
}

#[test]
fn test_computed_in_both_arms_survives_join() {
    let found = cse("10 IF C THEN X = A + B ELSE Y = A + B\n20 Z = A + B\n");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].expression, "A + B");
    assert!(found[0].occurrences.contains(&20));
}

#[test]
fn test_computed_in_one_arm_does_not_survive() {
    assert!(cse("10 IF C THEN X = A + B\n20 Y = A + B\n").is_empty());
}

#[test]
fn test_killed_in_then_arm() {
    assert!(cse("10 X = A + B\n20 IF C THEN A = 5\n30 Y = A + B\n").is_empty());
    assert!(cse("10 X = A + B\n20 IF C THEN 40\n30 A = 1\n40 Y = A + B\n").is_empty());
}

#[test]
fn test_subroutine_writes_kill() {
    let killing = "10 X = A + B\n20 GOSUB 100\n30 Y = A + B\n40 END\n100 A = 1\n110 RETURN\n";
    assert!(cse(killing).is_empty());

    let harmless = "10 X = A + B\n20 GOSUB 100\n30 Y = A + B\n40 END\n100 PRINT 1\n110 RETURN\n";
    let found = cse(harmless);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].occurrences, vec![30]);
}

#[test]
fn test_subroutine_called_twice() {
    // Only the second call follows the first computation
    let source = "10 GOSUB 100\n20 X = A + B\n30 GOSUB 100\n40 Y = A + B\n50 END\n100 PRINT 1\n110 RETURN\n";
    let found = cse(source);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].first_line, 20);
    assert_eq!(found[0].occurrences, vec![40]);

    // The body runs before line 20 on the first call but after it on the second
    let source = "10 GOSUB 100\n20 X = A + B\n30 GOSUB 100\n40 END\n100 Y = A + B\n110 RETURN\n";
    let found = cse(source);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].first_line, 100);
    assert_eq!(found[0].occurrences, vec![20]);
}

#[test]
fn test_on_gosub_targets_kill_on_their_own_paths() {
    let killing = "10 INPUT K\n20 X = A + B\n30 ON K GOSUB 100, 200\n40 Y = A + B\n50 END\n\
                   100 PRINT 1\n110 RETURN\n200 A = 2\n210 RETURN\n";
    assert!(cse(killing).is_empty());

    let harmless = "10 INPUT K\n20 X = A + B\n30 ON K GOSUB 100, 200\n40 Y = A + B\n50 END\n\
                    100 PRINT 1\n110 RETURN\n200 PRINT 2\n210 RETURN\n";
    let found = cse(harmless);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].first_line, 20);
    assert_eq!(found[0].occurrences, vec![40]);
}

#[test]
fn test_loops() {
    let found = cse("10 X = A * 2\n20 FOR I = 1 TO 10\n30 Y = A * 2\n40 NEXT I\n");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].first_line, 10);

    // The counter changes every iteration, so only the reuse inside one pass counts
    let found = cse("10 FOR I = 1 TO 10\n20 Y = A * I\n30 Z = A * I\n40 NEXT I\n");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].first_line, 20);
    assert_eq!(found[0].occurrences, vec![30]);
}
