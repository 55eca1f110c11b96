//! Tests for control flow graph construction
//!
//! Node ids follow pre-order allocation: entry 0, exit 1, then every
//! statement in program order with IF arm statements right after their IF.

use super::cfg::*;
use parser::{parse_program, Program};

fn program(source: &str) -> Program {
    parse_program(source).unwrap()
}

fn edges(cfg: &ControlFlowGraph<'_>, id: NodeId) -> Vec<(NodeId, EdgeKind)> {
    cfg.node(id).successors.iter().copied().collect()
}

#[test]
fn test_straight_line_fallthrough() {
    let p = program("10 A = 1 : B = 2\n20 PRINT A\n");
    let cfg = ControlFlowGraph::build(&p);
    assert_eq!(cfg.len(), 5);
    assert_eq!(edges(&cfg, ENTRY), vec![(2, EdgeKind::Normal)]);
    assert_eq!(edges(&cfg, 2), vec![(3, EdgeKind::Normal)]);
    assert_eq!(edges(&cfg, 3), vec![(4, EdgeKind::Normal)]);
    assert_eq!(edges(&cfg, 4), vec![(EXIT, EdgeKind::Normal)]);
    assert_eq!(cfg.line_entry(20), Some(4));
    assert_eq!(cfg.line_entry(30), None);
}

#[test]
fn test_if_arms_split_and_join() {
    let p = program("10 IF A THEN X = 1 ELSE X = 2\n20 PRINT X\n");
    let cfg = ControlFlowGraph::build(&p);
    // 2: IF, 3: THEN arm, 4: ELSE arm, 5: PRINT
    assert_eq!(edges(&cfg, 2), vec![(3, EdgeKind::Then), (4, EdgeKind::Else)]);
    assert_eq!(edges(&cfg, 3), vec![(5, EdgeKind::Normal)]);
    assert_eq!(edges(&cfg, 4), vec![(5, EdgeKind::Normal)]);
    assert_eq!(cfg.node(3).depth, 1);
    assert_eq!(cfg.node(5).depth, 0);
}

#[test]
fn test_missing_else_falls_through() {
    let p = program("10 IF A THEN 30\n20 PRINT 1\n30 END\n");
    let cfg = ControlFlowGraph::build(&p);
    assert_eq!(edges(&cfg, 2), vec![(4, EdgeKind::Then), (3, EdgeKind::Else)]);
}

#[test]
fn test_goto_and_unreachable_code() {
    let p = program("10 GOTO 30\n20 PRINT 1\n30 END\n");
    let cfg = ControlFlowGraph::build(&p);
    assert_eq!(edges(&cfg, 2), vec![(4, EdgeKind::Jump)]);
    assert!(!cfg.is_reachable(3));
    assert!(cfg.is_reachable(4));
}

#[test]
fn test_undefined_target_leads_to_exit() {
    let p = program("10 GOTO 99\n");
    let cfg = ControlFlowGraph::build(&p);
    assert_eq!(edges(&cfg, 2), vec![(EXIT, EdgeKind::Jump)]);
}

#[test]
fn test_gosub_returns_to_following_statement() {
    let p = program("10 GOSUB 100\n20 END\n100 PRINT 1\n110 RETURN\n");
    let cfg = ControlFlowGraph::build(&p);
    assert_eq!(edges(&cfg, 2), vec![(4, EdgeKind::Call)]);
    assert_eq!(edges(&cfg, 5), vec![(3, EdgeKind::Return)]);
    assert_eq!(cfg.fallthrough(2), 3);
}

#[test]
fn test_for_loop_regions() {
    let p = program("10 FOR I = 1 TO N\n20 PRINT I\n30 NEXT I\n40 END\n");
    let cfg = ControlFlowGraph::build(&p);
    assert_eq!(cfg.for_loops.len(), 1);
    let region = &cfg.for_loops[0];
    assert_eq!((region.for_node, region.next_node), (2, 4));
    assert!(region.contains(3) && region.contains(4) && !region.contains(2));
    assert!(edges(&cfg, 4).contains(&(3, EdgeKind::LoopBack)));
    assert!(edges(&cfg, 4).contains(&(5, EdgeKind::LoopExit)));
    // Bound N is not known, so the body may be skipped
    assert!(edges(&cfg, 2).contains(&(5, EdgeKind::LoopSkip)));

    let p = program("10 FOR I = 1 TO 10\n20 NEXT I\n");
    let cfg = ControlFlowGraph::build(&p);
    assert!(!edges(&cfg, 2).iter().any(|&(_, kind)| kind == EdgeKind::LoopSkip));
}

#[test]
fn test_next_closing_several_loops() {
    let p = program("10 FOR I = 1 TO 2\n20 FOR J = 1 TO 3\n30 NEXT J, I\n");
    let cfg = ControlFlowGraph::build(&p);
    assert!(cfg.issues.is_empty());
    let closed: Vec<&str> = cfg.loops_closed_by(4).map(|r| r.var.as_str()).collect();
    assert_eq!(closed, vec!["J", "I"]);
}

#[test]
fn test_while_loops() {
    let p = program("10 WHILE A < 10\n20 A = A + 1\n30 WEND\n40 END\n");
    let cfg = ControlFlowGraph::build(&p);
    assert_eq!(cfg.while_loops.len(), 1);
    assert_eq!(edges(&cfg, 4), vec![(2, EdgeKind::LoopBack)]);
    assert!(edges(&cfg, 2).contains(&(5, EdgeKind::LoopExit)));
    assert!(cfg.in_any_loop(3));
    assert!(!cfg.in_any_loop(5));
}

#[test]
fn test_structure_issues() {
    let p = program("10 NEXT\n20 WEND\n30 FOR I = 1 TO 3\n");
    let cfg = ControlFlowGraph::build(&p);
    assert_eq!(
        cfg.issues,
        vec![
            StructureIssue::NextWithoutFor { node: 2 },
            StructureIssue::WendWithoutWhile { node: 3 },
            StructureIssue::UnclosedFor {
                node: 4,
                var: "I".to_string()
            },
        ]
    );

    let p = program("10 FOR I = 1 TO 2\n20 FOR J = 1 TO 2\n30 NEXT I\n");
    let cfg = ControlFlowGraph::build(&p);
    assert!(matches!(
        &cfg.issues[..],
        [StructureIssue::NextMismatch { expected, found, .. }] if expected == "J" && found == "I"
    ));
}

#[test]
fn test_error_handler_edges() {
    let p = program("10 ON ERROR GOTO 100\n20 PRINT 1\n30 END\n100 RESUME NEXT\n");
    let cfg = ControlFlowGraph::build(&p);
    assert!(edges(&cfg, 2).contains(&(5, EdgeKind::ErrorHandler)));
    assert_eq!(edges(&cfg, 5), vec![(3, EdgeKind::Resume)]);
}
