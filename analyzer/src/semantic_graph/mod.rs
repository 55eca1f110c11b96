//! Control flow and dataflow shared by the branch-sensitive passes

pub mod cfg;
pub mod dataflow;
pub mod effects;

#[cfg(test)]
mod cfg_test;

pub use cfg::{CfgNode, ControlFlowGraph, EdgeKind, ForLoopRegion, NodeId, StructureIssue, ENTRY, EXIT};
pub use dataflow::{solve_forward, DataflowSolution, ForwardAnalysis};
pub use effects::{compute_effects, NodeEffects, UseContext, VarUse};
