//! Optimization facts
//!
//! Nothing here rewrites the program. Each pass records what a compiler
//! could do and the report lists it.

pub mod array_flattening;
pub mod constant_folding;
pub mod cse;
pub mod forward_substitution;
pub mod integer_range;
pub mod loop_analysis;
pub mod strength_reduction;
pub mod value_range;

#[cfg(test)]
mod cse_test;

pub use array_flattening::{flatten_index, ArrayLayout};
pub use constant_folding::{evaluate_constant, ConstValue, FoldedExpression};
pub use cse::CommonSubexpression;
pub use forward_substitution::ForwardSubstitution;
pub use integer_range::{IntegerRange, IntegerWidth};
pub use loop_analysis::{InductionVariable, LoopInfo, LoopInvariant};
pub use strength_reduction::StrengthReduction;
pub use value_range::{RangeInfo, ValueRange};
