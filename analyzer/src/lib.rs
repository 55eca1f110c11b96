//! Semantic analysis and optimization reporting for MBASIC programs
//!
//! ```no_run
//! use analyzer::{analyze_source, AnalyzerConfig};
//!
//! let result = analyze_source("demo.bas", "10 X = 2 * 3\n20 PRINT X\n", AnalyzerConfig::default());
//! if let Some(report) = &result.report {
//!     println!("{}", report);
//! }
//! ```

pub mod analysis;
pub mod analyzer;
pub mod error_codes;
pub mod errors;
pub mod logging;
pub mod optimization;
pub mod pass_manager;
pub mod pipeline;
pub mod report;
pub mod semantic_graph;
pub mod symbols;

pub use analyzer::SemanticAnalyzer;
pub use errors::{SemanticError, SemanticErrorKind};
pub use pass_manager::{AnalysisContext, AnalysisPass, PassManager, PassResult};
pub use pipeline::{analyze_source, AnalysisResult, AnalyzerConfig, PipelineStats};
pub use report::AnalysisReport;
pub use symbols::{FunctionInfo, SymbolTable, SymbolTableBuilder, VariableInfo};
