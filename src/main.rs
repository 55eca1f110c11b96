//! mbasic - semantic analysis and optimization reports for MBASIC programs
//!
//! # Usage
//!
//! ```bash
//! # Report errors and warnings only
//! mbasic check GAME.BAS
//!
//! # Full optimization report
//! mbasic analyze GAME.BAS
//!
//! # Machine-readable report
//! mbasic analyze --format json GAME.BAS
//!
//! # Skip passes
//! mbasic analyze --no-cse --no-loops GAME.BAS
//! ```

use analyzer::{analyze_source, logging, AnalysisResult, AnalyzerConfig};
use clap::{Args, Parser, Subcommand, ValueEnum};
use diagnostics::ErrorFormatter;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "mbasic")]
#[command(version = "0.1.0")]
#[command(about = "Semantic analysis and optimization reports for MBASIC programs", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG still applies when not set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Colour diagnostics
    #[arg(long, global = true)]
    color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a program and print errors and warnings
    Check {
        /// Path to the BASIC source file
        file: PathBuf,

        /// Show parse and analysis statistics
        #[arg(long)]
        stats: bool,
    },

    /// Run every analysis and print the report
    Analyze {
        /// Path to the BASIC source file
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Show parse and analysis statistics
        #[arg(long)]
        stats: bool,

        #[command(flatten)]
        passes: PassFlags,
    },

    /// List the analysis passes
    Info,
}

#[derive(Args, Debug, Default)]
struct PassFlags {
    /// Skip common subexpression detection
    #[arg(long)]
    no_cse: bool,

    /// Skip strength reduction
    #[arg(long)]
    no_strength_reduction: bool,

    /// Keep arithmetic strength reduction but skip the boolean rules
    #[arg(long)]
    no_boolean: bool,

    /// Skip forward substitution and dead store detection
    #[arg(long)]
    no_forward_substitution: bool,

    /// Skip integer width inference
    #[arg(long)]
    no_integer_ranges: bool,

    /// Skip uninitialized variable detection
    #[arg(long)]
    no_uninitialized: bool,

    /// Skip loop analysis
    #[arg(long)]
    no_loops: bool,

    /// Deepest GOSUB nesting accepted without a warning
    #[arg(long, default_value = "32")]
    max_gosub_depth: usize,
}

impl PassFlags {
    fn config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            enable_cse: !self.no_cse,
            enable_strength_reduction: !self.no_strength_reduction,
            enable_boolean_simplification: !self.no_strength_reduction && !self.no_boolean,
            enable_forward_substitution: !self.no_forward_substitution,
            enable_integer_ranges: !self.no_integer_ranges,
            enable_uninitialized_detection: !self.no_uninitialized,
            enable_loop_analysis: !self.no_loops,
            max_gosub_depth: self.max_gosub_depth,
            ..AnalyzerConfig::default()
        }
    }
}

#[derive(ValueEnum, Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        logging::init_with_level(log::LevelFilter::Debug);
    } else {
        logging::init_from_env();
    }

    let result = match cli.command {
        Commands::Check { file, stats } => check_file(file, stats, cli.color),
        Commands::Analyze {
            file,
            format,
            stats,
            passes,
        } => analyze_file(file, format, stats, passes.config(), cli.color),
        Commands::Info => {
            show_info();
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    }
}

fn read_source(file: &PathBuf) -> Result<String, String> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()));
    }
    std::fs::read_to_string(file).map_err(|e| format!("Failed to read file: {}", e))
}

fn formatter(color: bool) -> ErrorFormatter {
    if color {
        ErrorFormatter::with_colors()
    } else {
        ErrorFormatter::new()
    }
}

fn print_diagnostics(result: &AnalysisResult, color: bool) {
    if result.diagnostics.is_empty() {
        return;
    }
    let text = formatter(color).format_diagnostics(&result.diagnostics, &result.source_map, result.file_id);
    eprint!("{}", text);
}

fn print_stats(result: &AnalysisResult) {
    let stats = &result.stats;
    eprintln!("Statistics:");
    eprintln!("  Lines:       {}", stats.lines);
    eprintln!("  Statements:  {}", stats.statements);
    eprintln!("  Parse time:  {}us", stats.parse_time_us);
    eprintln!("  Analysis:    {}us", stats.analysis_time_us);
    eprintln!("  Errors:      {}", stats.error_count);
    eprintln!("  Warnings:    {}", stats.warning_count);
}

/// Ok(false) when the program has errors
fn check_file(file: PathBuf, stats: bool, color: bool) -> Result<bool, String> {
    let source = read_source(&file)?;
    let name = file.display().to_string();
    let result = analyze_source(&name, &source, AnalyzerConfig::diagnostics_only());

    print_diagnostics(&result, color);
    if stats {
        print_stats(&result);
    }

    if result.has_errors() {
        println!("✗ {}: {} error(s)", name, result.stats.error_count);
        Ok(false)
    } else {
        println!(
            "✓ {}: OK ({} lines, {} warning(s))",
            name, result.stats.lines, result.stats.warning_count
        );
        Ok(true)
    }
}

fn analyze_file(
    file: PathBuf,
    format: OutputFormat,
    stats: bool,
    config: AnalyzerConfig,
    color: bool,
) -> Result<bool, String> {
    let source = read_source(&file)?;
    let name = file.display().to_string();
    let result = analyze_source(&name, &source, config);

    let Some(report) = &result.report else {
        // Did not parse
        print_diagnostics(&result, color);
        return Ok(false);
    };

    match format {
        OutputFormat::Text => {
            print_diagnostics(&result, color);
            println!("{}", report);
        }
        OutputFormat::Json => {
            let json = report
                .to_json()
                .map_err(|e| format!("Failed to serialize report: {}", e))?;
            println!("{}", json);
        }
    }

    if stats {
        print_stats(&result);
    }
    Ok(report.success)
}

fn show_info() {
    println!("mbasic v0.1.0");
    println!("Semantic analysis and optimization reports for MBASIC programs\n");

    println!("Analysis passes (in order):");
    for (name, description) in [
        ("validation", "line targets, loop nesting, unsupported statements, GOSUB depth"),
        ("constant-folding", "literal subexpressions evaluated at compile time"),
        ("strength-reduction", "algebraic and boolean identities"),
        ("common-subexpressions", "repeated computations across branches"),
        ("forward-substitution", "single-use temporaries and dead stores"),
        ("uninitialized-variables", "reads before definite assignment"),
        ("loop-analysis", "trip counts, invariants, induction variables"),
        ("integer-range", "8/16/32-bit widths for integer scalars"),
        ("value-range", "ranges learned from IF conditions"),
    ] {
        println!("  {:<24} {}", name, description);
    }
}
