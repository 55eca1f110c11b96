//! Logging for the analyzer and the `mbasic` binary
//!
//! Records go through `log` and are written by `env_logger`. Passes that
//! walk statements open a [`LineScope`], and every record logged on that
//! thread while it is alive names the BASIC line under analysis:
//!
//! ```text
//! [TRACE] uninitialized (line 120) - X used in PRINT before assignment
//! [DEBUG] dataflow - definite-assignment: fixpoint after 41 visits over 18 nodes in 3 call contexts
//! ```
//!
//! The target is the last segment of the module path, so pass modules can be
//! told apart without the crate prefix. `RUST_LOG` still filters on the full
//! path:
//!
//! ```bash
//! RUST_LOG=analyzer::optimization::cse=debug mbasic analyze game.bas
//! RUST_LOG=analyzer::semantic_graph=trace mbasic check game.bas
//! ```

use env_logger::fmt::Formatter;
use env_logger::{Builder, Env};
use log::{LevelFilter, Record};
use parser::LineNumber;
use std::cell::Cell;
use std::io::{self, Write};
use std::sync::Once;

static INIT: Once = Once::new();

thread_local! {
    static CURRENT_LINE: Cell<Option<LineNumber>> = const { Cell::new(None) };
}

/// Tags this thread's records with a program line until dropped
#[must_use = "the line tag is removed when the scope is dropped"]
pub struct LineScope {
    previous: Option<LineNumber>,
}

impl Drop for LineScope {
    fn drop(&mut self) {
        CURRENT_LINE.with(|line| line.set(self.previous));
    }
}

/// Open a [`LineScope`]; scopes nest and restore the outer line on drop
pub fn at_line(line: LineNumber) -> LineScope {
    let previous = CURRENT_LINE.with(|current| current.replace(Some(line)));
    LineScope { previous }
}

/// Line of the innermost open scope on this thread
pub fn current_line() -> Option<LineNumber> {
    CURRENT_LINE.with(Cell::get)
}

fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn write_record(buf: &mut Formatter, record: &Record<'_>) -> io::Result<()> {
    let target = short_target(record.target());
    match current_line() {
        Some(line) => writeln!(
            buf,
            "[{:5}] {} (line {}) - {}",
            record.level(),
            target,
            line,
            record.args()
        ),
        None => writeln!(buf, "[{:5}] {} - {}", record.level(), target, record.args()),
    }
}

/// Warn level. Later calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// `mbasic -v` passes Debug here. Later calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new().filter_level(level).format(write_record).init();
    });
}

/// Honour `RUST_LOG`, defaulting to Warn. Later calls are no-ops.
pub fn init_from_env() {
    INIT.call_once(|| {
        Builder::from_env(Env::default().default_filter_or("warn"))
            .format(write_record)
            .init();
    });
}

/// Same line-tagged format, captured by the test harness
///
/// Safe to call from every test; only the first call installs the logger.
pub fn init_test() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .format(write_record)
        .is_test(true)
        .try_init();
}

/// Whether [`init`], [`init_with_level`] or [`init_from_env`] has run.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test();
        init_test();
    }

    #[test]
    fn test_line_scopes_nest() {
        assert_eq!(current_line(), None);
        {
            let _outer = at_line(100);
            assert_eq!(current_line(), Some(100));
            {
                let _inner = at_line(110);
                assert_eq!(current_line(), Some(110));
            }
            assert_eq!(current_line(), Some(100));
        }
        assert_eq!(current_line(), None);
    }

    #[test]
    fn test_targets_drop_the_module_path() {
        assert_eq!(short_target("analyzer::optimization::cse"), "cse");
        assert_eq!(short_target("mbasic"), "mbasic");
    }

    #[test]
    fn test_logging_inside_a_line_scope() {
        init_test();
        let _scope = at_line(10);
        log::warn!("FOR I has no matching NEXT");
        log::trace!("X used in PRINT before assignment");
    }
}
