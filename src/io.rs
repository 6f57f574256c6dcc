//! Output sinks for the `print`/`println` statement.
//!
//! Grounded on the teacher codebase's `PrintWriter` trait: a small interface
//! callers implement to capture or redirect interpreter output, with
//! `StdPrint`/`CollectStringPrint`/`NoPrint` covering the common cases.
//! Railway's `print` takes a fixed list of already-evaluated arguments, so
//! unlike the teacher's version this trait has no redirect-stack machinery —
//! just "write this text" and "write this separator/terminator character".

use std::{borrow::Cow, cell::RefCell, io::Write as _};

use crate::error::RunResult;

/// Trait for handling output from `print`/`println` statements.
///
/// Implement this to capture or redirect a running program's output. The
/// default implementation, [`StdPrint`], writes to stdout.
pub trait PrintWriter: Send {
    /// Writes one formatted argument's text, with no separator or newline.
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()>;

    /// Writes a single separator or terminator character (a space between
    /// arguments, or the trailing newline for `println`).
    fn stdout_push(&mut self, end: char) -> RunResult<()>;
}

/// Writes print output straight to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        print!("{output}");
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> RunResult<()> {
        print!("{end}");
        if end == '\n' {
            let _ = std::io::stdout().flush();
        }
        Ok(())
    }
}

/// Collects all print output into an in-memory string.
///
/// Uses interior mutability so it can be shared behind a reference while a
/// program runs, and is what the test suite and parallel-call column
/// stacking use to assert on program output.
#[derive(Debug, Default)]
pub struct CollectStringPrint(RefCell<String>);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(RefCell::new(String::new()))
    }

    /// Returns the collected output so far.
    ///
    /// # Panics
    /// Panics if the internal `RefCell` is currently borrowed mutably.
    #[must_use]
    pub fn output(&self) -> String {
        self.0.borrow().clone()
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.0.into_inner()
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        self.0.borrow_mut().push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> RunResult<()> {
        self.0.borrow_mut().push(end);
        Ok(())
    }
}

/// Discards all print output. Useful when only the final variable state of a
/// run matters.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) -> RunResult<()> {
        Ok(())
    }

    fn stdout_push(&mut self, _end: char) -> RunResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_string_print_joins_arguments_with_pushed_separators() {
        let mut sink = CollectStringPrint::new();
        sink.stdout_write(Cow::Borrowed("a")).unwrap();
        sink.stdout_push(' ').unwrap();
        sink.stdout_write(Cow::Borrowed("b")).unwrap();
        sink.stdout_push('\n').unwrap();
        assert_eq!(sink.output(), "a b\n");
    }

    #[test]
    fn no_print_discards_everything() {
        let mut sink = NoPrint;
        sink.stdout_write(Cow::Borrowed("ignored")).unwrap();
        sink.stdout_push('\n').unwrap();
    }
}
