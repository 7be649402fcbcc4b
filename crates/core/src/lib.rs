use anyhow::Result;

pub use gobind_model;
use gobind_model::Resolve;

mod source;
pub use source::{Files, Source};

/// Calls [`write!`] with the passed arguments and unwraps the result.
///
/// Useful for writing to things with infallible `Write` implementations like
/// `Source` and `String`.
///
/// [`write!`]: std::write
#[macro_export]
macro_rules! uwrite {
    ($dst:expr, $($arg:tt)*) => {
        write!($dst, $($arg)*).unwrap()
    };
}

/// Calls [`writeln!`] with the passed arguments and unwraps the result.
///
/// Useful for writing to things with infallible `Write` implementations like
/// `Source` and `String`.
///
/// [`writeln!`]: std::writeln
#[macro_export]
macro_rules! uwriteln {
    ($dst:expr, $($arg:tt)*) => {
        writeln!($dst, $($arg)*).unwrap()
    };
}

pub fn generated_preamble(src: &mut Source, version: &str) {
    use std::fmt::Write;
    uwriteln!(src, "// Code generated by gobind-cs {version}. DO NOT EDIT.");
}

/// Per-member findings collected while a pass runs.
///
/// Members that reference unsupported types are skipped and recorded as
/// warnings. Constraint violations (a second result that is not `error`,
/// more than two results) are errors. Both let the pass keep going so a
/// single run reports everything it found; errors fail the pass at the end.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl Diagnostics {
    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Prints warnings to stderr and fails if any error was recorded.
    pub fn report(&self) -> Result<()> {
        for warning in &self.warnings {
            eprintln!("warning: {warning}");
        }
        if self.errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{}", self.errors.join("\n"))
        }
    }
}

/// One generation pass over a resolved surface.
///
/// `pkg` names a bound package; `None` selects the root pass, which emits
/// the shared wire structs, the reference runtime and the universe surface
/// exactly once per program.
pub trait PackageGenerator {
    fn generate(&mut self, resolve: &Resolve, pkg: Option<&str>, files: &mut Files) -> Result<()>;
}
