use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::ops::Deref;

/// The set of files produced by one generator run, keyed by relative path.
///
/// Backed by a `BTreeMap` so iteration (and therefore everything written to
/// disk) has a stable order. Pushing to an existing name appends, which lets
/// a pass emit a file in fragments.
#[derive(Default)]
pub struct Files {
    files: BTreeMap<String, Vec<u8>>,
}

impl Files {
    pub fn push(&mut self, name: &str, contents: &[u8]) {
        match self.files.entry(name.to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(contents.to_owned());
            }
            Entry::Occupied(ref mut entry) => {
                entry.get_mut().extend_from_slice(contents);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|data| data.as_slice())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.files.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'_ str, &'_ [u8])> {
        self.files.iter().map(|p| (p.0.as_str(), p.1.as_slice()))
    }
}

/// In-memory buffer for emitted source text.
///
/// Tracks brace nesting so multi-line `push_str` calls need no manual
/// indentation: leading whitespace of each input line is replaced with the
/// current nesting level, four spaces per level (the convention of the
/// emitted C# and C). A line ending in `{` opens a level, a line starting
/// with `}` closes one. Blank lines stay empty.
#[derive(Default)]
pub struct Source {
    s: String,
    indent: usize,
    continuing_line: bool,
}

impl Source {
    pub fn push_str(&mut self, src: &str) {
        let lines = src.lines().collect::<Vec<_>>();
        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('}') {
                // A `saturating_sub` keeps invalid generated code printable
                // in debug sessions instead of panicking here.
                self.indent = self.indent.saturating_sub(1);
            }
            if !self.continuing_line && !trimmed.is_empty() {
                for _ in 0..self.indent {
                    self.s.push_str("    ");
                }
            }
            self.continuing_line = true;
            self.s.push_str(if lines.len() == 1 { line } else { trimmed });
            if trimmed.ends_with('{') {
                self.indent += 1;
            }
            if i != lines.len() - 1 || src.ends_with('\n') {
                self.s.push('\n');
                self.continuing_line = false;
            }
        }
    }

    pub fn indent(&mut self, amt: usize) {
        self.indent += amt;
    }

    pub fn deindent(&mut self, amt: usize) {
        self.indent -= amt;
    }

    pub fn as_mut_string(&mut self) -> &mut String {
        &mut self.s
    }
}

impl Write for Source {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

impl Deref for Source {
    type Target = str;
    fn deref(&self) -> &str {
        &self.s
    }
}

impl From<Source> for String {
    fn from(s: Source) -> String {
        s.s
    }
}
