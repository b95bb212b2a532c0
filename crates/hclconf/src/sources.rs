//! source files and positions within them
//!
//! [Sources] tracks every file read during a load. Each file keeps its text so byte spans reported
//! by the parser can be turned into line/column based [SourceRange]s and so diagnostic writers
//! can print the offending line.
use crate::{
    body::Body,
    diagnostic::{Diagnostic, Diagnostics},
};
use std::{
    ops::Range,
    path::{Path, PathBuf},
    sync::Arc,
};

/// A position in a source file. `line` and `column` are one-based, `byte` is zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

/// A span of source text, rendered as `file:line,col-col` (or `file:line,col-line,col` when it
/// crosses lines)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub filename: Arc<str>,
    pub start: Pos,
    pub end: Pos,
}

impl SourceRange {
    /// Range spanning from the start of `self` to the end of `other`
    pub fn to(&self, other: &SourceRange) -> SourceRange {
        SourceRange {
            filename: self.filename.clone(),
            start: self.start,
            end: other.end,
        }
    }
}

impl std::fmt::Display for SourceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let SourceRange {
            filename,
            start,
            end,
        } = self;

        if start.line == end.line {
            write!(
                f,
                "{filename}:{},{}-{}",
                start.line, start.column, end.column
            )
        } else {
            write!(
                f,
                "{filename}:{},{}-{},{}",
                start.line, start.column, end.line, end.column
            )
        }
    }
}

/// Text of a single loaded file
#[derive(Debug)]
pub struct SourceFile {
    name: Arc<str>,
    text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<Arc<str>>, text: impl Into<String>) -> SourceFile {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(index, _)| index + 1))
            .collect();

        SourceFile {
            name: name.into(),
            text,
            line_starts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn pos(&self, byte: usize) -> Pos {
        let byte = byte.min(self.text.len());
        let line_index = self
            .line_starts
            .partition_point(|&start| start <= byte)
            .saturating_sub(1);
        let line_start = self.line_starts[line_index];
        let column = self
            .text
            .get(line_start..byte)
            .map_or(byte - line_start, |prefix| prefix.chars().count())
            + 1;

        Pos {
            line: line_index + 1,
            column,
            byte,
        }
    }

    /// Byte offset of a one-based line and byte column, clamped to the text
    pub fn offset(&self, line: usize, column: usize) -> usize {
        let Some(line_start) = self.line_starts.get(line.saturating_sub(1)) else {
            return self.text.len();
        };

        (line_start + column.saturating_sub(1)).min(self.text.len())
    }

    pub fn range(&self, span: Range<usize>) -> SourceRange {
        SourceRange {
            filename: self.name.clone(),
            start: self.pos(span.start),
            end: self.pos(span.end),
        }
    }

    /// Text of the given line (one-based) without its line ending
    pub fn line(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .map_or(self.text.len(), |next| next - 1);
        self.text
            .get(start..end)
            .map(|line| line.trim_end_matches('\r'))
    }
}

/// Syntax of a document, chosen by its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Native,
    Json,
}

impl Syntax {
    /// `*.hcl` is native syntax, `*.json` is JSON; anything else has no syntax
    pub fn of(filename: &str) -> Option<Syntax> {
        match Path::new(filename).extension().and_then(|ext| ext.to_str()) {
            Some("hcl") => Some(Syntax::Native),
            Some("json") => Some(Syntax::Json),
            _ => None,
        }
    }
}

/// All files read during a load
#[derive(Debug, Default)]
pub struct Sources {
    files: Vec<Arc<SourceFile>>,
}

impl Sources {
    pub fn get(&self, filename: &str) -> Option<&SourceFile> {
        self.files
            .iter()
            .find(|file| file.name() == filename)
            .map(Arc::as_ref)
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter().map(Arc::as_ref)
    }

    /// Parses a document and remembers its text
    ///
    /// Files named `*.json` are read as JSON documents, everything else as native syntax.
    pub fn parse(&mut self, filename: &str, text: impl Into<String>) -> Result<Body, Diagnostics> {
        let file = Arc::new(SourceFile::new(filename, text));
        self.files.push(file.clone());

        match Syntax::of(filename) {
            Some(Syntax::Json) => parse_json(&file),
            _ => parse_native(&file),
        }
    }

    pub fn load_file(&mut self, file_path: &Path) -> Result<Body, Diagnostics> {
        tracing::info!(path=%file_path.display(), "loading file");

        let text = std::fs::read_to_string(file_path).map_err(|err| {
            Diagnostic::error(
                "Failed to read file",
                format!("The file {:?} could not be read: {err}.", file_path.display().to_string()),
                None,
            )
        })?;

        self.parse(&file_path.to_string_lossy(), text)
    }

    /// Loads every `*.hcl` file of a directory, then every `*.hcl.json` file, each in file name
    /// order
    pub fn load_directory(&mut self, dir_path: &Path) -> (Vec<Body>, Diagnostics) {
        let mut diagnostics = Diagnostics::default();

        let file_paths = match hcl_files(dir_path) {
            Ok(file_paths) => file_paths,
            Err(err) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to read directory",
                    format!(
                        "The directory {:?} could not be read: {err}.",
                        dir_path.display().to_string()
                    ),
                    None,
                ));
                return (vec![], diagnostics);
            }
        };

        let mut bodies = vec![];
        for file_path in file_paths {
            match self.load_file(&file_path) {
                Ok(body) => bodies.push(body),
                Err(err) => diagnostics.extend(err),
            }
        }

        (bodies, diagnostics)
    }

    /// Loads a file or every configuration file of a directory
    pub fn load_path(&mut self, path: &Path) -> (Vec<Body>, Diagnostics) {
        if path.is_dir() {
            return self.load_directory(path);
        }

        if !path.exists() {
            let diagnostic = Diagnostic::error(
                "Configuration path not found",
                format!(
                    "The path {:?} does not exist.",
                    path.display().to_string()
                ),
                None,
            );
            return (vec![], diagnostic.into());
        }

        match self.load_file(path) {
            Ok(body) => (vec![body], Diagnostics::default()),
            Err(diagnostics) => (vec![], diagnostics),
        }
    }
}

fn parse_native(file: &SourceFile) -> Result<Body, Diagnostics> {
    match hcl_edit::parser::parse_body(file.text()) {
        Ok(body) => Ok(Body::from_edit(body, file)),
        Err(err) => {
            let offset = err.location().offset();
            let subject = file.range(offset..offset + 1);
            Err(Diagnostic::error(
                "Invalid HCL syntax",
                err.message().to_string(),
                subject,
            )
            .into())
        }
    }
}

fn parse_json(file: &SourceFile) -> Result<Body, Diagnostics> {
    match serde_json::from_str::<serde_json::Value>(file.text()) {
        Ok(value) => Body::from_json(value, file).map_err(Diagnostics::from),
        Err(err) => {
            let offset = file.offset(err.line(), err.column());
            Err(Diagnostic::error(
                "Invalid JSON syntax",
                err.to_string(),
                file.range(offset..offset),
            )
            .into())
        }
    }
}

fn hcl_files(dir_path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut file_paths = vec![];
    for dir_entry in std::fs::read_dir(dir_path)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_file() {
            continue;
        }

        let file_path = dir_entry.path();
        if is_json_config(&file_path) || file_path.extension().is_some_and(|ext| ext == "hcl") {
            file_paths.push(file_path);
        }
    }

    file_paths.sort_by_key(|file_path| (is_json_config(file_path), file_path.clone()));
    Ok(file_paths)
}

fn is_json_config(file_path: &Path) -> bool {
    file_path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".hcl.json"))
}
