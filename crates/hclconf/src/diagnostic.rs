//! diagnostics: problems found while loading, with an optional source location
//!
//! Components never stop at the first problem. They collect [Diagnostic]s into [Diagnostics]
//! and the caller decides: a load fails iff at least one [Severity::Error] is present.
use crate::sources::{SourceRange, Sources};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => f.write_str("Error"),
            Severity::Warning => f.write_str("Warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    pub subject: Option<SourceRange>,
}

impl Diagnostic {
    pub fn error(
        summary: impl Into<String>,
        detail: impl Into<String>,
        subject: impl Into<Option<SourceRange>>,
    ) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            subject: subject.into(),
        }
    }

    pub fn warning(
        summary: impl Into<String>,
        detail: impl Into<String>,
        subject: impl Into<Option<SourceRange>>,
    ) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(summary, detail, subject)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(subject) = &self.subject {
            write!(f, "{subject}: ")?;
        }

        f.write_str(&self.summary)?;

        if !self.detail.is_empty() {
            write!(f, "; {}", self.detail)?;
        }

        Ok(())
    }
}

/// Ordered collection of [Diagnostic]s
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.0.iter().filter(|diagnostic| diagnostic.is_error()).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|diagnostic| !diagnostic.is_error())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_slice() {
            [] => f.write_str("no diagnostics"),
            [diagnostic] => write!(f, "{diagnostic}"),
            [diagnostic, rest @ ..] => {
                let plural = if rest.len() == 1 { "" } else { "s" };
                write!(
                    f,
                    "{diagnostic}, and {} other diagnostic{plural}",
                    rest.len()
                )
            }
        }
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(value: Diagnostic) -> Self {
        Diagnostics(vec![value])
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Diagnostics(iter.into_iter().collect())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Receives the diagnostics of a failed load
pub trait DiagnosticWriter: Send + Sync {
    fn write_diagnostic(&self, diagnostic: &Diagnostic, sources: &Sources) -> std::io::Result<()>;

    fn write_diagnostics(
        &self,
        diagnostics: &Diagnostics,
        sources: &Sources,
    ) -> std::io::Result<()> {
        for diagnostic in diagnostics {
            self.write_diagnostic(diagnostic, sources)?;
        }
        Ok(())
    }
}

// blanket impl for closures that do not care about source text
impl<F> DiagnosticWriter for F
where
    F: Fn(&Diagnostic) -> std::io::Result<()> + Send + Sync,
{
    fn write_diagnostic(&self, diagnostic: &Diagnostic, _: &Sources) -> std::io::Result<()> {
        self(diagnostic)
    }
}

/// Plain text writer, prints the offending source line below each diagnostic
///
/// ```text
/// Error: Unsupported argument
///
///   on config.hcl line 3:
///    3:   prot = 8080
///
/// An argument named "prot" is not expected here. Did you mean "port"?
/// ```
pub struct TextWriter<W> {
    out: std::sync::Mutex<W>,
}

impl<W: Write + Send> TextWriter<W> {
    pub fn new(out: W) -> TextWriter<W> {
        TextWriter {
            out: std::sync::Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TextWriter<std::io::Stderr> {
    pub fn stderr() -> Self {
        TextWriter::new(std::io::stderr())
    }
}

impl<W: Write + Send> DiagnosticWriter for TextWriter<W> {
    fn write_diagnostic(&self, diagnostic: &Diagnostic, sources: &Sources) -> std::io::Result<()> {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };

        writeln!(out, "{}: {}", diagnostic.severity, diagnostic.summary)?;

        if let Some(subject) = &diagnostic.subject {
            writeln!(out)?;
            writeln!(
                out,
                "  on {} line {}:",
                subject.filename, subject.start.line
            )?;

            let line = sources
                .get(&subject.filename)
                .and_then(|file| file.line(subject.start.line));
            if let Some(line) = line {
                writeln!(out, "{:>4}: {line}", subject.start.line)?;
            }
        }

        if !diagnostic.detail.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", diagnostic.detail)?;
        }

        writeln!(out)
    }
}
