//! loader: files in, populated target out
use crate::{
    body::Body,
    context::EvalContext,
    descriptor::Decode,
    diagnostic::{Diagnostic, DiagnosticWriter, Diagnostics, TextWriter},
    functions::{default_functions, Functions},
    implied::resolve_implied_variables,
    locals::resolve_locals,
    sources::{Sources, Syntax},
    value::{merge_variables, Object},
};
use std::{
    path::Path,
    sync::{Arc, OnceLock},
};

/// A failed load
///
/// The diagnostics were already handed to the loader's [DiagnosticWriter].
#[derive(thiserror::Error, Debug)]
#[error("{} errors occurred. See diagnostics for details", .diagnostics.error_count())]
pub struct LoadError {
    pub diagnostics: Diagnostics,
}

/// Configuration shared by loads: functions, additional variables and diagnostic output
pub struct Loader {
    variables: Object,
    functions: Arc<Functions>,
    writer: Option<Arc<dyn DiagnosticWriter>>,
}

impl Default for Loader {
    fn default() -> Self {
        Loader {
            variables: Object::new(),
            functions: Arc::new(default_functions()),
            writer: None,
        }
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("variables", &self.variables)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

impl Loader {
    pub fn new() -> Loader {
        Loader::default()
    }

    /// Add functions, replacing existing ones of the same name
    pub fn functions(&mut self, functions: Functions) -> &mut Self {
        Arc::make_mut(&mut self.functions).extend(functions);
        self
    }

    /// Add variables, deep merged into the existing ones
    pub fn variables(&mut self, variables: Object) -> &mut Self {
        merge_variables(&mut self.variables, variables);
        self
    }

    /// Where diagnostics of failed loads go, [TextWriter] on stderr by default
    pub fn diagnostic_writer(&mut self, writer: impl DiagnosticWriter + 'static) -> &mut Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    /// A fresh context with the configured variables and functions
    pub fn new_eval_context(&self) -> EvalContext {
        EvalContext::new(self.variables.clone(), self.functions.clone())
    }

    /// Load files and directories (every `*.hcl` file in it) into `target`
    ///
    /// On success the warnings are returned.
    #[tracing::instrument(level = "debug", skip_all, fields(ty = std::any::type_name::<T>()))]
    pub fn load<T: Decode>(
        &self,
        target: &mut T,
        paths: &[impl AsRef<Path>],
    ) -> Result<Diagnostics, LoadError> {
        let mut sources = Sources::default();
        let mut diagnostics = Diagnostics::default();

        let mut bodies = vec![];
        for path in paths {
            let (loaded, load_diagnostics) = sources.load_path(path.as_ref());
            bodies.extend(loaded);
            diagnostics.extend(load_diagnostics);
        }

        if !diagnostics.has_errors() {
            diagnostics.extend(self.load_body(&Body::merge(bodies), target));
        }

        self.finish(diagnostics, &sources)
    }

    /// Load a single in-memory document, `filename` must end with `.hcl` or `.json`
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(ty = std::any::type_name::<T>(), filename = %filename)
    )]
    pub fn load_str<T: Decode>(
        &self,
        target: &mut T,
        filename: &str,
        src: &str,
    ) -> Result<Diagnostics, LoadError> {
        let mut sources = Sources::default();

        if Syntax::of(filename).is_none() {
            let diagnostic = Diagnostic::error(
                "Invalid file format",
                format!(
                    "The file {filename:?} is not a configuration file, \
                     its name must end with \".hcl\" or \".json\"."
                ),
                None,
            );
            return self.finish(diagnostic.into(), &sources);
        }

        let diagnostics = match sources.parse(filename, src) {
            Ok(body) => self.load_body(&body, target),
            Err(diagnostics) => diagnostics,
        };

        self.finish(diagnostics, &sources)
    }

    /// Decode an already resolved body with an explicit context, see [crate::decode::load_with_body]
    pub fn load_with_body<T: Decode>(
        &self,
        body: &Body,
        ctx: &EvalContext,
        target: &mut T,
    ) -> Diagnostics {
        crate::decode::load_with_body(body, ctx, target)
    }

    /// locals, implied variables, decoding and restrictions
    fn load_body<T: Decode>(&self, body: &Body, target: &mut T) -> Diagnostics {
        let mut ctx = self.new_eval_context();

        let (remainder, locals, mut diagnostics) = resolve_locals(body, &ctx);
        if diagnostics.has_errors() {
            return diagnostics;
        }
        ctx.merge_variables(locals);

        let (implied, implied_diagnostics) = resolve_implied_variables::<T>(&remainder, &ctx);
        tracing::debug!(iterations = implied.iterations, "implied variables resolved");
        diagnostics.extend(implied_diagnostics);
        ctx.merge_variables(implied.variables);

        diagnostics.extend(crate::decode::load_with_body(&remainder, &ctx, target));
        diagnostics
    }

    fn finish(
        &self,
        diagnostics: Diagnostics,
        sources: &Sources,
    ) -> Result<Diagnostics, LoadError> {
        for warning in diagnostics.warnings() {
            tracing::warn!(%warning, "configuration warning");
        }

        if !diagnostics.has_errors() {
            return Ok(diagnostics);
        }

        let written = match &self.writer {
            Some(writer) => writer.write_diagnostics(&diagnostics, sources),
            None => TextWriter::stderr().write_diagnostics(&diagnostics, sources),
        };
        if let Err(err) = written {
            tracing::error!(%err, "failed to write diagnostics");
        }

        Err(LoadError { diagnostics })
    }
}

fn default_loader() -> &'static Loader {
    static DEFAULT: OnceLock<Loader> = OnceLock::new();
    DEFAULT.get_or_init(Loader::default)
}

/// [Loader::load] with the default loader
pub fn load<T: Decode>(
    target: &mut T,
    paths: &[impl AsRef<Path>],
) -> Result<Diagnostics, LoadError> {
    default_loader().load(target, paths)
}

/// [Loader::load_str] with the default loader
pub fn load_str<T: Decode>(
    target: &mut T,
    filename: &str,
    src: &str,
) -> Result<Diagnostics, LoadError> {
    default_loader().load_str(target, filename, src)
}

/// [Loader::load_with_body] with the default loader
pub fn load_with_body<T: Decode>(body: &Body, ctx: &EvalContext, target: &mut T) -> Diagnostics {
    default_loader().load_with_body(body, ctx, target)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{descriptor::Descriptor, value::Value};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default, Debug)]
    struct Config {
        name: String,
        port: i64,
    }

    impl Decode for Config {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .attribute("name", |c: &mut Self| &mut c.name)
                .attribute("port", |c: &mut Self| &mut c.port)
                .build()
        }
    }

    fn capturing_loader() -> (Loader, Arc<Mutex<Vec<String>>>) {
        let captured = Arc::new(Mutex::new(vec![]));
        let sink = captured.clone();

        let mut loader = Loader::new();
        loader.diagnostic_writer(move |diagnostic: &Diagnostic| -> std::io::Result<()> {
            sink.lock().expect("not poisoned").push(diagnostic.to_string());
            Ok(())
        });
        (loader, captured)
    }

    #[test]
    fn loader_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Loader>();
    }

    #[test]
    fn locals_and_variables_are_available() {
        let mut loader = Loader::new();
        loader.variables(Object::from([("base".to_string(), Value::Integer(8000))]));

        let mut config = Config::default();
        let warnings = loader
            .load_str(
                &mut config,
                "config.hcl",
                r#"
                locals {
                  offset = 80
                }
                name = "web"
                port = base + local.offset
                "#,
            )
            .expect("valid configuration");

        assert!(warnings.is_empty());
        assert_eq!(config.name, "web");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn failed_loads_go_to_the_writer() {
        let (loader, captured) = capturing_loader();

        let mut config = Config::default();
        let err = loader
            .load_str(&mut config, "config.hcl", "name = \"web\"\n")
            .expect_err("port is missing");

        assert_eq!(err.to_string(), "1 errors occurred. See diagnostics for details");
        assert_eq!(
            *captured.lock().expect("not poisoned"),
            vec![
                "config.hcl:1,1-1: Missing required argument; \
                 The argument \"port\" is required, but no definition was found."
            ]
        );
    }

    #[test]
    fn only_configuration_files() {
        let (loader, captured) = capturing_loader();

        let mut config = Config::default();
        let err = loader
            .load_str(&mut config, "config.txt", "a = 1")
            .expect_err("not a configuration file");

        assert_eq!(err.diagnostics.error_count(), 1);
        assert_eq!(captured.lock().expect("not poisoned").len(), 1);
    }

    #[test]
    fn local_errors_stop_the_load() {
        let (loader, _) = capturing_loader();

        let mut config = Config::default();
        let err = loader
            .load_str(
                &mut config,
                "config.hcl",
                "locals {\n  a = name\n}\nname = \"web\"\nport = 1\n",
            )
            .expect_err("locals may not reference attributes");

        let summaries: Vec<_> = err.diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Local Variables"]);
        assert_eq!(config.name, "");
    }

    #[test]
    fn custom_functions_extend_the_defaults() {
        fn double(args: hcl::eval::FuncArgs) -> Result<hcl::Value, String> {
            let number = args[0].as_i64().ok_or("number required")?;
            Ok(hcl::Value::from(number * 2))
        }

        let mut loader = Loader::new();
        loader.functions(Functions::from([(
            "double".to_string(),
            hcl::eval::FuncDef::builder()
                .param(hcl::eval::ParamType::Number)
                .build(double),
        )]));

        let mut config = Config::default();
        loader
            .load_str(&mut config, "config.hcl", "name = upper(\"a\")\nport = double(21)\n")
            .expect("valid configuration");

        assert_eq!(config.name, "A");
        assert_eq!(config.port, 42);
    }
}
