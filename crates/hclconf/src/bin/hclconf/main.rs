mod cli;

use hclconf::{
    body::Body,
    context::EvalContext,
    diagnostic::{DiagnosticWriter, Diagnostics, TextWriter},
    locals::{resolve_locals, LOCAL_NAMESPACE},
    sources::Sources,
    value::{Object, Value},
    LoadError, Loader,
};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("HCLCONF_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Locals(locals_cli) => locals(locals_cli),
        cli::Command::Evaluate(evaluate_cli) => evaluate(evaluate_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn locals(cli: cli::LocalsCommand) -> anyhow::Result<()> {
    let (_, mut namespace) = resolve(&cli.input)?;

    let locals = namespace
        .shift_remove(LOCAL_NAMESPACE)
        .unwrap_or(Value::Object(Object::new()));

    output(&cli.output, &locals)
}

pub fn evaluate(cli: cli::EvaluateCommand) -> anyhow::Result<()> {
    let (ctx, _) = resolve(&cli.input)?;

    let expr: hcl_edit::expr::Expression = cli.expression.parse()?;
    let value = ctx.evaluate(&expr.into())?;

    output(&cli.output, &value)
}

/// Read the inputs and resolve their locals
fn resolve(input: &cli::InputArgs) -> anyhow::Result<(EvalContext, Object)> {
    let mut sources = Sources::default();
    let (body, mut diagnostics) = read(&mut sources, input)?;

    let mut ctx = Loader::new().new_eval_context();
    let mut namespace = Object::new();

    if !diagnostics.has_errors() {
        let (_, locals, local_diagnostics) = resolve_locals(&body, &ctx);
        diagnostics.extend(local_diagnostics);
        namespace = locals;
    }

    if !diagnostics.is_empty() {
        TextWriter::stderr().write_diagnostics(&diagnostics, &sources)?;
    }
    if diagnostics.has_errors() {
        return Err(LoadError { diagnostics }.into());
    }

    ctx.merge_variables(namespace.clone());
    Ok((ctx, namespace))
}

fn read(sources: &mut Sources, input: &cli::InputArgs) -> anyhow::Result<(Body, Diagnostics)> {
    if input.is_stdin() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        return Ok(match sources.parse("<stdin>", stdin) {
            Ok(body) => (body, Diagnostics::default()),
            Err(diagnostics) => (Body::default(), diagnostics),
        });
    }

    let mut bodies = vec![];
    let mut diagnostics = Diagnostics::default();

    if input.workdir {
        let (loaded, dir_diagnostics) = sources.load_directory(&std::env::current_dir()?);
        bodies.extend(loaded);
        diagnostics.extend(dir_diagnostics);
    }

    for file_path in &input.files {
        match sources.load_file(file_path) {
            Ok(body) => bodies.push(body),
            Err(file_diagnostics) => diagnostics.extend(file_diagnostics),
        }
    }

    for dir_path in &input.directories {
        let (loaded, dir_diagnostics) = sources.load_directory(dir_path);
        bodies.extend(loaded);
        diagnostics.extend(dir_diagnostics);
    }

    anyhow::ensure!(
        diagnostics.has_errors() || sources.files().next().is_some(),
        "No files loaded"
    );

    Ok((Body::merge(bodies), diagnostics))
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
