use crate::analysis::checker::TypeChecker;
use crate::core::concrete::ConcreteType;
use crate::errors::{ErrorKind, TypeError};
use crate::frontend::config::{CheckOptions, Config, ErrorFormat};
use crate::infrastructure::logging::{init_logging, LogConfig, LogFormat};
use crate::infrastructure::parallel::check_batch;
use crate::jelly::{parse_jelly, parse_unit, JellyBindings, JellyType, ParseError};
use crate::registry::{self, Registry, TypeContext};
use crate::units::canonicalize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

const USAGE: &str = "Usage: jelly-infer [OPTIONS] <COMMAND>\n\n\
Commands:\n  \
  check <type>...   Concretize jelly types\n  \
  unify <a> <b>     Unify two jelly types sharing variable names\n  \
  canon <unit>      Canonicalize a unit\n  \
  config            Print the default configuration\n\n\
Options:\n  \
  --registry FILE   Registry file declaring units and tagged types\n  \
  --config FILE     Configuration file (default: nearest .jellyrc)\n  \
  --no-default      Report unconstrained variables instead of defaulting\n  \
  --json            Print results as JSON\n  \
  --verbose         Log inference steps to stderr\n  \
  --no-color        Disable colored output";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Check(Vec<String>),
    Unify(String, String),
    Canon(String),
    PrintConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub command: Command,
    pub registry: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub no_default: bool,
    pub json: bool,
    pub verbose: bool,
    pub color: bool,
}

enum Failure {
    Parse(ParseError),
    Type(Vec<TypeError>),
}

/// What one input turned into
struct Outcome {
    input: String,
    result: Result<String, Failure>,
}

impl Outcome {
    fn new(input: impl Into<String>, result: Result<ConcreteType, TypeError>) -> Self {
        Self {
            input: input.into(),
            result: result.map(|ty| ty.to_string()).map_err(|e| Failure::Type(vec![e])),
        }
    }

    fn parse_failure(input: impl Into<String>, error: ParseError) -> Self {
        Self {
            input: input.into(),
            result: Err(Failure::Parse(error)),
        }
    }
}

pub struct Cli {
    cli: CliConfig,
    config: Config,
}

impl Cli {
    /// Combines the command line with the configuration file it names, or
    /// with the nearest `.jellyrc`.
    pub fn new(cli: CliConfig) -> Result<Self, String> {
        let mut config = match &cli.config {
            Some(path) => Config::load(path)?,
            None => Config::discover(),
        };
        if cli.no_default {
            config.infer.allow_defaulting = false;
        }
        if cli.json {
            config.errors.format = ErrorFormat::Json;
        }
        if cli.registry.is_some() {
            config.registry = cli.registry.clone();
        }
        Ok(Self { cli, config })
    }

    pub fn run(&self) -> Result<i32, String> {
        let context = self.load_registry()?;
        let outcomes = match &self.cli.command {
            Command::Check(inputs) => self.check(&context, inputs)?,
            Command::Unify(a, b) => vec![self.unify(&context, a, b)],
            Command::Canon(unit) => vec![self.canon(&context, unit)],
            Command::PrintConfig => {
                print!("{}", Config::generate_default());
                return Ok(0);
            }
        };

        self.print(&outcomes);
        Ok(if outcomes.iter().all(|o| o.result.is_ok()) { 0 } else { 1 })
    }

    fn options(&self) -> CheckOptions {
        self.config.check_options()
    }

    fn load_registry(&self) -> Result<TypeContext, String> {
        match &self.config.registry {
            Some(path) => registry::file::load(path)
                .map_err(|e| format!("Failed to load registry {}: {}", path.display(), e)),
            None => Ok(TypeContext::with_builtins()),
        }
    }

    fn check(&self, context: &TypeContext, inputs: &[String]) -> Result<Vec<Outcome>, String> {
        let mut outcomes: Vec<Option<Outcome>> = Vec::with_capacity(inputs.len());
        let mut parsed = Vec::new();
        let mut positions = Vec::new();

        for (i, input) in inputs.iter().enumerate() {
            match parse_jelly(input) {
                Ok(jelly) => {
                    parsed.push(jelly);
                    positions.push(i);
                    outcomes.push(None);
                }
                Err(e) => outcomes.push(Some(Outcome::parse_failure(input.as_str(), e))),
            }
        }

        let results = check_batch(
            context.snapshot(),
            &parsed,
            self.options(),
            self.config.parallel.workers,
        )
        .map_err(|e| format!("Failed to start workers: {}", e))?;

        for result in results {
            let position = positions[result.index];
            outcomes[position] = Some(Outcome::new(inputs[position].as_str(), result.outcome));
        }
        Ok(outcomes.into_iter().flatten().collect())
    }

    fn unify(&self, context: &TypeContext, a: &str, b: &str) -> Outcome {
        let input = format!("{} ~ {}", a, b);
        let (left, right) = match (parse_jelly(a), parse_jelly(b)) {
            (Ok(left), Ok(right)) => (left, right),
            (Err(e), _) | (_, Err(e)) => return Outcome::parse_failure(input, e),
        };

        let registry: Arc<dyn Registry> = context.snapshot();
        let mut checker = TypeChecker::with_options(registry, self.options());
        Outcome::new(input, unify_jelly(&mut checker, &left, &right))
    }

    fn canon(&self, context: &TypeContext, text: &str) -> Outcome {
        let unit = match parse_unit(text) {
            Ok(unit) => unit,
            Err(e) => return Outcome::parse_failure(text, e),
        };
        let result = match unit.to_unit() {
            Some(unit) => canonicalize(&unit, context.snapshot().as_ref())
                .map(|canonical| format!("{} {}", canonical.scale, canonical.unit))
                .map_err(|e| Failure::Type(vec![e])),
            None => Err(Failure::Type(vec![TypeError::new(ErrorKind::UnresolvedVariable {
                name: unit.to_string(),
            })])),
        };
        Outcome {
            input: text.to_string(),
            result,
        }
    }

    fn print(&self, outcomes: &[Outcome]) {
        if self.config.errors.format == ErrorFormat::Json {
            let values: Vec<_> = outcomes
                .iter()
                .map(|outcome| match &outcome.result {
                    Ok(ty) => json!({ "input": outcome.input, "type": ty }),
                    Err(Failure::Type(errors)) => json!({ "input": outcome.input, "errors": errors }),
                    Err(Failure::Parse(e)) => json!({
                        "input": outcome.input,
                        "parse_error": { "offset": e.offset, "message": e.message },
                    }),
                })
                .collect();
            match serde_json::to_string_pretty(&values) {
                Ok(text) => println!("{}", text),
                Err(e) => self.print_error(&format!("Failed to serialize results: {}", e)),
            }
            return;
        }

        for outcome in outcomes {
            match &outcome.result {
                Ok(ty) => self.print_success(&format!("{}: {}", outcome.input, ty)),
                Err(Failure::Parse(e)) => {
                    self.print_error(&format!("{}: parse error {}", outcome.input, e))
                }
                Err(Failure::Type(errors)) => {
                    for error in errors {
                        self.print_error(&self.render_error(&outcome.input, error));
                    }
                }
            }
        }
    }

    fn render_error(&self, input: &str, error: &TypeError) -> String {
        if self.config.errors.format == ErrorFormat::Compact || !self.config.errors.show_suggestions {
            format!("{}: {}", input, error.message)
        } else {
            format!("{}: {}", input, error).trim_end().to_string()
        }
    }

    fn print_error(&self, msg: &str) {
        if self.cli.color {
            eprintln!("\x1b[31m{}\x1b[0m", msg);
        } else {
            eprintln!("{}", msg);
        }
    }

    fn print_success(&self, msg: &str) {
        if self.cli.color {
            println!("\x1b[32m{}\x1b[0m", msg);
        } else {
            println!("{}", msg);
        }
    }
}

/// Unifies two templates whose variable names are shared and concretizes
/// the result.
fn unify_jelly(
    checker: &mut TypeChecker,
    left: &JellyType,
    right: &JellyType,
) -> Result<ConcreteType, TypeError> {
    let mut bindings = JellyBindings::default();
    let a = checker.instantiate_with(left, &mut bindings)?;
    let b = checker.instantiate_with(right, &mut bindings)?;
    let unified = checker.unify_keyed(&a, &b, &[left.key(), right.key()])?;
    checker.concretize(&unified)
}

pub fn parse_args<I>(args: I) -> Result<CliConfig, String>
where
    I: IntoIterator<Item = String>,
{
    let mut registry = None;
    let mut config = None;
    let mut no_default = false;
    let mut json = false;
    let mut verbose = false;
    let mut color = true;
    let mut positional = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--registry" => {
                let path = args.next().ok_or("--registry requires an argument")?;
                registry = Some(PathBuf::from(path));
            }
            "--config" => {
                let path = args.next().ok_or("--config requires an argument")?;
                config = Some(PathBuf::from(path));
            }
            "--no-default" => no_default = true,
            "--json" => json = true,
            "--verbose" | "-v" => verbose = true,
            "--no-color" => color = false,
            "--help" | "-h" => return Err(USAGE.to_string()),
            option if option.starts_with("--") => {
                return Err(format!("Unknown option: {}\n\n{}", option, USAGE));
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("check") => {
            let inputs: Vec<String> = positional.collect();
            if inputs.is_empty() {
                return Err("check requires at least one type".to_string());
            }
            Command::Check(inputs)
        }
        Some("unify") => match (positional.next(), positional.next(), positional.next()) {
            (Some(a), Some(b), None) => Command::Unify(a, b),
            _ => return Err("unify requires exactly two types".to_string()),
        },
        Some("canon") => match (positional.next(), positional.next()) {
            (Some(unit), None) => Command::Canon(unit),
            _ => return Err("canon requires exactly one unit".to_string()),
        },
        Some("config") => Command::PrintConfig,
        Some(other) => return Err(format!("Unknown command: {}\n\n{}", other, USAGE)),
        None => return Err(USAGE.to_string()),
    };

    Ok(CliConfig {
        command,
        registry,
        config,
        no_default,
        json,
        verbose,
        color,
    })
}

/// Entry point for the CLI binary
pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = parse_args(std::env::args().skip(1))?;

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let guard = init_logging(
        LogConfig::new()
            .with_level(level)
            .with_format(LogFormat::Compact)
            .with_span_events(cli.verbose)
            .with_ansi(cli.color),
    );

    let exit_code = Cli::new(cli)?.run()?;
    if exit_code != 0 {
        drop(guard);
        std::process::exit(exit_code);
    }
    Ok(())
}
