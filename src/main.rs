//! Turnstile CLI entry point.

mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use cli::{Cli, Command, OptionFlags};
use derive_more::{Display, From};
use turnstile::{GeneratorFile, GeneratorSource, InputError, TurnstileDatabaseImpl};
use turnstile_eval::{EvalError, Runtime, Value};
use turnstile_ir::{Flavor, ParamDecl, StateMachineType};
use turnstile_lower::AllocatorSeed;

#[derive(Debug, Display, From)]
enum CliError {
    #[display("{_0}")]
    Input(InputError),
    #[display("cannot encode output: {_0}")]
    Json(serde_json::Error),
    #[display("{_0}")]
    Eval(EvalError),
    #[display("lowering `{_0}` failed")]
    Lowering(String),
}

impl std::error::Error for CliError {}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();
}

fn execute(command: Command) -> Result<(), CliError> {
    match command {
        Command::Lower {
            file,
            options,
            debug_map,
        } => {
            let machine = lower(load(&file, &options)?)?;
            if debug_map {
                let table = AllocatorSeed::from_debug_map(&machine.states);
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                print!("{machine}");
            }
            Ok(())
        }
        Command::Run {
            file,
            options,
            args,
            dispose_after,
        } => {
            let file = load(&file, &options)?;
            let params = file.method.params.clone();
            let machine = lower(file)?;
            iterate(machine, &params, &args, dispose_after)
        }
    }
}

/// Read a generator file and apply the command-line overrides.
fn load(path: &Path, flags: &OptionFlags) -> Result<GeneratorFile, CliError> {
    let mut file = GeneratorFile::read(path)?;
    flags.apply(&mut file.options);
    if let Some(seed) = &flags.seed {
        let text = std::fs::read_to_string(seed).map_err(InputError::from)?;
        let seed: AllocatorSeed = serde_json::from_str(&text).map_err(InputError::from)?;
        file.options.allocator_seed = Some(seed);
    }
    Ok(file)
}

fn lower(file: GeneratorFile) -> Result<StateMachineType, CliError> {
    let db = TurnstileDatabaseImpl::default();
    let name = file.method.name.clone();
    let source = GeneratorSource::new(&db, file.method, file.options);
    let output = turnstile::lower_with_diagnostics(&db, source);
    for diagnostic in &output.diagnostics {
        eprintln!("{diagnostic}");
    }
    output.machine.ok_or(CliError::Lowering(name))
}

/// Drive the machine the way a `foreach` would, printing values and host
/// log lines in the order they happen.
fn iterate(
    machine: StateMachineType,
    params: &[ParamDecl],
    args: &[i64],
    dispose_after: Option<usize>,
) -> Result<(), CliError> {
    let ty = Rc::new(machine);
    let mut runtime = Runtime::new();

    // Token parameters receive no token from the command line.
    let mut ints = args.iter();
    let args = params
        .iter()
        .map(|param| {
            if param.cancellation_token {
                Value::Null
            } else {
                ints.next().map_or(Value::Null, |&n| Value::Int(n))
            }
        })
        .collect();

    let mut enumerator = runtime.invoke(&ty, args)?;
    if ty.flavor == Flavor::Reiterable {
        enumerator = runtime.get_enumerator(&enumerator, None)?;
    }

    let mut produced = 0;
    while dispose_after.is_none_or(|limit| produced < limit) {
        let more = runtime.move_next(&enumerator);
        print_log(&mut runtime);
        if !more? {
            break;
        }
        println!("yield {}", runtime.current(&enumerator)?);
        produced += 1;
    }

    runtime.request_dispose(&enumerator)?;
    print_log(&mut runtime);
    Ok(())
}

fn print_log(runtime: &mut Runtime) {
    for line in runtime.take_log() {
        println!("log {line}");
    }
}
