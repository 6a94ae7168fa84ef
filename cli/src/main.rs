use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use mat_core::{
    UnhandledError, Value, Vm, VmConfig,
    bytecode::{decode_stubs, disassemble},
    val::json,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod host;

use host::FsHost;

const DEFAULT_LOG_FILTER: &str = "mat=warn,mat_cli=info";
/// Picked up from the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "mat.toml";

#[derive(Debug, Parser)]
#[command(name = "mat", author, version, about = "Runner for MAT bytecode modules", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Commands>,

    /// If no subcommand, treat as a bytecode file to run
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    #[command(flatten)]
    run: RunOptions,
}

#[derive(Debug, Clone, Default, Args)]
struct RunOptions {
    /// VM configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extra module search directory, searched before the configured ones
    #[arg(long = "import-path", value_name = "DIR")]
    import_paths: Vec<PathBuf>,

    /// Log filter, e.g. `mat::import=debug`
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a bytecode module and print its result.
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Print the disassembly of every stub in a bytecode file.
    Disasm {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn init_tracing(filter: Option<&str>) {
    let expr = filter.map(str::to_string).or_else(|| std::env::var("RUST_LOG").ok());
    let filter = expr
        .and_then(|expr| EnvFilter::try_new(expr).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read file '{}'", path.display()))
}

/// `--config`, else `mat.toml` in the working directory, else defaults.
/// `--import-path` entries go in front of the configured search path.
pub(crate) fn load_config(options: &RunOptions) -> Result<VmConfig> {
    let path = match &options.config {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
    };
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config '{}'", path.display()))?;
            let config = VmConfig::from_toml_str(&text).with_context(|| format!("in {}", path.display()))?;
            debug!(target: "mat_cli", path = %path.display(), "configuration loaded");
            config
        }
        None => VmConfig::default(),
    };
    if !options.import_paths.is_empty() {
        let mut paths = options.import_paths.clone();
        paths.append(&mut config.import_paths);
        config.import_paths = paths;
    }
    Ok(config)
}

/// Text printed for a program result; `None` for Empty.
pub(crate) fn render(vm: &mut Vm, value: &Value) -> Result<Option<String>> {
    Ok(match value {
        Value::Empty => None,
        Value::Object(obj) if obj.borrow().is_function() => Some("<function>".to_string()),
        Value::Object(_) => Some(json::encode(vm, value)?),
        other => Some(vm.as_string(other)?.to_string()),
    })
}

fn run_file(file: &Path, options: &RunOptions) -> Result<()> {
    let config = load_config(options)?;
    let bytes = read_bytes(file)?;
    let name = file.to_string_lossy();
    info!(target: "mat_cli", file = %name, "running module");
    let host = FsHost::new(&config);
    let mut vm = Vm::new(config, Box::new(host));
    let result = vm.run(&name, &bytes)?;
    if let Some(text) = render(&mut vm, &result)? {
        println!("{}", text);
    }
    Ok(())
}

fn disasm_file(file: &Path) -> Result<()> {
    let bytes = read_bytes(file)?;
    let mut stubs = decode_stubs(0, &bytes).with_context(|| format!("Failed to decode '{}'", file.display()))?;
    if stubs.is_empty() {
        bail!("'{}' contains no stubs", file.display());
    }
    stubs.sort_by_key(|stub| stub.stub_id);
    for stub in &stubs {
        println!("{}", disassemble(stub));
    }
    Ok(())
}

fn dispatch(args: CliArgs) -> Result<()> {
    match (args.command, args.file) {
        (Some(Commands::Run { file, options }), _) => run_file(&file, &options),
        (Some(Commands::Disasm { file }), _) => disasm_file(&file),
        (None, Some(file)) => run_file(&file, &args.run),
        (None, None) => bail!("no input file; try `mat run <FILE>` or `mat --help`"),
    }
}

fn log_filter(args: &CliArgs) -> Option<String> {
    match &args.command {
        Some(Commands::Run { options, .. }) => options.log.clone().or_else(|| args.run.log.clone()),
        _ => args.run.log.clone(),
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(log_filter(&args).as_deref());

    match dispatch(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<UnhandledError>() {
                Some(unhandled) => eprintln!("{}", unhandled),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
