//! Entrypoint for CLI
mod repl;

use std::{env, error::Error, fs, io, time::Instant};

use ember::{disassemble, prelude::*, serialize, IMPL_VERSION};
use log::{error, info};

use self::repl::{Repl, Stdout};

static USAGE: &str = r#"
usage: ember [OPTIONS]

options:
    -f, --file <path>         Run the script file
    -s, --serialize <path>    With --file, compile only and write the bytecode
    -b, --bytecode <path>     Run a serialized bytecode file
    -d, --disassemble         Print the disassembly before running
    -c, --config <path>       Read VM configuration from a YAML file
        --function-cache      Memoize function results by argument
        --gc-debug            Log every collection (debug builds)
        --gc-stress           Collect on every allocation (debug builds)
    -h, --help                Print this message
    -v, --version             Print the version

Without --file or --bytecode an interactive prompt is started.

examples:
    ember -f fib.em
    ember -f fib.em -s fib.emb
    ember -b fib.emb --function-cache
"#;

/// FreeBSD EX_USAGE
const EX_USAGE: i32 = 64;
/// FreeBSD EX_DATAERR, the input did not compile.
const EX_DATAERR: i32 = 65;
/// FreeBSD EX_SOFTWARE, the script failed at runtime.
const EX_SOFTWARE: i32 = 70;

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    file: Option<String>,
    serialize: Option<String>,
    bytecode: Option<String>,
    disassemble: bool,
    config: Option<String>,
    function_cache: bool,
    gc_debug: bool,
    gc_stress: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Cmd {
    Help,
    Version,
    Run(Args),
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = match parse_args(env::args().skip(1)) {
        Ok(Cmd::Run(args)) => args,
        Ok(Cmd::Version) => {
            print_version();
            std::process::exit(EX_USAGE)
        }
        Ok(Cmd::Help) => {
            print_usage();
            std::process::exit(EX_USAGE)
        }
        Err(message) => {
            eprintln!("error: {message}");
            print_usage();
            std::process::exit(EX_USAGE)
        }
    };

    let level = if args.gc_debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .env()
        .init()?;

    let conf = load_conf(&args)?;
    let result = match (&args.file, &args.bytecode) {
        (Some(file), _) => match &args.serialize {
            Some(out) => compile_to_file(file, out, args.disassemble),
            None => run_file(file, conf, args.disassemble),
        },
        (None, Some(bytecode)) => run_bytecode(bytecode, conf, args.disassemble),
        (None, None) => {
            Repl::new(conf).run(io::stdin().lock(), Stdout)?;
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(exit_code(&err))
    }

    Ok(())
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Cmd, String> {
    let mut args = args.into_iter();
    let mut parsed = Args::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-f" | "--file" => parsed.file = Some(consume_arg(&mut args, &arg)?),
            "-s" | "--serialize" => parsed.serialize = Some(consume_arg(&mut args, &arg)?),
            "-b" | "--bytecode" => parsed.bytecode = Some(consume_arg(&mut args, &arg)?),
            "-c" | "--config" => parsed.config = Some(consume_arg(&mut args, &arg)?),
            "-d" | "--disassemble" => parsed.disassemble = true,
            "--function-cache" => parsed.function_cache = true,
            "--gc-debug" if cfg!(debug_assertions) => parsed.gc_debug = true,
            "--gc-stress" if cfg!(debug_assertions) => parsed.gc_stress = true,
            "-h" | "--help" => return Ok(Cmd::Help),
            "-v" | "--version" => return Ok(Cmd::Version),
            _ => return Err(format!("unknown argument '{arg}'")),
        }
    }

    if parsed.serialize.is_some() && parsed.file.is_none() {
        return Err("--serialize requires --file".to_string());
    }
    if parsed.file.is_some() && parsed.bytecode.is_some() {
        return Err("--file and --bytecode are mutually exclusive".to_string());
    }

    Ok(Cmd::Run(parsed))
}

/// Consumes the value of an option.
fn consume_arg(mut args: impl Iterator<Item = String>, option: &str) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("option '{option}' expects a value"))
}

fn load_conf(args: &Args) -> Result<VmConf, Box<dyn Error>> {
    let mut conf = match &args.config {
        Some(path) => {
            let file = fs::File::open(path)?;
            let conf: VmConf = serde_yaml::from_reader(file)?;
            info!("loaded configuration from {path}");
            conf
        }
        None => VmConf::default(),
    };
    conf.function_cache |= args.function_cache;
    conf.gc_debug |= args.gc_debug;
    conf.gc_stress |= args.gc_stress;
    Ok(conf)
}

fn exit_code(err: &EmberError) -> i32 {
    match err {
        EmberError::Compile(_) | EmberError::Bytecode(_) => EX_DATAERR,
        _ => EX_SOFTWARE,
    }
}

fn read_source(filepath: &str) -> EmberResult<String> {
    let bytes = fs::read(filepath)?;
    Ok(String::from_utf8(bytes)?)
}

/// Print compile diagnostics with source snippets.
fn report(err: &EmberError, source: &str) {
    match err {
        EmberError::Compile(diagnostics) => eprint!("{}", diagnostics.render(source, true)),
        other => eprintln!("{other}"),
    }
}

fn compile_to_file(filepath: &str, outpath: &str, print_disassembly: bool) -> EmberResult<()> {
    let source = read_source(filepath)?;
    let function = ember::compile(&source).map_err(|err| {
        report(&err, &source);
        err
    })?;
    if print_disassembly {
        print!("{}", disassemble(&function));
    }

    let mut file = fs::File::create(outpath)?;
    serialize::write_to(&function, &mut file)?;
    info!("wrote bytecode to {outpath}");
    Ok(())
}

fn run_file(filepath: &str, conf: VmConf, print_disassembly: bool) -> EmberResult<()> {
    let source = read_source(filepath)?;
    let function = ember::compile(&source).map_err(|err| {
        report(&err, &source);
        err
    })?;
    run_function(function, conf, print_disassembly)
}

fn run_bytecode(filepath: &str, conf: VmConf, print_disassembly: bool) -> EmberResult<()> {
    let mut file = fs::File::open(filepath)?;
    let function = serialize::read_from(&mut file)?;
    run_function(function, conf, print_disassembly)
}

fn run_function(function: Function, conf: VmConf, print_disassembly: bool) -> EmberResult<()> {
    if print_disassembly {
        print!("{}", disassemble(&function));
    }

    let mut vm = Vm::new(conf);
    let start = Instant::now();
    let result = vm.run(function);
    let end = Instant::now();
    info!(
        "time taken: {}ms",
        end.duration_since(start).as_nanos() as f64 / 1000000.0
    ); // to millis

    for value in result? {
        println!("{}", vm.display(&value));
    }

    let stats = vm.heap().stats();
    info!(
        "gc: {} collections, {} objects freed",
        stats.collections, stats.objects_freed
    );
    Ok(())
}

fn print_version() {
    println!("Ember v{IMPL_VERSION}");
}

fn print_usage() {
    print_version();
    println!("{USAGE}");
}
