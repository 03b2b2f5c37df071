use clap::{Parser, Subcommand};
use env_logger::{fmt, Builder, Target};
use log::{error, info, Level, LevelFilter, Record};
use std::env;
use std::io::Write;

mod check;
mod generate;

/// Checks and generates CRAT certificates: proofs that witness both the unsatisfiability
/// structure and the weighted model count of a CNF formula.
#[derive(Parser, Debug)]
#[command(name = "crat", version = env!("CRAT_VERSION"), about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a CRAT proof against an input CNF formula.
    Check(check::CheckArgs),
    /// Generate a CRAT proof for a counting schema, validating it as it is built.
    Generate(generate::GenerateArgs),
}

fn main() {
    let exit_code = match main_with_err() {
        Err(err) => {
            error!("{}", err);
            1
        }
        Ok(exit_code) => exit_code,
    };
    std::process::exit(exit_code);
}

fn init_logging() {
    let format = |buf: &mut fmt::Formatter, record: &Record| {
        if record.level() == Level::Info {
            writeln!(buf, "c {}", record.args())
        } else {
            writeln!(buf, "c {}: {}", record.level(), record.args())
        }
    };

    let mut builder = Builder::new();
    builder
        .target(Target::Stdout)
        .format(format)
        .filter(None, LevelFilter::Info);

    if let Ok(ref env_var) = env::var("CRAT_LOG") {
        builder.parse_filters(env_var);
    }

    builder.init();
}

fn banner() {
    info!("This is crat {}", env!("CRAT_VERSION"));
    info!(
        "  {} build - {}",
        env!("CRAT_PROFILE"),
        env!("CRAT_RUSTC_VERSION")
    );
}

fn main_with_err() -> anyhow::Result<i32> {
    init_logging();
    banner();

    let cli = Cli::parse();

    match cli.command {
        Command::Check(args) => check::check_main(args),
        Command::Generate(args) => generate::generate_main(args),
    }
}
