// lmatch - reconcile an ERP ledger export against a bank statement

mod exit_codes;
mod logging;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};
use recon::RunArgs;

#[derive(Parser)]
#[command(name = "lmatch")]
#[command(about = "Reconcile an ERP ledger export against a bank statement")]
#[command(version)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match ERP entries to bank entries and report the result
    #[command(after_help = "\
Examples:
  lmatch run ledger.xlsx statement.csv
  lmatch run ledger.xlsx statement.xls -c recon.toml -o report.xlsx
  lmatch run ledger.csv statement.csv --lenient --window 5 --json

Exit codes:
  0 all matched, 1 unmatched entries, 2 usage, 3 invalid config,
  4 invalid input, 5 internal error, 6 file I/O")]
    Run(RunArgs),

    /// Check a config file without running
    Validate {
        /// Path to the TOML config
        config: PathBuf,
    },

    /// Print the effective config as TOML (defaults when no file is given)
    Config {
        /// Config to load and print
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => recon::cmd_run(args),
        Commands::Validate { config } => recon::cmd_validate(config),
        Commands::Config { config } => recon::cmd_config(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
