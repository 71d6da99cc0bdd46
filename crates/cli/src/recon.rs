//! `lmatch run|validate|config`: ERP vs bank reconciliation.

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use tracing::{debug, info};

use ledgermatch_io::{read_table, render_csv, render_workbook, TableFormat};
use ledgermatch_recon::config::{AmountSignMode, RowErrorPolicy};
use ledgermatch_recon::{reconcile, RawTable, ReconConfig, ReconError, Source};

use crate::exit_codes::{
    recon_exit_code, EXIT_INTERNAL, EXIT_INVALID_CONFIG, EXIT_INVALID_INPUT, EXIT_IO, EXIT_UNMATCHED,
    EXIT_USAGE,
};
use crate::CliError;

/// Default upload ceiling per input file.
pub const DEFAULT_MAX_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SignMode {
    /// Compare absolute values (debit/credit conventions differ)
    Absolute,
    /// Compare signed values
    Signed,
}

impl From<SignMode> for AmountSignMode {
    fn from(mode: SignMode) -> Self {
        match mode {
            SignMode::Absolute => AmountSignMode::Absolute,
            SignMode::Signed => AmountSignMode::Signed,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// ERP ledger export (.xlsx, .xls, .xlsb, .xlsm, .ods, .csv, .tsv, .txt)
    pub erp: PathBuf,

    /// Bank statement export (same formats)
    pub bank: PathBuf,

    /// Reconciliation config (TOML); built-in defaults when omitted
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Write the annotated report workbook
    #[arg(long = "output", short = 'o')]
    pub output: Option<PathBuf>,

    /// Write the report as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Print the report JSON to stdout
    #[arg(long)]
    pub json: bool,

    /// Skip unparseable rows and report them as unmatched
    #[arg(long)]
    pub lenient: bool,

    /// Amount sign comparison
    #[arg(long, value_enum)]
    pub sign_mode: Option<SignMode>,

    /// Date window in days for near and fuzzy matches
    #[arg(long)]
    pub window: Option<u32>,

    /// Reject input files larger than this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BYTES)]
    pub max_bytes: u64,
}

fn recon_err(err: ReconError) -> CliError {
    let hint = match &err {
        ReconError::ColumnMissing { origin, .. } => Some(format!(
            "map the column under [{}.columns] in the config",
            section(*origin)
        )),
        ReconError::DateParse { .. } => {
            Some("add the format to [input] date_formats, or pass --lenient".to_string())
        }
        ReconError::AmountParse { .. } => Some("fix the cell, or pass --lenient to skip the row".to_string()),
        ReconError::InputTooLarge { .. } => Some("raise [input] max_rows in the config".to_string()),
        ReconError::InternalConsistency(_) => Some("this is a bug; please report it with both input files".to_string()),
        _ => None,
    };
    CliError {
        code: recon_exit_code(&err),
        message: err.to_string(),
        hint,
    }
}

fn section(source: Source) -> &'static str {
    match source {
        Source::Erp => "erp",
        Source::Bank => "bank",
    }
}

fn load_config(path: Option<&Path>) -> Result<ReconConfig, CliError> {
    let Some(path) = path else {
        return Ok(ReconConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| CliError {
        code: EXIT_IO,
        message: format!("cannot read config {}: {e}", path.display()),
        hint: None,
    })?;
    ReconConfig::from_toml(&text).map_err(recon_err)
}

/// Extension and size checks, then read and parse one source.
fn load_source(
    path: &Path,
    origin: Source,
    config: &ReconConfig,
    max_bytes: u64,
) -> Result<RawTable, CliError> {
    let format = TableFormat::from_path(path).ok_or_else(|| {
        CliError::usage(format!("{origin} file {}: unsupported file type", path.display()))
            .with_hint("accepted: xlsx, xlsm, xlsb, xls, ods, csv, tsv, txt")
    })?;

    let io_err = |e: std::io::Error| CliError {
        code: EXIT_IO,
        message: format!("cannot read {}: {e}", path.display()),
        hint: None,
    };
    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > max_bytes {
        return Err(CliError {
            code: EXIT_INVALID_INPUT,
            message: format!("{origin} file {}: {size} bytes exceeds the limit of {max_bytes}", path.display()),
            hint: Some("raise --max-bytes".to_string()),
        });
    }

    let bytes = std::fs::read(path).map_err(io_err)?;
    debug!("{origin}: {} ({size} bytes, {format:?})", path.display());
    read_table(&bytes, format, config.source(origin), origin).map_err(recon_err)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|e| CliError {
        code: EXIT_IO,
        message: format!("cannot write {}: {e}", path.display()),
        hint: None,
    })?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_deref())?;
    if args.lenient {
        config.input.row_error_policy = RowErrorPolicy::Lenient;
    }
    if let Some(mode) = args.sign_mode {
        config.matching.amount_sign_mode = mode.into();
    }
    if let Some(days) = args.window {
        config.matching.date_window_days = days;
    }
    config.validate().map_err(recon_err)?;

    let erp = load_source(&args.erp, Source::Erp, &config, args.max_bytes)?;
    let bank = load_source(&args.bank, Source::Bank, &config, args.max_bytes)?;

    let report = reconcile(&config, &erp, &bank).map_err(recon_err)?;

    let render_err = |e: ledgermatch_io::RenderError| CliError {
        code: EXIT_INTERNAL,
        message: format!("cannot render report: {e}"),
        hint: None,
    };
    if let Some(path) = &args.output {
        let bytes = render_workbook(&report).map_err(render_err)?;
        write_file(path, &bytes)?;
    }
    if let Some(path) = &args.csv {
        let text = render_csv(&report).map_err(render_err)?;
        write_file(path, text.as_bytes())?;
    }
    if args.json {
        println!("{}", report.to_json_pretty().map_err(recon_err)?);
    }

    let s = &report.summary;
    info!(
        "tiers: exact {}, near {}, fuzzy {}",
        s.tier_counts.get("exact").copied().unwrap_or(0),
        s.tier_counts.get("near").copied().unwrap_or(0),
        s.tier_counts.get("fuzzy").copied().unwrap_or(0),
    );
    eprintln!(
        "matched: {}, unmatched: {}, total: {}",
        s.match_count, s.unmatch_count, s.total_records
    );
    if s.rejected_rows > 0 {
        eprintln!("rejected rows: {} (counted as unmatched)", s.rejected_rows);
    }

    if s.unmatch_count > 0 {
        return Err(CliError {
            code: EXIT_UNMATCHED,
            message: String::new(),
            hint: None,
        });
    }
    Ok(())
}

pub fn cmd_validate(path: PathBuf) -> Result<(), CliError> {
    let config = load_config(Some(&path))?;
    eprintln!("config OK: {}", config.name);
    Ok(())
}

pub fn cmd_config(path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(path.as_deref())?;
    let text = config.to_toml().map_err(|e| CliError {
        code: EXIT_INVALID_CONFIG,
        message: e.to_string(),
        hint: None,
    })?;
    print!("{text}");
    Ok(())
}
