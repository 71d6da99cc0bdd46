use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter (e.g. `LMATCH_LOG=debug`).
pub const LOG_ENV: &str = "LMATCH_LOG";

/// Install the stderr subscriber. `-v` flags win over the environment;
/// with neither, only warnings are shown. Records from the `log` facade used
/// by the library crates are captured too.
pub fn init(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .without_time()
        .try_init();
}
