use std::io::{self, IsTerminal as _};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

const ENV_NAME: &str = "HEAPDB_LOG";

fn istty() -> bool {
    io::stderr().is_terminal()
}

/// Filter from [`ENV_NAME`], `info` when unset. An unparsable directive
/// falls back to the default rather than failing startup.
fn env_filter() -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
    match std::env::var(ENV_NAME) {
        Ok(directives) => builder.parse(directives).unwrap_or_else(|e| {
            eprintln!("ignoring invalid {ENV_NAME}: {e}");
            builder_default()
        }),
        Err(_) => builder_default(),
    }
}

fn builder_default() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy("")
}

/// Install the global subscriber for the `heapdb` binary. Logs go to stderr
/// so that command output on stdout stays clean.
pub fn init() {
    let format = fmt::format()
        .with_level(true)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(false)
        .compact()
        .with_timer(fmt::time::SystemTime);
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(istty())
        .event_format(format)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("a global tracing subscriber was already installed");
    }
}
