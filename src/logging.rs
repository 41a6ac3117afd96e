use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "kupuna.log";

/// Initializes the logging system with both console and file output.
///
/// Console output goes to stderr so command output on stdout stays pipeable.
pub fn init_logging() {
    let _ = fs::create_dir_all(LOG_DIR);

    // Daily rotation, written off the calling thread
    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "kupuna_intake=info".parse() {
        filter = filter.add_directive(directive);
    }

    // A subscriber installed earlier stays in place
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    // The guard flushes on drop; the process owns it until exit
    std::mem::forget(guard);
}
