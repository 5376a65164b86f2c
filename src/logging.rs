use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Console logging, plus a daily rolling `watchdog.log` when `log_dir` is set.
///
/// The returned guards flush the background writers on drop and must be held
/// for the lifetime of the process.
pub fn init(log_dir: Option<&Path>) -> Vec<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut guards = Vec::new();
    let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(guard);
    let console = fmt::layer().with_writer(stdout);

    let file = log_dir.map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, "watchdog.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        fmt::layer().with_writer(writer).with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    guards
}
