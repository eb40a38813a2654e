use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the server process.
///
/// - Default level: INFO, `pulsecheck` itself at DEBUG; override via RUST_LOG
/// - `PULSECHECK_LOG_JSON=1` switches to newline-delimited JSON for log shippers
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pulsecheck=debug"));

    let json = std::env::var("PULSECHECK_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }

    tracing::debug!("Tracing initialized");
}
