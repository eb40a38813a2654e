use std::path::PathBuf;
use std::time::Duration;

/// Server settings resolved once at startup from `PULSECHECK_*` environment
/// variables (a `.env` file is honored via dotenvy in `main`).
#[derive(Debug, Clone)]
pub struct Settings {
    /// TCP port for the HTTP API.
    pub port: u16,
    /// SQLite database file. Defaults to `<data_dir>/pulsecheck/pulsecheck.db`.
    pub db_path: PathBuf,
    /// Organization whose default policy row must exist at startup.
    pub org_id: String,
    /// Interval between schedule sweep runs.
    pub schedule_sweep_interval: Duration,
    /// Interval between expiry sweep runs.
    pub expiry_sweep_interval: Duration,
    /// Base URL of the enrichment gateway. None disables enrichment calls.
    pub enrichment_url: Option<String>,
    /// Upper bound on a single enrichment call.
    pub enrichment_timeout: Duration,
    /// When set, seed a default org policy row on startup instead of
    /// refusing to boot without one.
    pub seed_org_default: bool,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        let db_path = env_var("PULSECHECK_DB").map(PathBuf::from).unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pulsecheck")
                .join("pulsecheck.db")
        });

        Self {
            port: env_parse("PULSECHECK_PORT", 9430),
            db_path,
            org_id: env_var("PULSECHECK_ORG").unwrap_or_else(|| "default".into()),
            schedule_sweep_interval: Duration::from_secs(env_parse(
                "PULSECHECK_SCHEDULE_SWEEP_SECS",
                60,
            )),
            expiry_sweep_interval: Duration::from_secs(env_parse(
                "PULSECHECK_EXPIRY_SWEEP_SECS",
                30,
            )),
            enrichment_url: env_var("PULSECHECK_ENRICHMENT_URL"),
            enrichment_timeout: Duration::from_millis(env_parse(
                "PULSECHECK_ENRICHMENT_TIMEOUT_MS",
                3000,
            )),
            seed_org_default: env_parse("PULSECHECK_SEED_ORG_DEFAULT", true),
        }
    }
}
