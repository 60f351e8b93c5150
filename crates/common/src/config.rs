/// Process configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    /// "development" or "production".
    pub environment: String,

    /// JSON market snapshot evaluated by the runner.
    pub snapshot_path: String,

    /// Signal parameters file path.
    pub signal_config_path: String,

    /// Capacity of the outbound signal channel.
    pub outbound_capacity: usize,

    /// Re-evaluate the snapshot on this period until shutdown. `None` runs a
    /// single cycle.
    pub eval_interval_secs: Option<u64>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let outbound_capacity = optional_env("OUTBOUND_CAPACITY")
            .map(|v| {
                v.parse::<usize>().unwrap_or_else(|_| {
                    panic!("OUTBOUND_CAPACITY must be a positive integer, got: '{v}'")
                })
            })
            .unwrap_or(64);
        if outbound_capacity == 0 {
            panic!("OUTBOUND_CAPACITY must be a positive integer, got: '0'");
        }

        let eval_interval_secs = optional_env("EVAL_INTERVAL_SECS").map(|v| {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => panic!("EVAL_INTERVAL_SECS must be a positive integer, got: '{v}'"),
            }
        });

        Config {
            environment: optional_env("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            snapshot_path: required_env("SNAPSHOT_PATH"),
            signal_config_path: optional_env("SIGNAL_CONFIG_PATH")
                .unwrap_or_else(|| "config/signal.toml".to_string()),
            outbound_capacity,
            eval_interval_secs,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.as_str(), "production" | "prod")
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
