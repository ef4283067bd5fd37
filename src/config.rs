use crate::constants::{
    DEFAULT_DB_PATH, DEFAULT_HOST, DEFAULT_LOG_DIR, DEFAULT_LOG_FILTER, DEFAULT_PORT,
    DEFAULT_REQUEST_LIMIT, DEFAULT_WINDOW,
};
use crate::error::{IngestError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rate_limit: RateLimitConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(skip)]
    source: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admissions per window. Signed so a negative value is reported as a
    /// configuration error rather than a TOML type error.
    pub limit: i64,
    /// `"<count> <UNIT>"` or just `"<UNIT>"`, e.g. `"1 SECOND"`, `"500 ms"`.
    pub window: String,
    /// Upper bound on how long a request may stay parked at the gate.
    pub max_wait_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub filter: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_REQUEST_LIMIT,
            window: DEFAULT_WINDOW.to_string(),
            max_wait_ms: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Read `path` (falling back to defaults when it does not exist), then
    /// apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with the environment lookup supplied by the caller.
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            let mut config = Self::from_toml(&content)?;
            config.source = Some(path.to_path_buf());
            config
        } else {
            Self::default()
        };

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// File the settings were read from; `None` when defaults were used.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply the environment-style overrides, looking each key up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(limit) = lookup("REQUEST_LIMIT") {
            self.rate_limit.limit = limit.trim().parse().map_err(|_| {
                IngestError::Config(format!("REQUEST_LIMIT is not an integer: {limit}"))
            })?;
        }
        if let Some(unit) = lookup("TIME_UNIT") {
            self.rate_limit.window = unit;
        }
        if let Some(ms) = lookup("INGEST_MAX_WAIT_MS") {
            let ms = ms.trim().parse().map_err(|_| {
                IngestError::Config(format!("INGEST_MAX_WAIT_MS is not an integer: {ms}"))
            })?;
            self.rate_limit.max_wait_ms = Some(ms);
        }
        if let Some(host) = lookup("INGEST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("INGEST_PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                IngestError::Config(format!("INGEST_PORT is not a valid port: {port}"))
            })?;
        }
        if let Some(backend) = lookup("INGEST_STORAGE") {
            self.storage.backend = match backend.trim().to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "sqlite" => StorageBackend::Sqlite,
                other => {
                    return Err(IngestError::Config(format!(
                        "INGEST_STORAGE must be 'memory' or 'sqlite', got '{other}'"
                    )))
                }
            };
        }
        if let Some(path) = lookup("INGEST_DB_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.rate_limit.limit()?;
        self.rate_limit.window_duration()?;
        Ok(())
    }
}

impl RateLimitConfig {
    pub fn limit(&self) -> Result<usize> {
        match usize::try_from(self.limit) {
            Ok(limit) if limit > 0 => Ok(limit),
            _ => Err(IngestError::Config(format!(
                "request limit must be a positive integer, got {}",
                self.limit
            ))),
        }
    }

    pub fn window_duration(&self) -> Result<Duration> {
        parse_window(&self.window)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

/// Parse a window such as `"1 SECOND"`, `"MINUTES"`, `"250 ms"`.
pub fn parse_window(input: &str) -> Result<Duration> {
    let invalid = |reason: &str| IngestError::Config(format!("invalid window '{input}': {reason}"));

    let mut parts = input.split_whitespace();
    let (count, unit) = match (parts.next(), parts.next(), parts.next()) {
        (Some(unit), None, None) => (1u64, unit),
        (Some(count), Some(unit), None) => {
            let count = count
                .parse::<u64>()
                .map_err(|_| invalid("count must be a non-negative integer"))?;
            (count, unit)
        }
        _ => return Err(invalid("expected '<count> <UNIT>'")),
    };

    let per_unit = match unit.to_ascii_lowercase().as_str() {
        "nanosecond" | "nanoseconds" | "ns" => Duration::from_nanos(1),
        "microsecond" | "microseconds" | "us" => Duration::from_micros(1),
        "millisecond" | "milliseconds" | "ms" => Duration::from_millis(1),
        "second" | "seconds" | "s" => Duration::from_secs(1),
        "minute" | "minutes" | "m" => Duration::from_secs(60),
        "hour" | "hours" | "h" => Duration::from_secs(60 * 60),
        "day" | "days" | "d" => Duration::from_secs(24 * 60 * 60),
        _ => return Err(invalid("unknown time unit")),
    };

    let window = u32::try_from(count)
        .ok()
        .and_then(|count| per_unit.checked_mul(count))
        .ok_or_else(|| invalid("window is too large"))?;
    if window.is_zero() {
        return Err(invalid("window must be longer than zero"));
    }
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_java_style_units() {
        assert_eq!(parse_window("1 SECOND").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_window("SECONDS").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_window("2 minutes").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_window("1 DAYS").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_window("500 MILLISECONDS").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn parses_short_units() {
        assert_eq!(parse_window("250 ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_window("3 s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_window("1 m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_window("10 us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_window("1 h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_bad_windows() {
        for bad in ["", "0 SECONDS", "-1 SECOND", "1 FORTNIGHT", "1 2 SECONDS", "x SECONDS"] {
            assert!(
                matches!(parse_window(bad), Err(IngestError::Config(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn rejects_non_positive_limit() {
        let mut rate = RateLimitConfig::default();
        rate.limit = 0;
        assert!(rate.limit().is_err());
        rate.limit = -5;
        assert!(rate.limit().is_err());
        rate.limit = 3;
        assert_eq!(rate.limit().unwrap(), 3);
    }

    #[test]
    fn reads_toml_with_partial_sections() {
        let config = Config::from_toml(
            r#"
            [rate_limit]
            limit = 3
            window = "1 SECOND"

            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.limit().unwrap(), 3);
        assert_eq!(config.rate_limit.window_duration().unwrap(), Duration::from_secs(1));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.rate_limit.max_wait().is_none());
    }

    #[test]
    fn overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("REQUEST_LIMIT", "7"),
            ("TIME_UNIT", "MINUTES"),
            ("INGEST_PORT", "9000"),
            ("INGEST_STORAGE", "memory"),
            ("INGEST_MAX_WAIT_MS", "1500"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rate_limit.limit().unwrap(), 7);
        assert_eq!(config.rate_limit.window_duration().unwrap(), Duration::from_secs(60));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.rate_limit.max_wait(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(&dir.path().join("absent.toml"), |_| None).unwrap();

        assert!(config.source().is_none());
        assert_eq!(config.rate_limit.limit().unwrap(), DEFAULT_REQUEST_LIMIT as usize);
    }

    #[test]
    fn existing_file_is_recorded_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[rate_limit]\nlimit = 4\n").unwrap();

        let config = Config::load_with(&path, |_| None).unwrap();
        assert_eq!(config.source(), Some(path.as_path()));
        assert_eq!(config.rate_limit.limit().unwrap(), 4);
    }

    #[test]
    fn unreadable_config_is_an_io_error() {
        // A directory exists but cannot be read as a file.
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_with(dir.path(), |_| None);
        assert!(matches!(result, Err(IngestError::Io(_))));
    }

    #[test]
    fn malformed_override_is_a_config_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| (key == "REQUEST_LIMIT").then(|| "lots".to_string()));
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}
