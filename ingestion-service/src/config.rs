use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use energy_store::{StoreError, TableName};
use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;

pub const DEFAULT_CONFIG_PATH: &str = "/data/options.json";
pub const CONFIG_PATH_ENV: &str = "TAURON_CONFIG";
pub const DEFAULT_HTTP_PORT: u16 = 8765;
pub const DEFAULT_SERVICE_URL: &str = "https://elicznik.tauron-dystrybucja.pl";
pub const DEFAULT_LOGIN_URL: &str = "https://logowanie.tauron-dystrybucja.pl/login";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid database.table: {0}")]
    Table(#[source] StoreError),
    #[error("invalid time format: {0}")]
    ScheduleTime(String),
    #[error("missing required setting {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub table: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: String::new(),
            password: String::new(),
            name: String::new(),
            table: String::new(),
            max_connections: 2,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TauronConfig {
    pub username: String,
    pub password: String,
    pub service_url: Option<String>,
    pub login_url: Option<String>,
}

impl TauronConfig {
    pub fn service_url(&self) -> &str {
        self.service_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or(DEFAULT_SERVICE_URL)
    }

    pub fn login_url(&self) -> &str {
        self.login_url.as_deref().unwrap_or(DEFAULT_LOGIN_URL)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub times: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 0,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub buffer_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_dir: PathBuf::from("/data/buffer"),
        }
    }
}

/// Add-on options file. Every section may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub tauron: TauronConfig,
    pub schedule: ScheduleConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load from `explicit`, else `$TAURON_CONFIG`, else [`DEFAULT_CONFIG_PATH`].
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => env::var_os(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(serde_json::from_str(&contents)?)
        }
    }

    /// Port for the status service; 0 falls back to [`DEFAULT_HTTP_PORT`].
    pub fn http_port(&self) -> u16 {
        if self.http.port > 0 {
            self.http.port
        } else {
            DEFAULT_HTTP_PORT
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs.max(1))
    }

    pub fn table_name(&self) -> Result<TableName, ConfigError> {
        if self.database.table.trim().is_empty() {
            return Err(ConfigError::Missing("database.table"));
        }
        TableName::new(self.database.table.as_str()).map_err(ConfigError::Table)
    }

    pub fn schedule(&self) -> Result<ScheduleSpec, ConfigError> {
        ScheduleSpec::from_raw(&self.schedule.times)
    }

    /// Settings a fetch run cannot do without.
    pub fn validate_for_runs(&self) -> Result<(), ConfigError> {
        self.table_name()?;
        if self.database.name.trim().is_empty() {
            return Err(ConfigError::Missing("database.name"));
        }
        if self.tauron.username.trim().is_empty() {
            return Err(ConfigError::Missing("tauron.username"));
        }
        if self.tauron.password.is_empty() {
            return Err(ConfigError::Missing("tauron.password"));
        }
        Ok(())
    }
}

/// Daily trigger times as `HH:MM`, unique, in configured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    times: Vec<String>,
}

impl ScheduleSpec {
    pub fn from_raw(raw: &[String]) -> Result<Self, ConfigError> {
        let mut times = normalize_times(raw)?;
        if times.is_empty() {
            times = default_times();
        }
        Ok(Self { times })
    }

    pub fn times(&self) -> &[String] {
        &self.times
    }
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        Self {
            times: default_times(),
        }
    }
}

fn default_times() -> Vec<String> {
    vec!["02:00".to_string(), "10:00".to_string()]
}

/// Trim, pad `H:MM` / `HH:M` to `HH:MM`, drop blanks and duplicates.
pub fn normalize_times(raw: &[String]) -> Result<Vec<String>, ConfigError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for entry in raw {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let normalized =
            normalize_time(trimmed).ok_or_else(|| ConfigError::ScheduleTime(entry.clone()))?;
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    Ok(out)
}

fn normalize_time(s: &str) -> Option<String> {
    let (hour, minute) = s.split_once(':')?;
    let hour = parse_clock_part(hour)?;
    let minute = parse_clock_part(minute)?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{hour:02}:{minute:02}"))
}

fn parse_clock_part(part: &str) -> Option<u8> {
    if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_pads_and_deduplicates() {
        let times = normalize_times(&strings(&["2:00", " 02:00 ", "", "10:5", "23:59"])).unwrap();
        assert_eq!(times, strings(&["02:00", "10:05", "23:59"]));
    }

    #[test]
    fn normalize_rejects_invalid_entries() {
        for bad in ["25:99", "abc", "24:00", "12:60", "1:2:3", "123:00", "-1:00"] {
            let err = normalize_times(&strings(&["02:00", bad])).unwrap_err();
            assert!(
                matches!(err, ConfigError::ScheduleTime(ref s) if s == bad),
                "{bad} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn empty_schedule_falls_back_to_defaults() {
        let spec = ScheduleSpec::from_raw(&strings(&["  ", ""])).unwrap();
        assert_eq!(spec.times(), strings(&["02:00", "10:00"]).as_slice());
    }

    #[test]
    fn parses_options_json_with_defaults() {
        let json = r#"{
            "database": {"host": "core-mariadb", "user": "ha", "password": "pw", "name": "energy", "table": "tauron"},
            "tauron": {"username": "client@example.com", "password": "secret"},
            "schedule": {"times": ["2:00", "14:30"]}
        }"#;
        let cfg: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(cfg.database.port, 3306);
        assert_eq!(cfg.database.max_connections, 2);
        assert_eq!(cfg.http_port(), DEFAULT_HTTP_PORT);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.storage.buffer_dir, PathBuf::from("/data/buffer"));
        assert_eq!(cfg.tauron.service_url(), DEFAULT_SERVICE_URL);
        assert_eq!(cfg.table_name().unwrap().quoted(), "`tauron`");
        assert_eq!(cfg.schedule().unwrap().times(), strings(&["02:00", "14:30"]).as_slice());
        assert!(cfg.validate_for_runs().is_ok());
    }

    #[test]
    fn explicit_http_port_wins() {
        let cfg: AppConfig = serde_json::from_str(r#"{"http": {"port": 9000}}"#).unwrap();
        assert_eq!(cfg.http_port(), 9000);
    }

    #[test]
    fn validate_reports_missing_credentials() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"database": {"name": "energy", "table": "tauron"}, "tauron": {"username": ""}}"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.validate_for_runs(),
            Err(ConfigError::Missing("tauron.username"))
        ));
    }

    #[test]
    fn rejects_unsafe_table_name() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"database": {"table": "tauron; DROP TABLE x"}}"#).unwrap();
        assert!(matches!(cfg.table_name(), Err(ConfigError::Table(_))));
    }

    #[test]
    fn loads_toml_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
host = "127.0.0.1"
name = "energy"
table = "tauron"

[http]
port = 8080
request_timeout_secs = 5

[storage]
buffer_dir = "/tmp/tauron"
"#
        )
        .unwrap();

        let cfg = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.database.host, "127.0.0.1");
        assert_eq!(cfg.http_port(), 8080);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.storage.buffer_dir, PathBuf::from("/tmp/tauron"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::from_file(&dir.path().join("options.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
