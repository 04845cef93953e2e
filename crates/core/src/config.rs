use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SensorlineError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub http_addr: String,
    pub default_entity: String,
    pub metric_label: String,
    pub retention: Duration,
    pub tick_interval: Duration,
    pub read_timeout: Duration,
    pub live_capacity: usize,
    pub broadcast_capacity: usize,
    pub retention_sweep_interval: Duration,
    pub sample_entities: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_root = env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(home).join(".local/share"));

        Self {
            db_path: data_root.join("sensorline/sensorline.duckdb"),
            http_addr: "127.0.0.1:3001".to_string(),
            default_entity: "Singapore".to_string(),
            metric_label: "value".to_string(),
            retention: Duration::from_secs(60 * 60 * 24),
            tick_interval: Duration::from_secs(60),
            read_timeout: Duration::from_secs(3),
            live_capacity: 10_000,
            broadcast_capacity: 256,
            retention_sweep_interval: Duration::from_secs(60),
            sample_entities: Vec::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(SensorlineError::Config(
                "tick_interval must be greater than zero".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(SensorlineError::Config(
                "read_timeout must be greater than zero".to_string(),
            ));
        }
        if self.retention.is_zero() {
            return Err(SensorlineError::Config(
                "retention must be greater than zero".to_string(),
            ));
        }
        if self.retention_sweep_interval.is_zero() {
            return Err(SensorlineError::Config(
                "retention_sweep_interval must be greater than zero".to_string(),
            ));
        }
        if self.live_capacity == 0 || self.broadcast_capacity == 0 {
            return Err(SensorlineError::Config(
                "live_capacity and broadcast_capacity must be greater than zero".to_string(),
            ));
        }
        if self.default_entity.trim().is_empty() {
            return Err(SensorlineError::Config(
                "default_entity cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    db_path: Option<PathBuf>,
    http_addr: Option<String>,
    default_entity: Option<String>,
    metric_label: Option<String>,
    retention: Option<String>,
    tick_interval: Option<String>,
    read_timeout: Option<String>,
    live_capacity: Option<usize>,
    broadcast_capacity: Option<usize>,
    retention_sweep_interval: Option<String>,
    sample_entities: Option<Vec<String>>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("SENSORLINE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("sensorline/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path).map_err(|e| {
        SensorlineError::Config(format!("failed reading {}: {e}", path.display()))
    })?;
    let parsed: ConfigOverrides = toml::from_str(&raw).map_err(|e| {
        SensorlineError::Config(format!("failed parsing {}: {e}", path.display()))
    })?;
    Ok(Some(parsed))
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(v) => Ok(Some(v.parse::<usize>().map_err(|e| {
            SensorlineError::Config(format!("bad {name} in environment: {e}"))
        })?)),
        Err(_) => Ok(None),
    }
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        db_path: env::var("SENSORLINE_DB_PATH").ok().map(PathBuf::from),
        http_addr: env::var("SENSORLINE_HTTP_ADDR").ok(),
        default_entity: env::var("SENSORLINE_DEFAULT_ENTITY").ok(),
        metric_label: env::var("SENSORLINE_METRIC_LABEL").ok(),
        retention: env::var("SENSORLINE_RETENTION").ok(),
        tick_interval: env::var("SENSORLINE_TICK_INTERVAL").ok(),
        read_timeout: env::var("SENSORLINE_READ_TIMEOUT").ok(),
        live_capacity: env_usize("SENSORLINE_LIVE_CAPACITY")?,
        broadcast_capacity: env_usize("SENSORLINE_BROADCAST_CAPACITY")?,
        retention_sweep_interval: env::var("SENSORLINE_RETENTION_SWEEP_INTERVAL").ok(),
        sample_entities: env::var("SENSORLINE_SAMPLE_ENTITIES")
            .ok()
            .map(|v| parse_entity_list(&v)),
    })
}

fn parse_duration_field(v: &str, field: &str, source: &str) -> Result<Duration> {
    humantime::parse_duration(v).map_err(|e| {
        SensorlineError::Config(format!("bad {field} in {source}: {e} (value={v})"))
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = overrides.http_addr {
        cfg.http_addr = v;
    }
    if let Some(v) = overrides.default_entity {
        cfg.default_entity = v;
    }
    if let Some(v) = overrides.metric_label {
        cfg.metric_label = v;
    }
    if let Some(v) = overrides.retention {
        cfg.retention = parse_duration_field(&v, "retention", source)?;
    }
    if let Some(v) = overrides.tick_interval {
        cfg.tick_interval = parse_duration_field(&v, "tick_interval", source)?;
    }
    if let Some(v) = overrides.read_timeout {
        cfg.read_timeout = parse_duration_field(&v, "read_timeout", source)?;
    }
    if let Some(v) = overrides.live_capacity {
        cfg.live_capacity = v;
    }
    if let Some(v) = overrides.broadcast_capacity {
        cfg.broadcast_capacity = v;
    }
    if let Some(v) = overrides.retention_sweep_interval {
        cfg.retention_sweep_interval =
            parse_duration_field(&v, "retention_sweep_interval", source)?;
    }
    if let Some(v) = overrides.sample_entities {
        cfg.sample_entities = v;
    }
    Ok(())
}

fn parse_entity_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_sampling_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.retention, Duration::from_secs(86_400));
        assert_eq!(cfg.tick_interval, Duration::from_secs(60));
        assert_eq!(cfg.read_timeout, Duration::from_secs(3));
        assert_eq!(cfg.live_capacity, 10_000);
        assert_eq!(cfg.default_entity, "Singapore");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parse_entity_list_skips_blanks() {
        assert_eq!(
            parse_entity_list("Singapore, Oslo,,  "),
            vec!["Singapore".to_string(), "Oslo".to_string()]
        );
    }

    #[test]
    fn apply_file_overrides_updates_durations() {
        let mut cfg = Config::default();
        let file: ConfigOverrides = toml::from_str(
            r#"
            tick_interval = "5s"
            read_timeout = "500ms"
            retention = "2h"
            sample_entities = ["Oslo"]
            "#,
        )
        .unwrap();

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.tick_interval, Duration::from_secs(5));
        assert_eq!(cfg.read_timeout, Duration::from_millis(500));
        assert_eq!(cfg.retention, Duration::from_secs(7200));
        assert_eq!(cfg.sample_entities, vec!["Oslo".to_string()]);
    }

    #[test]
    fn bad_duration_names_the_source() {
        let mut cfg = Config::default();
        let file = ConfigOverrides {
            tick_interval: Some("soon".to_string()),
            ..ConfigOverrides::default()
        };
        let err = apply_overrides(&mut cfg, file, "config file").unwrap_err();
        assert!(err.to_string().contains("tick_interval in config file"));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let cfg = Config {
            live_capacity: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_sweep_interval() {
        let mut cfg = Config::default();
        let env = ConfigOverrides {
            retention_sweep_interval: Some("0s".to_string()),
            ..ConfigOverrides::default()
        };
        apply_overrides(&mut cfg, env, "environment").unwrap();

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("retention_sweep_interval"));
    }
}
