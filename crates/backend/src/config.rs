use std::str::FromStr;
use std::time::Duration;

use nolimit_shared::controller::ControllerConfig;
use nolimit_shared::needle::NeedleConfig;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_OVERPASS_FILTER: &str = r#"["highway"="motorway"]["maxspeed"="none"]"#;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub overpass_url: String,
    pub overpass_filter: String,
    pub fetch_interval: Duration,
    pub fetch_timeout: Duration,
    pub controller: ControllerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys take their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let controller_defaults = ControllerConfig::default();
        let needle_defaults = NeedleConfig::default();

        let gain = parse_or(&lookup, "NEEDLE_GAIN", needle_defaults.gain)?;
        let max_step = parse_or(&lookup, "NEEDLE_MAX_STEP_DEG", needle_defaults.max_step)?;

        let controller = ControllerConfig {
            directional_speed_kmh: parse_or(
                &lookup,
                "DIRECTIONAL_SPEED_KMH",
                controller_defaults.directional_speed_kmh,
            )?,
            revert_speed_kmh: parse_opt(&lookup, "REVERT_SPEED_KMH")?,
            search_radius_m: parse_or(&lookup, "SEARCH_RADIUS_M", controller_defaults.search_radius_m)?,
            dial_offset_deg: parse_or(&lookup, "DIAL_OFFSET_DEG", controller_defaults.dial_offset_deg)?,
            needle: NeedleConfig::new(gain, max_step),
        };

        let fetch_interval_secs: u64 = parse_or(&lookup, "FETCH_INTERVAL_SECS", 5)?;
        if fetch_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "FETCH_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Config {
            port: parse_or(&lookup, "PORT", 3000)?,
            overpass_url: lookup("OVERPASS_URL").unwrap_or_else(|| DEFAULT_OVERPASS_URL.to_string()),
            overpass_filter: lookup("OVERPASS_FILTER")
                .unwrap_or_else(|| DEFAULT_OVERPASS_FILTER.to_string()),
            fetch_interval: Duration::from_secs(fetch_interval_secs),
            fetch_timeout: Duration::from_secs(parse_or(&lookup, "FETCH_TIMEOUT_SECS", 25)?),
            controller,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            overpass_filter: DEFAULT_OVERPASS_FILTER.to_string(),
            fetch_interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(25),
            controller: ControllerConfig::default(),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

fn parse_opt<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
