use std::collections::HashMap;
use std::path::PathBuf;

/// Five-minute staleness window for the default-location forecast.
pub const FORECAST_CACHE_TTL_SECS: u64 = 5 * 60;

pub const WEATHER_CACHE_DIR_ENV: &str = "WEATHER_CACHE_DIR";
pub const WEATHER_DATA_DIR_ENV: &str = "WEATHER_DATA_DIR";
pub const WEATHER_ICONS_DIR_ENV: &str = "WEATHER_ICONS_DIR";
pub const WEATHER_CACHE_TTL_SECS_ENV: &str = "WEATHER_CACHE_TTL_SECS";
const ALFRED_WORKFLOW_CACHE_ENV: &str = "ALFRED_WORKFLOW_CACHE";
const ALFRED_WORKFLOW_DATA_ENV: &str = "ALFRED_WORKFLOW_DATA";
const HOME_ENV: &str = "HOME";

const CACHE_FILE_NAME: &str = "forecast-cache.json";
const SETTINGS_FILE_NAME: &str = "config.toml";
const DEFAULT_ICONS_DIR: &str = "icons";
const FALLBACK_DIR_NAME: &str = "nils-weather-workflow";

pub const PROVIDER_TIMEOUT_SECS: u64 = 10;
pub const USER_AGENT: &str =
    "nils-weather-workflow/0.3 (+https://github.com/sympoies/nils-weather-workflow)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    pub icons_dir: PathBuf,
    pub cache_ttl_secs: u64,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub(crate) fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let home = map.get(HOME_ENV).map(String::as_str);

        Self {
            cache_dir: resolve_dir(&map, &[WEATHER_CACHE_DIR_ENV, ALFRED_WORKFLOW_CACHE_ENV], home)
                .unwrap_or_else(fallback_dir),
            data_dir: resolve_dir(&map, &[WEATHER_DATA_DIR_ENV, ALFRED_WORKFLOW_DATA_ENV], home)
                .unwrap_or_else(fallback_dir),
            icons_dir: resolve_dir(&map, &[WEATHER_ICONS_DIR_ENV], home)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ICONS_DIR)),
            cache_ttl_secs: resolve_cache_ttl_secs(&map),
        }
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE_NAME)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE_NAME)
    }
}

fn resolve_dir(
    env_map: &HashMap<String, String>,
    keys: &[&str],
    home: Option<&str>,
) -> Option<PathBuf> {
    keys.iter()
        .filter_map(|key| env_map.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(|value| PathBuf::from(expand_home_path(value, home)))
}

fn fallback_dir() -> PathBuf {
    std::env::temp_dir().join(FALLBACK_DIR_NAME)
}

fn expand_home_path(raw: &str, home: Option<&str>) -> String {
    let trimmed = raw.trim();
    let Some(home) = home.map(str::trim).filter(|value| !value.is_empty()) else {
        return trimmed.to_string();
    };

    let home = home.trim_end_matches('/');
    let mut expanded = trimmed.replace("$HOME", home);

    if expanded == "~" {
        expanded = home.to_string();
    } else if let Some(rest) = expanded.strip_prefix("~/") {
        expanded = format!("{home}/{rest}");
    }

    expanded
}

fn resolve_cache_ttl_secs(env_map: &HashMap<String, String>) -> u64 {
    env_map
        .get(WEATHER_CACHE_TTL_SECS_ENV)
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(FORECAST_CACHE_TTL_SECS)
}
