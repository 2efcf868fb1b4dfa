use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::model::{Location, ProviderKind, UnitSystem};

pub const DEFAULT_ICON_SET: &str = "grzanka";

/// chrono strftime patterns offered for dates; the first is the default.
pub const DATE_FORMATS: [&str; 6] = [
    "%Y-%-m-%-d",
    "%a, %b %-d, %Y",
    "%a, %-d %b %Y",
    "%-m/%-d/%Y",
    "%-d.%-m.%Y",
    "%-d/%-m/%Y",
];

pub const TIME_FORMATS: [&str; 2] = ["%H:%M", "%-I:%M%P"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("no weather provider selected; run `config set provider <name>`")]
    MissingProvider,
    #[error("missing API key for {0}; run `config set api-key <key>`")]
    MissingApiKey(ProviderKind),
    #[error("no default location set; run `config set location <place>`")]
    MissingLocation,
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: String,
    },
    #[error("failed to read settings: {0}")]
    Read(String),
    #[error("invalid settings file: {0}")]
    Parse(String),
    #[error("failed to write settings: {0}")]
    Write(String),
}

impl SettingsError {
    /// Failures of the settings file itself rather than of its contents.
    pub fn is_storage(&self) -> bool {
        matches!(self, SettingsError::Read(_) | SettingsError::Write(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    pub units: UnitSystem,
    pub icons: String,
    pub date_format: String,
    pub time_format: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub api_keys: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: None,
            units: UnitSystem::default(),
            icons: DEFAULT_ICON_SET.to_string(),
            date_format: DATE_FORMATS[0].to_string(),
            time_format: TIME_FORMATS[0].to_string(),
            api_keys: BTreeMap::new(),
            location: None,
        }
    }
}

/// A settings view that has everything `get_weather` needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSettings<'a> {
    pub provider: ProviderKind,
    pub api_key: &'a str,
    pub units: UnitSystem,
    pub location: &'a Location,
}

impl Settings {
    /// A missing file yields defaults; anything unreadable is an error.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let payload = match fs::read_to_string(path) {
            Ok(payload) => payload,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(error) => return Err(SettingsError::Read(error.to_string())),
        };

        toml::from_str(&payload).map_err(|error| SettingsError::Parse(error.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let payload =
            toml::to_string_pretty(self).map_err(|error| SettingsError::Write(error.to_string()))?;
        write_atomic(path, payload.as_bytes()).map_err(|error| SettingsError::Write(error.to_string()))
    }

    pub fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        self.api_keys
            .get(provider.as_str())
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn require_complete(&self) -> Result<ActiveSettings<'_>, SettingsError> {
        let provider = self.provider.ok_or(SettingsError::MissingProvider)?;
        let api_key = self
            .api_key(provider)
            .ok_or(SettingsError::MissingApiKey(provider))?;
        let location = self
            .location
            .as_ref()
            .filter(|location| !location.name.trim().is_empty())
            .ok_or(SettingsError::MissingLocation)?;

        Ok(ActiveSettings {
            provider,
            api_key,
            units: self.units,
            location,
        })
    }

    /// Applies every key except `location` and `icons`, which need the geocoder
    /// and the icons directory.
    pub fn apply(
        &mut self,
        key: SettingKey,
        value: &str,
        provider_override: Option<ProviderKind>,
    ) -> Result<(), SettingsError> {
        let value = value.trim();
        match key {
            SettingKey::Provider => {
                let provider = ProviderKind::parse(value).ok_or_else(|| SettingsError::InvalidValue {
                    key: key.as_str(),
                    value: value.to_string(),
                    expected: ProviderKind::ALL
                        .iter()
                        .map(|kind| kind.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })?;
                self.provider = Some(provider);
            }
            SettingKey::ApiKey => {
                let provider = provider_override
                    .or(self.provider)
                    .ok_or(SettingsError::MissingProvider)?;
                if value.is_empty() {
                    self.api_keys.remove(provider.as_str());
                } else {
                    self.api_keys
                        .insert(provider.as_str().to_string(), value.to_string());
                }
            }
            SettingKey::Units => {
                self.units = UnitSystem::parse(value).ok_or_else(|| SettingsError::InvalidValue {
                    key: key.as_str(),
                    value: value.to_string(),
                    expected: "us, metric".to_string(),
                })?;
            }
            SettingKey::DateFormat => {
                self.date_format = pick_format(key, value, &DATE_FORMATS)?;
            }
            SettingKey::TimeFormat => {
                self.time_format = pick_format(key, value, &TIME_FORMATS)?;
            }
            SettingKey::Location | SettingKey::Icons => {
                let expected = match key {
                    SettingKey::Location => "a geocoded location",
                    _ => "an installed icon set",
                };
                return Err(SettingsError::InvalidValue {
                    key: key.as_str(),
                    value: value.to_string(),
                    expected: expected.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn set_location(&mut self, location: Location) {
        self.location = Some(location);
    }

    /// Selects one of `available` (see [`icon_sets`]).
    pub fn set_icons(&mut self, value: &str, available: &[String]) -> Result<(), SettingsError> {
        let value = value.trim();
        if !available.iter().any(|set| set == value) {
            return Err(SettingsError::InvalidValue {
                key: SettingKey::Icons.as_str(),
                value: value.to_string(),
                expected: if available.is_empty() {
                    "an icon set directory under the icons dir (none installed)".to_string()
                } else {
                    available.join(", ")
                },
            });
        }
        self.icons = value.to_string();
        Ok(())
    }
}

/// Names of the icon set directories directly under `icons_dir`, sorted.
pub fn icon_sets(icons_dir: &Path) -> Vec<String> {
    WalkDir::new(icons_dir)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| !name.starts_with('.'))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Provider,
    ApiKey,
    Units,
    Location,
    Icons,
    DateFormat,
    TimeFormat,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::Provider,
        SettingKey::ApiKey,
        SettingKey::Units,
        SettingKey::Location,
        SettingKey::Icons,
        SettingKey::DateFormat,
        SettingKey::TimeFormat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::Provider => "provider",
            SettingKey::ApiKey => "api-key",
            SettingKey::Units => "units",
            SettingKey::Location => "location",
            SettingKey::Icons => "icons",
            SettingKey::DateFormat => "date-format",
            SettingKey::TimeFormat => "time-format",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| SettingsError::UnknownKey(raw.trim().to_string()))
    }
}

/// Accepts either the pattern itself or its 1-based position in `choices`.
fn pick_format(key: SettingKey, value: &str, choices: &[&str]) -> Result<String, SettingsError> {
    if let Some(found) = choices.iter().find(|choice| **choice == value) {
        return Ok((*found).to_string());
    }

    value
        .parse::<usize>()
        .ok()
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| choices.get(index))
        .map(|choice| (*choice).to_string())
        .ok_or_else(|| SettingsError::InvalidValue {
            key: key.as_str(),
            value: value.to_string(),
            expected: choices.join(" | "),
        })
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "path must have a parent directory",
        )
    })?;
    fs::create_dir_all(parent)?;

    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
