use std::fmt;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "dark_sky")]
    DarkSky,
    #[serde(rename = "forecast_io")]
    ForecastIo,
    #[serde(rename = "weather_underground")]
    WeatherUnderground,
    #[serde(rename = "open_weather")]
    OpenWeather,
    #[serde(rename = "climacell")]
    ClimaCell,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::DarkSky,
        ProviderKind::ForecastIo,
        ProviderKind::WeatherUnderground,
        ProviderKind::OpenWeather,
        ProviderKind::ClimaCell,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DarkSky => "dark_sky",
            Self::ForecastIo => "forecast_io",
            Self::WeatherUnderground => "weather_underground",
            Self::OpenWeather => "open_weather",
            Self::ClimaCell => "climacell",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::DarkSky => "Dark Sky",
            Self::ForecastIo => "Forecast.io",
            Self::WeatherUnderground => "Weather Underground",
            Self::OpenWeather => "OpenWeather",
            Self::ClimaCell => "ClimaCell",
        }
    }

    /// Accepts wire ids as well as the human labels users tend to type.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .map(|ch| ch.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "darksky" => Some(Self::DarkSky),
            "forecastio" => Some(Self::ForecastIo),
            "weatherunderground" | "wunderground" => Some(Self::WeatherUnderground),
            "openweather" | "openweathermap" => Some(Self::OpenWeather),
            "climacell" | "tomorrow" | "tomorrowio" => Some(Self::ClimaCell),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Us,
    Metric,
}

impl UnitSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Us => "us",
            Self::Metric => "metric",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "us" | "imperial" | "f" | "fahrenheit" => Some(Self::Us),
            "metric" | "si" | "c" | "celsius" => Some(Self::Metric),
            _ => None,
        }
    }

    pub fn degree_label(self) -> &'static str {
        match self {
            Self::Us => "°F",
            Self::Metric => "°C",
        }
    }
}

/// A reading tagged with the unit system it was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub value: f64,
    pub unit: UnitSystem,
}

impl Temperature {
    pub fn new(value: f64, unit: UnitSystem) -> Self {
        Self { value, unit }
    }

    pub fn celsius(value: f64) -> Self {
        Self::new(value, UnitSystem::Metric)
    }

    pub fn fahrenheit(value: f64) -> Self {
        Self::new(value, UnitSystem::Us)
    }

    pub fn in_units(self, target: UnitSystem) -> f64 {
        normalize::normalize_temperature(self.value, self.unit, target)
    }

    pub fn rounded(self, target: UnitSystem) -> i64 {
        self.in_units(target).round() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub short_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Location {
    pub fn coordinate_label(&self) -> String {
        format!("{:.4},{:.4}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub summary: String,
    pub icon: String,
    /// `None` when the provider omits humidity; never defaulted to zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<f64>,
    pub temperature: Temperature,
    pub apparent_temperature: Temperature,
    pub observed_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub icon: String,
    pub summary: String,
    pub high: Temperature,
    pub low: Temperature,
    pub sunrise: DateTime<Local>,
    pub sunset: DateTime<Local>,
    /// `None` when the provider does not report a probability for the day.
    pub precip_probability_pct: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEntry {
    pub time: DateTime<Local>,
    pub icon: String,
    pub summary: String,
    pub temperature: Temperature,
    pub apparent_temperature: Temperature,
    pub precip_probability_pct: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub description: String,
    pub expires_at: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One fully normalized forecast. Daily and hourly series are kept sorted and
/// daily entries are unique per date; the only way in is [`WeatherSnapshot::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSnapshot")]
pub struct WeatherSnapshot {
    current: CurrentConditions,
    daily: Vec<DailyEntry>,
    hourly: Vec<HourlyEntry>,
    alerts: Vec<Alert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_url: Option<String>,
}

/// Persisted shape of [`WeatherSnapshot`]; decoding goes back through `new`.
#[derive(Deserialize)]
struct RawSnapshot {
    current: CurrentConditions,
    #[serde(default)]
    daily: Vec<DailyEntry>,
    #[serde(default)]
    hourly: Vec<HourlyEntry>,
    #[serde(default)]
    alerts: Vec<Alert>,
    #[serde(default)]
    source_url: Option<String>,
}

impl From<RawSnapshot> for WeatherSnapshot {
    fn from(raw: RawSnapshot) -> Self {
        Self::new(raw.current, raw.daily, raw.hourly, raw.alerts, raw.source_url)
    }
}

impl WeatherSnapshot {
    pub fn new(
        current: CurrentConditions,
        mut daily: Vec<DailyEntry>,
        mut hourly: Vec<HourlyEntry>,
        alerts: Vec<Alert>,
        source_url: Option<String>,
    ) -> Self {
        daily.sort_by_key(|entry| entry.date);
        daily.dedup_by_key(|entry| entry.date);
        hourly.sort_by_key(|entry| entry.time);

        Self {
            current,
            daily,
            hourly,
            alerts,
            source_url,
        }
    }

    pub fn current(&self) -> &CurrentConditions {
        &self.current
    }

    pub fn daily(&self) -> &[DailyEntry] {
        &self.daily
    }

    pub fn hourly(&self) -> &[HourlyEntry] {
        &self.hourly
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn is_at_night<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        normalize::is_at_night(&self.daily, at)
    }

    pub fn has_hourly_for(&self, date: NaiveDate) -> bool {
        self.hourly.iter().any(|entry| entry.time.date_naive() == date)
    }
}
