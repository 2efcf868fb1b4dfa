//! Provider-independent conversions shared by every adapter.
//!
//! - temperature conversion between the two unit systems
//! - provider weather codes to canonical icon ids
//! - night classification and the `nt_` icon variant
//! - precipitation percentages and hourly-to-daily extremes

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone};

use crate::model::{DailyEntry, HourlyEntry, ProviderKind, Temperature, UnitSystem};

pub const NIGHT_PREFIX: &str = "nt_";

pub fn normalize_temperature(value: f64, source: UnitSystem, target: UnitSystem) -> f64 {
    match (source, target) {
        (UnitSystem::Us, UnitSystem::Metric) => (value - 32.0) * 5.0 / 9.0,
        (UnitSystem::Metric, UnitSystem::Us) => value * 9.0 / 5.0 + 32.0,
        _ => value,
    }
}

/// Shared icon vocabulary; the ids double as icon asset file stems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalIcon {
    Clear,
    MostlySunny,
    PartlySunny,
    PartlyCloudy,
    MostlyCloudy,
    Cloudy,
    Fog,
    Hazy,
    Rain,
    ChanceRain,
    Tstorms,
    ChanceTstorms,
    Flurries,
    ChanceFlurries,
    Snow,
    ChanceSnow,
    Sleet,
    ChanceSleet,
}

impl CanonicalIcon {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::MostlySunny => "mostlysunny",
            Self::PartlySunny => "partlysunny",
            Self::PartlyCloudy => "partlycloudy",
            Self::MostlyCloudy => "mostlycloudy",
            Self::Cloudy => "cloudy",
            Self::Fog => "fog",
            Self::Hazy => "hazy",
            Self::Rain => "rain",
            Self::ChanceRain => "chancerain",
            Self::Tstorms => "tstorms",
            Self::ChanceTstorms => "chancetstorms",
            Self::Flurries => "flurries",
            Self::ChanceFlurries => "chanceflurries",
            Self::Snow => "snow",
            Self::ChanceSnow => "chancesnow",
            Self::Sleet => "sleet",
            Self::ChanceSleet => "chancesleet",
        }
    }
}

/// Unknown codes pass through unchanged so a new upstream code shows up as a
/// missing icon asset instead of an error.
pub fn normalize_icon(provider: ProviderKind, code: &str) -> String {
    let code = code.trim();
    let mapped = match provider {
        ProviderKind::DarkSky | ProviderKind::ForecastIo => dark_sky_icon(code),
        ProviderKind::WeatherUnderground => weather_underground_icon(code),
        ProviderKind::OpenWeather => open_weather_icon(code),
        ProviderKind::ClimaCell => climacell_icon(code),
    };

    mapped
        .map(|icon| icon.as_str().to_string())
        .unwrap_or_else(|| code.to_string())
}

fn dark_sky_icon(code: &str) -> Option<CanonicalIcon> {
    let icon = match code {
        "clear-day" | "clear-night" => CanonicalIcon::Clear,
        "partly-cloudy-day" | "partly-cloudy-night" => CanonicalIcon::PartlyCloudy,
        "cloudy" => CanonicalIcon::Cloudy,
        "rain" => CanonicalIcon::Rain,
        "sleet" | "hail" => CanonicalIcon::Sleet,
        "snow" => CanonicalIcon::Snow,
        "wind" => CanonicalIcon::Hazy,
        "fog" => CanonicalIcon::Fog,
        "thunderstorm" | "tornado" => CanonicalIcon::Tstorms,
        _ => return None,
    };
    Some(icon)
}

fn weather_underground_icon(code: &str) -> Option<CanonicalIcon> {
    // Night codes arrive pre-prefixed; night is derived at render time instead.
    let code = code.strip_prefix(NIGHT_PREFIX).unwrap_or(code);
    let icon = match code {
        "clear" | "sunny" => CanonicalIcon::Clear,
        "mostlysunny" => CanonicalIcon::MostlySunny,
        "partlysunny" => CanonicalIcon::PartlySunny,
        "partlycloudy" => CanonicalIcon::PartlyCloudy,
        "mostlycloudy" => CanonicalIcon::MostlyCloudy,
        "cloudy" => CanonicalIcon::Cloudy,
        "fog" => CanonicalIcon::Fog,
        "hazy" => CanonicalIcon::Hazy,
        "rain" => CanonicalIcon::Rain,
        "chancerain" => CanonicalIcon::ChanceRain,
        "tstorms" => CanonicalIcon::Tstorms,
        "chancetstorms" => CanonicalIcon::ChanceTstorms,
        "flurries" => CanonicalIcon::Flurries,
        "chanceflurries" => CanonicalIcon::ChanceFlurries,
        "snow" => CanonicalIcon::Snow,
        "chancesnow" => CanonicalIcon::ChanceSnow,
        "sleet" => CanonicalIcon::Sleet,
        "chancesleet" => CanonicalIcon::ChanceSleet,
        _ => return None,
    };
    Some(icon)
}

fn open_weather_icon(code: &str) -> Option<CanonicalIcon> {
    let base = code
        .strip_suffix('d')
        .or_else(|| code.strip_suffix('n'))
        .unwrap_or(code);
    let icon = match base {
        "01" => CanonicalIcon::Clear,
        "02" => CanonicalIcon::PartlyCloudy,
        "03" => CanonicalIcon::Cloudy,
        "04" => CanonicalIcon::MostlyCloudy,
        "09" | "10" => CanonicalIcon::Rain,
        "11" => CanonicalIcon::Tstorms,
        "13" => CanonicalIcon::Snow,
        "50" => CanonicalIcon::Hazy,
        _ => return None,
    };
    Some(icon)
}

fn climacell_icon(code: &str) -> Option<CanonicalIcon> {
    let icon = match code {
        "clear" => CanonicalIcon::Clear,
        "mostly_clear" => CanonicalIcon::MostlySunny,
        "partly_cloudy" => CanonicalIcon::PartlyCloudy,
        "mostly_cloudy" => CanonicalIcon::MostlyCloudy,
        "cloudy" => CanonicalIcon::Cloudy,
        "fog" => CanonicalIcon::Fog,
        "fog_light" => CanonicalIcon::Hazy,
        "drizzle" | "rain_light" | "rain" | "rain_heavy" => CanonicalIcon::Rain,
        "tstorm" => CanonicalIcon::Tstorms,
        "flurries" => CanonicalIcon::Flurries,
        "snow_light" | "snow" | "snow_heavy" => CanonicalIcon::Snow,
        "ice_pellets_light" | "ice_pellets" | "ice_pellets_heavy" | "freezing_drizzle"
        | "freezing_rain_light" | "freezing_rain" | "freezing_rain_heavy" => CanonicalIcon::Sleet,
        _ => return None,
    };
    Some(icon)
}

pub fn night_variant(icon: &str) -> String {
    if icon.starts_with(NIGHT_PREFIX) {
        icon.to_string()
    } else {
        format!("{NIGHT_PREFIX}{icon}")
    }
}

/// True when `at` falls strictly between one day's sunset and the next day's sunrise.
pub fn is_at_night<Tz: TimeZone>(daily: &[DailyEntry], at: &DateTime<Tz>) -> bool {
    let at = at.timestamp();
    daily
        .windows(2)
        .any(|pair| pair[0].sunset.timestamp() < at && at < pair[1].sunrise.timestamp())
}

/// Converts a 0..=1 probability into a whole percentage.
pub fn precip_from_fraction(value: f64) -> Option<u8> {
    precip_from_percent(value * 100.0)
}

pub fn precip_from_percent(value: f64) -> Option<u8> {
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(0.0, 100.0).round() as u8)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyExtremes {
    pub low: Temperature,
    pub high: Temperature,
}

impl DailyExtremes {
    fn observe(&mut self, reading: Temperature) {
        let value = reading.in_units(self.low.unit);
        if value < self.low.value {
            self.low = Temperature::new(value, self.low.unit);
        }
        let value = reading.in_units(self.high.unit);
        if value > self.high.value {
            self.high = Temperature::new(value, self.high.unit);
        }
    }
}

/// Buckets hourly readings by local calendar date and keeps min/max per day.
/// Days with only a few hours still get extremes from whatever is present.
pub fn daily_extremes_from_hourly(hourly: &[HourlyEntry]) -> BTreeMap<NaiveDate, DailyExtremes> {
    let mut days = BTreeMap::<NaiveDate, DailyExtremes>::new();

    for entry in hourly {
        let reading = entry.temperature;
        if !reading.value.is_finite() {
            continue;
        }
        days.entry(entry.time.date_naive())
            .and_modify(|extremes| extremes.observe(reading))
            .or_insert(DailyExtremes {
                low: reading,
                high: reading,
            });
    }

    days
}
