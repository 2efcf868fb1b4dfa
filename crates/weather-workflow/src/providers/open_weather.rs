use reqwest::blocking::Client;
use serde::Deserialize;

use crate::model::{
    Alert, CurrentConditions, DailyEntry, HourlyEntry, Location, ProviderKind, Temperature,
    UnitSystem, WeatherSnapshot,
};
use crate::normalize::{normalize_icon, precip_from_fraction};

use super::{ProviderError, coordinates, decode, endpoint, epoch_to_local, get};

const ONECALL_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/onecall";
const SOURCE_URL: &str = "https://openweathermap.org/weathermap";

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    current: CurrentData,
    #[serde(default)]
    hourly: Vec<HourData>,
    #[serde(default)]
    daily: Vec<DayData>,
    #[serde(default)]
    alerts: Vec<AlertData>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct CurrentData {
    dt: i64,
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct DayTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct DayData {
    dt: i64,
    sunrise: i64,
    sunset: i64,
    temp: DayTemp,
    /// Absent on older plans; absent means unknown, not zero.
    #[serde(default)]
    pop: Option<f64>,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct HourData {
    dt: i64,
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    pop: Option<f64>,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct AlertData {
    event: String,
    end: i64,
}

pub fn fetch(
    client: &Client,
    location: &Location,
    units: UnitSystem,
    api_key: &str,
) -> Result<WeatherSnapshot, ProviderError> {
    let (lat, lon) = coordinates(location);
    let mut url = endpoint(ONECALL_ENDPOINT)?;
    url.query_pairs_mut()
        .append_pair("lat", &lat)
        .append_pair("lon", &lon)
        .append_pair("exclude", "minutely")
        .append_pair("units", units_param(units))
        .append_pair("appid", api_key.trim());

    let body = get(client, &url, api_key)?;
    parse_forecast(&body, units, Some(source_url(location)))
}

fn units_param(units: UnitSystem) -> &'static str {
    match units {
        UnitSystem::Us => "imperial",
        UnitSystem::Metric => "metric",
    }
}

fn source_url(location: &Location) -> String {
    format!(
        "{SOURCE_URL}?zoom=10&lat={:.4}&lon={:.4}",
        location.latitude, location.longitude
    )
}

/// The first listed condition is the primary one.
fn primary(conditions: &[Condition], context: &str) -> Result<(String, String), ProviderError> {
    conditions
        .first()
        .map(|condition| {
            (
                normalize_icon(ProviderKind::OpenWeather, &condition.icon),
                capitalize(condition.description.trim()),
            )
        })
        .ok_or_else(|| ProviderError::Decode(format!("{context}: empty weather list")))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// OneCall answers in the unit system it was asked for.
fn parse_forecast(
    body: &str,
    units: UnitSystem,
    source_url: Option<String>,
) -> Result<WeatherSnapshot, ProviderError> {
    let payload: OneCallResponse = decode(body)?;
    let temperature = |value: f64| Temperature::new(value, units);

    let (icon, summary) = primary(&payload.current.weather, "current")?;
    let current = CurrentConditions {
        summary,
        icon,
        humidity_pct: payload
            .current
            .humidity
            .map(|value| value.clamp(0.0, 100.0)),
        temperature: temperature(payload.current.temp),
        apparent_temperature: temperature(
            payload.current.feels_like.unwrap_or(payload.current.temp),
        ),
        observed_at: epoch_to_local(payload.current.dt)?,
    };

    let daily = payload
        .daily
        .into_iter()
        .map(|day| {
            let (icon, summary) = primary(&day.weather, "daily")?;
            Ok(DailyEntry {
                date: epoch_to_local(day.dt)?.date_naive(),
                icon,
                summary,
                high: temperature(day.temp.max),
                low: temperature(day.temp.min),
                sunrise: epoch_to_local(day.sunrise)?,
                sunset: epoch_to_local(day.sunset)?,
                precip_probability_pct: day.pop.and_then(precip_from_fraction),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let hourly = payload
        .hourly
        .into_iter()
        .map(|hour| {
            let (icon, summary) = primary(&hour.weather, "hourly")?;
            Ok(HourlyEntry {
                time: epoch_to_local(hour.dt)?,
                icon,
                summary,
                temperature: temperature(hour.temp),
                apparent_temperature: temperature(hour.feels_like.unwrap_or(hour.temp)),
                precip_probability_pct: hour.pop.and_then(precip_from_fraction),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let alerts = payload
        .alerts
        .into_iter()
        .map(|alert| {
            Ok(Alert {
                description: alert.event,
                expires_at: epoch_to_local(alert.end)?,
                url: None,
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    Ok(WeatherSnapshot::new(
        current, daily, hourly, alerts, source_url,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "lat": 51.5073,
        "lon": -0.1276,
        "timezone": "Europe/London",
        "current": {
            "dt": 1781870400,
            "temp": 18.3,
            "feels_like": 17.9,
            "humidity": 77,
            "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}]
        },
        "hourly": [
            {"dt": 1781870400, "temp": 18.3, "feels_like": 17.9, "pop": 0.47, "weather": [{"description": "light rain", "icon": "10d"}]},
            {"dt": 1781874000, "temp": 17.1, "weather": [{"description": "overcast clouds", "icon": "04n"}]}
        ],
        "daily": [
            {
                "dt": 1781870400,
                "sunrise": 1781840100,
                "sunset": 1781899800,
                "temp": {"day": 18.3, "min": 12.4, "max": 20.6, "night": 13.0},
                "pop": 1.2,
                "weather": [{"description": "moderate rain", "icon": "10d"}]
            },
            {
                "dt": 1781956800,
                "sunrise": 1781926500,
                "sunset": 1781986200,
                "temp": {"min": 11.0, "max": 22.5},
                "weather": [{"description": "clear sky", "icon": "01d"}]
            }
        ],
        "alerts": [
            {"sender_name": "Met Office", "event": "Yellow rain warning", "start": 1781856000, "end": 1781913600, "description": "Heavy showers"}
        ]
    }"#;

    #[test]
    fn open_weather_maps_sample_into_canonical_snapshot() {
        let snapshot = parse_forecast(SAMPLE, UnitSystem::Metric, None).expect("parse");

        let current = snapshot.current();
        assert_eq!(current.icon, "rain");
        assert_eq!(current.summary, "Light rain");
        assert_eq!(current.humidity_pct, Some(77.0));
        assert_eq!(current.temperature, Temperature::celsius(18.3));
        assert_eq!(current.apparent_temperature, Temperature::celsius(17.9));

        let daily = snapshot.daily();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].precip_probability_pct, Some(100));
        assert_eq!(daily[0].high, Temperature::celsius(20.6));
        assert_eq!(daily[0].low, Temperature::celsius(12.4));
        assert_eq!(daily[1].icon, "clear");
        assert_eq!(daily[1].precip_probability_pct, None);

        let hourly = snapshot.hourly();
        assert_eq!(hourly[0].precip_probability_pct, Some(47));
        assert_eq!(hourly[1].icon, "mostlycloudy");
        assert_eq!(hourly[1].apparent_temperature, Temperature::celsius(17.1));

        let alert = &snapshot.alerts()[0];
        assert_eq!(alert.description, "Yellow rain warning");
        assert_eq!(alert.expires_at.timestamp(), 1_781_913_600);
        assert_eq!(alert.url, None);
    }

    #[test]
    fn open_weather_records_requested_units() {
        let snapshot = parse_forecast(SAMPLE, UnitSystem::Us, None).expect("parse");
        assert_eq!(snapshot.current().temperature, Temperature::fahrenheit(18.3));
    }

    #[test]
    fn open_weather_rejects_empty_condition_list() {
        let body = r#"{"current": {"dt": 1781870400, "temp": 18.3, "weather": []}}"#;
        let error = parse_forecast(body, UnitSystem::Metric, None).expect_err("must fail");
        assert_eq!(
            error,
            ProviderError::Decode("current: empty weather list".to_string())
        );
    }

    #[test]
    fn open_weather_units_param_matches_api_names() {
        assert_eq!(units_param(UnitSystem::Us), "imperial");
        assert_eq!(units_param(UnitSystem::Metric), "metric");
    }
}
