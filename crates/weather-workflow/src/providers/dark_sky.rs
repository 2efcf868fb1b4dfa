use reqwest::blocking::Client;
use serde::Deserialize;

use crate::model::{
    Alert, CurrentConditions, DailyEntry, HourlyEntry, Location, ProviderKind, Temperature,
    UnitSystem, WeatherSnapshot,
};
use crate::normalize::{normalize_icon, precip_from_fraction};

use super::{ProviderError, coordinates, decode, endpoint, epoch_to_local, get};

const FORECAST_ENDPOINT: &str = "https://api.darksky.net/forecast";
const SOURCE_URL: &str = "https://darksky.net/forecast";

/// Response shape shared by Dark Sky and the legacy Forecast.io host.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ForecastResponse {
    currently: Currently,
    #[serde(default)]
    hourly: Option<Block<HourData>>,
    #[serde(default)]
    daily: Option<Block<DayData>>,
    #[serde(default)]
    flags: Flags,
    #[serde(default)]
    alerts: Vec<AlertData>,
}

#[derive(Debug, Deserialize)]
struct Block<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct Flags {
    #[serde(default)]
    units: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Currently {
    time: i64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    icon: String,
    temperature: f64,
    #[serde(default)]
    apparent_temperature: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayData {
    time: i64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    temperature_max: Option<f64>,
    #[serde(default)]
    temperature_high: Option<f64>,
    #[serde(default)]
    temperature_min: Option<f64>,
    #[serde(default)]
    temperature_low: Option<f64>,
    sunrise_time: i64,
    sunset_time: i64,
    #[serde(default)]
    precip_probability: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HourData {
    time: i64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    icon: String,
    temperature: f64,
    #[serde(default)]
    apparent_temperature: Option<f64>,
    #[serde(default)]
    precip_probability: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AlertData {
    title: String,
    #[serde(alias = "exipres")]
    expires: i64,
    #[serde(default)]
    uri: Option<String>,
}

pub fn fetch(
    client: &Client,
    location: &Location,
    units: UnitSystem,
    api_key: &str,
) -> Result<WeatherSnapshot, ProviderError> {
    let (lat, lon) = coordinates(location);
    let mut url = endpoint(&format!("{FORECAST_ENDPOINT}/{}/{lat},{lon}", api_key.trim()))?;
    url.query_pairs_mut()
        .append_pair("exclude", "minutely")
        .append_pair("units", units_param(units));

    let body = get(client, &url, api_key)?;
    parse_forecast(ProviderKind::DarkSky, &body, units, Some(source_url(location)))
}

fn units_param(units: UnitSystem) -> &'static str {
    match units {
        UnitSystem::Us => "us",
        UnitSystem::Metric => "si",
    }
}

fn source_url(location: &Location) -> String {
    format!(
        "{SOURCE_URL}/{:.4},{:.4}",
        location.latitude, location.longitude
    )
}

/// `flags.units` wins; only "us" is Fahrenheit, every other Dark Sky unit set is Celsius.
fn response_units(flags: &Flags, requested: UnitSystem) -> UnitSystem {
    match flags.units.as_deref().map(str::trim) {
        Some("us") => UnitSystem::Us,
        Some(other) if !other.is_empty() => UnitSystem::Metric,
        _ => requested,
    }
}

pub(super) fn parse_forecast(
    provider: ProviderKind,
    body: &str,
    requested: UnitSystem,
    source_url: Option<String>,
) -> Result<WeatherSnapshot, ProviderError> {
    let payload: ForecastResponse = decode(body)?;
    let unit = response_units(&payload.flags, requested);
    let temperature = |value: f64| Temperature::new(value, unit);

    let currently = payload.currently;
    let current = CurrentConditions {
        summary: currently.summary,
        icon: normalize_icon(provider, &currently.icon),
        humidity_pct: currently
            .humidity
            .map(|fraction| (fraction * 100.0).clamp(0.0, 100.0)),
        temperature: temperature(currently.temperature),
        apparent_temperature: temperature(
            currently
                .apparent_temperature
                .unwrap_or(currently.temperature),
        ),
        observed_at: epoch_to_local(currently.time)?,
    };

    let daily = payload
        .daily
        .map(|block| block.data)
        .unwrap_or_default()
        .into_iter()
        .map(|day| {
            let high = day
                .temperature_max
                .or(day.temperature_high)
                .ok_or_else(|| ProviderError::Decode(format!("day {} has no maximum", day.time)))?;
            let low = day
                .temperature_min
                .or(day.temperature_low)
                .ok_or_else(|| ProviderError::Decode(format!("day {} has no minimum", day.time)))?;

            Ok(DailyEntry {
                date: epoch_to_local(day.time)?.date_naive(),
                icon: normalize_icon(provider, &day.icon),
                summary: day.summary,
                high: temperature(high),
                low: temperature(low),
                sunrise: epoch_to_local(day.sunrise_time)?,
                sunset: epoch_to_local(day.sunset_time)?,
                precip_probability_pct: day.precip_probability.and_then(precip_from_fraction),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let hourly = payload
        .hourly
        .map(|block| block.data)
        .unwrap_or_default()
        .into_iter()
        .map(|hour| {
            Ok(HourlyEntry {
                time: epoch_to_local(hour.time)?,
                icon: normalize_icon(provider, &hour.icon),
                summary: hour.summary,
                temperature: temperature(hour.temperature),
                apparent_temperature: temperature(
                    hour.apparent_temperature.unwrap_or(hour.temperature),
                ),
                precip_probability_pct: hour.precip_probability.and_then(precip_from_fraction),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let alerts = payload
        .alerts
        .into_iter()
        .map(|alert| {
            Ok(Alert {
                description: alert.title,
                expires_at: epoch_to_local(alert.expires)?,
                url: alert.uri.filter(|uri| !uri.trim().is_empty()),
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
        "latitude": 25.033,
        "longitude": 121.5654,
        "currently": {
            "time": 1781870400,
            "summary": "Humid and Partly Cloudy",
            "icon": "partly-cloudy-day",
            "temperature": 88.4,
            "apparentTemperature": 99.1,
            "humidity": 0.72
        },
        "hourly": {
            "data": [
                {"time": 1781874000, "summary": "Rain", "icon": "rain", "temperature": 86.0, "apparentTemperature": 95.0, "precipProbability": 0.61},
                {"time": 1781870400, "summary": "Partly Cloudy", "icon": "partly-cloudy-day", "temperature": 88.4, "precipProbability": 0.2}
            ]
        },
        "daily": {
            "data": [
                {
                    "time": 1781827200,
                    "summary": "Thunderstorms in the afternoon.",
                    "icon": "thunderstorm",
                    "temperatureMax": 91.2,
                    "temperatureMin": 79.5,
                    "sunriseTime": 1781845200,
                    "sunsetTime": 1781895600,
                    "precipProbability": 0.354
                },
                {
                    "time": 1781913600,
                    "summary": "Clear throughout the day.",
                    "icon": "clear-day",
                    "temperatureHigh": 93.0,
                    "temperatureLow": 80.1,
                    "sunriseTime": 1781931600,
                    "sunsetTime": 1781982000
                }
            ]
        },
        "alerts": [
            {"title": "Heat Advisory", "expires": 1781899200, "uri": "https://alerts.example.test/heat"}
        ],
        "flags": {"units": "us"}
    }"#;

    #[test]
    fn dark_sky_maps_sample_into_canonical_snapshot() {
        let snapshot =
            parse_forecast(ProviderKind::DarkSky, SAMPLE, UnitSystem::Metric, None).expect("parse");

        let current = snapshot.current();
        assert_eq!(current.icon, "partlycloudy");
        assert_eq!(current.summary, "Humid and Partly Cloudy");
        assert!((current.humidity_pct.expect("humidity") - 72.0).abs() < 1e-9);
        assert_eq!(current.temperature, Temperature::fahrenheit(88.4));
        assert_eq!(current.apparent_temperature, Temperature::fahrenheit(99.1));

        let daily = snapshot.daily();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].icon, "tstorms");
        assert_eq!(daily[0].precip_probability_pct, Some(35));
        assert_eq!(daily[0].high, Temperature::fahrenheit(91.2));
        assert_eq!(daily[1].icon, "clear");
        assert_eq!(daily[1].high, Temperature::fahrenheit(93.0));
        assert_eq!(daily[1].low, Temperature::fahrenheit(80.1));
        assert_eq!(daily[1].precip_probability_pct, None);
        assert_eq!(daily[0].sunset.timestamp(), 1_781_895_600);

        let hourly = snapshot.hourly();
        assert_eq!(hourly[0].time.timestamp(), 1_781_870_400);
        assert_eq!(hourly[0].apparent_temperature, Temperature::fahrenheit(88.4));
        assert_eq!(hourly[1].precip_probability_pct, Some(61));
        assert_eq!(hourly[1].icon, "rain");

        assert_eq!(snapshot.alerts().len(), 1);
        assert_eq!(snapshot.alerts()[0].description, "Heat Advisory");
        assert_eq!(snapshot.alerts()[0].expires_at.timestamp(), 1_781_899_200);
    }

    #[test]
    fn dark_sky_units_come_from_flags() {
        let si = SAMPLE.replace(r#""units": "us""#, r#""units": "si""#);
        let snapshot = parse_forecast(ProviderKind::DarkSky, &si, UnitSystem::Us, None).expect("parse");
        assert_eq!(snapshot.current().temperature.unit, UnitSystem::Metric);

        let ca = SAMPLE.replace(r#""units": "us""#, r#""units": "ca""#);
        let snapshot = parse_forecast(ProviderKind::DarkSky, &ca, UnitSystem::Us, None).expect("parse");
        assert_eq!(snapshot.current().temperature.unit, UnitSystem::Metric);
    }

    #[test]
    fn dark_sky_falls_back_to_requested_units_without_flags() {
        let body = r#"{"currently": {"time": 1781870400, "icon": "fog", "temperature": 12.0}}"#;
        let snapshot =
            parse_forecast(ProviderKind::DarkSky, body, UnitSystem::Metric, None).expect("parse");

        assert_eq!(snapshot.current().temperature, Temperature::celsius(12.0));
        assert_eq!(snapshot.current().icon, "fog");
        assert_eq!(snapshot.current().humidity_pct, None);
        assert!(snapshot.daily().is_empty());
        assert!(snapshot.hourly().is_empty());
    }

    #[test]
    fn dark_sky_unknown_icon_passes_through() {
        let body = r#"{"currently": {"time": 1781870400, "icon": "meteor-shower", "temperature": 12.0}}"#;
        let snapshot =
            parse_forecast(ProviderKind::DarkSky, body, UnitSystem::Metric, None).expect("parse");
        assert_eq!(snapshot.current().icon, "meteor-shower");
    }

    #[test]
    fn dark_sky_rejects_payload_without_currently() {
        let error = parse_forecast(ProviderKind::DarkSky, r#"{"flags": {}}"#, UnitSystem::Us, None)
            .expect_err("must fail");
        assert!(matches!(error, ProviderError::Decode(message) if message.contains("currently")));
    }

    #[test]
    fn dark_sky_source_url_uses_rounded_coordinates() {
        let location = Location {
            name: "Taipei".to_string(),
            short_name: "Taipei".to_string(),
            latitude: 25.033_012,
            longitude: 121.565_411,
            timezone: None,
        };
        assert_eq!(
            source_url(&location),
            "https://darksky.net/forecast/25.0330,121.5654"
        );
    }
}
