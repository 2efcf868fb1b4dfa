use std::thread;

use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::model::{
    CurrentConditions, DailyEntry, HourlyEntry, Location, ProviderKind, Temperature, UnitSystem,
    WeatherSnapshot,
};
use crate::normalize::{daily_extremes_from_hourly, normalize_icon, precip_from_percent};

use super::{ProviderError, coordinates, decode, endpoint, get, parse_date, rfc3339_to_local};

const API_ROOT: &str = "https://api.climacell.co/v3/weather";
const SOURCE_URL: &str = "https://www.climacell.co/weather";
const REALTIME_FIELDS: &str = "temp,feels_like,humidity,weather_code";
const HOURLY_FIELDS: &str = "temp,feels_like,precipitation_probability,weather_code";
const DAILY_FIELDS: &str = "temp,precipitation_probability,weather_code,sunrise,sunset";

/// A reading with its unit marker ("C", "F", "%"). A slot without a marker
/// carries no usable value.
#[derive(Debug, Clone, Default, Deserialize)]
struct Reading {
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    units: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Text {
    #[serde(default)]
    value: Option<String>,
}

impl Text {
    fn as_str(&self) -> &str {
        self.value.as_deref().map(str::trim).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Realtime {
    temp: Reading,
    #[serde(default)]
    feels_like: Reading,
    #[serde(default)]
    humidity: Reading,
    #[serde(default)]
    weather_code: Text,
    observation_time: Text,
}

#[derive(Debug, Deserialize)]
struct Hour {
    temp: Reading,
    #[serde(default)]
    feels_like: Reading,
    #[serde(default)]
    precipitation_probability: Reading,
    #[serde(default)]
    weather_code: Text,
    observation_time: Text,
}

/// Daily temperature is split over two slots: one carries `min`, the other `max`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TempSlot {
    #[serde(default)]
    min: Option<Reading>,
    #[serde(default)]
    max: Option<Reading>,
}

#[derive(Debug, Deserialize)]
struct Day {
    #[serde(default)]
    temp: Vec<TempSlot>,
    #[serde(default)]
    precipitation_probability: Reading,
    #[serde(default)]
    weather_code: Text,
    sunrise: Text,
    sunset: Text,
    observation_time: Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Extreme {
    Min,
    Max,
}

pub fn fetch(
    client: &Client,
    location: &Location,
    units: UnitSystem,
    api_key: &str,
) -> Result<WeatherSnapshot, ProviderError> {
    let realtime_url = request_url("realtime", REALTIME_FIELDS, location, units, api_key, false)?;
    let hourly_url = request_url("forecast/hourly", HOURLY_FIELDS, location, units, api_key, false)?;
    let daily_url = request_url("forecast/daily", DAILY_FIELDS, location, units, api_key, true)?;

    let (realtime, hourly, daily) = thread::scope(|scope| {
        let realtime = scope.spawn(|| get(client, &realtime_url, api_key));
        let hourly = scope.spawn(|| get(client, &hourly_url, api_key));
        let daily = scope.spawn(|| get(client, &daily_url, api_key));
        (join(realtime), join(hourly), join(daily))
    });

    // First failure wins, in current -> hourly -> daily order.
    let realtime = realtime?;
    let hourly = hourly?;
    let daily = daily?;

    build_snapshot(&realtime, &hourly, &daily, Some(source_url(location)))
}

fn join(
    handle: thread::ScopedJoinHandle<'_, Result<String, ProviderError>>,
) -> Result<String, ProviderError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(ProviderError::Transport("request thread panicked".to_string())))
}

fn request_url(
    path: &str,
    fields: &str,
    location: &Location,
    units: UnitSystem,
    api_key: &str,
    from_now: bool,
) -> Result<Url, ProviderError> {
    let (lat, lon) = coordinates(location);
    let mut url = endpoint(&format!("{API_ROOT}/{path}"))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("lat", &lat)
            .append_pair("lon", &lon)
            .append_pair("unit_system", units_param(units))
            .append_pair("fields", fields);
        if from_now {
            query.append_pair("start_time", "now");
        }
        query.append_pair("apikey", api_key.trim());
    }
    Ok(url)
}

fn units_param(units: UnitSystem) -> &'static str {
    match units {
        UnitSystem::Us => "us",
        UnitSystem::Metric => "si",
    }
}

fn source_url(location: &Location) -> String {
    format!(
        "{SOURCE_URL}/?lat={:.4}&lon={:.4}",
        location.latitude, location.longitude
    )
}

fn description(code: &str) -> String {
    let text = match code {
        "clear" => "Clear",
        "mostly_clear" => "Mostly sunny",
        "partly_cloudy" => "Partly cloudy",
        "mostly_cloudy" => "Mostly cloudy",
        "cloudy" => "Cloudy",
        "fog" => "Fog",
        "fog_light" => "Light fog",
        "drizzle" => "Drizzle",
        "rain_light" => "Light rain",
        "rain" => "Rain",
        "rain_heavy" => "Heavy rain",
        "tstorm" => "Thunderstorms",
        "flurries" => "Flurries",
        "snow_light" => "Light snow",
        "snow" => "Snow",
        "snow_heavy" => "Heavy snow",
        "ice_pellets_light" => "Light sleet",
        "ice_pellets" => "Sleet",
        "ice_pellets_heavy" => "Heavy sleet",
        "freezing_drizzle" => "Freezing drizzle",
        "freezing_rain_light" => "Light freezing rain",
        "freezing_rain" => "Freezing rain",
        "freezing_rain_heavy" => "Heavy freezing rain",
        other => other,
    };
    text.to_string()
}

fn to_temperature(reading: &Reading) -> Option<Temperature> {
    let unit = match reading.units.as_deref().map(str::trim) {
        Some("C") => UnitSystem::Metric,
        Some("F") => UnitSystem::Us,
        _ => return None,
    };
    reading
        .value
        .filter(|value| value.is_finite())
        .map(|value| Temperature::new(value, unit))
}

/// Slot 0 when it has a marked reading for `extreme`, otherwise slot 1.
pub(crate) fn daily_extreme(slots: &[TempSlot], extreme: Extreme) -> Option<Temperature> {
    let read = |slot: &TempSlot| {
        let reading = match extreme {
            Extreme::Min => slot.min.as_ref(),
            Extreme::Max => slot.max.as_ref(),
        };
        reading.and_then(to_temperature)
    };

    slots
        .first()
        .and_then(read)
        .or_else(|| slots.get(1).and_then(read))
}

fn build_snapshot(
    realtime_body: &str,
    hourly_body: &str,
    daily_body: &str,
    source_url: Option<String>,
) -> Result<WeatherSnapshot, ProviderError> {
    let provider = ProviderKind::ClimaCell;
    let realtime: Realtime = decode(realtime_body)?;
    let hours: Vec<Hour> = decode(hourly_body)?;
    let days: Vec<Day> = decode(daily_body)?;

    let temperature = to_temperature(&realtime.temp)
        .ok_or_else(|| ProviderError::Decode("realtime: temp has no unit marker".to_string()))?;
    let code = realtime.weather_code.as_str();
    let current = CurrentConditions {
        summary: description(code),
        icon: normalize_icon(provider, code),
        humidity_pct: realtime
            .humidity
            .value
            .map(|value| value.clamp(0.0, 100.0)),
        temperature,
        apparent_temperature: to_temperature(&realtime.feels_like).unwrap_or(temperature),
        observed_at: rfc3339_to_local(realtime.observation_time.as_str())?,
    };

    let hourly = hours
        .iter()
        .filter_map(|hour| to_temperature(&hour.temp).map(|temperature| (hour, temperature)))
        .map(|(hour, temperature)| {
            let code = hour.weather_code.as_str();
            Ok(HourlyEntry {
                time: rfc3339_to_local(hour.observation_time.as_str())?,
                icon: normalize_icon(provider, code),
                summary: description(code),
                temperature,
                apparent_temperature: to_temperature(&hour.feels_like).unwrap_or(temperature),
                precip_probability_pct: hour
                    .precipitation_probability
                    .value
                    .and_then(precip_from_percent),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let hourly_extremes = daily_extremes_from_hourly(&hourly);
    let daily = days
        .iter()
        .map(|day| {
            let date = parse_date(day.observation_time.as_str())?;
            let derived = hourly_extremes.get(&date);
            let high = daily_extreme(&day.temp, Extreme::Max)
                .or(derived.map(|extremes| extremes.high))
                .ok_or_else(|| ProviderError::Decode(format!("daily {date}: no max temp")))?;
            let low = daily_extreme(&day.temp, Extreme::Min)
                .or(derived.map(|extremes| extremes.low))
                .ok_or_else(|| ProviderError::Decode(format!("daily {date}: no min temp")))?;
            let code = day.weather_code.as_str();

            Ok(DailyEntry {
                date,
                icon: normalize_icon(provider, code),
                summary: description(code),
                high,
                low,
                sunrise: rfc3339_to_local(day.sunrise.as_str())?,
                sunset: rfc3339_to_local(day.sunset.as_str())?,
                precip_probability_pct: day
                    .precipitation_probability
                    .value
                    .and_then(precip_from_percent),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    Ok(WeatherSnapshot::new(
        current,
        daily,
        hourly,
        Vec::new(),
        source_url,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REALTIME: &str = r#"{
        "lat": 39.7392,
        "lon": -104.9903,
        "temp": {"value": 24.6, "units": "C"},
        "feels_like": {"value": 25.1, "units": "C"},
        "humidity": {"value": 38.5, "units": "%"},
        "weather_code": {"value": "tstorm"},
        "observation_time": {"value": "2026-06-19T12:00:00.000Z"}
    }"#;

    const HOURLY: &str = r#"[
        {
            "temp": {"value": 24.0, "units": "C"},
            "feels_like": {"value": 24.5, "units": "C"},
            "precipitation_probability": {"value": 55, "units": "%"},
            "weather_code": {"value": "rain_heavy"},
            "observation_time": {"value": "2026-06-19T12:00:00.000Z"}
        },
        {
            "temp": {"value": 27.5, "units": "C"},
            "feels_like": {"value": 28.0, "units": "C"},
            "precipitation_probability": {"value": 5, "units": "%"},
            "weather_code": {"value": "hail_storm"},
            "observation_time": {"value": "2026-06-19T12:20:00.000Z"}
        },
        {
            "temp": {"value": 21.0, "units": "C"},
            "weather_code": {"value": "freezing_rain_light"},
            "observation_time": {"value": "2026-06-19T12:40:00.000Z"}
        }
    ]"#;

    const DAILY: &str = r#"[
        {
            "temp": [
                {"observation_time": "2026-06-19T06:00:00Z", "min": {"value": 14.2, "units": "C"}},
                {"observation_time": "2026-06-19T21:00:00Z", "max": {"value": 29.8, "units": "C"}}
            ],
            "precipitation_probability": {"value": 35, "units": "%"},
            "weather_code": {"value": "tstorm"},
            "sunrise": {"value": "2026-06-19T11:32:00.000Z"},
            "sunset": {"value": "2026-06-20T02:31:00.000Z"},
            "observation_time": {"value": "2026-06-19"}
        },
        {
            "temp": [
                {"observation_time": "2026-06-20T06:00:00Z", "min": {"value": 15.0}},
                {"observation_time": "2026-06-20T21:00:00Z", "min": {"value": 16.5, "units": "C"}, "max": {"value": 31.0, "units": "C"}}
            ],
            "weather_code": {"value": "mostly_clear"},
            "sunrise": {"value": "2026-06-20T11:32:00.000Z"},
            "sunset": {"value": "2026-06-21T02:31:00.000Z"},
            "observation_time": {"value": "2026-06-20"}
        }
    ]"#;

    #[test]
    fn climacell_maps_tstorm_code_to_canonical_icon_and_summary() {
        let snapshot = build_snapshot(REALTIME, HOURLY, DAILY, None).expect("snapshot");

        let current = snapshot.current();
        assert_eq!(current.icon, "tstorms");
        assert_eq!(current.summary, "Thunderstorms");
        assert_eq!(current.humidity_pct, Some(38.5));
        assert_eq!(current.temperature, Temperature::celsius(24.6));
        assert_eq!(current.apparent_temperature, Temperature::celsius(25.1));
    }

    #[test]
    fn climacell_hourly_entries_use_descriptions_and_pass_unknown_codes_through() {
        let snapshot = build_snapshot(REALTIME, HOURLY, DAILY, None).expect("snapshot");
        let hourly = snapshot.hourly();

        assert_eq!(hourly.len(), 3);
        assert_eq!(hourly[0].icon, "rain");
        assert_eq!(hourly[0].summary, "Heavy rain");
        assert_eq!(hourly[0].precip_probability_pct, Some(55));
        assert_eq!(hourly[1].icon, "hail_storm");
        assert_eq!(hourly[1].summary, "hail_storm");
        assert_eq!(hourly[2].icon, "sleet");
        assert_eq!(hourly[2].apparent_temperature, Temperature::celsius(21.0));
        assert_eq!(hourly[2].precip_probability_pct, None);
    }

    #[test]
    fn climacell_daily_reads_min_from_slot_zero_and_max_from_slot_one() {
        let snapshot = build_snapshot(REALTIME, HOURLY, DAILY, None).expect("snapshot");
        let first = &snapshot.daily()[0];

        assert_eq!(first.low, Temperature::celsius(14.2));
        assert_eq!(first.high, Temperature::celsius(29.8));
        assert_eq!(first.precip_probability_pct, Some(35));
        assert_eq!(first.summary, "Thunderstorms");
        assert_eq!(
            first.sunset.timestamp(),
            rfc3339_to_local("2026-06-20T02:31:00Z").expect("ts").timestamp()
        );
    }

    #[test]
    fn climacell_slot_without_unit_marker_falls_back_to_second_slot() {
        let snapshot = build_snapshot(REALTIME, HOURLY, DAILY, None).expect("snapshot");
        let second = &snapshot.daily()[1];

        assert_eq!(second.low, Temperature::celsius(16.5));
        assert_eq!(second.high, Temperature::celsius(31.0));
        assert_eq!(second.icon, "mostlysunny");
        assert_eq!(second.precip_probability_pct, None);
    }

    #[test]
    fn daily_extreme_prefers_marked_first_slot() {
        let slots = vec![
            TempSlot {
                min: Some(Reading {
                    value: Some(50.0),
                    units: Some("F".to_string()),
                }),
                max: None,
            },
            TempSlot {
                min: Some(Reading {
                    value: Some(12.0),
                    units: Some("C".to_string()),
                }),
                max: None,
            },
        ];

        assert_eq!(
            daily_extreme(&slots, Extreme::Min),
            Some(Temperature::fahrenheit(50.0))
        );
        assert_eq!(daily_extreme(&slots, Extreme::Max), None);
        assert_eq!(daily_extreme(&[], Extreme::Min), None);
    }

    #[test]
    fn climacell_derives_missing_extremes_from_hourly_readings() {
        let daily = r#"[{
            "temp": [],
            "weather_code": {"value": "rain"},
            "sunrise": {"value": "2026-06-19T11:32:00Z"},
            "sunset": {"value": "2026-06-20T02:31:00Z"},
            "observation_time": {"value": "DATE"}
        }]"#
        .replace(
            "DATE",
            &rfc3339_to_local("2026-06-19T12:00:00Z")
                .expect("ts")
                .date_naive()
                .to_string(),
        );

        let snapshot = build_snapshot(REALTIME, HOURLY, &daily, None).expect("snapshot");
        let day = &snapshot.daily()[0];
        assert_eq!(day.low, Temperature::celsius(21.0));
        assert_eq!(day.high, Temperature::celsius(27.5));
    }

    #[test]
    fn climacell_reports_current_decode_failure_first() {
        let error = build_snapshot("{", "not json", "[]", None).expect_err("must fail");
        assert!(
            matches!(&error, ProviderError::Decode(message) if message.contains("EOF")),
            "unexpected error: {error:?}"
        );
    }

    #[test]
    fn climacell_request_url_carries_units_fields_and_start() {
        let location = Location {
            name: "Denver, Colorado, United States".to_string(),
            short_name: "Denver".to_string(),
            latitude: 39.7392,
            longitude: -104.9903,
            timezone: None,
        };
        let url = request_url("forecast/daily", DAILY_FIELDS, &location, UnitSystem::Us, "k", true)
            .expect("url");

        assert_eq!(url.path(), "/v3/weather/forecast/daily");
        let query = url.query().expect("query");
        assert!(query.contains("unit_system=us"));
        assert!(query.contains("start_time=now"));
        assert!(query.contains("lat=39.739200"));
    }
}
