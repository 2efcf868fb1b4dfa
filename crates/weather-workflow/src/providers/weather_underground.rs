use reqwest::blocking::Client;
use serde::Deserialize;

use crate::model::{
    Alert, CurrentConditions, DailyEntry, HourlyEntry, Location, ProviderKind, Temperature,
    UnitSystem, WeatherSnapshot,
};
use crate::normalize::{daily_extremes_from_hourly, normalize_icon, precip_from_percent};

use super::{ProviderError, coordinates, decode, endpoint, epoch_to_local, get};

const API_ROOT: &str = "https://api.wunderground.com/api";
const FEATURES: &str = "conditions/alerts/hourly/astronomy10day/forecast10day";
const ALERT_PAGE_ROOT: &str = "https://www.wunderground.com/US";

/// Numbers arrive as JSON numbers or as strings that may be empty or a
/// sentinel such as "NA" / "-9999".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl Loose {
    fn value(&self) -> Option<f64> {
        let value = match self {
            Loose::Number(value) => *value,
            Loose::Text(text) => text.trim().trim_end_matches('%').parse::<f64>().ok()?,
            Loose::Missing => return None,
        };
        (value.is_finite() && value > -999.0).then_some(value)
    }
}

#[derive(Debug, Deserialize)]
struct WundergroundResponse {
    current_observation: Observation,
    #[serde(default)]
    forecast: Option<Forecast>,
    #[serde(default)]
    hourly_forecast: Vec<HourData>,
    #[serde(default)]
    alerts: Vec<AlertData>,
    #[serde(default)]
    query_zone: Option<String>,
    #[serde(default)]
    astronomy10day: Vec<AstronomyDay>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    #[serde(default)]
    weather: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    temp_c: Loose,
    #[serde(default)]
    temp_f: Loose,
    #[serde(default)]
    feelslike_c: Loose,
    #[serde(default)]
    feelslike_f: Loose,
    #[serde(default)]
    relative_humidity: Loose,
    local_epoch: Loose,
    #[serde(default)]
    display_location: DisplayLocation,
    #[serde(default)]
    forecast_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DisplayLocation {
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    simpleforecast: SimpleForecast,
}

#[derive(Debug, Deserialize)]
struct SimpleForecast {
    #[serde(default)]
    forecastday: Vec<DayData>,
}

#[derive(Debug, Deserialize)]
struct Epoch {
    epoch: Loose,
}

#[derive(Debug, Default, Deserialize)]
struct DualTemp {
    #[serde(default)]
    celsius: Loose,
    #[serde(default)]
    fahrenheit: Loose,
}

#[derive(Debug, Deserialize)]
struct DayData {
    date: Epoch,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    conditions: String,
    #[serde(default)]
    high: DualTemp,
    #[serde(default)]
    low: DualTemp,
    #[serde(default)]
    pop: Loose,
}

#[derive(Debug, Default, Deserialize)]
struct EnglishMetric {
    #[serde(default)]
    english: Loose,
    #[serde(default)]
    metric: Loose,
}

#[derive(Debug, Deserialize)]
struct HourData {
    #[serde(rename = "FCTTIME")]
    fcttime: Epoch,
    #[serde(default)]
    condition: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    pop: Loose,
    #[serde(default)]
    temp: EnglishMetric,
    #[serde(default)]
    feelslike: EnglishMetric,
}

#[derive(Debug, Deserialize)]
struct AlertData {
    description: String,
    expires_epoch: Loose,
}

#[derive(Debug, Deserialize)]
struct AstronomyDay {
    sunrise: AstronomyEvent,
    sunset: AstronomyEvent,
}

#[derive(Debug, Deserialize)]
struct AstronomyEvent {
    date: Epoch,
}

pub fn fetch(
    client: &Client,
    location: &Location,
    units: UnitSystem,
    api_key: &str,
) -> Result<WeatherSnapshot, ProviderError> {
    let (lat, lon) = coordinates(location);
    let url = endpoint(&format!(
        "{API_ROOT}/{}/{FEATURES}/q/{lat},{lon}.json",
        api_key.trim()
    ))?;

    let body = get(client, &url, api_key)?;
    parse_forecast(&body, units)
}

fn pick(units: UnitSystem, celsius: &Loose, fahrenheit: &Loose) -> Option<Temperature> {
    match units {
        UnitSystem::Metric => celsius.value().map(Temperature::celsius),
        UnitSystem::Us => fahrenheit.value().map(Temperature::fahrenheit),
    }
}

fn epoch(value: &Loose, context: &str) -> Result<i64, ProviderError> {
    value
        .value()
        .map(|secs| secs as i64)
        .ok_or_else(|| ProviderError::Decode(format!("{context}: missing epoch")))
}

fn alert_url(state: &str, query_zone: Option<&str>) -> Option<String> {
    let state = state.trim();
    let zone = query_zone.map(str::trim).filter(|zone| !zone.is_empty())?;
    (!state.is_empty()).then(|| format!("{ALERT_PAGE_ROOT}/{state}/{zone}.html"))
}

/// Readings are taken in whichever scale matches the unit preference.
fn parse_forecast(body: &str, units: UnitSystem) -> Result<WeatherSnapshot, ProviderError> {
    let payload: WundergroundResponse = decode(body)?;
    let provider = ProviderKind::WeatherUnderground;
    let observation = payload.current_observation;

    let temperature = pick(units, &observation.temp_c, &observation.temp_f)
        .ok_or_else(|| ProviderError::Decode("current_observation: missing temperature".into()))?;
    let current = CurrentConditions {
        summary: observation.weather,
        icon: normalize_icon(provider, &observation.icon),
        humidity_pct: observation
            .relative_humidity
            .value()
            .map(|value| value.clamp(0.0, 100.0)),
        temperature,
        apparent_temperature: pick(units, &observation.feelslike_c, &observation.feelslike_f)
            .unwrap_or(temperature),
        observed_at: epoch_to_local(epoch(&observation.local_epoch, "current_observation")?)?,
    };

    let hourly = payload
        .hourly_forecast
        .into_iter()
        .filter_map(|hour| {
            let temperature = pick(units, &hour.temp.metric, &hour.temp.english)?;
            Some((hour, temperature))
        })
        .map(|(hour, temperature)| {
            Ok(HourlyEntry {
                time: epoch_to_local(epoch(&hour.fcttime.epoch, "hourly_forecast")?)?,
                icon: normalize_icon(provider, &hour.icon),
                summary: hour.condition,
                temperature,
                apparent_temperature: pick(units, &hour.feelslike.metric, &hour.feelslike.english)
                    .unwrap_or(temperature),
                precip_probability_pct: hour.pop.value().and_then(precip_from_percent),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let hourly_extremes = daily_extremes_from_hourly(&hourly);
    let days = payload
        .forecast
        .map(|forecast| forecast.simpleforecast.forecastday)
        .unwrap_or_default();

    let daily = days
        .into_iter()
        .enumerate()
        .map(|(index, day)| {
            let date = epoch_to_local(epoch(&day.date.epoch, "forecastday")?)?.date_naive();
            let astronomy = payload.astronomy10day.get(index).ok_or_else(|| {
                ProviderError::Decode(format!("astronomy10day: no entry for day {index}"))
            })?;
            let derived = hourly_extremes.get(&date);
            let high = pick(units, &day.high.celsius, &day.high.fahrenheit)
                .or(derived.map(|extremes| extremes.high))
                .ok_or_else(|| ProviderError::Decode(format!("forecastday {date}: no high")))?;
            let low = pick(units, &day.low.celsius, &day.low.fahrenheit)
                .or(derived.map(|extremes| extremes.low))
                .ok_or_else(|| ProviderError::Decode(format!("forecastday {date}: no low")))?;

            Ok(DailyEntry {
                date,
                icon: normalize_icon(provider, &day.icon),
                summary: day.conditions,
                high,
                low,
                sunrise: epoch_to_local(epoch(&astronomy.sunrise.date.epoch, "sunrise")?)?,
                sunset: epoch_to_local(epoch(&astronomy.sunset.date.epoch, "sunset")?)?,
                precip_probability_pct: day.pop.value().and_then(precip_from_percent),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let url = alert_url(
        &observation.display_location.state,
        payload.query_zone.as_deref(),
    );
    let alerts = payload
        .alerts
        .into_iter()
        .map(|alert| {
            Ok(Alert {
                description: alert.description,
                expires_at: epoch_to_local(epoch(&alert.expires_epoch, "alerts")?)?,
                url: url.clone(),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let source_url = observation
        .forecast_url
        .filter(|value| !value.trim().is_empty());

    Ok(WeatherSnapshot::new(
        current, daily, hourly, alerts, source_url,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "response": {"version": "0.1"},
        "query_zone": "031",
        "current_observation": {
            "display_location": {"full": "Raleigh, NC", "city": "Raleigh", "state": "NC"},
            "local_epoch": "1781870400",
            "weather": "Mostly Cloudy",
            "temp_f": 84.2,
            "temp_c": 29.0,
            "relative_humidity": "65%",
            "feelslike_f": "88",
            "feelslike_c": "31",
            "icon": "mostlycloudy",
            "forecast_url": "https://www.wunderground.com/US/NC/Raleigh.html"
        },
        "alerts": [
            {"description": "Flood Watch", "expires_epoch": "1781913600"}
        ],
        "hourly_forecast": [
            {"FCTTIME": {"epoch": "1781870400"}, "condition": "Chance of a Thunderstorm", "icon": "chancetstorms", "pop": "40", "temp": {"english": "84", "metric": "29"}, "feelslike": {"english": "88", "metric": "31"}},
            {"FCTTIME": {"epoch": "1781871600"}, "condition": "Thunderstorm", "icon": "tstorms", "pop": "70", "temp": {"english": "80", "metric": "27"}, "feelslike": {"english": "", "metric": ""}},
            {"FCTTIME": {"epoch": "1781872800"}, "condition": "Rain", "icon": "nt_rain", "pop": "", "temp": {"english": "78", "metric": "26"}, "feelslike": {"english": "78", "metric": "26"}}
        ],
        "astronomy10day": [
            {"sunrise": {"date": {"epoch": "1781845200"}}, "sunset": {"date": {"epoch": "1781895600"}}}
        ],
        "forecast": {
            "simpleforecast": {
                "forecastday": [
                    {
                        "date": {"epoch": "1781870400"},
                        "conditions": "Thunderstorm",
                        "icon": "tstorms",
                        "high": {"fahrenheit": "", "celsius": ""},
                        "low": {"fahrenheit": "72", "celsius": "22"},
                        "pop": 70
                    }
                ]
            }
        }
    }"#;

    #[test]
    fn wunderground_maps_sample_into_canonical_snapshot() {
        let snapshot = parse_forecast(SAMPLE, UnitSystem::Us).expect("parse");

        let current = snapshot.current();
        assert_eq!(current.icon, "mostlycloudy");
        assert_eq!(current.humidity_pct, Some(65.0));
        assert_eq!(current.temperature, Temperature::fahrenheit(84.2));
        assert_eq!(current.apparent_temperature, Temperature::fahrenheit(88.0));
        assert_eq!(current.observed_at.timestamp(), 1_781_870_400);

        let hourly = snapshot.hourly();
        assert_eq!(hourly.len(), 3);
        assert_eq!(hourly[0].precip_probability_pct, Some(40));
        assert_eq!(hourly[1].apparent_temperature, Temperature::fahrenheit(80.0));
        assert_eq!(hourly[2].icon, "rain");
        assert_eq!(hourly[2].precip_probability_pct, None);

        let day = &snapshot.daily()[0];
        assert_eq!(day.icon, "tstorms");
        assert_eq!(day.precip_probability_pct, Some(70));
        assert_eq!(day.low, Temperature::fahrenheit(72.0));
        assert_eq!(day.sunrise.timestamp(), 1_781_845_200);
        assert_eq!(day.sunset.timestamp(), 1_781_895_600);

        let alert = &snapshot.alerts()[0];
        assert_eq!(alert.description, "Flood Watch");
        assert_eq!(
            alert.url.as_deref(),
            Some("https://www.wunderground.com/US/NC/031.html")
        );
        assert_eq!(
            snapshot.source_url(),
            Some("https://www.wunderground.com/US/NC/Raleigh.html")
        );
    }

    #[test]
    fn wunderground_derives_missing_high_from_hourly_readings() {
        let snapshot = parse_forecast(SAMPLE, UnitSystem::Us).expect("parse");
        assert_eq!(snapshot.daily()[0].high, Temperature::fahrenheit(84.0));
    }

    #[test]
    fn wunderground_metric_preference_reads_celsius_fields() {
        let snapshot = parse_forecast(SAMPLE, UnitSystem::Metric).expect("parse");

        assert_eq!(snapshot.current().temperature, Temperature::celsius(29.0));
        assert_eq!(snapshot.daily()[0].low, Temperature::celsius(22.0));
        assert_eq!(snapshot.daily()[0].high, Temperature::celsius(29.0));
    }

    #[test]
    fn wunderground_requires_astronomy_for_each_day() {
        let body = SAMPLE.replace(
            r#"{"sunrise": {"date": {"epoch": "1781845200"}}, "sunset": {"date": {"epoch": "1781895600"}}}"#,
            "",
        );
        let error = parse_forecast(&body, UnitSystem::Us).expect_err("must fail");
        assert!(matches!(error, ProviderError::Decode(message) if message.contains("astronomy10day")));
    }

    #[test]
    fn wunderground_unreported_humidity_stays_unknown() {
        let body = SAMPLE.replace(r#""relative_humidity": "65%""#, r#""relative_humidity": "N/A""#);
        let snapshot = parse_forecast(&body, UnitSystem::Us).expect("parse");
        assert_eq!(snapshot.current().humidity_pct, None);
    }

    #[test]
    fn loose_numbers_tolerate_strings_and_sentinels() {
        assert_eq!(Loose::Text("65%".to_string()).value(), Some(65.0));
        assert_eq!(Loose::Text(" 12.5 ".to_string()).value(), Some(12.5));
        assert_eq!(Loose::Text(String::new()).value(), None);
        assert_eq!(Loose::Text("NA".to_string()).value(), None);
        assert_eq!(Loose::Number(-9999.0).value(), None);
        assert_eq!(Loose::Missing.value(), None);
    }

    #[test]
    fn alert_url_needs_state_and_zone() {
        assert_eq!(alert_url("", Some("031")), None);
        assert_eq!(alert_url("NC", None), None);
        assert_eq!(
            alert_url("NC", Some("031")).as_deref(),
            Some("https://www.wunderground.com/US/NC/031.html")
        );
    }
}
