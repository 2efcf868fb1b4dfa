use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{PROVIDER_TIMEOUT_SECS, USER_AGENT};
use crate::geocoding::{self, GeocodeError, Geocoder};
use crate::model::{Location, ProviderKind, UnitSystem, WeatherSnapshot};

pub mod climacell;
pub mod dark_sky;
pub mod forecast_io;
pub mod open_weather;
pub mod weather_underground;

/// One capability shared by every adapter: fetch and normalize a forecast.
pub trait ProviderApi {
    fn fetch_forecast(
        &self,
        provider: ProviderKind,
        location: &Location,
        units: UnitSystem,
        api_key: &str,
    ) -> Result<WeatherSnapshot, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpProviders {
    client: Client,
}

impl HttpProviders {
    pub fn new() -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        Ok(Self { client })
    }
}

impl ProviderApi for HttpProviders {
    fn fetch_forecast(
        &self,
        provider: ProviderKind,
        location: &Location,
        units: UnitSystem,
        api_key: &str,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let result = match provider {
            ProviderKind::DarkSky => dark_sky::fetch(&self.client, location, units, api_key),
            ProviderKind::ForecastIo => forecast_io::fetch(&self.client, location, units, api_key),
            ProviderKind::WeatherUnderground => {
                weather_underground::fetch(&self.client, location, units, api_key)
            }
            ProviderKind::OpenWeather => open_weather::fetch(&self.client, location, units, api_key),
            ProviderKind::ClimaCell => climacell::fetch(&self.client, location, units, api_key),
        };

        result.map_err(|error| error.with_provider(provider.as_str()))
    }
}

impl Geocoder for HttpProviders {
    fn resolve(&self, text: &str) -> Result<Vec<Location>, GeocodeError> {
        geocoding::fetch_candidates(&self.client, text)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn with_provider(self, provider: &str) -> Self {
        match self {
            ProviderError::Transport(message) => {
                ProviderError::Transport(format!("{provider}: {message}"))
            }
            ProviderError::Http { status, message } => ProviderError::Http {
                status,
                message: format!("{provider}: {message}"),
            },
            ProviderError::Decode(message) => ProviderError::Decode(format!("{provider}: {message}")),
        }
    }
}

/// Issues one GET. `secret` is scrubbed from the logged URL.
pub(crate) fn get(client: &Client, url: &Url, secret: &str) -> Result<String, ProviderError> {
    debug!(url = %redact_secret(url.as_str(), secret), "provider request");

    let response = client
        .get(url.clone())
        .send()
        .map_err(|error| ProviderError::Transport(redact_secret(&error.to_string(), secret)))?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|error| ProviderError::Transport(redact_secret(&error.to_string(), secret)))?;

    if status.is_success() {
        return Ok(body);
    }

    let status_line = match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    };
    let message = extract_error_message(&body).unwrap_or(status_line);

    Err(ProviderError::Http {
        status: status.as_u16(),
        message: redact_secret(&message, secret),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|error| ProviderError::Decode(error.to_string()))
}

pub(crate) fn endpoint(raw: &str) -> Result<Url, ProviderError> {
    Url::parse(raw).map_err(|error| ProviderError::Transport(error.to_string()))
}

pub(crate) fn epoch_to_local(secs: i64) -> Result<DateTime<Local>, ProviderError> {
    Local
        .timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ProviderError::Decode(format!("timestamp out of range: {secs}")))
}

pub(crate) fn rfc3339_to_local(raw: &str) -> Result<DateTime<Local>, ProviderError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Local))
        .map_err(|error| ProviderError::Decode(format!("invalid timestamp '{raw}': {error}")))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, ProviderError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|error| ProviderError::Decode(format!("invalid date '{raw}': {error}")))
}

pub(crate) fn coordinates(location: &Location) -> (String, String) {
    (
        format!("{:.6}", location.latitude),
        format!("{:.6}", location.longitude),
    )
}

fn redact_secret(input: &str, secret: &str) -> String {
    let secret = secret.trim();
    if secret.is_empty() {
        return input.to_string();
    }
    input.replace(secret, "[REDACTED]")
}

fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let json = serde_json::from_str::<Value>(trimmed).ok()?;
    let nested = json.get("response").and_then(|response| response.get("error"));
    [Some(&json), nested]
        .into_iter()
        .flatten()
        .flat_map(|scope| ["message", "error", "description", "reason", "detail"].map(|key| scope.get(key)))
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
}
