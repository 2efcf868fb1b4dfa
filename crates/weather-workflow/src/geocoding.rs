use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::model::Location;
use crate::providers::{self, ProviderError};

const GEOCODE_ENDPOINT: &str = "https://geocoding-api.open-meteo.com/v1/search";
const GEOCODE_CANDIDATES: &str = "5";

/// Free text in, candidate locations out (best match first).
pub trait Geocoder {
    fn resolve(&self, text: &str) -> Result<Vec<Location>, GeocodeError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeocodeError {
    #[error("geocoder unreachable: {0}")]
    Transport(String),
    #[error("geocoder returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("invalid geocoder response: {0}")]
    Decode(String),
    #[error("no location found for '{0}'")]
    NotFound(String),
}

impl From<ProviderError> for GeocodeError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::Transport(message) => GeocodeError::Transport(message),
            ProviderError::Http { status, message } => GeocodeError::Http { status, message },
            ProviderError::Decode(message) => GeocodeError::Decode(message),
        }
    }
}

/// Takes the first candidate, which is what every caller wants today.
pub fn resolve_first<G>(geocoder: &G, text: &str) -> Result<Location, GeocodeError>
where
    G: Geocoder + ?Sized,
{
    let text = text.trim();
    if text.is_empty() {
        return Err(GeocodeError::NotFound(String::new()));
    }

    geocoder
        .resolve(text)?
        .into_iter()
        .next()
        .ok_or_else(|| GeocodeError::NotFound(text.to_string()))
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    admin1: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
}

pub(crate) fn fetch_candidates(client: &Client, text: &str) -> Result<Vec<Location>, GeocodeError> {
    let url = Url::parse_with_params(
        GEOCODE_ENDPOINT,
        &[
            ("name", text),
            ("count", GEOCODE_CANDIDATES),
            ("language", "en"),
            ("format", "json"),
        ],
    )
    .map_err(|error| GeocodeError::Transport(error.to_string()))?;

    let body = providers::get(client, &url, "")?;
    parse_geocode_response(&body)
}

fn parse_geocode_response(body: &str) -> Result<Vec<Location>, GeocodeError> {
    let payload: GeocodeResponse =
        serde_json::from_str(body).map_err(|error| GeocodeError::Decode(error.to_string()))?;

    Ok(payload
        .results
        .into_iter()
        .filter(|result| !result.name.trim().is_empty())
        .map(|result| {
            let short_name = result.name.trim().to_string();
            let name = [Some(short_name.as_str()), result.admin1.as_deref(), result.country.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .fold(Vec::<&str>::new(), |mut parts, part| {
                    if !parts.contains(&part) {
                        parts.push(part);
                    }
                    parts
                })
                .join(", ");

            Location {
                name,
                short_name,
                latitude: result.latitude,
                longitude: result.longitude,
                timezone: result
                    .timezone
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty()),
            }
        })
        .collect())
}
