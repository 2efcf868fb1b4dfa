//! Legacy Forecast.io host. Same payload as Dark Sky, but the endpoint takes
//! no unit query, so the response units always come back from `flags.units`.

use reqwest::blocking::Client;

use crate::model::{Location, ProviderKind, UnitSystem, WeatherSnapshot};

use super::{ProviderError, coordinates, dark_sky, endpoint, get};

const FORECAST_ENDPOINT: &str = "https://api.forecast.io/forecast";

pub fn fetch(
    client: &Client,
    location: &Location,
    _units: UnitSystem,
    api_key: &str,
) -> Result<WeatherSnapshot, ProviderError> {
    let (lat, lon) = coordinates(location);
    let url = endpoint(&format!("{FORECAST_ENDPOINT}/{}/{lat},{lon}", api_key.trim()))?;

    let body = get(client, &url, api_key)?;
    parse_forecast(&body)
}

/// The host's default unit set is "us", which is what an absent flag means.
fn parse_forecast(body: &str) -> Result<WeatherSnapshot, ProviderError> {
    dark_sky::parse_forecast(ProviderKind::ForecastIo, body, UnitSystem::Us, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Temperature;

    #[test]
    fn forecast_io_reads_units_from_flags() {
        let body = r#"{
            "currently": {"time": 1781870400, "summary": "Drizzle", "icon": "rain", "temperature": 14.5, "humidity": 0.9},
            "flags": {"units": "si"}
        }"#;

        let snapshot = parse_forecast(body).expect("parse");
        assert_eq!(snapshot.current().temperature, Temperature::celsius(14.5));
        assert_eq!(snapshot.current().icon, "rain");
        assert_eq!(snapshot.source_url(), None);
    }

    #[test]
    fn forecast_io_defaults_to_fahrenheit() {
        let body = r#"{
            "currently": {"time": 1781870400, "icon": "clear-night", "temperature": 58.0},
            "hourly": {"data": [{"time": 1781874000, "icon": "wind", "temperature": 57.0}]}
        }"#;

        let snapshot = parse_forecast(body).expect("parse");
        assert_eq!(snapshot.current().temperature, Temperature::fahrenheit(58.0));
        assert_eq!(snapshot.current().icon, "clear");
        assert_eq!(snapshot.hourly()[0].icon, "hazy");
        assert_eq!(snapshot.hourly()[0].precip_probability_pct, None);
    }
}
