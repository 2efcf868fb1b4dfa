use thiserror::Error;

use crate::cache::CacheIoError;
use crate::geocoding::GeocodeError;
use crate::providers::ProviderError;
use crate::settings::SettingsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    User,
    Runtime,
}

impl ErrorKind {
    /// Process exit status for a failure of this kind.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::User => 2,
            ErrorKind::Runtime => 1,
        }
    }
}

/// Everything `get_weather` and the settings writer can fail with.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Configuration(#[from] SettingsError),
    #[error("geocoding failed: {0}")]
    Geocoding(#[from] GeocodeError),
    #[error("forecast fetch failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("cache i/o failed: {0}")]
    CacheIo(#[from] CacheIoError),
}

impl ForecastError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::Configuration(error) if error.is_storage() => ErrorKind::Runtime,
            ForecastError::Configuration(_) => ErrorKind::User,
            ForecastError::Geocoding(GeocodeError::NotFound(_)) => ErrorKind::User,
            ForecastError::Geocoding(_) | ForecastError::Provider(_) | ForecastError::CacheIo(_) => {
                ErrorKind::Runtime
            }
        }
    }
}
