use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::FORECAST_CACHE_TTL_SECS;
use crate::model::{ProviderKind, WeatherSnapshot};
use crate::settings::write_atomic;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheIoError {
    #[error("failed to read cache: {0}")]
    Read(String),
    #[error("corrupt cache file: {0}")]
    Parse(String),
    #[error("failed to write cache: {0}")]
    Write(String),
}

/// The last default-location forecast plus what it was fetched for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastCache {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<WeatherSnapshot>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(default)]
    pub location_name: String,
}

impl Default for ForecastCache {
    fn default() -> Self {
        Self {
            snapshot: None,
            fetched_at: DateTime::<Utc>::UNIX_EPOCH,
            provider: None,
            location_name: String::new(),
        }
    }
}

impl ForecastCache {
    pub fn is_valid<Tz: TimeZone>(
        &self,
        provider: ProviderKind,
        location_name: &str,
        now: &DateTime<Tz>,
    ) -> bool {
        self.is_valid_within(provider, location_name, now, FORECAST_CACHE_TTL_SECS)
    }

    /// Valid iff younger than `ttl_secs`, fetched on the same calendar day
    /// (in `now`'s timezone), by the same provider, for the same location name.
    pub fn is_valid_within<Tz: TimeZone>(
        &self,
        provider: ProviderKind,
        location_name: &str,
        now: &DateTime<Tz>,
        ttl_secs: u64,
    ) -> bool {
        if self.snapshot.is_none() {
            return false;
        }

        let elapsed = now.timestamp() - self.fetched_at.timestamp();
        let fresh = elapsed >= 0 && elapsed.unsigned_abs() < ttl_secs;
        let same_day =
            self.fetched_at.with_timezone(&now.timezone()).date_naive() == now.date_naive();

        fresh
            && same_day
            && self.provider == Some(provider)
            && self.location_name == location_name
    }

    pub fn store(
        &mut self,
        snapshot: WeatherSnapshot,
        provider: ProviderKind,
        location_name: &str,
        now: DateTime<Utc>,
    ) {
        *self = Self {
            snapshot: Some(snapshot),
            fetched_at: now,
            provider: Some(provider),
            location_name: location_name.to_string(),
        };
    }

    /// Next validity check always reports stale.
    pub fn invalidate(&mut self) {
        self.fetched_at = DateTime::<Utc>::UNIX_EPOCH;
    }
}

/// Owns the in-memory cache and, optionally, the file it persists to.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: Option<PathBuf>,
    cache: ForecastCache,
    ttl_secs: u64,
}

impl CacheStore {
    pub fn in_memory(ttl_secs: u64) -> Self {
        Self {
            path: None,
            cache: ForecastCache::default(),
            ttl_secs,
        }
    }

    /// Unreadable or corrupt files start an empty cache.
    pub fn load(path: impl Into<PathBuf>, ttl_secs: u64) -> Self {
        let path = path.into();
        let cache = match read_cache(&path) {
            Ok(cache) => cache.unwrap_or_default(),
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring forecast cache");
                ForecastCache::default()
            }
        };

        Self {
            path: Some(path),
            cache,
            ttl_secs,
        }
    }

    pub fn cache(&self) -> &ForecastCache {
        &self.cache
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn valid_snapshot<Tz: TimeZone>(
        &self,
        provider: ProviderKind,
        location_name: &str,
        now: &DateTime<Tz>,
    ) -> Option<&WeatherSnapshot> {
        let valid = self
            .cache
            .is_valid_within(provider, location_name, now, self.ttl_secs);
        debug!(valid, provider = provider.as_str(), location = location_name, "cache check");

        if valid {
            self.cache.snapshot.as_ref()
        } else {
            None
        }
    }

    /// The in-memory cache is replaced even when persisting fails.
    pub fn store(
        &mut self,
        snapshot: WeatherSnapshot,
        provider: ProviderKind,
        location_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CacheIoError> {
        self.cache.store(snapshot, provider, location_name, now);
        info!(provider = provider.as_str(), location = location_name, "forecast cached");
        self.persist()
    }

    pub fn invalidate(&mut self) -> Result<(), CacheIoError> {
        self.cache.invalidate();
        info!("forecast cache invalidated");
        self.persist()
    }

    fn persist(&self) -> Result<(), CacheIoError> {
        match &self.path {
            Some(path) => write_cache(path, &self.cache),
            None => Ok(()),
        }
    }
}

pub fn read_cache(path: &Path) -> Result<Option<ForecastCache>, CacheIoError> {
    let payload = match fs::read_to_string(path) {
        Ok(payload) => payload,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(CacheIoError::Read(error.to_string())),
    };

    serde_json::from_str(&payload)
        .map(Some)
        .map_err(|error| CacheIoError::Parse(error.to_string()))
}

pub fn write_cache(path: &Path, cache: &ForecastCache) -> Result<(), CacheIoError> {
    let payload =
        serde_json::to_vec(cache).map_err(|error| CacheIoError::Write(error.to_string()))?;
    write_atomic(path, &payload).map_err(|error| CacheIoError::Write(error.to_string()))
}
