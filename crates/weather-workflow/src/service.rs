use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::RuntimeConfig;
use crate::error::ForecastError;
use crate::geocoding::{Geocoder, resolve_first};
use crate::model::{Location, ProviderKind, WeatherSnapshot};
use crate::providers::ProviderApi;
use crate::settings::{SettingKey, Settings, icon_sets};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Live,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    pub location: Location,
    pub provider: ProviderKind,
    pub freshness: Freshness,
    pub fetched_at: DateTime<Utc>,
    pub snapshot: WeatherSnapshot,
}

/// Resolves `query` (blank means the configured default location) and returns
/// its forecast. Only a location named like the default is ever served from or
/// written to the cache; any other location always hits the provider.
pub fn get_weather<G, P, N>(
    settings: &Settings,
    cache: &mut CacheStore,
    geocoder: &G,
    providers: &P,
    now_fn: N,
    query: &str,
) -> Result<WeatherReport, ForecastError>
where
    G: Geocoder + ?Sized,
    P: ProviderApi + ?Sized,
    N: Fn() -> DateTime<Utc>,
{
    let active = settings.require_complete()?;
    let now = now_fn();
    let query = query.trim();

    let location = if query.is_empty() {
        active.location.clone()
    } else {
        resolve_first(geocoder, query)?
    };
    let is_default = location.name == active.location.name;

    if is_default {
        let local_now = now.with_timezone(&Local);
        if let Some(snapshot) = cache.valid_snapshot(active.provider, &location.name, &local_now) {
            debug!(location = %location.name, "serving forecast from cache");
            return Ok(WeatherReport {
                location,
                provider: active.provider,
                freshness: Freshness::Cache,
                fetched_at: cache.cache().fetched_at,
                snapshot: snapshot.clone(),
            });
        }
    }

    debug!(
        provider = active.provider.as_str(),
        location = %location.name,
        "fetching forecast"
    );
    let snapshot =
        providers.fetch_forecast(active.provider, &location, active.units, active.api_key)?;

    if is_default {
        if let Err(error) = cache.store(snapshot.clone(), active.provider, &location.name, now) {
            warn!(%error, "forecast cache not persisted");
        }
    } else {
        info!(location = %location.name, "ad-hoc location; forecast not cached");
    }

    Ok(WeatherReport {
        location,
        provider: active.provider,
        freshness: Freshness::Live,
        fetched_at: now,
        snapshot,
    })
}

/// Forces the next default-location lookup to refetch.
pub fn refresh(cache: &mut CacheStore) -> Result<(), ForecastError> {
    cache.invalidate()?;
    Ok(())
}

/// Applies one `config set` change, persists settings, then invalidates the
/// forecast cache. Cache invalidation failures are logged, not returned.
pub fn update_setting<G>(
    config: &RuntimeConfig,
    settings: &mut Settings,
    cache: &mut CacheStore,
    geocoder: &G,
    key: SettingKey,
    value: &str,
    provider_override: Option<ProviderKind>,
) -> Result<(), ForecastError>
where
    G: Geocoder + ?Sized,
{
    match key {
        SettingKey::Location => {
            let location = resolve_first(geocoder, value)?;
            info!(location = %location.name, "default location updated");
            settings.set_location(location);
        }
        SettingKey::Icons => settings.set_icons(value, &icon_sets(&config.icons_dir))?,
        _ => settings.apply(key, value, provider_override)?,
    }

    settings.save(&config.settings_file())?;

    if let Err(error) = cache.invalidate() {
        warn!(%error, "forecast cache not invalidated on disk");
    }
    Ok(())
}
