//! Turns a [`WeatherReport`] into launcher rows. Text output is derived from
//! the same rows so both surfaces stay in sync.

use std::path::{Path, PathBuf};

use chrono::format::{Item as FormatItem, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};

use crate::config::RuntimeConfig;
use crate::feedback::{Item, ItemIcon, ItemModifier};
use crate::model::{DailyEntry, HourlyEntry, UnitSystem};
use crate::normalize::{NIGHT_PREFIX, night_variant};
use crate::service::{Freshness, WeatherReport};
use crate::settings::{DATE_FORMATS, Settings, TIME_FORMATS};

const ALERT_ICON: &str = "alert.png";
const SUBTITLE_SEPARATOR: &str = "    ";

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub icons_dir: PathBuf,
    pub icon_set: String,
    pub units: UnitSystem,
    pub date_format: String,
    pub time_format: String,
}

impl RenderOptions {
    pub fn new(config: &RuntimeConfig, settings: &Settings) -> Self {
        Self {
            icons_dir: config.icons_dir.clone(),
            icon_set: settings.icons.clone(),
            units: settings.units,
            date_format: settings.date_format.clone(),
            time_format: settings.time_format.clone(),
        }
    }

    fn icon(&self, id: &str) -> ItemIcon {
        ItemIcon::new(icon_path(&self.icons_dir, &self.icon_set, id).display().to_string())
    }

    fn time<Tz>(&self, at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        format_time(at, &self.time_format, TIME_FORMATS[0])
    }

    fn date<Tz>(&self, at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        format_time(at, &self.date_format, DATE_FORMATS[0])
    }

    fn degrees(&self, value: i64) -> String {
        format!("{value}{}", self.units.degree_label())
    }
}

/// `<icons_dir>/<set>/<id>.png`; night icons without their own asset use the day one.
pub fn icon_path(icons_dir: &Path, icon_set: &str, id: &str) -> PathBuf {
    let set_dir = icons_dir.join(icon_set);
    let path = set_dir.join(format!("{id}.png"));
    match id.strip_prefix(NIGHT_PREFIX) {
        Some(day_id) if !path.exists() => set_dir.join(format!("{day_id}.png")),
        _ => path,
    }
}

/// Formats with `pattern`, or with `fallback` when `pattern` is not valid strftime.
pub fn format_time<Tz>(at: &DateTime<Tz>, pattern: &str, fallback: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let valid = !StrftimeItems::new(pattern).any(|item| matches!(item, FormatItem::Error));
    let pattern = if valid { pattern } else { fallback };
    at.format(pattern).to_string()
}

fn heading(report: &WeatherReport) -> Item {
    let mut subtitle = format!("Forecast by {}", report.provider);
    if report.freshness == Freshness::Cache {
        subtitle.push_str(" (cached)");
    }

    Item::new(format!("Weather for {}", report.location.name))
        .with_subtitle(subtitle)
        .with_valid(false)
}

pub fn daily_items(
    report: &WeatherReport,
    options: &RenderOptions,
    now: &DateTime<Local>,
) -> Vec<Item> {
    let snapshot = &report.snapshot;
    let mut items = Vec::with_capacity(snapshot.daily().len() + snapshot.alerts().len() + 2);

    let mut title = heading(report);
    if let Some(url) = snapshot.source_url() {
        title = title.with_mod(
            "cmd",
            ItemModifier::new()
                .with_subtitle("Open this forecast in a browser")
                .with_arg(url)
                .with_valid(true),
        );
    }
    items.push(title);

    let today = options.date(now);
    for alert in snapshot.alerts().iter().filter(|alert| alert.expires_at > *now) {
        let mut subtitle = format!("Until {}", options.time(&alert.expires_at));
        let expires_on = options.date(&alert.expires_at);
        if expires_on != today {
            subtitle.push_str(&format!(" on {expires_on}"));
        }

        let mut item = Item::new(&alert.description)
            .with_subtitle(subtitle)
            .with_icon(ItemIcon::new(ALERT_ICON));
        if let Some(url) = &alert.url {
            item = item.with_arg(url);
        }
        items.push(item);
    }

    let current = snapshot.current();
    let current_icon = if snapshot.is_at_night(&current.observed_at) {
        night_variant(&current.icon)
    } else {
        current.icon.clone()
    };
    items.push(
        Item::new(format!("Currently: {}", current.summary))
            .with_subtitle(format!(
                "{} ({})",
                options.degrees(current.temperature.rounded(options.units)),
                options.degrees(current.apparent_temperature.rounded(options.units)),
            ))
            .with_icon(options.icon(&current_icon))
            .with_arg(current.observed_at.to_rfc3339()),
    );

    let at_night = snapshot.is_at_night(now);
    for entry in snapshot.daily() {
        let mut item = day_item(entry, options, now, at_night);
        if snapshot.has_hourly_for(entry.date) {
            item = item.with_arg(entry.sunrise.to_rfc3339());
        }
        items.push(item);
    }

    items
}

fn day_item(
    entry: &DailyEntry,
    options: &RenderOptions,
    now: &DateTime<Local>,
    at_night: bool,
) -> Item {
    let mut conditions = entry.summary.clone();
    let mut icon = entry.icon.clone();

    let label = if entry.date == now.date_naive() {
        if at_night {
            icon = night_variant(&icon);
            conditions = conditions.replace(" day", " night");
            "Tonight".to_string()
        } else {
            "Today".to_string()
        }
    } else {
        entry.date.format("%A").to_string()
    };

    let mut parts = vec![
        format!("↓ {}", options.degrees(entry.low.rounded(options.units))),
        format!("↑ {}", options.degrees(entry.high.rounded(options.units))),
    ];
    if let Some(precip) = entry.precip_probability_pct {
        parts.push(format!("☂ {precip}%"));
    }
    parts.push(format!("☼ {}", options.time(&entry.sunrise)));
    parts.push(format!("☾ {}", options.time(&entry.sunset)));

    Item::new(format!("{label}: {conditions}"))
        .with_subtitle(parts.join(SUBTITLE_SEPARATOR))
        .with_icon(options.icon(&icon))
}

/// Every hourly entry at or after `start`; without a start, all of them.
pub fn hourly_items(
    report: &WeatherReport,
    options: &RenderOptions,
    start: Option<&DateTime<Local>>,
) -> Vec<Item> {
    let snapshot = &report.snapshot;
    let mut items = vec![heading(report)];

    items.extend(
        snapshot
            .hourly()
            .iter()
            .filter(|entry| start.is_none_or(|start| entry.time >= *start))
            .map(|entry| {
                let icon = if snapshot.is_at_night(&entry.time) {
                    night_variant(&entry.icon)
                } else {
                    entry.icon.clone()
                };
                hour_item(entry, options, &icon)
            }),
    );

    items
}

fn hour_item(entry: &HourlyEntry, options: &RenderOptions, icon: &str) -> Item {
    let when = format!(
        "{} {}",
        entry.time.format("%a"),
        options.time(&entry.time)
    );
    let temperature = options.degrees(entry.temperature.rounded(options.units));
    let subtitle = match entry.precip_probability_pct {
        Some(precip) => format!("{temperature}, {precip}%"),
        None => temperature,
    };

    Item::new(format!("{when}: {}", entry.summary))
        .with_subtitle(subtitle)
        .with_icon(options.icon(icon))
}

pub fn refresh_items() -> Vec<Item> {
    vec![
        Item::new("Refreshed!")
            .with_subtitle("Data will be reloaded on the next forecast")
            .with_valid(false),
    ]
}

pub fn updated_items(key: &str) -> Vec<Item> {
    vec![
        Item::new("Updated config")
            .with_subtitle(format!("{key} saved"))
            .with_valid(false),
    ]
}

/// One line per title, subtitles indented beneath.
pub fn render_text(items: &[Item]) -> String {
    let mut lines = Vec::with_capacity(items.len() * 2);
    for item in items {
        lines.push(item.title.clone());
        if let Some(subtitle) = &item.subtitle {
            lines.push(format!("  {subtitle}"));
        }
    }
    lines.join("\n")
}
