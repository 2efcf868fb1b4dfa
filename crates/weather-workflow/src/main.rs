use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use weather_workflow::{
    cache::CacheStore,
    config::RuntimeConfig,
    error::{ErrorKind, ForecastError},
    feedback::{Feedback, Item},
    geocoding::{GeocodeError, Geocoder},
    model::ProviderKind,
    providers::{HttpProviders, ProviderApi},
    render::{self, RenderOptions},
    service,
    settings::{SettingKey, Settings, SettingsError, icon_sets},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Alfred weather workflow (multi-provider forecasts)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Forecast for the next few days.
    Daily {
        /// Place to look up; the configured default location when omitted.
        #[arg(long)]
        query: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Forecast for the next few hours.
    Hourly {
        #[arg(long)]
        query: Option<String>,
        /// RFC 3339 timestamp; earlier hours are skipped.
        #[arg(long)]
        start: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Force forecast data to be re-downloaded.
    Refresh {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Show or change workflow settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the current settings (API keys masked).
    Show {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Change one setting: provider, api-key, units, location, icons, date-format, time-format.
    Set {
        key: String,
        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,
        /// Provider whose API key is being set; defaults to the selected provider.
        #[arg(long)]
        provider: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Clone, Copy, Args)]
struct OutputArgs {
    #[arg(long, value_enum)]
    output: Option<OutputModeArg>,
    #[arg(long)]
    json: bool,
}

const ENVELOPE_SCHEMA_VERSION: &str = "v1";
const ERROR_CODE_USER_INVALID_INPUT: &str = "user.invalid_input";
const ERROR_CODE_USER_CONFIG_INCOMPLETE: &str = "user.config_incomplete";
const ERROR_CODE_USER_OUTPUT_MODE_CONFLICT: &str = "user.output_mode_conflict";
const ERROR_CODE_RUNTIME_GEOCODING: &str = "runtime.geocoding_failed";
const ERROR_CODE_RUNTIME_PROVIDER: &str = "runtime.provider_failed";
const ERROR_CODE_RUNTIME_CACHE_IO: &str = "runtime.cache_io";
const ERROR_CODE_RUNTIME_SETTINGS_IO: &str = "runtime.settings_io";
const ERROR_CODE_RUNTIME_PROVIDER_INIT: &str = "runtime.provider_init_failed";
const ERROR_CODE_RUNTIME_SERIALIZE: &str = "runtime.serialize_failed";
const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputModeArg {
    Human,
    Json,
    AlfredJson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliOutputMode {
    Human,
    Json,
    AlfredJson,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliError {
    kind: ErrorKind,
    code: &'static str,
    message: String,
}

impl CliError {
    fn user(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::User,
            code,
            message: message.into(),
        }
    }

    fn runtime(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Runtime,
            code,
            message: message.into(),
        }
    }

    fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

impl From<OutputModeArg> for CliOutputMode {
    fn from(value: OutputModeArg) -> Self {
        match value {
            OutputModeArg::Human => CliOutputMode::Human,
            OutputModeArg::Json => CliOutputMode::Json,
            OutputModeArg::AlfredJson => CliOutputMode::AlfredJson,
        }
    }
}

impl From<ForecastError> for CliError {
    fn from(error: ForecastError) -> Self {
        let code = match &error {
            ForecastError::Configuration(settings_error) if settings_error.is_storage() => {
                ERROR_CODE_RUNTIME_SETTINGS_IO
            }
            ForecastError::Configuration(
                SettingsError::MissingProvider
                | SettingsError::MissingApiKey(_)
                | SettingsError::MissingLocation,
            ) => ERROR_CODE_USER_CONFIG_INCOMPLETE,
            ForecastError::Configuration(_) => ERROR_CODE_USER_INVALID_INPUT,
            ForecastError::Geocoding(GeocodeError::NotFound(_)) => ERROR_CODE_USER_INVALID_INPUT,
            ForecastError::Geocoding(_) => ERROR_CODE_RUNTIME_GEOCODING,
            ForecastError::Provider(_) => ERROR_CODE_RUNTIME_PROVIDER,
            ForecastError::CacheIo(_) => ERROR_CODE_RUNTIME_CACHE_IO,
        };

        Self {
            kind: error.kind(),
            code,
            message: error.to_string(),
        }
    }
}

impl OutputArgs {
    fn hint(&self) -> CliOutputMode {
        if self.json {
            CliOutputMode::Json
        } else if let Some(explicit) = self.output {
            explicit.into()
        } else {
            CliOutputMode::Human
        }
    }
}

impl Cli {
    fn command_name(&self) -> &'static str {
        match &self.command {
            Commands::Daily { .. } => "weather.daily",
            Commands::Hourly { .. } => "weather.hourly",
            Commands::Refresh { .. } => "weather.refresh",
            Commands::Config {
                command: ConfigCommand::Show { .. },
            } => "weather.config.show",
            Commands::Config {
                command: ConfigCommand::Set { .. },
            } => "weather.config.set",
        }
    }

    fn output_args(&self) -> OutputArgs {
        match &self.command {
            Commands::Daily { output, .. }
            | Commands::Hourly { output, .. }
            | Commands::Refresh { output }
            | Commands::Config {
                command: ConfigCommand::Show { output } | ConfigCommand::Set { output, .. },
            } => *output,
        }
    }

    fn output_mode_hint(&self) -> CliOutputMode {
        self.output_args().hint()
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let command = cli.command_name();
    let output_mode = cli.output_mode_hint();
    match run(cli) {
        Ok(output) => println!("{output}"),
        Err(error) => {
            emit_error(command, output_mode, &error);
            std::process::exit(error.exit_code());
        }
    }
}

/// Diagnostics go to stderr so stdout stays a clean launcher payload.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<String, CliError> {
    let config = RuntimeConfig::from_env();
    let providers = HttpProviders::new()
        .map_err(|error| CliError::runtime(ERROR_CODE_RUNTIME_PROVIDER_INIT, error.to_string()))?;
    run_with(cli, &config, &providers, &providers, Utc::now)
}

fn run_with<G, P, N>(
    cli: Cli,
    config: &RuntimeConfig,
    geocoder: &G,
    providers: &P,
    now_fn: N,
) -> Result<String, CliError>
where
    G: Geocoder,
    P: ProviderApi,
    N: Fn() -> DateTime<Utc> + Copy,
{
    let command = cli.command_name();
    let output_mode = resolve_output_mode(cli.output_args(), CliOutputMode::Human)?;

    let mut settings = Settings::load(&config.settings_file()).map_err(ForecastError::from)?;
    let mut cache = CacheStore::load(config.cache_file(), config.cache_ttl_secs);

    match cli.command {
        Commands::Daily { query, .. } => {
            let report = service::get_weather(
                &settings,
                &mut cache,
                geocoder,
                providers,
                now_fn,
                query.as_deref().unwrap_or_default(),
            )?;
            let now = now_fn().with_timezone(&Local);
            let options = RenderOptions::new(config, &settings);
            render_output(
                command,
                output_mode,
                &report,
                render::daily_items(&report, &options, &now),
            )
        }
        Commands::Hourly { query, start, .. } => {
            let start = start.as_deref().map(parse_start).transpose()?;
            let report = service::get_weather(
                &settings,
                &mut cache,
                geocoder,
                providers,
                now_fn,
                query.as_deref().unwrap_or_default(),
            )?;
            let options = RenderOptions::new(config, &settings);
            render_output(
                command,
                output_mode,
                &report,
                render::hourly_items(&report, &options, start.as_ref()),
            )
        }
        Commands::Refresh { .. } => {
            service::refresh(&mut cache)?;
            render_output(
                command,
                output_mode,
                &json!({ "refreshed": true }),
                render::refresh_items(),
            )
        }
        Commands::Config {
            command: ConfigCommand::Show { .. },
        } => {
            let available = icon_sets(&config.icons_dir);
            let rows = settings_rows(&settings, &available);
            let items = rows
                .iter()
                .map(|(key, value)| Item::new(format!("{key}: {value}")).with_valid(false))
                .collect();
            render_output(
                command,
                output_mode,
                &settings_view(&settings, &available),
                items,
            )
        }
        Commands::Config {
            command:
                ConfigCommand::Set {
                    key,
                    value,
                    provider,
                    ..
                },
        } => {
            let key = SettingKey::parse(&key).map_err(ForecastError::from)?;
            let provider = provider.as_deref().map(parse_provider).transpose()?;
            service::update_setting(
                config,
                &mut settings,
                &mut cache,
                geocoder,
                key,
                &value.join(" "),
                provider,
            )?;
            render_output(
                command,
                output_mode,
                &json!({ "key": key.as_str(), "updated": true }),
                render::updated_items(key.as_str()),
            )
        }
    }
}

fn resolve_output_mode(
    args: OutputArgs,
    default_mode: CliOutputMode,
) -> Result<CliOutputMode, CliError> {
    match (args.output.map(Into::into), args.json) {
        (Some(mode), true) if mode != CliOutputMode::Json => Err(CliError::user(
            ERROR_CODE_USER_OUTPUT_MODE_CONFLICT,
            format!(
                "conflicting output flags: --json requires --output json (got {})",
                output_mode_label(mode)
            ),
        )),
        (Some(mode), _) => Ok(mode),
        (None, true) => Ok(CliOutputMode::Json),
        (None, false) => Ok(default_mode),
    }
}

fn parse_start(raw: &str) -> Result<DateTime<Local>, CliError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|start| start.with_timezone(&Local))
        .map_err(|error| {
            CliError::user(
                ERROR_CODE_USER_INVALID_INPUT,
                format!("invalid --start '{raw}': expected an RFC 3339 timestamp ({error})"),
            )
        })
}

fn parse_provider(raw: &str) -> Result<ProviderKind, CliError> {
    ProviderKind::parse(raw).ok_or_else(|| {
        CliError::user(
            ERROR_CODE_USER_INVALID_INPUT,
            format!("unknown provider '{raw}'"),
        )
    })
}

fn render_output<T: Serialize>(
    command: &str,
    output_mode: CliOutputMode,
    result: &T,
    items: Vec<Item>,
) -> Result<String, CliError> {
    match output_mode {
        CliOutputMode::Json => render_json_envelope(command, result),
        CliOutputMode::AlfredJson => Feedback::new(items).to_json().map_err(|error| {
            CliError::runtime(
                ERROR_CODE_RUNTIME_SERIALIZE,
                format!("failed to serialize Alfred output: {error}"),
            )
        }),
        CliOutputMode::Human => Ok(render::render_text(&items)),
    }
}

fn render_json_envelope<T: Serialize>(command: &str, result: &T) -> Result<String, CliError> {
    let result = serde_json::to_value(result).map_err(|error| {
        CliError::runtime(
            ERROR_CODE_RUNTIME_SERIALIZE,
            format!("failed to serialize output: {error}"),
        )
    })?;
    serde_json::to_string(&json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": true,
        "result": result,
    }))
    .map_err(|error| {
        CliError::runtime(
            ERROR_CODE_RUNTIME_SERIALIZE,
            format!("failed to serialize output envelope: {error}"),
        )
    })
}

fn settings_view(settings: &Settings, icon_sets: &[String]) -> serde_json::Value {
    let api_keys: BTreeMap<&str, String> = settings
        .api_keys
        .iter()
        .map(|(provider, key)| (provider.as_str(), mask_secret(key)))
        .collect();

    json!({
        "provider": settings.provider,
        "units": settings.units,
        "icons": settings.icons,
        "icon_sets": icon_sets,
        "date_format": settings.date_format,
        "time_format": settings.time_format,
        "api_keys": api_keys,
        "location": settings.location,
    })
}

fn settings_rows(settings: &Settings, icon_sets: &[String]) -> Vec<(&'static str, String)> {
    let api_key = settings
        .provider
        .and_then(|provider| settings.api_key(provider))
        .map(mask_secret);

    vec![
        (
            SettingKey::Provider.as_str(),
            settings
                .provider
                .map(|provider| provider.as_str().to_string())
                .unwrap_or_else(|| "(not set)".to_string()),
        ),
        (
            SettingKey::ApiKey.as_str(),
            api_key.unwrap_or_else(|| "(not set)".to_string()),
        ),
        (SettingKey::Units.as_str(), settings.units.as_str().to_string()),
        (
            SettingKey::Location.as_str(),
            settings
                .location
                .as_ref()
                .map(|location| {
                    format!("{} ({})", location.name, location.coordinate_label())
                })
                .unwrap_or_else(|| "(not set)".to_string()),
        ),
        (SettingKey::Icons.as_str(), settings.icons.clone()),
        (
            "icon sets",
            if icon_sets.is_empty() {
                "(none installed)".to_string()
            } else {
                icon_sets.join(", ")
            },
        ),
        (SettingKey::DateFormat.as_str(), settings.date_format.clone()),
        (SettingKey::TimeFormat.as_str(), settings.time_format.clone()),
    ]
}

fn mask_secret(secret: &str) -> String {
    let secret = secret.trim();
    let count = secret.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{tail}")
}

fn emit_error(command: &str, output_mode: CliOutputMode, error: &CliError) {
    match output_mode {
        CliOutputMode::Json => {
            let payload = json!({
                "schema_version": ENVELOPE_SCHEMA_VERSION,
                "command": command,
                "ok": false,
                "error": {
                    "code": error.code,
                    "message": redact_sensitive(&error.message),
                    "details": {
                        "kind": error_kind_label(error.kind),
                        "exit_code": error.exit_code(),
                    }
                }
            });
            let rendered = payload.to_string();
            println!("{rendered}");
        }
        CliOutputMode::AlfredJson => {
            let feedback = Feedback::new(vec![
                Item::new(format!("Error [{}]", error.code))
                    .with_subtitle(redact_sensitive(&error.message))
                    .with_valid(false),
            ]);
            let rendered = feedback.to_json().unwrap_or_else(|_| {
                "{\"items\":[{\"title\":\"Error\",\"subtitle\":\"failed to serialize error output\",\"valid\":false}]}".to_string()
            });
            println!("{rendered}");
        }
        CliOutputMode::Human => {
            eprintln!(
                "error[{}]: {}",
                error.code,
                redact_sensitive(&error.message)
            );
        }
    }
}

fn error_kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::User => "user",
        ErrorKind::Runtime => "runtime",
    }
}

fn output_mode_label(mode: CliOutputMode) -> &'static str {
    match mode {
        CliOutputMode::Human => "human",
        CliOutputMode::Json => "json",
        CliOutputMode::AlfredJson => "alfred-json",
    }
}

/// Query-style secrets left in provider or geocoder messages. `key=` also
/// covers `apikey=`.
const SECRET_PARAMS: [&str; 4] = ["appid=", "key=", "token=", "secret="];

fn redact_sensitive(input: &str) -> String {
    SECRET_PARAMS
        .iter()
        .fold(input.to_string(), |text, param| redact_param(&text, param))
}

fn redact_param(input: &str, param: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(found) = lower[cursor..].find(param) {
        let value_start = cursor + found + param.len();
        output.push_str(&input[cursor..value_start]);
        let rest = &input[value_start..];
        if rest.starts_with(REDACTED) {
            output.push_str(REDACTED);
            cursor = value_start + REDACTED.len();
            continue;
        }
        let value_len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '&' | ',' | ';' | ')' | '"'))
            .unwrap_or(rest.len());
        if value_len > 0 {
            output.push_str(REDACTED);
        }
        cursor = value_start + value_len;
    }

    output.push_str(&input[cursor..]);
    output
}
