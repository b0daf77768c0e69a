use std::sync::Arc;

use clap::Parser;
use config::Config;
use m3uedit::{
    counter::{CounterConfig, VisitorCounter},
    create_app,
    export::ExportConfig,
    filter::FilterConfig,
    metrics::MonitoringConfig,
    AppConfig, FetchConfig,
};
use serde::Deserialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Restrict URL loads to regional groups by default (overrides config)
    #[arg(long, overrides_with = "no_restrict")]
    restrict: bool,

    /// Load every group from URLs by default (overrides config)
    #[arg(long, overrides_with = "restrict")]
    no_restrict: bool,

    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,
}

impl Args {
    fn restrict_override(&self) -> Option<bool> {
        match (self.restrict, self.no_restrict) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    fetch: FetchConfig,
    #[serde(default)]
    filter: FilterConfig,
    #[serde(default)]
    export: ExportConfig,
    #[serde(default)]
    counter: CounterConfig,
    #[serde(default)]
    monitoring: MonitoringConfig,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8501
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix("M3UEDIT")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("filter.keywords")
}

fn load_settings(path: &str, env: config::Environment) -> anyhow::Result<Settings> {
    let settings = Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(env)
        .build()?;
    Ok(settings.try_deserialize()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration; the file is optional, M3UEDIT__SECTION__KEY env vars override it.
    let mut settings = load_settings(&args.config, env_source())?;

    if let Some(restrict) = args.restrict_override() {
        settings.filter.restrict_by_default = restrict;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    info!("Configuration loaded from {}: {:?}", args.config, settings);

    let counter = Arc::new(VisitorCounter::open(&settings.counter.path)?);
    info!("Visitor counter at {}", counter.path().display());

    let app = create_app(
        AppConfig {
            fetch: settings.fetch,
            filter: settings.filter,
            export: settings.export,
            monitoring: settings.monitoring,
        },
        counter,
    )?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_restrict_flags() {
        let args = Args::try_parse_from(["m3uedit"]).unwrap();
        assert_eq!(args.restrict_override(), None);

        let args = Args::try_parse_from(["m3uedit", "--restrict"]).unwrap();
        assert_eq!(args.restrict_override(), Some(true));

        let args = Args::try_parse_from(["m3uedit", "--no-restrict"]).unwrap();
        assert_eq!(args.restrict_override(), Some(false));

        let args = Args::try_parse_from(["m3uedit", "--no-restrict", "--restrict"]).unwrap();
        assert_eq!(args.restrict_override(), Some(true));

        let args = Args::try_parse_from(["m3uedit", "--restrict", "--no-restrict"]).unwrap();
        assert_eq!(args.restrict_override(), Some(false));
    }

    #[test]
    fn test_env_overrides_lists_and_scalars() {
        let vars: HashMap<String, String> = [
            ("M3UEDIT__FILTER__KEYWORDS", "TR,TURK"),
            ("M3UEDIT__SERVER__PORT", "9000"),
            ("M3UEDIT__EXPORT__FILE_PREFIX", "liste"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings =
            load_settings("does-not-exist.toml", env_source().source(Some(vars))).unwrap();
        assert_eq!(settings.filter.keywords, vec!["TR", "TURK"]);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.export.file_prefix, "liste");
        assert!(settings.filter.restrict_by_default);
    }
}
