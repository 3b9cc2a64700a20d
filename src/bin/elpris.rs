use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use elpris_ingest::app::{App, LogSink};
use elpris_ingest::config::{ConfigLoader, ResolvedConfig};
use elpris_ingest::error::ElprisError;
use elpris_ingest::fetch::{HttpSourceClient, SourceClient};
use elpris_ingest::notify::{LogNotifier, Notifier, RunEvent, SlackNotifier};
use elpris_ingest::output::JsonOutput;
use elpris_ingest::store::Store;

#[derive(Parser)]
#[command(name = "elpris")]
#[command(about = "Imports the electricity spot-price feed and serves per-country price documents")]
#[command(version)]
struct Cli {
    /// Path to a JSON config file (defaults to ./elpris.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download, reshape and store the price feed once")]
    Ingest,
    #[command(about = "Ingest now and then on a fixed interval")]
    Watch {
        #[arg(long)]
        interval_minutes: Option<u64>,
    },
    #[command(about = "Print the stored document for one country")]
    Country { name: String },
    #[command(about = "Print the index of available countries and regions")]
    Countries,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ElprisError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ElprisError) -> u8 {
    match error.root() {
        ElprisError::DocumentNotFound(_) => 2,
        ElprisError::SourceHttp(_) | ElprisError::SourceStatus { .. } => 3,
        ElprisError::MissingHeader(_) | ElprisError::UnknownCountry(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new(config.store_dir.clone());

    match cli.command {
        Commands::Ingest => {
            let app = ingest_app(config, store)?;
            let report = app.ingest(&LogSink)?;
            JsonOutput::print_report(&report).into_diagnostic()?;
            Ok(())
        }
        Commands::Watch { interval_minutes } => {
            if let Some(minutes) = interval_minutes {
                config.interval_minutes = minutes.max(1);
            }
            let app = ingest_app(config, store)?;
            app.watch(&LogSink, |_| true);
            Ok(())
        }
        Commands::Country { name } => {
            let app = App::new(config, store, NopSource, LogNotifier);
            let response = app.country(&name)?;
            JsonOutput::print_country(&response).into_diagnostic()?;
            Ok(())
        }
        Commands::Countries => {
            let app = App::new(config, store, NopSource, LogNotifier);
            let response = app.countries()?;
            JsonOutput::print_countries(&response).into_diagnostic()?;
            Ok(())
        }
    }
}

fn ingest_app(
    config: ResolvedConfig,
    store: Store,
) -> miette::Result<App<HttpSourceClient, ConfiguredNotifier>> {
    let source = HttpSourceClient::new(Duration::from_secs(config.request_timeout_secs))?;
    let notifier = match &config.slack_webhook_url {
        Some(url) => ConfiguredNotifier::Slack(SlackNotifier::new(url.clone())?),
        None => ConfiguredNotifier::Log(LogNotifier),
    };
    Ok(App::new(config, store, source, notifier))
}

enum ConfiguredNotifier {
    Log(LogNotifier),
    Slack(SlackNotifier),
}

impl Notifier for ConfiguredNotifier {
    fn notify(&self, event: &RunEvent<'_>) -> Result<(), ElprisError> {
        match self {
            ConfiguredNotifier::Log(inner) => inner.notify(event),
            ConfiguredNotifier::Slack(inner) => inner.notify(event),
        }
    }
}

struct NopSource;

impl SourceClient for NopSource {
    fn download(&self, _url: &str, _destination: &Path) -> Result<u64, ElprisError> {
        Err(ElprisError::SourceHttp(
            "source client not configured".to_string(),
        ))
    }
}
