use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{error, info};

use crate::app::IngestReport;
use crate::error::ElprisError;

#[derive(Debug)]
pub enum RunEvent<'a> {
    Succeeded(&'a IngestReport),
    Failed(&'a ElprisError),
}

impl RunEvent<'_> {
    pub fn message(&self) -> String {
        match self {
            RunEvent::Succeeded(report) => format!(
                "Price import done: {} countries, {} regions, {} days from {} rows",
                report.countries, report.regions, report.days, report.rows
            ),
            RunEvent::Failed(err) => match err {
                ElprisError::StageFailed { stage, source } => {
                    format!("Price import failed while {stage}: {source}")
                }
                other => format!("Price import failed: {other}"),
            },
        }
    }
}

/// Human-facing status and error reporting for ingestion runs.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &RunEvent<'_>) -> Result<(), ElprisError>;
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &RunEvent<'_>) -> Result<(), ElprisError> {
        match event {
            RunEvent::Succeeded(_) => info!("{}", event.message()),
            RunEvent::Failed(_) => error!("{}", event.message()),
        }
        Ok(())
    }
}

/// Posts failed runs to a Slack incoming webhook. Successful runs are only
/// logged.
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Result<Self, ElprisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| ElprisError::Notify(err.to_string()))?;
        Ok(Self {
            webhook_url,
            client,
        })
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, event: &RunEvent<'_>) -> Result<(), ElprisError> {
        LogNotifier.notify(event)?;
        if matches!(event, RunEvent::Succeeded(_)) {
            return Ok(());
        }
        let body = serde_json::json!({ "text": event.message() });
        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .map_err(|err| ElprisError::Notify(err.to_string()))?
            .error_for_status()
            .map_err(|err| ElprisError::Notify(err.to_string()))?;
        Ok(())
    }
}
