use std::fmt;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{DayPolicy, Window, aggregate};
use crate::config::ResolvedConfig;
use crate::domain::{CountryDocument, CountryIndexEntry};
use crate::error::ElprisError;
use crate::fetch::SourceClient;
use crate::fs_util::{extract_zip, remove_stale_file};
use crate::notify::{Notifier, RunEvent};
use crate::parse::parse_price_file;
use crate::store::{Store, persist_aggregation};

/// Ingestion stages. Runs move strictly forward; any failure jumps to
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetching,
    Extracting,
    Parsing,
    Aggregating,
    Persisting,
    Done,
    Failed,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Stage::Fetching => Stage::Extracting,
            Stage::Extracting => Stage::Parsing,
            Stage::Parsing => Stage::Aggregating,
            Stage::Aggregating => Stage::Persisting,
            Stage::Persisting => Stage::Done,
            Stage::Done => Stage::Done,
            Stage::Failed => Stage::Failed,
        }
    }

    fn phase(self) -> &'static str {
        match self {
            Stage::Fetching => "Fetch",
            Stage::Extracting => "Extract",
            Stage::Parsing => "Parse",
            Stage::Aggregating => "Aggregate",
            Stage::Persisting => "Store",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Parsing => "parsing",
            Stage::Aggregating => "aggregating",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub stage: Stage,
    pub bytes_downloaded: u64,
    pub files_extracted: usize,
    pub rows: usize,
    pub countries: usize,
    pub regions: usize,
    pub days: usize,
    pub index_entries: usize,
    pub documents_written: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryResponse {
    pub data: CountryDocument,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryListResponse {
    pub data: Vec<CountryIndexEntry>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

struct Pipeline<'a> {
    stage: Stage,
    sink: &'a dyn ProgressSink,
    started: Instant,
}

impl<'a> Pipeline<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            stage: Stage::Fetching,
            sink,
            started: Instant::now(),
        }
    }

    fn step<T>(
        &mut self,
        detail: impl fmt::Display,
        run: impl FnOnce() -> Result<T, ElprisError>,
    ) -> Result<T, ElprisError> {
        self.sink.event(ProgressEvent {
            message: format!("phase={}; {detail}", self.stage.phase()),
            elapsed: Some(self.started.elapsed()),
        });
        match run() {
            Ok(value) => {
                self.stage = self.stage.next();
                Ok(value)
            }
            Err(source) => {
                let stage = self.stage;
                self.stage = Stage::Failed;
                Err(ElprisError::StageFailed {
                    stage,
                    source: Box::new(source),
                })
            }
        }
    }
}

pub struct App<S: SourceClient, N: Notifier> {
    config: ResolvedConfig,
    store: Store,
    source: S,
    notifier: N,
}

impl<S: SourceClient, N: Notifier> App<S, N> {
    pub fn new(config: ResolvedConfig, store: Store, source: S, notifier: N) -> Self {
        Self {
            config,
            store,
            source,
            notifier,
        }
    }

    pub fn day_policy(&self, today: NaiveDate) -> DayPolicy {
        let window = self
            .config
            .lookahead_days
            .map(|max_days| Window { today, max_days });
        DayPolicy::new(self.config.min_day_slots, window)
    }

    /// Runs one ingestion with "today" taken from the reference timezone.
    pub fn ingest(&self, sink: &dyn ProgressSink) -> Result<IngestReport, ElprisError> {
        self.ingest_at(self.config.today(), sink)
    }

    pub fn ingest_at(
        &self,
        today: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<IngestReport, ElprisError> {
        let result = self.run_pipeline(today, sink);
        let event = match &result {
            Ok(report) => RunEvent::Succeeded(report),
            Err(err) => RunEvent::Failed(err),
        };
        if let Err(err) = self.notifier.notify(&event) {
            warn!(error = %err, "failed to deliver run notification");
        }
        result
    }

    fn run_pipeline(
        &self,
        today: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<IngestReport, ElprisError> {
        let mut pipeline = Pipeline::new(sink);
        let archive = self.config.archive_path();
        let extract_dir = self.config.extract_path();
        let csv_path = self.config.csv_path();

        let bytes_downloaded = pipeline.step(
            format_args!("downloading {}", self.config.source_url),
            || {
                self.source
                    .download(&self.config.source_url, archive.as_std_path())
            },
        )?;
        let files_extracted = pipeline.step(format_args!("unpacking {archive}"), || {
            remove_stale_file(csv_path.as_std_path())?;
            extract_zip(archive.as_std_path(), extract_dir.as_std_path())
        })?;
        let rows = pipeline.step(format_args!("reading {csv_path}"), || {
            parse_price_file(csv_path.as_std_path())
        })?;
        let policy = self.day_policy(today);
        let aggregation = pipeline.step(
            format_args!("grouping {} rows (today {today})", rows.len()),
            || aggregate(&rows, &policy),
        )?;
        let documents_written = pipeline.step(
            format_args!("writing {} countries", aggregation.countries.len()),
            || persist_aggregation(&self.store, &aggregation),
        )?;

        Ok(IngestReport {
            stage: pipeline.stage,
            bytes_downloaded,
            files_extracted,
            rows: rows.len(),
            countries: aggregation.countries.len(),
            regions: aggregation.region_count(),
            days: aggregation.day_count(),
            index_entries: aggregation.index.len(),
            documents_written,
            elapsed_ms: pipeline.started.elapsed().as_millis() as u64,
        })
    }

    /// Stored document for `name`, matched exactly as it was written.
    pub fn country(&self, name: &str) -> Result<CountryResponse, ElprisError> {
        Ok(CountryResponse {
            data: self.store.country(name)?,
        })
    }

    pub fn countries(&self) -> Result<CountryListResponse, ElprisError> {
        Ok(CountryListResponse {
            data: self.store.country_index()?,
        })
    }

    /// Runs ingestion every `interval_minutes` until `keep_going` says stop.
    /// Failed runs are already reported through the notifier and do not
    /// end the loop.
    pub fn watch(&self, sink: &dyn ProgressSink, mut keep_going: impl FnMut(usize) -> bool) {
        let interval = Duration::from_secs(self.config.interval_minutes.saturating_mul(60));
        let mut runs = 0;
        loop {
            let started = Instant::now();
            match self.ingest(sink) {
                Ok(report) => info!(countries = report.countries, "scheduled run finished"),
                Err(err) => warn!(error = %err, "scheduled run failed"),
            }
            runs += 1;
            if !keep_going(runs) {
                break;
            }
            if let Some(wait) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(wait);
            }
        }
    }
}
