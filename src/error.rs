use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::app::Stage;

#[derive(Debug, Error, Diagnostic)]
pub enum ElprisError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("unknown reference timezone: {0}")]
    InvalidTimezone(String),

    #[error("source request failed: {0}")]
    SourceHttp(String),

    #[error("source returned status {status}: {message}")]
    SourceStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("failed to read price file: {0}")]
    CsvRead(String),

    #[error("price file is missing required column {0}")]
    #[diagnostic(help("the upstream feed layout has changed"))]
    MissingHeader(String),

    #[error("country {0} does not exist in the ISO code table")]
    #[diagnostic(help("add the country to the ISO code table"))]
    UnknownCountry(String),

    #[error("failed to serialize document: {0}")]
    Serialize(String),

    #[error("failed to write document store: {0}")]
    StoreWrite(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("stored document {key} is corrupt: {message}")]
    CorruptDocument { key: String, message: String },

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("ingestion failed while {stage}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<ElprisError>,
    },
}

impl ElprisError {
    /// Unwraps stage context down to the error that actually failed.
    pub fn root(&self) -> &ElprisError {
        match self {
            ElprisError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
