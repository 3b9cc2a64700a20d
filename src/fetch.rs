use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use tracing::debug;

use crate::error::ElprisError;

const MAX_REDIRECTS: usize = 10;

pub trait SourceClient: Send + Sync {
    /// Streams the body behind `url` into `destination`, replacing any
    /// previous file. Returns the number of bytes written.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, ElprisError>;
}

#[derive(Clone)]
pub struct HttpSourceClient {
    client: Client,
}

impl HttpSourceClient {
    pub fn new(timeout: Duration) -> Result<Self, ElprisError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("elpris/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ElprisError::SourceHttp(err.to_string()))?,
        );
        // Share links bounce through several hosts; the Location header is
        // followed as given.
        let client = Client::builder()
            .default_headers(headers)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|err| ElprisError::SourceHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl SourceClient for HttpSourceClient {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, ElprisError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ElprisError::SourceHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "source request failed".to_string());
            return Err(ElprisError::SourceStatus { status, message });
        }
        debug!(final_url = %response.url(), "source responded");

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| ElprisError::Filesystem(err.to_string()))?;
        }
        let mut file = File::create(destination).map_err(|err| {
            ElprisError::Filesystem(format!("create {}: {err}", destination.display()))
        })?;
        response
            .copy_to(&mut file)
            .map_err(|err| ElprisError::SourceHttp(err.to_string()))
    }
}
