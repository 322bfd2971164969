//! HTTP list fetcher

use crate::error::Result;
use fire_core::config::DenylistConfig;
use fire_core::filter::ListFetcher;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("fire/", env!("CARGO_PKG_VERSION"));

/// Downloads hosts-format lists over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Client with the given connect timeout and whole-request deadline.
    ///
    /// The deadline covers the body download too, so it has to be long
    /// enough for the largest list on a slow link.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Client configured from the `[denylist]` section
    pub fn from_config(config: &DenylistConfig) -> Result<Self> {
        Self::new(config.connect_timeout(), config.request_timeout())
    }
}

impl ListFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> fire_core::Result<Box<dyn BufRead + Send>> {
        debug!(url, "Fetching list");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fire_core::Error::fetch(url, e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(fire_core::Error::HttpStatus {
                status: status.as_u16(),
            });
        }
        Ok(Box::new(BufReader::new(response)))
    }
}
