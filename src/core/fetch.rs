//! Fetching catalog CSV documents.

use reqwest::blocking::Client;
use std::time::Duration;

use crate::defaults::HttpConfig;
use crate::{Error, Result};

/// Where the cabinet loader gets each catalog's CSV document from.
///
/// Bodies are returned as bytes. The loader decodes them lossily.
pub trait CsvSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP source. Non-2xx responses are download failures.
pub struct HttpCsvSource {
    client: Client,
}

impl HttpCsvSource {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                Error::internal_io(e.to_string(), Some("create HTTP client".to_string()))
            })?;

        Ok(Self { client })
    }
}

impl CsvSource for HttpCsvSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::download_failed(url, e.to_string(), None))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::download_failed(
                url,
                status.to_string(),
                Some(status.as_u16()),
            ));
        }

        // Decodes by the Content-Type charset, replacing bad sequences.
        response
            .text()
            .map(String::into_bytes)
            .map_err(|e| Error::download_failed(url, e.to_string(), None))
    }
}
