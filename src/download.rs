// 🌐 BLS Downloader
// Blocking fetch of the published flat files. No retries: a failed download is
// reported to the caller as-is.

use crate::config::Config;
use crate::db::payload_checksum;
use crate::error::{PpiError, Result};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::info;

/// Raw bytes of one downloaded file
#[derive(Debug, Clone)]
pub struct Payload {
    pub source: String,
    pub bytes: Vec<u8>,
    pub sha256: String,
}

pub struct BlsDownloader {
    client: Client,
    metadata_url: String,
    data_url: String,
}

impl BlsDownloader {
    pub fn new(config: &Config) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            return Err(PpiError::Config(
                "a User-Agent with contact information is required by download.bls.gov".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(config.user_agent.trim())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(BlsDownloader {
            client,
            metadata_url: config.metadata_url.clone(),
            data_url: config.data_url.clone(),
        })
    }

    pub fn fetch(&self, url: &str) -> Result<Payload> {
        info!(url, "downloading");

        let response = self.client.get(url).send()?.error_for_status()?;
        let bytes = response.bytes()?.to_vec();

        info!(url, bytes = bytes.len(), "download complete");

        Ok(Payload {
            source: url.to_string(),
            sha256: payload_checksum(&bytes),
            bytes,
        })
    }

    pub fn fetch_metadata(&self) -> Result<Payload> {
        self.fetch(&self.metadata_url)
    }

    pub fn fetch_data(&self) -> Result<Payload> {
        self.fetch(&self.data_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_required() {
        let result = BlsDownloader::new(&Config::default());
        assert!(matches!(result, Err(PpiError::Config(_))));
    }

    #[test]
    fn test_downloader_uses_configured_urls() {
        let mut config = Config::default().with_user_agent("analyst@example.com");
        config.data_url = "http://localhost:1/wp.data.test".to_string();

        let downloader = BlsDownloader::new(&config).unwrap();
        assert_eq!(downloader.data_url, "http://localhost:1/wp.data.test");
        assert!(downloader.metadata_url.ends_with("wp.series"));
    }
}
