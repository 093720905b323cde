//! HTTP byte source.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::domain::entities::ResourceSpec;
use crate::domain::errors::ResourceError;
use crate::domain::ports::{ByteSource, Fetched};
use crate::infrastructure::config::HttpConfig;

/// Fetches resource bytes over HTTP with a blocking client.
///
/// In deferred mode every fetch runs on its own thread and resumes the
/// pipeline through the resolver, freeing the download worker at once.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    deferred: bool,
}

impl HttpFetcher {
    /// Creates a fetcher from configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &HttpConfig) -> Result<Self, ResourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ResourceError::fetch("", format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            deferred: config.deferred,
        })
    }

    /// Downloads the body behind `url`.
    ///
    /// # Errors
    /// Returns [`ResourceError::Fetch`] on transport errors and non-success statuses.
    pub fn download(&self, url: &str) -> Result<Bytes, ResourceError> {
        download(&self.client, url)
    }
}

fn download(client: &reqwest::blocking::Client, url: &str) -> Result<Bytes, ResourceError> {
    let response = client
        .get(url)
        .send()
        .map_err(|e| ResourceError::fetch(url, format!("Request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(ResourceError::fetch(
            url,
            format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            ),
        ));
    }

    let bytes = response
        .bytes()
        .map_err(|e| ResourceError::fetch(url, format!("Failed to read body: {e}")))?;

    debug!(url, len = bytes.len(), "Downloaded resource");
    Ok(bytes)
}

impl ByteSource for HttpFetcher {
    fn fetch(&self, url: &str, _spec: &ResourceSpec) -> Result<Fetched, ResourceError> {
        if !self.deferred {
            return self.download(url).map(Fetched::Bytes);
        }

        let client = self.client.clone();
        Ok(Fetched::later(move |resolver| {
            let url = resolver.url().to_string();
            let spawned = std::thread::Builder::new()
                .name("http-fetch".to_string())
                .spawn(move || {
                    let result = download(&client, resolver.url());
                    resolver.resolve(result);
                });
            // A failed spawn drops the resolver, which reports the fetch as failed.
            if let Err(e) = spawned {
                warn!(url = %url, error = %e, "Failed to spawn deferred fetch");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        let fetcher = HttpFetcher::new(&HttpConfig::default());
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_unreachable_host_is_fetch_error() -> Result<(), Box<dyn std::error::Error>> {
        let fetcher = HttpFetcher::new(&HttpConfig {
            timeout_secs: 2,
            ..HttpConfig::default()
        })?;

        let result = fetcher.download("http://127.0.0.1:9/missing.png");
        assert!(matches!(result, Err(ResourceError::Fetch { .. })));
        Ok(())
    }
}
