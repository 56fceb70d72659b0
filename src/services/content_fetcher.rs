use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;

use crate::error::{CacheError, Result};

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Network seam for image downloads.
pub trait ImageFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT_STRING)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch a page's HTML. Non-success statuses are a miss, not an error.
    pub async fn fetch_html(&self, page_url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(page_url)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Failed to fetch {}: {}", page_url, response.status());
            return Ok(None);
        }

        Ok(Some(response.text().await?))
    }

    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "image/*")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Fetch(format!("{url}: HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.is_empty() && !content_type.starts_with("image/") {
            return Err(CacheError::Fetch(format!("{url}: not an image ({content_type})")));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(CacheError::Fetch(format!("{url}: empty body")));
        }
        Ok(bytes.to_vec())
    }
}

impl ImageFetcher for ContentFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        self.fetch_image(url).boxed()
    }
}
