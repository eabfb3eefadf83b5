use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use super::error::{Result, ScrapeError};
use super::extract::extract_detail;
use super::types::{EnrichedDetail, ScrapeConfig};

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

#[async_trait]
impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        (**self).fetch_text(url).await
    }
}

pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .pool_max_idle_per_host(32)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ScrapeConfig) -> Result<Self> {
        Self::new(&config.user_agent, config.timeout)
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

pub fn absolutize(base: &Url, href: &str) -> Result<String> {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return Ok(href.to_string());
    }
    Ok(base.join(href)?.to_string())
}

pub struct DetailFetcher<S> {
    source: S,
    base: Url,
}

impl<S: PageSource> DetailFetcher<S> {
    pub fn new(source: S, base_url: &str) -> Result<Self> {
        Ok(Self {
            source,
            base: Url::parse(base_url)?,
        })
    }

    pub async fn fetch(&self, url: &str) -> EnrichedDetail {
        match self.try_fetch(url).await {
            Ok(detail) => detail,
            Err(err) => {
                warn!(url, error = %err, "failed to fetch product details");
                EnrichedDetail::sentinel()
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<EnrichedDetail> {
        let full_url = absolutize(&self.base, url)?;
        debug!(url = %full_url, "fetching product details");
        let markup = self.source.fetch_text(&full_url).await?;
        Ok(extract_detail(&markup))
    }
}
