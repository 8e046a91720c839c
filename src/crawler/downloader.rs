use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::config::Config;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// 请求没有拿到响应，或者读取响应体失败
    #[error("请求失败: {0}")]
    Request(String),
    #[error("HTTP 状态码 {0}")]
    Status(u16),
}

impl FetchFailure {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchFailure::Status(404))
    }
}

/// 取回页面或图片的原始字节
#[allow(async_fn_in_trait)]
pub trait PageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchFailure>;

    async fn page(&self, url: &str) -> Result<String, FetchFailure> {
        let bytes = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .cookie_store(true)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for Downloader {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::Request(e.to_string()))?;

        let status = response.status();
        debug!("响应状态: {}", status);
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchFailure::Request(e.to_string()))
    }
}
