use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, instrument, warn};
use url::Url;

use super::downloader::{FetchFailure, PageFetcher};
use super::mirror;
use super::processor::Processor;
use crate::models::MirrorServer;

/// 这些主机带查询参数请求会失败
static QUERYLESS_HOSTS: &[&str] = &["one-way.work"];

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("图片地址无效: {0}")]
    InvalidUrl(String),
    #[error("重试 {attempts} 次后仍然失败: {last}")]
    Exhausted { attempts: u32, last: FetchFailure },
    #[error("没有可替换的镜像服务器 (已尝试 {attempts} 次)")]
    MirrorExhausted { attempts: u32 },
    #[error("保存图片失败: {0}")]
    Write(#[from] std::io::Error),
}

pub struct ImageFetcher<'a, F: PageFetcher> {
    fetcher: &'a F,
    processor: Processor,
    max_retry: u32,
    delay: Duration,
}

impl<'a, F: PageFetcher> ImageFetcher<'a, F> {
    pub fn new(fetcher: &'a F, max_retry: u32, delay: Duration) -> Self {
        Self {
            fetcher,
            processor: Processor,
            max_retry,
            delay,
        }
    }

    /// 下载一张图片到 `dir`，返回保存的文件路径。`saved` 是本章已经保存的
    /// 文件，重名时不会覆盖它们。
    ///
    /// 请求失败时原地址重试；404 时换一个镜像主机再试。两种重试共用
    /// `max_retry` 次机会，首次请求不计入。
    #[instrument(skip(self, dir, servers, saved))]
    pub async fn fetch(
        &self,
        image_url: &str,
        dir: &Path,
        servers: &[MirrorServer],
        saved: &[PathBuf],
    ) -> Result<PathBuf, ImageError> {
        let mut url =
            Url::parse(image_url).map_err(|_| ImageError::InvalidUrl(image_url.to_string()))?;
        let mut retry = 0;

        loop {
            if retry > 0 {
                warn!("重试第 {} 次: {}", retry, url);
            }

            strip_query_for_quirky_hosts(&mut url);

            let failure = match self.fetcher.fetch(url.as_str()).await {
                Ok(bytes) => {
                    return Ok(self.processor.write_image(bytes, &url, dir, saved).await?);
                }
                Err(failure) => failure,
            };
            error!("下载图片失败: {}", failure);

            if retry == self.max_retry {
                return Err(ImageError::Exhausted {
                    attempts: retry,
                    last: failure,
                });
            }

            if failure.is_not_found() {
                match mirror::alternate_url(&url, servers) {
                    Some(next) => url = next,
                    None => return Err(ImageError::MirrorExhausted { attempts: retry }),
                }
            }

            retry += 1;
            tokio::time::sleep(self.delay).await;
        }
    }
}

fn strip_query_for_quirky_hosts(url: &mut Url) {
    if url
        .host_str()
        .is_some_and(|host| QUERYLESS_HOSTS.contains(&host))
    {
        url.set_query(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::ScriptedFetcher;

    fn servers(paths: &[&str]) -> Vec<MirrorServer> {
        paths
            .iter()
            .map(|p| MirrorServer {
                path: p.to_string(),
                res: false,
            })
            .collect()
    }

    #[tokio::test]
    async fn saves_on_first_success() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::default();
        fetcher.ok("https://a.example/p/01.jpg", b"img");

        let saved = ImageFetcher::new(&fetcher, 5, Duration::ZERO)
            .fetch("https://a.example/p/01.jpg", dir.path(), &[], &[])
            .await
            .unwrap();

        assert_eq!(saved, dir.path().join("01.jpg"));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn not_found_fails_over_to_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::default();
        fetcher.fail("https://a.example/p/01.jpg", FetchFailure::Status(404));
        fetcher.ok("https://b.example/p/01.jpg", b"img");

        let saved = ImageFetcher::new(&fetcher, 5, Duration::ZERO)
            .fetch(
                "https://a.example/p/01.jpg",
                dir.path(),
                &servers(&["https://a.example/", "https://b.example/"]),
                &[],
            )
            .await
            .unwrap();

        assert_eq!(saved, dir.path().join("01.jpg"));
        assert_eq!(
            fetcher.requests(),
            vec!["https://a.example/p/01.jpg", "https://b.example/p/01.jpg"]
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn transport_errors_retry_same_url_until_budget_spent() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::default();
        for _ in 0..10 {
            fetcher.fail("https://a.example/p/01.jpg", FetchFailure::Request("reset".into()));
        }

        let err = ImageFetcher::new(&fetcher, 5, Duration::ZERO)
            .fetch("https://a.example/p/01.jpg", dir.path(), &[], &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ImageError::Exhausted { attempts: 5, .. }));
        let requests = fetcher.requests();
        assert_eq!(requests.len(), 6);
        assert!(requests.iter().all(|u| u == "https://a.example/p/01.jpg"));
    }

    #[tokio::test]
    async fn mixed_failures_share_one_budget() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::default();
        let list = servers(&["https://a.example/", "https://b.example/"]);
        for _ in 0..5 {
            fetcher.fail("https://a.example/x.jpg", FetchFailure::Status(404));
            fetcher.fail("https://b.example/x.jpg", FetchFailure::Status(404));
            fetcher.fail("https://a.example/x.jpg", FetchFailure::Status(503));
            fetcher.fail("https://b.example/x.jpg", FetchFailure::Status(503));
        }

        let err = ImageFetcher::new(&fetcher, 5, Duration::ZERO)
            .fetch("https://a.example/x.jpg", dir.path(), &list, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ImageError::Exhausted { attempts: 5, .. }));
        assert_eq!(fetcher.requests().len(), 6);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn not_found_without_alternate_is_mirror_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::default();
        fetcher.fail("https://a.example/x.jpg", FetchFailure::Status(404));

        let err = ImageFetcher::new(&fetcher, 5, Duration::ZERO)
            .fetch("https://a.example/x.jpg", dir.path(), &servers(&["https://a.example/"]), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ImageError::MirrorExhausted { attempts: 0 }));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn one_way_host_drops_query() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::default();
        fetcher.ok("https://one-way.work/p/01.jpg", b"img");

        ImageFetcher::new(&fetcher, 5, Duration::ZERO)
            .fetch("https://one-way.work/p/01.jpg?t=123&u=0", dir.path(), &[], &[])
            .await
            .unwrap();

        assert_eq!(fetcher.requests(), vec!["https://one-way.work/p/01.jpg"]);
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_without_request() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::default();
        let err = ImageFetcher::new(&fetcher, 5, Duration::ZERO)
            .fetch("not a url", dir.path(), &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::InvalidUrl(_)));
        assert!(fetcher.requests().is_empty());
    }
}
