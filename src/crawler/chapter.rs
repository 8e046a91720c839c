use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use tokio::fs;
use tracing::{debug, info, instrument};

use super::downloader::{FetchFailure, PageFetcher};
use super::fetcher::ImageFetcher;
use super::parser::{self, EmbeddedDataError};
use crate::archive::Archiver;
use crate::config::Config;
use crate::events::{EventSink, Severity};
use crate::models::{ChapterEntry, ChapterResult, DownloadRequest};
use crate::utils::safe_file_name;

static NUMBERED_CHAPTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(vol\d+/)(\d+)$").expect("章节路径正则无效"));

#[derive(Debug, thiserror::Error)]
pub enum ChapterError {
    #[error("需要登录才能下载")]
    AuthRequired,
    #[error("获取章节页面失败: {0}")]
    Page(#[from] FetchFailure),
    #[error("解析章节页面失败: {0}")]
    Resolution(#[from] EmbeddedDataError),
    #[error("创建目录失败 {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// 章节地址，`mtr` 与 `tran` 参数共用一个 `?`
pub fn chapter_url(
    manga_url: &str,
    chapter_path: &str,
    mtr: bool,
    pref_translator: Option<&str>,
) -> String {
    let mut url = format!("{}/{}", manga_url.trim_end_matches('/'), chapter_path);
    let mut separator = '?';
    if mtr {
        url.push_str("?mtr=1");
        separator = '&';
    }
    if let Some(translator) = pref_translator.filter(|t| !t.is_empty()) {
        url.push(separator);
        url.push_str("tran=");
        url.push_str(translator);
    }
    url
}

/// 章节目录名：`vol1/5` + `Title 1 - 5 Name` -> `vol1/005 5 Name`
pub fn chapter_name(chapter_path: &str, title: &str) -> String {
    let path = chapter_path.trim();
    let name = match NUMBERED_CHAPTER.captures(path) {
        Some(caps) => format!(
            "{}{:0>3} {}",
            &caps[1],
            &caps[2],
            strip_title_prefix(title.trim())
        ),
        None => format!("{} {}", path, title.trim()),
    };
    name.trim().to_string()
}

/// 去掉标题前三个词（作品名、卷号、分隔符）
fn strip_title_prefix(title: &str) -> &str {
    let parts: Vec<&str> = title.splitn(4, ' ').collect();
    if parts.len() == 4 { parts[3] } else { title }
}

/// 目录名中只有卷和章之间的 `/` 保留为层级
fn sanitize(name: &str) -> String {
    match name.split_once('/') {
        Some((volume, rest)) => format!("{}/{}", safe_file_name(volume), safe_file_name(rest)),
        None => safe_file_name(name),
    }
}

pub struct ChapterResolver<'a, F: PageFetcher, A: Archiver> {
    fetcher: &'a F,
    archiver: &'a A,
    config: &'a Config,
    events: &'a dyn EventSink,
}

impl<'a, F: PageFetcher, A: Archiver> ChapterResolver<'a, F, A> {
    pub fn new(
        fetcher: &'a F,
        archiver: &'a A,
        config: &'a Config,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            fetcher,
            archiver,
            config,
            events,
        }
    }

    /// 下载一章的全部图片到 `job_dir` 下。单页失败只记录，不中断本章。
    #[instrument(skip_all, fields(chapter = %chapter.path))]
    pub async fn resolve(
        &self,
        request: &DownloadRequest,
        job_dir: &Path,
        chapter: &ChapterEntry,
    ) -> Result<ChapterResult, ChapterError> {
        self.events
            .log(Severity::Std, &format!("下载章节: {}", chapter.path));

        let url = chapter_url(
            &request.manga_url,
            &chapter.path,
            request.mtr,
            request.pref_translator.as_deref(),
        );
        // 失败由调用方统一上报
        let html = self.fetcher.page(&url).await?;

        let pages = {
            let document = Html::parse_document(&html);
            if parser::is_auth_wall(&document, &self.config.markup) {
                return Err(ChapterError::AuthRequired);
            }
            parser::chapter_pages(&html)?
        };
        if let Some(e) = &pages.servers_error {
            self.events.log(
                Severity::Err,
                &format!("-- 镜像服务器列表解析失败，本章无法换源: {}", e),
            );
        }

        let name = sanitize(&chapter_name(&chapter.path, &chapter.title));
        info!("章节目录: {}", name);
        let dir = job_dir.join(&name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| ChapterError::Filesystem {
                path: dir.clone(),
                source,
            })?;

        let fetcher = ImageFetcher::new(self.fetcher, self.config.max_retry, self.config.image_delay());
        let total = pages.images.len();
        let mut files = Vec::with_capacity(total);

        for (index, image_url) in pages.images.iter().enumerate() {
            debug!("下载图片 {}/{}: {}", index + 1, total, image_url);
            match fetcher.fetch(image_url, &dir, &pages.servers, &files).await {
                Ok(path) => files.push(path),
                Err(e) => self.events.log(
                    Severity::Err,
                    &format!("-- 下载页面失败 ({}): {}", image_url, e),
                ),
            }
            tokio::time::sleep(self.config.image_delay()).await;
        }

        self.post_process(request, &dir, &files).await;

        Ok(ChapterResult {
            path: chapter.path.clone(),
            dir,
            files,
        })
    }

    async fn post_process(&self, request: &DownloadRequest, dir: &Path, files: &[PathBuf]) {
        if !request.chapter_archive {
            return;
        }
        if files.is_empty() {
            self.events
                .log(Severity::Err, "- 本章没有下载到图片，跳过打包");
            return;
        }

        self.events.log(Severity::Std, "- 打包章节 CBZ");
        if let Err(e) = self.archiver.package_chapter(dir, files).await {
            self.events
                .log(Severity::Err, &format!("-- 打包章节失败: {}", e));
            return;
        }

        if request.delete_after && !request.volume_archive {
            if let Err(e) = fs::remove_dir_all(dir).await {
                self.events.log(
                    Severity::Err,
                    &format!("-- 删除章节图片失败 {}: {}", dir.display(), e),
                );
            }
        }
    }
}
